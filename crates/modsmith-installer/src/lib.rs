mod boardmod;
mod cursor;
mod error;
mod fs_utils;
mod history;
mod layout;
mod modification;
mod permissions;
mod planner;
mod runs;
mod search;
mod theme_mirror;
mod types;

pub use boardmod::{apply_boardmod, tokenize, Token, TokenKind};
pub use cursor::{run_actions, FileSummary, InstallationCursor, RunOptions, RunReport};
pub use error::InstallError;
pub use fs_utils::{backup_path, copy_dir_recursive, settings_backup_path};
pub use history::{HistoryEntry, InstallState, PackageHistory, ReceiptHistory};
pub use layout::{default_state_root, StateLayout};
pub use modification::{apply_modification, PatchEnvironment, PatchOptions};
pub use permissions::{FilePermissions, LocalPermissions};
pub use planner::{plan_actions, plan_fingerprint, select_method_block, PlanRequest};
pub use runs::{
    append_run_journal_entry, claim_active_run, clear_active_run, current_unix_timestamp,
    read_active_run, read_run_journal, read_run_metadata, update_run_status, write_run_metadata,
    RunJournalEntry, RunMetadata,
};
pub use search::{
    escape_literal, loosen_whitespace, protect_replacement, restore_protected, CompiledSearch,
    ErrorPolicy, Position, SearchSpec,
};
pub use theme_mirror::{mirror_tree_action, owning_custom_theme, MirrorTarget, TemplateChangeIndex};
pub use types::{
    CursorStep, InstallationResult, OperationOutcome, PatchEvent, PatchReport, RenderedStep,
    ResultStatus, NO_CUSTOM_THEME,
};
