use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use modsmith_core::{Action, ActionDetail, ActionKind, InstallMode, TomlDocument};
use modsmith_resolver::matches;
use serde::Serialize;
use tracing::{debug, warn};

use crate::boardmod::apply_boardmod;
use crate::error::InstallError;
use crate::fs_utils::{copy_dir_recursive, copy_file, move_path, put_contents, remove_path};
use crate::history::PackageHistory;
use crate::modification::{apply_modification, PatchEnvironment, PatchOptions};
use crate::theme_mirror::{mirror_tree_action, MirrorTarget};
use crate::types::{
    CursorStep, InstallationResult, OperationOutcome, PatchEvent, PatchReport, RenderedStep,
    ResultStatus, NO_CUSTOM_THEME,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub mode: InstallMode,
    pub testing: bool,
    pub language: String,
}

/// Operations accumulated for one physical file across the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub path: PathBuf,
    pub theme_id: u32,
    pub status: ResultStatus,
    pub operations: Vec<OperationOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub steps: Vec<RenderedStep>,
    pub failed: bool,
    pub chmod_paths: Vec<PathBuf>,
    pub deferred: Vec<Action>,
    pub themes_touched: Vec<u32>,
}

/// Walks a planned action list one action per call.
pub struct InstallationCursor<'a> {
    actions: &'a [Action],
    position: usize,
    env: PatchEnvironment<'a>,
    history: &'a dyn PackageHistory,
    options: RunOptions,
    selected_documents: Vec<usize>,
    chmod_paths: Vec<PathBuf>,
    file_index: BTreeMap<String, FileSummary>,
    theme_results: BTreeMap<u32, Vec<InstallationResult>>,
    deferred: Vec<Action>,
    alternates: Vec<Action>,
    failed: bool,
}

impl<'a> InstallationCursor<'a> {
    pub fn new(
        actions: &'a [Action],
        env: PatchEnvironment<'a>,
        history: &'a dyn PackageHistory,
        options: RunOptions,
    ) -> Self {
        let selected_documents = select_documents(actions, &options.language);
        Self {
            actions,
            position: 0,
            env,
            history,
            options,
            selected_documents,
            chmod_paths: Vec::new(),
            file_index: BTreeMap::new(),
            theme_results: BTreeMap::new(),
            deferred: Vec::new(),
            alternates: Vec::new(),
            failed: false,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_done(&self) -> bool {
        self.position >= self.actions.len()
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn chmod_paths(&self) -> &[PathBuf] {
        &self.chmod_paths
    }

    pub fn deferred(&self) -> &[Action] {
        &self.deferred
    }

    pub fn alternates(&self) -> &[Action] {
        &self.alternates
    }

    pub fn file_summaries(&self) -> impl Iterator<Item = &FileSummary> {
        self.file_index.values()
    }

    pub fn theme_results(&self, theme_id: u32) -> &[InstallationResult] {
        self.theme_results
            .get(&theme_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn themes_touched(&self) -> Vec<u32> {
        self.theme_results.keys().copied().collect()
    }

    /// Renders the next action. Past the end this keeps returning `Done`.
    pub fn next(&mut self) -> CursorStep {
        let actions = self.actions;
        let Some(action) = actions.get(self.position) else {
            return CursorStep::Done;
        };
        let index = self.position;
        self.position += 1;

        let results = match action.kind {
            ActionKind::Chmod => self.render_chmod(action),
            ActionKind::Modification => self.render_modification(action),
            ActionKind::Requires => vec![self.render_requires(action)],
            ActionKind::Readme | ActionKind::License => vec![self.render_document(index, action)],
            ActionKind::Error => vec![InstallationResult::new(
                action.kind,
                action.filename.clone(),
                ResultStatus::Failed,
            )
            .with_error(InstallError::UnknownActionType(action.filename.clone()))],
            kind if kind.is_deferred() => vec![self.render_deferred(action)],
            _ => self.render_tree_action(action),
        };

        if results.iter().any(|result| result.status.is_failure()) {
            self.failed = true;
        }
        for result in results.iter().filter(|result| result.is_custom_theme()) {
            self.theme_results
                .entry(result.theme_id)
                .or_default()
                .push(result.clone());
        }

        CursorStep::Action(RenderedStep {
            index,
            kind: action.kind,
            target: self.display_target(action),
            description: action.description.clone(),
            results,
        })
    }

    fn display_target(&self, action: &Action) -> String {
        match action.destination.as_deref() {
            Some(destination) => self.env.paths.display_relative(destination),
            None => action.filename.clone(),
        }
    }

    fn render_chmod(&mut self, action: &Action) -> Vec<InstallationResult> {
        let Some(path) = action.destination.clone() else {
            return Vec::new();
        };
        let target = self.env.paths.display_relative(&path);

        if !self.options.testing && self.env.permissions.make_writable(&path) {
            return vec![InstallationResult::new(action.kind, target, ResultStatus::Passed)];
        }
        self.chmod_paths.push(path);
        vec![InstallationResult::new(action.kind, target, ResultStatus::ChmodNeeded)
            .with_message("needs write permission")]
    }

    fn render_modification(&mut self, action: &Action) -> Vec<InstallationResult> {
        let source = action.source.clone().unwrap_or_else(|| PathBuf::from(&action.filename));
        let raw = match fs::read_to_string(&source) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %source.display(), error = %err, "cannot read modification file");
                return vec![InstallationResult::new(
                    action.kind,
                    action.filename.clone(),
                    ResultStatus::Missing,
                )
                .with_error(InstallError::TargetMissing(source))];
            }
        };

        let options = PatchOptions {
            testing: self.options.testing,
            undo: action.reverse,
        };
        let report = if action.is_boardmod {
            apply_boardmod(&raw, &self.env, options)
        } else {
            match TomlDocument::from_toml_str(&raw) {
                Ok(document) => apply_modification(&document, &self.env, options),
                Err(err) => {
                    return vec![InstallationResult::new(
                        action.kind,
                        action.filename.clone(),
                        ResultStatus::Failed,
                    )
                    .with_error(InstallError::MalformedPatch(format!("{err:#}")))];
                }
            }
        };

        let mut results = self.fold_report(action, &report);
        if !report.everything_found && !results.iter().any(|result| result.status.is_failure()) {
            results.push(
                InstallationResult::new(action.kind, action.filename.clone(), ResultStatus::Failed)
                    .with_message("not every search was found"),
            );
        }
        results
    }

    /// Folds a patch event stream into one result per physical file.
    fn fold_report(&mut self, action: &Action, report: &PatchReport) -> Vec<InstallationResult> {
        let mut order: Vec<(PathBuf, u32)> = Vec::new();
        let mut folded: BTreeMap<(PathBuf, u32), InstallationResult> = BTreeMap::new();
        let mut results = Vec::new();

        for event in &report.events {
            let Some(path) = event.path() else {
                if let PatchEvent::Error { error, theme_id, .. } = event {
                    results.push(
                        InstallationResult::new(action.kind, action.filename.clone(), ResultStatus::Failed)
                            .with_theme(*theme_id)
                            .with_error(error.clone()),
                    );
                }
                continue;
            };
            let key = (path.to_path_buf(), event.theme_id());
            let entry = folded.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                InstallationResult::new(
                    action.kind,
                    self.env.paths.display_relative(path),
                    ResultStatus::Opened,
                )
                .with_theme(event.theme_id())
            });

            match event {
                PatchEvent::Opened { .. } => {}
                PatchEvent::Replace { outcome, .. } => entry.operations.push(outcome.clone()),
                PatchEvent::Failure { outcome, .. } => {
                    entry.operations.push(outcome.clone());
                    entry.status = ResultStatus::Failed;
                    if entry.error.is_none() {
                        entry.error = outcome.error.clone();
                    }
                }
                PatchEvent::Saved { .. } => {
                    if !entry.status.is_failure() {
                        entry.status = ResultStatus::Saved;
                    }
                }
                PatchEvent::Missing { path, .. } => {
                    entry.status = ResultStatus::Missing;
                    entry.error = Some(InstallError::TargetMissing(path.clone()));
                }
                PatchEvent::Skipped { .. } => entry.status = ResultStatus::Skipped,
                PatchEvent::ChmodNeeded { path, .. } => {
                    if !self.chmod_paths.contains(path) {
                        self.chmod_paths.push(path.clone());
                    }
                    if entry.status == ResultStatus::Opened {
                        entry.status = ResultStatus::ChmodNeeded;
                    }
                }
                PatchEvent::Error { error, .. } => {
                    entry.status = ResultStatus::Failed;
                    entry.error = Some(error.clone());
                }
            }
        }

        for key in order {
            let Some(mut result) = folded.remove(&key) else {
                continue;
            };
            if let Some(message) = result.error.as_ref().map(ToString::to_string) {
                result.message = message;
            }
            self.index_file(action, &key.0, &result);
            results.push(result);
        }
        results
    }

    fn index_file(&mut self, action: &Action, path: &Path, result: &InstallationResult) {
        let key = format!("{}||{}", file_index_name(path), action.filename);
        debug!(key = %key, status = result.status.as_str(), "indexed patched file");
        let summary = self.file_index.entry(key).or_insert_with(|| FileSummary {
            path: path.to_path_buf(),
            theme_id: result.theme_id,
            status: result.status,
            operations: Vec::new(),
        });
        summary.operations.extend(result.operations.iter().cloned());
        if !summary.status.is_failure() {
            summary.status = result.status;
        }
    }

    fn render_requires(&mut self, action: &Action) -> InstallationResult {
        let ActionDetail::Requires { id, version } = &action.detail else {
            return InstallationResult::new(action.kind, action.filename.clone(), ResultStatus::Failed)
                .with_error(InstallError::UnknownActionType(action.kind.as_str().to_string()));
        };
        let result = |status| InstallationResult::new(action.kind, id.clone(), status);

        match self.history.lookup(id) {
            Ok(Some(entry)) => match version {
                Some(expression) if !matches(&entry.version, expression) => result(ResultStatus::Failed)
                    .with_message(format!(
                        "{id} {} is installed but {expression} is required",
                        entry.version
                    )),
                _ => result(ResultStatus::Passed).with_message(format!("{id} {} is installed", entry.version)),
            },
            Ok(None) => result(ResultStatus::Failed).with_message(match version {
                Some(expression) => format!("{id} {expression} is required but not installed"),
                None => format!("{id} is required but not installed"),
            }),
            Err(err) => result(ResultStatus::Failed).with_message(format!("{err:#}")),
        }
    }

    fn render_document(&mut self, index: usize, action: &Action) -> InstallationResult {
        if !self.selected_documents.contains(&index) {
            self.alternates.push(action.clone());
            let language = action.document_language().unwrap_or("default");
            return InstallationResult::new(action.kind, action.filename.clone(), ResultStatus::Skipped)
                .with_message(format!("alternate language: {language}"));
        }

        match action.source.as_deref() {
            Some(source) if !source.is_file() => {
                InstallationResult::new(action.kind, action.filename.clone(), ResultStatus::Missing)
                    .with_error(InstallError::TargetMissing(source.to_path_buf()))
            }
            _ => InstallationResult::new(action.kind, action.filename.clone(), ResultStatus::Opened),
        }
    }

    fn render_deferred(&mut self, action: &Action) -> InstallationResult {
        if action.kind == ActionKind::Database && self.options.mode == InstallMode::Uninstall {
            return InstallationResult::new(action.kind, action.filename.clone(), ResultStatus::Skipped)
                .with_message("database changes are not reverted on uninstall");
        }
        self.deferred.push(action.clone());
        InstallationResult::new(action.kind, action.filename.clone(), ResultStatus::Deferred)
    }

    fn render_tree_action(&mut self, action: &Action) -> Vec<InstallationResult> {
        let Some(destination) = action.destination.as_deref() else {
            return vec![InstallationResult::new(action.kind, action.filename.clone(), ResultStatus::Failed)
                .with_error(InstallError::MalformedPatch(format!(
                    "{} has no destination",
                    action.kind.as_str()
                )))];
        };

        let mut results = vec![self.run_tree_action(action, destination, NO_CUSTOM_THEME)];
        for MirrorTarget { theme_id, path } in mirror_tree_action(action, self.env.themes) {
            debug!(path = %path.display(), theme_id, "mirroring file-tree action");
            results.push(self.run_tree_action(action, &path, theme_id));
        }
        results
    }

    fn run_tree_action(&self, action: &Action, destination: &Path, theme_id: u32) -> InstallationResult {
        let target = self.env.paths.display_relative(destination);
        let result = |status| InstallationResult::new(action.kind, target.clone(), status).with_theme(theme_id);

        if action.kind.takes_source() {
            let source_present = action.source.as_deref().is_some_and(|source| {
                if action.kind.is_directory() {
                    source.is_dir()
                } else {
                    source.is_file()
                }
            });
            if !source_present {
                let source = action.source.clone().unwrap_or_default();
                return result(ResultStatus::Missing).with_error(InstallError::TargetMissing(source));
            }
        }
        if action.kind.is_removal() && !destination.exists() {
            return result(ResultStatus::Missing)
                .with_error(InstallError::TargetMissing(destination.to_path_buf()));
        }

        if self.options.testing {
            return result(ResultStatus::Passed);
        }

        match execute_tree_action(action, destination) {
            Ok(()) => result(ResultStatus::Saved),
            Err(err) => {
                warn!(path = %destination.display(), error = %format!("{err:#}"), "file-tree action failed");
                result(ResultStatus::Failed)
                    .with_error(InstallError::PermissionDenied(destination.to_path_buf()))
                    .with_message(format!("{err:#}"))
            }
        }
    }
}

fn execute_tree_action(action: &Action, destination: &Path) -> anyhow::Result<()> {
    let source = action.source.as_deref().unwrap_or(destination);
    match action.kind {
        ActionKind::CreateFile => {
            if !destination.exists() {
                put_contents(destination, "", false)?;
            }
            Ok(())
        }
        ActionKind::CreateDir => {
            fs::create_dir_all(destination)?;
            Ok(())
        }
        ActionKind::RequireFile => copy_file(source, destination),
        ActionKind::RequireDir => copy_dir_recursive(source, destination),
        ActionKind::MoveFile | ActionKind::MoveDir => move_path(source, destination),
        ActionKind::RemoveFile | ActionKind::RemoveDir => remove_path(destination),
        other => Err(anyhow::anyhow!("{} is not a file-tree action", other.as_str())),
    }
}

/// Lowercased file name, keeping the theme folder for template files so that
/// theme copies of a template stay distinct.
fn file_index_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if !name.ends_with(".template.php") {
        return name;
    }
    match path.parent().and_then(Path::file_name) {
        Some(parent) => format!("{}/{name}", parent.to_string_lossy().to_ascii_lowercase()),
        None => name,
    }
}

/// Indices of the readme/license actions to display: per kind, the first
/// one in `language`, else the first without a language tag.
fn select_documents(actions: &[Action], language: &str) -> Vec<usize> {
    let mut selected = Vec::new();
    for kind in [ActionKind::Readme, ActionKind::License] {
        let candidates = actions
            .iter()
            .enumerate()
            .filter(|(_, action)| action.kind == kind)
            .collect::<Vec<_>>();
        let chosen = candidates
            .iter()
            .find(|(_, action)| {
                action
                    .document_language()
                    .is_some_and(|lang| lang.trim().eq_ignore_ascii_case(language))
            })
            .or_else(|| {
                candidates
                    .iter()
                    .find(|(_, action)| action.document_language().is_none())
            });
        if let Some((index, _)) = chosen {
            selected.push(*index);
        }
    }
    selected
}

/// Drives a cursor over every action.
pub fn run_actions(
    actions: &[Action],
    env: PatchEnvironment<'_>,
    history: &dyn PackageHistory,
    options: RunOptions,
) -> RunReport {
    let mut cursor = InstallationCursor::new(actions, env, history, options);
    let mut steps = Vec::new();
    while let CursorStep::Action(step) = cursor.next() {
        steps.push(step);
    }

    RunReport {
        steps,
        failed: cursor.failed(),
        chmod_paths: cursor.chmod_paths().to_vec(),
        deferred: cursor.deferred().to_vec(),
        themes_touched: cursor.themes_touched(),
    }
}
