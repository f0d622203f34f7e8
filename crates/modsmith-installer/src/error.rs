use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Failures recorded inside patch and installation results.
///
/// These never cross the action loop as `Err`; they are carried by the
/// result values so that a run always produces a complete report.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum InstallError {
    #[error("search text not found: {search}")]
    NotFound { search: String },
    #[error("search text is already present: {search}")]
    AlreadyPresent { search: String },
    #[error("target is missing: {}", .0.display())]
    TargetMissing(PathBuf),
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("malformed patch: {0}")]
    MalformedPatch(String),
    #[error("unknown action type '{0}'")]
    UnknownActionType(String),
}
