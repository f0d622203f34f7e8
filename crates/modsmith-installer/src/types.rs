use std::path::{Path, PathBuf};

use modsmith_core::ActionKind;
use serde::Serialize;

use crate::error::InstallError;
use crate::search::Position;

/// Theme id recorded for edits that are not attributed to a custom theme.
pub const NO_CUSTOM_THEME: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub search: String,
    pub add: String,
    pub position: Position,
    pub failed: bool,
    pub ignore_failure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InstallError>,
}

impl OperationOutcome {
    pub fn succeeded(search: &str, add: &str, position: Position) -> Self {
        Self {
            search: search.to_string(),
            add: add.to_string(),
            position,
            failed: false,
            ignore_failure: false,
            error: None,
        }
    }

    pub fn failed(search: &str, add: &str, position: Position, error: InstallError) -> Self {
        Self {
            failed: true,
            error: Some(error),
            ..Self::succeeded(search, add, position)
        }
    }

    pub fn counts_as_failure(&self) -> bool {
        self.failed && !self.ignore_failure
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PatchEvent {
    Opened {
        path: PathBuf,
        theme_id: u32,
    },
    Replace {
        path: PathBuf,
        theme_id: u32,
        outcome: OperationOutcome,
    },
    Failure {
        path: PathBuf,
        theme_id: u32,
        outcome: OperationOutcome,
    },
    Saved {
        path: PathBuf,
        theme_id: u32,
    },
    Missing {
        path: PathBuf,
        theme_id: u32,
    },
    Skipped {
        path: PathBuf,
        theme_id: u32,
    },
    ChmodNeeded {
        path: PathBuf,
        theme_id: u32,
    },
    Error {
        path: Option<PathBuf>,
        theme_id: u32,
        error: InstallError,
    },
}

impl PatchEvent {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Opened { path, .. }
            | Self::Replace { path, .. }
            | Self::Failure { path, .. }
            | Self::Saved { path, .. }
            | Self::Missing { path, .. }
            | Self::Skipped { path, .. }
            | Self::ChmodNeeded { path, .. } => Some(path),
            Self::Error { path, .. } => path.as_deref(),
        }
    }

    pub fn theme_id(&self) -> u32 {
        match self {
            Self::Opened { theme_id, .. }
            | Self::Replace { theme_id, .. }
            | Self::Failure { theme_id, .. }
            | Self::Saved { theme_id, .. }
            | Self::Missing { theme_id, .. }
            | Self::Skipped { theme_id, .. }
            | Self::ChmodNeeded { theme_id, .. }
            | Self::Error { theme_id, .. } => *theme_id,
        }
    }

    pub fn outcome(&self) -> Option<&OperationOutcome> {
        match self {
            Self::Replace { outcome, .. } | Self::Failure { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Opened { .. } => "opened",
            Self::Replace { .. } => "replace",
            Self::Failure { .. } => "failure",
            Self::Saved { .. } => "saved",
            Self::Missing { .. } => "missing",
            Self::Skipped { .. } => "skipped",
            Self::ChmodNeeded { .. } => "chmod-needed",
            Self::Error { .. } => "error",
        }
    }
}

/// Event stream of one patch application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    pub events: Vec<PatchEvent>,
    pub everything_found: bool,
}

impl Default for PatchReport {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            everything_found: true,
        }
    }
}

impl PatchReport {
    pub fn push(&mut self, event: PatchEvent) {
        self.events.push(event);
    }

    pub fn count(&self, type_name: &str) -> usize {
        self.events
            .iter()
            .filter(|event| event.type_name() == type_name)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultStatus {
    Opened,
    Saved,
    Failed,
    Missing,
    Skipped,
    ChmodNeeded,
    Passed,
    Deferred,
}

impl ResultStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Saved => "saved",
            Self::Failed => "failed",
            Self::Missing => "missing",
            Self::Skipped => "skipped",
            Self::ChmodNeeded => "chmod-needed",
            Self::Passed => "passed",
            Self::Deferred => "deferred",
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Missing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallationResult {
    pub action: ActionKind,
    pub target: String,
    pub status: ResultStatus,
    pub theme_id: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<OperationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InstallError>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl InstallationResult {
    pub fn new(action: ActionKind, target: impl Into<String>, status: ResultStatus) -> Self {
        Self {
            action,
            target: target.into(),
            status,
            theme_id: NO_CUSTOM_THEME,
            operations: Vec::new(),
            error: None,
            message: String::new(),
        }
    }

    pub fn with_theme(mut self, theme_id: u32) -> Self {
        self.theme_id = theme_id;
        self
    }

    pub fn with_error(mut self, error: InstallError) -> Self {
        if self.message.is_empty() {
            self.message = error.to_string();
        }
        self.error = Some(error);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_custom_theme(&self) -> bool {
        self.theme_id != NO_CUSTOM_THEME
    }
}

/// One call of [`crate::InstallationCursor::next`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedStep {
    pub index: usize,
    pub kind: ActionKind,
    pub target: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub results: Vec<InstallationResult>,
}

impl RenderedStep {
    pub fn failed(&self) -> bool {
        self.results.iter().any(|result| result.status.is_failure())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum CursorStep {
    Action(RenderedStep),
    Done,
}
