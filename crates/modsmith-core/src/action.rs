use std::path::{Path, PathBuf};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    CreateFile,
    CreateDir,
    RequireFile,
    RequireDir,
    RemoveFile,
    RemoveDir,
    MoveFile,
    MoveDir,
    Modification,
    Code,
    Database,
    Hook,
    Credits,
    Requires,
    Readme,
    License,
    Redirect,
    Error,
    Chmod,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateFile => "create-file",
            Self::CreateDir => "create-dir",
            Self::RequireFile => "require-file",
            Self::RequireDir => "require-dir",
            Self::RemoveFile => "remove-file",
            Self::RemoveDir => "remove-dir",
            Self::MoveFile => "move-file",
            Self::MoveDir => "move-dir",
            Self::Modification => "modification",
            Self::Code => "code",
            Self::Database => "database",
            Self::Hook => "hook",
            Self::Credits => "credits",
            Self::Requires => "requires",
            Self::Readme => "readme",
            Self::License => "license",
            Self::Redirect => "redirect",
            Self::Error => "error",
            Self::Chmod => "chmod",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "create-file" => Some(Self::CreateFile),
            "create-dir" => Some(Self::CreateDir),
            "require-file" => Some(Self::RequireFile),
            "require-dir" => Some(Self::RequireDir),
            "remove-file" => Some(Self::RemoveFile),
            "remove-dir" => Some(Self::RemoveDir),
            "move-file" => Some(Self::MoveFile),
            "move-dir" => Some(Self::MoveDir),
            "modification" => Some(Self::Modification),
            "code" => Some(Self::Code),
            "database" => Some(Self::Database),
            "hook" => Some(Self::Hook),
            "credits" => Some(Self::Credits),
            "requires" => Some(Self::Requires),
            "readme" => Some(Self::Readme),
            "license" => Some(Self::License),
            "redirect" => Some(Self::Redirect),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_file_tree(self) -> bool {
        matches!(
            self,
            Self::CreateFile
                | Self::CreateDir
                | Self::RequireFile
                | Self::RequireDir
                | Self::RemoveFile
                | Self::RemoveDir
                | Self::MoveFile
                | Self::MoveDir
        )
    }

    pub fn is_removal(self) -> bool {
        matches!(self, Self::RemoveFile | Self::RemoveDir)
    }

    pub fn is_directory(self) -> bool {
        matches!(
            self,
            Self::CreateDir | Self::RequireDir | Self::RemoveDir | Self::MoveDir
        )
    }

    pub fn takes_source(self) -> bool {
        matches!(
            self,
            Self::RequireFile | Self::RequireDir | Self::MoveFile | Self::MoveDir
        )
    }

    pub fn is_document(self) -> bool {
        matches!(self, Self::Readme | Self::License)
    }

    /// Actions the engine leaves to the host application.
    pub fn is_deferred(self) -> bool {
        matches!(
            self,
            Self::Code | Self::Database | Self::Hook | Self::Credits | Self::Redirect
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeAction {
    Yes,
    No,
    #[default]
    Auto,
}

impl ThemeAction {
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "yes" => Self::Yes,
            "no" => Self::No,
            _ => Self::Auto,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "detail", rename_all = "kebab-case")]
pub enum ActionDetail {
    #[default]
    None,
    Document {
        language: Option<String>,
        parse_bbc: bool,
    },
    Redirect {
        url: String,
        timeout: Option<u32>,
    },
    Hook {
        hook: String,
        function: String,
        include_file: String,
        object: bool,
    },
    Credits {
        title: String,
        url: String,
        license: String,
        license_url: String,
        copyright: String,
    },
    Requires {
        id: String,
        version: Option<String>,
    },
    Tree {
        theme_action: ThemeAction,
    },
    Unknown {
        tag: String,
    },
}

impl ActionDetail {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// One planned unit of work. Planned once, then consumed in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub kind: ActionKind,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    pub description: String,
    pub reverse: bool,
    pub is_boardmod: bool,
    #[serde(flatten)]
    pub detail: ActionDetail,
}

impl Action {
    pub fn new(kind: ActionKind, filename: impl Into<String>) -> Self {
        Self {
            kind,
            filename: filename.into(),
            destination: None,
            source: None,
            description: String::new(),
            reverse: false,
            is_boardmod: false,
            detail: ActionDetail::None,
        }
    }

    pub fn chmod(path: &Path) -> Self {
        let mut action = Self::new(ActionKind::Chmod, path.display().to_string());
        action.destination = Some(path.to_path_buf());
        action
    }

    pub fn unknown(tag: &str) -> Self {
        let mut action = Self::new(ActionKind::Error, tag);
        action.detail = ActionDetail::Unknown {
            tag: tag.to_string(),
        };
        action
    }

    pub fn document_language(&self) -> Option<&str> {
        match &self.detail {
            ActionDetail::Document { language, .. } => language.as_deref(),
            _ => None,
        }
    }

    pub fn theme_action(&self) -> ThemeAction {
        match &self.detail {
            ActionDetail::Tree { theme_action } => *theme_action,
            _ => ThemeAction::Auto,
        }
    }
}
