use std::path::{Path, PathBuf};

use serde::Serialize;

pub const DEFAULT_THEME_ID: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThemeEntry {
    pub id: u32,
    pub name: String,
    pub theme_dir: PathBuf,
}

impl ThemeEntry {
    pub fn new(id: u32, name: impl Into<String>, theme_dir: impl Into<PathBuf>) -> Self {
        Self {
            id,
            name: name.into(),
            theme_dir: theme_dir.into(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_THEME_ID
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.theme_dir)
    }
}

pub fn default_theme(themes: &[ThemeEntry]) -> Option<&ThemeEntry> {
    themes.iter().find(|theme| theme.is_default())
}

pub fn custom_themes(themes: &[ThemeEntry]) -> impl Iterator<Item = &ThemeEntry> {
    themes.iter().filter(|theme| !theme.is_default())
}
