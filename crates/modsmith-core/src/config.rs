use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::paths::{
    PathContext, BOARD_DIR, IMAGES_DIR, LANGUAGE_DIR, PACKAGE_DIR, SOURCE_DIR, THEMES_DIR,
    THEME_DIR,
};
use crate::theme::{ThemeEntry, DEFAULT_THEME_ID};

pub const DEFAULT_CONFIG_FILE: &str = "modsmith.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThemeConfig {
    pub id: u32,
    pub name: String,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallerConfig {
    pub product_version: String,
    pub board_dir: PathBuf,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub make_backups: bool,
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    #[serde(default = "default_themes_dir")]
    pub themes_dir: PathBuf,
    #[serde(default = "default_settings_file")]
    pub settings_file: String,
    #[serde(default)]
    pub themes: Vec<ThemeConfig>,
}

fn default_language() -> String {
    "english".to_string()
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("Sources")
}

fn default_themes_dir() -> PathBuf {
    PathBuf::from("Themes")
}

fn default_settings_file() -> String {
    "Settings.php".to_string()
}

impl InstallerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse installer config")?;
        if config.product_version.trim().is_empty() {
            return Err(anyhow!("product_version must not be empty"));
        }

        let mut seen_ids = BTreeSet::new();
        for theme in &config.themes {
            if !seen_ids.insert(theme.id) {
                return Err(anyhow!("duplicate theme id {} in installer config", theme.id));
            }
        }
        if !config.themes.is_empty() && !seen_ids.contains(&DEFAULT_THEME_ID) {
            return Err(anyhow!(
                "installer config lists themes but none has the default id {DEFAULT_THEME_ID}"
            ));
        }

        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read installer config: {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid installer config: {}", path.display()))
    }

    pub fn resolve_dir(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.board_dir.join(dir)
        }
    }

    pub fn source_dir(&self) -> PathBuf {
        self.resolve_dir(&self.source_dir)
    }

    pub fn themes_dir(&self) -> PathBuf {
        self.resolve_dir(&self.themes_dir)
    }

    pub fn themes(&self) -> Vec<ThemeEntry> {
        if self.themes.is_empty() {
            return vec![ThemeEntry::new(
                DEFAULT_THEME_ID,
                "Default",
                self.themes_dir().join("default"),
            )];
        }

        let mut themes = self
            .themes
            .iter()
            .map(|theme| ThemeEntry::new(theme.id, theme.name.clone(), self.resolve_dir(&theme.dir)))
            .collect::<Vec<_>>();
        themes.sort_by_key(|theme| theme.id);
        themes
    }

    pub fn default_theme_dir(&self) -> PathBuf {
        self.themes()
            .into_iter()
            .find(ThemeEntry::is_default)
            .map(|theme| theme.theme_dir)
            .unwrap_or_else(|| self.themes_dir().join("default"))
    }

    pub fn settings_path(&self) -> PathBuf {
        self.board_dir.join(&self.settings_file)
    }

    pub fn path_context(&self, staging_dir: &Path) -> PathContext {
        let theme_dir = self.default_theme_dir();
        PathContext::new()
            .with_variable(BOARD_DIR, &self.board_dir)
            .with_variable(SOURCE_DIR, self.source_dir())
            .with_variable(THEMES_DIR, self.themes_dir())
            .with_variable(IMAGES_DIR, theme_dir.join("images"))
            .with_variable(LANGUAGE_DIR, theme_dir.join("languages"))
            .with_variable(THEME_DIR, theme_dir)
            .with_variable(PACKAGE_DIR, staging_dir)
    }
}
