mod action;
mod config;
mod document;
mod manifest;
mod paths;
mod theme;

pub use action::{Action, ActionDetail, ActionKind, ThemeAction};
pub use config::{InstallerConfig, ThemeConfig, DEFAULT_CONFIG_FILE};
pub use document::{Document, TomlDocument};
pub use manifest::{InstallMode, PackageManifest};
pub use paths::{
    PathContext, BOARD_DIR, IMAGES_DIR, LANGUAGE_DIR, PACKAGE_DIR, SOURCE_DIR, THEMES_DIR,
    THEME_DIR,
};
pub use theme::{custom_themes, default_theme, ThemeEntry, DEFAULT_THEME_ID};

#[cfg(test)]
mod tests;
