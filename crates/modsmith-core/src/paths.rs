use std::path::{Path, PathBuf};

pub const BOARD_DIR: &str = "boarddir";
pub const SOURCE_DIR: &str = "sourcedir";
pub const THEME_DIR: &str = "themedir";
pub const THEMES_DIR: &str = "themes_dir";
pub const IMAGES_DIR: &str = "imagesdir";
pub const LANGUAGE_DIR: &str = "languagedir";
pub const PACKAGE_DIR: &str = "package";

/// Expands `$variable` prefixes in manifest paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathContext {
    variables: Vec<(String, PathBuf)>,
}

impl PathContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.set(name, path);
        self
    }

    pub fn set(&mut self, name: &str, path: impl Into<PathBuf>) {
        let path = path.into();
        match self.variables.iter_mut().find(|(existing, _)| existing == name) {
            Some(entry) => entry.1 = path,
            None => self.variables.push((name.to_string(), path)),
        }
        self.variables
            .sort_by(|left, right| right.0.len().cmp(&left.0.len()).then(left.0.cmp(&right.0)));
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.variables
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, path)| path.as_path())
    }

    pub fn board_dir(&self) -> Option<&Path> {
        self.get(BOARD_DIR)
    }

    pub fn resolve(&self, raw: &str) -> PathBuf {
        let raw = raw.trim();
        let Some(stripped) = raw.strip_prefix('$') else {
            return PathBuf::from(raw);
        };

        for (name, base) in &self.variables {
            let Some(rest) = stripped.strip_prefix(name.as_str()) else {
                continue;
            };
            if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\')) {
                continue;
            }
            let rest = rest.trim_start_matches(['/', '\\']);
            if rest.is_empty() {
                return base.clone();
            }
            return base.join(rest);
        }

        PathBuf::from(raw)
    }

    pub fn display_relative(&self, path: &Path) -> String {
        if let Some(board_dir) = self.board_dir() {
            if let Ok(relative) = path.strip_prefix(board_dir) {
                if relative.as_os_str().is_empty() {
                    return ".".to_string();
                }
                return format!("./{}", relative.display());
            }
        }
        path.display().to_string()
    }
}
