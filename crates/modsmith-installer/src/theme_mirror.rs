use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use modsmith_core::{custom_themes, default_theme, Action, ActionKind, ThemeAction, ThemeEntry};
use tracing::debug;

use crate::types::NO_CUSTOM_THEME;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTarget {
    pub theme_id: u32,
    pub path: PathBuf,
}

/// Default-theme edit targets mapped to the custom-theme copies of the same
/// relative file. Built before any mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateChangeIndex {
    entries: BTreeMap<PathBuf, Vec<MirrorTarget>>,
}

impl TemplateChangeIndex {
    pub fn build<'a>(targets: impl IntoIterator<Item = &'a Path>, themes: &[ThemeEntry]) -> Self {
        let mut entries = BTreeMap::new();
        let Some(default) = default_theme(themes) else {
            return Self { entries };
        };

        for target in targets {
            if entries.contains_key(target) {
                continue;
            }
            let Ok(relative) = target.strip_prefix(&default.theme_dir) else {
                continue;
            };
            let mirrors = custom_themes(themes)
                .map(|theme| MirrorTarget {
                    theme_id: theme.id,
                    path: theme.theme_dir.join(relative),
                })
                .filter(|mirror| mirror.path.is_file())
                .collect::<Vec<_>>();
            if mirrors.is_empty() {
                continue;
            }
            debug!(
                target = %target.display(),
                mirrors = mirrors.len(),
                "template edit fans out to custom themes"
            );
            entries.insert(target.to_path_buf(), mirrors);
        }

        Self { entries }
    }

    pub fn mirrors_for(&self, target: &Path) -> &[MirrorTarget] {
        self.entries
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Id of the custom theme holding `path`, or [`NO_CUSTOM_THEME`].
pub fn owning_custom_theme(path: &Path, themes: &[ThemeEntry]) -> u32 {
    custom_themes(themes)
        .find(|theme| theme.contains(path))
        .map(|theme| theme.id)
        .unwrap_or(NO_CUSTOM_THEME)
}

/// Custom-theme destinations that should receive the same file-tree action
/// as a `require-*` or `remove-*` under the default theme.
pub fn mirror_tree_action(action: &Action, themes: &[ThemeEntry]) -> Vec<MirrorTarget> {
    let is_require = matches!(action.kind, ActionKind::RequireFile | ActionKind::RequireDir);
    if !(is_require || action.kind.is_removal()) {
        return Vec::new();
    }
    let (Some(destination), Some(default)) = (action.destination.as_deref(), default_theme(themes))
    else {
        return Vec::new();
    };
    let Ok(relative) = destination.strip_prefix(&default.theme_dir) else {
        return Vec::new();
    };

    let mirrored = match action.theme_action() {
        ThemeAction::No => false,
        ThemeAction::Yes => true,
        ThemeAction::Auto => destination.starts_with(default.theme_dir.join("images")),
    };
    if !mirrored {
        return Vec::new();
    }

    custom_themes(themes)
        .map(|theme| MirrorTarget {
            theme_id: theme.id,
            path: theme.theme_dir.join(relative),
        })
        .filter(|mirror| {
            if is_require {
                mirror.path.parent().is_some_and(Path::is_dir)
            } else {
                mirror.path.exists()
            }
        })
        .collect()
}
