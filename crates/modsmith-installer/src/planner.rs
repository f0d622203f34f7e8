use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use modsmith_core::{
    Action, ActionDetail, ActionKind, Document, InstallMode, PackageManifest, PathContext,
    ThemeAction, TomlDocument,
};
use modsmith_resolver::matches;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::fs_utils::first_existing_ancestor;
use crate::permissions::FilePermissions;

#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub mode: InstallMode,
    pub product_version: &'a str,
    pub previous_version: Option<&'a str>,
    pub staging_dir: &'a Path,
}

/// First method block applicable to the product (and, for upgrades, to the
/// previously installed version).
pub fn select_method_block(
    manifest: &PackageManifest,
    request: &PlanRequest<'_>,
) -> Option<TomlDocument> {
    manifest.method_blocks(request.mode).into_iter().find(|block| {
        if let Some(expression) = block.fetch("@for") {
            if !matches(request.product_version, &expression) {
                return false;
            }
        }
        if request.mode == InstallMode::Upgrade {
            if let Some(expression) = block.fetch("@from") {
                return request
                    .previous_version
                    .is_some_and(|previous| matches(previous, &expression));
            }
        }
        true
    })
}

/// Expands the applicable method block into the ordered action list.
///
/// Nothing in the target tree is modified. Inline payloads are written to the
/// staging dir, and writability problems become leading `chmod` actions.
pub fn plan_actions(
    manifest: &PackageManifest,
    request: &PlanRequest<'_>,
    paths: &PathContext,
    permissions: &dyn FilePermissions,
) -> Result<Vec<Action>> {
    let block = select_method_block(manifest, request).ok_or_else(|| {
        anyhow!(
            "package '{}' has no {} instructions for product version {}",
            manifest.id,
            request.mode,
            request.product_version
        )
    })?;

    let mut planner = Planner {
        paths,
        staging_dir: request.staging_dir,
        inline_counter: 0,
    };
    let mut actions = Vec::new();
    let mut chmods: Vec<PathBuf> = Vec::new();

    for node in block.children(".", "action") {
        let action = planner.plan_node(&node)?;
        if adds_content(action.kind) {
            if let Some(path) = writability_problem(&action, permissions) {
                if !chmods.contains(&path) {
                    debug!(path = %path.display(), "planned chmod for unwritable path");
                    chmods.push(path);
                }
            }
        }
        actions.push(action);
    }

    info!(
        package = %manifest.id,
        mode = %request.mode,
        actions = actions.len(),
        chmods = chmods.len(),
        "planned package actions"
    );

    let mut planned = chmods
        .iter()
        .map(|path| Action::chmod(path))
        .collect::<Vec<_>>();
    planned.extend(actions);
    Ok(planned)
}

/// SHA-256 over the canonical JSON of an action list.
pub fn plan_fingerprint(actions: &[Action]) -> Result<String> {
    let canonical = serde_json::to_vec(actions).context("failed to encode action plan")?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

struct Planner<'a> {
    paths: &'a PathContext,
    staging_dir: &'a Path,
    inline_counter: usize,
}

impl Planner<'_> {
    fn plan_node(&mut self, node: &TomlDocument) -> Result<Action> {
        let tag = node.fetch_or_default("@kind");
        let Some(kind) = ActionKind::parse(&tag) else {
            return Ok(Action::unknown(&tag));
        };

        let mut action = Action::new(kind, "");
        action.description = node.fetch_or_default("@description");

        match kind {
            ActionKind::Readme | ActionKind::License => {
                self.attach_payload(&mut action, node, "txt")?;
                action.detail = ActionDetail::Document {
                    language: node.fetch("@lang").filter(|lang| !lang.trim().is_empty()),
                    parse_bbc: node.flag("@parsebbc"),
                };
            }
            ActionKind::Redirect => {
                self.attach_payload(&mut action, node, "txt")?;
                action.detail = ActionDetail::Redirect {
                    url: node.fetch_or_default("@url"),
                    timeout: node
                        .fetch("@timeout")
                        .and_then(|value| value.trim().parse().ok()),
                };
            }
            ActionKind::Code | ActionKind::Database => {
                self.attach_payload(&mut action, node, "php")?;
            }
            ActionKind::Modification => {
                action.is_boardmod = node
                    .fetch("@format")
                    .is_some_and(|format| format.trim().eq_ignore_ascii_case("boardmod"));
                action.reverse = node.flag("@reverse");
                let extension = if action.is_boardmod { "mod" } else { "toml" };
                self.attach_payload(&mut action, node, extension)?;
            }
            ActionKind::Hook => {
                let hook = node.fetch_or_default("@hook");
                action.filename = hook.clone();
                action.reverse = node.flag("@reverse");
                action.detail = ActionDetail::Hook {
                    hook,
                    function: node.fetch_or_default("@function"),
                    include_file: node.fetch_or_default("@file"),
                    object: node.flag("@object"),
                };
            }
            ActionKind::Credits => {
                action.detail = ActionDetail::Credits {
                    title: node.fetch_or_default("."),
                    url: normalize_credits_url(&node.fetch_or_default("@url")),
                    license: node.fetch_or_default("@license"),
                    license_url: node.fetch_or_default("@licenseurl"),
                    copyright: node.fetch_or_default("@copyright"),
                };
            }
            ActionKind::Requires => {
                let id = node.fetch_or_default("@id").trim().to_string();
                action.filename = id.clone();
                action.detail = ActionDetail::Requires {
                    id,
                    version: node
                        .fetch("@version")
                        .filter(|version| !version.trim().is_empty()),
                };
            }
            ActionKind::CreateFile | ActionKind::CreateDir => {
                let name = node.fetch_or_default("@name");
                action.destination = Some(self.paths.resolve(&node.fetch_or_default("@destination")).join(&name));
                action.filename = name;
            }
            ActionKind::RequireFile | ActionKind::RequireDir => {
                let name = node.fetch_or_default("@name");
                action.source = Some(match node.fetch("@from") {
                    Some(from) => self.paths.resolve(&from),
                    None => self.staging_path(&name),
                });
                let base_name = Path::new(&name)
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_default();
                action.destination =
                    Some(self.paths.resolve(&node.fetch_or_default("@destination")).join(base_name));
                action.filename = name;
                action.detail = ActionDetail::Tree {
                    theme_action: node
                        .fetch("@theme")
                        .map(|value| ThemeAction::parse(&value))
                        .unwrap_or_default(),
                };
            }
            ActionKind::MoveFile | ActionKind::MoveDir => {
                let from = node.fetch_or_default("@from");
                action.source = Some(self.paths.resolve(&from));
                action.destination = Some(self.paths.resolve(&node.fetch_or_default("@destination")));
                action.filename = node.fetch("@name").unwrap_or(from);
            }
            ActionKind::RemoveFile | ActionKind::RemoveDir => {
                let name = node.fetch_or_default("@name");
                action.destination = Some(self.paths.resolve(&name));
                action.filename = name;
                action.detail = ActionDetail::Tree {
                    theme_action: node
                        .fetch("@theme")
                        .map(|value| ThemeAction::parse(&value))
                        .unwrap_or_default(),
                };
            }
            ActionKind::Error | ActionKind::Chmod => return Ok(Action::unknown(&tag)),
        }

        if kind.is_file_tree() && action.filename.trim().is_empty() {
            return Ok(Action::unknown(&format!("{tag} (missing name)")));
        }

        Ok(action)
    }

    /// Points the action at its payload, writing inline text to the staging dir.
    fn attach_payload(&mut self, action: &mut Action, node: &TomlDocument, extension: &str) -> Result<()> {
        let text = node.fetch_or_default(".");
        if !node.flag("@inline") {
            action.filename = text.trim().to_string();
            action.source = Some(self.staging_path(&action.filename));
            return Ok(());
        }

        let filename = format!("$auto_{}.{extension}", self.inline_counter);
        self.inline_counter += 1;
        let path = self.staging_dir.join(&filename);
        fs::create_dir_all(self.staging_dir)
            .with_context(|| format!("failed to create {}", self.staging_dir.display()))?;
        fs::write(&path, text.as_bytes())
            .with_context(|| format!("failed to write inline payload: {}", path.display()))?;

        action.filename = filename;
        action.source = Some(path);
        Ok(())
    }

    fn staging_path(&self, name: &str) -> PathBuf {
        if name.trim_start().starts_with('$') {
            return self.paths.resolve(name);
        }
        self.staging_dir.join(name.trim().trim_start_matches(['/', '\\']))
    }
}

fn adds_content(kind: ActionKind) -> bool {
    matches!(
        kind,
        ActionKind::CreateFile
            | ActionKind::CreateDir
            | ActionKind::RequireFile
            | ActionKind::RequireDir
            | ActionKind::MoveFile
            | ActionKind::MoveDir
    )
}

fn writability_problem(action: &Action, permissions: &dyn FilePermissions) -> Option<PathBuf> {
    let destination = action.destination.as_deref()?;
    let probe = if destination.exists() {
        destination.to_path_buf()
    } else {
        first_existing_ancestor(destination)?
    };
    (!permissions.is_writable(&probe)).then_some(probe)
}

fn normalize_credits_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url.contains("://") {
        return url.to_string();
    }
    format!("http://{url}")
}
