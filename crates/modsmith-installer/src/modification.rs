use std::path::{Path, PathBuf};

use modsmith_core::{Document, PathContext, ThemeEntry};
use tracing::{debug, info, warn};

use crate::error::InstallError;
use crate::fs_utils::{backup_path, copy_file, put_contents, read_contents, settings_backup_path};
use crate::permissions::FilePermissions;
use crate::search::{restore_protected, ErrorPolicy, Position, SearchSpec};
use crate::theme_mirror::{owning_custom_theme, TemplateChangeIndex};
use crate::types::{OperationOutcome, PatchEvent, PatchReport};

/// Target tree and collaborators shared by both patch dialects.
#[derive(Clone, Copy)]
pub struct PatchEnvironment<'a> {
    pub paths: &'a PathContext,
    pub themes: &'a [ThemeEntry],
    pub settings_path: Option<&'a Path>,
    pub make_backups: bool,
    pub permissions: &'a dyn FilePermissions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchOptions {
    pub testing: bool,
    pub undo: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MissingFilePolicy {
    Fatal,
    Skip,
    Ignore,
}

impl MissingFilePolicy {
    fn parse(input: Option<String>) -> Self {
        match input.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("skip") => Self::Skip,
            Some("ignore") => Self::Ignore,
            _ => Self::Fatal,
        }
    }
}

/// Applies a modification document, one `file` block at a time.
pub fn apply_modification<D: Document>(
    document: &D,
    env: &PatchEnvironment<'_>,
    options: PatchOptions,
) -> PatchReport {
    let mut report = PatchReport::default();

    let blocks = document.children("", "file");
    if blocks.is_empty() {
        report.everything_found = false;
        report.push(PatchEvent::Error {
            path: None,
            theme_id: 0,
            error: InstallError::MalformedPatch("modification has no file blocks".to_string()),
        });
        return report;
    }

    let targets = blocks
        .iter()
        .map(|block| block.fetch("@name").map(|name| env.paths.resolve(&name)))
        .collect::<Vec<_>>();
    let index = TemplateChangeIndex::build(targets.iter().flatten().map(PathBuf::as_path), env.themes);

    for (position, (block, target)) in blocks.iter().zip(&targets).enumerate() {
        let Some(target) = target else {
            report.everything_found = false;
            report.push(PatchEvent::Error {
                path: None,
                theme_id: 0,
                error: InstallError::MalformedPatch(format!(
                    "file block #{} has no name",
                    position + 1
                )),
            });
            continue;
        };

        let mut variants = vec![(target.clone(), owning_custom_theme(target, env.themes))];
        variants.extend(
            index
                .mirrors_for(target)
                .iter()
                .map(|mirror| (mirror.path.clone(), mirror.theme_id)),
        );

        for (path, theme_id) in variants {
            apply_file_block(block, &path, theme_id, env, options, &mut report);
        }
    }

    report
}

fn apply_file_block<D: Document>(
    block: &D,
    path: &Path,
    theme_id: u32,
    env: &PatchEnvironment<'_>,
    options: PatchOptions,
    report: &mut PatchReport,
) {
    let existed = path.is_file();
    let mut working = if existed {
        match read_contents(path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot read modification target");
                report.everything_found = false;
                report.push(PatchEvent::Missing {
                    path: path.to_path_buf(),
                    theme_id,
                });
                return;
            }
        }
    } else {
        match MissingFilePolicy::parse(block.fetch("@error")) {
            MissingFilePolicy::Skip => {
                report.push(PatchEvent::Skipped {
                    path: path.to_path_buf(),
                    theme_id,
                });
                return;
            }
            MissingFilePolicy::Ignore => String::new(),
            MissingFilePolicy::Fatal => {
                report.everything_found = false;
                report.push(PatchEvent::Missing {
                    path: path.to_path_buf(),
                    theme_id,
                });
                return;
            }
        }
    };

    debug!(path = %path.display(), theme_id, undo = options.undo, "opened modification target");
    report.push(PatchEvent::Opened {
        path: path.to_path_buf(),
        theme_id,
    });

    let mut block_failed = false;
    for operation in block.children(".", "operation") {
        let policy = operation
            .fetch("@error")
            .map(|value| ErrorPolicy::parse(&value))
            .unwrap_or_default();
        let add = operation.fetch_or_default("add");
        let specs = ordered_specs(&operation, &add, options.undo);

        for (original, spec) in specs {
            let spec = match spec {
                Ok(spec) => spec,
                Err(error) => {
                    if policy == ErrorPolicy::Fatal {
                        block_failed = true;
                        report.everything_found = false;
                        report.push(PatchEvent::Failure {
                            path: path.to_path_buf(),
                            theme_id,
                            outcome: OperationOutcome::failed(
                                &original.search,
                                &original.add,
                                original.position,
                                error,
                            ),
                        });
                    }
                    continue;
                }
            };
            if spec.is_noop() {
                continue;
            }

            let outcome = apply_search(&spec, &original, policy, &mut working);
            if outcome.counts_as_failure() {
                block_failed = true;
                report.everything_found = false;
                report.push(PatchEvent::Failure {
                    path: path.to_path_buf(),
                    theme_id,
                    outcome,
                });
            } else {
                report.push(PatchEvent::Replace {
                    path: path.to_path_buf(),
                    theme_id,
                    outcome,
                });
            }
        }
    }

    if block_failed {
        debug!(path = %path.display(), "modification target left untouched after failures");
        return;
    }

    let working = restore_protected(&working);
    save_working_file(path, theme_id, &working, existed, env, options, report);
}

/// Search specs of one operation paired with the spec they were derived
/// from, `replace` searches first.
fn ordered_specs<D: Document>(
    operation: &D,
    add: &str,
    undo: bool,
) -> Vec<(SearchSpec, Result<SearchSpec, InstallError>)> {
    let mut specs = operation
        .children(".", "search")
        .iter()
        .map(|node| {
            let original = SearchSpec::from_node(node, add);
            let effective = if undo {
                original.reversed()
            } else {
                Ok(original.clone())
            };
            (original, effective)
        })
        .collect::<Vec<_>>();

    specs.sort_by_key(|(_, effective)| {
        !matches!(effective, Ok(spec) if spec.position == Position::Replace)
    });
    specs
}

fn apply_search(
    spec: &SearchSpec,
    original: &SearchSpec,
    policy: ErrorPolicy,
    working: &mut String,
) -> OperationOutcome {
    let display_search = &original.search;
    let display_add = &original.add;

    let compiled = match spec.compile() {
        Ok(compiled) => compiled,
        Err(error) => {
            let mut outcome =
                OperationOutcome::failed(display_search, display_add, original.position, error);
            outcome.ignore_failure = policy == ErrorPolicy::Ignore;
            return outcome;
        }
    };

    let found = compiled.is_found(working);
    match policy {
        ErrorPolicy::Fatal if !found => OperationOutcome::failed(
            display_search,
            display_add,
            original.position,
            InstallError::NotFound {
                search: spec.search.clone(),
            },
        ),
        ErrorPolicy::Required if found => OperationOutcome::failed(
            display_search,
            display_add,
            original.position,
            InstallError::AlreadyPresent {
                search: spec.search.clone(),
            },
        ),
        ErrorPolicy::Ignore if !found => {
            let mut outcome = OperationOutcome::failed(
                display_search,
                display_add,
                original.position,
                InstallError::NotFound {
                    search: spec.search.clone(),
                },
            );
            outcome.ignore_failure = true;
            outcome
        }
        _ => {
            if found {
                *working = compiled.apply_once(working);
            }
            OperationOutcome::succeeded(display_search, display_add, original.position)
        }
    }
}

/// Writes a patched file back, or records what would happen when testing.
pub(crate) fn save_working_file(
    path: &Path,
    theme_id: u32,
    contents: &str,
    existed: bool,
    env: &PatchEnvironment<'_>,
    options: PatchOptions,
    report: &mut PatchReport,
) {
    if env
        .settings_path
        .is_some_and(|settings| path == settings_backup_path(settings))
    {
        report.push(PatchEvent::Skipped {
            path: path.to_path_buf(),
            theme_id,
        });
        return;
    }

    let writable = if options.testing {
        env.permissions.is_writable(path)
    } else {
        env.permissions.ensure_writable(path)
    };
    if !writable {
        report.push(PatchEvent::ChmodNeeded {
            path: path.to_path_buf(),
            theme_id,
        });
        if !options.testing {
            report.everything_found = false;
            report.push(PatchEvent::Error {
                path: Some(path.to_path_buf()),
                theme_id,
                error: InstallError::PermissionDenied(path.to_path_buf()),
            });
            return;
        }
    }

    if !options.testing {
        if env.make_backups && existed {
            let backup = backup_path(path, env.settings_path);
            if let Err(err) = copy_file(path, &backup) {
                warn!(path = %path.display(), error = %err, "failed to write backup copy");
            }
        }
        if let Err(err) = put_contents(path, contents, options.testing) {
            warn!(path = %path.display(), error = %err, "failed to save modification target");
            report.everything_found = false;
            report.push(PatchEvent::Error {
                path: Some(path.to_path_buf()),
                theme_id,
                error: InstallError::PermissionDenied(path.to_path_buf()),
            });
            return;
        }
        info!(path = %path.display(), theme_id, "saved modification target");
    }

    report.push(PatchEvent::Saved {
        path: path.to_path_buf(),
        theme_id,
    });
}
