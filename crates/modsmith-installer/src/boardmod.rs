use std::path::PathBuf;

use modsmith_core::{default_theme, SOURCE_DIR};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::InstallError;
use crate::fs_utils::read_contents;
use crate::modification::{save_working_file, PatchEnvironment, PatchOptions};
use crate::search::Position;
use crate::theme_mirror::{owning_custom_theme, TemplateChangeIndex};
use crate::types::{OperationOutcome, PatchEvent, PatchReport};

const TAG_PATTERN: &str = r"(?i)<(edit file|file|search for|search|add after|add before|add above|add|replace|above|before|after)>\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    File,
    Search,
    InsertBefore,
    InsertAfter,
    Replace,
}

impl TokenKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "file" | "edit file" => Some(Self::File),
            "search" | "search for" => Some(Self::Search),
            "add" | "before" | "add before" | "above" | "add above" => Some(Self::InsertBefore),
            "add after" | "after" => Some(Self::InsertAfter),
            "replace" => Some(Self::Replace),
            _ => None,
        }
    }

    fn position(self) -> Position {
        match self {
            Self::InsertBefore => Position::Before,
            Self::InsertAfter => Position::After,
            _ => Position::Replace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub path: Option<PathBuf>,
    pub theme_id: u32,
}

/// Splits a boardmod stream into tokens. Unterminated tags are reported and
/// scanning resumes after the opening tag.
pub fn tokenize(raw: &str) -> (Vec<Token>, Vec<InstallError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let Ok(opening) = Regex::new(TAG_PATTERN) else {
        errors.push(InstallError::MalformedPatch(
            "boardmod tag pattern failed to compile".to_string(),
        ));
        return (tokens, errors);
    };

    let text = raw.replace('\r', "");
    let lowered = text.to_ascii_lowercase();
    let mut cursor = 0;

    while let Some(captures) = opening.captures_at(&text, cursor) {
        let (Some(whole), Some(tag)) = (captures.get(0), captures.get(1)) else {
            break;
        };
        let tag_name = tag.as_str().to_ascii_lowercase();
        let body_start = whole.end();
        let closing = format!("\n</{tag_name}>");

        let Some(relative_end) = lowered[body_start..].find(&closing) else {
            errors.push(InstallError::MalformedPatch(format!(
                "unterminated <{tag_name}> tag"
            )));
            cursor = body_start;
            continue;
        };
        let body_end = body_start + relative_end;

        if let Some(kind) = TokenKind::from_tag(&tag_name) {
            tokens.push(Token {
                kind,
                text: text[body_start..body_end].to_string(),
                path: None,
                theme_id: 0,
            });
        }
        cursor = body_end + closing.len();
    }

    (tokens, errors)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OpenFile {
    path: PathBuf,
    theme_id: u32,
    contents: String,
    existed: bool,
    failed: bool,
}

/// Parser state of the legacy dialect: the open file and a pending search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct BoardModState {
    file: Option<OpenFile>,
    search: Option<String>,
}

impl BoardModState {
    fn advance(
        mut self,
        token: &Token,
        env: &PatchEnvironment<'_>,
        options: PatchOptions,
        report: &mut PatchReport,
    ) -> Self {
        match token.kind {
            TokenKind::File => {
                self.finish(env, options, report);
                let path = token
                    .path
                    .clone()
                    .unwrap_or_else(|| resolve_target(token.text.trim(), env));
                Self {
                    file: open_file(path, token.theme_id, report),
                    search: None,
                }
            }
            TokenKind::Search => {
                let Some(file) = self.file.as_mut() else {
                    report.everything_found = false;
                    report.push(PatchEvent::Error {
                        path: None,
                        theme_id: token.theme_id,
                        error: InstallError::MalformedPatch(
                            "search before any file".to_string(),
                        ),
                    });
                    return self;
                };
                if self.search.is_some() {
                    file.failed = true;
                    report.everything_found = false;
                    report.push(PatchEvent::Error {
                        path: Some(file.path.clone()),
                        theme_id: file.theme_id,
                        error: InstallError::MalformedPatch(
                            "two searches without a replacement".to_string(),
                        ),
                    });
                }
                self.search = Some(token.text.clone());
                self
            }
            TokenKind::InsertBefore | TokenKind::InsertAfter | TokenKind::Replace => {
                let search = self.search.take();
                let Some(file) = self.file.as_mut() else {
                    report.everything_found = false;
                    report.push(PatchEvent::Error {
                        path: None,
                        theme_id: token.theme_id,
                        error: InstallError::MalformedPatch(
                            "replacement before any file".to_string(),
                        ),
                    });
                    return self;
                };
                let Some(search) = search else {
                    file.failed = true;
                    report.everything_found = false;
                    report.push(PatchEvent::Error {
                        path: Some(file.path.clone()),
                        theme_id: file.theme_id,
                        error: InstallError::MalformedPatch(
                            "replacement without a search".to_string(),
                        ),
                    });
                    return self;
                };
                apply_edit(file, token, &search, options.undo, report);
                self
            }
        }
    }

    fn finish(&mut self, env: &PatchEnvironment<'_>, options: PatchOptions, report: &mut PatchReport) {
        let Some(file) = self.file.take() else {
            return;
        };
        if file.failed {
            debug!(path = %file.path.display(), "boardmod target left untouched after failures");
            return;
        }
        save_working_file(
            &file.path,
            file.theme_id,
            &file.contents,
            file.existed,
            env,
            options,
            report,
        );
    }
}

/// Applies a boardmod stream, including the copies it fans out to custom themes.
pub fn apply_boardmod(raw: &str, env: &PatchEnvironment<'_>, options: PatchOptions) -> PatchReport {
    let mut report = PatchReport::default();
    let (mut tokens, errors) = tokenize(raw);
    for error in errors {
        report.everything_found = false;
        report.push(PatchEvent::Error {
            path: None,
            theme_id: 0,
            error,
        });
    }

    if !tokens.iter().any(|token| token.kind == TokenKind::File) {
        report.everything_found = false;
        report.push(PatchEvent::Error {
            path: None,
            theme_id: 0,
            error: InstallError::MalformedPatch("boardmod patch names no files".to_string()),
        });
        return report;
    }

    for token in tokens.iter_mut().filter(|token| token.kind == TokenKind::File) {
        let path = resolve_target(token.text.trim(), env);
        token.theme_id = owning_custom_theme(&path, env.themes);
        token.path = Some(path);
    }
    let mirrored = mirrored_groups(&tokens, env);
    tokens.extend(mirrored);

    let mut state = BoardModState::default();
    for token in &tokens {
        state = state.advance(token, env, options, &mut report);
    }
    state.finish(env, options, &mut report);

    report
}

/// Copies of every file group whose target has custom-theme counterparts.
fn mirrored_groups(tokens: &[Token], env: &PatchEnvironment<'_>) -> Vec<Token> {
    let index = TemplateChangeIndex::build(
        tokens.iter().filter_map(|token| token.path.as_deref()),
        env.themes,
    );
    if index.is_empty() {
        return Vec::new();
    }

    let mut mirrored = Vec::new();
    let mut start = 0;
    while start < tokens.len() {
        let end = tokens[start + 1..]
            .iter()
            .position(|token| token.kind == TokenKind::File)
            .map(|offset| start + 1 + offset)
            .unwrap_or(tokens.len());
        let group = &tokens[start..end];
        start = end;

        let Some(head) = group.first().filter(|token| token.kind == TokenKind::File) else {
            continue;
        };
        let Some(path) = head.path.as_deref() else {
            continue;
        };
        for mirror in index.mirrors_for(path) {
            mirrored.extend(group.iter().map(|token| {
                let mut copy = token.clone();
                copy.theme_id = mirror.theme_id;
                if copy.kind == TokenKind::File {
                    copy.path = Some(mirror.path.clone());
                }
                copy
            }));
        }
    }
    mirrored
}

fn resolve_target(raw: &str, env: &PatchEnvironment<'_>) -> PathBuf {
    let resolved = env.paths.resolve(raw);
    if resolved.is_absolute() {
        return resolved;
    }

    let Some(board_dir) = env.paths.board_dir() else {
        return resolved;
    };
    warn!(file = raw, "boardmod target is relative; resolving against the board dir");
    let primary = board_dir.join(&resolved);
    if primary.exists() {
        return primary;
    }

    let mut fallbacks = vec![];
    if let Some(source_dir) = env.paths.get(SOURCE_DIR) {
        fallbacks.push(source_dir.to_path_buf());
    }
    if let Some(theme) = default_theme(env.themes) {
        fallbacks.push(theme.theme_dir.clone());
        fallbacks.push(theme.theme_dir.join("languages"));
    }
    fallbacks
        .into_iter()
        .map(|base| base.join(&resolved))
        .find(|candidate| candidate.exists())
        .unwrap_or(primary)
}

fn open_file(path: PathBuf, theme_id: u32, report: &mut PatchReport) -> Option<OpenFile> {
    if !path.is_file() {
        report.everything_found = false;
        report.push(PatchEvent::Missing { path, theme_id });
        return None;
    }
    match read_contents(&path) {
        Ok(contents) => {
            report.push(PatchEvent::Opened {
                path: path.clone(),
                theme_id,
            });
            Some(OpenFile {
                path,
                theme_id,
                contents,
                existed: true,
                failed: false,
            })
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cannot read boardmod target");
            report.everything_found = false;
            report.push(PatchEvent::Missing { path, theme_id });
            None
        }
    }
}

fn apply_edit(file: &mut OpenFile, token: &Token, search: &str, undo: bool, report: &mut PatchReport) {
    let replacement = match token.kind {
        TokenKind::InsertBefore => format!("{}\n{search}", token.text),
        TokenKind::InsertAfter => format!("{search}\n{}", token.text),
        _ => token.text.clone(),
    };
    let (needle, replacement) = if undo {
        (replacement, search.to_string())
    } else {
        (search.to_string(), replacement)
    };
    let position = token.kind.position();

    if needle.is_empty() || !file.contents.contains(&needle) {
        file.failed = true;
        report.everything_found = false;
        report.push(PatchEvent::Failure {
            path: file.path.clone(),
            theme_id: file.theme_id,
            outcome: OperationOutcome::failed(
                search,
                &token.text,
                position,
                InstallError::NotFound { search: needle },
            ),
        });
        return;
    }

    file.contents = file.contents.replace(&needle, &replacement);
    report.push(PatchEvent::Replace {
        path: file.path.clone(),
        theme_id: file.theme_id,
        outcome: OperationOutcome::succeeded(search, &token.text, position),
    });
}
