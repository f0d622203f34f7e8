use modsmith_core::Document;
use regex::Regex;
use serde::Serialize;

use crate::error::InstallError;

const PROTECTED_DOLLAR: char = '\u{E000}';
const PROTECTED_BACKSLASH: char = '\u{E001}';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Before,
    After,
    #[default]
    Replace,
    End,
}

impl Position {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
            Self::Replace => "replace",
            Self::End => "end",
        }
    }

    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "before" => Self::Before,
            "after" => Self::After,
            "end" => Self::End,
            _ => Self::Replace,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    #[default]
    Fatal,
    Required,
    Ignore,
}

impl ErrorPolicy {
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "required" => Self::Required,
            "ignore" => Self::Ignore,
            _ => Self::Fatal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSpec {
    pub position: Position,
    pub is_regex: bool,
    pub loose_whitespace: bool,
    pub search: String,
    pub add: String,
}

impl SearchSpec {
    pub fn literal(position: Position, search: impl Into<String>, add: impl Into<String>) -> Self {
        let search = search.into();
        Self {
            position,
            is_regex: false,
            loose_whitespace: false,
            search: if position == Position::End {
                String::new()
            } else {
                search
            },
            add: add.into(),
        }
    }

    /// Reads one `search` node. A bare string node is a `replace` search.
    pub fn from_node<D: Document>(node: &D, add: &str) -> Self {
        let position = node
            .fetch("@position")
            .map(|value| Position::parse(&value))
            .unwrap_or_default();
        let mut spec = Self::literal(position, node.fetch_or_default("."), add);
        spec.is_regex = node.flag("@regexp");
        spec.loose_whitespace = node
            .fetch("@whitespace")
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("loose"));
        spec
    }

    /// Derives the spec that removes what this one added.
    pub fn reversed(&self) -> Result<Self, InstallError> {
        if self.is_regex {
            return Err(InstallError::MalformedPatch(format!(
                "regular expression search cannot be undone: {}",
                self.search
            )));
        }

        let (position, search, add) = match self.position {
            Position::Replace => (Position::Replace, self.add.clone(), self.search.clone()),
            Position::Before => (
                Position::Replace,
                format!("{}{}", self.add, self.search),
                self.search.clone(),
            ),
            Position::After => (
                Position::Replace,
                format!("{}{}", self.search, self.add),
                self.search.clone(),
            ),
            // An undone append drops the appended text at the end of the file.
            Position::End => (Position::End, self.add.clone(), String::new()),
        };

        Ok(Self {
            position,
            is_regex: false,
            loose_whitespace: self.loose_whitespace,
            search,
            add,
        })
    }

    /// Empty payloads are dropped, except for an undone append. Only an
    /// append may run with an empty search.
    pub fn is_noop(&self) -> bool {
        if self.position == Position::End {
            return self.add.is_empty() && self.search.is_empty();
        }
        self.add.is_empty() || self.search.is_empty()
    }

    pub fn compile(&self) -> Result<CompiledSearch, InstallError> {
        let add = protect_replacement(&self.add);

        let (pattern, replacement) = match self.position {
            Position::End if self.search.is_empty() => {
                (r"(\n\?>)?(\n)?\z".to_string(), format!("{add}${{1}}${{2}}"))
            }
            Position::End => (
                format!(r"{}(\n\?>)?(\n)?\z", escape_literal(&self.search)),
                "${1}${2}".to_string(),
            ),
            Position::Replace => (self.search_pattern(), add),
            Position::Before => (format!("({})", self.search_pattern()), format!("{add}${{1}}")),
            Position::After => (format!("({})", self.search_pattern()), format!("${{1}}{add}")),
        };

        let pattern = Regex::new(&format!("(?s){pattern}")).map_err(|err| {
            InstallError::MalformedPatch(format!("invalid search pattern '{}': {err}", self.search))
        })?;
        Ok(CompiledSearch {
            pattern,
            replacement,
        })
    }

    fn search_pattern(&self) -> String {
        if self.is_regex {
            return self.search.clone();
        }
        let escaped = escape_literal(&self.search);
        if self.loose_whitespace {
            loosen_whitespace(&escaped)
        } else {
            escaped
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledSearch {
    pattern: Regex,
    replacement: String,
}

impl CompiledSearch {
    pub fn is_found(&self, haystack: &str) -> bool {
        self.pattern.is_match(haystack)
    }

    /// Substitutes the first match only.
    pub fn apply_once(&self, haystack: &str) -> String {
        self.pattern
            .replacen(haystack, 1, self.replacement.as_str())
            .into_owned()
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }
}

pub fn escape_literal(text: &str) -> String {
    regex::escape(text)
}

/// Turns every run of spaces and tabs into `[ \t]+`.
pub fn loosen_whitespace(pattern: &str) -> String {
    let mut loosened = String::with_capacity(pattern.len());
    let mut in_run = false;
    for ch in pattern.chars() {
        if ch == ' ' || ch == '\t' {
            if !in_run {
                loosened.push_str(r"[ \t]+");
                in_run = true;
            }
            continue;
        }
        in_run = false;
        loosened.push(ch);
    }
    loosened
}

/// Hides `$` and `\` from the substitution engine until the file is final.
pub fn protect_replacement(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '$' => PROTECTED_DOLLAR,
            '\\' => PROTECTED_BACKSLASH,
            other => other,
        })
        .collect()
}

pub fn restore_protected(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            PROTECTED_DOLLAR => '$',
            PROTECTED_BACKSLASH => '\\',
            other => other,
        })
        .collect()
}
