use anyhow::{Context, Result};
use toml::Value;

/// Read-only view over a hierarchical document.
///
/// Paths are `/`-separated. A segment starting with `@` addresses an attribute
/// of the current node, and `.` (or an empty path) addresses the node itself.
/// Repeated nodes resolve to their first occurrence for `exists` and `fetch`.
pub trait Document: Sized {
    fn exists(&self, path: &str) -> bool;

    fn fetch(&self, path: &str) -> Option<String>;

    fn children(&self, path: &str, tag: &str) -> Vec<Self>;

    fn fetch_or_default(&self, path: &str) -> String {
        self.fetch(path).unwrap_or_default()
    }

    fn flag(&self, path: &str) -> bool {
        matches!(
            self.fetch(path)
                .map(|value| value.trim().to_ascii_lowercase())
                .as_deref(),
            Some("true" | "yes" | "1")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TomlDocument {
    value: Value,
}

impl TomlDocument {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(input).context("failed to parse toml document")?;
        Ok(Self {
            value: Value::Table(table),
        })
    }

    pub fn from_value(value: Value) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    fn resolve(&self, path: &str) -> Option<&Value> {
        let mut current = &self.value;
        for segment in path
            .split('/')
            .map(str::trim)
            .filter(|segment| !segment.is_empty() && *segment != ".")
        {
            let key = segment.strip_prefix('@').unwrap_or(segment);
            current = match current.as_table()?.get(key)? {
                Value::Array(items) => items.first()?,
                other => other,
            };
        }
        Some(current)
    }
}

impl Document for TomlDocument {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    fn fetch(&self, path: &str) -> Option<String> {
        self.resolve(path).and_then(node_text)
    }

    fn children(&self, path: &str, tag: &str) -> Vec<Self> {
        let Some(table) = self.resolve(path).and_then(Value::as_table) else {
            return Vec::new();
        };
        match table.get(tag) {
            Some(Value::Array(items)) => items.iter().cloned().map(Self::from_value).collect(),
            Some(value) => vec![Self::from_value(value.clone())],
            None => Vec::new(),
        }
    }
}

fn node_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Integer(number) => Some(number.to_string()),
        Value::Float(number) => Some(number.to_string()),
        Value::Boolean(flag) => Some(flag.to_string()),
        Value::Datetime(datetime) => Some(datetime.to_string()),
        Value::Table(table) => table.get("text").and_then(node_text),
        Value::Array(items) => items.first().and_then(node_text),
    }
}
