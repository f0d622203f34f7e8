use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use toml::Value;

use crate::document::{Document, TomlDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    Install,
    Upgrade,
    Uninstall,
}

impl InstallMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Upgrade => "upgrade",
            Self::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for InstallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "install" => Ok(Self::Install),
            "upgrade" => Ok(Self::Upgrade),
            "uninstall" => Ok(Self::Uninstall),
            _ => Err(anyhow!(
                "invalid install mode '{value}'; expected install, upgrade or uninstall"
            )),
        }
    }
}

/// Parsed `package-info.toml`.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub package_type: Option<String>,
    document: TomlDocument,
}

impl PackageManifest {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let document =
            TomlDocument::from_toml_str(input).context("failed to parse package manifest")?;

        let id = document
            .fetch("id")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("package manifest is missing a package id"))?;

        for mode in [InstallMode::Install, InstallMode::Upgrade, InstallMode::Uninstall] {
            validate_method_blocks(&document, mode)
                .with_context(|| format!("invalid '{mode}' section in package '{id}'"))?;
        }

        Ok(Self {
            name: document.fetch("name").unwrap_or_else(|| id.clone()),
            version: document.fetch("version").unwrap_or_default(),
            package_type: document.fetch("type"),
            id,
            document,
        })
    }

    pub fn document(&self) -> &TomlDocument {
        &self.document
    }

    pub fn has_method(&self, mode: InstallMode) -> bool {
        self.document.exists(mode.as_str())
    }

    pub fn method_blocks(&self, mode: InstallMode) -> Vec<TomlDocument> {
        self.document.children("", mode.as_str())
    }
}

fn validate_method_blocks(document: &TomlDocument, mode: InstallMode) -> Result<()> {
    let Some(table) = document.value().as_table() else {
        return Ok(());
    };
    let blocks = match table.get(mode.as_str()) {
        None => return Ok(()),
        Some(Value::Array(blocks)) => blocks.iter().collect::<Vec<_>>(),
        Some(block) => vec![block],
    };

    for (index, block) in blocks.iter().enumerate() {
        let Some(block) = block.as_table() else {
            return Err(anyhow!("block #{} must be a table", index + 1));
        };
        match block.get("action") {
            None => {}
            Some(Value::Array(actions)) => {
                if let Some(position) = actions.iter().position(|action| !action.is_table()) {
                    return Err(anyhow!(
                        "block #{} action #{} must be a table",
                        index + 1,
                        position + 1
                    ));
                }
            }
            Some(Value::Table(_)) => {}
            Some(_) => {
                return Err(anyhow!("block #{} actions must be tables", index + 1));
            }
        }
    }

    Ok(())
}
