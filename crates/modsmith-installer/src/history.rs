use std::fs;
use std::io;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use crate::layout::StateLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallState {
    Installed,
    Uninstalled,
}

impl InstallState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Uninstalled => "uninstalled",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "installed" => Ok(Self::Installed),
            "uninstalled" => Ok(Self::Uninstalled),
            other => Err(anyhow!("unknown install_state '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub package_id: String,
    pub name: String,
    pub version: String,
    pub themes_installed: Vec<u32>,
    pub db_changes: Vec<String>,
    pub state: InstallState,
    pub installed_at_unix: u64,
}

/// Record of packages applied to the target tree. Last write wins.
pub trait PackageHistory {
    fn lookup(&self, package_id: &str) -> Result<Option<HistoryEntry>>;

    fn record(&self, entry: &HistoryEntry) -> Result<()>;
}

/// File-backed history: one `key=value` receipt per package id.
#[derive(Debug, Clone)]
pub struct ReceiptHistory {
    layout: StateLayout,
}

impl ReceiptHistory {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    /// Every stored entry, uninstalled ones included, sorted by id.
    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        let dir = self.layout.installed_state_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("failed to read history directory: {}", dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_file()
                || path.extension().and_then(|v| v.to_str()) != Some("receipt")
            {
                continue;
            }
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read receipt: {}", path.display()))?;
            entries.push(
                parse_receipt(&raw)
                    .with_context(|| format!("failed to parse receipt: {}", path.display()))?,
            );
        }

        entries.sort_by(|a, b| a.package_id.cmp(&b.package_id));
        Ok(entries)
    }

    fn read_entry(&self, package_id: &str) -> Result<Option<HistoryEntry>> {
        let path = self.layout.receipt_path(package_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read receipt: {}", path.display()));
            }
        };
        let entry = parse_receipt(&raw)
            .with_context(|| format!("failed to parse receipt: {}", path.display()))?;
        Ok(Some(entry))
    }
}

impl PackageHistory for ReceiptHistory {
    fn lookup(&self, package_id: &str) -> Result<Option<HistoryEntry>> {
        Ok(self
            .read_entry(package_id)?
            .filter(|entry| entry.state == InstallState::Installed))
    }

    fn record(&self, entry: &HistoryEntry) -> Result<()> {
        let path = self.layout.receipt_path(&entry.package_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, serialize_receipt(entry).as_bytes())
            .with_context(|| format!("failed to write receipt: {}", path.display()))
    }
}

pub(crate) fn serialize_receipt(entry: &HistoryEntry) -> String {
    let mut payload = String::new();
    payload.push_str(&format!("package_id={}\n", entry.package_id));
    payload.push_str(&format!("name={}\n", entry.name));
    payload.push_str(&format!("version={}\n", entry.version));
    for theme_id in &entry.themes_installed {
        payload.push_str(&format!("theme_installed={theme_id}\n"));
    }
    for change in &entry.db_changes {
        payload.push_str(&format!("db_change={change}\n"));
    }
    payload.push_str(&format!("install_state={}\n", entry.state.as_str()));
    payload.push_str(&format!("installed_at_unix={}\n", entry.installed_at_unix));
    payload
}

pub(crate) fn parse_receipt(raw: &str) -> Result<HistoryEntry> {
    let mut package_id = None;
    let mut name = None;
    let mut version = None;
    let mut themes_installed = Vec::new();
    let mut db_changes = Vec::new();
    let mut state = None;
    let mut installed_at_unix = None;

    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        match k {
            "package_id" => package_id = Some(v.to_string()),
            "name" => name = Some(v.to_string()),
            "version" => version = Some(v.to_string()),
            "theme_installed" => {
                themes_installed.push(v.parse().context("theme_installed must be u32")?)
            }
            "db_change" => db_changes.push(v.to_string()),
            "install_state" => state = Some(InstallState::parse(v)?),
            "installed_at_unix" => {
                installed_at_unix = Some(v.parse().context("installed_at_unix must be u64")?)
            }
            _ => {}
        }
    }

    let package_id: String = package_id.context("missing package_id")?;
    Ok(HistoryEntry {
        name: name.unwrap_or_else(|| package_id.clone()),
        package_id,
        version: version.context("missing version")?,
        themes_installed,
        db_changes,
        state: state.unwrap_or(InstallState::Installed),
        installed_at_unix: installed_at_unix.context("missing installed_at_unix")?,
    })
}
