use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::layout::StateLayout;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub version: u32,
    pub run_id: String,
    pub package_id: String,
    pub mode: String,
    pub status: String,
    pub started_at_unix: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunJournalEntry {
    pub seq: u64,
    pub action: String,
    pub target: String,
    pub status: String,
}

/// Claims the exclusive run marker. Fails while another run holds it.
pub fn claim_active_run(layout: &StateLayout, run_id: &str) -> Result<PathBuf> {
    let path = layout.run_active_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
    {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            let existing = read_active_run(layout).ok().flatten();
            let detail = existing
                .map(|existing_id| format!(" (run_id={existing_id})"))
                .unwrap_or_default();
            return Err(anyhow!("another installation run is active{detail}"));
        }
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to claim active run file: {}", path.display())
            });
        }
    };

    file.write_all(format!("{run_id}\n").as_bytes())
        .with_context(|| format!("failed to write active run file: {}", path.display()))?;
    file.flush()
        .with_context(|| format!("failed to flush active run file: {}", path.display()))?;

    Ok(path)
}

pub fn read_active_run(layout: &StateLayout) -> Result<Option<String>> {
    let path = layout.run_active_path();
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read active run file: {}", path.display()));
        }
    };

    let run_id = raw.trim();
    if run_id.is_empty() {
        return Ok(None);
    }
    Ok(Some(run_id.to_string()))
}

pub fn clear_active_run(layout: &StateLayout) -> Result<()> {
    let path = layout.run_active_path();
    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("failed to clear active run file: {}", path.display()))?;
    }
    Ok(())
}

pub fn write_run_metadata(layout: &StateLayout, metadata: &RunMetadata) -> Result<PathBuf> {
    let path = layout.run_metadata_path(&metadata.run_id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let payload =
        serde_json::to_string_pretty(metadata).context("failed to encode run metadata")?;
    fs::write(&path, payload)
        .with_context(|| format!("failed to write run metadata file: {}", path.display()))?;
    Ok(path)
}

pub fn read_run_metadata(layout: &StateLayout, run_id: &str) -> Result<Option<RunMetadata>> {
    let path = layout.run_metadata_path(run_id);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read run metadata file: {}", path.display()));
        }
    };
    let metadata = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing run metadata file: {}", path.display()))?;
    Ok(Some(metadata))
}

pub fn update_run_status(layout: &StateLayout, run_id: &str, status: &str) -> Result<()> {
    let mut metadata = read_run_metadata(layout, run_id)?
        .ok_or_else(|| anyhow!("run metadata not found for '{run_id}'"))?;
    metadata.status = status.to_string();
    write_run_metadata(layout, &metadata)?;
    Ok(())
}

pub fn append_run_journal_entry(
    layout: &StateLayout,
    run_id: &str,
    entry: &RunJournalEntry,
) -> Result<PathBuf> {
    let path = layout.run_journal_path(run_id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut line = serde_json::to_string(entry).context("failed to encode run journal entry")?;
    line.push('\n');
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open run journal: {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("failed to append run journal: {}", path.display()))?;
    file.flush()
        .with_context(|| format!("failed to flush run journal: {}", path.display()))?;
    Ok(path)
}

pub fn read_run_journal(layout: &StateLayout, run_id: &str) -> Result<Vec<RunJournalEntry>> {
    let path = layout.run_journal_path(run_id);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read run journal: {}", path.display()));
        }
    };
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .with_context(|| format!("invalid run journal line in {}", path.display()))
        })
        .collect()
}

pub fn current_unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_secs())
}
