use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Installer state on disk: receipts, run markers and package staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn installed_state_dir(&self) -> PathBuf {
        self.root.join("installed")
    }

    pub fn receipt_path(&self, package_id: &str) -> PathBuf {
        self.installed_state_dir()
            .join(format!("{}.receipt", receipt_file_stem(package_id)))
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join("staging")
    }

    pub fn package_staging_path(&self, package_id: &str) -> PathBuf {
        self.staging_dir().join(receipt_file_stem(package_id))
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    pub fn run_active_path(&self) -> PathBuf {
        self.runs_dir().join("active")
    }

    pub fn run_metadata_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(format!("{run_id}.json"))
    }

    pub fn run_journal_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(format!("{run_id}.journal"))
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [
            self.installed_state_dir(),
            self.staging_dir(),
            self.runs_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Package ids like `author:mod` are not valid file names everywhere.
fn receipt_file_stem(package_id: &str) -> String {
    package_id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

pub fn default_state_root() -> Result<PathBuf> {
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows state root")?;
        return Ok(PathBuf::from(app_data).join("Modsmith"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve state root")?;
    Ok(PathBuf::from(home).join(".modsmith"))
}
