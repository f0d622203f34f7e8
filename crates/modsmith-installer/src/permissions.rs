use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::fs_utils::first_existing_ancestor;

/// Capability to probe and repair write access on the target tree.
pub trait FilePermissions {
    fn is_writable(&self, path: &Path) -> bool;

    /// Attempts to make `path` writable, reporting only success.
    fn make_writable(&self, path: &Path) -> bool;

    fn ensure_writable(&self, path: &Path) -> bool {
        self.is_writable(path) || self.make_writable(path)
    }
}

/// Direct filesystem permissions of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPermissions;

impl FilePermissions for LocalPermissions {
    fn is_writable(&self, path: &Path) -> bool {
        let probe = if path.exists() {
            path.to_path_buf()
        } else {
            match first_existing_ancestor(path) {
                Some(ancestor) => ancestor,
                None => return false,
            }
        };
        fs::metadata(&probe)
            .map(|metadata| !metadata.permissions().readonly())
            .unwrap_or(false)
    }

    fn make_writable(&self, path: &Path) -> bool {
        let Some(target) = (if path.exists() {
            Some(path.to_path_buf())
        } else {
            first_existing_ancestor(path)
        }) else {
            return false;
        };

        for mode in escalation_modes(target.is_dir()) {
            if let Err(err) = set_mode(&target, *mode) {
                warn!(path = %target.display(), error = %err, "failed to change permissions");
                return false;
            }
            if self.is_writable(&target) {
                debug!(path = %target.display(), mode = %format!("{mode:o}"), "made path writable");
                return true;
            }
        }
        false
    }
}

fn escalation_modes(is_dir: bool) -> &'static [u32] {
    if is_dir {
        &[0o755, 0o777]
    } else {
        &[0o644, 0o666]
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, _mode: u32) -> std::io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}
