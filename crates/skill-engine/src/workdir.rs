//! Scoped temporary directories for clones.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// A unique, not-yet-created directory path under a parent temp dir.
///
/// Removed by [`EphemeralDir::cleanup`] or, failing that, on drop. Removal errors
/// are logged and swallowed.
#[derive(Debug)]
pub struct EphemeralDir {
    path: PathBuf,
    removed: bool,
}

impl EphemeralDir {
    /// Reserve `<parent>/<prefix>-<uuid>`. Git creates the directory on clone.
    pub fn new(parent: &Path, prefix: &str) -> Self {
        let path = parent.join(format!("{prefix}-{}", Uuid::now_v7()));
        debug!(path = %path.display(), "reserved ephemeral directory");
        Self {
            path,
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn cleanup(mut self) {
        self.removed = true;
        remove_quietly(&self.path).await;
    }
}

impl Drop for EphemeralDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed ephemeral directory on drop"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove ephemeral directory");
            }
        }
    }
}

/// `remove_dir_all` that ignores a missing path and only logs other errors.
pub async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!(path = %path.display(), "removed directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove directory"),
    }
}
