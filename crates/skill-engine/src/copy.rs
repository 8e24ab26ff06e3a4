//! Symlink- and traversal-safe recursive directory copy.

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("symlinks are not supported in skills: {0}")]
    Symlink(PathBuf),
    #[error("source path escapes the skill directory: {0}")]
    Traversal(PathBuf),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CopyError>;

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CopyError + '_ {
    move |source| CopyError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Rules applied to every entry of the copied tree.
#[derive(Debug, Clone, Copy)]
pub struct CopyPolicy {
    /// Fail on any symlink. When false, symlinks are skipped instead.
    pub reject_symlinks: bool,
    /// Carry over Unix permission bits (best effort).
    pub preserve_permissions: bool,
}

impl Default for CopyPolicy {
    fn default() -> Self {
        Self {
            reject_symlinks: true,
            preserve_permissions: true,
        }
    }
}

/// What to do with a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File,
    Skip,
}

impl CopyPolicy {
    fn check_entry(&self, path: &Path, meta: &Metadata) -> Result<EntryKind> {
        let file_type = meta.file_type();
        if file_type.is_symlink() {
            return if self.reject_symlinks {
                Err(CopyError::Symlink(path.to_path_buf()))
            } else {
                Ok(EntryKind::Skip)
            };
        }
        if file_type.is_dir() {
            Ok(EntryKind::Dir)
        } else if file_type.is_file() {
            Ok(EntryKind::File)
        } else {
            Ok(EntryKind::Skip)
        }
    }
}

/// Copy `src` into `dst` (created if missing). Returns the number of files copied.
///
/// Every directory descended into must resolve to a path inside the resolved
/// source root. On error the partially written `dst` is left for the caller to
/// remove.
pub async fn copy_dir(src: &Path, dst: &Path, policy: CopyPolicy) -> Result<usize> {
    let root_meta = tokio::fs::symlink_metadata(src)
        .await
        .map_err(io_err(src))?;
    if root_meta.file_type().is_symlink() {
        return Err(CopyError::Symlink(src.to_path_buf()));
    }
    let src_root = tokio::fs::canonicalize(src).await.map_err(io_err(src))?;

    let mut count = 0;
    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((current_src, current_dst)) = stack.pop() {
        let real = tokio::fs::canonicalize(&current_src)
            .await
            .map_err(io_err(&current_src))?;
        if !real.starts_with(&src_root) {
            return Err(CopyError::Traversal(current_src));
        }
        tokio::fs::create_dir_all(&current_dst)
            .await
            .map_err(io_err(&current_dst))?;

        let mut entries = tokio::fs::read_dir(&current_src)
            .await
            .map_err(io_err(&current_src))?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err(&current_src))? {
            let next_src = entry.path();
            let next_dst = current_dst.join(entry.file_name());
            let meta = tokio::fs::symlink_metadata(&next_src)
                .await
                .map_err(io_err(&next_src))?;

            match policy.check_entry(&next_src, &meta)? {
                EntryKind::Dir => stack.push((next_src, next_dst)),
                EntryKind::File => {
                    tokio::fs::copy(&next_src, &next_dst)
                        .await
                        .map_err(io_err(&next_dst))?;
                    if policy.preserve_permissions {
                        preserve_mode(&meta, &next_dst).await;
                    }
                    count += 1;
                }
                EntryKind::Skip => {}
            }
        }
    }

    Ok(count)
}

#[cfg(unix)]
async fn preserve_mode(meta: &Metadata, dst: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let mode = meta.permissions().mode() & 0o777;
    if let Err(e) = tokio::fs::set_permissions(dst, std::fs::Permissions::from_mode(mode)).await {
        tracing::debug!(path = %dst.display(), error = %e, "failed to preserve file mode");
    }
}

#[cfg(not(unix))]
async fn preserve_mode(_meta: &Metadata, _dst: &Path) {}
