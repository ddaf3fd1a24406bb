//! Recoverable trash for original source files.
//!
//! Originals are never deleted outright: once a disposition has been written
//! the source goes either to the operating system's trash can
//! ([`SystemTrash`], via the `trash` crate) or into an operator-chosen folder
//! that mirrors the scanned layout ([`TrashFolder`]). Both tolerate the path
//! already being gone.

use crate::error::SanitizeError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Non-destructive removal of an original file.
pub trait RecoverableTrash: Send + Sync {
    /// Make `path` disappear from its location in a recoverable way.
    ///
    /// `relative` is the path of the file relative to the scan root.
    fn discard(&self, path: &Path, relative: &Path) -> Result<(), SanitizeError>;
}

/// The desktop trash can (freedesktop trash, macOS Trash, Windows Recycle Bin).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTrash;

impl RecoverableTrash for SystemTrash {
    fn discard(&self, path: &Path, _relative: &Path) -> Result<(), SanitizeError> {
        if !path.exists() {
            debug!("{} already gone, nothing to trash", path.display());
            return Ok(());
        }
        match ::trash::delete(path) {
            Ok(()) => Ok(()),
            // Lost a race with another remover; the file is gone either way.
            Err(e) if !path.exists() => {
                warn!("{} vanished while trashing: {}", path.display(), e);
                Ok(())
            }
            Err(e) => Err(SanitizeError::Trash {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }),
        }
    }
}

/// Moves originals into `root/<relative path>`.
///
/// A file already present at the target gets a numeric suffix rather than
/// being overwritten.
#[derive(Debug, Clone)]
pub struct TrashFolder {
    root: PathBuf,
}

impl TrashFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn free_target(&self, relative: &Path) -> PathBuf {
        let target = self.root.join(relative);
        if !target.exists() {
            return target;
        }
        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = target
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        (1..)
            .map(|n| target.with_file_name(format!("{stem} ({n}){ext}")))
            .find(|candidate| !candidate.exists())
            .unwrap_or(target)
    }
}

impl RecoverableTrash for TrashFolder {
    fn discard(&self, path: &Path, relative: &Path) -> Result<(), SanitizeError> {
        if !path.exists() {
            debug!("{} already gone, nothing to trash", path.display());
            return Ok(());
        }

        let target = self.free_target(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SanitizeError::io("create trash directory", parent, e))?;
        }

        match std::fs::rename(path, &target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            // Different filesystem: copy then remove.
            Err(_) => {
                std::fs::copy(path, &target)
                    .map_err(|e| SanitizeError::io("copy to trash", path, e))?;
                match std::fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(SanitizeError::io("remove trashed original", path, e)),
                }
            }
        }

        debug!("Trashed {} → {}", path.display(), target.display());
        Ok(())
    }
}
