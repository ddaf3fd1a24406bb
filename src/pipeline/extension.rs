//! `.cbz` is a zip under another name: rename, keep the bytes.

use super::StageContext;
use crate::error::StageError;
use crate::item::{has_suffix, CBZ_SUFFIX, ZIP_SUFFIX};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Stage 1: `.cbz` → `.zip`.
pub async fn canonicalize_extension(
    path: PathBuf,
    _ctx: Arc<StageContext>,
) -> Result<PathBuf, StageError> {
    if !has_suffix(&path, CBZ_SUFFIX) {
        return Ok(path);
    }

    let new_path = path.with_extension(ZIP_SUFFIX);
    info!("Renaming {} → {}", path.display(), new_path.display());
    tokio::fs::rename(&path, &new_path)
        .await
        .map_err(|e| StageError::io("rename", &path, e))?;
    Ok(new_path)
}
