//! Remove OS metadata (`__MACOSX/`, `.DS_Store`, Synology `@eaDir`) from containers.

use super::{blocking, StageContext};
use crate::archive::{entry_names, rewrite_archive};
use crate::error::StageError;
use crate::item::{has_suffix, ZIP_SUFFIX};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Names that mark platform metadata, both inside containers and on disk.
pub const JUNK_MARKERS: [&str; 4] = ["__MACOSX", "._.DS_Store", ".DS_Store", "@eaDir"];

/// True when an entry path contains any junk marker.
pub fn is_junk(name: &str) -> bool {
    JUNK_MARKERS.iter().any(|m| name.contains(m))
}

/// Stage 3: drop junk entries from a zip.
pub async fn strip_platform_junk(
    path: PathBuf,
    _ctx: Arc<StageContext>,
) -> Result<PathBuf, StageError> {
    if !has_suffix(&path, ZIP_SUFFIX) {
        return Ok(path);
    }

    let archive = path.clone();
    blocking(move || {
        if !entry_names(&archive)?.iter().any(|n| is_junk(n)) {
            return Ok(());
        }
        info!("Removing platform junk from {}", archive.display());
        let summary = rewrite_archive(&archive, |name, data| {
            Ok((!is_junk(name)).then(|| (name.to_string(), data)))
        })?;
        info!("Dropped {} junk entries", summary.dropped);
        Ok(())
    })
    .await?;

    Ok(path)
}
