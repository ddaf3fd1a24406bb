//! Legacy archives (`.rar`, `.cbr`): extract with the external tool and
//! repack as a canonical zip.

use super::{blocking, StageContext};
use crate::archive::{write_archive, EntrySet};
use crate::error::StageError;
use crate::item::{has_suffix, CBR_SUFFIX, RAR_SUFFIX, ZIP_SUFFIX};
use crate::natural::natural_cmp;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use walkdir::WalkDir;

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Stage 2: unpack `.rar`/`.cbr` into a `.zip` next to it.
///
/// A zip already sitting at the target path means the work was done by an
/// earlier run; the source copy is discarded and the zip returned as is.
/// Files that are really zips with a rar suffix are just renamed.
pub async fn unpack_legacy_archive(
    path: PathBuf,
    ctx: Arc<StageContext>,
) -> Result<PathBuf, StageError> {
    if !has_suffix(&path, RAR_SUFFIX) && !has_suffix(&path, CBR_SUFFIX) {
        return Ok(path);
    }

    let target = path.with_extension(ZIP_SUFFIX);

    if tokio::fs::try_exists(&target).await.unwrap_or(false) {
        info!("{} already exists, discarding {}", target.display(), path.display());
        remove_source(&path).await?;
        return Ok(target);
    }

    if starts_with_zip_magic(&path).await? {
        info!("{} is a zip with a rar suffix, renaming", path.display());
        tokio::fs::rename(&path, &target)
            .await
            .map_err(|e| StageError::io("rename", &path, e))?;
        return Ok(target);
    }

    let scratch = tempfile::TempDir::new()
        .map_err(|e| StageError::io("create scratch directory", &path, e))?;
    info!("Extracting {} to {}", path.display(), scratch.path().display());
    ctx.extractor.extract(&path, scratch.path()).await?;

    let packed_target = target.clone();
    let count = blocking(move || {
        let count = pack_directory(scratch.path(), &packed_target)?;
        drop(scratch);
        Ok(count)
    })
    .await?;
    info!("Packed {} entries into {}", count, target.display());

    remove_source(&path).await?;
    Ok(target)
}

async fn remove_source(path: &Path) -> Result<(), StageError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StageError::io("remove source", path, e)),
    }
}

async fn starts_with_zip_magic(path: &Path) -> Result<bool, StageError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| StageError::io("open", path, e))?;
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic).await {
        Ok(_) => Ok(&magic == ZIP_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(StageError::io("read header", path, e)),
    }
}

/// Pack every file under `dir` into a new container at `target`.
///
/// Entries are named by their path relative to `dir` and added in natural
/// order.
pub(crate) fn pack_directory(dir: &Path, target: &Path) -> Result<usize, StageError> {
    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| StageError::io("walk extracted files", dir, e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let name = rel.to_string_lossy().replace('\\', "/");
        files.push((name, entry.into_path()));
    }
    files.sort_by(|a, b| natural_cmp(&a.0, &b.0));

    let mut set = EntrySet::new();
    for (name, file) in files {
        let data = std::fs::read(&file).map_err(|e| StageError::io("read extracted file", &file, e))?;
        debug!("Adding {} ({} bytes)", name, data.len());
        set.insert(name, data);
    }

    write_archive(target, &set, "")?;
    Ok(set.len())
}
