//! Archive Rewriter: read a zip container, transform its entries, and swap a
//! brand-new container in place of the old one.
//!
//! The new container is always written to a temporary file in the same
//! directory and renamed over the target only after `finish()` succeeded.
//! Any error (read, transform, write) drops the temporary file and leaves
//! the original container byte-identical.

use crate::error::StageError;
use indexmap::IndexMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// One named blob inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub data: Vec<u8>,
}

/// What a rewrite did, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    pub kept: usize,
    pub dropped: usize,
}

/// Largest entry read into memory. Headers declaring more, or streams
/// inflating past it, are rejected.
pub const MAX_ENTRY_BYTES: u64 = 1 << 30;

/// Entries keyed by name, in insertion order. Re-inserting a name overwrites
/// the earlier blob in place.
#[derive(Debug, Default)]
pub struct EntrySet {
    entries: IndexMap<String, Vec<u8>>,
}

impl EntrySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: String, data: Vec<u8>) {
        self.entries.insert(name, data);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(name, data)| (name.as_str(), data.as_slice()))
    }
}

fn open(path: &Path) -> Result<ZipArchive<BufReader<File>>, StageError> {
    let file = File::open(path).map_err(|e| StageError::io("open archive", path, e))?;
    ZipArchive::new(BufReader::new(file)).map_err(|e| StageError::archive(path, e))
}

/// Names of all file entries (directories excluded), in container order.
pub fn entry_names(path: &Path) -> Result<Vec<String>, StageError> {
    let archive = open(path)?;
    Ok(archive
        .file_names()
        .filter(|n| !n.ends_with('/'))
        .map(str::to_string)
        .collect())
}

/// The container's archive comment, lossily decoded.
pub fn archive_comment(path: &Path) -> Result<String, StageError> {
    let archive = open(path)?;
    Ok(String::from_utf8_lossy(archive.comment()).into_owned())
}

/// Read every file entry into memory, in container order.
pub fn read_entries(path: &Path) -> Result<Vec<Entry>, StageError> {
    let mut archive = open(path)?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| StageError::archive(path, e))?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let oversized = || StageError::Oversized {
            path: path.to_path_buf(),
            entry: name.clone(),
            limit: MAX_ENTRY_BYTES,
        };
        if file.size() > MAX_ENTRY_BYTES {
            return Err(oversized());
        }
        // The declared size is untrusted: grow as bytes arrive.
        let mut data = Vec::new();
        (&mut file)
            .take(MAX_ENTRY_BYTES + 1)
            .read_to_end(&mut data)
            .map_err(|e| StageError::io("read entry", path, e))?;
        if data.len() as u64 > MAX_ENTRY_BYTES {
            return Err(oversized());
        }
        entries.push(Entry { name, data });
    }

    Ok(entries)
}

/// Rewrite the container at `path`, keeping its archive comment.
///
/// `transform` receives each file entry and returns the entry to write, or
/// `None` to drop it. An `Err` from `transform` aborts the rewrite.
pub fn rewrite_archive<F>(path: &Path, transform: F) -> Result<RewriteSummary, StageError>
where
    F: FnMut(&str, Vec<u8>) -> Result<Option<(String, Vec<u8>)>, StageError>,
{
    let comment = archive_comment(path)?;
    rewrite_archive_with_comment(path, &comment, transform)
}

/// Like [`rewrite_archive`], replacing the archive comment with `comment`.
pub fn rewrite_archive_with_comment<F>(
    path: &Path,
    comment: &str,
    mut transform: F,
) -> Result<RewriteSummary, StageError>
where
    F: FnMut(&str, Vec<u8>) -> Result<Option<(String, Vec<u8>)>, StageError>,
{
    let mut out = EntrySet::new();
    let mut summary = RewriteSummary::default();

    for entry in read_entries(path)? {
        match transform(&entry.name, entry.data)? {
            Some((name, data)) => {
                out.insert(name, data);
                summary.kept += 1;
            }
            None => {
                debug!("Dropping entry {} from {}", entry.name, path.display());
                summary.dropped += 1;
            }
        }
    }

    write_archive(path, &out, comment)?;
    Ok(summary)
}

/// Atomically write `entries` as a new container at `path`.
///
/// An existing file at `path` is replaced only once the new container is
/// complete on disk.
pub fn write_archive(path: &Path, entries: &EntrySet, comment: &str) -> Result<(), StageError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".rewrite-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| StageError::io("create temp archive", dir, e))?;

    {
        let mut zip = ZipWriter::new(tmp.as_file_mut());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, data) in entries.iter() {
            zip.start_file(name, options)
                .map_err(|e| StageError::archive(path, e))?;
            zip.write_all(data)
                .map_err(|e| StageError::io("write entry", path, e))?;
        }
        if !comment.is_empty() {
            zip.set_comment(comment.to_string());
        }
        zip.finish().map_err(|e| StageError::archive(path, e))?;
    }

    tmp.as_file()
        .sync_all()
        .map_err(|e| StageError::io("sync temp archive", tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| StageError::io("replace archive", path, e.error))?;

    debug!("Wrote {} entries to {}", entries.len(), path.display());
    Ok(())
}
