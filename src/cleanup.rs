//! Cleanup pass: delete directories left holding nothing but platform junk,
//! and working directories abandoned by tasks that never finished.
//!
//! Runs once, after every task of a batch has reached its disposition. A
//! directory that looks empty while tasks are still running may yet receive
//! a sibling's output.

use crate::executor::WORK_DIR_PREFIX;
use crate::pipeline::junk::JUNK_MARKERS;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

fn is_marker(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| JUNK_MARKERS.contains(&n))
}

/// True when `dir` has no member other than junk markers.
fn only_junk(dir: &Path) -> std::io::Result<bool> {
    for entry in std::fs::read_dir(dir)? {
        if !is_marker(&entry?.file_name()) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Visit each root post-order and remove junk-only or empty directories,
/// roots included. Missing roots are skipped.
///
/// Returns the number of directories removed. Failures are logged and the
/// pass moves on.
pub fn remove_empty_dirs(roots: &[PathBuf]) -> usize {
    let mut removed = 0;

    for root in roots {
        if !root.is_dir() {
            debug!("Cleanup: skipping missing root {}", root.display());
            continue;
        }

        let walker = WalkDir::new(root)
            .contents_first(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_marker(e.file_name()));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Cleanup: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            let dir = entry.path();
            match only_junk(dir) {
                Ok(true) => match std::fs::remove_dir_all(dir) {
                    Ok(()) => {
                        info!("Removing empty folder {}", dir.display());
                        removed += 1;
                    }
                    Err(e) => warn!("Cleanup: cannot remove {}: {}", dir.display(), e),
                },
                Ok(false) => {}
                Err(e) => warn!("Cleanup: cannot list {}: {}", dir.display(), e),
            }
        }
    }

    removed
}

/// Remove every working directory left directly under `managed_root`.
///
/// A finished task removes its own; the ones found here belong to runs that
/// were killed. Must not run while tasks of this managed root are in flight.
pub fn sweep_working_dirs(managed_root: &Path) -> usize {
    let entries = match std::fs::read_dir(managed_root) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cleanup: cannot list {}: {}", managed_root.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.filter_map(Result::ok) {
        let is_work = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with(WORK_DIR_PREFIX));
        if !is_work || !entry.file_type().is_ok_and(|t| t.is_dir()) {
            continue;
        }
        let dir = entry.path();
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                warn!("Removed abandoned working directory {}", dir.display());
                removed += 1;
            }
            Err(e) => warn!("Cleanup: cannot remove {}: {}", dir.display(), e),
        }
    }
    removed
}
