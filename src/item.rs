//! Units of work and the suffix vocabulary shared by every stage.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Canonical container suffix every stage converges toward.
pub const ZIP_SUFFIX: &str = "zip";
pub const CBZ_SUFFIX: &str = "cbz";
pub const CBR_SUFFIX: &str = "cbr";
pub const RAR_SUFFIX: &str = "rar";
pub const PDF_SUFFIX: &str = "pdf";
pub const EPUB_SUFFIX: &str = "epub";

/// Suffixes the scheduler turns into [`FileItem`]s.
pub const RECOGNIZED_SUFFIXES: [&str; 6] = [
    ZIP_SUFFIX,
    CBZ_SUFFIX,
    CBR_SUFFIX,
    RAR_SUFFIX,
    PDF_SUFFIX,
    EPUB_SUFFIX,
];

/// Lower-cased extension of `path`, if it has one.
pub fn suffix_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Case-insensitive suffix check.
pub fn has_suffix(path: &Path, suffix: &str) -> bool {
    suffix_of(path).is_some_and(|s| s == suffix)
}

/// True when the scheduler should create a work item for `path`.
pub fn is_recognized(path: &Path) -> bool {
    suffix_of(path).is_some_and(|s| RECOGNIZED_SUFFIXES.contains(&s.as_str()))
}

/// One file to sanitize.
///
/// `original_path` is never written until disposition. All stage mutation
/// happens on a working copy owned by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileItem {
    /// Absolute path in the scanned tree.
    pub original_path: PathBuf,
    /// Path relative to the scan root; rebuilt under the managed roots.
    pub relative_path: PathBuf,
}

impl FileItem {
    /// Build an item for `path` found under `root`.
    ///
    /// When `root` is the file itself (single-file mode) the relative path is
    /// just the file name.
    pub fn new(root: &Path, path: &Path) -> Self {
        let relative_path = match path.strip_prefix(root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| path.to_path_buf()),
        };
        Self {
            original_path: path.to_path_buf(),
            relative_path,
        }
    }
}
