//! Error types for the cbz-sanitizer library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`SanitizeError`] — **Fatal** for a run (managed roots cannot be
//!   created, invalid configuration) or for a single file's task (a
//!   destination collision at disposition time). Task-level variants abort
//!   that one file loudly without touching its original; the batch goes on.
//!
//! * [`StageError`] — **Recoverable**: one stage could not complete on one
//!   file. The executor catches it and routes the working copy to
//!   `failed/{NN}_{stage}/…`.
//!
//! * [`ToolError`] — an external collaborator (`unrar`, `pdftoppm`) failed.
//!   Always surfaced to the executor wrapped in [`StageError::Tool`].

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that end a run, or abort one file's task without a disposition.
#[derive(Debug, Error)]
pub enum SanitizeError {
    // ── Setup errors (fatal to the whole run) ─────────────────────────────
    /// A managed root directory could not be created.
    #[error("Cannot create managed directory '{path}': {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The scan root does not exist.
    #[error("Scan root not found: '{path}'")]
    RootNotFound { path: PathBuf },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Task errors (abort one file, the batch continues) ─────────────────
    /// The disposition destination was already occupied.
    ///
    /// Two processed files resolved to the same output path. The working copy
    /// is discarded and the original is left where it was.
    #[error("Destination already exists: '{path}'\nTwo inputs resolve to the same output name.")]
    Collision { path: PathBuf },

    /// Filesystem failure outside of any stage (working copy, disposition).
    #[error("I/O error during {op} on '{path}': {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The original could not be sent to the recoverable trash.
    #[error("Failed to trash '{path}': {detail}")]
    Trash { path: PathBuf, detail: String },

    /// A worker task panicked or was cancelled by the runtime.
    #[error("Worker task failed: {0}")]
    TaskPanicked(String),
}

impl SanitizeError {
    pub(crate) fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A failure inside one stage, on one file.
#[derive(Debug, Error)]
pub enum StageError {
    /// External tool invocation failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The container could not be read or written.
    #[error("Archive error on '{path}': {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// An image entry could not be decoded or re-encoded.
    #[error("Image error on entry '{entry}': {source}")]
    Image {
        entry: String,
        #[source]
        source: image::ImageError,
    },

    /// Filesystem failure.
    #[error("I/O error during {op} on '{path}': {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An entry is larger than a single page could reasonably be.
    #[error("Entry '{entry}' in '{path}' exceeds {limit} bytes")]
    Oversized {
        path: PathBuf,
        entry: String,
        limit: u64,
    },

    /// An entry transform rejected its input.
    #[error("Transform failed on entry '{entry}': {detail}")]
    Transform { entry: String, detail: String },

    /// Blocking stage work panicked.
    #[error("Stage task failed: {0}")]
    Internal(String),
}

impl StageError {
    pub(crate) fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn archive(path: &Path, source: zip::result::ZipError) -> Self {
        Self::Archive {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// An external process invocation failed.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The program could not be started at all (not installed, not executable).
    #[error("Could not start '{program}': {source}\nIs it installed and on PATH?")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool recognised the input as not being its format.
    #[error("'{program}' rejected the input as the wrong format:\n{output}")]
    WrongFormat { program: String, output: String },

    /// Non-zero exit for any other reason; raw output attached.
    #[error("'{program}' exited with {status}:\n{output}")]
    Failed {
        program: String,
        status: String,
        output: String,
    },

    /// The tool did not finish within the configured bound and was killed.
    #[error("'{program}' timed out after {secs}s")]
    Timeout { program: String, secs: u64 },
}
