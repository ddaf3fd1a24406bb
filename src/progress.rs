//! Progress-callback trait for per-file and per-stage events.
//!
//! Inject an [`Arc<dyn SanitizeProgressCallback>`] via
//! [`crate::config::SanitizeConfigBuilder::progress_callback`] to receive
//! events while the scheduler works through a batch. The CLI uses it to drive
//! its progress bar; library callers can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use cbz_sanitizer::{FileReport, SanitizeConfig, SanitizeProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl SanitizeProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, report: &FileReport) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{n}: {}", report.relative_path.display());
//!     }
//! }
//!
//! let config = SanitizeConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{BatchStats, FileReport};
use std::path::Path;
use std::sync::Arc;

/// Called by the scheduler and executor as a batch progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// In parallel mode `on_file_start`, `on_stage_complete` and
/// `on_file_complete` are called concurrently from different worker tasks.
/// Implementations must protect shared mutable state themselves.
pub trait SanitizeProgressCallback: Send + Sync {
    /// Called once after discovery.
    ///
    /// # Arguments
    /// * `total_files` — recognized files that will be processed
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a worker picks up a file.
    fn on_file_start(&self, relative_path: &Path) {
        let _ = relative_path;
    }

    /// Called after each stage that returned successfully.
    ///
    /// # Arguments
    /// * `relative_path` — the file being processed
    /// * `stage_index`   — 0-based position in the stage list
    /// * `stage_name`    — the stage's name
    fn on_stage_complete(&self, relative_path: &Path, stage_index: usize, stage_name: &str) {
        let _ = (relative_path, stage_index, stage_name);
    }

    /// Called once per file, after disposition (or abort).
    fn on_file_complete(&self, report: &FileReport) {
        let _ = report;
    }

    /// Called once after every file finished and cleanup ran.
    fn on_batch_complete(&self, stats: &BatchStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SanitizeProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::SanitizeConfig`].
pub type ProgressCallback = Arc<dyn SanitizeProgressCallback>;
