//! Per-file and per-batch reports.
//!
//! The on-disk partition of `success/` and `failed/` is the primary record of
//! a run; these types mirror it in memory so callers can print or serialize
//! a summary.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How one file's task ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Disposition {
    /// Every stage ran; the result sits under `success/`.
    Success,
    /// Stage `stage_index` failed; the last good copy sits in its bucket.
    Failed { stage_index: usize, stage_name: String },
    /// No disposition was written (collision, setup of the working copy,
    /// worker panic). The original is still in place.
    Aborted,
}

/// Outcome of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    /// Path relative to the scan root.
    pub relative_path: PathBuf,

    pub disposition: Disposition,

    /// Where the file was placed, when it was placed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,

    /// Human-readable error for failed and aborted files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    pub fn is_success(&self) -> bool {
        self.disposition == Disposition::Success
    }
}

/// Counters for a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Recognized files found by discovery.
    pub discovered: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub aborted: usize,
    /// Directories removed by the cleanup pass.
    pub directories_removed: usize,
    pub duration_ms: u64,
}

impl BatchStats {
    /// Tally one finished file.
    pub fn record(&mut self, report: &FileReport) {
        match report.disposition {
            Disposition::Success => self.succeeded += 1,
            Disposition::Failed { .. } => self.failed += 1,
            Disposition::Aborted => self.aborted += 1,
        }
    }
}

/// Everything a batch produced, in completion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
    pub stats: BatchStats,
}
