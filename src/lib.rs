//! # cbz-sanitizer
//!
//! Normalize a folder of comic archives into canonical zip containers.
//!
//! Every recognized file (`.zip .cbz .cbr .rar .pdf .epub`) goes through a
//! fixed list of stages on a private working copy. A file that passes every
//! stage lands under `success/`, one that fails lands under
//! `failed/{NN}_{stage}/` with the output of the last stage that worked. Only
//! then is the original sent to a recoverable trash.
//!
//! ## Pipeline Overview
//!
//! ```text
//! scan root
//!  │
//!  ├─ discover   recognized suffixes only, managed roots excluded
//!  ├─ dispatch   bounded parallel tasks (or sequential, for debugging)
//!  │    └─ per file: copy ─▶ 7 stages ─▶ place (no overwrite) ─▶ trash original
//!  └─ cleanup    drop directories left with nothing but OS junk
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cbz_sanitizer::{sanitize, SanitizeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SanitizeConfig::builder()
//!         .managed_root("/data/managed")
//!         .build()?;
//!     let report = sanitize(&config, "/data/incoming").await?;
//!     for file in report.files.iter().filter(|f| !f.is_success()) {
//!         eprintln!("{}: {:?}", file.relative_path.display(), file.error);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## External tools
//!
//! `unrar` (rar/cbr extraction) and `pdftoppm` (pdf rasterization) are run as
//! child processes with a bounded timeout. Both sit behind traits
//! ([`ArchiveExtractor`], [`Rasterizer`]) so they can be replaced.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cbz-sanitize` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod executor;
pub mod item;
pub mod natural;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod scheduler;
pub mod tools;
pub mod trash;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ManagedLayout, SanitizeConfig, SanitizeConfigBuilder, TrashPolicy};
pub use error::{SanitizeError, StageError, ToolError};
pub use executor::{FileTask, PipelineOutcome, StageFailure};
pub use item::FileItem;
pub use output::{BatchReport, BatchStats, Disposition, FileReport};
pub use pipeline::{default_stages, ImageSettings, Stage, StageContext};
pub use progress::{NoopProgressCallback, ProgressCallback, SanitizeProgressCallback};
pub use scheduler::{cleanup, discover, sanitize, sanitize_stream, sanitize_sync, ReportStream};
pub use tools::{ArchiveExtractor, Pdftoppm, RasterParams, Rasterizer, Unrar};
pub use trash::{RecoverableTrash, SystemTrash, TrashFolder};
