//! Stages that carry one file's working copy toward a canonical container.
//!
//! Each submodule implements exactly one transformation with the contract
//! `PathBuf -> PathBuf`: the stage inspects the path it is given and either
//! returns it unchanged (its precondition does not hold) or performs a full
//! rewrite/rename and returns the new path. Stages are stateless, so the same
//! stage may run concurrently on different files.
//!
//! ## Order
//!
//! ```text
//! filename ─▶ extension ─▶ unrar ─▶ junk ─▶ pdf ─▶ renumber ─▶ reencode
//! (tidy name)  (cbz→zip)   (rar→zip) (__MACOSX) (pdf→zip) (P00000…)  (JPEG q90)
//! ```
//!
//! 1. [`filename`]  — strip boilerplate from the name, `T01` → `#01`
//! 2. [`extension`] — legacy comic extension to the canonical one, same bytes
//! 3. [`unrar`]     — extract rar/cbr through the [`ArchiveExtractor`] and repack
//! 4. [`junk`]      — drop OS metadata entries from the container
//! 5. [`pdf`]       — rasterize through the [`Rasterizer`] and pack JPEG pages
//! 6. [`renumber`]  — sequential, zero-padded page names in natural order
//! 7. [`reencode`]  — resize and re-encode every page as JPEG
//!
//! CPU-bound work (zip I/O, image codecs) runs inside `spawn_blocking` so
//! the async workers stay free for process spawning and scheduling.

pub mod extension;
pub mod filename;
pub mod junk;
pub mod pdf;
pub mod reencode;
pub mod renumber;
pub mod unrar;

use crate::config::SanitizeConfig;
use crate::error::StageError;
use crate::tools::{ArchiveExtractor, Pdftoppm, RasterParams, Rasterizer, Unrar};
use futures::future::BoxFuture;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Signature shared by every stage.
pub type StageFn = fn(PathBuf, Arc<StageContext>) -> BoxFuture<'static, Result<PathBuf, StageError>>;

/// A named step in the ordered stage list.
#[derive(Clone, Copy)]
pub struct Stage {
    pub name: &'static str,
    pub run: StageFn,
}

impl Stage {
    pub const fn new(name: &'static str, run: StageFn) -> Self {
        Self { name, run }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Stage").field(&self.name).finish()
    }
}

/// The fixed stage order every file goes through.
pub fn default_stages() -> Vec<Stage> {
    vec![
        Stage::new("normalize_filename", |p, c| {
            Box::pin(filename::normalize_filename(p, c))
        }),
        Stage::new("canonicalize_extension", |p, c| {
            Box::pin(extension::canonicalize_extension(p, c))
        }),
        Stage::new("unpack_legacy_archive", |p, c| {
            Box::pin(unrar::unpack_legacy_archive(p, c))
        }),
        Stage::new("strip_platform_junk", |p, c| {
            Box::pin(junk::strip_platform_junk(p, c))
        }),
        Stage::new("rasterize_document", |p, c| {
            Box::pin(pdf::rasterize_document(p, c))
        }),
        Stage::new("renumber_pages", |p, c| {
            Box::pin(renumber::renumber_pages(p, c))
        }),
        Stage::new("reencode_pages", |p, c| {
            Box::pin(reencode::reencode_pages(p, c))
        }),
    ]
}

/// Page image encoding parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSettings {
    pub target_height: u32,
    pub jpeg_quality: u8,
    pub jpeg_dpi: u16,
}

impl ImageSettings {
    /// Archive comment recorded on containers whose pages were encoded with
    /// these settings. A container carrying it is not re-encoded again.
    pub fn marker(&self) -> String {
        format!(
            "cbz-sanitizer:jpeg q={} h={} dpi={}",
            self.jpeg_quality, self.target_height, self.jpeg_dpi
        )
    }
}

/// Read-only inputs shared by all stages of all files.
pub struct StageContext {
    pub images: ImageSettings,
    pub raster: RasterParams,
    pub extractor: Arc<dyn ArchiveExtractor>,
    pub rasterizer: Arc<dyn Rasterizer>,
}

impl StageContext {
    pub fn from_config(config: &SanitizeConfig) -> Self {
        let extractor = config.extractor.clone().unwrap_or_else(|| {
            Arc::new(Unrar::new(config.unrar_program.clone(), config.tool_timeout))
        });
        let rasterizer = config.rasterizer.clone().unwrap_or_else(|| {
            Arc::new(Pdftoppm::new(
                config.pdftoppm_program.clone(),
                config.tool_timeout,
            ))
        });

        Self {
            images: ImageSettings {
                target_height: config.target_height,
                jpeg_quality: config.jpeg_quality,
                jpeg_dpi: config.jpeg_dpi,
            },
            raster: RasterParams {
                dpi: config.raster_dpi,
                scale_to: config.raster_scale_to,
            },
            extractor,
            rasterizer,
        }
    }
}

impl fmt::Debug for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("images", &self.images)
            .field("raster", &self.raster)
            .finish_non_exhaustive()
    }
}

/// Run CPU-bound or blocking stage work off the async workers.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, StageError>
where
    F: FnOnce() -> Result<T, StageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StageError::Internal(format!("blocking stage work failed: {e}")))?
}
