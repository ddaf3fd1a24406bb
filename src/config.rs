//! Configuration types for a sanitize run.
//!
//! Every knob lives in [`SanitizeConfig`], built via its
//! [`SanitizeConfigBuilder`]. The config is an explicit value handed to the
//! scheduler and copied into each per-file task; nothing here is process-wide
//! state.

use crate::error::SanitizeError;
use crate::pipeline::Stage;
use crate::progress::ProgressCallback;
use crate::tools::{ArchiveExtractor, Rasterizer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for one sanitize run.
///
/// # Example
/// ```rust
/// use cbz_sanitizer::SanitizeConfig;
///
/// let config = SanitizeConfig::builder()
///     .concurrency(4)
///     .jpeg_quality(85)
///     .build()
///     .unwrap();
/// assert_eq!(config.target_height, 2388);
/// ```
#[derive(Clone)]
pub struct SanitizeConfig {
    /// Maximum number of files processed at once. Default: available parallelism.
    pub concurrency: usize,

    /// Process files one at a time, in discovery order. Default: false.
    ///
    /// Meant for stepping through a batch while debugging; the pipeline for
    /// each file is identical in both modes.
    pub sequential: bool,

    /// Page images taller than this are resized (Lanczos3, aspect ratio kept). Default: 2388.
    pub target_height: u32,

    /// JPEG quality used when re-encoding pages (1–100). Default: 90.
    pub jpeg_quality: u8,

    /// Pixel density written into re-encoded JPEGs. Default: 120.
    pub jpeg_dpi: u16,

    /// Resolution handed to the rasterizer for paged documents. Default: 300.
    pub raster_dpi: u32,

    /// Longest edge requested from the rasterizer, in pixels. Default: 4000.
    pub raster_scale_to: u32,

    /// Upper bound for one external tool invocation. Default: 10 minutes.
    /// `None` lets a hung tool block its worker indefinitely.
    pub tool_timeout: Option<Duration>,

    /// Program used to extract rar/cbr archives. Default: `unrar`.
    pub unrar_program: String,

    /// Program used to rasterize pdf documents. Default: `pdftoppm`.
    pub pdftoppm_program: String,

    /// Directory holding `success/` and `failed/`.
    /// Default: `<parent of scan root>/managed`.
    pub managed_root: Option<PathBuf>,

    /// Where originals go once their working copy has been placed.
    pub trash: TrashPolicy,

    /// Receives per-file and per-stage events.
    pub progress_callback: Option<ProgressCallback>,

    /// Replacement for the `unrar`-backed extractor.
    pub extractor: Option<Arc<dyn ArchiveExtractor>>,

    /// Replacement for the `pdftoppm`-backed rasterizer.
    pub rasterizer: Option<Arc<dyn Rasterizer>>,

    /// Replacement for the default ordered stage list.
    pub stages: Option<Arc<[Stage]>>,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            sequential: false,
            target_height: 2388,
            jpeg_quality: 90,
            jpeg_dpi: 120,
            raster_dpi: 300,
            raster_scale_to: 4000,
            tool_timeout: Some(Duration::from_secs(600)),
            unrar_program: "unrar".to_string(),
            pdftoppm_program: "pdftoppm".to_string(),
            managed_root: None,
            trash: TrashPolicy::default(),
            progress_callback: None,
            extractor: None,
            rasterizer: None,
            stages: None,
        }
    }
}

impl fmt::Debug for SanitizeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SanitizeConfig")
            .field("concurrency", &self.concurrency)
            .field("sequential", &self.sequential)
            .field("target_height", &self.target_height)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("jpeg_dpi", &self.jpeg_dpi)
            .field("raster_dpi", &self.raster_dpi)
            .field("raster_scale_to", &self.raster_scale_to)
            .field("tool_timeout", &self.tool_timeout)
            .field("unrar_program", &self.unrar_program)
            .field("pdftoppm_program", &self.pdftoppm_program)
            .field("managed_root", &self.managed_root)
            .field("trash", &self.trash)
            .field("extractor", &self.extractor.as_ref().map(|_| "<dyn ArchiveExtractor>"))
            .field("rasterizer", &self.rasterizer.as_ref().map(|_| "<dyn Rasterizer>"))
            .field("stages", &self.stages.as_ref().map(|s| s.len()))
            .finish()
    }
}

impl SanitizeConfig {
    /// Create a new builder for `SanitizeConfig`.
    pub fn builder() -> SanitizeConfigBuilder {
        SanitizeConfigBuilder {
            config: Self::default(),
        }
    }

    /// Resolve the managed directory layout for a scan of `root`.
    pub fn layout_for(&self, root: &Path) -> ManagedLayout {
        let managed = self.managed_root.clone().unwrap_or_else(|| {
            root.parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
                .join("managed")
        });
        ManagedLayout::new(managed)
    }
}

/// Builder for [`SanitizeConfig`].
#[derive(Debug)]
pub struct SanitizeConfigBuilder {
    config: SanitizeConfig,
}

impl SanitizeConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn sequential(mut self, v: bool) -> Self {
        self.config.sequential = v;
        self
    }

    pub fn target_height(mut self, px: u32) -> Self {
        self.config.target_height = px;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q;
        self
    }

    pub fn jpeg_dpi(mut self, dpi: u16) -> Self {
        self.config.jpeg_dpi = dpi;
        self
    }

    pub fn raster_dpi(mut self, dpi: u32) -> Self {
        self.config.raster_dpi = dpi;
        self
    }

    pub fn raster_scale_to(mut self, px: u32) -> Self {
        self.config.raster_scale_to = px;
        self
    }

    pub fn tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.tool_timeout = timeout;
        self
    }

    pub fn unrar_program(mut self, program: impl Into<String>) -> Self {
        self.config.unrar_program = program.into();
        self
    }

    pub fn pdftoppm_program(mut self, program: impl Into<String>) -> Self {
        self.config.pdftoppm_program = program.into();
        self
    }

    pub fn managed_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.managed_root = Some(dir.into());
        self
    }

    pub fn trash(mut self, policy: TrashPolicy) -> Self {
        self.config.trash = policy;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        self.config.extractor = Some(extractor);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn stages(mut self, stages: Vec<Stage>) -> Self {
        self.config.stages = Some(stages.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SanitizeConfig, SanitizeError> {
        let c = &self.config;
        if c.jpeg_quality == 0 || c.jpeg_quality > 100 {
            return Err(SanitizeError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.target_height == 0 {
            return Err(SanitizeError::InvalidConfig(
                "Target height must be ≥ 1".into(),
            ));
        }
        if c.raster_dpi == 0 || c.raster_scale_to == 0 {
            return Err(SanitizeError::InvalidConfig(
                "Raster DPI and scale must be ≥ 1".into(),
            ));
        }
        if c.stages.as_ref().is_some_and(|s| s.is_empty()) {
            return Err(SanitizeError::InvalidConfig(
                "Stage list must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Where originals are sent after disposition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TrashPolicy {
    /// The operating system's trash can (default).
    #[default]
    System,
    /// Move into this directory, mirroring the scanned layout.
    Folder(PathBuf),
}

/// The managed output tree: `success/…` and `failed/{NN}_{stage}/…`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedLayout {
    pub root: PathBuf,
    pub success: PathBuf,
    pub failed: PathBuf,
}

impl ManagedLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            success: root.join("success"),
            failed: root.join("failed"),
            root,
        }
    }

    /// Create the managed roots. Failure here is fatal to the run.
    pub fn create(&self) -> Result<(), SanitizeError> {
        for dir in [&self.root, &self.success, &self.failed] {
            std::fs::create_dir_all(dir).map_err(|source| SanitizeError::Setup {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Destination of a fully processed file.
    ///
    /// The directory part comes from `relative`; the file name is the one
    /// the last stage produced (stages may rename the file).
    pub fn success_path(&self, relative: &Path, file_name: &std::ffi::OsStr) -> PathBuf {
        self.success.join(relative).with_file_name(file_name)
    }

    /// Destination of a file that stopped at stage `index`.
    pub fn failure_path(
        &self,
        index: usize,
        stage: &str,
        relative: &Path,
        file_name: &std::ffi::OsStr,
    ) -> PathBuf {
        self.failed
            .join(failure_bucket(index, stage))
            .join(relative)
            .with_file_name(file_name)
    }

    /// Directories the cleanup pass should visit after a scan of `root`.
    pub fn cleanup_roots(&self, root: &Path) -> Vec<PathBuf> {
        vec![
            root.to_path_buf(),
            self.success.clone(),
            self.failed.clone(),
        ]
    }
}

/// Bucket directory name for a failing stage, e.g. `02_unpack_legacy_archive`.
pub fn failure_bucket(index: usize, stage: &str) -> String {
    format!("{index:02}_{stage}")
}
