//! Discovery and dispatch: one independent task per recognized file.
//!
//! [`sanitize_stream`] yields a [`FileReport`] per file as tasks finish. In
//! parallel mode (the default) reports arrive in completion order, which is
//! not discovery order; sort by `relative_path` if order matters.
//! [`sanitize`] drains the stream, runs the cleanup pass and returns the
//! whole [`BatchReport`].

use crate::cleanup::{remove_empty_dirs, sweep_working_dirs};
use crate::config::{ManagedLayout, SanitizeConfig, TrashPolicy};
use crate::error::SanitizeError;
use crate::executor::FileTask;
use crate::item::{is_recognized, FileItem};
use crate::output::{BatchReport, BatchStats, Disposition, FileReport};
use crate::pipeline::{default_stages, Stage, StageContext};
use crate::trash::{RecoverableTrash, SystemTrash, TrashFolder};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::Stream;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// A boxed stream of per-file reports.
pub type ReportStream = Pin<Box<dyn Stream<Item = FileReport> + Send>>;

/// Find every recognized file under `root`.
///
/// A regular file given as `root` is its own single candidate. Directories
/// listed in `exclude` (the managed roots, when nested in the scan root) are
/// not descended into, however their paths are spelled: both sides are
/// resolved before the walk. Unrecognized files are ignored without a trace.
pub fn discover(root: &Path, exclude: &[PathBuf]) -> Result<Vec<FileItem>, SanitizeError> {
    if !root.exists() {
        return Err(SanitizeError::RootNotFound {
            path: root.to_path_buf(),
        });
    }

    if root.is_file() {
        return Ok(if is_recognized(root) {
            vec![FileItem::new(root, root)]
        } else {
            Vec::new()
        });
    }

    // Links are not followed, so every walked path below a resolved root is
    // resolved too and plain comparison is enough.
    let base = root
        .canonicalize()
        .map_err(|e| SanitizeError::io("resolve scan root", root, e))?;
    let exclude: Vec<PathBuf> = exclude.iter().filter_map(|x| x.canonicalize().ok()).collect();

    let mut items = Vec::new();
    let walker = WalkDir::new(&base)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !exclude.iter().any(|x| e.path() == x));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && is_recognized(entry.path()) {
            items.push(FileItem::new(&base, entry.path()));
        }
    }

    debug!("Discovered {} files under {}", items.len(), root.display());
    Ok(items)
}

/// A batch ready to run.
struct Batch {
    tasks: Vec<FileTask>,
    cleanup_roots: Vec<PathBuf>,
    managed_root: PathBuf,
}

fn prepare(config: &SanitizeConfig, root: &Path) -> Result<Batch, SanitizeError> {
    if !root.exists() {
        return Err(SanitizeError::RootNotFound {
            path: root.to_path_buf(),
        });
    }

    let layout = config.layout_for(scan_base(root));
    layout.create()?;
    info!(
        "Managed roots: {} and {}",
        layout.success.display(),
        layout.failed.display()
    );

    let items = discover(root, std::slice::from_ref(&layout.root))?;

    let stages: Arc<[Stage]> = match &config.stages {
        Some(stages) => Arc::clone(stages),
        None => default_stages().into(),
    };
    let context = Arc::new(StageContext::from_config(config));
    let trash: Arc<dyn RecoverableTrash> = match &config.trash {
        TrashPolicy::System => Arc::new(SystemTrash),
        TrashPolicy::Folder(dir) => Arc::new(TrashFolder::new(dir)),
    };

    let tasks = items
        .into_iter()
        .map(|item| FileTask {
            item,
            layout: layout.clone(),
            stages: Arc::clone(&stages),
            context: Arc::clone(&context),
            trash: Arc::clone(&trash),
            progress: config.progress_callback.clone(),
        })
        .collect();

    Ok(Batch {
        tasks,
        cleanup_roots: cleanup_roots(&layout, root),
        managed_root: layout.root,
    })
}

/// Directory the managed layout is derived from: the root, or the folder
/// holding a single-file root.
fn scan_base(root: &Path) -> &Path {
    if root.is_file() {
        root.parent().unwrap_or(Path::new("."))
    } else {
        root
    }
}

/// The scan root (unless it is a single file) plus the managed roots.
fn cleanup_roots(layout: &ManagedLayout, root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        vec![layout.success.clone(), layout.failed.clone()]
    } else {
        layout.cleanup_roots(root)
    }
}

/// Run one task on its own tokio task and turn every outcome into a report.
async fn run_task(task: FileTask) -> FileReport {
    let relative = task.item.relative_path.clone();
    let progress = task.progress.clone();

    let report = match tokio::spawn(task.run()).await {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => aborted(relative, e),
        Err(join) => aborted(relative, SanitizeError::TaskPanicked(join.to_string())),
    };

    if let Some(cb) = &progress {
        cb.on_file_complete(&report);
    }
    report
}

fn aborted(relative_path: PathBuf, e: SanitizeError) -> FileReport {
    error!("[{}] aborted: {}", relative_path.display(), e);
    FileReport {
        relative_path,
        disposition: Disposition::Aborted,
        destination: None,
        error: Some(e.to_string()),
    }
}

fn into_stream(tasks: Vec<FileTask>, config: &SanitizeConfig) -> ReportStream {
    if config.sequential {
        // One file at a time, in discovery order
        Box::pin(stream::iter(tasks).then(run_task))
    } else {
        Box::pin(stream::iter(tasks).map(run_task).buffer_unordered(config.concurrency.max(1)))
    }
}

/// Sanitize every recognized file under `root`, streaming reports as files
/// finish.
///
/// The cleanup pass is not part of the stream; call [`cleanup`] once the
/// stream is drained, or use [`sanitize`].
///
/// # Errors
/// Only setup failures: a missing root, or managed roots that cannot be
/// created.
pub async fn sanitize_stream(
    config: &SanitizeConfig,
    root: impl AsRef<Path>,
) -> Result<ReportStream, SanitizeError> {
    let root = root.as_ref();
    info!("Starting sanitize stream: {}", root.display());
    let batch = prepare(config, root)?;
    if let Some(cb) = &config.progress_callback {
        cb.on_batch_start(batch.tasks.len());
    }
    Ok(into_stream(batch.tasks, config))
}

/// Run the cleanup pass for a finished scan of `root`.
pub async fn cleanup(config: &SanitizeConfig, root: impl AsRef<Path>) -> Result<usize, SanitizeError> {
    let root = root.as_ref();
    let layout = config.layout_for(scan_base(root));
    run_cleanup(cleanup_roots(&layout, root), layout.root).await
}

async fn run_cleanup(roots: Vec<PathBuf>, managed_root: PathBuf) -> Result<usize, SanitizeError> {
    tokio::task::spawn_blocking(move || {
        sweep_working_dirs(&managed_root) + remove_empty_dirs(&roots)
    })
    .await
    .map_err(|e| SanitizeError::TaskPanicked(e.to_string()))
}

/// Sanitize every recognized file under `root` and clean up afterwards.
///
/// Returns `Ok` even when files failed or aborted; check
/// `report.stats.failed` and `report.stats.aborted`.
///
/// # Example
/// ```rust,no_run
/// use cbz_sanitizer::{sanitize, SanitizeConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = SanitizeConfig::default();
/// let report = sanitize(&config, "/data/comics/incoming").await?;
/// eprintln!(
///     "{} ok, {} failed",
///     report.stats.succeeded, report.stats.failed
/// );
/// # Ok(())
/// # }
/// ```
pub async fn sanitize(
    config: &SanitizeConfig,
    root: impl AsRef<Path>,
) -> Result<BatchReport, SanitizeError> {
    let start = Instant::now();
    let root = root.as_ref();
    info!("Starting sanitize: {}", root.display());

    let batch = prepare(config, root)?;
    let mut stats = BatchStats {
        discovered: batch.tasks.len(),
        ..Default::default()
    };
    if let Some(cb) = &config.progress_callback {
        cb.on_batch_start(stats.discovered);
    }

    let files: Vec<FileReport> = into_stream(batch.tasks, config).collect().await;
    for report in &files {
        stats.record(report);
    }

    // Every disposition is written; only now is an empty directory final.
    stats.directories_removed = run_cleanup(batch.cleanup_roots, batch.managed_root).await?;
    stats.duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Sanitize complete: {} ok, {} failed, {} aborted, {}ms",
        stats.succeeded, stats.failed, stats.aborted, stats.duration_ms
    );
    if let Some(cb) = &config.progress_callback {
        cb.on_batch_complete(&stats);
    }

    Ok(BatchReport { files, stats })
}

/// Synchronous wrapper around [`sanitize`].
///
/// Creates a temporary tokio runtime internally.
pub fn sanitize_sync(
    config: &SanitizeConfig,
    root: impl AsRef<Path>,
) -> Result<BatchReport, SanitizeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SanitizeError::TaskPanicked(format!("Failed to create tokio runtime: {e}")))?
        .block_on(sanitize(config, root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn discovery_keeps_recognized_suffixes_only() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for name in ["a.cbz", "b.CBR", "c.pdf", "d.epub", "e.rar", "f.zip", "notes.txt", "cover.jpg", "Sub/g.cbz"] {
            touch(&root.join(name));
        }

        let items = discover(root, &[]).unwrap();
        let mut rel: Vec<_> = items
            .iter()
            .map(|i| i.relative_path.to_string_lossy().into_owned())
            .collect();
        rel.sort();
        assert_eq!(
            rel,
            vec!["Sub/g.cbz", "a.cbz", "b.CBR", "c.pdf", "d.epub", "e.rar", "f.zip"]
        );
    }

    #[test]
    fn discovery_skips_excluded_dirs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("a.cbz"));
        touch(&root.join("managed/success/old.zip"));

        let items = discover(root, &[root.join("managed")]).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].relative_path, PathBuf::from("a.cbz"));
    }

    #[cfg(unix)]
    #[test]
    fn relative_root_with_absolute_managed_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("in");
        touch(&root.join("a.cbz"));
        touch(&root.join("managed/success/old.zip"));

        // Same directory, reached from the working directory with `..` hops.
        let cwd = std::env::current_dir().unwrap();
        let up: PathBuf = cwd.components().skip(1).map(|_| "..").collect();
        let spelled = up.join(root.strip_prefix("/").unwrap()).join(".");
        assert!(spelled.is_relative());
        let managed = root.canonicalize().unwrap().join("managed");

        let items = discover(&spelled, &[managed]).unwrap();
        let rel: Vec<_> = items.iter().map(|i| i.relative_path.clone()).collect();
        assert_eq!(rel, vec![PathBuf::from("a.cbz")]);
    }

    #[test]
    fn excluded_dir_matches_dotdot_spelling() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("in");
        touch(&root.join("a.cbz"));
        touch(&root.join("managed/success/old.zip"));

        let excluded = root.join("sub/../managed");
        std::fs::create_dir_all(root.join("sub")).unwrap();

        let items = discover(&root, &[excluded]).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn single_file_root_is_its_own_item() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Book.cbz");
        touch(&file);

        let items = discover(&file, &[]).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].relative_path, PathBuf::from("Book.cbz"));

        let other = dir.path().join("readme.md");
        touch(&other);
        assert!(discover(&other, &[]).unwrap().is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let err = discover(Path::new("/definitely/not/here"), &[]).unwrap_err();
        assert!(matches!(err, SanitizeError::RootNotFound { .. }));
    }
}
