//! Pipeline executor: run every stage on one file's working copy, then place
//! the result under `success/` or `failed/{NN}_{stage}/`.
//!
//! ## Lifecycle of one file
//!
//! ```text
//! original ──copy──▶ working dir ──stage 0..n──▶ placed ──▶ original trashed
//!                                     │
//!                                     └─ first StageError: stop, place last good copy
//! ```
//!
//! The original is read once (to make the working copy) and otherwise only
//! touched after the placement succeeded. Placement never overwrites: an
//! occupied destination aborts the task with [`SanitizeError::Collision`].

use crate::config::ManagedLayout;
use crate::error::{SanitizeError, StageError};
use crate::item::FileItem;
use crate::output::{Disposition, FileReport};
use crate::pipeline::{Stage, StageContext};
use crate::progress::ProgressCallback;
use crate::trash::RecoverableTrash;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Name prefix of per-task working directories under the managed root.
pub(crate) const WORK_DIR_PREFIX: &str = ".work-";

/// The stage that stopped a file, and what was left of it.
#[derive(Debug)]
pub struct StageFailure {
    pub index: usize,
    pub name: &'static str,
    /// Output of the last stage that succeeded (the working copy itself when
    /// the first stage failed).
    pub last_good_path: PathBuf,
    pub error: StageError,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {:02} {} failed: {}", self.index, self.name, self.error)
    }
}

/// Result of threading one path through the stage list.
#[derive(Debug)]
pub enum PipelineOutcome {
    Success { final_path: PathBuf },
    Failure(StageFailure),
}

/// Run `stages` in order on `path`, stopping at the first error.
pub async fn run_stages(
    path: PathBuf,
    stages: &[Stage],
    ctx: &Arc<StageContext>,
    relative: &Path,
    progress: Option<&ProgressCallback>,
) -> PipelineOutcome {
    let mut current = path;

    for (index, stage) in stages.iter().enumerate() {
        debug!("[{}] stage {:02} {}", relative.display(), index, stage.name);
        match (stage.run)(current.clone(), Arc::clone(ctx)).await {
            Ok(next) => {
                if next != current {
                    info!(
                        "[{}] {}: {} → {}",
                        relative.display(),
                        stage.name,
                        file_name_lossy(&current),
                        file_name_lossy(&next)
                    );
                }
                current = next;
                if let Some(cb) = progress {
                    cb.on_stage_complete(relative, index, stage.name);
                }
            }
            Err(error) => {
                warn!(
                    "[{}] stage {:02} {} failed: {}",
                    relative.display(),
                    index,
                    stage.name,
                    error
                );
                return PipelineOutcome::Failure(StageFailure {
                    index,
                    name: stage.name,
                    last_good_path: current,
                    error,
                });
            }
        }
    }

    PipelineOutcome::Success {
        final_path: current,
    }
}

fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Everything one file's task needs, owned by value.
#[derive(Clone)]
pub struct FileTask {
    pub item: FileItem,
    pub layout: ManagedLayout,
    pub stages: Arc<[Stage]>,
    pub context: Arc<StageContext>,
    pub trash: Arc<dyn RecoverableTrash>,
    pub progress: Option<ProgressCallback>,
}

impl fmt::Debug for FileTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTask")
            .field("item", &self.item)
            .field("layout", &self.layout)
            .field("stages", &self.stages.len())
            .finish_non_exhaustive()
    }
}

impl FileTask {
    /// Process the file to its disposition.
    ///
    /// Stage failures are not errors here: they produce a
    /// [`Disposition::Failed`] report. `Err` means no disposition was
    /// written and the original is untouched.
    pub async fn run(self) -> Result<FileReport, SanitizeError> {
        let relative = self.item.relative_path.clone();
        if let Some(cb) = &self.progress {
            cb.on_file_start(&relative);
        }
        info!("[{}] start", relative.display());

        let workdir = tempfile::Builder::new()
            .prefix(WORK_DIR_PREFIX)
            .tempdir_in(&self.layout.root)
            .map_err(|e| SanitizeError::io("create working directory", &self.layout.root, e))?;
        let working = workdir.path().join(name_of(&self.item.original_path)?);
        tokio::fs::copy(&self.item.original_path, &working)
            .await
            .map_err(|e| SanitizeError::io("copy to working directory", &self.item.original_path, e))?;

        let outcome = run_stages(
            working,
            &self.stages,
            &self.context,
            &relative,
            self.progress.as_ref(),
        )
        .await;

        let (produced, destination, disposition, stage_error) = match outcome {
            PipelineOutcome::Success { final_path } => {
                let dest = self.layout.success_path(&relative, name_of(&final_path)?);
                (final_path, dest, Disposition::Success, None)
            }
            PipelineOutcome::Failure(failure) => {
                let dest = self.layout.failure_path(
                    failure.index,
                    failure.name,
                    &relative,
                    name_of(&failure.last_good_path)?,
                );
                let disposition = Disposition::Failed {
                    stage_index: failure.index,
                    stage_name: failure.name.to_string(),
                };
                (failure.last_good_path, dest, disposition, Some(failure.error.to_string()))
            }
        };

        let src = produced.clone();
        let dest = destination.clone();
        tokio::task::spawn_blocking(move || place(&src, &dest))
            .await
            .map_err(|e| SanitizeError::TaskPanicked(e.to_string()))??;
        info!("[{}] placed at {}", relative.display(), destination.display());
        drop(workdir);

        let original = self.item.original_path.clone();
        let trash = Arc::clone(&self.trash);
        let rel = relative.clone();
        let trashed = tokio::task::spawn_blocking(move || trash.discard(&original, &rel))
            .await
            .map_err(|e| SanitizeError::TaskPanicked(e.to_string()))?;
        let error = match trashed {
            Ok(()) => stage_error,
            Err(e) => {
                error!("[{}] {}", relative.display(), e);
                Some(match stage_error {
                    Some(stage) => format!("{stage}; {e}"),
                    None => e.to_string(),
                })
            }
        };

        Ok(FileReport {
            relative_path: relative,
            disposition,
            destination: Some(destination),
            error,
        })
    }
}

fn name_of(path: &Path) -> Result<&std::ffi::OsStr, SanitizeError> {
    path.file_name().ok_or_else(|| {
        SanitizeError::io(
            "resolve file name",
            path,
            std::io::Error::new(ErrorKind::InvalidInput, "path has no file name"),
        )
    })
}

/// Place `src` at `dest` without ever replacing an existing file.
///
/// A hard link is created when both sides share a filesystem; otherwise the
/// bytes are copied into a temporary file next to `dest` and linked into
/// place with a no-clobber rename.
pub(crate) fn place(src: &Path, dest: &Path) -> Result<(), SanitizeError> {
    let parent = dest.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)
        .map_err(|e| SanitizeError::io("create destination directory", parent, e))?;

    match std::fs::hard_link(src, dest) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(SanitizeError::Collision {
                path: dest.to_path_buf(),
            })
        }
        Err(e) => debug!("hard link {} failed ({}), copying", dest.display(), e),
    }

    let mut tmp = tempfile::Builder::new()
        .prefix(".place-")
        .tempfile_in(parent)
        .map_err(|e| SanitizeError::io("create temporary destination", parent, e))?;
    let mut input = std::fs::File::open(src).map_err(|e| SanitizeError::io("open", src, e))?;
    std::io::copy(&mut input, tmp.as_file_mut())
        .map_err(|e| SanitizeError::io("copy to destination", dest, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| SanitizeError::io("sync destination", dest, e))?;

    match tmp.persist_noclobber(dest) {
        Ok(_) => Ok(()),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Err(SanitizeError::Collision {
            path: dest.to_path_buf(),
        }),
        Err(e) => Err(SanitizeError::io("move into place", dest, e.error)),
    }
}
