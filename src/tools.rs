//! External collaborators: archive extraction and document rasterisation.
//!
//! Both are modelled as narrow traits so the pipeline never knows which
//! binary (or fake) produced the files it packs. The default implementations
//! spawn `unrar` and `pdftoppm` through `tokio::process`, with an optional
//! upper bound on wall-clock time. A tool that exceeds the bound is killed
//! (`kill_on_drop`) and reported as [`ToolError::Timeout`].

use crate::error::ToolError;
use futures::future::BoxFuture;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Text `unrar` prints when the input is not a RAR archive at all.
pub const NOT_RAR_MARKER: &str = "is not RAR archive";

/// Extracts a legacy compressed archive into a directory.
pub trait ArchiveExtractor: Send + Sync {
    /// Extract every file of `archive` into `out_dir` (which already exists).
    fn extract<'a>(&'a self, archive: &'a Path, out_dir: &'a Path)
        -> BoxFuture<'a, Result<(), ToolError>>;
}

/// Rendering parameters handed to a [`Rasterizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterParams {
    pub dpi: u32,
    /// Longest edge, in pixels, of each rendered page.
    pub scale_to: u32,
}

/// Renders every page of a paged document to one image file in a directory.
pub trait Rasterizer: Send + Sync {
    fn rasterize<'a>(
        &'a self,
        document: &'a Path,
        out_dir: &'a Path,
        params: RasterParams,
    ) -> BoxFuture<'a, Result<(), ToolError>>;
}

/// Process-backed extractor calling `unrar e`.
#[derive(Debug, Clone)]
pub struct Unrar {
    pub program: String,
    pub timeout: Option<Duration>,
}

impl Unrar {
    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl ArchiveExtractor for Unrar {
    fn extract<'a>(
        &'a self,
        archive: &'a Path,
        out_dir: &'a Path,
    ) -> BoxFuture<'a, Result<(), ToolError>> {
        Box::pin(async move {
            // unrar treats the destination as a directory only with a trailing separator.
            let mut dest = out_dir.as_os_str().to_os_string();
            dest.push(std::path::MAIN_SEPARATOR_STR);

            let args: Vec<OsString> = vec![
                "e".into(),
                "-y".into(),
                archive.as_os_str().to_os_string(),
                dest,
            ];

            run_tool(&self.program, &args, self.timeout)
                .await
                .map(|_| ())
                .map_err(|e| {
                    let e = classify_unrar_failure(e);
                    if matches!(e, ToolError::WrongFormat { .. }) {
                        warn!("{} is not a RAR archive", archive.display());
                    }
                    e
                })
        })
    }
}

/// Separate "not a RAR archive" from every other unrar failure.
fn classify_unrar_failure(err: ToolError) -> ToolError {
    match err {
        ToolError::Failed { program, output, .. } if output.contains(NOT_RAR_MARKER) => {
            ToolError::WrongFormat { program, output }
        }
        other => other,
    }
}

/// Process-backed rasterizer calling `pdftoppm -png`.
#[derive(Debug, Clone)]
pub struct Pdftoppm {
    pub program: String,
    pub timeout: Option<Duration>,
}

impl Pdftoppm {
    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl Rasterizer for Pdftoppm {
    fn rasterize<'a>(
        &'a self,
        document: &'a Path,
        out_dir: &'a Path,
        params: RasterParams,
    ) -> BoxFuture<'a, Result<(), ToolError>> {
        Box::pin(async move {
            let prefix = out_dir.join(document.file_stem().unwrap_or(document.as_os_str()));
            let args: Vec<OsString> = vec![
                "-scale-to".into(),
                params.scale_to.to_string().into(),
                "-r".into(),
                params.dpi.to_string().into(),
                "-png".into(),
                document.as_os_str().to_os_string(),
                prefix.into_os_string(),
            ];
            run_tool(&self.program, &args, self.timeout).await.map(|_| ())
        })
    }
}

/// Run `program args…`, returning combined stdout/stderr on success.
pub async fn run_tool(
    program: &str,
    args: &[OsString],
    timeout: Option<Duration>,
) -> Result<String, ToolError> {
    debug!("Running {} {:?}", program, args);

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let run = command.output();
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, run)
            .await
            .map_err(|_| ToolError::Timeout {
                program: program.to_string(),
                secs: limit.as_secs(),
            })?,
        None => run.await,
    }
    .map_err(|source| ToolError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(text)
    } else {
        Err(ToolError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            output: text,
        })
    }
}
