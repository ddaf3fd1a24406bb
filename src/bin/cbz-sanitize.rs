//! CLI binary for cbz-sanitizer.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `SanitizeConfig` and prints the batch report.

use anyhow::{Context, Result};
use cbz_sanitizer::{
    sanitize, BatchStats, Disposition, FileReport, ProgressCallback, SanitizeConfig,
    SanitizeProgressCallback, TrashPolicy,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar for the batch, one log line per finished file. Files finish out
/// of order in parallel mode, so nothing here assumes discovery order.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix("Scanning");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl SanitizeProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        self.bar.set_length(total_files as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Sanitizing");
    }

    fn on_file_start(&self, relative_path: &Path) {
        self.bar.set_message(relative_path.display().to_string());
    }

    fn on_file_complete(&self, report: &FileReport) {
        let name = report.relative_path.display().to_string();
        let line = match &report.disposition {
            Disposition::Success => format!("  {} {}", green("✓"), name),
            Disposition::Failed {
                stage_index,
                stage_name,
            } => format!(
                "  {} {}  {}",
                red("✗"),
                name,
                dim(&format!("{stage_index:02}_{stage_name}"))
            ),
            Disposition::Aborted => format!(
                "  {} {}  {}",
                yellow("!"),
                name,
                red(report.error.as_deref().unwrap_or("aborted"))
            ),
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _stats: &BatchStats) {
        self.bar.finish_and_clear();
    }
}

/// Sanitize a folder of comic archives into canonical zip files.
#[derive(Parser, Debug)]
#[command(
    name = "cbz-sanitize",
    version,
    about = "Normalize comic archives (cbz, cbr, rar, pdf, epub) into canonical zip files",
    long_about = "Runs every recognized file under ROOT through a fixed list of stages \
(name cleanup, cbz→zip, rar extraction, junk removal, pdf rasterization, page renumbering, \
JPEG re-encoding). Results go to <managed>/success, failures to \
<managed>/failed/<NN>_<stage>, and originals to the trash.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto
)]
struct Cli {
    /// Folder to scan, or a single file.
    root: PathBuf,

    /// Process one file at a time with debug logs.
    #[arg(short, long, env = "SANITIZE_DEBUG")]
    debug: bool,

    /// Number of files processed at once.
    #[arg(short, long, env = "SANITIZE_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Directory receiving `success/` and `failed/` (default: <root parent>/managed).
    #[arg(long, env = "SANITIZE_MANAGED_DIR")]
    managed_dir: Option<PathBuf>,

    /// Move originals into this folder instead of the system trash.
    #[arg(long, env = "SANITIZE_TRASH_DIR")]
    trash_dir: Option<PathBuf>,

    /// Per-invocation timeout for unrar/pdftoppm, in seconds (0 = none).
    #[arg(long, env = "SANITIZE_TOOL_TIMEOUT", default_value_t = 600)]
    tool_timeout: u64,

    /// JPEG quality for re-encoded pages (1–100).
    #[arg(long, env = "SANITIZE_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Pages taller than this are resized.
    #[arg(long, env = "SANITIZE_HEIGHT", default_value_t = 2388)]
    height: u32,

    /// unrar executable.
    #[arg(long, env = "SANITIZE_UNRAR", default_value = "unrar")]
    unrar: String,

    /// pdftoppm executable.
    #[arg(long, env = "SANITIZE_PDFTOPPM", default_value = "pdftoppm")]
    pdftoppm: String,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "SANITIZE_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SANITIZE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SANITIZE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless debug output was asked for.
    let show_progress = !cli.quiet && !cli.json && !cli.verbose && !cli.debug;
    let filter = if cli.verbose || cli.debug {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn SanitizeProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    let report = sanitize(&config, &cli.root)
        .await
        .with_context(|| format!("Sanitize of {} failed", cli.root.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        let s = &report.stats;
        eprintln!(
            "{} {} ok  {} failed  {} aborted  {}ms",
            if s.failed == 0 && s.aborted == 0 {
                green("✔")
            } else {
                yellow("⚠")
            },
            bold(&s.succeeded.to_string()),
            s.failed,
            s.aborted,
            s.duration_ms
        );
        if s.directories_removed > 0 {
            eprintln!("   {}", dim(&format!("{} empty folders removed", s.directories_removed)));
        }
    }

    // Failed files are the expected steady state, not a fatal outcome.
    Ok(())
}

/// Map CLI args to `SanitizeConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<SanitizeConfig> {
    let tool_timeout = (cli.tool_timeout > 0).then(|| Duration::from_secs(cli.tool_timeout));

    let mut builder = SanitizeConfig::builder()
        .sequential(cli.debug)
        .jpeg_quality(cli.quality)
        .target_height(cli.height)
        .tool_timeout(tool_timeout)
        .unrar_program(&cli.unrar)
        .pdftoppm_program(&cli.pdftoppm);

    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(ref dir) = cli.managed_dir {
        builder = builder.managed_root(dir);
    }
    if let Some(ref dir) = cli.trash_dir {
        builder = builder.trash(TrashPolicy::Folder(dir.clone()));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
