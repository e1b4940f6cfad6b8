//! CLI binary for batch-convert.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConverterConfig`, runs one batch through a `ConverterSession` and saves
//! the converted files.

use anyhow::{Context, Result};
use batch_convert::config::DEFAULT_BASE_URL;
use batch_convert::{
    BatchEvent, BatchStats, ConversionTask, ConverterConfig, ConverterSession, ErrorInfo,
    FormatCatalog, HttpRemoteService, NoopNotificationSink, NotificationSink, SharedSink,
    SkippedFile, TaskStatus, TracingNotificationSink,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI notification sink using indicatif ────────────────────────────────────

/// Terminal sink: one log line per file above a progress bar.
///
/// The bar itself is advanced from the batch event stream; the sink only
/// prints outcomes.
struct CliProgressSink {
    bar: ProgressBar,
}

impl CliProgressSink {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn bar(&self) -> ProgressBar {
        self.bar.clone()
    }
}

impl NotificationSink for CliProgressSink {
    fn files_added(&self, count: usize) {
        self.bar
            .println(format!("{} {}", cyan("◆"), bold(&format!("{count} file(s) staged"))));
    }

    fn skipped_incompatible(&self, file_name: &str, from: &str, to: &str) {
        let from = if from.is_empty() { "(no extension)" } else { from };
        self.bar.println(format!(
            "  {} {}  {}",
            yellow("–"),
            file_name,
            dim(&format!("cannot convert {from} to {to}")),
        ));
    }

    fn conversion_succeeded(&self, task: &ConversionTask) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            task.file_name(),
            dim(&format!("{} → {}", task.from_format(), task.to_format())),
        ));
    }

    fn conversion_failed(&self, task: &ConversionTask, error: &ErrorInfo) {
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            task.file_name(),
            red(&truncate(&error.message, 80)),
        ));
    }

    fn download_succeeded(&self, file_name: &str) {
        eprintln!("  {} saved {}", green("↓"), file_name);
    }

    fn download_failed(&self, message: &str) {
        eprintln!("  {} {}", red("↓"), red(&truncate(message, 80)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert two documents to PDF into the current directory
  batchconv report.docx notes.txt --to pdf

  # Convert images to PNG into ./out, against a remote server
  batchconv --server http://converter:8000 -o out scan1.jpg scan2.bmp --to png

  # Convert without downloading, JSON report on stdout
  batchconv --no-download --json data.xlsx --to csv > report.json

  # Delete server-side copies after downloading
  batchconv --cleanup photo.jpg --to png

  # Show the local format table / what the server supports
  batchconv --list-formats
  batchconv --check-server

SUPPORTED FORMATS:
  Category     Extensions
  ───────────  ─────────────────────
  Document     docx, txt, pdf
  Spreadsheet  xlsx, csv
  Image        jpg, jpeg, png, bmp

  Files are only converted within their category. Other files are skipped.

ENVIRONMENT VARIABLES:
  BATCHCONV_SERVER          Conversion service base URL
  BATCHCONV_TO              Target format
  BATCHCONV_OUTPUT_DIR      Directory for converted files
  RUST_LOG                  Override the log filter (e.g. batch_convert=debug)
"#;

/// Convert batches of files through a conversion service.
#[derive(Parser, Debug)]
#[command(
    name = "batchconv",
    version,
    about = "Convert batches of files through a conversion service",
    long_about = "Upload local documents, spreadsheets and images to a conversion service, \
convert each one to the chosen target format, and download the results. Files are processed \
one at a time; a failing file never stops the batch.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Files to convert.
    files: Vec<PathBuf>,

    /// Target format (e.g. pdf, csv, png).
    #[arg(short, long, env = "BATCHCONV_TO")]
    to: Option<String>,

    /// Base URL of the conversion service.
    #[arg(long, env = "BATCHCONV_SERVER", default_value = DEFAULT_BASE_URL)]
    server: String,

    /// Directory for converted files.
    #[arg(short, long, env = "BATCHCONV_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Convert only; do not download the results.
    #[arg(long, env = "BATCHCONV_NO_DOWNLOAD")]
    no_download: bool,

    /// Delete server-side files after a successful download.
    #[arg(long, env = "BATCHCONV_CLEANUP", conflicts_with = "no_download")]
    cleanup: bool,

    /// Print the local format table and exit.
    #[arg(long)]
    list_formats: bool,

    /// Ask the server which formats it supports and exit.
    #[arg(long)]
    check_server: bool,

    /// Print a JSON report on stdout.
    #[arg(long, env = "BATCHCONV_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "BATCHCONV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BATCHCONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "BATCHCONV_QUIET")]
    quiet: bool,

    /// TCP connect timeout in seconds.
    #[arg(long, env = "BATCHCONV_CONNECT_TIMEOUT", default_value_t = 10)]
    connect_timeout: u64,

    /// Upload/convert call timeout in seconds.
    #[arg(long, env = "BATCHCONV_REQUEST_TIMEOUT", default_value_t = 120)]
    request_timeout: u64,

    /// Per-file download timeout in seconds.
    #[arg(long, env = "BATCHCONV_DOWNLOAD_TIMEOUT", default_value_t = 30)]
    download_timeout: u64,
}

/// What `--json` prints.
#[derive(Serialize)]
struct JsonReport<'a> {
    stats: &'a BatchStats,
    tasks: &'a [ConversionTask],
    skipped: &'a [SkippedFile],
    downloaded: &'a [PathBuf],
    download_errors: &'a [String],
    cleanup_errors: &'a [String],
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
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

    // ── Format table ─────────────────────────────────────────────────────
    if cli.list_formats {
        print_catalog(cli.json)?;
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let config = ConverterConfig::builder()
        .base_url(cli.server.clone())
        .connect_timeout_secs(cli.connect_timeout)
        .request_timeout_secs(cli.request_timeout)
        .download_timeout_secs(cli.download_timeout)
        .build()
        .context("Invalid configuration")?;
    let service = Arc::new(HttpRemoteService::new(&config).context("Failed to create client")?);

    // ── Server check ─────────────────────────────────────────────────────
    if cli.check_server {
        let session = ConverterSession::new(service, &config);
        let formats = session
            .supported_formats()
            .await
            .with_context(|| format!("Server at {} is not reachable", config.base_url))?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&formats).context("Failed to serialise formats")?
            );
        } else {
            println!("Server:   {}", config.base_url);
            println!("Input:    {}", formats.input_formats.join(", "));
            println!("Output:   {}", formats.output_formats.join(", "));
        }
        return Ok(());
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let progress = show_progress.then(|| CliProgressSink::new(cli.files.len()));
    let sink: SharedSink = match &progress {
        Some(p) => Arc::clone(p) as SharedSink,
        None if cli.quiet || cli.json => Arc::new(NoopNotificationSink),
        None => Arc::new(TracingNotificationSink),
    };

    let mut session = ConverterSession::new(service, &config).with_sink(sink);
    session
        .add_paths(&cli.files)
        .await
        .context("Failed to read input files")?;
    if let Some(ref to) = cli.to {
        session.set_target_format(to);
    }

    let bar = progress.as_ref().map(|p| p.bar());
    let stats = session
        .convert_all_with(|event| {
            let Some(bar) = &bar else { return };
            match event {
                BatchEvent::Task(task) if task.status() == TaskStatus::Converting => {
                    bar.set_message(task.file_name().to_string());
                }
                BatchEvent::Task(task) if task.is_terminal() => bar.inc(1),
                BatchEvent::Skipped(_) => bar.inc(1),
                BatchEvent::Task(_) => {}
            }
        })
        .await
        .context("Conversion failed")?;
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    // ── Download ─────────────────────────────────────────────────────────
    let mut downloaded = Vec::new();
    let mut download_errors = Vec::new();
    let mut cleanup_errors = Vec::new();
    if !cli.no_download {
        let completed: Vec<String> = session
            .tasks()
            .iter()
            .filter(|t| t.status() == TaskStatus::Completed)
            .map(|t| t.id().to_string())
            .collect();

        for id in completed {
            match session.download(&id, &cli.output_dir).await {
                Ok(path) => {
                    downloaded.push(path);
                    if cli.cleanup {
                        if let Err(e) = session.cleanup(&id).await {
                            tracing::warn!("Cleanup of task {} failed: {}", id, e);
                            cleanup_errors.push(e.to_string());
                        }
                    }
                }
                Err(e) => download_errors.push(e.to_string()),
            }
        }
    }

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        let report = JsonReport {
            stats: &stats,
            tasks: session.tasks(),
            skipped: session.skipped(),
            downloaded: &downloaded,
            download_errors: &download_errors,
            cleanup_errors: &cleanup_errors,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        print_summary(
            &stats,
            downloaded.len(),
            download_errors.len(),
            cleanup_errors.len(),
            &cli.output_dir,
        );
    }

    let failures = stats.failed + download_errors.len();
    if failures > 0 {
        anyhow::bail!("{failures} file(s) could not be converted or downloaded");
    }
    Ok(())
}

fn print_summary(
    stats: &BatchStats,
    downloaded: usize,
    download_errors: usize,
    cleanup_errors: usize,
    dir: &std::path::Path,
) {
    let ok = stats.failed == 0 && download_errors == 0;
    eprintln!(
        "{}  {}/{} converted  {} skipped  {}ms",
        if ok { green("✔") } else { cyan("⚠") },
        bold(&stats.completed.to_string()),
        stats.submitted,
        stats.skipped,
        stats.duration_ms,
    );
    if stats.failed > 0 {
        eprintln!("   {} conversion(s) failed", red(&stats.failed.to_string()));
    }
    if downloaded > 0 {
        eprintln!("   {} file(s) saved to {}", downloaded, bold(&dir.display().to_string()));
    }
    if download_errors > 0 {
        eprintln!("   {} download(s) failed", red(&download_errors.to_string()));
    }
    if cleanup_errors > 0 {
        eprintln!(
            "   {} server cleanup(s) failed; files may remain on the server",
            red(&cleanup_errors.to_string())
        );
    }
}

fn print_catalog(json: bool) -> Result<()> {
    let catalog = FormatCatalog::standard();
    if json {
        let table: Vec<_> = catalog
            .categories()
            .iter()
            .map(|c| serde_json::json!({ "category": c.name, "extensions": c.extensions }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&table).context("Failed to serialise formats")?
        );
    } else {
        for category in catalog.categories() {
            println!("{:<12} {}", category.name, category.extensions.join(", "));
        }
    }
    Ok(())
}

/// Shorten `s` to at most `max` characters.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{head}\u{2026}")
}
