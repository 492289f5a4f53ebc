//! Frame curation CLI tool
//!
//! Command-line interface that discovers videos, plans one output directory
//! per video, runs the batch scheduler and prints the report.

use super::config::CliConfigBuilder;
use super::progress::IndicatifProgressReporter;
use crate::{
    backends::video::VideoBackend,
    config::{
        DEFAULT_DUPLICATE_THRESHOLD, DEFAULT_SHARPNESS_THRESHOLD, DEFAULT_STRIDE,
    },
    scheduler::BatchScheduler,
    services::{find_video_files, plan_output_dirs, FrameIOService, InputKind},
    tracing_config::{spans, TracingConfig, TracingFormat},
    types::BatchReport,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};

/// Exit status when the run was interrupted (128 + SIGINT)
const EXIT_INTERRUPTED: u8 = 130;

/// Extracts sharp, non-redundant frames from videos
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "framesift")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Video file or directory of videos
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output directory [default: <stem>_frames for a file, <dir>/Processed_Frames for a directory]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Keep every Nth frame
    #[arg(long, default_value_t = DEFAULT_STRIDE)]
    pub interval: u32,

    /// Minimum focus measure; frames below it are deleted
    #[arg(long, default_value_t = DEFAULT_SHARPNESS_THRESHOLD)]
    pub sharpness: u32,

    /// Similarity (0.0-1.0) at which a later frame counts as a duplicate
    #[arg(long, default_value_t = DEFAULT_DUPLICATE_THRESHOLD)]
    pub duplicate: f64,

    /// Rotate frames clockwise by 0, 90, 180 or 270 degrees
    #[arg(long, default_value_t = 0)]
    pub rotate: u16,

    /// Report what would be extracted without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Process at most this many videos (0 = no limit)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Videos processed in parallel (0 = number of CPUs)
    #[arg(short, long, default_value_t = 0)]
    pub workers: usize,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Search the input directory recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Only process videos whose file name matches this glob (e.g. "*.mp4")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Write the batch report as JSON to this file
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

/// Run the CLI and return the process exit code
///
/// # Errors
/// Invalid arguments, unreadable input and unusable output roots.
pub async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let run_id = uuid::Uuid::new_v4().to_string();

    let _tracing_guard = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(TracingFormat::Console)
        .with_run_id(run_id.clone())
        .init()
        .context("Failed to initialize tracing subscriber")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let params = CliConfigBuilder::params_from_cli(&cli)?;
    let options = CliConfigBuilder::options_from_cli(&cli)?;

    let input = InputKind::classify(&cli.input).context("Invalid input")?;
    let mut videos = discover_videos(&cli, &input)?;
    if videos.is_empty() {
        println!("No video files found in {}", cli.input.display());
        return Ok(ExitCode::SUCCESS);
    }
    if let Some(limit) = options.limit {
        videos.truncate(limit);
    }

    let output_root = cli
        .output
        .clone()
        .unwrap_or_else(|| input.default_output_root());
    check_output_root(&output_root, params.dry_run)?;

    let jobs = plan_output_dirs(&videos, &output_root, input.is_single_file());
    info!(
        videos = jobs.len(),
        output = %output_root.display(),
        workers = options.workers,
        "Starting frame curation"
    );

    let dry_run = params.dry_run;
    let reporter = Arc::new(IndicatifProgressReporter::new(cli.verbose > 0));
    let scheduler = BatchScheduler::new(create_backend()?, params, options)
        .context("Invalid curation parameters")?
        .with_progress_reporter(reporter);

    let token = scheduler.cancellation_token();
    let interrupt_watcher = tokio::spawn(cancel_on_interrupt(token.clone()));

    let report = scheduler
        .run(jobs)
        .instrument(spans::batch(&run_id, videos.len(), dry_run))
        .await
        .context("Failed to run batch")?;
    interrupt_watcher.abort();

    print_report(&report);
    if let Some(path) = &cli.report {
        write_report(&report, path)?;
        println!("Report written to {}", path.display());
    }

    Ok(exit_code(&report))
}

/// Videos to process for the given input, sorted for stable dispatch
fn discover_videos(cli: &Cli, input: &InputKind) -> Result<Vec<PathBuf>> {
    match input {
        InputKind::SingleFile(path) => Ok(vec![path.clone()]),
        InputKind::Directory(dir) => find_video_files(dir, cli.recursive, cli.pattern.as_deref())
            .with_context(|| format!("Failed to scan {}", dir.display())),
    }
}

/// Make sure an existing output root can take new directories
fn check_output_root(output_root: &Path, dry_run: bool) -> Result<()> {
    if dry_run {
        // No probe file under dry-run: only reject a root that is not a directory
        if output_root.exists() && !output_root.is_dir() {
            anyhow::bail!("Output path {} is not a directory", output_root.display());
        }
        return Ok(());
    }
    FrameIOService::ensure_writable_dir(output_root).context("Unusable output directory")
}

#[cfg(feature = "video-support")]
fn create_backend() -> Result<Arc<dyn VideoBackend>> {
    Ok(Arc::new(crate::backends::video::FFmpegBackend::new()))
}

#[cfg(not(feature = "video-support"))]
fn create_backend() -> Result<Arc<dyn VideoBackend>> {
    anyhow::bail!("Video decoding is not available; rebuild with --features video-support")
}

async fn cancel_on_interrupt(token: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Interrupt received; finishing in-flight frames and stopping");
        token.cancel();
    }
}

fn print_report(report: &BatchReport) {
    println!();
    println!("Processing summary:");
    for summary in &report.summaries {
        match summary.failure_message() {
            None => println!(
                "  {}: extracted {}, blurry removed {}, duplicates removed {}, kept {}",
                summary.video,
                summary.extracted_frames,
                summary.blurry_frames_removed,
                summary.duplicate_frames_removed,
                summary.final_frames
            ),
            Some(message) => println!("  {}: FAILED ({})", summary.video, message),
        }
    }

    println!();
    println!(
        "Videos: {} processed, {} failed",
        report.videos_processed, report.videos_failed
    );
    println!(
        "Frames: {} extracted, {} blurry removed, {} duplicates removed, {} kept",
        report.total_extracted,
        report.total_blurry_removed,
        report.total_duplicates_removed,
        report.total_final
    );
    if report.interrupted {
        println!("Run was interrupted; frames already written were kept");
    }
}

fn write_report(report: &BatchReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

fn exit_code(report: &BatchReport) -> ExitCode {
    if report.interrupted {
        ExitCode::from(EXIT_INTERRUPTED)
    } else if report.videos_failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
