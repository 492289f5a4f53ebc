//! Bounded fan-out of per-video jobs
//!
//! Every video runs the full curation pipeline on tokio's blocking pool,
//! with at most `workers` videos in flight. Results are collected in
//! completion order and folded into a [`BatchReport`].

use crate::{
    backends::video::VideoBackend,
    config::{BatchOptions, CurationParams},
    error::{FrameSiftError, Result},
    processor::VideoCurationProcessor,
    services::{BatchProgressTracker, NoOpProgressReporter, ProgressReporter},
    types::{BatchReport, JobResult, ProcessingSummary, VideoJob},
};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Runs one independent curation job per video
pub struct BatchScheduler {
    processor: VideoCurationProcessor,
    options: BatchOptions,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl BatchScheduler {
    /// Create a scheduler; parameters and options are validated once here
    ///
    /// # Errors
    /// `InvalidConfig` when the parameters or options are out of range.
    pub fn new(
        backend: Arc<dyn VideoBackend>,
        params: CurationParams,
        options: BatchOptions,
    ) -> Result<Self> {
        params.validate()?;
        options.validate()?;

        Ok(Self {
            processor: VideoCurationProcessor::new(backend, Arc::new(params)),
            options,
            reporter: Arc::new(NoOpProgressReporter),
            cancel: CancellationToken::new(),
        })
    }

    /// Report batch progress to `reporter`
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Use an externally owned cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that interrupts the batch when cancelled
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Batch options in effect
    #[must_use]
    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Run every job and aggregate the results
    ///
    /// Jobs beyond the configured limit are dropped before dispatch. A job
    /// that panics becomes a failed result. Once the token is cancelled no
    /// further job starts, running jobs stop at their next frame, and the
    /// report is flagged as interrupted.
    ///
    /// # Errors
    /// `InvalidConfig` when two jobs share an output directory.
    #[instrument(skip_all, fields(jobs = jobs.len(), workers = self.options.workers))]
    pub async fn run(&self, mut jobs: Vec<VideoJob>) -> Result<BatchReport> {
        if let Some(limit) = self.options.limit {
            jobs.truncate(limit);
        }
        validate_jobs(&jobs)?;

        let total = jobs.len();
        info!(total, workers = self.options.workers, "Dispatching video jobs");
        self.reporter.report_batch_started(total);

        let processor = self
            .processor
            .clone()
            .with_cancellation(self.cancel.clone())
            .with_progress_reporter(Arc::clone(&self.reporter));
        let dry_run = processor.params().dry_run;

        let mut results = stream::iter(jobs.into_iter().map(|job| {
            let processor = processor.clone();
            let cancel = self.cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return None;
                }
                let VideoJob { video, output_dir } = job;
                let (task_video, task_output) = (video.clone(), output_dir.clone());
                let outcome =
                    tokio::task::spawn_blocking(move || processor.process(&task_video, &task_output))
                        .await;
                Some(outcome.unwrap_or_else(|e| join_failure(&video, &output_dir, dry_run, e)))
            }
        }))
        .buffer_unordered(self.options.workers);

        let mut tracker = BatchProgressTracker::new(total);
        let mut collected = Vec::with_capacity(total);
        while let Some(result) = results.next().await {
            let Some(result) = result else { continue };
            let stats = tracker.record(&result);
            self.reporter.report_job_completed(&result, &stats);
            collected.push(result);
        }

        let interrupted = self.cancel.is_cancelled();
        if interrupted {
            warn!(
                finished = collected.len(),
                skipped = total - collected.len(),
                "Batch interrupted"
            );
        }

        let report = BatchReport::from_results(collected, interrupted);
        info!(
            processed = report.videos_processed,
            failed = report.videos_failed,
            elapsed_ms = tracker.elapsed_ms(),
            "Batch finished"
        );
        self.reporter.report_batch_finished(&report);
        Ok(report)
    }
}

/// Reject job lists whose output directories are not pairwise distinct
///
/// # Errors
/// `InvalidConfig` naming the first shared directory.
pub fn validate_jobs(jobs: &[VideoJob]) -> Result<()> {
    let mut seen = HashSet::with_capacity(jobs.len());
    for job in jobs {
        if !seen.insert(job.output_dir.as_path()) {
            return Err(FrameSiftError::invalid_config(format!(
                "output directory '{}' is assigned to more than one video",
                job.output_dir.display()
            )));
        }
    }
    Ok(())
}

/// Turn a worker that died into a failed result
fn join_failure(video: &Path, output_dir: &Path, dry_run: bool, err: JoinError) -> JobResult {
    let message = if err.is_panic() {
        let payload = err.into_panic();
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        format!("worker panicked: {detail}")
    } else {
        "worker task was cancelled".to_string()
    };

    error!(video = %video.display(), "{message}");
    JobResult::failed(ProcessingSummary::new(video, output_dir, dry_run), message)
}
