//! Progress reporting service
//!
//! Separates progress reporting from the curation pipeline so each frontend
//! can render it its own way. The processor reports per-video stages and
//! the scheduler reports each completed job together with batch statistics.

use crate::types::{BatchReport, JobResult};
use instant::Instant;

/// Stages of one video's curation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Decoding and persisting sampled frames
    Sampling,
    /// Scoring and deleting blurry frames
    SharpnessFiltering,
    /// Comparing and deleting near-duplicate frames
    DuplicateElimination,
    /// All stages done
    Completed,
}

impl ProcessingStage {
    /// Human-readable description of the stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Sampling => "Extracting frames",
            Self::SharpnessFiltering => "Removing blurry frames",
            Self::DuplicateElimination => "Removing duplicate frames",
            Self::Completed => "Curation completed",
        }
    }

    /// Rough share of a video's work done when the stage starts
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            Self::Sampling => 0,
            Self::SharpnessFiltering => 50,
            Self::DuplicateElimination => 65,
            Self::Completed => 100,
        }
    }
}

/// Stage change of one video
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Video identifier
    pub video: String,
    /// Stage being entered
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Stage description
    pub description: String,
    /// Time since the video's job started
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create an update for `video` entering `stage`
    #[must_use]
    pub fn new(video: impl Into<String>, stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            video: video.into(),
            stage,
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        }
    }
}

/// Batch statistics after a job completed
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProcessingStats {
    /// Jobs finished so far, failed ones included
    pub items_completed: usize,
    /// Jobs in the batch
    pub items_total: usize,
    /// Jobs that failed so far
    pub items_failed: usize,
    /// Videos per second since the batch started
    pub processing_rate: f64,
    /// Estimated seconds until the batch is done
    pub eta_seconds: Option<u64>,
}

/// Trait for reporting curation progress
pub trait ProgressReporter: Send + Sync {
    /// A video entered a new stage
    fn report_progress(&self, update: ProgressUpdate);

    /// A job finished, successfully or not
    fn report_job_completed(&self, result: &JobResult, stats: &BatchProcessingStats);

    /// The batch is about to dispatch `total` jobs
    fn report_batch_started(&self, _total: usize) {}

    /// The batch report is assembled
    fn report_batch_finished(&self, _report: &BatchReport) {}
}

/// No-op progress reporter
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_job_completed(&self, _result: &JobResult, _stats: &BatchProcessingStats) {}
}

/// Progress reporter that writes through `tracing`
#[derive(Debug, Clone, Copy)]
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to log every stage change
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            tracing::info!(
                video = %update.video,
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        }
    }

    fn report_job_completed(&self, result: &JobResult, stats: &BatchProcessingStats) {
        let summary = result.summary();
        match summary.failure_message() {
            None => tracing::info!(
                "[{}/{}] {}: extracted {}, blurry {}, duplicates {}, kept {}",
                stats.items_completed,
                stats.items_total,
                summary.video,
                summary.extracted_frames,
                summary.blurry_frames_removed,
                summary.duplicate_frames_removed,
                summary.final_frames
            ),
            Some(message) => tracing::error!(
                "[{}/{}] {} failed: {}",
                stats.items_completed,
                stats.items_total,
                summary.video,
                message
            ),
        }
    }

    fn report_batch_started(&self, total: usize) {
        tracing::info!("Curating {} video(s)", total);
    }

    fn report_batch_finished(&self, report: &BatchReport) {
        tracing::info!(
            processed = report.videos_processed,
            failed = report.videos_failed,
            interrupted = report.interrupted,
            "Batch finished"
        );
    }
}

/// Tracks batch timing and turns completions into statistics
#[derive(Debug)]
pub struct BatchProgressTracker {
    start_time: Instant,
    total: usize,
    completed: usize,
    failed: usize,
}

impl BatchProgressTracker {
    /// Start tracking a batch of `total` jobs
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            start_time: Instant::now(),
            total,
            completed: 0,
            failed: 0,
        }
    }

    /// Record a finished job and return the updated statistics
    pub fn record(&mut self, result: &JobResult) -> BatchProcessingStats {
        self.completed += 1;
        if result.is_failed() {
            self.failed += 1;
        }
        self.stats()
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> BatchProcessingStats {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let processing_rate = if elapsed > 0.0 {
            self.completed as f64 / elapsed
        } else {
            0.0
        };
        let remaining = self.total.saturating_sub(self.completed);
        let eta_seconds = if remaining == 0 {
            Some(0)
        } else if processing_rate > 0.0 {
            Some((remaining as f64 / processing_rate).ceil() as u64)
        } else {
            None
        };

        BatchProcessingStats {
            items_completed: self.completed,
            items_total: self.total,
            items_failed: self.failed,
            processing_rate,
            eta_seconds,
        }
    }

    /// Milliseconds since the batch started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProcessingSummary;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingReporter {
        updates: Arc<Mutex<Vec<ProgressUpdate>>>,
        completions: Arc<Mutex<Vec<(String, usize)>>>,
    }

    impl ProgressReporter for RecordingReporter {
        fn report_progress(&self, update: ProgressUpdate) {
            self.updates.lock().unwrap().push(update);
        }

        fn report_job_completed(&self, result: &JobResult, stats: &BatchProcessingStats) {
            self.completions
                .lock()
                .unwrap()
                .push((result.summary().video.clone(), stats.items_completed));
        }
    }

    fn completed(name: &str) -> JobResult {
        JobResult::Completed(ProcessingSummary::new(Path::new(name), Path::new("/out"), false))
    }

    #[test]
    fn test_processing_stage_descriptions() {
        assert_eq!(ProcessingStage::Sampling.description(), "Extracting frames");
        assert_eq!(
            ProcessingStage::DuplicateElimination.description(),
            "Removing duplicate frames"
        );
        assert_eq!(ProcessingStage::Completed.progress_percentage(), 100);
    }

    #[test]
    fn test_stage_percentages_increase() {
        let stages = [
            ProcessingStage::Sampling,
            ProcessingStage::SharpnessFiltering,
            ProcessingStage::DuplicateElimination,
            ProcessingStage::Completed,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].progress_percentage() < pair[1].progress_percentage());
        }
    }

    #[test]
    fn test_progress_update_creation() {
        let update = ProgressUpdate::new("clip.mp4", ProcessingStage::SharpnessFiltering, Instant::now());
        assert_eq!(update.video, "clip.mp4");
        assert_eq!(update.progress, 50);
        assert_eq!(update.description, "Removing blurry frames");
        assert!(update.elapsed_ms < 1000);
    }

    #[test]
    fn test_no_op_progress_reporter() {
        let reporter = NoOpProgressReporter;
        reporter.report_batch_started(1);
        reporter.report_progress(ProgressUpdate::new("a.mp4", ProcessingStage::Sampling, Instant::now()));
        let mut tracker = BatchProgressTracker::new(1);
        let result = completed("a.mp4");
        reporter.report_job_completed(&result, &tracker.record(&result));
    }

    #[test]
    fn test_tracker_counts_failures_and_finishes() {
        let mut tracker = BatchProgressTracker::new(3);
        assert_eq!(tracker.stats().items_completed, 0);

        tracker.record(&completed("a.mp4"));
        let failed = JobResult::failed(
            ProcessingSummary::new(Path::new("b.mp4"), Path::new("/out"), false),
            "boom",
        );
        let stats = tracker.record(&failed);
        assert_eq!(stats.items_completed, 2);
        assert_eq!(stats.items_failed, 1);
        assert_eq!(stats.items_total, 3);

        let stats = tracker.record(&completed("c.mp4"));
        assert_eq!(stats.eta_seconds, Some(0));
    }

    #[test]
    fn test_reporter_receives_completions_in_order_given() {
        let reporter = RecordingReporter::default();
        let completions = reporter.completions.clone();
        let updates = reporter.updates.clone();
        let mut tracker = BatchProgressTracker::new(2);

        for name in ["b.mp4", "a.mp4"] {
            reporter.report_progress(ProgressUpdate::new(name, ProcessingStage::Completed, Instant::now()));
            let result = completed(name);
            let stats = tracker.record(&result);
            reporter.report_job_completed(&result, &stats);
        }

        assert_eq!(
            *completions.lock().unwrap(),
            vec![("b.mp4".to_string(), 1), ("a.mp4".to_string(), 2)]
        );
        assert_eq!(updates.lock().unwrap().len(), 2);
    }
}
