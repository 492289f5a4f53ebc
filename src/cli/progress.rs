//! Terminal progress bar for batch runs

use crate::{
    services::{BatchProcessingStats, ProgressReporter, ProgressUpdate},
    types::{BatchReport, JobResult},
};
use indicatif::{ProgressBar, ProgressStyle};

/// Progress reporter drawing one bar tick per finished video
pub(crate) struct IndicatifProgressReporter {
    bar: ProgressBar,
    verbose: bool,
}

impl IndicatifProgressReporter {
    /// Create a hidden bar; it becomes visible when the batch starts
    pub(crate) fn new(verbose: bool) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { bar, verbose }
    }
}

impl ProgressReporter for IndicatifProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            self.bar
                .set_message(format!("{}: {}", update.video, update.description));
        }
    }

    fn report_job_completed(&self, result: &JobResult, stats: &BatchProcessingStats) {
        let summary = result.summary();
        if let Some(message) = summary.failure_message() {
            self.bar
                .println(format!("✗ {}: {}", summary.video, message));
        } else if self.verbose {
            self.bar.println(format!(
                "✓ {}: kept {} of {}",
                summary.video, summary.final_frames, summary.extracted_frames
            ));
        }
        self.bar.set_position(stats.items_completed as u64);
        self.bar.set_message(summary.video.clone());
    }

    fn report_batch_started(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar
            .set_draw_target(indicatif::ProgressDrawTarget::stderr());
    }

    fn report_batch_finished(&self, report: &BatchReport) {
        let message = if report.interrupted {
            "interrupted"
        } else {
            "done"
        };
        self.bar.finish_with_message(message);
    }
}
