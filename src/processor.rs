//! Per-video curation processor
//!
//! This module provides the `VideoCurationProcessor` that runs the three
//! curation stages for one video, strictly in order, against that video's
//! private output directory:
//!
//! 1. [`FrameSampler`] writes every k-th frame,
//! 2. [`SharpnessFilter`] deletes blurry frames,
//! 3. [`DuplicateEliminator`] deletes later near-duplicates.
//!
//! The filter and eliminator each re-list the directory, so every stage sees
//! what the previous one left on disk. The processor never returns an error:
//! failures become a [`JobResult::Failed`] carrying the counts established
//! before the failure.

use crate::{
    backends::video::VideoBackend,
    config::CurationParams,
    dedup::DuplicateEliminator,
    sampler::FrameSampler,
    services::{FrameIOService, ProcessingStage, ProgressReporter, ProgressUpdate},
    sharpness::SharpnessFilter,
    types::{JobResult, ProcessingSummary, RemovalCount},
};
use instant::Instant;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, span, warn, Level};

const INTERRUPTED_MESSAGE: &str = "interrupted before curation finished";

/// Runs sampling, blur rejection and duplicate elimination for one video
#[derive(Clone)]
pub struct VideoCurationProcessor {
    backend: Arc<dyn VideoBackend>,
    params: Arc<CurationParams>,
    reporter: Option<Arc<dyn ProgressReporter>>,
    cancel: Option<CancellationToken>,
}

impl VideoCurationProcessor {
    /// Create a processor over a shared backend and parameter set
    #[must_use]
    pub fn new(backend: Arc<dyn VideoBackend>, params: Arc<CurationParams>) -> Self {
        Self {
            backend,
            params,
            reporter: None,
            cancel: None,
        }
    }

    /// Report stage changes to `reporter`
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Stop at the next frame or stage boundary once `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Parameters every job of this processor uses
    #[must_use]
    pub fn params(&self) -> &CurationParams {
        &self.params
    }

    /// Curate one video into `output_dir`
    #[instrument(
        skip(self),
        fields(
            video = %video_path.display(),
            output = %output_dir.display(),
            backend = self.backend.name(),
            dry_run = self.params.dry_run
        )
    )]
    pub fn process(&self, video_path: &Path, output_dir: &Path) -> JobResult {
        let start = Instant::now();
        let mut summary = ProcessingSummary::new(video_path, output_dir, self.params.dry_run);
        let finish = |mut summary: ProcessingSummary, failure: Option<String>| {
            summary.elapsed_ms = start.elapsed().as_millis() as u64;
            match failure {
                None => JobResult::Completed(summary),
                Some(message) => JobResult::failed(summary, message),
            }
        };

        // Stage 1: sampling
        self.report(&summary.video, ProcessingStage::Sampling, start);
        let outcome = {
            let _span = span!(Level::DEBUG, "sampling", stride = self.params.stride).entered();
            let sampler = FrameSampler::new(self.backend.as_ref(), &self.params);
            let sampler = match &self.cancel {
                Some(token) => sampler.with_cancellation(token),
                None => sampler,
            };
            sampler.sample(video_path, output_dir)
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Video job failed: {e}");
                return finish(summary, Some(e.to_string()));
            },
        };
        summary.extracted_frames = outcome.persisted;

        if outcome.cancelled {
            warn!(persisted = outcome.persisted, "Sampling interrupted");
            summary.final_frames = outcome.persisted;
            return finish(summary, Some(INTERRUPTED_MESSAGE.to_string()));
        }

        if self.params.dry_run {
            summary.blurry_frames_removed = RemovalCount::NotComputed;
            summary.duplicate_frames_removed = RemovalCount::NotComputed;
            summary.final_frames = outcome.persisted;
            self.report(&summary.video, ProcessingStage::Completed, start);
            return finish(summary, None);
        }

        if outcome.persisted == 0 {
            info!("No frames extracted; nothing to curate");
            return finish(summary, None);
        }

        // Stage 2: blur rejection
        if self.is_cancelled() {
            summary.final_frames = outcome.persisted;
            return finish(summary, Some(INTERRUPTED_MESSAGE.to_string()));
        }
        self.report(&summary.video, ProcessingStage::SharpnessFiltering, start);
        let frames = match FrameIOService::list_frames(output_dir) {
            Ok(frames) => frames,
            Err(e) => {
                error!("Video job failed: {e}");
                return finish(summary, Some(e.to_string()));
            },
        };
        let blurry = {
            let _span = span!(
                Level::DEBUG,
                "sharpness_filter",
                threshold = self.params.sharpness_threshold
            )
            .entered();
            SharpnessFilter::new(self.params.sharpness_threshold).apply(&frames)
        };
        summary.blurry_frames_removed = RemovalCount::Counted(blurry);

        // Stage 3: duplicate elimination
        if self.is_cancelled() {
            summary.final_frames = outcome.persisted.saturating_sub(blurry);
            return finish(summary, Some(INTERRUPTED_MESSAGE.to_string()));
        }
        self.report(&summary.video, ProcessingStage::DuplicateElimination, start);
        let frames = match FrameIOService::list_frames(output_dir) {
            Ok(frames) => frames,
            Err(e) => {
                error!("Video job failed: {e}");
                return finish(summary, Some(e.to_string()));
            },
        };
        let duplicates = {
            let _span = span!(
                Level::DEBUG,
                "duplicate_elimination",
                threshold = self.params.duplicate_threshold,
                frames = frames.len()
            )
            .entered();
            let eliminator = DuplicateEliminator::new(self.params.duplicate_threshold);
            match &self.cancel {
                Some(token) => eliminator.with_cancellation(token.clone()).apply(&frames),
                None => eliminator.apply(&frames),
            }
        };
        let Some(duplicates) = duplicates else {
            summary.final_frames = outcome.persisted.saturating_sub(blurry);
            return finish(summary, Some(INTERRUPTED_MESSAGE.to_string()));
        };
        summary.duplicate_frames_removed = RemovalCount::Counted(duplicates);

        summary.final_frames = match FrameIOService::count_frames(output_dir) {
            Ok(count) => count,
            Err(e) => {
                warn!("Falling back to computed frame count: {e}");
                outcome.persisted.saturating_sub(blurry + duplicates)
            },
        };

        self.report(&summary.video, ProcessingStage::Completed, start);
        info!(
            extracted = summary.extracted_frames,
            blurry = blurry,
            duplicates = duplicates,
            kept = summary.final_frames,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Video curated"
        );
        finish(summary, None)
    }

    fn report(&self, video: &str, stage: ProcessingStage, start: Instant) {
        if let Some(reporter) = &self.reporter {
            reporter.report_progress(ProgressUpdate::new(video, stage, start));
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

impl std::fmt::Debug for VideoCurationProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoCurationProcessor")
            .field("backend", &self.backend.name())
            .field("params", &self.params)
            .field("reporter", &self.reporter.is_some())
            .finish_non_exhaustive()
    }
}
