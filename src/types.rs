//! Core data types shared by the curation stages and the scheduler

use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Extension of every persisted frame file
pub const FRAME_EXTENSION: &str = "jpg";

/// Filename prefix of every persisted frame file
pub const FRAME_PREFIX: &str = "frame_";

/// Build the on-disk name of a frame from its original index
///
/// The index is zero-padded to four digits; indices above 9999 widen the
/// name instead of wrapping.
#[must_use]
pub fn frame_file_name(original_index: u64) -> String {
    format!("{FRAME_PREFIX}{original_index:04}.{FRAME_EXTENSION}")
}

/// Recover the original index from a frame file name
///
/// Returns `None` for anything that is not a frame written by the sampler.
#[must_use]
pub fn parse_frame_index(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(FRAME_PREFIX)?
        .strip_suffix(FRAME_EXTENSION)?
        .strip_suffix('.')?
        .parse()
        .ok()
}

/// A sampled frame before it is persisted
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// Index in the video's natural decode order, starting at 0
    pub original_index: u64,
    /// Decoded (and rotated) pixels
    pub image: RgbImage,
}

impl FrameRecord {
    /// Create a new frame record
    #[must_use]
    pub fn new(original_index: u64, image: RgbImage) -> Self {
        Self {
            original_index,
            image,
        }
    }

    /// On-disk name derived from the original index
    #[must_use]
    pub fn file_name(&self) -> String {
        frame_file_name(self.original_index)
    }

    /// Full path of this frame inside `output_dir`
    #[must_use]
    pub fn path_in(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(self.file_name())
    }
}

/// One unit of batch work: a video and its private output directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoJob {
    /// Source video
    pub video: PathBuf,
    /// Directory only this job writes to
    pub output_dir: PathBuf,
}

impl VideoJob {
    /// Create a new job
    #[must_use]
    pub fn new(video: PathBuf, output_dir: PathBuf) -> Self {
        Self { video, output_dir }
    }
}

/// Count of frames removed by a stage, or the fact that it was not measured
///
/// Dry runs never write frames, so blur and duplicate removal cannot be
/// measured there. Serialized as a number or `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<usize>", into = "Option<usize>")]
pub enum RemovalCount {
    /// Stage ran and removed this many frames
    Counted(usize),
    /// Stage did not run
    NotComputed,
}

impl RemovalCount {
    /// Numeric value, treating `NotComputed` as zero for aggregation
    #[must_use]
    pub fn value(self) -> usize {
        match self {
            Self::Counted(n) => n,
            Self::NotComputed => 0,
        }
    }

    /// Whether the stage actually ran
    #[must_use]
    pub fn is_computed(self) -> bool {
        matches!(self, Self::Counted(_))
    }
}

impl Default for RemovalCount {
    fn default() -> Self {
        Self::Counted(0)
    }
}

impl From<Option<usize>> for RemovalCount {
    fn from(value: Option<usize>) -> Self {
        value.map_or(Self::NotComputed, Self::Counted)
    }
}

impl From<RemovalCount> for Option<usize> {
    fn from(value: RemovalCount) -> Self {
        match value {
            RemovalCount::Counted(n) => Some(n),
            RemovalCount::NotComputed => None,
        }
    }
}

impl std::fmt::Display for RemovalCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Counted(n) => write!(f, "{n}"),
            Self::NotComputed => write!(f, "n/a"),
        }
    }
}

/// Outcome status of one video job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    /// All stages ran
    Success,
    /// The job stopped early
    Failed {
        /// Diagnostic message
        message: String,
    },
}

/// Per-video result record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSummary {
    /// Video identifier (file name)
    pub video: String,
    /// Full path of the source video
    pub source: PathBuf,
    /// Directory the frames were written to
    pub output_dir: PathBuf,
    /// Frames written by the sampler (or that would be, under dry-run)
    pub extracted_frames: usize,
    /// Frames deleted by the sharpness filter
    pub blurry_frames_removed: RemovalCount,
    /// Frames deleted by the duplicate eliminator
    pub duplicate_frames_removed: RemovalCount,
    /// Frames left in the output directory
    pub final_frames: usize,
    /// Wall-clock time spent on this video
    pub elapsed_ms: u64,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Success or failure with message
    #[serde(flatten)]
    pub status: JobStatus,
}

impl ProcessingSummary {
    /// Start an all-zero summary for a video
    #[must_use]
    pub fn new(source: &Path, output_dir: &Path, dry_run: bool) -> Self {
        Self {
            video: video_identifier(source),
            source: source.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            extracted_frames: 0,
            blurry_frames_removed: RemovalCount::Counted(0),
            duplicate_frames_removed: RemovalCount::Counted(0),
            final_frames: 0,
            elapsed_ms: 0,
            dry_run,
            status: JobStatus::Success,
        }
    }

    /// Whether the job completed
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, JobStatus::Success)
    }

    /// Failure message, if the job failed
    #[must_use]
    pub fn failure_message(&self) -> Option<&str> {
        match &self.status {
            JobStatus::Success => None,
            JobStatus::Failed { message } => Some(message),
        }
    }
}

/// File name of a video used as its identifier in reports
#[must_use]
pub fn video_identifier(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

/// Tagged outcome produced by exactly one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "summary", rename_all = "snake_case")]
pub enum JobResult {
    /// Every stage completed
    Completed(ProcessingSummary),
    /// The job stopped early; the summary carries the message and partial counts
    Failed(ProcessingSummary),
}

impl JobResult {
    /// Build a failed result from a partially filled summary
    #[must_use]
    pub fn failed(mut summary: ProcessingSummary, message: impl Into<String>) -> Self {
        summary.status = JobStatus::Failed {
            message: message.into(),
        };
        Self::Failed(summary)
    }

    /// Borrow the summary regardless of outcome
    #[must_use]
    pub fn summary(&self) -> &ProcessingSummary {
        match self {
            Self::Completed(summary) | Self::Failed(summary) => summary,
        }
    }

    /// Take the summary regardless of outcome
    #[must_use]
    pub fn into_summary(self) -> ProcessingSummary {
        match self {
            Self::Completed(summary) | Self::Failed(summary) => summary,
        }
    }

    /// Whether the job failed
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// One failed video in a batch report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFailure {
    /// Video identifier
    pub video: String,
    /// Diagnostic message
    pub message: String,
}

/// Aggregate result of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// When the report was assembled
    pub generated_at: DateTime<Utc>,
    /// Number of jobs that completed successfully
    pub videos_processed: usize,
    /// Number of jobs that failed
    pub videos_failed: usize,
    /// Sum of extracted frames across successful jobs
    pub total_extracted: usize,
    /// Sum of blur removals across successful jobs (`NotComputed` under dry-run)
    pub total_blurry_removed: RemovalCount,
    /// Sum of duplicate removals across successful jobs (`NotComputed` under dry-run)
    pub total_duplicates_removed: RemovalCount,
    /// Sum of kept frames across successful jobs
    pub total_final: usize,
    /// One entry per failed job
    pub failures: Vec<VideoFailure>,
    /// Every summary, in completion order
    pub summaries: Vec<ProcessingSummary>,
    /// Whether the batch was cancelled before every job ran
    pub interrupted: bool,
}

impl BatchReport {
    /// Aggregate job results in the order they completed
    #[must_use]
    pub fn from_results(results: Vec<JobResult>, interrupted: bool) -> Self {
        let mut report = Self {
            generated_at: Utc::now(),
            videos_processed: 0,
            videos_failed: 0,
            total_extracted: 0,
            total_blurry_removed: RemovalCount::Counted(0),
            total_duplicates_removed: RemovalCount::Counted(0),
            total_final: 0,
            failures: Vec::new(),
            summaries: Vec::with_capacity(results.len()),
            interrupted,
        };

        let mut any_computed = false;
        let mut any_successful = false;
        let mut blurry = 0;
        let mut duplicates = 0;

        for result in results {
            match result {
                JobResult::Completed(summary) => {
                    any_successful = true;
                    report.videos_processed += 1;
                    report.total_extracted += summary.extracted_frames;
                    report.total_final += summary.final_frames;
                    if summary.blurry_frames_removed.is_computed()
                        || summary.duplicate_frames_removed.is_computed()
                    {
                        any_computed = true;
                    }
                    blurry += summary.blurry_frames_removed.value();
                    duplicates += summary.duplicate_frames_removed.value();
                    report.summaries.push(summary);
                },
                JobResult::Failed(summary) => {
                    report.videos_failed += 1;
                    report.failures.push(VideoFailure {
                        video: summary.video.clone(),
                        message: summary
                            .failure_message()
                            .unwrap_or("unknown failure")
                            .to_string(),
                    });
                    report.summaries.push(summary);
                },
            }
        }

        // A batch made only of dry-run jobs never measured removals
        if any_successful && !any_computed {
            report.total_blurry_removed = RemovalCount::NotComputed;
            report.total_duplicates_removed = RemovalCount::NotComputed;
        } else {
            report.total_blurry_removed = RemovalCount::Counted(blurry);
            report.total_duplicates_removed = RemovalCount::Counted(duplicates);
        }

        report
    }

    /// Total number of jobs in the report
    #[must_use]
    pub fn videos_total(&self) -> usize {
        self.videos_processed + self.videos_failed
    }

    /// Whether every job succeeded and the batch ran to the end
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.videos_failed == 0 && !self.interrupted
    }
}
