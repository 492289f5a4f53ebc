#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # framesift
//!
//! Curates still frames from video footage for image datasets. Every video
//! goes through three stages, each one rewriting the video's output
//! directory in place:
//!
//! 1. **Sampling**: every Nth decoded frame is written as `frame_NNNNNN.jpg`
//! 2. **Sharpness filtering**: frames whose variance-of-Laplacian focus
//!    measure is below a threshold are deleted
//! 3. **Duplicate elimination**: a later frame whose SSIM against an earlier
//!    surviving frame reaches a threshold is deleted
//!
//! Videos are independent jobs run by a bounded [`BatchScheduler`]; one
//! failing video never stops the others.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use framesift::{
//!     BatchOptions, BatchScheduler, CurationParams, FFmpegBackend, VideoJob,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let params = CurationParams::builder()
//!     .stride(10)
//!     .sharpness_threshold(80)
//!     .duplicate_threshold(0.9)
//!     .build()?;
//! let scheduler = BatchScheduler::new(
//!     Arc::new(FFmpegBackend::new()),
//!     params,
//!     BatchOptions::new(4),
//! )?;
//!
//! let jobs = vec![VideoJob::new("clips/a.mp4".into(), "frames/a".into())];
//! let report = scheduler.run(jobs).await?;
//! println!("kept {} frames", report.total_final);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `video-support` (default): FFmpeg decoding through `ffmpeg-next`
//! - `cli` (default): command-line interface and progress bar
//! - `tracing-json`: JSON log output
//! - `tracing-files`: log output to a file

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod dedup;
pub mod error;
pub mod processor;
pub mod sampler;
pub mod scheduler;
pub mod services;
pub mod sharpness;
pub mod tracing_config;
pub mod types;

// Public API exports
pub use backends::*;
pub use config::{BatchOptions, CurationParams, CurationParamsBuilder, Rotation};
pub use dedup::{mark_duplicates, structural_similarity, DuplicateEliminator};
pub use error::{FrameSiftError, Result};
pub use processor::VideoCurationProcessor;
pub use sampler::{FrameSampler, SamplingOutcome};
pub use scheduler::BatchScheduler;
pub use services::{
    plan_output_dirs, BatchProcessingStats, ConsoleProgressReporter, FrameIOService, InputKind,
    NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressUpdate,
};
pub use sharpness::{focus_measure, SharpnessFilter};
pub use tracing_config::{spans, TracingConfig, TracingFormat, TracingOutput};
pub use types::{
    BatchReport, JobResult, JobStatus, ProcessingSummary, RemovalCount, VideoFailure, VideoJob,
};
