//! Services that keep I/O and progress concerns out of the curation stages
//!
//! - Frame files, input discovery and output layout (`io`)
//! - Progress reporting for batch frontends (`progress`)

pub mod io;
pub mod progress;

pub use io::{is_video_file, luma_bt601, plan_output_dirs, FrameIOService, InputKind};
#[cfg(feature = "cli")]
pub use io::{find_video_files, matches_pattern};
pub use progress::{
    BatchProcessingStats, BatchProgressTracker, ConsoleProgressReporter, NoOpProgressReporter,
    ProcessingStage, ProgressReporter, ProgressUpdate,
};
