//! Backend implementations for video decoding
//!
//! - Video backend trait and FFmpeg implementation (`video`)
//! - Synthetic in-memory backend for tests and benches (`mock`)

pub mod mock;
pub mod video;

pub use self::mock::{SyntheticVideo, SyntheticVideoBackend};
pub use self::video::{VideoBackend, VideoFormat, VideoSession, VideoSource};

#[cfg(feature = "video-support")]
pub use self::video::FFmpegBackend;
