//! Video decoding backend module
//!
//! The curation pipeline never talks to a decoder directly. It asks a
//! [`VideoBackend`] for a [`VideoSession`], pulls frames from it in decode
//! order and drops it when sampling ends. Dropping the session releases the
//! container and codec context, so the handle is scoped to one sampler
//! invocation and never shared between workers.

#[cfg(feature = "video-support")]
pub mod ffmpeg;

#[cfg(feature = "video-support")]
pub use ffmpeg::FFmpegBackend;

use crate::error::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Video container formats recognized during input discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoFormat {
    /// MP4 format (H.264/H.265)
    Mp4,
    /// AVI format
    Avi,
    /// MOV format (QuickTime)
    Mov,
    /// MKV format (Matroska)
    Mkv,
    /// WebM format
    WebM,
}

impl VideoFormat {
    /// Every recognized format
    pub const ALL: [Self; 5] = [Self::Mp4, Self::Mov, Self::Avi, Self::Mkv, Self::WebM];

    /// Get file extension for the video format
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Avi => "avi",
            Self::Mov => "mov",
            Self::Mkv => "mkv",
            Self::WebM => "webm",
        }
    }

    /// Detect format from file extension (case-insensitive)
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp4" => Some(Self::Mp4),
            "avi" => Some(Self::Avi),
            "mov" => Some(Self::Mov),
            "mkv" => Some(Self::Mkv),
            "webm" => Some(Self::WebM),
            _ => None,
        }
    }

    /// Detect format from a path's extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// Container metadata of an opened video
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSource {
    /// Path the video was opened from
    pub path: PathBuf,
    /// Total number of original frames (recorded or estimated)
    pub total_frames: u64,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Average frames per second
    pub fps: f64,
    /// Container format, when the extension is recognized
    pub format: Option<VideoFormat>,
}

/// An open decoder handle for one video
///
/// Frames come out in the video's natural decode order. Implementations
/// release every decoder resource on drop.
pub trait VideoSession {
    /// Metadata of the opened video
    fn source(&self) -> &VideoSource;

    /// Decode the next frame
    ///
    /// # Returns
    /// * `Ok(Some(frame))` - the next frame in decode order
    /// * `Ok(None)` - end of stream
    /// * `Err(_)` - the stream is corrupt past this point
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Trait for video decoding backends
pub trait VideoBackend: Send + Sync {
    /// Open a video and return a scoped decoding session
    ///
    /// # Errors
    /// `FrameSiftError::VideoOpenFailure` when the container or decoder
    /// cannot be opened.
    fn open(&self, path: &Path) -> Result<Box<dyn VideoSession>>;

    /// Read container metadata without decoding frames
    fn probe(&self, path: &Path) -> Result<VideoSource> {
        let session = self.open(path)?;
        Ok(session.source().clone())
    }

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}
