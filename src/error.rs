//! Error types for frame curation operations

use std::path::Path;
use thiserror::Error;

/// Result type alias for frame curation operations
pub type Result<T> = std::result::Result<T, FrameSiftError>;

/// Error taxonomy for the curation pipeline
///
/// Per-frame variants (`ImageDecodeFailure`, `ImageCompareFailure`,
/// `FrameWriteFailure`) are normally logged and absorbed by the stage that
/// hit them. Per-video variants end that video's job with a failed
/// [`JobResult`](crate::types::JobResult) and never abort the batch.
#[derive(Error, Debug)]
pub enum FrameSiftError {
    /// Input path does not exist
    #[error("Input not found: {0}")]
    InputNotFound(String),

    /// Input path exists but cannot be read or is neither file nor directory
    #[error("Input not readable: {0}")]
    InputNotReadable(String),

    /// Video container or decoder could not be opened
    #[error("Failed to open video: {0}")]
    VideoOpenFailure(String),

    /// A sampled frame could not be encoded or written
    #[error("Failed to write frame: {0}")]
    FrameWriteFailure(String),

    /// Frame directory could not be listed
    #[error("Failed to list directory: {0}")]
    DirectoryListFailure(String),

    /// A persisted frame could not be decoded
    #[error("Failed to decode image: {0}")]
    ImageDecodeFailure(String),

    /// Two frames could not be compared
    #[error("Failed to compare images: {0}")]
    ImageCompareFailure(String),

    /// Output directory could not be created or is not writable
    #[error("Output directory error: {0}")]
    OutputDirectoryFailure(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors without more specific context
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image format or processing errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
}

impl FrameSiftError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an input-not-found error for a path
    pub fn input_not_found<P: AsRef<Path>>(path: P) -> Self {
        Self::InputNotFound(format!("'{}' does not exist", path.as_ref().display()))
    }

    /// Create an input-not-readable error for a path
    pub fn input_not_readable<P: AsRef<Path>, D: std::fmt::Display>(path: P, reason: D) -> Self {
        Self::InputNotReadable(format!("'{}': {}", path.as_ref().display(), reason))
    }

    /// Create a video open error with the decoder's reason
    pub fn video_open<P: AsRef<Path>, D: std::fmt::Display>(path: P, reason: D) -> Self {
        Self::VideoOpenFailure(format!("'{}': {}", path.as_ref().display(), reason))
    }

    /// Create a frame write error
    pub fn frame_write<P: AsRef<Path>, D: std::fmt::Display>(path: P, reason: D) -> Self {
        Self::FrameWriteFailure(format!("'{}': {}", path.as_ref().display(), reason))
    }

    /// Create a directory listing error
    pub fn directory_list<P: AsRef<Path>>(path: P, error: &std::io::Error) -> Self {
        Self::DirectoryListFailure(format!("'{}': {}", path.as_ref().display(), error))
    }

    /// Create an image decode error
    pub fn image_decode<P: AsRef<Path>, D: std::fmt::Display>(path: P, reason: D) -> Self {
        Self::ImageDecodeFailure(format!("'{}': {}", path.as_ref().display(), reason))
    }

    /// Create an image comparison error naming both frames
    pub fn image_compare<A: AsRef<Path>, B: AsRef<Path>, D: std::fmt::Display>(
        first: A,
        second: B,
        reason: D,
    ) -> Self {
        Self::ImageCompareFailure(format!(
            "'{}' vs '{}': {}",
            first.as_ref().display(),
            second.as_ref().display(),
            reason
        ))
    }

    /// Create an output directory error
    pub fn output_directory<P: AsRef<Path>, D: std::fmt::Display>(path: P, reason: D) -> Self {
        Self::OutputDirectoryFailure(format!("'{}': {}", path.as_ref().display(), reason))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }
}
