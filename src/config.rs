//! Configuration types for frame curation operations

use crate::error::{FrameSiftError, Result};
use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};

/// Default sampling stride (every 5th original frame)
pub const DEFAULT_STRIDE: u32 = 5;
/// Default focus-measure threshold
pub const DEFAULT_SHARPNESS_THRESHOLD: u32 = 100;
/// Default structural similarity threshold
pub const DEFAULT_DUPLICATE_THRESHOLD: f64 = 0.95;

/// Clockwise rotation applied to every sampled frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(into = "u16", try_from = "u16")]
pub enum Rotation {
    /// Keep frames as decoded
    #[default]
    None,
    /// Rotate 90 degrees clockwise
    Clockwise90,
    /// Rotate 180 degrees
    Rotate180,
    /// Rotate 90 degrees counter-clockwise
    CounterClockwise90,
}

impl Rotation {
    /// Angle in degrees, clockwise
    #[must_use]
    pub fn degrees(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Clockwise90 => 90,
            Self::Rotate180 => 180,
            Self::CounterClockwise90 => 270,
        }
    }

    /// Apply the rotation, consuming the frame when no work is needed
    #[must_use]
    pub fn apply(self, frame: RgbImage) -> RgbImage {
        match self {
            Self::None => frame,
            Self::Clockwise90 => imageops::rotate90(&frame),
            Self::Rotate180 => imageops::rotate180(&frame),
            Self::CounterClockwise90 => imageops::rotate270(&frame),
        }
    }
}

impl TryFrom<u16> for Rotation {
    type Error = FrameSiftError;

    fn try_from(degrees: u16) -> Result<Self> {
        match degrees {
            0 => Ok(Self::None),
            90 => Ok(Self::Clockwise90),
            180 => Ok(Self::Rotate180),
            270 => Ok(Self::CounterClockwise90),
            other => Err(FrameSiftError::config_value_error(
                "rotation angle",
                other,
                "0, 90, 180, 270",
                Some(0),
            )),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Immutable parameter set shared by every job of a batch
///
/// Built once at the batch boundary through [`CurationParams::builder`] and
/// then handed to workers behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurationParams {
    /// Keep every `stride`-th original frame (>= 1)
    pub stride: u32,

    /// Frames whose focus measure is strictly below this are deleted
    pub sharpness_threshold: u32,

    /// Later frames with similarity >= this to an earlier frame are deleted (0.0-1.0)
    pub duplicate_threshold: f64,

    /// Rotation applied before a frame is written
    pub rotation: Rotation,

    /// Report what would happen without touching the filesystem
    pub dry_run: bool,
}

impl Default for CurationParams {
    fn default() -> Self {
        Self {
            stride: DEFAULT_STRIDE,
            sharpness_threshold: DEFAULT_SHARPNESS_THRESHOLD,
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
            rotation: Rotation::None,
            dry_run: false,
        }
    }
}

impl CurationParams {
    /// Create a new parameter builder
    ///
    /// # Examples
    ///
    /// ```rust
    /// use framesift::{CurationParams, Rotation};
    ///
    /// let params = CurationParams::builder()
    ///     .stride(10)
    ///     .sharpness_threshold(50)
    ///     .duplicate_threshold(0.9)
    ///     .rotation(Rotation::Clockwise90)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(params.stride, 10);
    /// ```
    #[must_use]
    pub fn builder() -> CurationParamsBuilder {
        CurationParamsBuilder::default()
    }

    /// Validate all parameters
    ///
    /// # Errors
    /// - stride of zero
    /// - duplicate threshold outside 0.0-1.0 (or NaN)
    pub fn validate(&self) -> Result<()> {
        if self.stride == 0 {
            return Err(FrameSiftError::config_value_error(
                "stride",
                self.stride,
                ">= 1",
                Some(DEFAULT_STRIDE),
            ));
        }

        if !(0.0..=1.0).contains(&self.duplicate_threshold) {
            return Err(FrameSiftError::config_value_error(
                "duplicate threshold",
                self.duplicate_threshold,
                "0.0-1.0",
                Some(DEFAULT_DUPLICATE_THRESHOLD),
            ));
        }

        Ok(())
    }

    /// Number of frames sampling keeps out of `total_frames` originals
    ///
    /// Equals the count of indices in `{0, k, 2k, ...}` below `total_frames`.
    #[must_use]
    pub fn expected_extractions(&self, total_frames: u64) -> u64 {
        total_frames.div_ceil(u64::from(self.stride.max(1)))
    }
}

/// Builder for `CurationParams`
#[derive(Debug, Default)]
pub struct CurationParamsBuilder {
    params: CurationParams,
}

impl CurationParamsBuilder {
    /// Set the sampling stride
    #[must_use]
    pub fn stride(mut self, stride: u32) -> Self {
        self.params.stride = stride;
        self
    }

    /// Set the focus-measure threshold
    #[must_use]
    pub fn sharpness_threshold(mut self, threshold: u32) -> Self {
        self.params.sharpness_threshold = threshold;
        self
    }

    /// Set the similarity threshold
    #[must_use]
    pub fn duplicate_threshold(mut self, threshold: f64) -> Self {
        self.params.duplicate_threshold = threshold;
        self
    }

    /// Set the frame rotation
    #[must_use]
    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.params.rotation = rotation;
        self
    }

    /// Enable or disable dry-run mode
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.params.dry_run = dry_run;
        self
    }

    /// Build and validate the parameters
    pub fn build(self) -> Result<CurationParams> {
        self.params.validate()?;
        Ok(self.params)
    }
}

/// Batch-level options consumed by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Maximum number of videos processed concurrently (>= 1)
    pub workers: usize,

    /// Process at most this many videos (None = all)
    pub limit: Option<usize>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            limit: None,
        }
    }
}

impl BatchOptions {
    /// Create options with an explicit worker bound
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            limit: None,
        }
    }

    /// Set the video-count limit
    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Validate the worker bound
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(FrameSiftError::config_value_error(
                "worker count",
                self.workers,
                ">= 1",
                Some(default_workers()),
            ));
        }
        Ok(())
    }
}

/// Worker count used when none is requested: the available parallelism
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}
