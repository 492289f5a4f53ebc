//! Fixed-stride frame sampling
//!
//! Decodes a video through a [`VideoBackend`] session, keeps every k-th
//! original frame, rotates it and writes it as `frame_NNNN.jpg` named after
//! its original index.

use crate::{
    backends::video::{VideoBackend, VideoSource},
    config::CurationParams,
    error::{FrameSiftError, Result},
    types::FrameRecord,
};
use image::codecs::jpeg::JpegEncoder;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// JPEG quality used for persisted frames
pub const FRAME_JPEG_QUALITY: u8 = 95;

const PROGRESS_LOG_INTERVAL: u64 = 250;

/// What one sampling run produced
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingOutcome {
    /// Container metadata of the sampled video
    pub source: VideoSource,
    /// Frames written (or that would be written, under dry-run)
    pub persisted: usize,
    /// Original frames decoded
    pub decoded: u64,
    /// Sampled frames that could not be written
    pub write_failures: usize,
    /// Decoding stopped at a corrupt point before end of stream
    pub truncated: bool,
    /// Sampling stopped because the batch was cancelled
    pub cancelled: bool,
}

/// Samples every k-th original frame of a video to disk
pub struct FrameSampler<'a> {
    backend: &'a dyn VideoBackend,
    params: &'a CurationParams,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> FrameSampler<'a> {
    /// Create a sampler over a backend and parameter set
    #[must_use]
    pub fn new(backend: &'a dyn VideoBackend, params: &'a CurationParams) -> Self {
        Self {
            backend,
            params,
            cancel: None,
        }
    }

    /// Stop between frames once `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Sample `video` into `output_dir`
    ///
    /// Under dry-run the count is computed from container metadata as
    /// `ceil(total_frames / stride)` and nothing is created or written.
    ///
    /// # Errors
    /// - `VideoOpenFailure` when the video cannot be opened or its first
    ///   frame cannot be decoded
    /// - `OutputDirectoryFailure` when `output_dir` cannot be created
    pub fn sample(&self, video: &Path, output_dir: &Path) -> Result<SamplingOutcome> {
        if self.params.dry_run {
            return self.sample_dry_run(video);
        }

        // The session is the decoder handle; it is dropped on every return path below
        let mut session = self.backend.open(video)?;
        ensure_output_dir(output_dir)?;

        let stride = u64::from(self.params.stride);
        let mut outcome = SamplingOutcome {
            source: session.source().clone(),
            persisted: 0,
            decoded: 0,
            write_failures: 0,
            truncated: false,
            cancelled: false,
        };

        loop {
            if self.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let frame = match session.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) if outcome.decoded == 0 => {
                    return Err(FrameSiftError::video_open(
                        video,
                        format!("no decodable frame in stream: {e}"),
                    ));
                },
                Err(e) => {
                    warn!(
                        video = %video.display(),
                        decoded = outcome.decoded,
                        "Stopping at unreadable frame: {e}"
                    );
                    outcome.truncated = true;
                    break;
                },
            };

            let index = outcome.decoded;
            outcome.decoded += 1;

            if index % stride == 0 {
                let record = FrameRecord::new(index, self.params.rotation.apply(frame));
                match persist_frame(&record, output_dir) {
                    Ok(path) => {
                        outcome.persisted += 1;
                        debug!(frame = %path.display(), "Saved frame");
                    },
                    Err(e) => {
                        outcome.write_failures += 1;
                        warn!("{e}");
                    },
                }
            }

            if outcome.decoded % PROGRESS_LOG_INTERVAL == 0 {
                debug!(
                    video = %video.display(),
                    decoded = outcome.decoded,
                    total = outcome.source.total_frames,
                    persisted = outcome.persisted,
                    "Sampling progress"
                );
            }
        }

        drop(session);

        info!(
            video = %video.display(),
            decoded = outcome.decoded,
            persisted = outcome.persisted,
            stride = self.params.stride,
            rotation = %self.params.rotation,
            "Extracted frames"
        );
        Ok(outcome)
    }

    fn sample_dry_run(&self, video: &Path) -> Result<SamplingOutcome> {
        let source = self.backend.probe(video)?;
        let expected = self.params.expected_extractions(source.total_frames);
        info!(
            video = %video.display(),
            total_frames = source.total_frames,
            would_extract = expected,
            "Dry run: no frames written"
        );
        Ok(SamplingOutcome {
            persisted: usize::try_from(expected).unwrap_or(usize::MAX),
            decoded: 0,
            source,
            write_failures: 0,
            truncated: false,
            cancelled: false,
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancellationToken::is_cancelled)
    }
}

/// Create the output directory if needed (idempotent)
pub fn ensure_output_dir(output_dir: &Path) -> Result<()> {
    if output_dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(output_dir)
        .map_err(|e| FrameSiftError::output_directory(output_dir, e))?;
    debug!(dir = %output_dir.display(), "Created output directory");
    Ok(())
}

/// Encode a frame as JPEG under its deterministic name
///
/// # Errors
/// `FrameWriteFailure` when the file cannot be created or encoded.
pub fn persist_frame(record: &FrameRecord, output_dir: &Path) -> Result<PathBuf> {
    let path = record.path_in(output_dir);
    let file = File::create(&path).map_err(|e| FrameSiftError::frame_write(&path, e))?;
    let mut writer = BufWriter::new(file);

    JpegEncoder::new_with_quality(&mut writer, FRAME_JPEG_QUALITY)
        .encode_image(&record.image)
        .map_err(|e| FrameSiftError::frame_write(&path, e))?;
    writer
        .flush()
        .map_err(|e| FrameSiftError::frame_write(&path, e))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::{SyntheticVideo, SyntheticVideoBackend};
    use crate::config::Rotation;
    use crate::types::frame_file_name;
    use image::{Rgb, RgbImage};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn gradient_frames(n: usize, width: u32, height: u32) -> Vec<RgbImage> {
        (0..n)
            .map(|i| {
                RgbImage::from_fn(width, height, |x, y| {
                    Rgb([(x * 13 + i as u32) as u8, (y * 7) as u8, (i * 20) as u8])
                })
            })
            .collect()
    }

    fn frame_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_sample_every_kth_frame_by_original_index() {
        let backend = SyntheticVideoBackend::new().with_frames("clip.mp4", gradient_frames(12, 8, 6));
        let params = CurationParams::builder().stride(5).build().unwrap();
        let out = tempdir().unwrap();

        let outcome = FrameSampler::new(&backend, &params)
            .sample(Path::new("clip.mp4"), out.path())
            .unwrap();

        assert_eq!(outcome.persisted, 3);
        assert_eq!(outcome.decoded, 12);
        assert!(!outcome.truncated);
        assert_eq!(
            frame_names(out.path()),
            vec!["frame_0000.jpg", "frame_0005.jpg", "frame_0010.jpg"]
        );
        assert_eq!(backend.open_sessions(), 0);
    }

    #[test]
    fn test_extracted_count_matches_stride_formula() {
        for total in [0usize, 1, 4, 5, 6, 13] {
            for stride in [1u32, 2, 3, 5, 20] {
                let backend =
                    SyntheticVideoBackend::new().with_frames("v.mp4", gradient_frames(total, 4, 4));
                let params = CurationParams::builder().stride(stride).build().unwrap();
                let out = tempdir().unwrap();

                let outcome = FrameSampler::new(&backend, &params)
                    .sample(Path::new("v.mp4"), out.path())
                    .unwrap();

                let expected = (0..total).filter(|i| i % stride as usize == 0).count();
                assert_eq!(outcome.persisted, expected, "total={total} stride={stride}");
                assert_eq!(
                    params.expected_extractions(total as u64) as usize,
                    expected,
                    "total={total} stride={stride}"
                );
            }
        }
    }

    #[test]
    fn test_rotation_applied_before_saving() {
        let backend = SyntheticVideoBackend::new().with_frames("wide.mp4", gradient_frames(1, 16, 8));
        let params = CurationParams::builder()
            .stride(1)
            .rotation(Rotation::Clockwise90)
            .build()
            .unwrap();
        let out = tempdir().unwrap();

        FrameSampler::new(&backend, &params)
            .sample(Path::new("wide.mp4"), out.path())
            .unwrap();

        let saved = image::open(out.path().join(frame_file_name(0))).unwrap();
        assert_eq!((saved.width(), saved.height()), (8, 16));
    }

    #[test]
    fn test_unopenable_video_is_an_error_and_writes_nothing() {
        let backend = SyntheticVideoBackend::new().with_video("bad.mp4", SyntheticVideo::Corrupt);
        let params = CurationParams::default();
        let root = tempdir().unwrap();
        let out = root.path().join("bad");

        let err = FrameSampler::new(&backend, &params)
            .sample(Path::new("bad.mp4"), &out)
            .unwrap_err();

        assert!(matches!(err, FrameSiftError::VideoOpenFailure(_)));
        assert!(!out.exists());
    }

    #[test]
    fn test_truncated_video_keeps_frames_before_error() {
        let backend = SyntheticVideoBackend::new().with_video(
            "cut.mp4",
            SyntheticVideo::Truncated {
                frames: Arc::new(gradient_frames(4, 4, 4)),
            },
        );
        let params = CurationParams::builder().stride(2).build().unwrap();
        let out = tempdir().unwrap();

        let outcome = FrameSampler::new(&backend, &params)
            .sample(Path::new("cut.mp4"), out.path())
            .unwrap();

        assert!(outcome.truncated);
        assert_eq!(outcome.persisted, 2);
        assert_eq!(backend.open_sessions(), 0);
    }

    #[test]
    fn test_stream_without_decodable_frames_is_an_error() {
        let backend = SyntheticVideoBackend::new().with_video(
            "garbage.mp4",
            SyntheticVideo::Truncated {
                frames: Arc::new(Vec::new()),
            },
        );
        let params = CurationParams::default();
        let out = tempdir().unwrap();

        let err = FrameSampler::new(&backend, &params)
            .sample(Path::new("garbage.mp4"), out.path())
            .unwrap_err();

        assert!(matches!(err, FrameSiftError::VideoOpenFailure(_)));
        assert!(err.to_string().contains("garbage.mp4"));
        assert_eq!(backend.open_sessions(), 0);
    }

    #[test]
    fn test_output_dir_creation_is_idempotent() {
        let backend = SyntheticVideoBackend::new().with_frames("clip.mp4", gradient_frames(3, 4, 4));
        let params = CurationParams::builder().stride(1).build().unwrap();
        let root = tempdir().unwrap();
        let out = root.path().join("nested").join("clip");

        let sampler = FrameSampler::new(&backend, &params);
        assert_eq!(sampler.sample(Path::new("clip.mp4"), &out).unwrap().persisted, 3);
        assert_eq!(sampler.sample(Path::new("clip.mp4"), &out).unwrap().persisted, 3);
        assert_eq!(frame_names(&out).len(), 3);
    }

    #[test]
    fn test_uncreatable_output_dir_fails() {
        let backend = SyntheticVideoBackend::new().with_frames("clip.mp4", gradient_frames(1, 4, 4));
        let params = CurationParams::default();
        let root = tempdir().unwrap();
        let blocker = root.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = FrameSampler::new(&backend, &params)
            .sample(Path::new("clip.mp4"), &blocker.join("out"))
            .unwrap_err();

        assert!(matches!(err, FrameSiftError::OutputDirectoryFailure(_)));
        assert_eq!(backend.open_sessions(), 0);
    }

    #[test]
    fn test_dry_run_counts_analytically_without_writing() {
        let backend = SyntheticVideoBackend::new().with_frames("clip.mp4", gradient_frames(12, 4, 4));
        let params = CurationParams::builder().stride(5).dry_run(true).build().unwrap();
        let root = tempdir().unwrap();
        let out = root.path().join("clip");

        let outcome = FrameSampler::new(&backend, &params)
            .sample(Path::new("clip.mp4"), &out)
            .unwrap();

        assert_eq!(outcome.persisted, 3);
        assert_eq!(outcome.decoded, 0);
        assert!(!out.exists());
    }

    #[test]
    fn test_cancelled_sampling_stops_before_decoding() {
        let backend = SyntheticVideoBackend::new().with_frames("clip.mp4", gradient_frames(5, 4, 4));
        let params = CurationParams::builder().stride(1).build().unwrap();
        let out = tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let outcome = FrameSampler::new(&backend, &params)
            .with_cancellation(&token)
            .sample(Path::new("clip.mp4"), out.path())
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.persisted, 0);
        assert_eq!(backend.open_sessions(), 0);
    }
}
