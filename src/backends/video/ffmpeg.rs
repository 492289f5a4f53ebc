//! FFmpeg integration for video decoding
//!
//! This module provides the production [`VideoBackend`] built on the
//! ffmpeg-next crate: container demuxing, software decoding and conversion
//! of every decoded frame to packed RGB.

use crate::{
    backends::video::{VideoBackend, VideoFormat, VideoSession, VideoSource},
    error::{FrameSiftError, Result},
};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::Path;
use std::sync::OnceLock;

/// Container durations are expressed in microseconds
const AV_TIME_BASE: f64 = 1_000_000.0;

static FFMPEG_INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Initialize FFmpeg once per process
fn ensure_initialized() -> Result<()> {
    FFMPEG_INIT
        .get_or_init(|| {
            ffmpeg::init().map_err(|e| e.to_string())?;
            ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
            Ok(())
        })
        .clone()
        .map_err(|e| FrameSiftError::VideoOpenFailure(format!("Failed to initialize FFmpeg: {e}")))
}

/// FFmpeg video backend implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct FFmpegBackend;

impl FFmpegBackend {
    /// Create a new FFmpeg backend
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl VideoBackend for FFmpegBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoSession>> {
        ensure_initialized()?;
        Ok(Box::new(FFmpegSession::open(path)?))
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Open container plus video decoder for one file
///
/// All FFmpeg contexts are owned here and freed by their own `Drop` impls
/// when the session goes out of scope.
struct FFmpegSession {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: Option<ScalerState>,
    stream_index: usize,
    source: VideoSource,
    eof_sent: bool,
}

/// Scaler cached for the current input geometry
struct ScalerState {
    context: ffmpeg::software::scaling::Context,
    format: ffmpeg::format::Pixel,
    width: u32,
    height: u32,
}

impl FFmpegSession {
    fn open(path: &Path) -> Result<Self> {
        let input =
            ffmpeg::format::input(path).map_err(|e| FrameSiftError::video_open(path, e))?;

        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| FrameSiftError::video_open(path, "no video stream found"))?;
        let stream_index = stream.index();

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| {
                FrameSiftError::video_open(path, format!("failed to create codec context: {e}"))
            })?;
        let decoder = context.decoder().video().map_err(|e| {
            FrameSiftError::video_open(path, format!("failed to create video decoder: {e}"))
        })?;

        let fps = f64::from(stream.avg_frame_rate());
        let total_frames = frame_count(&input, &stream, fps);

        let source = VideoSource {
            path: path.to_path_buf(),
            total_frames,
            width: decoder.width(),
            height: decoder.height(),
            fps,
            format: VideoFormat::from_path(path),
        };

        tracing::debug!(
            video = %path.display(),
            codec = %decoder.id().name(),
            width = source.width,
            height = source.height,
            fps = source.fps,
            total_frames = source.total_frames,
            "Opened video"
        );

        Ok(Self {
            input,
            decoder,
            scaler: None,
            stream_index,
            source,
            eof_sent: false,
        })
    }

    /// Convert a decoded frame to packed RGB, honoring the row stride
    fn convert(&mut self, frame: &ffmpeg::util::frame::video::Video) -> Result<RgbImage> {
        let (format, width, height) = (frame.format(), frame.width(), frame.height());

        let stale = self
            .scaler
            .as_ref()
            .map_or(true, |s| s.format != format || s.width != width || s.height != height);
        if stale {
            let context = ffmpeg::software::scaling::Context::get(
                format,
                width,
                height,
                ffmpeg::format::Pixel::RGB24,
                width,
                height,
                ffmpeg::software::scaling::Flags::BILINEAR,
            )
            .map_err(|e| self.decode_error(format!("failed to create frame scaler: {e}")))?;
            self.scaler = Some(ScalerState {
                context,
                format,
                width,
                height,
            });
        }

        let mut rgb = ffmpeg::util::frame::video::Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler
                .context
                .run(frame, &mut rgb)
                .map_err(|e| FrameSiftError::ImageDecodeFailure(format!("RGB conversion: {e}")))?;
        }

        let row_bytes = width as usize * 3;
        let stride = rgb.stride(0);
        let data = rgb.data(0);
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in data.chunks(stride).take(height as usize) {
            let row = row
                .get(..row_bytes)
                .ok_or_else(|| self.decode_error("short frame row"))?;
            pixels.extend_from_slice(row);
        }

        RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| self.decode_error("frame buffer size mismatch"))
    }

    fn decode_error(&self, reason: impl std::fmt::Display) -> FrameSiftError {
        FrameSiftError::image_decode(&self.source.path, reason)
    }
}

impl VideoSession for FFmpegSession {
    fn source(&self) -> &VideoSource {
        &self.source
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        loop {
            let mut decoded = ffmpeg::util::frame::video::Video::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded).map(Some);
            }

            if self.eof_sent {
                return Ok(None);
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        tracing::warn!(
                            video = %self.source.path.display(),
                            "Failed to send packet to decoder: {e}"
                        );
                    }
                },
                Err(ffmpeg::Error::Eof) => {
                    self.decoder
                        .send_eof()
                        .map_err(|e| self.decode_error(format!("failed to flush decoder: {e}")))?;
                    self.eof_sent = true;
                },
                Err(e) => return Err(self.decode_error(format!("failed to read packet: {e}"))),
            }
        }
    }
}

/// Number of frames recorded in the container, or an estimate from duration
fn frame_count(
    input: &ffmpeg::format::context::Input,
    stream: &ffmpeg::format::stream::Stream<'_>,
    fps: f64,
) -> u64 {
    let recorded = stream.frames();
    if recorded > 0 {
        return recorded as u64;
    }

    let stream_seconds = stream.duration() as f64 * f64::from(stream.time_base());
    let seconds = if stream_seconds > 0.0 {
        stream_seconds
    } else {
        input.duration() as f64 / AV_TIME_BASE
    };

    if seconds > 0.0 && fps.is_finite() && fps > 0.0 {
        (seconds * fps).round() as u64
    } else {
        0
    }
}
