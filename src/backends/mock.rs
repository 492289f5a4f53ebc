//! Synthetic video backend for testing and debugging
//!
//! Serves in-memory frames registered per path, so the whole pipeline can be
//! exercised without FFmpeg or encoded fixtures on disk.

use crate::{
    backends::video::{VideoBackend, VideoFormat, VideoSession, VideoSource},
    error::{FrameSiftError, Result},
};
use image::RgbImage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Behavior of one registered synthetic video
#[derive(Debug, Clone)]
pub enum SyntheticVideo {
    /// Decodes these frames in order
    Frames(Arc<Vec<RgbImage>>),
    /// Decodes `frames`, then reports a corrupt stream instead of the next frame
    Truncated {
        /// Frames decoded before the error
        frames: Arc<Vec<RgbImage>>,
    },
    /// Cannot be opened at all
    Corrupt,
    /// Decoder panics on the first frame
    Crash,
}

/// Mock backend serving registered synthetic videos
#[derive(Debug, Default)]
pub struct SyntheticVideoBackend {
    videos: HashMap<PathBuf, SyntheticVideo>,
    open_sessions: Arc<AtomicUsize>,
    total_opens: Arc<AtomicUsize>,
}

impl SyntheticVideoBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a video that decodes `frames`
    #[must_use]
    pub fn with_frames<P: Into<PathBuf>>(mut self, path: P, frames: Vec<RgbImage>) -> Self {
        self.videos
            .insert(path.into(), SyntheticVideo::Frames(Arc::new(frames)));
        self
    }

    /// Register a video with explicit behavior
    #[must_use]
    pub fn with_video<P: Into<PathBuf>>(mut self, path: P, video: SyntheticVideo) -> Self {
        self.videos.insert(path.into(), video);
        self
    }

    /// Number of sessions currently open
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Number of sessions opened over the backend's lifetime
    #[must_use]
    pub fn total_opens(&self) -> usize {
        self.total_opens.load(Ordering::SeqCst)
    }
}

impl VideoBackend for SyntheticVideoBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoSession>> {
        let (frames, fails_at_end, crashes) = match self.videos.get(path) {
            Some(SyntheticVideo::Frames(frames)) => (Arc::clone(frames), false, false),
            Some(SyntheticVideo::Truncated { frames }) => (Arc::clone(frames), true, false),
            Some(SyntheticVideo::Crash) => (Arc::new(Vec::new()), false, true),
            Some(SyntheticVideo::Corrupt) => {
                return Err(FrameSiftError::video_open(
                    path,
                    "invalid data found when processing input",
                ));
            },
            None => return Err(FrameSiftError::video_open(path, "no such file or directory")),
        };

        let (width, height) = frames.first().map_or((0, 0), RgbImage::dimensions);
        let source = VideoSource {
            path: path.to_path_buf(),
            total_frames: frames.len() as u64,
            width,
            height,
            fps: 30.0,
            format: VideoFormat::from_path(path),
        };

        self.total_opens.fetch_add(1, Ordering::SeqCst);
        self.open_sessions.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(SyntheticSession {
            source,
            frames,
            position: 0,
            fails_at_end,
            crashes,
            open_sessions: Arc::clone(&self.open_sessions),
        }))
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

struct SyntheticSession {
    source: VideoSource,
    frames: Arc<Vec<RgbImage>>,
    position: usize,
    fails_at_end: bool,
    crashes: bool,
    open_sessions: Arc<AtomicUsize>,
}

impl VideoSession for SyntheticSession {
    fn source(&self) -> &VideoSource {
        &self.source
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.crashes {
            panic!("synthetic decoder crash in {}", self.source.path.display());
        }

        match self.frames.get(self.position) {
            Some(frame) => {
                self.position += 1;
                Ok(Some(frame.clone()))
            },
            None if self.fails_at_end => Err(FrameSiftError::image_decode(
                &self.source.path,
                "corrupt packet",
            )),
            None => Ok(None),
        }
    }
}

impl Drop for SyntheticSession {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}
