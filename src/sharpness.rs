//! Blur rejection by focus measure
//!
//! The focus measure is the population variance of the 3×3 Laplacian
//! `[[0,1,0],[1,-4,1],[0,1,0]]` over the grayscale frame, with reflect-101
//! borders. Flat images score exactly 0.0; sharper content scores higher.

use crate::services::io::FrameIOService;
use image::GrayImage;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Focus measure of a grayscale image
#[must_use]
pub fn focus_measure(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    let pixel_count = u64::from(width) * u64::from(height);
    if pixel_count == 0 {
        return 0.0;
    }

    let (w, h) = (width as usize, height as usize);
    let data = gray.as_raw();
    let at = |x: usize, y: usize| f64::from(data[y * w + x]);

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 0..h {
        let up = reflect101(y as isize - 1, h);
        let down = reflect101(y as isize + 1, h);
        for x in 0..w {
            let left = reflect101(x as isize - 1, w);
            let right = reflect101(x as isize + 1, w);
            let response =
                at(x, up) + at(x, down) + at(left, y) + at(right, y) - 4.0 * at(x, y);
            sum += response;
            sum_sq += response * response;
        }
    }

    let n = pixel_count as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Mirror an out-of-range index without repeating the edge sample
fn reflect101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let reflected = if index < 0 {
        -index
    } else if index > last {
        2 * last - index
    } else {
        index
    };
    reflected.clamp(0, last) as usize
}

/// Deletes persisted frames whose focus measure falls below a threshold
#[derive(Debug, Clone, Copy)]
pub struct SharpnessFilter {
    threshold: f64,
}

impl SharpnessFilter {
    /// Create a filter; frames strictly below `threshold` are rejected
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: f64::from(threshold),
        }
    }

    /// Focus measure of a frame file, 0.0 when it cannot be decoded
    #[must_use]
    pub fn score(&self, frame: &Path) -> f64 {
        match FrameIOService::load_grayscale(frame) {
            Ok(gray) => focus_measure(&gray),
            Err(e) => {
                warn!("Scoring unreadable frame as 0.0: {e}");
                0.0
            },
        }
    }

    /// Whether a score is kept
    #[must_use]
    pub fn is_sharp(&self, score: f64) -> bool {
        score >= self.threshold
    }

    /// Frames that would be rejected, without deleting anything
    #[must_use]
    pub fn blurry_frames(&self, frames: &[PathBuf]) -> Vec<PathBuf> {
        frames
            .iter()
            .filter(|frame| {
                let score = self.score(frame);
                let sharp = self.is_sharp(score);
                debug!(
                    frame = %frame.display(),
                    score,
                    threshold = self.threshold,
                    sharp,
                    "Focus measure"
                );
                !sharp
            })
            .cloned()
            .collect()
    }

    /// Delete blurry frames and return how many were actually removed
    pub fn apply(&self, frames: &[PathBuf]) -> usize {
        let mut removed = 0;
        for frame in self.blurry_frames(frames) {
            match std::fs::remove_file(&frame) {
                Ok(()) => {
                    removed += 1;
                    debug!(frame = %frame.display(), "Removed blurry frame");
                },
                Err(e) => error!(frame = %frame.display(), "Failed to remove blurry frame: {e}"),
            }
        }

        info!(
            checked = frames.len(),
            removed,
            threshold = self.threshold,
            "Sharpness filter finished"
        );
        removed
    }
}
