//! Near-duplicate elimination by structural similarity
//!
//! Frames are compared pairwise in filename order. A later frame whose
//! similarity to any earlier frame reaches the threshold is marked, and all
//! marked frames are deleted after the full pass. Marked frames keep serving
//! as the earlier side of later comparisons.

use crate::{
    error::{FrameSiftError, Result},
    services::io::FrameIOService,
};
use image::{imageops, GrayImage};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Side length of the uniform SSIM window
pub const SSIM_WINDOW: u32 = 7;

/// Canvas both frames are resized to when their dimensions differ
pub const CANONICAL_SIZE: u32 = 256;

const K1: f64 = 0.01;
const K2: f64 = 0.03;
const DYNAMIC_RANGE: f64 = 255.0;

/// Structural similarity of two grayscale images in [0, 1]
///
/// Images of different dimensions are both resized (bilinear) to a
/// 256×256 canvas first. The score is symmetric.
///
/// # Errors
/// `ImageCompareFailure` when either image is empty.
pub fn structural_similarity(first: &GrayImage, second: &GrayImage) -> Result<f64> {
    if first.width() == 0 || first.height() == 0 || second.width() == 0 || second.height() == 0 {
        return Err(FrameSiftError::ImageCompareFailure(format!(
            "cannot compare empty images ({}x{} vs {}x{})",
            first.width(),
            first.height(),
            second.width(),
            second.height()
        )));
    }

    if first.dimensions() == second.dimensions() {
        return Ok(ssim_same_size(first, second));
    }

    let filter = imageops::FilterType::Triangle;
    let a = imageops::resize(first, CANONICAL_SIZE, CANONICAL_SIZE, filter);
    let b = imageops::resize(second, CANONICAL_SIZE, CANONICAL_SIZE, filter);
    Ok(ssim_same_size(&a, &b))
}

/// Summed-area tables of x, y, x², y² and xy
struct MomentTables {
    stride: usize,
    x: Vec<f64>,
    y: Vec<f64>,
    xx: Vec<f64>,
    yy: Vec<f64>,
    xy: Vec<f64>,
}

impl MomentTables {
    fn build(first: &GrayImage, second: &GrayImage) -> Self {
        let (w, h) = (first.width() as usize, first.height() as usize);
        let stride = w + 1;
        let len = stride * (h + 1);
        let mut tables = Self {
            stride,
            x: vec![0.0; len],
            y: vec![0.0; len],
            xx: vec![0.0; len],
            yy: vec![0.0; len],
            xy: vec![0.0; len],
        };

        let (a, b) = (first.as_raw(), second.as_raw());
        for row in 0..h {
            let mut run = [0.0f64; 5];
            for col in 0..w {
                let px = f64::from(a[row * w + col]);
                let py = f64::from(b[row * w + col]);
                run[0] += px;
                run[1] += py;
                run[2] += px * px;
                run[3] += py * py;
                run[4] += px * py;

                let here = (row + 1) * stride + col + 1;
                let above = row * stride + col + 1;
                tables.x[here] = tables.x[above] + run[0];
                tables.y[here] = tables.y[above] + run[1];
                tables.xx[here] = tables.xx[above] + run[2];
                tables.yy[here] = tables.yy[above] + run[3];
                tables.xy[here] = tables.xy[above] + run[4];
            }
        }
        tables
    }

    /// Sum of `table` over the rectangle `[x0, x1) × [y0, y1)`
    fn sum(&self, table: &[f64], x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        table[y1 * self.stride + x1] - table[y0 * self.stride + x1] - table[y1 * self.stride + x0]
            + table[y0 * self.stride + x0]
    }

    fn window_ssim(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let n = ((x1 - x0) * (y1 - y0)) as f64;
        let cov_norm = if n > 1.0 { n / (n - 1.0) } else { 1.0 };

        let mean_x = self.sum(&self.x, x0, y0, x1, y1) / n;
        let mean_y = self.sum(&self.y, x0, y0, x1, y1) / n;
        let var_x = cov_norm * (self.sum(&self.xx, x0, y0, x1, y1) / n - mean_x * mean_x);
        let var_y = cov_norm * (self.sum(&self.yy, x0, y0, x1, y1) / n - mean_y * mean_y);
        let cov_xy = cov_norm * (self.sum(&self.xy, x0, y0, x1, y1) / n - mean_x * mean_y);

        let c1 = (K1 * DYNAMIC_RANGE).powi(2);
        let c2 = (K2 * DYNAMIC_RANGE).powi(2);

        ((2.0 * mean_x * mean_y + c1) * (2.0 * cov_xy + c2))
            / ((mean_x * mean_x + mean_y * mean_y + c1) * (var_x + var_y + c2))
    }
}

fn ssim_same_size(first: &GrayImage, second: &GrayImage) -> f64 {
    let (w, h) = (first.width() as usize, first.height() as usize);
    let tables = MomentTables::build(first, second);
    let window = SSIM_WINDOW as usize;

    let score = if w < window || h < window {
        tables.window_ssim(0, 0, w, h)
    } else {
        let mut total = 0.0;
        let mut count = 0usize;
        for y in 0..=(h - window) {
            for x in 0..=(w - window) {
                total += tables.window_ssim(x, y, x + window, y + window);
                count += 1;
            }
        }
        total / count as f64
    };

    score.clamp(0.0, 1.0)
}

/// Bytes of decoded grayscale anchors held at once during one pass
pub const DEFAULT_ANCHOR_BUDGET: usize = 256 * 1024 * 1024;

/// Removes later near-duplicates of earlier frames
#[derive(Debug, Clone)]
pub struct DuplicateEliminator {
    threshold: f64,
    anchor_budget: usize,
    cancel: Option<CancellationToken>,
}

impl DuplicateEliminator {
    /// Create an eliminator; pairs scoring at least `threshold` are duplicates
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            anchor_budget: DEFAULT_ANCHOR_BUDGET,
            cancel: None,
        }
    }

    /// Cap the memory spent on decoded anchor frames
    #[must_use]
    pub fn with_anchor_budget(mut self, bytes: usize) -> Self {
        self.anchor_budget = bytes;
        self
    }

    /// Abandon the pass once `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Compute the removal set over frames already sorted by original index
    ///
    /// Anchors are decoded a block at a time and candidates are streamed
    /// past each block, so memory stays within the anchor budget. Frames
    /// that fail to decode take no part in any comparison.
    ///
    /// Returns `None` when the pass was cancelled before it finished.
    #[must_use]
    pub fn plan_removals(&self, frames: &[PathBuf]) -> Option<Vec<PathBuf>> {
        let block_len = self.anchor_block_len(frames);
        let mut window = FrameWindow::new(frames, block_len);
        let mut interrupted = false;

        let marked = mark_duplicates(frames.len(), block_len, self.threshold, |i, j| {
            if interrupted || self.is_cancelled() {
                interrupted = true;
                return None;
            }
            let (Some(anchor), Some(candidate)) = window.pair(i, j) else {
                return None;
            };
            match structural_similarity(anchor, candidate) {
                Ok(score) => {
                    debug!(
                        anchor = %frames[i].display(),
                        candidate = %frames[j].display(),
                        score,
                        "Similarity"
                    );
                    Some(score)
                },
                Err(e) => {
                    warn!("{}", FrameSiftError::image_compare(&frames[i], &frames[j], e));
                    None
                },
            }
        });

        if interrupted {
            warn!(frames = frames.len(), "Duplicate check interrupted; nothing removed");
            return None;
        }

        Some(
            frames
                .iter()
                .zip(marked)
                .filter_map(|(frame, marked)| marked.then(|| frame.clone()))
                .collect(),
        )
    }

    /// Delete duplicates and return how many were actually removed
    ///
    /// Returns `None`, with nothing deleted, when the pass was cancelled.
    pub fn apply(&self, frames: &[PathBuf]) -> Option<usize> {
        let planned = self.plan_removals(frames)?;
        let removed = planned.iter().filter(|frame| remove_frame(frame)).count();

        info!(
            compared = frames.len(),
            marked = planned.len(),
            removed,
            threshold = self.threshold,
            "Duplicate elimination finished"
        );
        Some(removed)
    }

    /// Anchors per block, sized from the first frame whose header is readable
    fn anchor_block_len(&self, frames: &[PathBuf]) -> usize {
        let frame_bytes = frames
            .iter()
            .find_map(|frame| image::image_dimensions(frame).ok())
            .map_or(1, |(width, height)| width as usize * height as usize)
            .max(1);
        (self.anchor_budget / frame_bytes).clamp(1, frames.len().max(1))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// Decoded frames of the current anchor block plus one streamed candidate
struct FrameWindow<'a> {
    frames: &'a [PathBuf],
    block_len: usize,
    block_start: Option<usize>,
    anchors: Vec<Option<GrayImage>>,
    candidate: Option<(usize, Option<GrayImage>)>,
    unreadable: Vec<bool>,
}

impl<'a> FrameWindow<'a> {
    fn new(frames: &'a [PathBuf], block_len: usize) -> Self {
        Self {
            frames,
            block_len: block_len.max(1),
            block_start: None,
            anchors: Vec::new(),
            candidate: None,
            unreadable: vec![false; frames.len()],
        }
    }

    /// Decoded anchor and candidate; `None` for a frame that cannot be decoded
    fn pair(&mut self, anchor: usize, candidate: usize) -> (Option<&GrayImage>, Option<&GrayImage>) {
        let start = anchor - anchor % self.block_len;
        if self.block_start != Some(start) {
            self.anchors.clear();
            self.candidate = None;
            let end = (start + self.block_len).min(self.frames.len());
            let anchors: Vec<_> = (start..end).map(|index| self.load(index)).collect();
            self.anchors = anchors;
            self.block_start = Some(start);
        }

        let in_block = candidate < start + self.anchors.len();
        if !in_block && self.candidate.as_ref().map(|(index, _)| *index) != Some(candidate) {
            self.candidate = None;
            let gray = self.load(candidate);
            self.candidate = Some((candidate, gray));
        }

        let anchor_gray = self.anchors.get(anchor - start).and_then(Option::as_ref);
        let candidate_gray = if in_block {
            self.anchors.get(candidate - start).and_then(Option::as_ref)
        } else {
            self.candidate.as_ref().and_then(|(_, gray)| gray.as_ref())
        };
        (anchor_gray, candidate_gray)
    }

    fn load(&mut self, index: usize) -> Option<GrayImage> {
        let frame = self.frames.get(index)?;
        if self.unreadable.get(index).copied().unwrap_or(true) {
            return None;
        }
        match FrameIOService::load_grayscale(frame) {
            Ok(gray) => Some(gray),
            Err(e) => {
                warn!("Excluding unreadable frame from duplicate check: {e}");
                if let Some(flag) = self.unreadable.get_mut(index) {
                    *flag = true;
                }
                None
            },
        }
    }
}

/// Mark every later item whose similarity to an earlier one reaches `threshold`
///
/// Anchors are visited in blocks of `anchor_block`; for each block every
/// later candidate is compared with the block's anchors in order. The marked
/// set does not depend on the block size. `similarity(i, j)` is only asked
/// for `i < j` with `j` not yet marked; `None` means the pair cannot be
/// compared. Marked items still act as the earlier side of later pairs.
pub fn mark_duplicates<F>(
    count: usize,
    anchor_block: usize,
    threshold: f64,
    mut similarity: F,
) -> Vec<bool>
where
    F: FnMut(usize, usize) -> Option<f64>,
{
    let block_len = anchor_block.max(1);
    let mut marked = vec![false; count];
    for start in (0..count).step_by(block_len) {
        let end = (start + block_len).min(count);
        for j in (start + 1)..count {
            for i in start..end.min(j) {
                if marked[j] {
                    break;
                }
                if similarity(i, j).is_some_and(|score| score >= threshold) {
                    marked[j] = true;
                }
            }
        }
    }
    marked
}

fn remove_frame(frame: &Path) -> bool {
    match std::fs::remove_file(frame) {
        Ok(()) => true,
        Err(e) => {
            error!(frame = %frame.display(), "Failed to remove duplicate frame: {e}");
            false
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use tempfile::tempdir;

    fn pattern(width: u32, height: u32, seed: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            Luma([((x * 31 + y * 17 + seed * 97) % 256) as u8])
        })
    }

    fn save(dir: &Path, name: &str, gray: &GrayImage) -> PathBuf {
        let path = dir.join(name);
        image::DynamicImage::ImageLuma8(gray.clone())
            .to_rgb8()
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_self_similarity_is_one() {
        for (w, h) in [(32, 24), (7, 7), (3, 5), (64, 64)] {
            let image = pattern(w, h, 3);
            let score = structural_similarity(&image, &image).unwrap();
            assert!((score - 1.0).abs() < 1e-9, "{w}x{h}: {score}");
        }
    }

    #[test]
    fn test_uniform_images_of_same_value_are_identical() {
        let grey = GrayImage::from_pixel(16, 16, Luma([128]));
        assert!((structural_similarity(&grey, &grey).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_black_and_white_are_dissimilar() {
        let black = GrayImage::from_pixel(16, 16, Luma([0]));
        let white = GrayImage::from_pixel(16, 16, Luma([255]));
        assert!(structural_similarity(&black, &white).unwrap() < 0.01);
    }

    #[test]
    fn test_similarity_is_symmetric_and_bounded() {
        let a = pattern(20, 20, 1);
        let b = pattern(20, 20, 2);
        let ab = structural_similarity(&a, &b).unwrap();
        let ba = structural_similarity(&b, &a).unwrap();
        assert!((ab - ba).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&ab));
    }

    #[test]
    fn test_different_dimensions_are_resized() {
        let small = GrayImage::from_pixel(10, 20, Luma([90]));
        let large = GrayImage::from_pixel(40, 30, Luma([90]));
        let score = structural_similarity(&small, &large).unwrap();
        assert!(score > 0.999, "{score}");
    }

    #[test]
    fn test_empty_image_cannot_be_compared() {
        let empty = GrayImage::new(0, 0);
        let err = structural_similarity(&empty, &pattern(4, 4, 0)).unwrap_err();
        assert!(matches!(err, FrameSiftError::ImageCompareFailure(_)));
    }

    #[test]
    fn test_removes_later_duplicates_keeps_first() {
        let dir = tempdir().unwrap();
        let a = pattern(32, 32, 1);
        let b = GrayImage::from_pixel(32, 32, Luma([200]));
        let frames = vec![
            save(dir.path(), "frame_0000.png", &a),
            save(dir.path(), "frame_0005.png", &b),
            save(dir.path(), "frame_0010.png", &a),
        ];

        let removed = DuplicateEliminator::new(0.99).apply(&frames);

        assert_eq!(removed, Some(1));
        assert!(frames[0].exists());
        assert!(frames[1].exists());
        assert!(!frames[2].exists());
    }

    #[test]
    fn test_zero_threshold_leaves_one_survivor() {
        let dir = tempdir().unwrap();
        let frames: Vec<PathBuf> = (0..4)
            .map(|i| save(dir.path(), &format!("frame_{i:04}.png"), &pattern(16, 16, i)))
            .collect();

        assert_eq!(DuplicateEliminator::new(0.0).apply(&frames), Some(3));
        assert!(frames[0].exists());
    }

    #[test]
    fn test_threshold_one_keeps_distinct_frames() {
        let dir = tempdir().unwrap();
        let frames: Vec<PathBuf> = (0..3)
            .map(|i| save(dir.path(), &format!("frame_{i:04}.png"), &pattern(16, 16, i)))
            .collect();

        assert_eq!(DuplicateEliminator::new(1.0).plan_removals(&frames), Some(Vec::new()));
    }

    #[test]
    fn test_second_pass_removes_nothing() {
        let dir = tempdir().unwrap();
        let a = pattern(24, 24, 4);
        let frames = vec![
            save(dir.path(), "frame_0000.png", &a),
            save(dir.path(), "frame_0001.png", &a),
            save(dir.path(), "frame_0002.png", &GrayImage::from_pixel(24, 24, Luma([200]))),
        ];
        let eliminator = DuplicateEliminator::new(0.95);

        assert_eq!(eliminator.apply(&frames), Some(1));
        let survivors: Vec<PathBuf> = frames.into_iter().filter(|f| f.exists()).collect();
        assert_eq!(eliminator.apply(&survivors), Some(0));
    }

    #[test]
    fn test_marked_items_still_anchor_later_comparisons() {
        // 0~1 and 1~2 are similar, 0 and 2 are not
        let scores = [[1.0, 0.97, 0.10], [0.97, 1.0, 0.96], [0.10, 0.96, 1.0]];
        let marked = mark_duplicates(3, 3, 0.95, |i, j| Some(scores[i][j]));
        assert_eq!(marked, vec![false, true, true]);
    }

    #[test]
    fn test_marked_items_are_not_compared_again() {
        let mut asked = Vec::new();
        let marked = mark_duplicates(3, 3, 0.5, |i, j| {
            asked.push((i, j));
            Some(1.0)
        });
        assert_eq!(marked, vec![false, true, true]);
        assert_eq!(asked, vec![(0, 1), (0, 2)]);
    }

    #[test]
    fn test_incomparable_pairs_are_never_duplicates() {
        let marked = mark_duplicates(3, 3, 0.0, |i, _| (i != 0).then_some(1.0));
        assert_eq!(marked, vec![false, false, true]);
    }

    #[test]
    fn test_unreadable_frame_is_never_a_duplicate() {
        let dir = tempdir().unwrap();
        let a = pattern(16, 16, 5);
        let broken = dir.path().join("frame_0001.jpg");
        std::fs::write(&broken, b"garbage").unwrap();
        let frames = vec![
            save(dir.path(), "frame_0000.png", &a),
            broken.clone(),
            save(dir.path(), "frame_0002.png", &a),
        ];

        let removals = DuplicateEliminator::new(0.0).plan_removals(&frames);
        assert_eq!(removals, Some(vec![frames[2].clone()]));
        assert!(broken.exists());
    }

    #[test]
    fn test_marks_do_not_depend_on_anchor_block_size() {
        let n = 9;
        let score = |i: usize, j: usize| ((i * 37 + j * 11) % 10) as f64 / 10.0;
        let reference = mark_duplicates(n, n, 0.6, |i, j| Some(score(i, j)));
        for block in [1, 2, 4, 5] {
            assert_eq!(
                mark_duplicates(n, block, 0.6, |i, j| Some(score(i, j))),
                reference,
                "block {block}"
            );
        }
    }

    #[test]
    fn test_small_anchor_budget_gives_same_removals() {
        let dir = tempdir().unwrap();
        let a = pattern(16, 16, 1);
        let b = GrayImage::from_pixel(16, 16, Luma([200]));
        let frames = vec![
            save(dir.path(), "frame_0000.png", &a),
            save(dir.path(), "frame_0001.png", &b),
            save(dir.path(), "frame_0002.png", &a),
            save(dir.path(), "frame_0003.png", &GrayImage::from_pixel(16, 16, Luma([30]))),
            save(dir.path(), "frame_0004.png", &b),
        ];

        let unbounded = DuplicateEliminator::new(0.95).plan_removals(&frames).unwrap();
        // One 16x16 anchor per block
        let bounded = DuplicateEliminator::new(0.95)
            .with_anchor_budget(256)
            .plan_removals(&frames)
            .unwrap();

        assert_eq!(unbounded, vec![frames[2].clone(), frames[4].clone()]);
        assert_eq!(bounded, unbounded);
    }

    #[test]
    fn test_anchor_block_len_follows_budget() {
        let dir = tempdir().unwrap();
        let frames: Vec<PathBuf> = (0..10)
            .map(|i| save(dir.path(), &format!("frame_{i:04}.png"), &pattern(10, 10, i)))
            .collect();

        let eliminator = DuplicateEliminator::new(0.9);
        assert_eq!(eliminator.clone().with_anchor_budget(300).anchor_block_len(&frames), 3);
        assert_eq!(eliminator.clone().with_anchor_budget(1).anchor_block_len(&frames), 1);
        assert_eq!(eliminator.anchor_block_len(&frames), 10);
    }

    #[test]
    fn test_cancelled_pass_removes_nothing() {
        let dir = tempdir().unwrap();
        let a = pattern(16, 16, 6);
        let frames = vec![
            save(dir.path(), "frame_0000.png", &a),
            save(dir.path(), "frame_0001.png", &a),
        ];
        let token = CancellationToken::new();
        token.cancel();

        let eliminator = DuplicateEliminator::new(0.5).with_cancellation(token);

        assert_eq!(eliminator.plan_removals(&frames), None);
        assert_eq!(eliminator.apply(&frames), None);
        assert!(frames.iter().all(|frame| frame.exists()));
    }
}
