//! Filesystem operations service
//!
//! Keeps directory listing, frame decoding, input discovery and output
//! layout planning out of the curation stages so they can be tested apart.

use crate::{
    backends::video::VideoFormat,
    error::{FrameSiftError, Result},
    types::{parse_frame_index, VideoJob},
};
use image::{GrayImage, RgbImage};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Directory created next to the videos in directory mode
pub const DEFAULT_BATCH_OUTPUT_DIR: &str = "Processed_Frames";

/// Suffix of the default output directory in single-file mode
pub const SINGLE_OUTPUT_SUFFIX: &str = "_frames";

const WRITE_PROBE_NAME: &str = ".framesift-write-probe";

/// Service for frame files and output directories
pub struct FrameIOService;

impl FrameIOService {
    /// Decode a persisted frame and convert it to grayscale
    ///
    /// # Errors
    /// `ImageDecodeFailure` when the file is missing or cannot be decoded.
    pub fn load_grayscale<P: AsRef<Path>>(path: P) -> Result<GrayImage> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| FrameSiftError::image_decode(path, e))?;
        Ok(luma_bt601(&image.to_rgb8()))
    }

    /// List the frame files of `dir`, sorted by original index
    ///
    /// Files not named like sampled frames are ignored. Sorting uses the
    /// parsed index, so names wider than four digits stay in numeric order.
    ///
    /// # Errors
    /// `DirectoryListFailure` when the directory cannot be read.
    pub fn list_frames<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| FrameSiftError::directory_list(dir, &e))?;

        let mut frames = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FrameSiftError::directory_list(dir, &e))?;
            let Some(index) = entry.file_name().to_str().and_then(parse_frame_index) else {
                continue;
            };
            if entry.path().is_file() {
                frames.push((index, entry.path()));
            }
        }

        frames.sort_by_key(|(index, _)| *index);
        Ok(frames.into_iter().map(|(_, path)| path).collect())
    }

    /// Number of frame files in `dir`
    ///
    /// # Errors
    /// `DirectoryListFailure` when the directory cannot be read.
    pub fn count_frames<P: AsRef<Path>>(dir: P) -> Result<usize> {
        Self::list_frames(dir).map(|frames| frames.len())
    }

    /// Check that `dir` is usable as an output root
    ///
    /// A missing directory is accepted (it is created on first write). An
    /// existing one must be a directory that accepts new files.
    ///
    /// # Errors
    /// `OutputDirectoryFailure` when the path is a file or not writable.
    pub fn ensure_writable_dir<P: AsRef<Path>>(dir: P) -> Result<()> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(());
        }
        if !dir.is_dir() {
            return Err(FrameSiftError::output_directory(dir, "not a directory"));
        }

        let probe = dir.join(WRITE_PROBE_NAME);
        std::fs::write(&probe, b"")
            .map_err(|e| FrameSiftError::output_directory(dir, format!("not writable: {e}")))?;
        if let Err(e) = std::fs::remove_file(&probe) {
            tracing::warn!(probe = %probe.display(), "Failed to remove write probe: {e}");
        }
        Ok(())
    }
}

/// Grayscale with BT.601 weights in 14-bit fixed point
///
/// Matches the usual OpenCV RGB-to-gray conversion, which the default
/// sharpness threshold is calibrated against.
#[must_use]
pub fn luma_bt601(rgb: &RgbImage) -> GrayImage {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    const SHIFT: u32 = 14;

    let mut gray = GrayImage::new(rgb.width(), rgb.height());
    for (dst, src) in gray.pixels_mut().zip(rgb.pixels()) {
        let [r, g, b] = src.0;
        let weighted = u32::from(r) * R + u32::from(g) * G + u32::from(b) * B;
        let y = (weighted + (1 << (SHIFT - 1))) >> SHIFT;
        dst.0 = [y.min(255) as u8];
    }
    gray
}

/// What the user pointed the tool at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    /// One video file
    SingleFile(PathBuf),
    /// A directory of videos
    Directory(PathBuf),
}

impl InputKind {
    /// Classify an input path
    ///
    /// # Errors
    /// - `InputNotFound` when the path does not exist
    /// - `InputNotReadable` when it cannot be inspected, is neither file nor
    ///   directory, or is a file without a recognized video extension
    pub fn classify<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FrameSiftError::input_not_found(path));
            },
            Err(e) => return Err(FrameSiftError::input_not_readable(path, e)),
        };

        if metadata.is_dir() {
            Ok(Self::Directory(path.to_path_buf()))
        } else if metadata.is_file() {
            if is_video_file(path) {
                Ok(Self::SingleFile(path.to_path_buf()))
            } else {
                Err(FrameSiftError::input_not_readable(
                    path,
                    "not a supported video file (mp4, mov, avi, mkv, webm)",
                ))
            }
        } else {
            Err(FrameSiftError::input_not_readable(
                path,
                "neither a file nor a directory",
            ))
        }
    }

    /// Output root used when none is given
    ///
    /// `<stem>_frames` next to a single video, `<dir>/Processed_Frames` for
    /// a directory.
    #[must_use]
    pub fn default_output_root(&self) -> PathBuf {
        match self {
            Self::SingleFile(video) => {
                let stem = video.file_stem().unwrap_or_default().to_string_lossy();
                video.with_file_name(format!("{stem}{SINGLE_OUTPUT_SUFFIX}"))
            },
            Self::Directory(dir) => dir.join(DEFAULT_BATCH_OUTPUT_DIR),
        }
    }

    /// Whether this is single-file mode
    #[must_use]
    pub fn is_single_file(&self) -> bool {
        matches!(self, Self::SingleFile(_))
    }
}

/// Check if file is a video by extension (case-insensitive)
#[must_use]
pub fn is_video_file(path: &Path) -> bool {
    VideoFormat::from_path(path).is_some()
}

/// Find video files in a directory, sorted by path
///
/// # Errors
/// `InputNotReadable` when the directory or one of its entries cannot be read.
#[cfg(feature = "cli")]
pub fn find_video_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry.map_err(|e| FrameSiftError::input_not_readable(dir, e))?;
            let path = entry.path();
            if entry.file_type().is_file() && is_video_file(path) && matches_pattern(path, pattern) {
                files.push(path.to_path_buf());
            }
        }
    } else {
        let entries =
            std::fs::read_dir(dir).map_err(|e| FrameSiftError::input_not_readable(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| FrameSiftError::input_not_readable(dir, e))?;
            let path = entry.path();
            if path.is_file() && is_video_file(&path) && matches_pattern(&path, pattern) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Check if a file name matches an optional glob pattern
#[cfg(feature = "cli")]
#[must_use]
pub fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| glob::Pattern::new(pat).is_ok_and(|p| p.matches(name))),
        None => true,
    }
}

/// Assign every video a private output directory
///
/// In single-file mode the one video writes straight into `output_root`.
/// Otherwise each video gets `<output_root>/<stem>`; stems shared by
/// several videos get the extension appended (`a_mov`), and any name still
/// taken gets a numeric suffix, so directories are always disjoint.
#[must_use]
pub fn plan_output_dirs(videos: &[PathBuf], output_root: &Path, single_file: bool) -> Vec<VideoJob> {
    if single_file {
        return videos
            .iter()
            .map(|video| VideoJob::new(video.clone(), output_root.to_path_buf()))
            .collect();
    }

    let stem_of = |video: &PathBuf| {
        video
            .file_stem()
            .map_or_else(|| "video".to_string(), |s| s.to_string_lossy().into_owned())
    };

    let mut stem_counts: HashMap<String, usize> = HashMap::new();
    for video in videos {
        *stem_counts.entry(stem_of(video)).or_default() += 1;
    }

    let mut taken: HashSet<String> = HashSet::new();
    videos
        .iter()
        .map(|video| {
            let stem = stem_of(video);
            let base = if stem_counts.get(&stem).copied().unwrap_or(0) > 1 {
                match video.extension().and_then(|e| e.to_str()) {
                    Some(ext) => format!("{stem}_{}", ext.to_lowercase()),
                    None => stem,
                }
            } else {
                stem
            };

            let mut name = base.clone();
            let mut counter = 2;
            while !taken.insert(name.clone()) {
                name = format!("{base}_{counter}");
                counter += 1;
            }

            VideoJob::new(video.clone(), output_root.join(name))
        })
        .collect()
}
