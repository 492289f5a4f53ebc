//! Shared synthetic frame builders for integration tests

#![allow(dead_code)]

use framesift::types::{parse_frame_index, FRAME_EXTENSION};
use image::{Rgb, RgbImage};
use std::path::Path;

/// High-frequency frame; different seeds give structurally different images
pub fn textured(seed: u32) -> RgbImage {
    textured_sized(48, 48, seed)
}

/// Textured frame with explicit dimensions
pub fn textured_sized(width: u32, height: u32, seed: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let v = ((x * 7 + y * 13 + seed * 71) ^ (x * y + seed)) % 256;
        Rgb([v as u8, (255 - v) as u8, ((v * 3) % 256) as u8])
    })
}

/// Featureless frame with a focus measure of zero
pub fn flat(value: u8) -> RgbImage {
    RgbImage::from_pixel(48, 48, Rgb([value, value, value]))
}

/// Original indices of the frame files left in `dir`, ascending
pub fn surviving_indices(dir: &Path) -> Vec<u64> {
    let mut indices: Vec<u64> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| {
                    entry.path().extension().and_then(|e| e.to_str()) == Some(FRAME_EXTENSION)
                })
                .filter_map(|entry| parse_frame_index(&entry.file_name().to_string_lossy()))
                .collect()
        })
        .unwrap_or_default();
    indices.sort_unstable();
    indices
}
