//! End-to-end curation scenarios over synthetic videos
//!
//! Each test drives one video through sampling, blur rejection and duplicate
//! elimination and checks both the reported counts and the files left on disk.

mod common;

use common::{flat, surviving_indices, textured, textured_sized};
use framesift::{
    backends::{SyntheticVideo, SyntheticVideoBackend},
    config::{CurationParams, Rotation},
    processor::VideoCurationProcessor,
    types::{frame_file_name, RemovalCount},
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn run(
    backend: SyntheticVideoBackend,
    params: CurationParams,
    video: &str,
    output: &Path,
) -> framesift::types::JobResult {
    VideoCurationProcessor::new(Arc::new(backend), Arc::new(params)).process(Path::new(video), output)
}

#[test]
fn test_twelve_frames_with_repeated_samples_collapse_to_one() {
    // Sampled indices 0, 5 and 10 carry the same texture; every other frame differs
    let frames: Vec<_> = (0..12u32)
        .map(|i| if i % 5 == 0 { textured(3) } else { textured(100 + i) })
        .collect();
    let backend = SyntheticVideoBackend::new().with_frames("walk.mp4", frames);
    let params = CurationParams::builder()
        .stride(5)
        .sharpness_threshold(10)
        .duplicate_threshold(0.99)
        .build()
        .unwrap();
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("walk");

    let result = run(backend, params, "walk.mp4", &out);

    let summary = result.summary();
    assert!(summary.is_success(), "{:?}", summary.failure_message());
    assert_eq!(summary.video, "walk.mp4");
    assert_eq!(summary.extracted_frames, 3);
    assert_eq!(summary.blurry_frames_removed, RemovalCount::Counted(0));
    assert_eq!(summary.duplicate_frames_removed, RemovalCount::Counted(2));
    assert_eq!(summary.final_frames, 1);
    assert_eq!(surviving_indices(&out), vec![0]);
}

#[test]
fn test_blurry_frames_are_removed_before_deduplication() {
    // Sampled: flat, texture A, flat, texture B
    let frames = vec![flat(40), textured(1), flat(200), textured(2)];
    let backend = SyntheticVideoBackend::new().with_frames("pan.mov", frames);
    let params = CurationParams::builder()
        .stride(1)
        .sharpness_threshold(50)
        .duplicate_threshold(0.95)
        .build()
        .unwrap();
    let temp = TempDir::new().unwrap();

    let result = run(backend, params, "pan.mov", temp.path());

    let summary = result.summary();
    assert_eq!(summary.extracted_frames, 4);
    assert_eq!(summary.blurry_frames_removed, RemovalCount::Counted(2));
    assert_eq!(summary.duplicate_frames_removed, RemovalCount::Counted(0));
    assert_eq!(summary.final_frames, 2);
    assert_eq!(surviving_indices(temp.path()), vec![1, 3]);
}

#[test]
fn test_counts_are_consistent_with_disk() {
    let frames: Vec<_> = (0..20u32)
        .map(|i| match i % 4 {
            0 => flat(128),
            1 | 2 => textured(9),
            _ => textured(i),
        })
        .collect();
    let backend = SyntheticVideoBackend::new().with_frames("mix.mkv", frames);
    let params = CurationParams::builder()
        .stride(1)
        .sharpness_threshold(20)
        .duplicate_threshold(0.97)
        .build()
        .unwrap();
    let temp = TempDir::new().unwrap();

    let result = run(backend, params, "mix.mkv", temp.path());

    let summary = result.summary();
    assert!(summary.is_success());
    assert_eq!(
        summary.extracted_frames,
        summary.blurry_frames_removed.value()
            + summary.duplicate_frames_removed.value()
            + summary.final_frames
    );
    assert_eq!(surviving_indices(temp.path()).len(), summary.final_frames);
}

#[test]
fn test_identical_runs_leave_identical_directories() {
    let frames: Vec<_> = (0..15u32).map(|i| textured(i % 3)).collect();
    let params = CurationParams::builder()
        .stride(2)
        .sharpness_threshold(10)
        .duplicate_threshold(0.9)
        .build()
        .unwrap();
    let temp = TempDir::new().unwrap();
    let first = temp.path().join("first");
    let second = temp.path().join("second");

    let backend = || SyntheticVideoBackend::new().with_frames("loop.mp4", frames.clone());
    let a = run(backend(), params.clone(), "loop.mp4", &first);
    let b = run(backend(), params, "loop.mp4", &second);

    assert_eq!(a.summary().final_frames, b.summary().final_frames);
    let kept = surviving_indices(&first);
    assert_eq!(kept, surviving_indices(&second));
    for index in kept {
        let name = frame_file_name(index);
        assert_eq!(
            std::fs::read(first.join(&name)).unwrap(),
            std::fs::read(second.join(&name)).unwrap()
        );
    }
}

#[test]
fn test_rotation_is_applied_to_written_frames() {
    let frames = vec![textured_sized(64, 32, 5)];
    let backend = SyntheticVideoBackend::new().with_frames("tilted.mp4", frames);
    let params = CurationParams::builder()
        .stride(1)
        .sharpness_threshold(0)
        .rotation(Rotation::Clockwise90)
        .build()
        .unwrap();
    let temp = TempDir::new().unwrap();

    let result = run(backend, params, "tilted.mp4", temp.path());

    assert_eq!(result.summary().final_frames, 1);
    let written = image::open(temp.path().join(frame_file_name(0))).unwrap();
    assert_eq!((written.width(), written.height()), (32, 64));
}

#[test]
fn test_dry_run_predicts_extractions_without_touching_disk() {
    let backend = SyntheticVideoBackend::new().with_frames("long.mp4", vec![textured(0); 23]);
    let params = CurationParams::builder()
        .stride(5)
        .dry_run(true)
        .build()
        .unwrap();
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("long");

    let result = run(backend, params, "long.mp4", &out);

    let summary = result.summary();
    assert!(summary.is_success());
    assert_eq!(summary.extracted_frames, 5);
    assert_eq!(summary.blurry_frames_removed, RemovalCount::NotComputed);
    assert_eq!(summary.duplicate_frames_removed, RemovalCount::NotComputed);
    assert!(!out.exists());
}

#[test]
fn test_truncated_video_keeps_frames_decoded_before_the_error() {
    let frames: Vec<_> = (0..6u32).map(textured).collect();
    let backend = SyntheticVideoBackend::new().with_video(
        "cut.mp4",
        SyntheticVideo::Truncated {
            frames: Arc::new(frames),
        },
    );
    let params = CurationParams::builder()
        .stride(2)
        .sharpness_threshold(10)
        .duplicate_threshold(0.99)
        .build()
        .unwrap();
    let temp = TempDir::new().unwrap();

    let result = run(backend, params, "cut.mp4", temp.path());

    assert!(!result.is_failed());
    assert_eq!(result.summary().extracted_frames, 3);
    assert_eq!(surviving_indices(temp.path()), vec![0, 2, 4]);
}

#[test]
fn test_stream_that_never_decodes_is_a_failed_job() {
    let backend = SyntheticVideoBackend::new().with_video(
        "garbage.mp4",
        SyntheticVideo::Truncated {
            frames: Arc::new(Vec::new()),
        },
    );
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("garbage");

    let result = run(backend, CurationParams::default(), "garbage.mp4", &out);

    assert!(result.is_failed());
    let summary = result.summary();
    assert_eq!(summary.extracted_frames, 0);
    assert_eq!(summary.blurry_frames_removed, RemovalCount::Counted(0));
    assert_eq!(summary.duplicate_frames_removed, RemovalCount::Counted(0));
    assert_eq!(summary.final_frames, 0);
    assert!(summary.failure_message().unwrap().contains("garbage.mp4"));
    assert!(surviving_indices(&out).is_empty());
}

#[test]
fn test_unopenable_video_reports_failure_and_writes_nothing() {
    let backend = SyntheticVideoBackend::new().with_video("broken.avi", SyntheticVideo::Corrupt);
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("broken");

    let result = run(backend, CurationParams::default(), "broken.avi", &out);

    assert!(result.is_failed());
    assert_eq!(result.summary().extracted_frames, 0);
    assert!(surviving_indices(&out).is_empty());
}
