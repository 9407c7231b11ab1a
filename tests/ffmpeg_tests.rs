//! Integration tests against the real ffmpeg/ffprobe binaries.
//! Each test is skipped when the tools are not installed.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use framecut::adapters::{FfmpegDecoderAdapter, FfmpegTranscodeAdapter};
use framecut::app::{EngineGate, PreviewWorkspace, SamplerConfig, TrimConfig};
use framecut::ports::MediaDecoderPort;
use framecut::*;
use tempfile::TempDir;
use tokio::time::timeout;
use tokio_stream::StreamExt;

const WAIT: Duration = Duration::from_secs(60);

fn tools_available() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|tool| {
        Command::new(tool)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    })
}

/// Create a 4 second 160x120 test video using FFmpeg
fn create_test_video(path: &Path) -> bool {
    Command::new("ffmpeg")
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "lavfi",
            "-i",
            "testsrc=duration=4:size=160x120:rate=25",
            "-c:v",
            "mpeg4",
            "-g",
            "25",
            "-y",
        ])
        .arg(path)
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

async fn sample_source() -> Option<(TempDir, SourceRef)> {
    if !tools_available() {
        println!("Skipping ffmpeg test - ffmpeg/ffprobe not found");
        return None;
    }
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("testsrc.mp4");
    if !create_test_video(&path) {
        println!("Skipping ffmpeg test - could not create test video");
        return None;
    }
    let source = SourceRef::from_path(&path).await.expect("Failed to read test video");
    Some((dir, source))
}

fn decoder() -> Arc<FfmpegDecoderAdapter> {
    Arc::new(FfmpegDecoderAdapter::new(
        "ffmpeg",
        "ffprobe",
        Duration::from_millis(50),
    ))
}

#[tokio::test]
async fn test_decoder_opens_and_settles() {
    let Some((_dir, source)) = sample_source().await else {
        return;
    };
    let decoder = decoder();

    let metadata = decoder.open(&source).await.unwrap();
    assert!((metadata.duration - 4.0).abs() < 0.2);
    assert_eq!(metadata.width, Some(160));
    assert_eq!(metadata.height, Some(120));

    assert_eq!(decoder.seek(2.0).await.unwrap(), 2.0);
    let frame = decoder.capture_frame(32, 24).await.unwrap();
    assert_eq!(frame.dimensions(), (32, 24));

    // Seeking to the very end still yields a picture
    let end = decoder.seek(metadata.duration).await.unwrap();
    assert_eq!(end, metadata.duration);
    assert!(decoder.is_ended());
    assert!(decoder.capture_frame(16, 12).await.is_ok());
}

#[tokio::test]
async fn test_strip_and_trim_with_ffmpeg() {
    let Some((_dir, source)) = sample_source().await else {
        return;
    };

    let gate = Arc::new(EngineGate::new(Arc::new(FfmpegTranscodeAdapter::new(
        "ffmpeg",
    ))));
    assert_eq!(gate.initialize().await, EngineState::Ready);

    let workspace = PreviewWorkspace::new(
        decoder(),
        gate,
        SamplerConfig {
            frame_count: 4,
            ..SamplerConfig::default()
        },
        TrimConfig::default(),
    );
    let metadata = workspace.load(source.clone()).await.unwrap();

    match timeout(WAIT, workspace.wait_for_strip()).await.unwrap() {
        StripState::Ready(frames) => {
            assert_eq!(frames.len(), 5);
            assert_eq!(frames[4].time(), metadata.duration);
        }
        other => panic!("strip not ready: {:?}", other),
    }

    let job = workspace.submit_trim(TrimRequest::new(1.0, 2.0)).unwrap();
    let events: Vec<ProcessingState> = timeout(WAIT, job.collect()).await.unwrap();
    for event in &events[..events.len() - 1] {
        match event {
            ProcessingState::Running(p) => assert!((0.0..=1.0).contains(p)),
            other => panic!("unexpected event: {:?}", other),
        }
    }
    match events.last() {
        Some(ProcessingState::Completed(artifact)) => {
            assert_eq!(artifact.file_name, "testsrc_trim_1s_3s.mp4");
            assert!(!artifact.is_empty());
            assert!(artifact.len() < source.bytes().len());
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_trim_of_garbage_input_fails() {
    if !tools_available() {
        println!("Skipping ffmpeg test - ffmpeg/ffprobe not found");
        return;
    }
    let engine = Arc::new(FfmpegTranscodeAdapter::new("ffmpeg"));
    let gate = Arc::new(EngineGate::new(engine));
    gate.initialize().await;

    let controller = framecut::app::TrimJobController::new(gate, TrimConfig::default());
    let source = SourceRef::new("garbage.mp4", vec![0u8; 512]);
    let job = controller
        .submit(&source, TrimRequest::new(0.0, 1.0), None)
        .unwrap();

    assert!(matches!(
        timeout(WAIT, job.wait()).await.unwrap(),
        Err(FramecutError::Transcode { .. })
    ));
}
