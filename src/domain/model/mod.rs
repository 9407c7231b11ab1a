// Domain models - Core types and data structures

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{FramecutError, FramecutResult};


/// In-memory byte source for one loaded media resource
#[derive(Clone, PartialEq)]
pub struct SourceRef {
    name: String,
    bytes: Arc<[u8]>,
}

impl SourceRef {
    /// Create a source from a display name and its bytes
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a local file into memory
    pub async fn from_path(path: impl AsRef<Path>) -> FramecutResult<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| FramecutError::Io {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "input".to_string());
        Ok(Self::new(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// File extension including the dot, or `.mp4` when the name has none
    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_else(|| ".mp4".to_string())
    }

    /// File name without extension
    pub fn stem(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "clip".to_string())
    }
}

impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRef")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Metadata reported once a resource is ready for playback
#[derive(Debug, Clone, PartialEq)]
pub struct MediaMetadata {
    /// Duration in seconds
    pub duration: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl MediaMetadata {
    pub fn with_duration(duration: f64) -> Self {
        Self {
            duration,
            width: None,
            height: None,
        }
    }
}

/// PNG-encoded thumbnail bitmap
#[derive(Clone, PartialEq)]
pub struct FrameImage {
    width: u32,
    height: u32,
    png: Arc<[u8]>,
}

impl FrameImage {
    pub fn new(width: u32, height: u32, png: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            png: png.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn png(&self) -> &[u8] {
        &self.png
    }
}

impl fmt::Debug for FrameImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameImage({}x{}, {} bytes)", self.width, self.height, self.png.len())
    }
}

/// A still captured at one playback time. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    time: f64,
    image: FrameImage,
}

impl Frame {
    pub fn new(time: f64, image: FrameImage) -> Self {
        Self { time, image }
    }

    /// Playback time in seconds this frame was captured at
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn image(&self) -> &FrameImage {
        &self.image
    }
}

/// Start/duration of a requested sub-clip, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimRequest {
    pub start: f64,
    pub duration: f64,
}

impl TrimRequest {
    pub fn new(start: f64, duration: f64) -> Self {
        Self { start, duration }
    }

    /// Check the request's own bounds
    pub fn validate(&self) -> FramecutResult<()> {
        if !self.start.is_finite() || !self.duration.is_finite() {
            return Err(FramecutError::invalid("start and duration must be finite"));
        }
        if self.start < 0.0 {
            return Err(FramecutError::invalid(format!(
                "start must be >= 0 (got {})",
                self.start
            )));
        }
        if self.duration <= 0.0 {
            return Err(FramecutError::invalid(format!(
                "duration must be > 0 (got {})",
                self.duration
            )));
        }
        Ok(())
    }

    /// Check the request against a known source duration.
    ///
    /// A start at or past the end is rejected; a duration overrunning the end
    /// is left for the engine to clamp.
    pub fn validate_against(&self, source_duration: f64) -> FramecutResult<()> {
        self.validate()?;
        if source_duration > 0.0 && self.start >= source_duration {
            return Err(FramecutError::invalid(format!(
                "start {} is beyond the source duration {}",
                self.start, source_duration
            )));
        }
        Ok(())
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Downloadable result of a successful trim
#[derive(Clone, PartialEq)]
pub struct ArtifactRef {
    pub job_id: u64,
    pub file_name: String,
    pub mime_type: String,
    bytes: Arc<[u8]>,
}

impl ArtifactRef {
    pub fn new(
        job_id: u64,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            job_id,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactRef")
            .field("job_id", &self.job_id)
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Lifecycle of the trim job controller
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingState {
    Idle,
    /// Progress ratio in [0, 1]
    Running(f64),
    Completed(ArtifactRef),
    Failed(FramecutError),
}

impl ProcessingState {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessingState::Running(_))
    }

    /// Completed or Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingState::Completed(_) | ProcessingState::Failed(_))
    }
}

/// Lifecycle of the process-wide transcoding engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
    LoadFailed(String),
}

impl EngineState {
    pub fn is_settled(&self) -> bool {
        matches!(self, EngineState::Ready | EngineState::LoadFailed(_))
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Unloaded => write!(f, "unloaded"),
            EngineState::Loading => write!(f, "loading"),
            EngineState::Ready => write!(f, "ready"),
            EngineState::LoadFailed(reason) => write!(f, "load failed: {}", reason),
        }
    }
}

/// Status of the thumbnail strip for the current resource
#[derive(Debug, Clone, PartialEq)]
pub enum StripState {
    Empty,
    Sampling,
    Ready(Arc<[Frame]>),
    Failed(FramecutError),
}

impl StripState {
    /// Frames of a finished strip, empty otherwise
    pub fn frames(&self) -> &[Frame] {
        match self {
            StripState::Ready(frames) => frames,
            _ => &[],
        }
    }
}

/// Trim command handed to the transcoding engine
#[derive(Debug, Clone, PartialEq)]
pub struct TrimCommand {
    pub input_name: String,
    pub output_name: String,
    pub start: f64,
    pub duration: f64,
    /// Copy codec streams instead of re-encoding
    pub stream_copy: bool,
}

impl TrimCommand {
    /// ffmpeg-style argument list, with the virtual names resolved to
    /// `input` and `output`
    pub fn to_args(&self, input: &str, output: &str) -> Vec<String> {
        let mut args = vec![
            "-ss".to_string(),
            seconds_arg(self.start),
            "-i".to_string(),
            input.to_string(),
            "-t".to_string(),
            seconds_arg(self.duration),
        ];
        if self.stream_copy {
            args.push("-c".to_string());
            args.push("copy".to_string());
        }
        args.push(output.to_string());
        args
    }
}

/// Full-precision seconds; ffmpeg reads plain decimals down to microseconds
fn seconds_arg(seconds: f64) -> String {
    format!("{}", seconds)
}

/// Guess a MIME type for a container extension (with leading dot)
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.trim_start_matches('.') {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "ts" => "video/mp2t",
        _ => "application/octet-stream",
    }
}
