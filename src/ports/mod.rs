// Ports - Interface definitions (contracts) for external collaborators

use async_trait::async_trait;
use image::RgbImage;
use tokio::sync::{broadcast, mpsc};

use crate::domain::model::*;
use crate::error::FramecutResult;

/// Notifications emitted by a media decoder
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    /// Position advanced while playing (seconds)
    TimeUpdate(f64),
    /// Playback reached the end of the resource
    Ended,
}

/// Port for the media decode/render resource.
///
/// A decoder holds one resource and one playhead. Callers serialize access
/// through `MediaSession`; implementations need not guard against
/// overlapping seeks themselves.
#[async_trait]
pub trait MediaDecoderPort: Send + Sync {
    /// Replace the current resource, reset position to 0 and pause.
    /// Resolves once metadata (duration) is known.
    async fn open(&self, source: &SourceRef) -> FramecutResult<MediaMetadata>;

    /// Duration of the loaded resource in seconds (0 when nothing is loaded)
    fn duration(&self) -> f64;

    /// Live playback position in seconds
    fn current_time(&self) -> f64;

    fn is_paused(&self) -> bool;

    fn is_ended(&self) -> bool;

    /// Move the playhead and resolve once the displayed content corresponds
    /// to the new position. Returns the settled time.
    async fn seek(&self, time: f64) -> FramecutResult<f64>;

    /// Start advancing the playhead
    async fn play(&self) -> FramecutResult<()>;

    /// Stop advancing the playhead
    async fn pause(&self) -> FramecutResult<()>;

    /// Render the currently displayed frame into a `width` x `height` bitmap
    async fn capture_frame(&self, width: u32, height: u32) -> FramecutResult<RgbImage>;

    /// Subscribe to position and end-of-stream notifications
    fn subscribe(&self) -> broadcast::Receiver<DecoderEvent>;
}

/// Port for the external transcoding engine.
///
/// The engine works on its own virtual file system: sources are written in
/// by name, commands reference names, results are read back by name.
#[async_trait]
pub trait TranscodePort: Send + Sync {
    /// One-time asynchronous initialization
    async fn initialize(&self) -> FramecutResult<()>;

    /// Write a file into the engine's virtual file system
    async fn write_file(&self, name: &str, bytes: &[u8]) -> FramecutResult<()>;

    /// Run a trim command, reporting progress ratios on `progress`
    async fn run_trim(
        &self,
        command: &TrimCommand,
        progress: mpsc::UnboundedSender<f64>,
    ) -> FramecutResult<()>;

    /// Read a file back from the engine's virtual file system
    async fn read_file(&self, name: &str) -> FramecutResult<Vec<u8>>;

    /// Remove a file from the engine's virtual file system
    async fn remove_file(&self, name: &str) -> FramecutResult<()>;
}
