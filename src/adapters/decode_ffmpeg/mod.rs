//! FFmpeg decoder adapter
//!
//! Backs the playhead with ffprobe for metadata and single-frame ffmpeg
//! decodes for the displayed picture. Playback is a wall-clock timer task.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Deserialize;
use tempfile::TempDir;
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::domain::model::*;
use crate::error::{FramecutError, FramecutResult};
use crate::ports::{DecoderEvent, MediaDecoderPort};

/// The last decodable frame sits slightly before the reported duration
const END_DECODE_MARGIN: f64 = 0.05;
const TIME_EPSILON: f64 = 1e-3;
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output
pub fn parse_probe_output(json: &[u8]) -> FramecutResult<MediaMetadata> {
    let probe: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| FramecutError::media(format!("unreadable ffprobe output: {}", e)))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| FramecutError::media("no video stream found"))?;

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| FramecutError::media("duration is unknown"))?;

    Ok(MediaMetadata {
        duration,
        width: video.width,
        height: video.height,
    })
}

#[derive(Default)]
struct Playhead {
    path: Option<PathBuf>,
    duration: f64,
    width: u32,
    height: u32,
    position: f64,
    paused: bool,
    ended: bool,
    /// Decoded picture and the time it shows
    picture: Option<(f64, RgbImage)>,
}

/// Decoder that shells out to ffprobe and ffmpeg
pub struct FfmpegDecoderAdapter {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    tick: Duration,
    workdir: Mutex<Option<TempDir>>,
    playhead: Arc<Mutex<Playhead>>,
    events: broadcast::Sender<DecoderEvent>,
    clock: Mutex<Option<AbortHandle>>,
}

impl FfmpegDecoderAdapter {
    pub fn new(
        ffmpeg_path: impl Into<PathBuf>,
        ffprobe_path: impl Into<PathBuf>,
        tick: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            tick: tick.max(Duration::from_millis(1)),
            workdir: Mutex::new(None),
            playhead: Arc::new(Mutex::new(Playhead {
                paused: true,
                ..Playhead::default()
            })),
            events,
            clock: Mutex::new(None),
        }
    }

    /// Copy the source bytes into a fresh private directory
    async fn stage_source(&self, source: &SourceRef) -> FramecutResult<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix("framecut-decoder-")
            .tempdir()?;
        let path = dir.path().join(format!("source{}", source.extension()));
        tokio::fs::write(&path, source.bytes()).await?;

        let mut workdir = self
            .workdir
            .lock()
            .map_err(|_| FramecutError::media("decoder work directory lock poisoned"))?;
        // Dropping the previous directory deletes the previous resource
        *workdir = Some(dir);
        Ok(path)
    }

    async fn probe(&self, path: &Path) -> FramecutResult<MediaMetadata> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                FramecutError::media(format!(
                    "cannot run {}: {}",
                    self.ffprobe_path.display(),
                    e
                ))
            })?;
        if !output.status.success() {
            return Err(FramecutError::media(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_probe_output(&output.stdout)
    }

    /// Decode the frame shown at `time` as a native-size RGB bitmap
    async fn decode_picture(
        &self,
        path: &Path,
        time: f64,
        width: u32,
        height: u32,
    ) -> FramecutResult<RgbImage> {
        let output = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-nostdin", "-v", "error", "-ss"])
            .arg(format!("{:.3}", time))
            .arg("-i")
            .arg(path)
            .args(["-frames:v", "1", "-vf"])
            .arg(format!("scale={}:{}", width, height))
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FramecutError::Seek {
                time,
                message: format!("cannot run {}: {}", self.ffmpeg_path.display(), e),
            })?;
        if !output.status.success() {
            return Err(FramecutError::Seek {
                time,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let expected = width as usize * height as usize * 3;
        let mut raw = output.stdout;
        if raw.len() < expected {
            return Err(FramecutError::Seek {
                time,
                message: format!("decoded {} bytes, expected {}", raw.len(), expected),
            });
        }
        raw.truncate(expected);
        RgbImage::from_raw(width, height, raw).ok_or_else(|| FramecutError::Seek {
            time,
            message: "decoded frame has the wrong size".to_string(),
        })
    }

    /// Decode the picture for `time`, clamped into the decodable range
    async fn settle_picture(&self, time: f64) -> FramecutResult<RgbImage> {
        let (path, duration, width, height) = {
            let playhead = self
                .playhead
                .lock()
                .map_err(|_| FramecutError::media("playhead lock poisoned"))?;
            let path = playhead.path.clone().ok_or(FramecutError::NoResource)?;
            (path, playhead.duration, playhead.width, playhead.height)
        };
        let decode_at = time.min(duration - END_DECODE_MARGIN).max(0.0);
        self.decode_picture(&path, decode_at, width, height).await
    }

    fn stop_clock(&self) {
        if let Ok(mut clock) = self.clock.lock() {
            if let Some(task) = clock.take() {
                task.abort();
            }
        }
    }

    fn start_clock(&self) {
        let playhead = Arc::clone(&self.playhead);
        let events = self.events.clone();
        let tick = self.tick;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = Instant::now();
            loop {
                interval.tick().await;
                let now = Instant::now();
                let elapsed = now.duration_since(last).as_secs_f64();
                last = now;

                let mut emitted = Vec::with_capacity(2);
                let finished = match playhead.lock() {
                    Ok(mut state) => {
                        if state.paused {
                            break;
                        }
                        state.position = (state.position + elapsed).min(state.duration);
                        emitted.push(DecoderEvent::TimeUpdate(state.position));
                        if state.position >= state.duration {
                            state.paused = true;
                            state.ended = true;
                            emitted.push(DecoderEvent::Ended);
                            true
                        } else {
                            false
                        }
                    }
                    Err(_) => break,
                };
                for event in emitted {
                    let _ = events.send(event);
                }
                if finished {
                    debug!("Playback reached the end");
                    break;
                }
            }
        });

        if let Ok(mut clock) = self.clock.lock() {
            if let Some(previous) = clock.replace(task.abort_handle()) {
                previous.abort();
            }
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Playhead) -> T, default: T) -> T {
        self.playhead.lock().map(|p| f(&p)).unwrap_or(default)
    }
}

#[async_trait]
impl MediaDecoderPort for FfmpegDecoderAdapter {
    async fn open(&self, source: &SourceRef) -> FramecutResult<MediaMetadata> {
        self.stop_clock();
        if source.bytes().is_empty() {
            return Err(FramecutError::media(format!("{} is empty", source.name())));
        }

        let path = self.stage_source(source).await?;
        let metadata = self.probe(&path).await?;
        let (width, height) = match (metadata.width, metadata.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(FramecutError::media("video stream has no dimensions")),
        };

        {
            let mut playhead = self
                .playhead
                .lock()
                .map_err(|_| FramecutError::media("playhead lock poisoned"))?;
            *playhead = Playhead {
                path: Some(path),
                duration: metadata.duration,
                width,
                height,
                position: 0.0,
                paused: true,
                ended: false,
                picture: None,
            };
        }
        info!(
            source = source.name(),
            duration = metadata.duration,
            width,
            height,
            "Opened media resource"
        );

        match self.settle_picture(0.0).await {
            Ok(picture) => {
                if let Ok(mut playhead) = self.playhead.lock() {
                    playhead.picture = Some((0.0, picture));
                }
            }
            Err(e) => warn!(error = %e, "First frame could not be decoded"),
        }
        Ok(metadata)
    }

    fn duration(&self) -> f64 {
        self.read(|p| p.duration, 0.0)
    }

    fn current_time(&self) -> f64 {
        self.read(|p| p.position, 0.0)
    }

    fn is_paused(&self) -> bool {
        self.read(|p| p.paused, true)
    }

    fn is_ended(&self) -> bool {
        self.read(|p| p.ended, false)
    }

    async fn seek(&self, time: f64) -> FramecutResult<f64> {
        if !time.is_finite() {
            return Err(FramecutError::Seek {
                time,
                message: "time is not finite".to_string(),
            });
        }
        let duration = self.duration();
        if self.read(|p| p.path.is_none(), true) {
            return Err(FramecutError::NoResource);
        }
        let target = time.clamp(0.0, duration);
        let picture = self.settle_picture(target).await?;

        let mut playhead = self
            .playhead
            .lock()
            .map_err(|_| FramecutError::media("playhead lock poisoned"))?;
        playhead.position = target;
        playhead.ended = duration > 0.0 && target >= duration;
        playhead.picture = Some((target, picture));
        debug!(target, "Seek settled");
        Ok(target)
    }

    async fn play(&self) -> FramecutResult<()> {
        {
            let mut playhead = self
                .playhead
                .lock()
                .map_err(|_| FramecutError::media("playhead lock poisoned"))?;
            if playhead.path.is_none() {
                return Err(FramecutError::NoResource);
            }
            if playhead.ended {
                playhead.position = 0.0;
                playhead.ended = false;
            }
            playhead.paused = false;
        }
        self.start_clock();
        Ok(())
    }

    async fn pause(&self) -> FramecutResult<()> {
        self.stop_clock();
        if let Ok(mut playhead) = self.playhead.lock() {
            playhead.paused = true;
        }
        Ok(())
    }

    async fn capture_frame(&self, width: u32, height: u32) -> FramecutResult<RgbImage> {
        let position = self.current_time();
        let cached = self.read(
            |p| match &p.picture {
                Some((time, picture)) if (time - position).abs() < TIME_EPSILON => {
                    Some(picture.clone())
                }
                _ => None,
            },
            None,
        );
        let picture = match cached {
            Some(picture) => picture,
            None => self.settle_picture(position).await?,
        };
        Ok(imageops::resize(&picture, width, height, FilterType::Triangle))
    }

    fn subscribe(&self) -> broadcast::Receiver<DecoderEvent> {
        self.events.subscribe()
    }
}

impl Drop for FfmpegDecoderAdapter {
    fn drop(&mut self) {
        self.stop_clock();
    }
}
