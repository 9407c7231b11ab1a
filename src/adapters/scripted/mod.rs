// Scripted adapters - Deterministic in-memory collaborators for tests and simulation

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;

use crate::domain::model::*;
use crate::error::{FramecutError, FramecutResult};
use crate::ports::{DecoderEvent, MediaDecoderPort, TranscodePort};

const TIME_EPSILON: f64 = 1e-9;

#[derive(Debug)]
struct PlayheadState {
    loaded: bool,
    duration: f64,
    position: f64,
    paused: bool,
    ended: bool,
}

/// Decoder whose clock only moves when `advance` is called
pub struct ScriptedDecoder {
    next_duration: Mutex<f64>,
    state: Mutex<PlayheadState>,
    events: broadcast::Sender<DecoderEvent>,
    settle_delay: Duration,
    failing_seeks: Mutex<Vec<f64>>,
    seek_log: Mutex<Vec<f64>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    open_calls: AtomicUsize,
}

impl ScriptedDecoder {
    /// Every opened resource reports `duration` seconds
    pub fn new(duration: f64) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            next_duration: Mutex::new(duration),
            state: Mutex::new(PlayheadState {
                loaded: false,
                duration: 0.0,
                position: 0.0,
                paused: true,
                ended: false,
            }),
            events,
            settle_delay: Duration::ZERO,
            failing_seeks: Mutex::new(Vec::new()),
            seek_log: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            open_calls: AtomicUsize::new(0),
        }
    }

    /// Each seek takes `delay` to settle
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Duration reported by the next `open`
    pub fn set_next_duration(&self, duration: f64) {
        if let Ok(mut next) = self.next_duration.lock() {
            *next = duration;
        }
    }

    /// Seeks to `time` fail to settle
    pub fn fail_seek_at(&self, time: f64) {
        if let Ok(mut failing) = self.failing_seeks.lock() {
            failing.push(time);
        }
    }

    /// Settled seek targets, in order
    pub fn seek_log(&self) -> Vec<f64> {
        self.seek_log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Highest number of seeks observed in flight at once
    pub fn max_concurrent_seeks(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    /// Advance the clock by `seconds` if playing, emitting position and
    /// end-of-stream events the way a real decoder would.
    pub fn advance(&self, seconds: f64) {
        let mut events = Vec::new();
        if let Ok(mut state) = self.state.lock() {
            if !state.loaded || state.paused {
                return;
            }
            state.position = (state.position + seconds).min(state.duration);
            events.push(DecoderEvent::TimeUpdate(state.position));
            if state.position >= state.duration {
                state.paused = true;
                state.ended = true;
                events.push(DecoderEvent::Ended);
            }
        }
        for event in events {
            let _ = self.events.send(event);
        }
    }

    /// Advance by `tick` every `tick` of wall-clock time until aborted
    pub fn spawn_clock(self: &Arc<Self>, tick: Duration) -> JoinHandle<()> {
        let decoder = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.tick().await;
            loop {
                interval.tick().await;
                decoder.advance(tick.as_secs_f64());
            }
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&PlayheadState) -> T, default: T) -> T {
        self.state.lock().map(|state| f(&state)).unwrap_or(default)
    }
}

#[async_trait]
impl MediaDecoderPort for ScriptedDecoder {
    async fn open(&self, source: &SourceRef) -> FramecutResult<MediaMetadata> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if source.bytes().is_empty() {
            return Err(FramecutError::media(format!(
                "{} is empty",
                source.name()
            )));
        }
        let duration = self.next_duration.lock().map(|d| *d).unwrap_or(0.0);
        if let Ok(mut state) = self.state.lock() {
            *state = PlayheadState {
                loaded: true,
                duration,
                position: 0.0,
                paused: true,
                ended: false,
            };
        }
        Ok(MediaMetadata {
            duration,
            width: Some(1280),
            height: Some(720),
        })
    }

    fn duration(&self) -> f64 {
        self.with_state(|s| s.duration, 0.0)
    }

    fn current_time(&self) -> f64 {
        self.with_state(|s| s.position, 0.0)
    }

    fn is_paused(&self) -> bool {
        self.with_state(|s| s.paused, true)
    }

    fn is_ended(&self) -> bool {
        self.with_state(|s| s.ended, false)
    }

    async fn seek(&self, time: f64) -> FramecutResult<f64> {
        if !self.with_state(|s| s.loaded, false) {
            return Err(FramecutError::NoResource);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let fails = self
            .failing_seeks
            .lock()
            .map(|failing| failing.iter().any(|t| (t - time).abs() < TIME_EPSILON))
            .unwrap_or(false);
        if fails {
            return Err(FramecutError::Seek {
                time,
                message: "scripted decoder refused to settle".to_string(),
            });
        }

        if let Ok(mut state) = self.state.lock() {
            state.position = time.clamp(0.0, state.duration);
            state.ended = state.duration > 0.0 && state.position >= state.duration;
        }
        if let Ok(mut log) = self.seek_log.lock() {
            log.push(time);
        }
        Ok(time)
    }

    async fn play(&self) -> FramecutResult<()> {
        if let Ok(mut state) = self.state.lock() {
            if !state.loaded {
                return Err(FramecutError::NoResource);
            }
            if state.ended {
                state.position = 0.0;
                state.ended = false;
            }
            state.paused = false;
        }
        Ok(())
    }

    async fn pause(&self) -> FramecutResult<()> {
        if let Ok(mut state) = self.state.lock() {
            state.paused = true;
        }
        Ok(())
    }

    async fn capture_frame(&self, width: u32, height: u32) -> FramecutResult<RgbImage> {
        let (position, duration) = self.with_state(|s| (s.position, s.duration), (0.0, 0.0));
        let shade = if duration > 0.0 {
            ((position / duration).clamp(0.0, 1.0) * 255.0) as u8
        } else {
            0
        };
        Ok(RgbImage::from_pixel(width, height, Rgb([shade, 64, 255 - shade])))
    }

    fn subscribe(&self) -> broadcast::Receiver<DecoderEvent> {
        self.events.subscribe()
    }
}

/// Transcoding engine that "trims" by copying bytes in memory
pub struct ScriptedTranscoder {
    init_delay: Duration,
    init_failure: Option<String>,
    progress: Vec<f64>,
    step_delay: Duration,
    trim_failure: Option<String>,
    hold: Option<Notify>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    commands: Mutex<Vec<TrimCommand>>,
    init_calls: AtomicUsize,
    trim_calls: AtomicUsize,
}

impl ScriptedTranscoder {
    pub fn new() -> Self {
        Self {
            init_delay: Duration::ZERO,
            init_failure: None,
            progress: vec![0.25, 0.5, 0.75, 1.0],
            step_delay: Duration::ZERO,
            trim_failure: None,
            hold: None,
            files: Mutex::new(HashMap::new()),
            commands: Mutex::new(Vec::new()),
            init_calls: AtomicUsize::new(0),
            trim_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    pub fn failing_init(mut self, reason: &str) -> Self {
        self.init_failure = Some(reason.to_string());
        self
    }

    /// Ratios reported during each trim
    pub fn with_progress(mut self, ratios: Vec<f64>) -> Self {
        self.progress = ratios;
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn failing_trim(mut self, reason: &str) -> Self {
        self.trim_failure = Some(reason.to_string());
        self
    }

    /// Trims block after reporting progress until `release` is called
    pub fn held(mut self) -> Self {
        self.hold = Some(Notify::new());
        self
    }

    pub fn release(&self) {
        if let Some(hold) = &self.hold {
            hold.notify_one();
        }
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn trim_calls(&self) -> usize {
        self.trim_calls.load(Ordering::SeqCst)
    }

    /// Commands received, in order
    pub fn commands(&self) -> Vec<TrimCommand> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Names currently present in the virtual file system
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .lock()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl Default for ScriptedTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscodePort for ScriptedTranscoder {
    async fn initialize(&self) -> FramecutResult<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if !self.init_delay.is_zero() {
            tokio::time::sleep(self.init_delay).await;
        }
        match &self.init_failure {
            Some(reason) => Err(FramecutError::EngineLoad {
                message: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> FramecutResult<()> {
        if let Ok(mut files) = self.files.lock() {
            files.insert(name.to_string(), bytes.to_vec());
        }
        Ok(())
    }

    async fn run_trim(
        &self,
        command: &TrimCommand,
        progress: mpsc::UnboundedSender<f64>,
    ) -> FramecutResult<()> {
        self.trim_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command.clone());
        }

        let input = self
            .files
            .lock()
            .ok()
            .and_then(|files| files.get(&command.input_name).cloned())
            .ok_or_else(|| {
                FramecutError::transcode(format!("{}: No such file", command.input_name))
            })?;

        for ratio in &self.progress {
            let _ = progress.send(*ratio);
            if !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }
        }
        if let Some(hold) = &self.hold {
            hold.notified().await;
        }
        if let Some(reason) = &self.trim_failure {
            return Err(FramecutError::transcode(reason.clone()));
        }

        if let Ok(mut files) = self.files.lock() {
            files.insert(command.output_name.clone(), input);
        }
        Ok(())
    }

    async fn read_file(&self, name: &str) -> FramecutResult<Vec<u8>> {
        self.files
            .lock()
            .ok()
            .and_then(|files| files.get(name).cloned())
            .ok_or_else(|| FramecutError::transcode(format!("{}: No such file", name)))
    }

    async fn remove_file(&self, name: &str) -> FramecutResult<()> {
        if let Ok(mut files) = self.files.lock() {
            files.remove(name);
        }
        Ok(())
    }
}
