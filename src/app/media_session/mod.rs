// Media session - Serializes every decoder-driving operation through one mailbox

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use image::RgbImage;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::app::subscribers::{Subscribers, Subscription};
use crate::domain::model::{MediaMetadata, SourceRef};
use crate::error::{FramecutError, FramecutResult};
use crate::ports::{DecoderEvent, MediaDecoderPort};

/// Pending commands beyond this block the caller until the driver catches up
const MAILBOX_CAPACITY: usize = 32;

type Reply<T> = oneshot::Sender<FramecutResult<T>>;

enum SessionCommand {
    Load {
        source: SourceRef,
        generation: u64,
        reply: Reply<MediaMetadata>,
    },
    Seek {
        time: f64,
        generation: u64,
        reply: Reply<f64>,
    },
    SeekAndCapture {
        time: f64,
        generation: u64,
        width: u32,
        height: u32,
        reply: Reply<RgbImage>,
    },
    Play {
        generation: u64,
        reply: Reply<()>,
    },
    Pause {
        generation: u64,
        reply: Reply<()>,
    },
    BeginSampling {
        generation: u64,
        reply: Reply<()>,
    },
    EndSampling {
        generation: u64,
        reply: Reply<()>,
    },
}

/// What the user sees while a sampling run borrows the decoder
#[derive(Debug, Clone, Copy, PartialEq)]
struct Playhead {
    time: f64,
    playing: bool,
    ended: bool,
}

type SharedPlayhead = Arc<Mutex<Option<Playhead>>>;

/// Single shared playback resource.
///
/// Loads, seeks, captures and play/pause requests are queued and executed
/// one at a time by a driver task, so concurrent callers (sampler, user
/// clicks, playback controls) never overlap on the decoder's playhead.
/// Every load bumps the generation; queued work from an older generation is
/// rejected with `Cancelled`.
///
/// Between `begin_sampling` and `end_sampling` the user-visible playhead is
/// frozen: position queries report the saved position, play and pause only
/// update the saved intent, and the saved state is restored on the decoder
/// when the run ends.
pub struct MediaSession {
    decoder: Arc<dyn MediaDecoderPort>,
    commands: mpsc::Sender<SessionCommand>,
    generation: Arc<AtomicU64>,
    sampling: SharedPlayhead,
    metadata: Mutex<Option<MediaMetadata>>,
    source: Mutex<Option<SourceRef>>,
    position_subs: Subscribers<f64>,
    ended_subs: Subscribers<()>,
}

impl MediaSession {
    /// Create a session and spawn its driver. Must be called inside a Tokio runtime.
    pub fn new(decoder: Arc<dyn MediaDecoderPort>) -> Self {
        let (commands, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        let generation = Arc::new(AtomicU64::new(0));
        let sampling: SharedPlayhead = Arc::new(Mutex::new(None));
        let position_subs = Subscribers::new();
        let ended_subs = Subscribers::new();

        let driver = SessionDriver {
            events: decoder.subscribe(),
            decoder: Arc::clone(&decoder),
            generation: Arc::clone(&generation),
            sampling: Arc::clone(&sampling),
            position_subs: position_subs.clone(),
            ended_subs: ended_subs.clone(),
            ended_fired: false,
            events_open: true,
        };
        tokio::spawn(driver.run(mailbox));

        Self {
            decoder,
            commands,
            generation,
            sampling,
            metadata: Mutex::new(None),
            source: Mutex::new(None),
            position_subs,
            ended_subs,
        }
    }

    /// Replace the current resource. Position resets to 0; work queued for
    /// the previous resource is fenced off.
    pub async fn load(&self, source: SourceRef) -> FramecutResult<MediaMetadata> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut metadata) = self.metadata.lock() {
            *metadata = None;
        }
        if let Ok(mut current) = self.source.lock() {
            *current = Some(source.clone());
        }
        if let Ok(mut saved) = self.sampling.lock() {
            *saved = None;
        }
        info!(name = source.name(), generation, "Loading media resource");

        let metadata = self
            .request(|reply| SessionCommand::Load {
                source,
                generation,
                reply,
            })
            .await?;

        if self.generation() != generation {
            return Err(FramecutError::Cancelled);
        }
        if let Ok(mut current) = self.metadata.lock() {
            *current = Some(metadata.clone());
        }
        info!(duration = metadata.duration, generation, "Media metadata ready");
        Ok(metadata)
    }

    /// Seek and resolve once the decoder has settled. Returns the settled time.
    pub async fn seek(&self, time: f64) -> FramecutResult<f64> {
        let time = self.clamp_seek_time(time)?;
        let generation = self.generation();
        self.request(|reply| SessionCommand::Seek {
            time,
            generation,
            reply,
        })
        .await
    }

    /// Seek, settle and capture the displayed frame as one queued operation.
    /// Fails with `Cancelled` if `generation` is no longer current.
    pub async fn seek_and_capture(
        &self,
        time: f64,
        width: u32,
        height: u32,
        generation: u64,
    ) -> FramecutResult<RgbImage> {
        let time = self.clamp_seek_time(time)?;
        self.request(|reply| SessionCommand::SeekAndCapture {
            time,
            generation,
            width,
            height,
            reply,
        })
        .await
    }

    pub async fn play(&self) -> FramecutResult<()> {
        self.require_loaded()?;
        let generation = self.generation();
        self.request(|reply| SessionCommand::Play { generation, reply })
            .await
    }

    pub async fn pause(&self) -> FramecutResult<()> {
        self.require_loaded()?;
        let generation = self.generation();
        self.request(|reply| SessionCommand::Pause { generation, reply })
            .await
    }

    /// Suspend the user-visible playhead so a sampling run can drive the
    /// decoder. Fails with `Cancelled` if `generation` is no longer current.
    pub async fn begin_sampling(&self, generation: u64) -> FramecutResult<()> {
        self.require_loaded()?;
        self.request(|reply| SessionCommand::BeginSampling { generation, reply })
            .await
    }

    /// Put the playhead back where the user left it, resuming playback if
    /// it was playing or play was requested during the run
    pub async fn end_sampling(&self, generation: u64) -> FramecutResult<()> {
        self.request(|reply| SessionCommand::EndSampling { generation, reply })
            .await
    }

    pub fn is_sampling(&self) -> bool {
        self.saved_playhead().is_some()
    }

    /// Live position, read from the decoder on every call
    pub fn current_time(&self) -> f64 {
        if self.metadata().is_none() {
            return 0.0;
        }
        match self.saved_playhead() {
            Some(playhead) => playhead.time,
            None => self.decoder.current_time(),
        }
    }

    /// Duration of the ready resource, 0 before metadata is known
    pub fn duration(&self) -> f64 {
        self.metadata().map(|m| m.duration).unwrap_or(0.0)
    }

    pub fn metadata(&self) -> Option<MediaMetadata> {
        self.metadata.lock().ok().and_then(|m| m.clone())
    }

    pub fn source(&self) -> Option<SourceRef> {
        self.source.lock().ok().and_then(|s| s.clone())
    }

    pub fn is_paused(&self) -> bool {
        match self.saved_playhead() {
            Some(playhead) => !playhead.playing,
            None => self.decoder.is_paused(),
        }
    }

    pub fn is_ended(&self) -> bool {
        match self.saved_playhead() {
            Some(playhead) => playhead.ended,
            None => self.decoder.is_ended(),
        }
    }

    /// Counter bumped by every load
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Called with the new position while the resource is advancing
    pub fn subscribe_position<F>(&self, callback: F) -> Subscription
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.position_subs.subscribe(callback)
    }

    /// Called once each time playback reaches the end
    pub fn subscribe_ended<F>(&self, callback: F) -> Subscription
    where
        F: Fn(()) + Send + Sync + 'static,
    {
        self.ended_subs.subscribe(callback)
    }

    fn saved_playhead(&self) -> Option<Playhead> {
        self.sampling.lock().ok().and_then(|p| *p)
    }

    fn require_loaded(&self) -> FramecutResult<MediaMetadata> {
        self.metadata().ok_or(FramecutError::NoResource)
    }

    fn clamp_seek_time(&self, time: f64) -> FramecutResult<f64> {
        let metadata = self.require_loaded()?;
        if !time.is_finite() {
            return Err(FramecutError::Seek {
                time,
                message: "seek time must be finite".to_string(),
            });
        }
        Ok(time.clamp(0.0, metadata.duration.max(0.0)))
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> FramecutResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| FramecutError::media("media session driver has stopped"))?;
        response
            .await
            .map_err(|_| FramecutError::media("media session driver dropped the request"))?
    }
}

/// Owns the decoder event stream and executes queued commands in order
struct SessionDriver {
    decoder: Arc<dyn MediaDecoderPort>,
    events: broadcast::Receiver<DecoderEvent>,
    generation: Arc<AtomicU64>,
    sampling: SharedPlayhead,
    position_subs: Subscribers<f64>,
    ended_subs: Subscribers<()>,
    ended_fired: bool,
    events_open: bool,
}

impl SessionDriver {
    async fn run(mut self, mut mailbox: mpsc::Receiver<SessionCommand>) {
        loop {
            tokio::select! {
                command = mailbox.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                event = self.events.recv(), if self.events_open => self.dispatch(event),
            }
        }
        debug!("Media session driver stopped");
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Load {
                source,
                generation,
                reply,
            } => {
                let result = if self.is_stale(generation) {
                    Err(FramecutError::Cancelled)
                } else {
                    self.ended_fired = false;
                    self.set_saved(None);
                    let result = self.decoder.open(&source).await;
                    self.drain_events();
                    result
                };
                let _ = reply.send(result);
            }
            SessionCommand::Seek {
                time,
                generation,
                reply,
            } => {
                let result = if self.is_stale(generation) {
                    Err(FramecutError::Cancelled)
                } else {
                    let result = self.settle(time).await;
                    if let Ok(settled) = result {
                        let ended = self.decoder.is_ended();
                        self.update_saved(|p| {
                            p.time = settled;
                            p.ended = ended;
                        });
                    }
                    result
                };
                let _ = reply.send(result);
            }
            SessionCommand::SeekAndCapture {
                time,
                generation,
                width,
                height,
                reply,
            } => {
                let result = if self.is_stale(generation) {
                    Err(FramecutError::Cancelled)
                } else {
                    match self.settle(time).await {
                        Ok(_) => self.decoder.capture_frame(width, height).await,
                        Err(e) => Err(e),
                    }
                };
                let _ = reply.send(result);
            }
            SessionCommand::Play { generation, reply } => {
                let result = if self.is_stale(generation) {
                    Err(FramecutError::Cancelled)
                } else if self.update_saved(|p| {
                    // Playing from the end starts over, as the decoder would
                    if p.ended {
                        p.time = 0.0;
                        p.ended = false;
                    }
                    p.playing = true;
                }) {
                    debug!("Play deferred until sampling finishes");
                    Ok(())
                } else {
                    self.decoder.play().await
                };
                let _ = reply.send(result);
            }
            SessionCommand::Pause { generation, reply } => {
                let result = if self.is_stale(generation) {
                    Err(FramecutError::Cancelled)
                } else if self.update_saved(|p| p.playing = false) {
                    Ok(())
                } else {
                    self.decoder.pause().await
                };
                let _ = reply.send(result);
            }
            SessionCommand::BeginSampling { generation, reply } => {
                let result = if self.is_stale(generation) {
                    Err(FramecutError::Cancelled)
                } else {
                    self.begin_sampling().await
                };
                let _ = reply.send(result);
            }
            SessionCommand::EndSampling { generation, reply } => {
                let result = if self.is_stale(generation) {
                    Err(FramecutError::Cancelled)
                } else {
                    self.end_sampling().await
                };
                let _ = reply.send(result);
            }
        }
    }

    async fn begin_sampling(&mut self) -> FramecutResult<()> {
        if self.saved().is_some() {
            return Err(FramecutError::invalid("a sampling run is already active"));
        }
        let playing = !self.decoder.is_paused();
        if playing {
            self.decoder.pause().await?;
        }
        let playhead = Playhead {
            time: self.decoder.current_time(),
            playing,
            ended: self.decoder.is_ended(),
        };
        debug!(time = playhead.time, playing, "Playhead saved for sampling");
        self.set_saved(Some(playhead));
        self.drain_events();
        Ok(())
    }

    async fn end_sampling(&mut self) -> FramecutResult<()> {
        let Some(playhead) = self.saved() else {
            return Ok(());
        };
        self.set_saved(None);

        let result = if (self.decoder.current_time() - playhead.time).abs() > f64::EPSILON
            || self.decoder.is_ended() != playhead.ended
        {
            self.settle(playhead.time).await.map(|_| ())
        } else {
            Ok(())
        };
        if playhead.playing {
            self.decoder.play().await?;
        }
        debug!(time = playhead.time, playing = playhead.playing, "Playhead restored");
        result
    }

    fn saved(&self) -> Option<Playhead> {
        self.sampling.lock().ok().and_then(|p| *p)
    }

    fn set_saved(&self, playhead: Option<Playhead>) {
        if let Ok(mut saved) = self.sampling.lock() {
            *saved = playhead;
        }
    }

    /// Apply `change` to the saved playhead; false when no run is active
    fn update_saved(&self, change: impl FnOnce(&mut Playhead)) -> bool {
        match self.sampling.lock() {
            Ok(mut saved) => match saved.as_mut() {
                Some(playhead) => {
                    change(playhead);
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Seek with advancement suspended for the duration of the settle
    async fn settle(&mut self, time: f64) -> FramecutResult<f64> {
        let resume = !self.decoder.is_paused();
        if resume {
            self.decoder.pause().await?;
        }

        debug!(time, "Seeking");
        let result = self.decoder.seek(time).await;
        // Position events queued before the settle describe the old playhead
        self.drain_events();

        if result.is_ok() && !self.decoder.is_ended() {
            self.ended_fired = false;
        }
        if resume && !self.decoder.is_ended() {
            if let Err(e) = self.decoder.play().await {
                warn!(error = %e, "Failed to resume playback after seek");
            }
        }

        result.map_err(|e| match e {
            FramecutError::Seek { .. } | FramecutError::Cancelled => e,
            other => FramecutError::Seek {
                time,
                message: other.to_string(),
            },
        })
    }

    fn dispatch(&mut self, event: Result<DecoderEvent, RecvError>) {
        match event {
            Ok(DecoderEvent::TimeUpdate(time)) => self.position_subs.emit(time),
            Ok(DecoderEvent::Ended) => {
                if !self.ended_fired {
                    self.ended_fired = true;
                    info!("Playback reached the end");
                    self.ended_subs.emit(());
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Position listener lagged behind decoder");
            }
            Err(RecvError::Closed) => {
                self.events_open = false;
            }
        }
    }

    fn drain_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Closed) => {
                    self.events_open = false;
                    break;
                }
            }
        }
    }

    fn is_stale(&self, generation: u64) -> bool {
        generation != self.generation.load(Ordering::SeqCst)
    }
}
