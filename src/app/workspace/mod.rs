// Preview workspace - What the user-facing surface talks to

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{info, warn};

use crate::app::engine_gate::EngineGate;
use crate::app::frame_sampler::{FrameSampler, SamplerConfig};
use crate::app::media_session::MediaSession;
use crate::app::subscribers::Subscription;
use crate::app::trim_job::{TrimConfig, TrimJob, TrimJobController};
use crate::domain::model::*;
use crate::domain::timeline::{frame_click_to_seek_time, position_to_offset};
use crate::error::{FramecutError, FramecutResult};
use crate::ports::MediaDecoderPort;

/// Ties the media session, frame strip and trim controller together.
///
/// Loading a resource cancels any running trim, clears the strip and, once
/// metadata is ready, samples the strip exactly once in the background.
pub struct PreviewWorkspace {
    session: Arc<MediaSession>,
    sampler: Arc<FrameSampler>,
    gate: Arc<EngineGate>,
    trimmer: TrimJobController,
    strip: Arc<watch::Sender<StripState>>,
    sampling: Mutex<Option<AbortHandle>>,
}

impl PreviewWorkspace {
    /// Must be called inside a Tokio runtime
    pub fn new(
        decoder: Arc<dyn MediaDecoderPort>,
        gate: Arc<EngineGate>,
        sampler_config: SamplerConfig,
        trim_config: TrimConfig,
    ) -> Self {
        let (strip, _) = watch::channel(StripState::Empty);
        Self {
            session: Arc::new(MediaSession::new(decoder)),
            sampler: Arc::new(FrameSampler::new(sampler_config)),
            trimmer: TrimJobController::new(Arc::clone(&gate), trim_config),
            gate,
            strip: Arc::new(strip),
            sampling: Mutex::new(None),
        }
    }

    /// Replace the current resource and start sampling its strip
    pub async fn load(&self, source: SourceRef) -> FramecutResult<MediaMetadata> {
        if self.trimmer.cancel() {
            info!("Cancelled running trim job for the previous resource");
        }
        let _ = self.trimmer.reset();
        self.abort_sampling();
        self.strip.send_replace(StripState::Empty);

        let metadata = match self.session.load(source).await {
            Ok(metadata) => metadata,
            Err(e) => {
                self.strip.send_replace(StripState::Empty);
                return Err(e);
            }
        };

        self.strip.send_replace(StripState::Sampling);
        let generation = self.session.generation();
        let session = Arc::clone(&self.session);
        let sampler = Arc::clone(&self.sampler);
        let strip = Arc::clone(&self.strip);
        let count = sampler.config().frame_count;

        let task = tokio::spawn(async move {
            let result = sampler.sample(&session, count).await;
            strip.send_if_modified(|state| {
                if session.generation() != generation {
                    warn!(generation, "Discarding frame strip of a replaced resource");
                    return false;
                }
                *state = match result {
                    Ok(frames) => StripState::Ready(frames.into()),
                    Err(e) => {
                        warn!(error = %e, "Frame strip unavailable");
                        StripState::Failed(e)
                    }
                };
                true
            });
        });
        if let Ok(mut sampling) = self.sampling.lock() {
            *sampling = Some(task.abort_handle());
        }

        Ok(metadata)
    }

    pub fn strip_state(&self) -> StripState {
        self.strip.borrow().clone()
    }

    /// Frames of the current strip; empty while sampling or after a failure
    pub fn frames(&self) -> Vec<Frame> {
        self.strip.borrow().frames().to_vec()
    }

    pub fn subscribe_strip(&self) -> watch::Receiver<StripState> {
        self.strip.subscribe()
    }

    /// Wait until the strip has left `Sampling`
    pub async fn wait_for_strip(&self) -> StripState {
        let mut receiver = self.strip.subscribe();
        let settled = match receiver
            .wait_for(|state| !matches!(state, StripState::Sampling))
            .await
        {
            Ok(state) => state.clone(),
            Err(_) => self.strip_state(),
        };
        settled
    }

    /// Seek to an arbitrary time
    pub async fn seek(&self, time: f64) -> FramecutResult<f64> {
        self.session.seek(time).await
    }

    /// Seek to the time of the clicked frame
    pub async fn click_frame(&self, index: usize) -> FramecutResult<f64> {
        let time = {
            let strip = self.strip.borrow();
            let frame = strip.frames().get(index).ok_or_else(|| {
                FramecutError::invalid(format!("no frame at index {}", index))
            })?;
            frame_click_to_seek_time(frame)
        };
        self.session.seek(time).await
    }

    /// Cursor offset for the live position, recomputed on every call
    pub fn cursor_offset(&self, track_width_px: f64) -> f64 {
        position_to_offset(
            self.session.current_time(),
            self.session.duration(),
            track_width_px,
        )
    }

    pub async fn play(&self) -> FramecutResult<()> {
        self.session.play().await
    }

    pub async fn pause(&self) -> FramecutResult<()> {
        self.session.pause().await
    }

    pub fn subscribe_position<F>(&self, callback: F) -> Subscription
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.session.subscribe_position(callback)
    }

    pub fn subscribe_ended<F>(&self, callback: F) -> Subscription
    where
        F: Fn(()) + Send + Sync + 'static,
    {
        self.session.subscribe_ended(callback)
    }

    /// Trim the loaded resource
    pub fn submit_trim(&self, request: TrimRequest) -> FramecutResult<TrimJob> {
        let source = self.session.source().ok_or(FramecutError::NoResource)?;
        let metadata = self.session.metadata().ok_or(FramecutError::NoResource)?;
        self.trimmer
            .submit(&source, request, Some(metadata.duration))
    }

    pub fn cancel_trim(&self) -> bool {
        self.trimmer.cancel()
    }

    pub fn reset_trim(&self) -> FramecutResult<()> {
        self.trimmer.reset()
    }

    pub fn processing_state(&self) -> ProcessingState {
        self.trimmer.state()
    }

    pub fn subscribe_processing(&self) -> watch::Receiver<ProcessingState> {
        self.trimmer.subscribe()
    }

    pub fn engine_state(&self) -> EngineState {
        self.gate.state()
    }

    pub fn gate(&self) -> &Arc<EngineGate> {
        &self.gate
    }

    pub fn session(&self) -> &MediaSession {
        &self.session
    }

    fn abort_sampling(&self) {
        if let Ok(mut sampling) = self.sampling.lock() {
            if let Some(task) = sampling.take() {
                task.abort();
            }
        }
    }
}

impl Drop for PreviewWorkspace {
    fn drop(&mut self) {
        self.abort_sampling();
    }
}
