use std::sync::Arc;

use tokio::task::AbortHandle;
use tracing::info;

use crate::adapters::{
    AppConfig, FfmpegDecoderAdapter, FfmpegTranscodeAdapter, ScriptedDecoder, ScriptedTranscoder,
};
use crate::app::engine_gate::EngineGate;
use crate::app::workspace::PreviewWorkspace;
use crate::error::FramecutResult;
use crate::ports::{MediaDecoderPort, TranscodePort};

/// Duration every resource reports under `--dry-run`
pub const SIMULATED_DURATION: f64 = 10.0;

pub trait AppContainer: Send + Sync {
    fn workspace(&self) -> Arc<PreviewWorkspace>;
    fn gate(&self) -> Arc<EngineGate>;
    fn config(&self) -> &AppConfig;
}

/// Builds the process-wide decoder and engine once and shares them by handle
pub struct DefaultAppContainer {
    config: AppConfig,
    gate: Arc<EngineGate>,
    workspace: Arc<PreviewWorkspace>,
    clock: Option<AbortHandle>,
}

impl DefaultAppContainer {
    /// Wire the ffmpeg-backed adapters, or scripted ones when `simulate` is
    /// set, and start engine initialization. Must be called inside a Tokio
    /// runtime.
    pub fn new(config: AppConfig, simulate: bool) -> FramecutResult<Self> {
        config.validate()?;

        let decoder: Arc<dyn MediaDecoderPort>;
        let engine: Arc<dyn TranscodePort>;
        let mut clock = None;
        if simulate {
            let scripted = Arc::new(ScriptedDecoder::new(SIMULATED_DURATION));
            clock = Some(scripted.spawn_clock(config.playback.tick()).abort_handle());
            decoder = scripted;
            engine = Arc::new(ScriptedTranscoder::new());
        } else {
            decoder = Arc::new(FfmpegDecoderAdapter::new(
                &config.engine.ffmpeg_path,
                &config.engine.ffprobe_path,
                config.playback.tick(),
            ));
            engine = Arc::new(FfmpegTranscodeAdapter::new(&config.engine.ffmpeg_path));
        }

        let gate = Arc::new(EngineGate::new(engine));
        gate.start();

        let workspace = Arc::new(PreviewWorkspace::new(
            decoder,
            Arc::clone(&gate),
            config.sampler.clone(),
            config.trim.clone(),
        ));
        info!(simulate, "Application container ready");

        Ok(Self {
            config,
            gate,
            workspace,
            clock,
        })
    }
}

impl AppContainer for DefaultAppContainer {
    fn workspace(&self) -> Arc<PreviewWorkspace> {
        Arc::clone(&self.workspace)
    }

    fn gate(&self) -> Arc<EngineGate> {
        Arc::clone(&self.gate)
    }

    fn config(&self) -> &AppConfig {
        &self.config
    }
}

impl Drop for DefaultAppContainer {
    fn drop(&mut self) {
        if let Some(clock) = self.clock.take() {
            clock.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::EngineState;

    #[tokio::test]
    async fn test_simulated_container_engine_becomes_ready() {
        let container = DefaultAppContainer::new(AppConfig::default(), true).unwrap();
        assert_eq!(container.gate().wait_settled().await, EngineState::Ready);
        assert_eq!(container.workspace().engine_state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.trim.event_capacity = 0;
        assert!(DefaultAppContainer::new(config, true).is_err());
    }
}
