// Engine readiness gate - One-time initialization of the transcoding engine

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use crate::domain::model::EngineState;
use crate::error::{FramecutError, FramecutResult};
use crate::ports::TranscodePort;

/// Owns the process-wide engine handle and its `EngineState`.
///
/// `Unloaded -> Loading` happens at most once; there is no retry path.
pub struct EngineGate {
    engine: Arc<dyn TranscodePort>,
    state: watch::Sender<EngineState>,
}

impl EngineGate {
    pub fn new(engine: Arc<dyn TranscodePort>) -> Self {
        let (state, _) = watch::channel(EngineState::Unloaded);
        Self { engine, state }
    }

    /// Spawn `initialize` in the background. Must be called inside a Tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let gate = Arc::clone(self);
        tokio::spawn(async move {
            gate.initialize().await;
        });
    }

    /// Initialize the engine if nobody has yet, returning the state reached.
    /// Later calls return the current state without touching the engine.
    pub async fn initialize(&self) -> EngineState {
        let claimed = self.state.send_if_modified(|state| {
            if *state == EngineState::Unloaded {
                *state = EngineState::Loading;
                true
            } else {
                false
            }
        });
        if !claimed {
            return self.state();
        }

        info!("Initializing transcoding engine");
        let next = match self.engine.initialize().await {
            Ok(()) => {
                info!("Transcoding engine ready");
                EngineState::Ready
            }
            Err(e) => {
                error!(error = %e, "Transcoding engine failed to load");
                let reason = match e {
                    FramecutError::EngineLoad { message } => message,
                    other => other.to_string(),
                };
                EngineState::LoadFailed(reason)
            }
        };
        self.state.send_replace(next.clone());
        next
    }

    pub fn state(&self) -> EngineState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == EngineState::Ready
    }

    /// Reject unless the engine is `Ready`
    pub fn ensure_ready(&self) -> FramecutResult<()> {
        match self.state() {
            EngineState::Ready => Ok(()),
            other => Err(FramecutError::EngineNotReady {
                state: other.to_string(),
            }),
        }
    }

    /// Wait until the engine is `Ready` or `LoadFailed`
    pub async fn wait_settled(&self) -> EngineState {
        let mut receiver = self.state.subscribe();
        let settled = match receiver.wait_for(|state| state.is_settled()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        settled
    }

    /// Handle to the engine, lent to the trim controller
    pub fn engine(&self) -> Arc<dyn TranscodePort> {
        Arc::clone(&self.engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::scripted::ScriptedTranscoder;
    use std::time::Duration;

    #[tokio::test]
    async fn test_initialize_reaches_ready_once() {
        let engine = Arc::new(ScriptedTranscoder::new());
        let gate = EngineGate::new(engine.clone());
        assert_eq!(gate.state(), EngineState::Unloaded);
        assert!(gate.ensure_ready().is_err());

        assert_eq!(gate.initialize().await, EngineState::Ready);
        assert_eq!(gate.initialize().await, EngineState::Ready);
        assert_eq!(engine.init_calls(), 1);
        assert!(gate.ensure_ready().is_ok());
    }

    #[tokio::test]
    async fn test_initialize_failure_is_terminal() {
        let engine = Arc::new(ScriptedTranscoder::new().failing_init("wasm core missing"));
        let gate = EngineGate::new(engine.clone());

        let state = gate.initialize().await;
        assert_eq!(state, EngineState::LoadFailed("wasm core missing".to_string()));

        // No retry
        gate.initialize().await;
        assert_eq!(engine.init_calls(), 1);
        assert!(matches!(
            gate.ensure_ready(),
            Err(FramecutError::EngineNotReady { .. })
        ));
    }

    #[tokio::test]
    async fn test_start_reports_loading_then_settles() {
        let engine = Arc::new(ScriptedTranscoder::new().with_init_delay(Duration::from_millis(20)));
        let gate = Arc::new(EngineGate::new(engine));

        gate.start();
        tokio::task::yield_now().await;
        assert_eq!(gate.state(), EngineState::Loading);

        assert_eq!(gate.wait_settled().await, EngineState::Ready);
    }
}
