// Trim job controller - Single-flight state machine around the transcoding engine

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::app::engine_gate::EngineGate;
use crate::domain::model::*;
use crate::error::{FramecutError, FramecutResult};
use crate::utils::time::format_for_filename;

/// Trim controller settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    /// Capacity of each job's event stream
    pub event_capacity: usize,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self { event_capacity: 64 }
    }
}

impl TrimConfig {
    pub fn validate(&self) -> FramecutResult<()> {
        if self.event_capacity < 2 {
            return Err(FramecutError::Config {
                message: "trim.event_capacity must be at least 2".to_string(),
            });
        }
        Ok(())
    }
}

struct ActiveJob {
    id: u64,
    abort: AbortHandle,
    events: mpsc::Sender<ProcessingState>,
    input_name: String,
    output_name: String,
}

struct ControllerInner {
    gate: Arc<EngineGate>,
    state: watch::Sender<ProcessingState>,
    active: Mutex<Option<ActiveJob>>,
    next_job_id: AtomicU64,
    event_capacity: usize,
}

/// Accepts one trim at a time and publishes its `ProcessingState`.
///
/// `submit` fails fast with `JobBusy` unless the controller is `Idle`;
/// terminal states are acknowledged with `reset`. Every state transition
/// happens under the `active` lock, and results from a job that is no longer
/// active are dropped.
pub struct TrimJobController {
    inner: Arc<ControllerInner>,
}

impl TrimJobController {
    pub fn new(gate: Arc<EngineGate>, config: TrimConfig) -> Self {
        let (state, _) = watch::channel(ProcessingState::Idle);
        Self {
            inner: Arc::new(ControllerInner {
                gate,
                state,
                active: Mutex::new(None),
                next_job_id: AtomicU64::new(1),
                event_capacity: config.event_capacity.max(2),
            }),
        }
    }

    /// Submit a trim of `source`. The request is snapshotted by value.
    ///
    /// Rejected before the engine is touched when the engine is not ready,
    /// the request is out of range, or another job holds the controller.
    pub fn submit(
        &self,
        source: &SourceRef,
        request: TrimRequest,
        source_duration: Option<f64>,
    ) -> FramecutResult<TrimJob> {
        self.inner.gate.ensure_ready()?;
        match source_duration {
            Some(duration) => request.validate_against(duration)?,
            None => request.validate()?,
        }

        let mut active = self.inner.lock_active()?;
        if *self.inner.state.borrow() != ProcessingState::Idle {
            return Err(FramecutError::JobBusy);
        }

        let id = self.inner.next_job_id.fetch_add(1, Ordering::SeqCst);
        let extension = source.extension();
        let command = TrimCommand {
            input_name: format!("input_{}{}", id, extension),
            output_name: format!("output_{}{}", id, extension),
            start: request.start,
            duration: request.duration,
            stream_copy: true,
        };
        let artifact_name = artifact_file_name(source, &request);

        let (events_tx, events_rx) = mpsc::channel(self.inner.event_capacity);
        self.inner.state.send_replace(ProcessingState::Running(0.0));
        let _ = events_tx.try_send(ProcessingState::Running(0.0));

        info!(
            job_id = id,
            source = source.name(),
            start = request.start,
            duration = request.duration,
            "Submitting trim job"
        );

        let input_name = command.input_name.clone();
        let output_name = command.output_name.clone();
        let task = tokio::spawn(run_job(
            Arc::clone(&self.inner),
            id,
            source.clone(),
            command,
            artifact_name,
            events_tx.clone(),
        ));
        *active = Some(ActiveJob {
            id,
            abort: task.abort_handle(),
            events: events_tx,
            input_name,
            output_name,
        });

        Ok(TrimJob {
            id,
            request,
            events: ReceiverStream::new(events_rx),
        })
    }

    /// Abort the running job, if any, and return to `Idle`.
    /// The job's stream ends with `Failed(Cancelled)`.
    pub fn cancel(&self) -> bool {
        let job = match self.inner.lock_active() {
            Ok(mut active) => {
                let job = active.take();
                if job.is_some() {
                    self.inner.state.send_replace(ProcessingState::Idle);
                }
                job
            }
            Err(_) => None,
        };

        let Some(job) = job else {
            return false;
        };
        job.abort.abort();
        let _ = job
            .events
            .try_send(ProcessingState::Failed(FramecutError::Cancelled));
        info!(job_id = job.id, "Trim job cancelled");

        let engine = self.inner.gate.engine();
        tokio::spawn(async move {
            for name in [job.input_name, job.output_name] {
                if let Err(e) = engine.remove_file(&name).await {
                    debug!(file = %name, error = %e, "Cleanup after cancel failed");
                }
            }
        });
        true
    }

    /// Acknowledge a `Completed` or `Failed` job, returning to `Idle`
    pub fn reset(&self) -> FramecutResult<()> {
        let _active = self.inner.lock_active()?;
        if self.inner.state.borrow().is_running() {
            return Err(FramecutError::JobBusy);
        }
        self.inner.state.send_replace(ProcessingState::Idle);
        Ok(())
    }

    pub fn state(&self) -> ProcessingState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProcessingState> {
        self.inner.state.subscribe()
    }

    pub fn engine_state(&self) -> EngineState {
        self.inner.gate.state()
    }
}

impl Drop for TrimJobController {
    fn drop(&mut self) {
        if let Ok(mut active) = self.inner.active.lock() {
            if let Some(job) = active.take() {
                job.abort.abort();
            }
        }
    }
}

impl ControllerInner {
    fn lock_active(&self) -> FramecutResult<MutexGuard<'_, Option<ActiveJob>>> {
        self.active
            .lock()
            .map_err(|_| FramecutError::transcode("trim controller lock poisoned"))
    }

    fn is_active(active: &Option<ActiveJob>, id: u64) -> bool {
        active.as_ref().map(|job| job.id) == Some(id)
    }

    /// Republish the latest ratio; monotonicity is not enforced
    fn publish_progress(&self, id: u64, ratio: f64, events: &mpsc::Sender<ProcessingState>) {
        if ratio.is_nan() {
            return;
        }
        let ratio = ratio.clamp(0.0, 1.0);
        let Ok(active) = self.lock_active() else {
            return;
        };
        if !Self::is_active(&active, id) {
            return;
        }
        self.state.send_replace(ProcessingState::Running(ratio));
        // One slot stays free for the terminal event
        if events.capacity() > 1 {
            let _ = events.try_send(ProcessingState::Running(ratio));
        }
        debug!(job_id = id, ratio, "Trim progress");
    }

    /// Publish a terminal state if `id` is still the active job
    fn finish(&self, id: u64, outcome: &ProcessingState) -> bool {
        let Ok(mut active) = self.lock_active() else {
            return false;
        };
        if !Self::is_active(&active, id) {
            warn!(job_id = id, "Discarding result of superseded trim job");
            return false;
        }
        *active = None;
        self.state.send_replace(outcome.clone());
        true
    }
}

async fn run_job(
    inner: Arc<ControllerInner>,
    id: u64,
    source: SourceRef,
    command: TrimCommand,
    artifact_name: String,
    events: mpsc::Sender<ProcessingState>,
) {
    let outcome = match execute(&inner, id, &source, &command, &events).await {
        Ok(bytes) => {
            info!(job_id = id, bytes = bytes.len(), "Trim job completed");
            let mime = mime_for_extension(&source.extension());
            ProcessingState::Completed(ArtifactRef::new(id, artifact_name, mime, bytes))
        }
        Err(e) => {
            error!(job_id = id, error = %e, "Trim job failed");
            ProcessingState::Failed(e)
        }
    };

    let engine = inner.gate.engine();
    for name in [&command.input_name, &command.output_name] {
        if let Err(e) = engine.remove_file(name).await {
            debug!(file = %name, error = %e, "Failed to remove engine file");
        }
    }

    if inner.finish(id, &outcome) {
        let _ = events.send(outcome).await;
    }
}

async fn execute(
    inner: &ControllerInner,
    id: u64,
    source: &SourceRef,
    command: &TrimCommand,
    events: &mpsc::Sender<ProcessingState>,
) -> FramecutResult<Vec<u8>> {
    let engine = inner.gate.engine();
    engine
        .write_file(&command.input_name, source.bytes())
        .await
        .map_err(as_transcode)?;

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let trim = engine.run_trim(command, progress_tx);
    tokio::pin!(trim);

    let result = loop {
        tokio::select! {
            biased;
            Some(ratio) = progress_rx.recv() => inner.publish_progress(id, ratio, events),
            result = &mut trim => break result,
        }
    };
    while let Ok(ratio) = progress_rx.try_recv() {
        inner.publish_progress(id, ratio, events);
    }
    result.map_err(as_transcode)?;

    engine
        .read_file(&command.output_name)
        .await
        .map_err(as_transcode)
}

fn as_transcode(err: FramecutError) -> FramecutError {
    match err {
        FramecutError::Transcode { .. } => err,
        other => FramecutError::transcode(other.to_string()),
    }
}

/// Default download name: `<stem>_trim_<start>_<end><ext>`
pub fn artifact_file_name(source: &SourceRef, request: &TrimRequest) -> String {
    format!(
        "{}_trim_{}_{}{}",
        source.stem(),
        format_for_filename(request.start),
        format_for_filename(request.end()),
        source.extension()
    )
}

/// Event stream of one submitted job: `Running(0.0)`, progress updates,
/// then exactly one `Completed` or `Failed`.
pub struct TrimJob {
    id: u64,
    request: TrimRequest,
    events: ReceiverStream<ProcessingState>,
}

impl TrimJob {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Snapshot of the request this job was submitted with
    pub fn request(&self) -> TrimRequest {
        self.request
    }

    /// Drain the stream to its terminal event
    pub async fn wait(mut self) -> FramecutResult<ArtifactRef> {
        while let Some(state) = self.next().await {
            match state {
                ProcessingState::Completed(artifact) => return Ok(artifact),
                ProcessingState::Failed(e) => return Err(e),
                _ => {}
            }
        }
        Err(FramecutError::Cancelled)
    }
}

impl std::fmt::Debug for TrimJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrimJob")
            .field("id", &self.id)
            .field("request", &self.request)
            .finish()
    }
}

impl Stream for TrimJob {
    type Item = ProcessingState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::scripted::ScriptedTranscoder;

    async fn ready_controller(engine: Arc<ScriptedTranscoder>) -> TrimJobController {
        let gate = Arc::new(EngineGate::new(engine));
        gate.initialize().await;
        TrimJobController::new(gate, TrimConfig::default())
    }

    fn source() -> SourceRef {
        SourceRef::new("holiday.mp4", vec![7u8; 32])
    }

    #[tokio::test]
    async fn test_submit_runs_stream_copy_trim() {
        let engine = Arc::new(ScriptedTranscoder::new());
        let controller = ready_controller(engine.clone()).await;

        let job = controller
            .submit(&source(), TrimRequest::new(2.0, 5.0), Some(20.0))
            .unwrap();
        let states: Vec<ProcessingState> = job.collect().await;

        let commands = engine.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].start, 2.0);
        assert_eq!(commands[0].duration, 5.0);
        assert!(commands[0].stream_copy);

        assert_eq!(states.first(), Some(&ProcessingState::Running(0.0)));
        let (last, progress) = states.split_last().unwrap();
        for state in progress {
            match state {
                ProcessingState::Running(p) => assert!((0.0..=1.0).contains(p)),
                other => panic!("unexpected state {:?}", other),
            }
        }
        match last {
            ProcessingState::Completed(artifact) => {
                assert_eq!(artifact.file_name, "holiday_trim_2s_7s.mp4");
                assert_eq!(artifact.mime_type, "video/mp4");
                assert_eq!(artifact.bytes(), source().bytes());
            }
            other => panic!("expected completion, got {:?}", other),
        }
        assert!(matches!(controller.state(), ProcessingState::Completed(_)));
        // Engine files are cleaned up
        assert!(engine.file_names().is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_ends_in_failed() {
        let engine = Arc::new(ScriptedTranscoder::new().failing_trim("exit code 1"));
        let controller = ready_controller(engine).await;

        let job = controller
            .submit(&source(), TrimRequest::new(0.0, 1.0), None)
            .unwrap();
        let err = job.wait().await.unwrap_err();

        assert_eq!(err, FramecutError::transcode("exit code 1"));
        assert_eq!(controller.state(), ProcessingState::Failed(err));
    }

    #[tokio::test]
    async fn test_progress_is_clamped_and_nan_dropped() {
        let engine =
            Arc::new(ScriptedTranscoder::new().with_progress(vec![0.4, f64::NAN, 1.7, 0.2]));
        let controller = ready_controller(engine).await;

        let job = controller
            .submit(&source(), TrimRequest::new(1.0, 1.0), None)
            .unwrap();
        let states: Vec<ProcessingState> = job.collect().await;
        let ratios: Vec<f64> = states
            .iter()
            .filter_map(|s| match s {
                ProcessingState::Running(p) => Some(*p),
                _ => None,
            })
            .collect();

        assert_eq!(ratios, vec![0.0, 0.4, 1.0, 0.2]);
    }

    #[tokio::test]
    async fn test_rejected_when_engine_not_ready() {
        let engine = Arc::new(ScriptedTranscoder::new());
        let gate = Arc::new(EngineGate::new(engine.clone()));
        let controller = TrimJobController::new(gate, TrimConfig::default());

        let result = controller.submit(&source(), TrimRequest::new(2.0, 5.0), None);

        assert!(matches!(result, Err(FramecutError::EngineNotReady { .. })));
        assert_eq!(engine.trim_calls(), 0);
        assert!(engine.file_names().is_empty());
        assert_eq!(controller.state(), ProcessingState::Idle);
    }

    #[tokio::test]
    async fn test_busy_until_reset() {
        let engine = Arc::new(ScriptedTranscoder::new().held());
        let controller = ready_controller(engine.clone()).await;

        let job = controller
            .submit(&source(), TrimRequest::new(0.0, 2.0), None)
            .unwrap();
        assert_eq!(
            controller
                .submit(&source(), TrimRequest::new(1.0, 2.0), None)
                .unwrap_err(),
            FramecutError::JobBusy
        );
        assert_eq!(controller.reset().unwrap_err(), FramecutError::JobBusy);

        engine.release();
        job.wait().await.unwrap();

        // Completed must be acknowledged first
        assert_eq!(
            controller
                .submit(&source(), TrimRequest::new(1.0, 2.0), None)
                .unwrap_err(),
            FramecutError::JobBusy
        );
        controller.reset().unwrap();
        assert_eq!(controller.state(), ProcessingState::Idle);
        assert!(controller
            .submit(&source(), TrimRequest::new(1.0, 2.0), None)
            .is_ok());
    }

    #[tokio::test]
    async fn test_cancel_fences_result() {
        let engine = Arc::new(ScriptedTranscoder::new().held());
        let controller = ready_controller(engine.clone()).await;

        let mut job = controller
            .submit(&source(), TrimRequest::new(0.0, 2.0), None)
            .unwrap();
        assert_eq!(job.next().await, Some(ProcessingState::Running(0.0)));

        assert!(controller.cancel());
        assert_eq!(controller.state(), ProcessingState::Idle);
        assert!(!controller.cancel());

        engine.release();
        assert_eq!(job.wait().await.unwrap_err(), FramecutError::Cancelled);
        assert_eq!(controller.state(), ProcessingState::Idle);
    }

    #[tokio::test]
    async fn test_invalid_request_rejected() {
        let engine = Arc::new(ScriptedTranscoder::new());
        let controller = ready_controller(engine.clone()).await;

        for request in [TrimRequest::new(1.0, 0.0), TrimRequest::new(-1.0, 2.0)] {
            assert!(matches!(
                controller.submit(&source(), request, Some(20.0)),
                Err(FramecutError::InvalidRequest { .. })
            ));
        }
        assert!(controller
            .submit(&source(), TrimRequest::new(25.0, 1.0), Some(20.0))
            .is_err());
        assert_eq!(engine.trim_calls(), 0);
    }
}
