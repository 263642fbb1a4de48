//! Public facade: inbound session operations and observation hooks.

use crate::backend::{FfmpegBackend, MediaBackend};
use crate::config::RecorderConfig;
use crate::error::{RecorderError, RecorderResult};
use crate::events::{EventBus, PipelineEvent};
use crate::media::{InputSpec, MediaFrame, SessionId};
use crate::merge::MergeCoordinator;
use crate::recorder::controller::{SessionController, SessionEvent};
use crate::recorder::manager::SegmentManager;
use crate::recorder::state::{Session, SessionState};
use crate::recorder::supervisor::EncoderSupervisor;
use crate::registry::{SessionHandle, SessionRegistry};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

/// Capacity of the pipeline event bus.
const EVENT_CAPACITY: usize = 100;

/// The recording pipeline. One instance serves many concurrent sessions;
/// each session runs on its own task and owns its segments exclusively.
///
/// Must be used from within a Tokio runtime: `session_start` spawns the
/// per-session task.
pub struct RecordingPipeline {
    config: Arc<RecorderConfig>,
    backend: Arc<dyn MediaBackend>,
    registry: Arc<SessionRegistry>,
    events: EventBus,
}

impl RecordingPipeline {
    /// Create a pipeline backed by the system `ffmpeg`.
    pub fn new(config: RecorderConfig) -> RecorderResult<Self> {
        Self::with_backend(config, Arc::new(FfmpegBackend::new()))
    }

    /// Create a pipeline with a custom encoder backend.
    pub fn with_backend(
        config: RecorderConfig,
        backend: Arc<dyn MediaBackend>,
    ) -> RecorderResult<Self> {
        std::fs::create_dir_all(&config.output_dir)?;
        Ok(Self {
            config: Arc::new(config),
            backend,
            registry: Arc::new(SessionRegistry::new()),
            events: EventBus::new(EVENT_CAPACITY),
        })
    }

    /// Begin a session. The id must be unique among tracked sessions.
    pub fn session_start(&self, id: SessionId, input: InputSpec) -> RecorderResult<()> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);

        let session = Session::new(id.clone());
        let handle = SessionHandle {
            events: event_tx.clone(),
            state: state_rx,
            created_at: session.created_at,
        };
        if !self.registry.insert(id.clone(), handle) {
            return Err(RecorderError::SessionExists(id));
        }

        let supervisor = EncoderSupervisor::new(
            id.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.backend),
            event_tx,
        );
        let manager = SegmentManager::new(
            id.clone(),
            input,
            Arc::clone(&self.config),
            supervisor,
            self.events.clone(),
        );
        let merger = MergeCoordinator::new(
            Arc::clone(&self.config),
            Arc::clone(&self.backend),
            self.events.clone(),
        );
        let controller = SessionController::new(
            session,
            manager,
            merger,
            Arc::clone(&self.config),
            Arc::clone(&self.registry),
            self.events.clone(),
            state_tx,
        );

        tracing::info!(session = %id, "session started");
        tokio::spawn(controller.run(event_rx));
        Ok(())
    }

    /// Deliver one unit of media to a session.
    pub fn frame(&self, id: &SessionId, frame: MediaFrame) -> RecorderResult<()> {
        self.send(id, SessionEvent::Frame(frame))
    }

    /// End a session. An explicit end and a transport disconnect are
    /// equivalent here; repeat calls on a draining session are ignored by
    /// the controller.
    pub fn session_end(&self, id: &SessionId) -> RecorderResult<()> {
        self.send(id, SessionEvent::End)
    }

    fn send(&self, id: &SessionId, event: SessionEvent) -> RecorderResult<()> {
        let handle = self
            .registry
            .get(id)
            .ok_or_else(|| RecorderError::SessionNotFound(id.clone()))?;
        handle
            .events
            .send(event)
            .map_err(|_| RecorderError::SessionClosed(id.clone()))
    }

    /// Current state of a session, if it is still tracked.
    pub fn session_state(&self, id: &SessionId) -> Option<SessionState> {
        self.registry.get(id).map(|h| *h.state.borrow())
    }

    /// Watch a session's state transitions. The receiver keeps working
    /// after the session leaves the registry.
    pub fn watch_session(&self, id: &SessionId) -> Option<watch::Receiver<SessionState>> {
        self.registry.get(id).map(|h| h.state)
    }

    /// Subscribe to pipeline events.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Number of tracked sessions: live ones plus any parked in `merging`
    /// after a failed merge.
    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    fn pipeline(dir: &std::path::Path) -> RecordingPipeline {
        RecordingPipeline::with_backend(
            RecorderConfig::with_output_dir(dir),
            Arc::new(crate::backend::testing::RelayBackend::new()),
        )
        .unwrap()
    }

    async fn wait_for_closed(mut state: watch::Receiver<SessionState>) {
        timeout(Duration::from_secs(5), async {
            while *state.borrow() != SessionState::Closed {
                if state.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .expect("session did not close in time");
    }

    #[tokio::test]
    async fn duplicate_session_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let id = SessionId::new("dup");
        pipeline
            .session_start(id.clone(), InputSpec::PreEncoded)
            .unwrap();
        let err = pipeline
            .session_start(id.clone(), InputSpec::PreEncoded)
            .unwrap_err();
        assert!(matches!(err, RecorderError::SessionExists(_)));
    }

    #[tokio::test]
    async fn frames_for_unknown_sessions_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let err = pipeline
            .frame(&SessionId::new("ghost"), MediaFrame::encoded(vec![1]))
            .unwrap_err();
        assert!(matches!(err, RecorderError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn session_without_frames_closes_without_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        let id = SessionId::new("silent");
        pipeline
            .session_start(id.clone(), InputSpec::RawVideo { frame_rate: 30 })
            .unwrap();
        let state = pipeline.watch_session(&id).unwrap();
        let mut events = pipeline.subscribe();

        pipeline.session_end(&id).unwrap();
        wait_for_closed(state).await;

        // no segment was ever created, no artifact produced
        match timeout(Duration::from_secs(5), events.recv()).await.unwrap() {
            Ok(PipelineEvent::SessionClosed { artifact, .. }) => assert!(artifact.is_none()),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(pipeline.active_sessions(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(pipeline
            .frame(&id, MediaFrame::encoded(vec![1]))
            .is_err());
    }
}
