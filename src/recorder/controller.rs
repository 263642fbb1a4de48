//! Per-session lifecycle.
//!
//! One task per session owns all session state. Inbound frames,
//! subprocess completions, and end-of-stream triggers are serialized
//! through a single queue, so rotation can never race itself and a
//! finish can never race a job start.

use crate::backend::EncoderError;
use crate::config::RecorderConfig;
use crate::events::{EventBus, PipelineEvent};
use crate::media::MediaFrame;
use crate::merge::MergeCoordinator;
use crate::recorder::manager::SegmentManager;
use crate::recorder::segment::SegmentStatus;
use crate::recorder::state::{Session, SessionState};
use crate::registry::SessionRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Messages serialized through a session's event queue.
#[derive(Debug)]
pub enum SessionEvent {
    /// Inbound media from the sink
    Frame(MediaFrame),
    /// Completion verdict from one segment's subprocess
    JobFinished {
        sequence_index: u64,
        result: Result<(), EncoderError>,
    },
    /// Graceful end or transport disconnect; both drain
    End,
}

/// Drives one session from `connecting` to `closed`.
pub struct SessionController {
    session: Session,
    manager: SegmentManager,
    merger: MergeCoordinator,
    config: Arc<RecorderConfig>,
    registry: Arc<SessionRegistry>,
    events: EventBus,
    state_tx: watch::Sender<SessionState>,
}

impl SessionController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Session,
        manager: SegmentManager,
        merger: MergeCoordinator,
        config: Arc<RecorderConfig>,
        registry: Arc<SessionRegistry>,
        events: EventBus,
        state_tx: watch::Sender<SessionState>,
    ) -> Self {
        Self {
            session,
            manager,
            merger,
            config,
            registry,
            events,
            state_tx,
        }
    }

    /// Event loop. Runs until the session closes, or parks after a merge
    /// failure so operators can inspect the files left behind. The
    /// interval timer is a liveness backstop for the drain check; the
    /// fast path reacts to each completion as it arrives.
    pub async fn run(mut self, mut queue: mpsc::UnboundedReceiver<SessionEvent>) {
        let mut poll = tokio::time::interval(self.config.finalize_poll());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = queue.recv() => match event {
                    Some(SessionEvent::Frame(frame)) => self.on_frame(frame).await,
                    Some(SessionEvent::JobFinished { sequence_index, result }) => {
                        self.manager.settle_segment(sequence_index, result);
                        if self.try_merge().await {
                            break;
                        }
                    }
                    Some(SessionEvent::End) => {
                        self.begin_drain();
                        if self.try_merge().await {
                            break;
                        }
                    }
                    // Every sender is gone: the pipeline dropped this
                    // session and no job can report anymore.
                    None => {
                        self.begin_drain();
                        if !self.try_merge().await {
                            tracing::warn!(
                                session = %self.session.id,
                                "event queue closed with unsettled segments"
                            );
                        }
                        break;
                    }
                },
                _ = poll.tick(), if self.session.state == SessionState::Draining => {
                    if self.try_merge().await {
                        break;
                    }
                }
            }
        }
    }

    fn set_state(&mut self, next: SessionState) {
        if self.session.state == next {
            return;
        }
        tracing::info!(
            session = %self.session.id,
            from = ?self.session.state,
            to = ?next,
            "session state change"
        );
        self.session.state = next;
        let _ = self.state_tx.send(next);
    }

    async fn on_frame(&mut self, frame: MediaFrame) {
        if !self.session.state.accepts_frames() {
            tracing::debug!(session = %self.session.id, "dropping frame after end of stream");
            return;
        }
        // the first frame confirms an active feed
        if self.session.state == SessionState::Connecting {
            self.set_state(SessionState::Streaming);
        }
        self.manager.on_frame(frame).await;
    }

    /// Enter draining and close the head segment's input. Idempotent;
    /// repeat triggers on a draining or later session do nothing.
    fn begin_drain(&mut self) {
        if !self.session.state.drainable() {
            return;
        }
        self.set_state(SessionState::Draining);
        self.manager.finish_head();
    }

    /// Advance `draining -> merging -> closed` once every segment has
    /// settled. Returns true when the controller is done, either closed
    /// or parked in `merging` after a failure.
    async fn try_merge(&mut self) -> bool {
        if self.session.state != SessionState::Draining || !self.manager.all_settled() {
            return false;
        }

        let mergeable = self
            .manager
            .segments()
            .iter()
            .any(|s| s.status == SegmentStatus::Finalized);
        if !mergeable {
            // zero frames ever arrived, or every segment failed
            self.close(None);
            return true;
        }

        self.set_state(SessionState::Merging);
        match self
            .merger
            .merge(&self.session.id, self.manager.segments())
            .await
        {
            Ok(artifact) => {
                self.close(artifact);
                true
            }
            Err(e) => {
                // Parked: source files stay on disk and the registry
                // entry stays visible for operators. No retry.
                tracing::error!(
                    session = %self.session.id,
                    "merge failed, session held for inspection: {}",
                    e
                );
                true
            }
        }
    }

    fn close(&mut self, artifact: Option<PathBuf>) {
        self.set_state(SessionState::Closed);
        self.registry.remove(&self.session.id);
        self.events.emit(PipelineEvent::SessionClosed {
            session: self.session.id.clone(),
            artifact,
        });
    }
}
