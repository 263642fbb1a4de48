//! Operational events emitted by the pipeline.

use crate::media::SessionId;
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Events emitted as sessions, segments, and merges progress.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A new segment started recording
    SegmentCreated {
        session: SessionId,
        sequence: u64,
        path: PathBuf,
    },
    /// A segment's encoder completed successfully
    SegmentFinalized { session: SessionId, sequence: u64 },
    /// A segment's encoder failed; the segment is excluded from merge
    SegmentFailed {
        session: SessionId,
        sequence: u64,
        error: String,
    },
    /// Concatenation of finalized segments began
    MergeStarted { session: SessionId, inputs: usize },
    /// The final artifact was written and intermediates removed
    MergeCompleted {
        session: SessionId,
        artifact: PathBuf,
    },
    /// Concatenation failed; source files are left in place
    MergeFailed { session: SessionId, error: String },
    /// The session reached its terminal state
    SessionClosed {
        session: SessionId,
        artifact: Option<PathBuf>,
    },
}

/// Broadcast bus for pipeline events. Subscribers that fall behind lose
/// the oldest events rather than blocking the pipeline.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; nobody listening is fine.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_harmless() {
        let bus = EventBus::new(4);
        bus.emit(PipelineEvent::SegmentFinalized {
            session: SessionId::new("s"),
            sequence: 0,
        });
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        bus.emit(PipelineEvent::MergeStarted {
            session: SessionId::new("s"),
            inputs: 2,
        });
        match rx.recv().await.unwrap() {
            PipelineEvent::MergeStarted { inputs, .. } => assert_eq!(inputs, 2),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
