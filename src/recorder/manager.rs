//! Segment boundaries: geometry classification, rotation, head feeding.

use crate::backend::EncoderError;
use crate::config::RecorderConfig;
use crate::events::{EventBus, PipelineEvent};
use crate::media::{GeometryKey, InputSpec, MediaFrame, SessionId};
use crate::recorder::segment::Segment;
use crate::recorder::supervisor::{EncoderJob, EncoderSupervisor};
use std::sync::Arc;

/// Decides when a new segment must start and keeps the per-session
/// segment list in creation order. Creation order is the authoritative
/// timeline; subprocess completion order is irrelevant.
pub struct SegmentManager {
    session: SessionId,
    input: InputSpec,
    config: Arc<RecorderConfig>,
    supervisor: EncoderSupervisor,
    events: EventBus,
    segments: Vec<Segment>,
    head: Option<EncoderJob>,
    next_sequence: u64,
}

impl SegmentManager {
    pub fn new(
        session: SessionId,
        input: InputSpec,
        config: Arc<RecorderConfig>,
        supervisor: EncoderSupervisor,
        events: EventBus,
    ) -> Self {
        Self {
            session,
            input,
            config,
            supervisor,
            events,
            segments: Vec::new(),
            head: None,
            next_sequence: 0,
        }
    }

    /// Effective rotation key for a frame under this session's input mode.
    /// Byte-stream modes map everything onto the fixed key and never
    /// rotate.
    fn classify(&self, frame: &MediaFrame) -> Option<GeometryKey> {
        match self.input {
            InputSpec::RawVideo { .. } => match frame.geometry {
                key @ GeometryKey::Resolution { .. } if key.is_valid() => Some(key),
                _ => None,
            },
            _ => Some(GeometryKey::Stream),
        }
    }

    /// Route one frame: validate it, rotate if its geometry key differs
    /// from the head segment's, then feed the head's data channel.
    pub async fn on_frame(&mut self, frame: MediaFrame) {
        if frame.payload.is_empty() {
            tracing::warn!(session = %self.session, "dropping empty media frame");
            return;
        }
        let Some(key) = self.classify(&frame) else {
            tracing::warn!(
                session = %self.session,
                geometry = %frame.geometry,
                "dropping frame with unsupported geometry"
            );
            return;
        };
        self.rotate_if_needed(key).await;
        if let Some(job) = &self.head {
            self.supervisor.feed(job, frame.payload);
        }
    }

    /// Start a new segment when no head exists or the key changed. The
    /// outgoing head's data channel is closed before the new segment is
    /// created, so no frame can ever cross segments; its subprocess
    /// finalizes in the background.
    async fn rotate_if_needed(&mut self, key: GeometryKey) {
        let rotate = match &self.head {
            Some(job) => self
                .segments
                .get(job.sequence_index as usize)
                .map(|segment| segment.geometry != key)
                .unwrap_or(true),
            None => true,
        };
        if !rotate {
            return;
        }
        self.finish_head();
        self.open_segment(key).await;
    }

    /// Close the head's data channel (end-of-input). Idempotent; keeps
    /// the head so late writes are dropped rather than re-routed.
    pub fn finish_head(&mut self) {
        if let Some(job) = &mut self.head {
            let sequence_index = job.sequence_index;
            self.supervisor.finish(job);
            if let Some(segment) = self.segments.get_mut(sequence_index as usize) {
                segment.begin_finalize();
            }
        }
    }

    async fn open_segment(&mut self, key: GeometryKey) {
        let sequence_index = self.next_sequence;
        self.next_sequence += 1;
        let mut segment = Segment::allocate(&self.config, &self.session, sequence_index, key);

        match self.supervisor.start_job(&segment, &self.input).await {
            Ok(job) => {
                tracing::info!(
                    session = %self.session,
                    sequence_index,
                    geometry = %key,
                    path = %segment.path.display(),
                    "segment created"
                );
                self.events.emit(PipelineEvent::SegmentCreated {
                    session: self.session.clone(),
                    sequence: sequence_index,
                    path: segment.path.clone(),
                });
                self.segments.push(segment);
                self.head = Some(job);
            }
            Err(e) => {
                tracing::error!(
                    session = %self.session,
                    sequence_index,
                    "segment failed: encoder did not start: {}",
                    e
                );
                segment.settle(false);
                self.events.emit(PipelineEvent::SegmentFailed {
                    session: self.session.clone(),
                    sequence: sequence_index,
                    error: e.to_string(),
                });
                self.segments.push(segment);
                // no head: the next frame rotates into a fresh segment
                self.head = None;
            }
        }
    }

    /// Record a subprocess completion verdict. Settling is exactly-once;
    /// duplicate reports are ignored.
    pub fn settle_segment(&mut self, sequence_index: u64, result: Result<(), EncoderError>) {
        let Some(segment) = self.segments.get_mut(sequence_index as usize) else {
            tracing::warn!(
                session = %self.session,
                sequence_index,
                "completion report for unknown segment"
            );
            return;
        };
        if segment.status.is_settled() {
            return;
        }
        match result {
            Ok(()) => {
                segment.settle(true);
                tracing::info!(session = %self.session, sequence_index, "segment finalized");
                self.events.emit(PipelineEvent::SegmentFinalized {
                    session: self.session.clone(),
                    sequence: sequence_index,
                });
            }
            Err(e) => {
                segment.settle(false);
                tracing::error!(
                    session = %self.session,
                    sequence_index,
                    "segment failed: {}",
                    e
                );
                self.events.emit(PipelineEvent::SegmentFailed {
                    session: self.session.clone(),
                    sequence: sequence_index,
                    error: e.to_string(),
                });
                // a failed head cannot resume; the next frame must rotate
                // into a fresh segment
                if self
                    .head
                    .as_ref()
                    .is_some_and(|job| job.sequence_index == sequence_index)
                {
                    self.head = None;
                }
            }
        }
    }

    /// Whether every segment has reached a terminal status.
    pub fn all_settled(&self) -> bool {
        self.segments.iter().all(|s| s.status.is_settled())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}
