//! Encoder job lifecycle: start, feed, finish.

use crate::backend::{EncoderError, EncoderSpec, MediaBackend};
use crate::config::RecorderConfig;
use crate::media::{InputSpec, SessionId};
use crate::recorder::controller::SessionEvent;
use crate::recorder::segment::Segment;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Runtime binding between a segment and its encoder subprocess. Holds
/// the sole write end of the segment's data channel; taking it is the
/// only way to signal end-of-input.
pub struct EncoderJob {
    pub sequence_index: u64,
    data: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl EncoderJob {
    /// Whether the data channel is still open for writes.
    pub fn is_writable(&self) -> bool {
        self.data.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

/// Owns the lifecycle of one external encoding subprocess per segment:
/// start it, feed it, observe its completion, and guarantee its input
/// pipe is closed exactly once.
pub struct EncoderSupervisor {
    session: SessionId,
    config: Arc<RecorderConfig>,
    backend: Arc<dyn MediaBackend>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl EncoderSupervisor {
    pub fn new(
        session: SessionId,
        config: Arc<RecorderConfig>,
        backend: Arc<dyn MediaBackend>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            session,
            config,
            backend,
            events,
        }
    }

    /// Launch the subprocess for `segment` and wire up its input pipe.
    /// Completion is reported through the session event queue as a single
    /// `JobFinished` message once the subprocess settles.
    pub async fn start_job(
        &self,
        segment: &Segment,
        input: &InputSpec,
    ) -> Result<EncoderJob, EncoderError> {
        let spec = EncoderSpec {
            input: input.clone(),
            geometry: segment.geometry,
            video: self.config.video.clone(),
            output: segment.path.clone(),
        };
        let handle = self.backend.spawn_encoder(&spec).await?;

        let (data_tx, mut data_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let events = self.events.clone();
        let session = self.session.clone();
        let sequence_index = segment.sequence_index;
        let mut stdin = handle.stdin;
        let completion = handle.completion;

        tokio::spawn(async move {
            while let Some(chunk) = data_rx.recv().await {
                if let Err(e) = stdin.write_all(&chunk).await {
                    // The subprocess hung up early; its exit status will
                    // carry the real error.
                    tracing::warn!(
                        session = %session,
                        sequence_index,
                        "encoder input pipe closed early: {}",
                        e
                    );
                    break;
                }
            }
            drop(data_rx);
            drop(stdin);
            let result = match completion.await {
                Ok(result) => result,
                Err(_) => Err(EncoderError::Vanished),
            };
            let _ = events.send(SessionEvent::JobFinished {
                sequence_index,
                result,
            });
        });

        Ok(EncoderJob {
            sequence_index,
            data: Some(data_tx),
        })
    }

    /// Forward a payload to the job. Writes after closure are dropped,
    /// never queued.
    pub fn feed(&self, job: &EncoderJob, payload: Vec<u8>) {
        match &job.data {
            Some(tx) => {
                if tx.send(payload).is_err() {
                    tracing::debug!(
                        session = %self.session,
                        sequence_index = job.sequence_index,
                        "dropped payload for settled job"
                    );
                }
            }
            None => tracing::debug!(
                session = %self.session,
                sequence_index = job.sequence_index,
                "dropped payload after end-of-input"
            ),
        }
    }

    /// Close the job's data channel, signalling end-of-input to the
    /// subprocess. Calling this twice is a no-op.
    pub fn finish(&self, job: &mut EncoderJob) {
        if job.data.take().is_some() {
            tracing::debug!(
                session = %self.session,
                sequence_index = job.sequence_index,
                "segment end-of-input"
            );
        }
    }
}
