//! Ordered, lossless concatenation of a session's finalized segments.

use crate::backend::{EncoderError, MediaBackend};
use crate::config::RecorderConfig;
use crate::events::{EventBus, PipelineEvent};
use crate::media::SessionId;
use crate::recorder::segment::{artifact_path, Segment, SegmentStatus};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Merge-related errors
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("merge input missing from disk: {0}")]
    MissingInput(PathBuf),

    #[error("concatenation failed: {0}")]
    Tool(#[from] EncoderError),
}

/// Concatenates finalized segments into the final artifact and removes
/// the intermediates.
pub struct MergeCoordinator {
    config: Arc<RecorderConfig>,
    backend: Arc<dyn MediaBackend>,
    events: EventBus,
}

impl MergeCoordinator {
    pub fn new(
        config: Arc<RecorderConfig>,
        backend: Arc<dyn MediaBackend>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            backend,
            events,
        }
    }

    /// Merge all finalized segments in sequence order. Returns the
    /// artifact path, or `None` when there is nothing to merge.
    ///
    /// Inputs are deleted on success, so this must be invoked at most
    /// once per session; on failure every source file is left in place.
    pub async fn merge(
        &self,
        session: &SessionId,
        segments: &[Segment],
    ) -> Result<Option<PathBuf>, MergeError> {
        let mut inputs: Vec<&Segment> = segments
            .iter()
            .filter(|s| s.status == SegmentStatus::Finalized)
            .collect();
        inputs.sort_by_key(|s| s.sequence_index);

        if inputs.is_empty() {
            tracing::info!(session = %session, "no finalized segments, skipping merge");
            return Ok(None);
        }

        for segment in &inputs {
            if !segment.path.exists() {
                tracing::warn!(
                    session = %session,
                    path = %segment.path.display(),
                    "merge input missing, remaining segments left on disk"
                );
                self.events.emit(PipelineEvent::MergeFailed {
                    session: session.clone(),
                    error: format!("missing input {}", segment.path.display()),
                });
                return Err(MergeError::MissingInput(segment.path.clone()));
            }
        }

        let paths: Vec<PathBuf> = inputs.iter().map(|s| s.path.clone()).collect();
        let artifact = artifact_path(&self.config, session);
        tracing::info!(
            session = %session,
            inputs = paths.len(),
            artifact = %artifact.display(),
            "merge started"
        );
        self.events.emit(PipelineEvent::MergeStarted {
            session: session.clone(),
            inputs: paths.len(),
        });

        if let Err(e) = self.backend.concat(&paths, &artifact).await {
            tracing::error!(session = %session, "merge failed: {}", e);
            self.events.emit(PipelineEvent::MergeFailed {
                session: session.clone(),
                error: e.to_string(),
            });
            return Err(e.into());
        }

        for path in &paths {
            if let Err(e) = tokio::fs::remove_file(path).await {
                // leaked intermediate; operators find it by its prefix
                tracing::warn!(
                    session = %session,
                    path = %path.display(),
                    "failed to remove merged segment: {}",
                    e
                );
            }
        }

        tracing::info!(
            session = %session,
            artifact = %artifact.display(),
            "merge completed"
        );
        self.events.emit(PipelineEvent::MergeCompleted {
            session: session.clone(),
            artifact: artifact.clone(),
        });
        Ok(Some(artifact))
    }
}
