//! Error types for the pipeline facade.

use crate::media::SessionId;
use thiserror::Error;

/// Errors surfaced by [`crate::RecordingPipeline`] operations.
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("session {0} already exists")]
    SessionExists(SessionId),

    #[error("unknown session: {0}")]
    SessionNotFound(SessionId),

    #[error("session {0} is no longer accepting input")]
    SessionClosed(SessionId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;
