//! Session state machine and book-keeping.

use crate::media::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one recording session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Connection established, no media seen yet
    Connecting,
    /// Live media is flowing
    Streaming,
    /// End of stream observed; waiting for in-flight segments to settle
    Draining,
    /// All segments settled; concatenation in progress
    Merging,
    /// Terminal. No frames, rotations, or merges are accepted
    Closed,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Connecting
    }
}

impl SessionState {
    /// Whether inbound frames may still be routed to a segment.
    pub fn accepts_frames(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Streaming)
    }

    /// Whether an end-of-stream trigger still has any effect. Repeated
    /// triggers on a draining (or later) session are ignored.
    pub fn drainable(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Streaming)
    }
}

/// Book-keeping record for one live session.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            state: SessionState::Connecting,
            created_at: Utc::now(),
        }
    }
}
