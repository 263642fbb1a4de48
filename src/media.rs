//! Media input model: session identity, geometry classification, frames.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque session identifier, stable for the lifetime of one connection.
///
/// Ids normally come from the signaling layer (a socket id, a peer id);
/// [`SessionId::random`] covers callers without one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Classification value that decides when a new segment must start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKey {
    /// Video frame resolution; a change forces a rotation.
    Resolution { width: u32, height: u32 },
    /// Fixed key for input that never rotates (PCM samples or a
    /// pre-encoded byte stream).
    Stream,
}

impl GeometryKey {
    pub fn is_valid(&self) -> bool {
        match self {
            GeometryKey::Resolution { width, height } => *width > 0 && *height > 0,
            GeometryKey::Stream => true,
        }
    }
}

impl fmt::Display for GeometryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryKey::Resolution { width, height } => write!(f, "{}x{}", width, height),
            GeometryKey::Stream => f.write_str("stream"),
        }
    }
}

/// One unit of media delivered by the sink.
#[derive(Debug, Clone)]
pub struct MediaFrame {
    pub geometry: GeometryKey,
    pub payload: Vec<u8>,
}

impl MediaFrame {
    /// A decoded video frame: pixel buffer plus its resolution.
    pub fn video(width: u32, height: u32, payload: Vec<u8>) -> Self {
        Self {
            geometry: GeometryKey::Resolution { width, height },
            payload,
        }
    }

    /// A PCM sample buffer.
    pub fn samples(payload: Vec<u8>) -> Self {
        Self {
            geometry: GeometryKey::Stream,
            payload,
        }
    }

    /// A chunk of an already-encoded byte stream.
    pub fn encoded(payload: Vec<u8>) -> Self {
        Self {
            geometry: GeometryKey::Stream,
            payload,
        }
    }
}

/// How a session's media arrives. Fixed at session start; the encoding
/// profile never changes across rotations, only the frame geometry does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum InputSpec {
    /// Raw decoded video frames; rotates whenever the resolution changes.
    RawVideo { frame_rate: u32 },
    /// Raw PCM samples, signed 16-bit little-endian.
    RawAudio { sample_rate: u32, channels: u8 },
    /// Client-encoded stream, remuxed without re-encoding. Never rotates.
    PreEncoded,
}

impl InputSpec {
    /// Whether frame geometry can ever force a new segment in this mode.
    pub fn rotates(&self) -> bool {
        matches!(self, InputSpec::RawVideo { .. })
    }
}
