//! rtc-recorder - server-side recording for live peer media streams.
//!
//! The pipeline accepts decoded frames (or pre-encoded chunks) from a
//! real-time media session, writes them through one external encoder
//! subprocess per segment, rotates segments when the stream geometry
//! changes mid-session, and concatenates the finalized segments into a
//! single chronologically ordered artifact when the session ends.
//!
//! Signaling, capture, and the encoder's internals are external
//! collaborators; this crate only manages when a new encoding unit is
//! needed and how the resulting files are sequenced and combined.

pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod merge;
pub mod pipeline;
pub mod recorder;
pub mod registry;

pub use backend::{EncoderError, FfmpegBackend, MediaBackend};
pub use config::{EncodeQuality, RecorderConfig, VideoSettings};
pub use error::{RecorderError, RecorderResult};
pub use events::PipelineEvent;
pub use media::{GeometryKey, InputSpec, MediaFrame, SessionId};
pub use pipeline::RecordingPipeline;
pub use recorder::state::SessionState;
