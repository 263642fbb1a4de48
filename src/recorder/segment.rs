//! Segment model and on-disk naming.

use crate::config::RecorderConfig;
use crate::media::{GeometryKey, SessionId};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Where a segment is in its life. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    /// Encoder subprocess is live and accepting input
    Recording,
    /// End-of-input sent; waiting for the subprocess to complete
    Finalizing,
    /// Subprocess completed; the file is merge-ready
    Finalized,
    /// Subprocess reported an error; excluded from merge input
    Failed,
}

impl SegmentStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, SegmentStatus::Finalized | SegmentStatus::Failed)
    }
}

/// One contiguous recording unit with stable geometry, bound to exactly
/// one encoder subprocess for its entire life.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Creation order within the session; defines merge order
    pub sequence_index: u64,
    pub geometry: GeometryKey,
    pub path: PathBuf,
    pub status: SegmentStatus,
}

/// Process-wide counter folded into file names so concurrent sessions can
/// never collide on a path.
static PATH_COUNTER: AtomicU64 = AtomicU64::new(0);

impl Segment {
    /// Allocate a segment with a fresh process-unique path.
    pub fn allocate(
        config: &RecorderConfig,
        session: &SessionId,
        sequence_index: u64,
        geometry: GeometryKey,
    ) -> Self {
        let counter = PATH_COUNTER.fetch_add(1, Ordering::Relaxed);
        let file = format!(
            "{}{}-{}-{}-{}-{}.{}",
            config.segment_prefix,
            sanitize(session.as_str()),
            Utc::now().format("%Y%m%d%H%M%S"),
            counter,
            sequence_index,
            geometry,
            config.container,
        );
        Self {
            sequence_index,
            geometry,
            path: config.output_dir.join(file),
            status: SegmentStatus::Recording,
        }
    }

    /// End-of-input was sent to the encoder.
    pub fn begin_finalize(&mut self) {
        if self.status == SegmentStatus::Recording {
            self.status = SegmentStatus::Finalizing;
        }
    }

    /// Record the encoder's verdict. Settled segments never change again.
    pub fn settle(&mut self, ok: bool) {
        if self.status.is_settled() {
            return;
        }
        self.status = if ok {
            SegmentStatus::Finalized
        } else {
            SegmentStatus::Failed
        };
    }
}

/// Artifact path for a finished session, timestamp-derived and unique.
pub fn artifact_path(config: &RecorderConfig, session: &SessionId) -> PathBuf {
    let counter = PATH_COUNTER.fetch_add(1, Ordering::Relaxed);
    config.output_dir.join(format!(
        "{}{}-{}-{}.{}",
        config.artifact_prefix,
        sanitize(session.as_str()),
        Utc::now().format("%Y%m%d%H%M%S"),
        counter,
        config.container,
    ))
}

/// Session ids come from the transport layer; keep only characters that
/// are safe in a file name.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RecorderConfig {
        RecorderConfig::with_output_dir("/tmp/rec")
    }

    #[test]
    fn allocated_paths_are_unique() {
        let config = config();
        let session = SessionId::new("s1");
        let geometry = GeometryKey::Resolution {
            width: 640,
            height: 480,
        };
        let a = Segment::allocate(&config, &session, 0, geometry);
        let b = Segment::allocate(&config, &session, 0, geometry);
        assert_ne!(a.path, b.path);
    }

    #[test]
    fn paths_carry_prefix_and_geometry() {
        let segment = Segment::allocate(
            &config(),
            &SessionId::new("s1"),
            3,
            GeometryKey::Resolution {
                width: 1280,
                height: 720,
            },
        );
        let name = segment.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("segment-s1-"));
        assert!(name.contains("1280x720"));
        assert!(name.ends_with(".mp4"));
    }

    #[test]
    fn hostile_session_ids_are_sanitized() {
        let segment = Segment::allocate(
            &config(),
            &SessionId::new("../etc/passwd"),
            0,
            GeometryKey::Stream,
        );
        assert!(segment.path.starts_with("/tmp/rec"));
        let name = segment.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(!name.contains('/'));
        assert!(!name.contains(".."));
    }

    #[test]
    fn status_transitions_are_monotonic() {
        let mut segment = Segment::allocate(&config(), &SessionId::new("s"), 0, GeometryKey::Stream);
        assert_eq!(segment.status, SegmentStatus::Recording);

        segment.begin_finalize();
        assert_eq!(segment.status, SegmentStatus::Finalizing);

        segment.settle(false);
        assert_eq!(segment.status, SegmentStatus::Failed);

        // settled segments never move again
        segment.settle(true);
        assert_eq!(segment.status, SegmentStatus::Failed);
        segment.begin_finalize();
        assert_eq!(segment.status, SegmentStatus::Failed);
    }
}
