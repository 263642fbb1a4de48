//! Pipeline configuration.

use crate::error::RecorderResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Encode quality levels for raw-input sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodeQuality {
    Low,
    Medium,
    High,
}

impl EncodeQuality {
    /// Get the CRF value for H.264 encoding
    /// Lower values = higher quality, larger files
    pub fn crf(&self) -> u8 {
        match self {
            EncodeQuality::Low => 28,
            EncodeQuality::Medium => 23,
            EncodeQuality::High => 18,
        }
    }

    /// Get the FFmpeg preset for H.264 encoding
    pub fn h264_preset(&self) -> &'static str {
        match self {
            EncodeQuality::Low => "faster",
            EncodeQuality::Medium => "medium",
            EncodeQuality::High => "slow",
        }
    }
}

/// Video encoding profile. Fixed for the whole session: inbound frames
/// may change resolution across rotations, but every segment is encoded
/// to the same output geometry. Lossless concatenation requires all
/// merge inputs to share identical codec parameters, resolution
/// included.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoSettings {
    /// Quality level
    pub quality: EncodeQuality,

    /// Pixel format of inbound raw frames
    pub pixel_format: String,

    /// Output width every segment is normalized to
    pub width: u32,

    /// Output height every segment is normalized to
    pub height: u32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            quality: EncodeQuality::Medium,
            pixel_format: "yuv420p".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Configuration for the recording pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Directory holding segment files and final artifacts
    pub output_dir: PathBuf,

    /// Prefix for intermediate segment files, distinguishable so
    /// operators can identify orphans left by crashes
    pub segment_prefix: String,

    /// Prefix for final artifacts
    pub artifact_prefix: String,

    /// Container extension for segments and artifacts
    pub container: String,

    /// Encoding profile for raw video sessions
    pub video: VideoSettings,

    /// Fallback interval for the all-segments-finalized check, in
    /// milliseconds
    pub finalize_poll_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./recordings"),
            segment_prefix: "segment-".to_string(),
            artifact_prefix: "recording-".to_string(),
            container: "mp4".to_string(),
            video: VideoSettings::default(),
            finalize_poll_ms: 1_000,
        }
    }
}

impl RecorderConfig {
    /// Default configuration writing into `dir`.
    pub fn with_output_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> RecorderResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// The finalize poll interval, clamped away from busy-looping.
    pub fn finalize_poll(&self) -> Duration {
        Duration::from_millis(self.finalize_poll_ms.max(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = RecorderConfig::default();
        assert_eq!(config.container, "mp4");
        assert_eq!(config.segment_prefix, "segment-");
        assert_eq!(config.finalize_poll(), Duration::from_millis(1_000));
        assert_eq!(config.video.width, 1280);
        assert_eq!(config.video.height, 720);
    }

    #[test]
    fn poll_interval_is_clamped() {
        let config = RecorderConfig {
            finalize_poll_ms: 0,
            ..RecorderConfig::default()
        };
        assert_eq!(config.finalize_poll(), Duration::from_millis(100));
    }

    #[test]
    fn quality_maps_to_crf_and_preset() {
        assert_eq!(EncodeQuality::Low.crf(), 28);
        assert_eq!(EncodeQuality::High.crf(), 18);
        assert_eq!(EncodeQuality::Medium.h264_preset(), "medium");
    }

    #[test]
    fn loads_partial_config_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recorder.json");
        std::fs::write(
            &path,
            r#"{ "outputDir": "/tmp/rec", "video": { "quality": "high" } }"#,
        )
        .unwrap();

        let config = RecorderConfig::from_file(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/rec"));
        assert_eq!(config.video.quality, EncodeQuality::High);
        // untouched fields keep their defaults
        assert_eq!(config.artifact_prefix, "recording-");
    }
}
