//! FFmpeg implementation of the encoder boundary.
//!
//! One subprocess per segment reads media from stdin and writes the
//! segment file; merge runs the concat demuxer with stream copy so no
//! re-encoding happens.

use super::{EncoderError, EncoderHandle, EncoderSpec, MediaBackend};
use crate::media::{GeometryKey, InputSpec};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

/// How many trailing bytes of encoder stderr to keep for error reports.
const STDERR_TAIL: usize = 2048;

/// Runs `ffmpeg` subprocesses for segment encoding and merge.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }

    /// Build the argument list for one segment encoder.
    fn encoder_args(spec: &EncoderSpec) -> Result<Vec<String>, EncoderError> {
        let mut args = vec!["-y".to_string(), "-hide_banner".to_string()];

        match &spec.input {
            InputSpec::RawVideo { frame_rate } => {
                let GeometryKey::Resolution { width, height } = spec.geometry else {
                    return Err(EncoderError::Launch(
                        "raw video input requires a frame resolution".to_string(),
                    ));
                };
                args.extend([
                    "-f".to_string(),
                    "rawvideo".to_string(),
                    "-pix_fmt".to_string(),
                    spec.video.pixel_format.clone(),
                    "-s".to_string(),
                    format!("{}x{}", width, height),
                    "-r".to_string(),
                    frame_rate.to_string(),
                    "-i".to_string(),
                    "-".to_string(),
                    // Every segment is normalized to one output geometry:
                    // the concat demuxer's stream copy requires identical
                    // codec parameters, resolution included, across all
                    // merge inputs.
                    "-vf".to_string(),
                    format!(
                        "scale={}:{}:force_original_aspect_ratio=decrease,pad={}:{}:(ow-iw)/2:(oh-ih)/2:black",
                        spec.video.width, spec.video.height, spec.video.width, spec.video.height
                    ),
                    "-c:v".to_string(),
                    "libx264".to_string(),
                    "-preset".to_string(),
                    spec.video.quality.h264_preset().to_string(),
                    "-crf".to_string(),
                    spec.video.quality.crf().to_string(),
                    "-pix_fmt".to_string(),
                    "yuv420p".to_string(),
                ]);
            }
            InputSpec::RawAudio {
                sample_rate,
                channels,
            } => {
                args.extend([
                    "-f".to_string(),
                    "s16le".to_string(),
                    "-ar".to_string(),
                    sample_rate.to_string(),
                    "-ac".to_string(),
                    channels.to_string(),
                    "-i".to_string(),
                    "-".to_string(),
                    "-c:a".to_string(),
                    "aac".to_string(),
                ]);
            }
            InputSpec::PreEncoded => {
                args.extend([
                    "-i".to_string(),
                    "-".to_string(),
                    "-c".to_string(),
                    "copy".to_string(),
                ]);
            }
        }

        args.push(spec.output.to_string_lossy().to_string());
        Ok(args)
    }

    /// One concat-demuxer manifest entry, single quotes escaped the way
    /// ffmpeg expects.
    fn manifest_line(path: &Path) -> String {
        format!(
            "file '{}'\n",
            path.to_string_lossy().replace('\'', r"'\''")
        )
    }
}

/// Drain stderr, then wait for the process and resolve the completion
/// signal. Stderr must be consumed first so a chatty encoder can never
/// stall on a full pipe.
async fn supervise(mut child: Child, done: oneshot::Sender<Result<(), EncoderError>>) {
    let mut tail = Vec::new();
    if let Some(mut stderr) = child.stderr.take() {
        let mut buf = [0u8; 1024];
        loop {
            match stderr.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    tail.extend_from_slice(&buf[..n]);
                    if tail.len() > STDERR_TAIL {
                        let cut = tail.len() - STDERR_TAIL;
                        tail.drain(..cut);
                    }
                }
            }
        }
    }

    let result = match child.wait().await {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(match status.code() {
            Some(code) => EncoderError::Exited {
                status: code,
                detail: String::from_utf8_lossy(&tail).trim().to_string(),
            },
            None => EncoderError::Killed,
        }),
        Err(e) => Err(EncoderError::Io(e)),
    };
    let _ = done.send(result);
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn spawn_encoder(&self, spec: &EncoderSpec) -> Result<EncoderHandle, EncoderError> {
        let args = Self::encoder_args(spec)?;
        tracing::debug!(output = %spec.output.display(), "starting ffmpeg encoder: {:?}", args);

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EncoderError::Launch(format!("failed to start ffmpeg: {}", e)))?;

        let stdin = child.stdin.take().ok_or_else(|| {
            EncoderError::Launch("failed to capture ffmpeg stdin".to_string())
        })?;

        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(supervise(child, done_tx));

        Ok(EncoderHandle {
            stdin: Box::new(stdin),
            completion: done_rx,
        })
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), EncoderError> {
        let manifest = output.with_extension("concat.txt");
        let mut listing = String::new();
        for input in inputs {
            listing.push_str(&Self::manifest_line(input));
        }
        tokio::fs::write(&manifest, listing).await?;

        let manifest_arg = manifest.to_string_lossy().to_string();
        let output_arg = output.to_string_lossy().to_string();
        let result = Command::new("ffmpeg")
            .args([
                "-y",
                "-hide_banner",
                "-f",
                "concat",
                "-safe",
                "0",
                "-i",
                manifest_arg.as_str(),
                "-c",
                "copy",
                output_arg.as_str(),
            ])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| EncoderError::Launch(format!("failed to start ffmpeg: {}", e)))?;

        if !result.status.success() {
            // The manifest is left behind on purpose so operators can
            // re-run the concatenation by hand.
            let stderr = String::from_utf8_lossy(&result.stderr).to_string();
            let tail = stderr
                .char_indices()
                .rev()
                .nth(STDERR_TAIL.saturating_sub(1))
                .map(|(i, _)| &stderr[i..])
                .unwrap_or(stderr.as_str());
            return Err(EncoderError::Exited {
                status: result.status.code().unwrap_or(-1),
                detail: tail.trim().to_string(),
            });
        }

        tokio::fs::remove_file(&manifest).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VideoSettings;

    fn spec(input: InputSpec, geometry: GeometryKey) -> EncoderSpec {
        EncoderSpec {
            input,
            geometry,
            video: VideoSettings::default(),
            output: PathBuf::from("/tmp/out.mp4"),
        }
    }

    /// The `-vf` value of an argument list.
    fn scale_filter(args: &[String]) -> String {
        args.windows(2)
            .find_map(|w| (w[0] == "-vf").then(|| w[1].clone()))
            .expect("no -vf in args")
    }

    #[test]
    fn raw_video_args_carry_geometry_and_profile() {
        let args = FfmpegBackend::encoder_args(&spec(
            InputSpec::RawVideo { frame_rate: 30 },
            GeometryKey::Resolution {
                width: 640,
                height: 480,
            },
        ))
        .unwrap();
        assert!(args.windows(2).any(|w| w == ["-f", "rawvideo"]));
        assert!(args.windows(2).any(|w| w == ["-s", "640x480"]));
        assert!(args.windows(2).any(|w| w == ["-r", "30"]));
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        // input resolution only affects the input side; the output is
        // normalized to the configured geometry
        assert!(scale_filter(&args).starts_with("scale=1280:720:"));
        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
    }

    #[test]
    fn rotated_segments_share_one_output_geometry() {
        let small = FfmpegBackend::encoder_args(&spec(
            InputSpec::RawVideo { frame_rate: 30 },
            GeometryKey::Resolution {
                width: 320,
                height: 240,
            },
        ))
        .unwrap();
        let large = FfmpegBackend::encoder_args(&spec(
            InputSpec::RawVideo { frame_rate: 30 },
            GeometryKey::Resolution {
                width: 1920,
                height: 1080,
            },
        ))
        .unwrap();
        // different input sizes, identical output scaling: that is what
        // keeps the stream-copy concat valid
        assert!(small.windows(2).any(|w| w == ["-s", "320x240"]));
        assert!(large.windows(2).any(|w| w == ["-s", "1920x1080"]));
        assert_eq!(scale_filter(&small), scale_filter(&large));
    }

    #[test]
    fn raw_video_rejects_stream_geometry() {
        let result = FfmpegBackend::encoder_args(&spec(
            InputSpec::RawVideo { frame_rate: 30 },
            GeometryKey::Stream,
        ));
        assert!(matches!(result, Err(EncoderError::Launch(_))));
    }

    #[test]
    fn raw_audio_args_describe_pcm_input() {
        let args = FfmpegBackend::encoder_args(&spec(
            InputSpec::RawAudio {
                sample_rate: 48_000,
                channels: 1,
            },
            GeometryKey::Stream,
        ))
        .unwrap();
        assert!(args.windows(2).any(|w| w == ["-f", "s16le"]));
        assert!(args.windows(2).any(|w| w == ["-ar", "48000"]));
        assert!(args.windows(2).any(|w| w == ["-ac", "1"]));
    }

    #[test]
    fn pre_encoded_input_is_stream_copied() {
        let args =
            FfmpegBackend::encoder_args(&spec(InputSpec::PreEncoded, GeometryKey::Stream))
                .unwrap();
        assert!(args.windows(2).any(|w| w == ["-c", "copy"]));
        assert!(!args.iter().any(|a| a == "libx264"));
    }

    #[test]
    fn manifest_lines_escape_quotes() {
        assert_eq!(
            FfmpegBackend::manifest_line(Path::new("/tmp/plain.mp4")),
            "file '/tmp/plain.mp4'\n"
        );
        assert_eq!(
            FfmpegBackend::manifest_line(Path::new("/tmp/it's.mp4")),
            "file '/tmp/it'\\''s.mp4'\n"
        );
    }
}
