//! External encoder boundary.
//!
//! Everything that touches the encoding tool lives behind [`MediaBackend`],
//! so the rest of the pipeline only ever sees a byte sink and a completion
//! signal per subprocess.

pub mod ffmpeg;

pub use ffmpeg::FfmpegBackend;

use crate::config::VideoSettings;
use crate::media::{GeometryKey, InputSpec};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::sync::oneshot;

/// Errors reported from the encoder subprocess boundary.
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("failed to launch encoder: {0}")]
    Launch(String),

    #[error("encoder exited with status {status}: {detail}")]
    Exited { status: i32, detail: String },

    #[error("encoder terminated by signal")]
    Killed,

    #[error("encoder terminated without reporting a status")]
    Vanished,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything needed to start one encoding subprocess.
#[derive(Debug, Clone)]
pub struct EncoderSpec {
    pub input: InputSpec,
    pub geometry: GeometryKey,
    pub video: VideoSettings,
    pub output: PathBuf,
}

/// A running encoder: the write end of its input pipe plus a completion
/// signal that resolves exactly once when the process settles. Closing
/// the input is the only sanctioned way to make the process complete.
pub struct EncoderHandle {
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub completion: oneshot::Receiver<Result<(), EncoderError>>,
}

/// Boundary to the external encoding tool.
#[async_trait]
pub trait MediaBackend: Send + Sync + 'static {
    /// Launch one encoder subprocess writing to `spec.output`.
    async fn spawn_encoder(&self, spec: &EncoderSpec) -> Result<EncoderHandle, EncoderError>;

    /// Losslessly concatenate `inputs`, in the given order, into `output`.
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), EncoderError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashSet;
    use tokio::io::AsyncWriteExt;

    /// Test backend that pipes encoder input straight into the output file
    /// and completes on end-of-input, mimicking the external tool's
    /// contract without spawning anything.
    #[derive(Default)]
    pub struct RelayBackend {
        /// Geometries whose jobs report failure after end-of-input.
        pub fail_geometries: HashSet<String>,
        /// Geometries whose jobs refuse to launch at all.
        pub refuse_geometries: HashSet<String>,
        /// Make `concat` fail.
        pub fail_concat: bool,
    }

    impl RelayBackend {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl MediaBackend for RelayBackend {
        async fn spawn_encoder(&self, spec: &EncoderSpec) -> Result<EncoderHandle, EncoderError> {
            if self.refuse_geometries.contains(&spec.geometry.to_string()) {
                return Err(EncoderError::Launch("refused by test backend".to_string()));
            }
            let mut file = tokio::fs::File::create(&spec.output).await?;
            let fail = self.fail_geometries.contains(&spec.geometry.to_string());
            let (stdin, mut sink) = tokio::io::duplex(64 * 1024);
            let (done_tx, done_rx) = oneshot::channel();
            tokio::spawn(async move {
                let copied = async {
                    tokio::io::copy(&mut sink, &mut file).await?;
                    file.flush().await
                }
                .await;
                let result = match (copied, fail) {
                    (Ok(_), false) => Ok(()),
                    (Ok(_), true) => Err(EncoderError::Exited {
                        status: 1,
                        detail: "synthetic encoder failure".to_string(),
                    }),
                    (Err(e), _) => Err(EncoderError::Io(e)),
                };
                let _ = done_tx.send(result);
            });
            Ok(EncoderHandle {
                stdin: Box::new(stdin),
                completion: done_rx,
            })
        }

        async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), EncoderError> {
            if self.fail_concat {
                return Err(EncoderError::Exited {
                    status: 1,
                    detail: "synthetic concat failure".to_string(),
                });
            }
            let mut merged = Vec::new();
            for input in inputs {
                merged.extend(tokio::fs::read(input).await?);
            }
            tokio::fs::write(output, merged).await?;
            Ok(())
        }
    }
}
