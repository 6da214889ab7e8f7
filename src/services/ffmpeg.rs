//! Audio track extraction from video uploads.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

/// Converts a video container into an mp3 audio track.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract_audio(&self, video: &[u8], extension: &str) -> Result<Vec<u8>, ExtractError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to run ffmpeg: {0}")]
    Io(#[from] std::io::Error),

    #[error("conversion timed out after {0}s")]
    Timeout(u64),

    #[error("ffmpeg exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("ffmpeg produced no audio")]
    EmptyOutput,
}

/// Runs the `ffmpeg` binary in a scratch directory.
pub struct FfmpegExtractor {
    binary: PathBuf,
    scratch_dir: PathBuf,
    timeout: Duration,
}

impl FfmpegExtractor {
    pub fn new(binary: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            scratch_dir: scratch_dir.into(),
            timeout,
        }
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<Vec<u8>, ExtractError> {
        let child = Command::new(&self.binary)
            .arg("-i")
            .arg(input)
            .args(["-vn", "-acodec", "libmp3lame", "-ab", "192k", "-ar", "44100", "-y"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExtractError::Timeout(self.timeout.as_secs()))??;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(3)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join(" | ");
            return Err(ExtractError::Failed {
                status: result.status.to_string(),
                stderr: tail,
            });
        }

        let audio = tokio::fs::read(output).await?;
        if audio.is_empty() {
            return Err(ExtractError::EmptyOutput);
        }
        Ok(audio)
    }
}

#[async_trait]
impl AudioExtractor for FfmpegExtractor {
    async fn extract_audio(&self, video: &[u8], extension: &str) -> Result<Vec<u8>, ExtractError> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;

        let stem = Uuid::new_v4();
        let extension: String = extension
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let input = self.scratch_dir.join(format!("{stem}.{extension}"));
        let output = self.scratch_dir.join(format!("{stem}.mp3"));

        tokio::fs::write(&input, video).await?;
        tracing::debug!(input = %input.display(), "Extracting audio track with ffmpeg");

        let result = self.convert(&input, &output).await;

        let _ = tokio::fs::remove_file(&input).await;
        let _ = tokio::fs::remove_file(&output).await;

        result
    }
}
