//! Seams to the external AI providers used by the pipeline.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// A timed piece of transcribed speech, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transcript {
    pub text: String,
    pub segments: Vec<Segment>,
    pub language: Option<String>,
}

impl Transcript {
    /// Render as `[m:ss - m:ss] -> text` lines, or the plain text when the
    /// backend returned no segments.
    pub fn timestamped(&self) -> String {
        if self.segments.is_empty() {
            return self.text.trim().to_string();
        }
        self.segments
            .iter()
            .map(|s| {
                format!(
                    "[{} - {}] -> {}",
                    clock(s.start),
                    clock(s.end),
                    s.text.trim()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// A chat-style prompt for the generation model.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Speech to text. Output is English regardless of the spoken language.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        language: Option<&str>,
    ) -> Result<Transcript, BackendError>;
}

/// Image understanding, used in place of transcription for still images.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn describe(&self, image: &[u8]) -> Result<String, BackendError>;
}

/// Text generation for captions, descriptions and hashtags.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String, BackendError>;
}

/// Failure of an external AI call, split by whether a retry can help.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("transient backend failure: {0}")]
    Transient(String),

    #[error("{0}")]
    Fatal(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }

    /// Timeouts and connection failures are transient, everything else is not.
    pub fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            BackendError::Transient(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status, &err.to_string())
        } else {
            BackendError::Fatal(err.to_string())
        }
    }

    /// Rate limiting and server errors are transient.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        let message = format!("backend returned {status}: {snippet}");
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            BackendError::Transient(message)
        } else {
            BackendError::Fatal(message)
        }
    }
}
