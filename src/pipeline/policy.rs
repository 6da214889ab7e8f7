//! Per-stage retry policy and the executor that applies it.

use std::future::Future;
use std::time::Duration;

use strum::Display;

use crate::models::job::ErrorCode;
use crate::services::ai::BackendError;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Intake,
    Extract,
    Transcribe,
    Generate,
    Finalize,
}

impl Stage {
    /// Progress written when the stage starts, if any.
    pub fn entry_checkpoint(self) -> Option<u8> {
        match self {
            Stage::Extract => Some(20),
            _ => None,
        }
    }

    /// Progress written when the stage succeeds.
    pub fn checkpoint(self) -> u8 {
        match self {
            Stage::Intake => 10,
            Stage::Extract => 40,
            Stage::Transcribe => 70,
            Stage::Generate => 90,
            Stage::Finalize => 100,
        }
    }

    pub fn policy(self) -> StagePolicy {
        match self {
            Stage::Transcribe | Stage::Generate => StagePolicy::retry_transient(2),
            Stage::Intake | Stage::Extract | Stage::Finalize => StagePolicy::single(),
        }
    }
}

/// Failure of one stage attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct StageError {
    pub code: ErrorCode,
    pub message: String,
    pub transient: bool,
}

impl StageError {
    pub fn fatal(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            transient: true,
        }
    }

    pub fn from_backend(code: ErrorCode, err: BackendError) -> Self {
        let transient = err.is_transient();
        Self {
            code,
            message: err.to_string(),
            transient,
        }
    }
}

/// How many times a stage may run and which failures justify another try.
#[derive(Debug, Clone, Copy)]
pub struct StagePolicy {
    pub max_attempts: u32,
    pub retryable: fn(&StageError) -> bool,
}

fn never(_: &StageError) -> bool {
    false
}

fn when_transient(err: &StageError) -> bool {
    err.transient
}

impl StagePolicy {
    pub fn single() -> Self {
        Self {
            max_attempts: 1,
            retryable: never,
        }
    }

    pub fn retry_transient(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            retryable: when_transient,
        }
    }
}

/// Run `op` under `policy`, sleeping `backoff` between attempts.
///
/// `op` receives the 1-based attempt number.
pub async fn attempt_stage<T, F, Fut>(
    stage: Stage,
    policy: StagePolicy,
    backoff: Duration,
    mut op: F,
) -> Result<T, StageError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, StageError>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && (policy.retryable)(&err) => {
                tracing::warn!(
                    stage = %stage,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    "Stage attempt failed, retrying"
                );
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
