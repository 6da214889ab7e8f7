//! Worker pipeline: drives one claimed job through
//! intake, extract, transcribe, generate and finalize.
//!
//! Each stage re-checks the stored status before it starts, writes a progress
//! checkpoint when it succeeds and fails the job with its own [`ErrorCode`]
//! otherwise. Retries are described per stage by a [`StagePolicy`].

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::models::job::{ErrorCode, Job, JobStatus};
use crate::services::ai::{ContentGenerator, Transcriber, VisionAnalyzer};
use crate::services::ffmpeg::AudioExtractor;
use crate::services::storage::ArtifactStore;
use crate::store::{Claim, JobStore, StoreError};

mod policy;
mod stages;

pub use policy::{attempt_stage, Stage, StageError, StagePolicy};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pause between attempts of a retryable stage.
    pub retry_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// Why a delivery did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The job had already finished when the delivery arrived.
    AlreadyTerminal(JobStatus),
    /// Another worker holds the job.
    InProgress,
    Missing,
    /// Another writer finished the job while this run was in flight.
    Superseded(JobStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed(ErrorCode),
    Skipped(SkipReason),
}

/// Infrastructure failures that leave the job without a recorded outcome.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Could not claim job {id}: {source}")]
    Claim { id: Uuid, source: StoreError },

    #[error("Could not record failure of job {id}: {source}")]
    RecordFailure { id: Uuid, source: StoreError },
}

impl PipelineError {
    /// Whether a fresh delivery of the same message can make progress.
    /// A failed claim leaves the job `pending`; a failed failure write leaves
    /// it `processing`, where redelivery would only be skipped.
    pub fn is_redeliverable(&self) -> bool {
        matches!(self, PipelineError::Claim { .. })
    }
}

/// Attempts at writing a job's failure before giving up on the run.
const FAILURE_WRITE_ATTEMPTS: u32 = 3;

enum Interrupt {
    Failed(Stage, StageError),
    Superseded(JobStatus),
}

pub struct Pipeline {
    store: Arc<JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
    extractor: Arc<dyn AudioExtractor>,
    transcriber: Arc<dyn Transcriber>,
    vision: Arc<dyn VisionAnalyzer>,
    generator: Arc<dyn ContentGenerator>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<JobStore>,
        artifacts: Arc<dyn ArtifactStore>,
        extractor: Arc<dyn AudioExtractor>,
        transcriber: Arc<dyn Transcriber>,
        vision: Arc<dyn VisionAnalyzer>,
        generator: Arc<dyn ContentGenerator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            artifacts,
            extractor,
            transcriber,
            vision,
            generator,
            config,
        }
    }

    /// Process one delivery of `job_id`.
    ///
    /// Deliveries for jobs that are missing, finished or already claimed
    /// return [`RunOutcome::Skipped`] without calling any backend.
    pub async fn run(&self, job_id: Uuid) -> Result<RunOutcome, PipelineError> {
        let claim = self
            .store
            .claim(job_id)
            .await
            .map_err(|source| PipelineError::Claim { id: job_id, source })?;

        let job = match claim {
            Claim::Claimed(job) => job,
            Claim::Terminal(job) => {
                tracing::info!(job_id = %job_id, status = %job.status, "Job already finished, skipping delivery");
                return Ok(RunOutcome::Skipped(SkipReason::AlreadyTerminal(job.status)));
            }
            Claim::InProgress => {
                tracing::info!(job_id = %job_id, "Job is held by another worker, skipping delivery");
                return Ok(RunOutcome::Skipped(SkipReason::InProgress));
            }
            Claim::Missing => {
                tracing::warn!(job_id = %job_id, "Dispatched job does not exist");
                return Ok(RunOutcome::Skipped(SkipReason::Missing));
            }
        };

        tracing::info!(
            job_id = %job.id,
            kind = %job.input.media_kind,
            filename = %job.input.original_filename,
            "Processing job"
        );

        match self.drive(&job).await {
            Ok(done) => {
                metrics::counter!("media_jobs_completed_total").increment(1);
                tracing::info!(
                    job_id = %done.id,
                    hashtags = done.result.as_ref().map_or(0, |r| r.hashtags.len()),
                    processing_seconds = ?done.processing_seconds(),
                    "Job completed"
                );
                Ok(RunOutcome::Completed)
            }
            Err(Interrupt::Superseded(status)) => {
                tracing::info!(job_id = %job.id, status = %status, "Job finished elsewhere, abandoning run");
                Ok(RunOutcome::Skipped(SkipReason::Superseded(status)))
            }
            Err(Interrupt::Failed(stage, err)) => self.record_failure(&job, stage, err).await,
        }
    }

    async fn drive(&self, job: &Job) -> Result<Job, Interrupt> {
        let input = self
            .stage(job.id, Stage::Intake, |_| self.load_input(job))
            .await?;

        let converted = self
            .stage(job.id, Stage::Extract, |_| self.extract(job, &input))
            .await?;
        let media = converted.unwrap_or(input);

        let analysis = self
            .stage(job.id, Stage::Transcribe, |_| self.analyze(job, &media))
            .await?;

        let generated = self
            .stage(job.id, Stage::Generate, |_| self.generate(job, &analysis))
            .await?;

        let result = stages::assemble(analysis, generated);
        self.stage(job.id, Stage::Finalize, |_| self.finalize(job.id, &result))
            .await?
            .map_err(Interrupt::Superseded)
    }

    /// Status re-check, entry checkpoint, attempts under the stage policy,
    /// exit checkpoint.
    async fn stage<T, F, Fut>(&self, job_id: Uuid, stage: Stage, op: F) -> Result<T, Interrupt>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        self.ensure_active(job_id, stage).await?;

        if let Some(progress) = stage.entry_checkpoint() {
            self.checkpoint(job_id, stage, progress).await?;
        }

        let started = Instant::now();
        let outcome = attempt_stage(stage, stage.policy(), self.config.retry_backoff, op).await;
        metrics::histogram!("media_job_stage_seconds", "stage" => stage.to_string())
            .record(started.elapsed().as_secs_f64());

        let value = outcome.map_err(|err| Interrupt::Failed(stage, err))?;

        // Finalize reaches 100 through `complete`.
        if stage != Stage::Finalize {
            self.checkpoint(job_id, stage, stage.checkpoint()).await?;
        }

        tracing::debug!(job_id = %job_id, stage = %stage, "Stage finished");
        Ok(value)
    }

    async fn ensure_active(&self, job_id: Uuid, stage: Stage) -> Result<(), Interrupt> {
        match self.store.current(job_id).await {
            Ok(job) if job.status.is_terminal() => Err(Interrupt::Superseded(job.status)),
            Ok(_) => Ok(()),
            Err(e) => Err(Interrupt::Failed(
                stage,
                StageError::fatal(
                    ErrorCode::StorageError,
                    format!("could not re-read job state: {e}"),
                ),
            )),
        }
    }

    async fn checkpoint(&self, job_id: Uuid, stage: Stage, progress: u8) -> Result<(), Interrupt> {
        self.store
            .update_progress(job_id, progress)
            .await
            .map_err(|e| {
                Interrupt::Failed(
                    stage,
                    StageError::fatal(
                        ErrorCode::StorageError,
                        format!("could not record progress {progress}: {e}"),
                    ),
                )
            })
    }

    async fn record_failure(
        &self,
        job: &Job,
        stage: Stage,
        err: StageError,
    ) -> Result<RunOutcome, PipelineError> {
        let reason = if err.message.trim().is_empty() {
            "unknown error"
        } else {
            err.message.trim()
        };
        let message = format!("{stage} stage failed: {reason}");

        tracing::error!(
            job_id = %job.id,
            stage = %stage,
            code = %err.code,
            error = %reason,
            "Job failed"
        );

        let mut attempt = 1;
        loop {
            match self.store.fail(job.id, err.code, message.as_str()).await {
                Ok(_) => {
                    metrics::counter!("media_jobs_failed_total", "code" => err.code.to_string())
                        .increment(1);
                    return Ok(RunOutcome::Failed(err.code));
                }
                Err(StoreError::AlreadyTerminal { status, .. }) => {
                    return Ok(RunOutcome::Skipped(SkipReason::Superseded(status)));
                }
                Err(source) if attempt >= FAILURE_WRITE_ATTEMPTS => {
                    return Err(PipelineError::RecordFailure { id: job.id, source });
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %job.id,
                        attempt,
                        error = %e,
                        "Could not record job failure, retrying"
                    );
                    attempt += 1;
                    if !self.config.retry_backoff.is_zero() {
                        tokio::time::sleep(self.config.retry_backoff).await;
                    }
                }
            }
        }
    }
}
