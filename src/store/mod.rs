//! Job record store.
//!
//! [`JobStore`] enforces the job lifecycle rules on top of a [`JobRepository`],
//! which supplies atomic conditional writes. Two repositories are provided:
//!
//! - [`PgJobRepository`] - Postgres, conditional `UPDATE ... RETURNING`
//! - [`MemoryJobRepository`] - single-process map, for tests and local runs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use garde::Validate;
use uuid::Uuid;

use crate::models::job::{
    ClientId, ErrorCode, InputDescriptor, Job, JobError, JobOptions, JobResult, JobStatus, NewJob,
    Outcome, UserId,
};
use crate::services::access::{check_client_owner, AccessError, ClientDirectory, GateError};

mod memory;
mod postgres;

pub use memory::MemoryJobRepository;
pub use postgres::PgJobRepository;

/// Result of trying to move a job from `pending` to `processing`.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    Claimed(Job),
    Terminal(Job),
    InProgress,
    Missing,
}

/// Result of a conditional progress write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Updated,
    Terminal,
    Regressed { current: u8 },
    Missing,
}

/// Result of a conditional terminal write.
#[derive(Debug, Clone, PartialEq)]
pub enum Finish {
    Finished(Job),
    AlreadyTerminal(JobStatus),
    Missing,
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored job is malformed: {0}")]
    Corrupt(String),
}

/// Persistence backend for job records. Every write is conditional on the
/// current stored status and must be atomic with respect to other writers.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: NewJob) -> Result<Job, RepositoryError>;

    async fn find(&self, id: Uuid) -> Result<Option<Job>, RepositoryError>;

    /// Jobs of `owner`, newest first, optionally restricted to one client.
    async fn list(
        &self,
        owner: UserId,
        client_id: Option<ClientId>,
    ) -> Result<Vec<Job>, RepositoryError>;

    async fn claim(&self, id: Uuid) -> Result<Claim, RepositoryError>;

    async fn advance(&self, id: Uuid, progress: u8) -> Result<Advance, RepositoryError>;

    async fn finish(&self, id: Uuid, outcome: Outcome) -> Result<Finish, RepositoryError>;

    async fn attach_converted_audio(&self, id: Uuid, key: &str) -> Result<(), RepositoryError>;

    async fn ping(&self) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("Job not found")]
    NotFound,

    #[error("Job {id} is already {status}")]
    AlreadyTerminal { id: Uuid, status: JobStatus },

    #[error("Progress cannot move from {current} to {requested}")]
    ProgressRegression { current: u8, requested: u8 },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Access(#[from] AccessError),
}

/// The single source of truth for job state.
pub struct JobStore {
    repo: Arc<dyn JobRepository>,
    clients: Arc<dyn ClientDirectory>,
}

impl JobStore {
    pub fn new(repo: Arc<dyn JobRepository>, clients: Arc<dyn ClientDirectory>) -> Self {
        Self { repo, clients }
    }

    /// Create a `pending` job. Options are re-validated here so no invalid
    /// snapshot can be persisted regardless of the caller.
    pub async fn create(
        &self,
        owner: UserId,
        client_id: Option<ClientId>,
        input: InputDescriptor,
        options: JobOptions,
    ) -> Result<Job, StoreError> {
        options
            .validate()
            .map_err(|report| StoreError::Validation(report.to_string()))?;

        let job = self
            .repo
            .insert(NewJob {
                id: Uuid::new_v4(),
                owner,
                client_id,
                input,
                options,
            })
            .await?;

        tracing::info!(job_id = %job.id, owner, kind = %job.input.media_kind, "Created job");
        Ok(job)
    }

    /// Owner-scoped read. Jobs owned by someone else are reported as missing.
    pub async fn get(&self, id: Uuid, requesting_owner: UserId) -> Result<Job, StoreError> {
        match self.repo.find(id).await? {
            Some(job) if job.owner == requesting_owner => Ok(job),
            _ => Err(StoreError::NotFound),
        }
    }

    pub async fn list(
        &self,
        requesting_owner: UserId,
        client_id: Option<ClientId>,
    ) -> Result<Vec<Job>, StoreError> {
        if let Some(client_id) = client_id {
            check_client_owner(self.clients.as_ref(), requesting_owner, client_id)
                .await
                .map_err(|e| match e {
                    GateError::Denied(denial) => StoreError::Validation(denial.to_string()),
                    GateError::Lookup(e) => StoreError::Access(e),
                })?;
        }

        Ok(self.repo.list(requesting_owner, client_id).await?)
    }

    /// Unscoped read used by workers.
    pub async fn current(&self, id: Uuid) -> Result<Job, StoreError> {
        self.repo.find(id).await?.ok_or(StoreError::NotFound)
    }

    pub async fn claim(&self, id: Uuid) -> Result<Claim, StoreError> {
        Ok(self.repo.claim(id).await?)
    }

    /// Record a checkpoint. Writes against terminal jobs are ignored.
    pub async fn update_progress(&self, id: Uuid, progress: u8) -> Result<(), StoreError> {
        if progress >= 100 {
            return Err(StoreError::Validation(
                "progress 100 is only reached by completing the job".to_string(),
            ));
        }

        match self.repo.advance(id, progress).await? {
            Advance::Updated => Ok(()),
            Advance::Terminal => {
                tracing::debug!(job_id = %id, progress, "Ignoring progress for terminal job");
                Ok(())
            }
            Advance::Regressed { current } => Err(StoreError::ProgressRegression {
                current,
                requested: progress,
            }),
            Advance::Missing => Err(StoreError::NotFound),
        }
    }

    pub async fn complete(&self, id: Uuid, result: JobResult) -> Result<Job, StoreError> {
        self.finish(id, Outcome::Completed(result)).await
    }

    pub async fn fail(
        &self,
        id: Uuid,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Result<Job, StoreError> {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = format!("Job failed with {code}");
        }
        self.finish(id, Outcome::Failed(JobError { code, message }))
            .await
    }

    pub async fn attach_converted_audio(&self, id: Uuid, key: &str) -> Result<(), StoreError> {
        Ok(self.repo.attach_converted_audio(id, key).await?)
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        Ok(self.repo.ping().await?)
    }

    async fn finish(&self, id: Uuid, outcome: Outcome) -> Result<Job, StoreError> {
        let status = outcome.status();
        match self.repo.finish(id, outcome).await? {
            Finish::Finished(job) => {
                tracing::info!(
                    job_id = %id,
                    status = %status,
                    elapsed_ms = (Utc::now() - job.created_at).num_milliseconds(),
                    "Job reached terminal state"
                );
                Ok(job)
            }
            Finish::AlreadyTerminal(status) => Err(StoreError::AlreadyTerminal { id, status }),
            Finish::Missing => Err(StoreError::NotFound),
        }
    }
}
