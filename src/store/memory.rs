//! In-memory job repository for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Advance, Claim, Finish, JobRepository, RepositoryError};
use crate::models::job::{ClientId, Job, JobStatus, NewJob, Outcome, UserId};

/// Job records kept in a map behind one lock.
///
/// Every conditional transition is evaluated while the lock is held, which
/// gives the same atomicity as a conditional `UPDATE` in Postgres.
///
/// Cloning creates a new handle to the **same** underlying records.
#[derive(Clone, Default)]
pub struct MemoryJobRepository {
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn insert(&self, new: NewJob) -> Result<Job, RepositoryError> {
        let job = Job::new(new, Utc::now());
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.id) {
            return Err(RepositoryError::Corrupt(format!("duplicate job id {}", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Job>, RepositoryError> {
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn list(
        &self,
        owner: UserId,
        client_id: Option<ClientId>,
    ) -> Result<Vec<Job>, RepositoryError> {
        let jobs = self.jobs.lock().await;
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|job| job.owner == owner)
            .filter(|job| client_id.is_none() || job.client_id == client_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn claim(&self, id: Uuid) -> Result<Claim, RepositoryError> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(Claim::Missing);
        };

        Ok(match job.status {
            JobStatus::Pending => {
                let now = Utc::now();
                job.status = JobStatus::Processing;
                job.started_at = Some(now);
                job.updated_at = now;
                Claim::Claimed(job.clone())
            }
            JobStatus::Processing => Claim::InProgress,
            JobStatus::Completed | JobStatus::Failed => Claim::Terminal(job.clone()),
        })
    }

    async fn advance(&self, id: Uuid, progress: u8) -> Result<Advance, RepositoryError> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(Advance::Missing);
        };

        if job.status.is_terminal() {
            return Ok(Advance::Terminal);
        }
        if progress < job.progress {
            return Ok(Advance::Regressed {
                current: job.progress,
            });
        }

        let now = Utc::now();
        if job.status == JobStatus::Pending {
            job.status = JobStatus::Processing;
            job.started_at.get_or_insert(now);
        }
        job.progress = progress;
        job.updated_at = now;
        Ok(Advance::Updated)
    }

    async fn finish(&self, id: Uuid, outcome: Outcome) -> Result<Finish, RepositoryError> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(Finish::Missing);
        };

        if job.status.is_terminal() {
            return Ok(Finish::AlreadyTerminal(job.status));
        }

        let now = Utc::now();
        match outcome {
            Outcome::Completed(result) => {
                job.status = JobStatus::Completed;
                job.progress = 100;
                job.result = Some(result);
            }
            Outcome::Failed(error) => {
                job.status = JobStatus::Failed;
                job.error = Some(error);
            }
        }
        job.started_at.get_or_insert(now);
        job.completed_at = Some(now);
        job.updated_at = now;
        Ok(Finish::Finished(job.clone()))
    }

    async fn attach_converted_audio(&self, id: Uuid, key: &str) -> Result<(), RepositoryError> {
        if let Some(job) = self.jobs.lock().await.get_mut(&id) {
            job.converted_audio_key = Some(key.to_string());
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
