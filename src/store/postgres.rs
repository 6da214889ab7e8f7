use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Advance, Claim, Finish, JobRepository, RepositoryError};
use crate::db::queries;
use crate::models::job::{ClientId, Job, NewJob, Outcome, UserId};

/// Job repository backed by the `media_jobs` table.
#[derive(Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn insert(&self, job: NewJob) -> Result<Job, RepositoryError> {
        queries::create_job(&self.pool, &job).await
    }

    async fn find(&self, id: Uuid) -> Result<Option<Job>, RepositoryError> {
        queries::get_job(&self.pool, id).await
    }

    async fn list(
        &self,
        owner: UserId,
        client_id: Option<ClientId>,
    ) -> Result<Vec<Job>, RepositoryError> {
        queries::list_jobs(&self.pool, owner, client_id).await
    }

    async fn claim(&self, id: Uuid) -> Result<Claim, RepositoryError> {
        if let Some(job) = queries::claim_job(&self.pool, id).await? {
            return Ok(Claim::Claimed(job));
        }

        // Not pending: find out why without mutating anything.
        Ok(match queries::get_job(&self.pool, id).await? {
            None => Claim::Missing,
            Some(job) if job.status.is_terminal() => Claim::Terminal(job),
            Some(_) => Claim::InProgress,
        })
    }

    async fn advance(&self, id: Uuid, progress: u8) -> Result<Advance, RepositoryError> {
        if queries::advance_progress(&self.pool, id, progress).await? {
            return Ok(Advance::Updated);
        }

        Ok(match queries::get_job_state(&self.pool, id).await? {
            None => Advance::Missing,
            Some((status, _)) if status.is_terminal() => Advance::Terminal,
            Some((_, current)) => Advance::Regressed { current },
        })
    }

    async fn finish(&self, id: Uuid, outcome: Outcome) -> Result<Finish, RepositoryError> {
        if let Some(job) = queries::finish_job(&self.pool, id, &outcome).await? {
            return Ok(Finish::Finished(job));
        }

        Ok(match queries::get_job_state(&self.pool, id).await? {
            None => Finish::Missing,
            Some((status, _)) => Finish::AlreadyTerminal(status),
        })
    }

    async fn attach_converted_audio(&self, id: Uuid, key: &str) -> Result<(), RepositoryError> {
        queries::set_converted_audio(&self.pool, id, key).await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
