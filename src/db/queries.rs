use std::str::FromStr;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::{
    ClientId, ErrorCode, InputDescriptor, Job, JobError, JobStatus, MediaKind, NewJob, Outcome,
    UserId,
};
use crate::store::RepositoryError;

const JOB_COLUMNS: &str = r#"
    id, user_id, client_id, status, progress, artifact_key, media_kind,
    original_filename, content_type, options, converted_audio_key, result,
    error_code, error_message, created_at, updated_at, started_at, completed_at
"#;

/// Insert a new pending job
pub async fn create_job(pool: &PgPool, job: &NewJob) -> Result<Job, RepositoryError> {
    let options =
        serde_json::to_value(&job.options).map_err(|e| RepositoryError::Corrupt(e.to_string()))?;

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO media_jobs
            (id, user_id, client_id, status, progress, artifact_key, media_kind,
             original_filename, content_type, options)
        VALUES ($1, $2, $3, 'pending', 0, $4, $5, $6, $7, $8)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job.id)
    .bind(job.owner)
    .bind(job.client_id)
    .bind(&job.input.artifact_key)
    .bind(job.input.media_kind.to_string())
    .bind(&job.input.original_filename)
    .bind(job.input.content_type.as_deref())
    .bind(options)
    .fetch_one(pool)
    .await?;

    job_from_row(&row)
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM media_jobs WHERE id = $1"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// List a user's jobs, newest first
pub async fn list_jobs(
    pool: &PgPool,
    owner: UserId,
    client_id: Option<ClientId>,
) -> Result<Vec<Job>, RepositoryError> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM media_jobs
        WHERE user_id = $1
          AND ($2::BIGINT IS NULL OR client_id = $2)
        ORDER BY created_at DESC
        "#
    ))
    .bind(owner)
    .bind(client_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Move a pending job to processing. Returns `None` when the job was not pending.
pub async fn claim_job(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, RepositoryError> {
    let row = sqlx::query(&format!(
        r#"
        UPDATE media_jobs
        SET status = 'processing',
            started_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Write a progress checkpoint if the job is active and progress does not regress.
/// Returns whether a row was updated.
pub async fn advance_progress(
    pool: &PgPool,
    job_id: Uuid,
    progress: u8,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r#"
        UPDATE media_jobs
        SET progress = $2,
            status = 'processing',
            started_at = COALESCE(started_at, NOW()),
            updated_at = NOW()
        WHERE id = $1
          AND status IN ('pending', 'processing')
          AND progress <= $2
        "#,
    )
    .bind(job_id)
    .bind(i16::from(progress))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Current status and progress, used to explain a rejected conditional write
pub async fn get_job_state(
    pool: &PgPool,
    job_id: Uuid,
) -> Result<Option<(JobStatus, u8)>, RepositoryError> {
    let row = sqlx::query("SELECT status, progress FROM media_jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(r) => {
            let status = parse_status(&r.try_get::<String, _>("status")?)?;
            let progress = progress_from_db(r.try_get("progress")?)?;
            Ok(Some((status, progress)))
        }
        None => Ok(None),
    }
}

/// Store a terminal outcome if the job is still active.
pub async fn finish_job(
    pool: &PgPool,
    job_id: Uuid,
    outcome: &Outcome,
) -> Result<Option<Job>, RepositoryError> {
    let (result, error_code, error_message) = match outcome {
        Outcome::Completed(result) => (
            Some(serde_json::to_value(result).map_err(|e| RepositoryError::Corrupt(e.to_string()))?),
            None,
            None,
        ),
        Outcome::Failed(error) => (
            None,
            Some(error.code.to_string()),
            Some(error.message.as_str()),
        ),
    };

    let row = sqlx::query(&format!(
        r#"
        UPDATE media_jobs
        SET status = $2,
            progress = CASE WHEN $2 = 'completed' THEN 100 ELSE progress END,
            result = $3,
            error_code = $4,
            error_message = $5,
            started_at = COALESCE(started_at, NOW()),
            completed_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status IN ('pending', 'processing')
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job_id)
    .bind(outcome.status().to_string())
    .bind(result)
    .bind(error_code)
    .bind(error_message)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Record where the extracted audio track of a video job was stored
pub async fn set_converted_audio(
    pool: &PgPool,
    job_id: Uuid,
    key: &str,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        UPDATE media_jobs
        SET converted_audio_key = $2,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(key)
    .execute(pool)
    .await?;

    Ok(())
}

fn job_from_row(r: &PgRow) -> Result<Job, RepositoryError> {
    let status = parse_status(&r.try_get::<String, _>("status")?)?;
    let media_kind: String = r.try_get("media_kind")?;
    let media_kind = MediaKind::from_str(&media_kind)
        .map_err(|_| RepositoryError::Corrupt(format!("unknown media kind '{media_kind}'")))?;

    let options: serde_json::Value = r.try_get("options")?;
    let options =
        serde_json::from_value(options).map_err(|e| RepositoryError::Corrupt(e.to_string()))?;

    let result: Option<serde_json::Value> = r.try_get("result")?;
    let result = result
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;

    let error_code: Option<String> = r.try_get("error_code")?;
    let error_message: Option<String> = r.try_get("error_message")?;
    let error = match error_code {
        Some(code) => Some(JobError {
            code: ErrorCode::from_str(&code)
                .map_err(|_| RepositoryError::Corrupt(format!("unknown error code '{code}'")))?,
            message: error_message.unwrap_or_default(),
        }),
        None => None,
    };

    Ok(Job {
        id: r.try_get("id")?,
        owner: r.try_get("user_id")?,
        client_id: r.try_get("client_id")?,
        status,
        progress: progress_from_db(r.try_get("progress")?)?,
        input: InputDescriptor {
            artifact_key: r.try_get("artifact_key")?,
            media_kind,
            original_filename: r.try_get("original_filename")?,
            content_type: r.try_get("content_type")?,
        },
        options,
        converted_audio_key: r.try_get("converted_audio_key")?,
        result,
        error,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
        started_at: r.try_get("started_at")?,
        completed_at: r.try_get("completed_at")?,
    })
}

fn parse_status(raw: &str) -> Result<JobStatus, RepositoryError> {
    JobStatus::from_str(raw)
        .map_err(|_| RepositoryError::Corrupt(format!("unknown job status '{raw}'")))
}

fn progress_from_db(raw: i16) -> Result<u8, RepositoryError> {
    u8::try_from(raw)
        .ok()
        .filter(|p| *p <= 100)
        .ok_or_else(|| RepositoryError::Corrupt(format!("progress out of range: {raw}")))
}
