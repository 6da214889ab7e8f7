use std::path::Path as FsPath;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::Caller;
use crate::error::{ApiError, ApiResult};
use crate::models::job::{ErrorCode, InputDescriptor, JobStatus, JobView, MediaKind};
use crate::models::upload::{parse_client_id, UploadFields, UploadResponse};
use crate::services::queue::DispatchMessage;
use crate::services::storage::StorageError;

const AUDIO_NOT_READY: &str = "Audio file not found or conversion not complete";

struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    data: Vec<u8>,
}

async fn read_upload(mut multipart: Multipart) -> ApiResult<(Option<UploadedFile>, UploadFields)> {
    let mut file = None;
    let mut fields = UploadFields::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await?.to_vec();
            file = Some(UploadedFile {
                filename,
                content_type,
                data,
            });
        } else {
            let value = field.text().await?;
            fields.set(&name, value);
        }
    }

    Ok((file, fields))
}

/// POST /transcribe/upload: accept a media file and queue a content job.
pub async fn upload(
    State(state): State<AppState>,
    caller: Caller,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    // Reject anonymous callers before buffering the body.
    caller.require()?;

    let (file, fields) = read_upload(multipart?).await?;

    let client_id = fields.client_id().map_err(ApiError::BadRequest)?;
    let owner = state.gate.authorize(caller.user_id, client_id).await?;

    let file = file.ok_or_else(|| ApiError::BadRequest("No file provided".into()))?;
    if file.data.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".into()));
    }
    let media_kind = MediaKind::detect(&file.filename, file.content_type.as_deref())
        .ok_or_else(|| {
            ApiError::BadRequest(
                "Unsupported file type. Upload an audio, video or image file".into(),
            )
        })?;
    let options = fields.options().map_err(ApiError::BadRequest)?;

    let extension = FsPath::new(&file.filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string());
    let artifact_key = format!("uploads/{owner}/{}.{extension}", Uuid::new_v4());
    let content_type = file
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string());

    state
        .artifacts
        .put(&artifact_key, &file.data, &content_type)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to store upload: {e}")))?;

    let input = InputDescriptor {
        artifact_key: artifact_key.clone(),
        media_kind,
        original_filename: file.filename,
        content_type: file.content_type,
    };

    let job = match state.store.create(owner, client_id, input, options).await {
        Ok(job) => job,
        Err(e) => {
            if let Err(cleanup) = state.artifacts.delete(&artifact_key).await {
                tracing::warn!(key = %artifact_key, error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }
    };

    if let Err(e) = state.queue.enqueue(&DispatchMessage::new(job.id)).await {
        tracing::error!(job_id = %job.id, error = %e, "Failed to enqueue job");
        if let Err(fail) = state
            .store
            .fail(job.id, ErrorCode::StorageError, "Job could not be queued for processing")
            .await
        {
            tracing::error!(job_id = %job.id, error = %fail, "Failed to mark unqueued job as failed");
        }
        return Err(ApiError::Unavailable {
            message: "Job could not be queued for processing".into(),
            job_id: Some(job.id),
        });
    }

    if let Err(e) = state.gate.credits().consume(owner, job.id).await {
        tracing::warn!(job_id = %job.id, owner, error = %e, "Failed to consume credit");
    }

    metrics::counter!("media_jobs_submitted_total").increment(1);
    if let Ok(depth) = state.queue.depth().await {
        metrics::gauge!("media_queue_depth").set(depth as f64);
    }

    tracing::info!(
        job_id = %job.id,
        owner,
        client_id = ?job.client_id,
        kind = %media_kind,
        "Upload accepted"
    );

    Ok(Json(UploadResponse {
        success: true,
        job_id: job.id,
        status: JobStatus::Pending,
        message: "File uploaded successfully. Processing started.".to_string(),
    }))
}

/// GET /transcribe/job/{job_id}: current state of one of the caller's jobs.
pub async fn get_job_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<JobView>> {
    let owner = caller.require()?;
    let job_id = parse_job_id(&raw_id)?;

    let job = state.store.get(job_id, owner).await?;
    Ok(Json(JobView::from(&job)))
}

/// GET /audio/download/{job_id}: the MP3 track extracted from a video job.
pub async fn download_audio(
    State(state): State<AppState>,
    caller: Caller,
    Path(raw_id): Path<String>,
) -> ApiResult<Response> {
    let owner = caller.require()?;
    let job_id = parse_job_id(&raw_id)?;

    let job = state.store.get(job_id, owner).await?;
    let key = job
        .converted_audio_key
        .ok_or_else(|| ApiError::NotFound(AUDIO_NOT_READY.into()))?;

    let audio = state.artifacts.get(&key).await.map_err(|e| match e {
        StorageError::NotFound(_) => ApiError::NotFound(AUDIO_NOT_READY.into()),
        other => ApiError::Internal(format!("failed to read converted audio: {other}")),
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{job_id}.mp3\""),
            ),
        ],
        audio,
    )
        .into_response())
}

fn parse_job_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid job id '{raw}'")))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub client_id: Option<String>,
}

/// GET /transcribe/jobs: the caller's jobs, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    caller: Caller,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<Vec<JobView>>> {
    let owner = caller.require()?;
    let Query(params) = params?;
    let client_id = parse_client_id(params.client_id.as_deref()).map_err(ApiError::BadRequest)?;

    let jobs = state.store.list(owner, client_id).await?;
    Ok(Json(jobs.iter().map(JobView::from).collect()))
}
