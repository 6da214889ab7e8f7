//! The work done inside each pipeline stage.

use std::path::Path;

use uuid::Uuid;

use crate::models::job::{ErrorCode, Job, JobResult, JobStatus, MediaKind};
use crate::services::content::{self, GeneratedContent, SourceMaterial};
use crate::services::storage::StorageError;
use crate::store::StoreError;

use super::policy::StageError;
use super::Pipeline;

/// Output of the transcribe stage.
pub(super) struct Analysis {
    pub material: SourceMaterial,
    pub transcript: Option<String>,
    pub visual_summary: Option<String>,
}

impl Pipeline {
    /// Load the uploaded artifact and check it is something we can process.
    pub(super) async fn load_input(&self, job: &Job) -> Result<Vec<u8>, StageError> {
        let bytes = self
            .artifacts
            .get(&job.input.artifact_key)
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => {
                    StageError::fatal(ErrorCode::InvalidInput, "uploaded file is missing")
                }
                other => StageError::fatal(
                    ErrorCode::InvalidInput,
                    format!("uploaded file could not be read: {other}"),
                ),
            })?;

        if bytes.is_empty() {
            return Err(StageError::fatal(
                ErrorCode::InvalidInput,
                "uploaded file is empty",
            ));
        }

        if job.input.media_kind == MediaKind::Image {
            let format = image::guess_format(&bytes).map_err(|_| {
                StageError::fatal(
                    ErrorCode::InvalidInput,
                    "file is not a supported image format",
                )
            })?;
            tracing::debug!(job_id = %job.id, format = ?format, "Image format recognised");
        }

        Ok(bytes)
    }

    /// Pull the audio track out of a video. Other media pass through (`None`).
    pub(super) async fn extract(
        &self,
        job: &Job,
        input: &[u8],
    ) -> Result<Option<Vec<u8>>, StageError> {
        if job.input.media_kind != MediaKind::Video {
            return Ok(None);
        }

        let extension = Path::new(&job.input.original_filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp4");

        let audio = self
            .extractor
            .extract_audio(input, extension)
            .await
            .map_err(|e| StageError::fatal(ErrorCode::ConversionError, e.to_string()))?;

        let key = format!("converted/{}.mp3", job.id);
        self.artifacts
            .put(&key, &audio, "audio/mpeg")
            .await
            .map_err(|e| {
                StageError::fatal(
                    ErrorCode::StorageError,
                    format!("could not store extracted audio: {e}"),
                )
            })?;
        self.store
            .attach_converted_audio(job.id, &key)
            .await
            .map_err(|e| {
                StageError::fatal(
                    ErrorCode::StorageError,
                    format!("could not record extracted audio: {e}"),
                )
            })?;

        tracing::info!(job_id = %job.id, key = %key, bytes = audio.len(), "Extracted audio track");
        Ok(Some(audio))
    }

    /// Transcribe audio, or describe a still image.
    pub(super) async fn analyze(&self, job: &Job, media: &[u8]) -> Result<Analysis, StageError> {
        match job.input.media_kind {
            MediaKind::Image => {
                let summary = self
                    .vision
                    .describe(media)
                    .await
                    .map_err(|e| StageError::from_backend(ErrorCode::TranscriptionError, e))?;
                if summary.trim().is_empty() {
                    return Err(StageError::fatal(
                        ErrorCode::TranscriptionError,
                        "vision backend returned no description",
                    ));
                }

                Ok(Analysis {
                    material: SourceMaterial::Image(summary.clone()),
                    transcript: None,
                    visual_summary: Some(summary),
                })
            }
            MediaKind::Audio | MediaKind::Video => {
                let transcript = self
                    .transcriber
                    .transcribe(media, job.options.language.as_deref())
                    .await
                    .map_err(|e| StageError::from_backend(ErrorCode::TranscriptionError, e))?;

                let text = transcript.timestamped();
                if text.is_empty() {
                    return Err(StageError::fatal(
                        ErrorCode::TranscriptionError,
                        "no speech was recognised",
                    ));
                }

                tracing::debug!(
                    job_id = %job.id,
                    segments = transcript.segments.len(),
                    language = ?transcript.language,
                    "Transcription complete"
                );

                Ok(Analysis {
                    material: SourceMaterial::Transcript(text.clone()),
                    transcript: Some(text),
                    visual_summary: None,
                })
            }
        }
    }

    pub(super) async fn generate(
        &self,
        job: &Job,
        analysis: &Analysis,
    ) -> Result<GeneratedContent, StageError> {
        let prompt = content::build_prompt(&analysis.material, &job.options);
        let raw = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| StageError::from_backend(ErrorCode::GenerationError, e))?;

        content::parse_response(&raw, job.options.hashtag_count).ok_or_else(|| {
            StageError::fatal(
                ErrorCode::GenerationError,
                "response did not contain a caption",
            )
        })
    }

    /// Persist the result. `Ok(Err(status))` means another writer already
    /// finished the job.
    pub(super) async fn finalize(
        &self,
        job_id: Uuid,
        result: &JobResult,
    ) -> Result<Result<Job, JobStatus>, StageError> {
        match self.store.complete(job_id, result.clone()).await {
            Ok(job) => Ok(Ok(job)),
            Err(StoreError::AlreadyTerminal { status, .. }) => Ok(Err(status)),
            Err(e) => Err(StageError::fatal(
                ErrorCode::StorageError,
                format!("could not save result: {e}"),
            )),
        }
    }
}

pub(super) fn assemble(analysis: Analysis, generated: GeneratedContent) -> JobResult {
    let platforms = content::platform_variants(&generated);
    JobResult {
        transcript: analysis.transcript,
        visual_summary: analysis.visual_summary,
        caption: generated.caption,
        description: generated.description,
        hashtags: generated.hashtags,
        platforms,
    }
}
