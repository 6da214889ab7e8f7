use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Internal id of an authenticated user (JWT `sub`).
pub type UserId = i64;

/// Internal id of a client/brand sub-account owned by a user.
pub type ClientId = i64;

/// Status of a media job. Transitions only move forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Declared kind of the uploaded artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
    Image,
}

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "aac", "ogg", "flac", "webm"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "m4v", "mpeg"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

impl MediaKind {
    /// Classify an upload by file extension, falling back to the content type.
    pub fn detect(filename: &str, content_type: Option<&str>) -> Option<Self> {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());

        if let Some(ext) = ext.as_deref() {
            if AUDIO_EXTENSIONS.contains(&ext) {
                return Some(MediaKind::Audio);
            }
            if VIDEO_EXTENSIONS.contains(&ext) {
                return Some(MediaKind::Video);
            }
            if IMAGE_EXTENSIONS.contains(&ext) {
                return Some(MediaKind::Image);
            }
        }

        match content_type?.split('/').next()? {
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            "image" => Some(MediaKind::Image),
            _ => None,
        }
    }
}

/// Requested length of a generated text block.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LengthPreset {
    Short,
    #[default]
    Medium,
    Long,
}

pub const DEFAULT_HASHTAG_COUNT: u8 = 15;

/// Generation options, snapshotted when the job is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct JobOptions {
    #[garde(skip)]
    pub caption_length: LengthPreset,

    #[garde(skip)]
    pub description_length: LengthPreset,

    #[garde(range(min = 5, max = 30))]
    pub hashtag_count: u8,

    #[garde(length(min = 2, max = 8), ascii)]
    pub language: Option<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            caption_length: LengthPreset::default(),
            description_length: LengthPreset::default(),
            hashtag_count: DEFAULT_HASHTAG_COUNT,
            language: None,
        }
    }
}

/// Where the uploaded artifact lives and what it claims to be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDescriptor {
    pub artifact_key: String,
    pub media_kind: MediaKind,
    pub original_filename: String,
    pub content_type: Option<String>,
}

/// Stable failure codes recorded on failed jobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
pub enum ErrorCode {
    InvalidInput,
    ConversionError,
    TranscriptionError,
    GenerationError,
    StorageError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstagramPost {
    pub caption: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacebookPost {
    pub caption: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YoutubePost {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformVariants {
    pub instagram: InstagramPost,
    pub facebook: FacebookPost,
    pub youtube: YoutubePost,
}

/// Generated content stored on a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_summary: Option<String>,
    pub caption: String,
    pub description: String,
    pub hashtags: Vec<String>,
    pub platforms: PlatformVariants,
}

/// Terminal payload written when a job leaves the active states.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(JobResult),
    Failed(JobError),
}

impl Outcome {
    pub fn status(&self) -> JobStatus {
        match self {
            Outcome::Completed(_) => JobStatus::Completed,
            Outcome::Failed(_) => JobStatus::Failed,
        }
    }
}

/// Fields supplied when a job record is created.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: Uuid,
    pub owner: UserId,
    pub client_id: Option<ClientId>,
    pub input: InputDescriptor,
    pub options: JobOptions,
}

/// A media content job.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub owner: UserId,
    pub client_id: Option<ClientId>,
    pub status: JobStatus,
    pub progress: u8,
    pub input: InputDescriptor,
    pub options: JobOptions,
    pub converted_audio_key: Option<String>,
    pub result: Option<JobResult>,
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(new: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            owner: new.owner,
            client_id: new.client_id,
            status: JobStatus::Pending,
            progress: 0,
            input: new.input,
            options: new.options,
            converted_audio_key: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Seconds between claim and terminal state, when both are known.
    pub fn processing_seconds(&self) -> Option<f64> {
        let started = self.started_at?;
        let finished = self.completed_at?;
        Some((finished - started).num_milliseconds() as f64 / 1000.0)
    }
}

/// Client-facing representation of a job returned by the polling endpoints.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub job_id: Uuid,
    pub client_id: Option<ClientId>,
    pub status: JobStatus,
    pub progress: u8,
    pub file_type: MediaKind,
    pub original_filename: String,
    pub options: JobOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_seconds: Option<f64>,
    /// Present once the audio track of a video has been extracted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_download_url: Option<String>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            client_id: job.client_id,
            status: job.status,
            progress: job.progress,
            file_type: job.input.media_kind,
            original_filename: job.input.original_filename.clone(),
            options: job.options.clone(),
            result: job.result.clone(),
            error: job.error.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            processing_seconds: job.processing_seconds(),
            audio_download_url: job
                .converted_audio_key
                .as_ref()
                .map(|_| format!("/audio/download/{}", job.id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_media_kind_detection() {
        assert_eq!(MediaKind::detect("clip.MP4", None), Some(MediaKind::Video));
        assert_eq!(MediaKind::detect("voice.mp3", None), Some(MediaKind::Audio));
        assert_eq!(MediaKind::detect("cover.jpeg", None), Some(MediaKind::Image));
        assert_eq!(
            MediaKind::detect("upload", Some("audio/mpeg")),
            Some(MediaKind::Audio)
        );
        assert_eq!(MediaKind::detect("notes.txt", Some("text/plain")), None);
    }

    #[test]
    fn test_length_preset_rejects_unknown_values() {
        assert_eq!(LengthPreset::from_str("short").unwrap(), LengthPreset::Short);
        assert!(LengthPreset::from_str("extra-long").is_err());
    }

    #[test]
    fn test_options_validation() {
        assert!(JobOptions::default().validate().is_ok());

        let too_many = JobOptions {
            hashtag_count: 31,
            ..JobOptions::default()
        };
        assert!(too_many.validate().is_err());

        let bad_language = JobOptions {
            language: Some("e".to_string()),
            ..JobOptions::default()
        };
        assert!(bad_language.validate().is_err());
    }

    #[test]
    fn test_error_code_serializes_as_variant_name() {
        let json = serde_json::to_value(ErrorCode::TranscriptionError).unwrap();
        assert_eq!(json, "TranscriptionError");
        assert_eq!(
            ErrorCode::from_str("GenerationError").unwrap(),
            ErrorCode::GenerationError
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
