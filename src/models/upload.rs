use std::str::FromStr;

use garde::Validate;
use serde::Serialize;
use uuid::Uuid;

use crate::models::job::{ClientId, JobOptions, JobStatus, LengthPreset, DEFAULT_HASHTAG_COUNT};

/// Text fields of the multipart upload, as received.
#[derive(Debug, Default)]
pub struct UploadFields {
    pub client_id: Option<String>,
    pub caption_length: Option<String>,
    pub description_length: Option<String>,
    pub hashtag_count: Option<String>,
    pub language: Option<String>,
}

impl UploadFields {
    /// Record a text field by name. Unknown fields are ignored.
    pub fn set(&mut self, name: &str, value: String) {
        let value = value.trim().to_string();
        if value.is_empty() {
            return;
        }
        match name {
            "client_id" => self.client_id = Some(value),
            "caption_length" => self.caption_length = Some(value),
            "description_length" => self.description_length = Some(value),
            "hashtag_count" => self.hashtag_count = Some(value),
            "language" => self.language = Some(value),
            _ => {}
        }
    }

    pub fn client_id(&self) -> Result<Option<ClientId>, String> {
        parse_client_id(self.client_id.as_deref())
    }

    /// Parse and validate the generation options.
    pub fn options(&self) -> Result<JobOptions, String> {
        let caption_length = parse_length("caption_length", self.caption_length.as_deref())?;
        let description_length =
            parse_length("description_length", self.description_length.as_deref())?;

        let hashtag_count = match self.hashtag_count.as_deref() {
            None => DEFAULT_HASHTAG_COUNT,
            Some(raw) => raw
                .parse::<u8>()
                .map_err(|_| format!("hashtag_count must be a number between 5 and 30, got '{raw}'"))?,
        };

        let options = JobOptions {
            caption_length,
            description_length,
            hashtag_count,
            language: self.language.clone(),
        };
        options.validate().map_err(|report| report.to_string())?;
        Ok(options)
    }
}

fn parse_length(field: &str, raw: Option<&str>) -> Result<LengthPreset, String> {
    match raw {
        None => Ok(LengthPreset::default()),
        Some(raw) => LengthPreset::from_str(&raw.to_ascii_lowercase()).map_err(|_| {
            format!("{field} must be one of short, medium, long; got '{raw}'")
        }),
    }
}

/// Parse an optional client id from a form field or query parameter.
pub fn parse_client_id(raw: Option<&str>) -> Result<Option<ClientId>, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<ClientId>()
            .map(Some)
            .map_err(|_| format!("Invalid client_id '{raw}'")),
    }
}

/// Response after accepting an upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
}
