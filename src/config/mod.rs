use std::time::Duration;

use serde::Deserialize;

/// Where uploaded media and extracted audio are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Plain files under `media_root`.
    #[default]
    Local,
    /// Cloudflare R2, encrypted with `encryption_key`.
    R2,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the dispatch queue
    pub redis_url: String,

    /// HS256 secret for verifying bearer tokens
    pub jwt_secret: String,

    /// Cloudflare account ID
    pub cf_account_id: String,

    /// Cloudflare Workers AI API token
    pub cf_api_token: String,

    #[serde(default)]
    pub storage_backend: StorageBackend,

    /// Root directory for the local storage backend
    #[serde(default = "default_media_root")]
    pub media_root: String,

    /// R2 bucket name
    pub r2_bucket: Option<String>,

    /// R2 endpoint URL
    pub r2_endpoint: Option<String>,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: Option<String>,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: Option<String>,

    /// AES-256-GCM encryption key (base64-encoded, 32 bytes)
    pub encryption_key: Option<String>,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause before retrying a transient backend failure
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    #[serde(default = "default_conversion_timeout_secs")]
    pub conversion_timeout_secs: u64,

    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,

    /// Refuse submissions from users without remaining credits
    #[serde(default)]
    pub credits_enforced: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_media_root() -> String {
    "./media".to_string()
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_conversion_timeout_secs() -> u64 {
    300
}

fn default_max_upload_mb() -> usize {
    100
}

/// Settings required by the R2 storage backend.
#[derive(Debug)]
pub struct R2Settings<'a> {
    pub bucket: &'a str,
    pub endpoint: &'a str,
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub encryption_key: &'a str,
}

#[derive(Debug, thiserror::Error)]
#[error("{0} must be set when STORAGE_BACKEND=r2")]
pub struct MissingSetting(pub &'static str);

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn r2_settings(&self) -> Result<R2Settings<'_>, MissingSetting> {
        fn required<'a>(
            value: &'a Option<String>,
            name: &'static str,
        ) -> Result<&'a str, MissingSetting> {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .ok_or(MissingSetting(name))
        }

        Ok(R2Settings {
            bucket: required(&self.r2_bucket, "R2_BUCKET")?,
            endpoint: required(&self.r2_endpoint, "R2_ENDPOINT")?,
            access_key: required(&self.r2_access_key, "R2_ACCESS_KEY")?,
            secret_key: required(&self.r2_secret_key, "R2_SECRET_KEY")?,
            encryption_key: required(&self.encryption_key, "ENCRYPTION_KEY")?,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn conversion_timeout(&self) -> Duration {
        Duration::from_secs(self.conversion_timeout_secs)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}
