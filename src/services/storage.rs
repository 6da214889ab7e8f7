use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

use crate::config::{AppConfig, StorageBackend};
use crate::services::encryption::{EncryptionError, EncryptionService};

/// Blob storage for uploaded media and intermediate artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Client for Cloudflare R2 object storage (S3-compatible).
pub struct R2Client {
    bucket: Box<Bucket>,
}

impl R2Client {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self { bucket })
    }

    pub async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        self.bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(StorageError::S3)?;
        Ok(())
    }

    pub async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket.get_object(key).await.map_err(StorageError::S3)?;
        if response.status_code() == 404 {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(response.to_vec())
    }

    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.bucket.delete_object(key).await.map_err(StorageError::S3)?;
        Ok(())
    }
}

/// R2 storage with AES-256-GCM encryption at rest.
pub struct EncryptedR2Store {
    client: R2Client,
    encryption: EncryptionService,
}

impl EncryptedR2Store {
    pub fn new(client: R2Client, encryption: EncryptionService) -> Self {
        Self { client, encryption }
    }
}

#[async_trait]
impl ArtifactStore for EncryptedR2Store {
    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<(), StorageError> {
        let sealed = self.encryption.encrypt(data)?;
        self.client
            .upload(key, &sealed, "application/octet-stream")
            .await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let sealed = self.client.download(key).await?;
        Ok(self.encryption.decrypt(&sealed)?)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client.remove(key).await
    }
}

/// Artifacts kept as plain files under a media root directory.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Build the artifact store selected by `STORAGE_BACKEND`.
pub fn from_config(config: &AppConfig) -> Result<Arc<dyn ArtifactStore>, StorageError> {
    match config.storage_backend {
        StorageBackend::Local => {
            tracing::info!(root = %config.media_root, "Using local artifact storage");
            Ok(Arc::new(LocalArtifactStore::new(&config.media_root)))
        }
        StorageBackend::R2 => {
            let settings = config
                .r2_settings()
                .map_err(|e| StorageError::Config(e.to_string()))?;
            let client = R2Client::new(
                settings.bucket,
                settings.endpoint,
                settings.access_key,
                settings.secret_key,
            )?;
            let encryption = EncryptionService::new(settings.encryption_key)?;
            tracing::info!(bucket = %settings.bucket, "Using encrypted R2 artifact storage");
            Ok(Arc::new(EncryptedR2Store::new(client, encryption)))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Filesystem operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Invalid artifact key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_root() -> PathBuf {
        std::env::temp_dir().join(format!("media-store-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_local_store_put_get_delete() {
        let root = scratch_root();
        let store = LocalArtifactStore::new(&root);

        store.put("uploads/a.mp3", b"audio", "audio/mpeg").await.unwrap();
        assert_eq!(store.get("uploads/a.mp3").await.unwrap(), b"audio");

        store.delete("uploads/a.mp3").await.unwrap();
        assert!(matches!(
            store.get("uploads/a.mp3").await,
            Err(StorageError::NotFound(_))
        ));
        // Deleting twice is fine.
        store.delete("uploads/a.mp3").await.unwrap();

        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn test_local_store_rejects_path_traversal() {
        let store = LocalArtifactStore::new(scratch_root());
        assert!(matches!(
            store.put("../escape", b"x", "text/plain").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.get("/etc/passwd").await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
