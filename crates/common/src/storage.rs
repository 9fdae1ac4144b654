//! Storage backend for uploaded post images.

use std::path::PathBuf;

use crate::{AppError, AppResult};

/// Metadata of a stored file.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Storage key (relative path).
    pub key: String,
    /// Public URL to access the file.
    pub url: String,
    /// File size in bytes.
    pub size: u64,
    /// MIME content type.
    pub content_type: String,
}

/// Storage backend trait.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store a file under `key`.
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<StoredFile>;

    /// Delete a file. Missing files are not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Get the public URL for a key.
    fn public_url(&self, key: &str) -> String;
}

/// Local filesystem storage backend.
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new local storage backend.
    #[must_use]
    pub const fn new(base_path: PathBuf, base_url: String) -> Self {
        Self {
            base_path,
            base_url,
        }
    }
}

#[async_trait::async_trait]
impl StorageBackend for LocalStorage {
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<StoredFile> {
        let path = self.base_path.join(key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create directory: {e}")))?;
        }

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write file: {e}")))?;

        tracing::debug!(key = %key, size = data.len(), "Stored file");

        Ok(StoredFile {
            key: key.to_string(),
            url: self.public_url(key),
            size: data.len() as u64,
            content_type: content_type.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.base_path.join(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!("Failed to delete file: {e}"))),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}

/// Generate a unique storage key for an uploaded image.
///
/// Keys look like `posts/2025/01/31/<uuid>.<ext>`.
#[must_use]
pub fn generate_storage_key(prefix: &str, extension: &str) -> String {
    let date_path = chrono::Utc::now().format("%Y/%m/%d");
    format!(
        "{}/{}/{}.{}",
        prefix.trim_end_matches('/'),
        date_path,
        uuid::Uuid::new_v4().simple(),
        extension
    )
}
