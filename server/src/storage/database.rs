use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use rand::RngCore;

use super::{dotted_extension, MediaStorage, StorageError, StorageResult, Upload};
use crate::models::stored_file::StoredFile;
use crate::repository::StoredFileRepository;

const TOKEN_BYTES: usize = 16;
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Keeps media as rows of the `stored_files` table, each under a freshly
/// generated `location/token.ext` key.
pub struct DatabaseStorage {
    files: Arc<dyn StoredFileRepository>,
    location: String,
    base_url: String,
}

impl DatabaseStorage {
    pub fn new(
        files: Arc<dyn StoredFileRepository>,
        location: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            files,
            location: location.into().trim_matches('/').to_string(),
            base_url: base_url.into(),
        }
    }

    /// Key for `name`; names already under the location are left as they are.
    fn full_key(&self, name: &str) -> String {
        let name = name.trim_matches('/');
        if self.location.is_empty() {
            return name.to_string();
        }
        match name.strip_prefix(self.location.as_str()) {
            Some(rest) if rest.starts_with('/') => name.to_string(),
            _ => format!("{}/{}", self.location, name),
        }
    }

    fn generate_key(&self, name: &str) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);
        let ext = dotted_extension(name).unwrap_or_default();
        self.full_key(&format!("{token}{ext}"))
    }
}

fn content_type_for(key: &str, declared: Option<String>) -> String {
    declared
        .filter(|ct| !ct.trim().is_empty())
        .or_else(|| mime_guess::from_path(key).first().map(|m| m.to_string()))
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
}

#[async_trait]
impl MediaStorage for DatabaseStorage {
    async fn open(&self, name: &str) -> StorageResult<Vec<u8>> {
        self.files
            .find(&self.full_key(name))
            .await?
            .map(|file| file.data)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn save(&self, name: &str, upload: Upload) -> StorageResult<String> {
        let key = self.available_name(name).await?;
        let file = StoredFile {
            content_type: content_type_for(&key, upload.content_type),
            key,
            created_at: Utc::now(),
            data: upload.data,
        };
        self.files.insert(&file).await?;
        tracing::debug!(
            key = %file.key,
            content_type = %file.content_type,
            bytes = file.data.len(),
            "Stored media file in database"
        );
        Ok(file.key)
    }

    async fn delete(&self, name: &str) -> StorageResult<()> {
        self.files.delete(&self.full_key(name)).await
    }

    async fn exists(&self, name: &str) -> StorageResult<bool> {
        self.files.exists(&self.full_key(name)).await
    }

    async fn size(&self, name: &str) -> StorageResult<u64> {
        self.files
            .size(&self.full_key(name))
            .await?
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn url(&self, name: &str) -> String {
        format!("{}{}", self.base_url, self.full_key(name))
    }

    /// Keys are never reused, so this always mints a new one.
    async fn available_name(&self, name: &str) -> StorageResult<String> {
        let name = if name.trim().is_empty() { "file" } else { name };
        Ok(self.generate_key(name))
    }
}
