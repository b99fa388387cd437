use std::sync::Arc;

use crate::config::{MediaConfig, StorageBackendKind};
use crate::repository::Repositories;
use crate::storage::{DatabaseStorage, FileSystemStorage, MediaRoot, MediaStorage, StorageResult};

pub const MEDIA_URL: &str = "/media/";
pub const DB_MEDIA_URL: &str = "/db-media/";

#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    /// Backend new uploads are written to.
    pub storage: Arc<dyn MediaStorage>,
    pub media_root: Arc<MediaRoot>,
    /// Key prefix of database-stored media, stripped for disk fallbacks.
    pub db_media_location: String,
}

impl AppState {
    /// Resolves the media root and wires the configured storage backend.
    pub async fn build(repos: Repositories, media: &MediaConfig) -> StorageResult<Self> {
        let media_root = Arc::new(MediaRoot::resolve(&media.root_candidates()).await?);
        Ok(Self::with_media_root(repos, media, media_root))
    }

    pub fn with_media_root(
        repos: Repositories,
        media: &MediaConfig,
        media_root: Arc<MediaRoot>,
    ) -> Self {
        let storage: Arc<dyn MediaStorage> = match media.backend {
            StorageBackendKind::FileSystem => {
                Arc::new(FileSystemStorage::new(media_root.clone(), MEDIA_URL))
            }
            StorageBackendKind::Database => Arc::new(DatabaseStorage::new(
                repos.stored_files.clone(),
                media.db_location.clone(),
                DB_MEDIA_URL,
            )),
        };
        tracing::info!(backend = ?media.backend, "Media storage configured");

        Self {
            repos,
            storage,
            media_root,
            db_media_location: media.db_location.trim_matches('/').to_string(),
        }
    }
}
