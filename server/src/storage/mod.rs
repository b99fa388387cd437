//! Media storage: where the bytes of uploaded images live.
//!
//! Two interchangeable backends implement [`MediaStorage`]: a directory on
//! disk and rows in the `stored_files` table. The rest of the server only
//! sees the trait and the storage name it returns from `save`.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

pub mod database;
pub mod filesystem;
pub mod resize;

pub use database::DatabaseStorage;
pub use filesystem::{FileSystemStorage, MediaRoot};

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("a file is already stored under {0}")]
    AlreadyExists(String),

    #[error("no writable media root among: {0}")]
    NoWritableRoot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Bytes received from a client, with the content type it declared.
#[derive(Debug, Clone)]
pub struct Upload {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

impl Upload {
    pub fn new(data: Vec<u8>, content_type: Option<String>) -> Self {
        Self { data, content_type }
    }
}

#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Reads the whole file.
    async fn open(&self, name: &str) -> StorageResult<Vec<u8>>;

    /// Stores `upload` under a name derived from `name` and returns the name
    /// it actually ended up under.
    async fn save(&self, name: &str, upload: Upload) -> StorageResult<String>;

    async fn delete(&self, name: &str) -> StorageResult<()>;

    async fn exists(&self, name: &str) -> StorageResult<bool>;

    async fn size(&self, name: &str) -> StorageResult<u64>;

    /// Public URL the file is served from.
    fn url(&self, name: &str) -> String;

    /// A name, derived from `name`, that no stored file currently uses.
    async fn available_name(&self, name: &str) -> StorageResult<String>;
}

/// Normalizes a client or database supplied name into a relative path,
/// rejecting anything that could escape the storage root.
pub fn relative_path(name: &str) -> StorageResult<PathBuf> {
    let trimmed = name.trim_matches('/');
    if trimmed.is_empty() {
        return Err(StorageError::InvalidName(name.to_string()));
    }

    let mut path = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            _ => return Err(StorageError::InvalidName(name.to_string())),
        }
    }

    if path.as_os_str().is_empty() {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(path)
}

/// Extension of the final path segment, with its leading dot.
pub fn dotted_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{ext}"))
}
