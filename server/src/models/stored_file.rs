use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A media file whose bytes live in the `stored_files` table.
#[derive(Debug, Clone, FromRow)]
pub struct StoredFile {
    pub key: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub data: Vec<u8>,
}
