use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use tokio::fs;

use crate::state::AppState;
use crate::utils::error::{AppError, AppResult};

fn not_found() -> AppError {
    AppError::NotFound("Media not found".to_string())
}

fn file_response(data: Vec<u8>, content_type: &str) -> Response {
    let content_type = HeaderValue::from_str(content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    ([(header::CONTENT_TYPE, content_type)], Body::from(data)).into_response()
}

fn guessed_type(path: &std::path::Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

async fn serve_from_disk(state: &AppState, names: &[&str]) -> AppResult<Option<Response>> {
    for name in names {
        if let Some(found) = state.media_root.find_served(name).await {
            let data = fs::read(&found).await.map_err(crate::storage::StorageError::from)?;
            return Ok(Some(file_response(data, &guessed_type(&found))));
        }
    }
    Ok(None)
}

/// `GET /media/*path`: files under the media roots, with legacy default
/// names mapped to their current location.
pub async fn serve_media(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> AppResult<Response> {
    serve_from_disk(&state, &[path.as_str()])
        .await?
        .ok_or_else(not_found)
}

/// `GET /db-media/*path`: a stored file by exact key, falling back to files
/// on disk from before media moved into the database.
pub async fn serve_db_media(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> AppResult<Response> {
    if let Some(file) = state.repos.stored_files.find(&path).await? {
        let content_type = if file.content_type.is_empty() {
            guessed_type(std::path::Path::new(&file.key))
        } else {
            file.content_type
        };
        return Ok(file_response(file.data, &content_type));
    }

    let prefix = format!("{}/", state.db_media_location);
    let mut candidates = vec![path.as_str()];
    if let Some(stripped) = path.strip_prefix(prefix.as_str()) {
        candidates.push(stripped);
    }

    serve_from_disk(&state, &candidates)
        .await?
        .ok_or_else(not_found)
}
