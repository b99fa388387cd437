use std::path::Path as FsPath;

use axum::extract::Multipart;
use axum::response::Response;
use serde::Serialize;
use uuid::Uuid;

use crate::models::event::Event;
use crate::state::AppState;
use crate::storage::Upload;
use crate::utils::error::{AppError, AppResult};
use crate::utils::response::success;

pub mod attendance;
pub mod calendar;
pub mod completion;
pub mod events;
pub mod media;
pub mod users;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "eventplanner-api",
    };

    success(payload, "Health check successful")
}

pub(crate) async fn load_event(state: &AppState, id: Uuid) -> AppResult<Event> {
    state
        .repos
        .events
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event with id '{}' was not found", id)))
}

pub(crate) fn require_creator(event: &Event, user_id: Uuid, message: &str) -> AppResult<()> {
    if event.creator_id == user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(message.to_string()))
    }
}

/// Pulls the file part named `field` out of a multipart body. Returns the
/// client's file name (last path segment only) and the bytes.
pub(crate) async fn read_upload(
    mut multipart: Multipart,
    field: &str,
) -> AppResult<(String, Upload)> {
    while let Some(part) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationError(format!("Malformed upload: {}", e)))?
    {
        if part.name() != Some(field) {
            continue;
        }

        let file_name = part
            .file_name()
            .and_then(|name| FsPath::new(name).file_name())
            .and_then(|name| name.to_str())
            .filter(|name| !name.starts_with('.'))
            .unwrap_or("upload")
            .to_string();
        let content_type = part.content_type().map(str::to_string);
        let data = part
            .bytes()
            .await
            .map_err(|e| AppError::ValidationError(format!("Malformed upload: {}", e)))?;

        if data.is_empty() {
            return Err(AppError::ValidationError(format!("The '{}' file is empty", field)));
        }
        return Ok((file_name, Upload::new(data.to_vec(), content_type)));
    }

    Err(AppError::ValidationError(format!("Missing '{}' file field", field)))
}

/// Removes an upload nothing refers to any more: the file a new upload
/// replaced, or a new file whose row update failed. Defaults are shared and
/// never removed. Failures only leave an orphan behind, so they are logged
/// and ignored.
pub(crate) async fn discard_media(state: &AppState, name: &str, default: &str) {
    if name == default || name.is_empty() {
        return;
    }
    if let Err(e) = state.storage.delete(name).await {
        tracing::warn!(name = %name, error = %e, "Could not delete unreferenced media file");
    }
}
