use axum::extract::{Path, State};
use axum::response::Response;
use chrono::Utc;
use uuid::Uuid;

use super::events::EventView;
use super::load_event;
use crate::models::event::Event;
use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::extract::CurrentUser;
use crate::utils::response::success;

async fn respond(state: &AppState, event: Event, message: String) -> AppResult<Response> {
    let id = event.id;
    let going = state
        .repos
        .rsvps
        .going_counts(&[id])
        .await?
        .get(&id)
        .copied()
        .unwrap_or(0);
    Ok(success(EventView::new(state, event, going, Utc::now()), message))
}

pub async fn mark_completed(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let mut event = load_event(&state, id).await?;
    event.mark_completed(user.id, Utc::now())?;
    state.repos.events.update(&event).await?;

    tracing::info!(event_id = %id, by = %user.id, "Event marked as completed");
    let message = format!("Event \"{}\" has been marked as completed!", event.title);
    respond(&state, event, message).await
}

pub async fn undo_completed(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let mut event = load_event(&state, id).await?;
    event.undo_completed(user.id, Utc::now())?;
    state.repos.events.update(&event).await?;

    tracing::info!(event_id = %id, by = %user.id, "Event completion undone");
    let message = format!("Event \"{}\" is no longer marked as completed!", event.title);
    respond(&state, event, message).await
}
