use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::EventView;
use super::load_event;
use crate::models::rating::{stars_in_range, Rating, MAX_STARS, MIN_STARS};
use crate::models::rsvp::{Rsvp, RsvpStatus};
use crate::state::AppState;
use crate::utils::error::{AppError, AppResult};
use crate::utils::extract::CurrentUser;
use crate::utils::response::{created, success};

const NOT_ATTENDED: &str = "You can only rate events that you actually attended.";

#[derive(Debug, Deserialize)]
pub struct RsvpRequest {
    pub status: RsvpStatus,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub stars: i16,
    #[serde(default)]
    pub feedback: String,
}

#[derive(Debug, Serialize)]
pub struct MyRsvp {
    pub rsvp: Rsvp,
    pub event: EventView,
    /// Only meaningful for past events.
    pub can_rate: bool,
    pub user_rating: Option<Rating>,
}

#[derive(Debug, Serialize)]
pub struct MyRsvps {
    pub upcoming: Vec<MyRsvp>,
    pub past: Vec<MyRsvp>,
}

pub async fn rsvp_event(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RsvpRequest>,
) -> AppResult<Response> {
    let event = load_event(&state, id).await?;
    let now = Utc::now();

    if event.is_completed {
        return Err(AppError::ValidationError(
            "Cannot update attendance for completed events.".to_string(),
        ));
    }
    if event.is_past(now) {
        return Err(AppError::ValidationError(
            "Cannot attend past events.".to_string(),
        ));
    }

    let rsvp = state.repos.rsvps.upsert(id, user.id, req.status, now).await?;
    let message = format!("RSVP updated! You are {} to this event.", rsvp.status.label());
    Ok(success(rsvp, message))
}

pub async fn rate_event(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RatingRequest>,
) -> AppResult<Response> {
    let event = load_event(&state, id).await?;
    let now = Utc::now();

    if !event.is_past(now) {
        return Err(AppError::ValidationError(
            "You can only rate events that have already happened.".to_string(),
        ));
    }
    match state.repos.rsvps.find(id, user.id).await? {
        Some(rsvp) if rsvp.status == RsvpStatus::Going => {}
        _ => return Err(AppError::Forbidden(NOT_ATTENDED.to_string())),
    }
    if !stars_in_range(req.stars) {
        return Err(AppError::ValidationError(format!(
            "Stars must be between {} and {}",
            MIN_STARS, MAX_STARS
        )));
    }

    let (rating, is_new) = state
        .repos
        .ratings
        .upsert(id, user.id, req.stars, req.feedback, now)
        .await?;

    if is_new {
        Ok(created(rating, "Thank you for rating this event!"))
    } else {
        Ok(success(rating, "Your rating has been updated!"))
    }
}

/// The caller's RSVPs split into upcoming (today or later, soonest first) and
/// past (newest first).
pub async fn my_rsvps(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let now = Utc::now();
    let today = now.date_naive();
    let mut upcoming = Vec::new();
    let mut past = Vec::new();

    for rsvp in state.repos.rsvps.list_for_user(user.id).await? {
        let Some(event) = state.repos.events.find_by_id(rsvp.event_id).await? else {
            continue;
        };
        let going = state
            .repos
            .rsvps
            .going_counts(&[event.id])
            .await?
            .get(&event.id)
            .copied()
            .unwrap_or(0);
        let is_upcoming = event.start_date >= today;

        let user_rating = if is_upcoming {
            None
        } else {
            state.repos.ratings.find(event.id, user.id).await?
        };
        let can_rate = !is_upcoming && user_rating.is_none() && rsvp.status == RsvpStatus::Going;

        let entry = MyRsvp {
            event: EventView::new(&state, event, going, now),
            rsvp,
            can_rate,
            user_rating,
        };
        if is_upcoming {
            upcoming.push(entry);
        } else {
            past.push(entry);
        }
    }

    let start = |r: &MyRsvp| (r.event.event.start_date, r.event.event.start_time);
    upcoming.sort_by_key(start);
    past.sort_by_key(|r| std::cmp::Reverse(start(r)));

    Ok(success(MyRsvps { upcoming, past }, "RSVPs retrieved"))
}
