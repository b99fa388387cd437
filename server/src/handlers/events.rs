use axum::extract::{Multipart, Path, State};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{discard_media, load_event, read_upload, require_creator};
use crate::models::event::{Event, EventDraft, DEFAULT_EVENT_IMAGE};
use crate::models::rating::Rating;
use crate::models::rsvp::RsvpStatus;
use crate::state::AppState;
use crate::storage::resize::{fit_or_keep_blocking, EVENT_IMAGE_MAX};
use crate::utils::error::{AppError, AppResult};
use crate::utils::extract::{CurrentUser, MaybeUser};
use crate::utils::response::{created, empty_success, success};

const TITLE_MAX: usize = 200;
const LOCATION_MAX: usize = 300;

#[derive(Debug, Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: Event,
    pub image_url: String,
    pub is_past: bool,
    pub can_be_marked_completed: bool,
    pub going_count: i64,
}

impl EventView {
    pub fn new(state: &AppState, event: Event, going_count: i64, now: DateTime<Utc>) -> Self {
        Self {
            image_url: state.storage.url(&event.image),
            is_past: event.is_past(now),
            can_be_marked_completed: event.can_be_marked_completed(now),
            going_count,
            event,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AttendeeView {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TimeUntil {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
}

impl TimeUntil {
    fn between(now: DateTime<Utc>, start: DateTime<Utc>) -> Option<Self> {
        let secs = (start - now).num_seconds();
        if secs <= 0 {
            return None;
        }
        Some(Self {
            days: secs / 86_400,
            hours: (secs % 86_400) / 3_600,
            minutes: (secs % 3_600) / 60,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub view: EventView,
    pub attendees: Vec<AttendeeView>,
    pub capacity_percentage: Option<f64>,
    pub average_rating: f64,
    pub viewer_rsvp: Option<RsvpStatus>,
    pub time_until_event: Option<TimeUntil>,
}

#[derive(Debug, Serialize)]
pub struct FinishedEventView {
    #[serde(flatten)]
    pub view: EventView,
    /// Present only when the request identifies a user.
    pub can_rate: Option<bool>,
    pub user_rating: Option<Rating>,
}

fn validate(draft: &EventDraft) -> AppResult<()> {
    if draft.title.trim().is_empty() {
        return Err(AppError::ValidationError("Title is required".to_string()));
    }
    if draft.title.chars().count() > TITLE_MAX {
        return Err(AppError::ValidationError(format!(
            "Title must be at most {} characters",
            TITLE_MAX
        )));
    }
    if draft.location.trim().is_empty() {
        return Err(AppError::ValidationError("Location is required".to_string()));
    }
    if draft.location.chars().count() > LOCATION_MAX {
        return Err(AppError::ValidationError(format!(
            "Location must be at most {} characters",
            LOCATION_MAX
        )));
    }
    if draft.capacity == Some(0) {
        return Err(AppError::ValidationError(
            "Capacity must be at least 1 when set".to_string(),
        ));
    }
    Ok(())
}

fn capacity_percentage(capacity: Option<i32>, going: i64) -> Option<f64> {
    let capacity = capacity.filter(|c| *c > 0)?;
    Some((going as f64 / f64::from(capacity) * 100.0).min(100.0))
}

async fn views(
    state: &AppState,
    events: Vec<Event>,
    now: DateTime<Utc>,
) -> AppResult<Vec<EventView>> {
    let ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
    let counts = state.repos.rsvps.going_counts(&ids).await?;
    Ok(events
        .into_iter()
        .map(|event| {
            let going = counts.get(&event.id).copied().unwrap_or(0);
            EventView::new(state, event, going, now)
        })
        .collect())
}

pub async fn list_events(State(state): State<AppState>) -> AppResult<Response> {
    let now = Utc::now();
    let events = state.repos.events.list().await?;
    let views = views(&state, events, now).await?;
    let message = format!("{} event(s)", views.len());
    Ok(success(views, message))
}

pub async fn create_event(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(draft): Json<EventDraft>,
) -> AppResult<Response> {
    validate(&draft)?;
    let now = Utc::now();
    let event = Event::create(user.id, draft, now)?;
    state.repos.events.insert(&event).await?;

    tracing::info!(event_id = %event.id, creator = %user.id, "Event created");
    Ok(created(
        EventView::new(&state, event, 0, now),
        "Event created successfully!",
    ))
}

pub async fn get_event(
    MaybeUser(viewer): MaybeUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let now = Utc::now();
    let event = load_event(&state, id).await?;

    let attendees: Vec<AttendeeView> = state
        .repos
        .rsvps
        .attendees(id)
        .await?
        .into_iter()
        .map(|u| AttendeeView {
            id: u.id,
            username: u.username,
            first_name: u.first_name,
        })
        .collect();
    let going = attendees.len() as i64;

    let viewer_rsvp = match viewer {
        Some(user_id) => state.repos.rsvps.find(id, user_id).await?.map(|r| r.status),
        None => None,
    };
    let time_until_event = if event.is_past(now) {
        None
    } else {
        TimeUntil::between(now, event.starts_at())
    };

    let detail = EventDetail {
        capacity_percentage: capacity_percentage(event.capacity, going),
        average_rating: state.repos.ratings.average(id).await?,
        view: EventView::new(&state, event, going, now),
        attendees,
        viewer_rsvp,
        time_until_event,
    };
    Ok(success(detail, "Event retrieved"))
}

pub async fn update_event(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(draft): Json<EventDraft>,
) -> AppResult<Response> {
    validate(&draft)?;
    let mut event = load_event(&state, id).await?;
    require_creator(&event, user.id, "You can only edit events you created.")?;

    let now = Utc::now();
    event.apply(draft, now)?;
    state.repos.events.update(&event).await?;

    let going = state
        .repos
        .rsvps
        .going_counts(&[id])
        .await?
        .get(&id)
        .copied()
        .unwrap_or(0);
    Ok(success(
        EventView::new(&state, event, going, now),
        "Event updated successfully!",
    ))
}

pub async fn delete_event(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let event = load_event(&state, id).await?;
    require_creator(&event, user.id, "You can only delete events you created.")?;

    if !state.repos.events.delete(id).await? {
        return Err(AppError::NotFound(format!("Event with id '{}' was not found", id)));
    }
    tracing::info!(event_id = %id, "Event deleted");
    Ok(empty_success("Event deleted successfully!"))
}

pub async fn upload_event_image(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Response> {
    let mut event = load_event(&state, id).await?;
    require_creator(&event, user.id, "You can only change images of events you created.")?;

    let (file_name, mut upload) = read_upload(multipart, "image").await?;
    upload.data = fit_or_keep_blocking(upload.data, EVENT_IMAGE_MAX, "event image").await;
    let stored = state
        .storage
        .save(&format!("event_pics/{}", file_name), upload)
        .await?;

    let previous = std::mem::replace(&mut event.image, stored);
    let now = Utc::now();
    event.updated_at = now;
    if let Err(e) = state.repos.events.update(&event).await {
        discard_media(&state, &event.image, DEFAULT_EVENT_IMAGE).await;
        return Err(e);
    }
    discard_media(&state, &previous, DEFAULT_EVENT_IMAGE).await;

    let going = state
        .repos
        .rsvps
        .going_counts(&[id])
        .await?
        .get(&id)
        .copied()
        .unwrap_or(0);
    Ok(success(EventView::new(&state, event, going, now), "Event image updated!"))
}

/// Completed events and events whose end has passed, newest first.
pub async fn list_completed(
    MaybeUser(viewer): MaybeUser,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let now = Utc::now();
    let events = state.repos.events.list_finished(now).await?;
    let views = views(&state, events, now).await?;

    let mut finished = Vec::with_capacity(views.len());
    for view in views {
        let (can_rate, user_rating) = match viewer {
            Some(user_id) => {
                let rating = state.repos.ratings.find(view.event.id, user_id).await?;
                let attended = state
                    .repos
                    .rsvps
                    .find(view.event.id, user_id)
                    .await?
                    .is_some_and(|r| r.status == RsvpStatus::Going);
                (Some(rating.is_none() && attended), rating)
            }
            None => (None, None),
        };
        finished.push(FinishedEventView {
            view,
            can_rate,
            user_rating,
        });
    }

    let message = format!("{} completed event(s)", finished.len());
    Ok(success(finished, message))
}
