use axum::extract::State;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::models::event::Event;
use crate::state::AppState;
use crate::utils::error::AppResult;

const BACKGROUND_COLOR: &str = "#FF7F50";
const BORDER_COLOR: &str = "#FF8C42";
const TEXT_COLOR: &str = "#ffffff";

/// One entry of the calendar widget feed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEntry {
    pub id: Uuid,
    pub title: String,
    pub start: String,
    pub url: String,
    pub background_color: &'static str,
    pub border_color: &'static str,
    pub text_color: &'static str,
}

impl From<&Event> for CalendarEntry {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            title: event.title.clone(),
            start: format!(
                "{}T{}",
                event.start_date.format("%Y-%m-%d"),
                event.start_time.format("%H:%M:%S")
            ),
            url: format!("/events/{}", event.id),
            background_color: BACKGROUND_COLOR,
            border_color: BORDER_COLOR,
            text_color: TEXT_COLOR,
        }
    }
}

/// Every event as a bare JSON array, the shape calendar widgets consume.
pub async fn calendar_events(State(state): State<AppState>) -> AppResult<Json<Vec<CalendarEntry>>> {
    let events = state.repos.events.list().await?;
    Ok(Json(events.iter().map(CalendarEntry::from).collect()))
}
