use chrono::{DateTime, Utc};

use crate::models::event::Event;
use crate::repository::EventRepository;
use crate::utils::error::AppResult;

/// Marks every event whose auto-complete time has been reached as completed.
/// Already completed events are never selected, so a second run with the same
/// `now` finds nothing to do.
pub async fn auto_complete_events(
    events: &dyn EventRepository,
    now: DateTime<Utc>,
) -> AppResult<Vec<Event>> {
    let completed = events.complete_due(now).await?;

    for event in &completed {
        tracing::info!(
            event_id = %event.id,
            title = %event.title,
            "Event marked as completed automatically"
        );
    }
    if completed.is_empty() {
        tracing::info!("No events were auto-completed");
    } else {
        tracing::info!(count = completed.len(), "Auto-completed events");
    }

    Ok(completed)
}
