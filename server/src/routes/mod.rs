use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, Config, SecurityHeaders};
use crate::handlers::{attendance, calendar, completion, events, health_check, media, users};
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .route("/users", post(users::register))
        .route("/users/me", get(users::me))
        .route("/users/me/avatar", put(users::upload_avatar))
        .route("/events", get(events::list_events).post(events::create_event))
        .route("/events/completed", get(events::list_completed))
        .route(
            "/events/:id",
            get(events::get_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route("/events/:id/image", put(events::upload_event_image))
        .route("/events/:id/rsvp", post(attendance::rsvp_event))
        .route("/events/:id/rating", post(attendance::rate_event))
        .route("/events/:id/complete", post(completion::mark_completed))
        .route("/events/:id/undo-complete", post(completion::undo_completed))
        .route("/me/rsvps", get(attendance::my_rsvps))
        .route("/api/calendar-events", get(calendar::calendar_events))
        .route("/media/*path", get(media::serve_media))
        .route("/db-media/*path", get(media::serve_db_media))
        .with_state(state);

    SecurityHeaders::new(config.production)
        .apply(api)
        .layer(create_cors_layer(config.cors_allowed_origins.as_deref()))
        .layer(TraceLayer::new_for_http())
}
