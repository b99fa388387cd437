use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use eventplanner_server::config::{Config, MailConfig, MediaConfig, StorageBackendKind};
use eventplanner_server::models::event::{Event, EventDraft};
use eventplanner_server::models::rsvp::RsvpStatus;
use eventplanner_server::models::user::{User, DEFAULT_AVATAR};
use eventplanner_server::repository::{EventRepository, Repositories};
use eventplanner_server::routes::create_routes;
use eventplanner_server::state::AppState;
use eventplanner_server::storage::MediaRoot;
use eventplanner_server::utils::error::{AppError, AppResult};

struct TestApp {
    router: Router,
    repos: Repositories,
    media: TempDir,
}

fn config(backend: StorageBackendKind) -> Config {
    Config {
        database_url: String::new(),
        bind_addr: ([127, 0, 0, 1], 0).into(),
        site_url: "http://localhost:8000".to_string(),
        cors_allowed_origins: None,
        production: false,
        media: MediaConfig {
            backend,
            root: None,
            disk_root: None,
            db_location: "uploads".to_string(),
        },
        mail: MailConfig {
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            from_address: "noreply@example.com".to_string(),
        },
    }
}

fn app(backend: StorageBackendKind) -> TestApp {
    app_with(backend, Repositories::in_memory())
}

fn app_with(backend: StorageBackendKind, repos: Repositories) -> TestApp {
    let media = TempDir::new().unwrap();
    let config = config(backend);
    let root = Arc::new(MediaRoot::with_fallbacks(media.path().to_path_buf(), Vec::new()));
    let state = AppState::with_media_root(repos.clone(), &config.media, root);
    TestApp {
        router: create_routes(state, &config),
        repos,
        media,
    }
}

async fn user(repos: &Repositories, username: &str) -> Uuid {
    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: format!("{username}@example.com"),
        first_name: String::new(),
        avatar: DEFAULT_AVATAR.to_string(),
        created_at: Utc::now(),
    };
    repos.users.insert(&user).await.unwrap();
    user.id
}

async fn past_event(repos: &Repositories, creator: Uuid) -> Event {
    event_in_days(repos, creator, "Last week's meetup", -3).await
}

/// An event starting `days` from now (negative for the past), lasting no time.
async fn event_in_days(repos: &Repositories, creator: Uuid, title: &str, days: i64) -> Event {
    let start = Utc::now() + Duration::days(days);
    let draft = EventDraft {
        title: title.into(),
        description: String::new(),
        location: "Hall A".into(),
        date: start.date_naive(),
        time: start.time(),
        duration: Default::default(),
        auto_complete: Default::default(),
        capacity: None,
    };
    let created = start.min(Utc::now()) - Duration::days(7);
    let event = Event::create(creator, draft, created).unwrap();
    repos.events.insert(&event).await.unwrap();
    event
}

fn request(method: &str, uri: &str, user: Option<Uuid>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(id) = user {
        builder = builder.header("x-user-id", id.to_string());
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, req).await;
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

const BOUNDARY: &str = "eventplanner-boundary";

fn upload(uri: &str, user: Uuid, field: &str, file_name: &str, data: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
         Content-Type: image/png\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("x-user-id", user.to_string())
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

fn dimensions(path: &Path) -> (u32, u32) {
    image::open(path).unwrap().dimensions()
}

fn future_event_body() -> Value {
    json!({
        "title": "Rust meetup",
        "description": "Talks and pizza",
        "location": "Hall A",
        "date": "2099-06-10",
        "time": "18:00:00",
        "duration": {"days": 0, "hours": 3},
        "auto_complete": {"days": 1, "hours": 0},
        "capacity": 40
    })
}

#[tokio::test]
async fn health_check_responds() {
    let app = app(StorageBackendKind::FileSystem);
    let (status, body) = send_json(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn creating_an_event_derives_its_end_and_auto_complete_time() {
    let app = app(StorageBackendKind::FileSystem);
    let alice = user(&app.repos, "alice").await;

    let (status, body) =
        send_json(&app, request("POST", "/events", Some(alice), Some(future_event_body()))).await;
    assert_eq!(status, StatusCode::CREATED);
    let data = &body["data"];
    assert_eq!(data["end_datetime"], "2099-06-10T21:00:00Z");
    assert_eq!(data["auto_complete_datetime"], "2099-06-11T18:00:00Z");
    assert_eq!(data["is_completed"], false);
    assert_eq!(data["creator_id"], alice.to_string());
    assert_eq!(data["image_url"], "/media/event_pics/event_default.png");
}

#[tokio::test]
async fn creating_an_event_requires_a_known_user() {
    let app = app(StorageBackendKind::FileSystem);
    let (status, body) =
        send_json(&app, request("POST", "/events", None, Some(future_event_body()))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_ERROR");

    let stranger = Uuid::new_v4();
    let req = request("POST", "/events", Some(stranger), Some(future_event_body()));
    let (status, _) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn out_of_range_hours_are_rejected() {
    let app = app(StorageBackendKind::FileSystem);
    let alice = user(&app.repos, "alice").await;
    let mut body = future_event_body();
    body["duration"] = json!({"days": 0, "hours": 24});

    let (status, body) = send_json(&app, request("POST", "/events", Some(alice), Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn only_the_creator_can_complete_an_event() {
    let app = app(StorageBackendKind::FileSystem);
    let alice = user(&app.repos, "alice").await;
    let bob = user(&app.repos, "bob").await;
    let event = past_event(&app.repos, alice).await;
    let uri = format!("/events/{}/complete", event.id);

    let (status, body) = send_json(&app, request("POST", &uri, Some(bob), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["error"]["message"],
        "Only the event creator can mark events as completed."
    );
    let stored = app.repos.events.find_by_id(event.id).await.unwrap().unwrap();
    assert!(!stored.is_completed);

    let (status, body) = send_json(&app, request("POST", &uri, Some(alice), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "Event \"Last week's meetup\" has been marked as completed!"
    );
    let stored = app.repos.events.find_by_id(event.id).await.unwrap().unwrap();
    assert!(stored.is_completed);
}

#[tokio::test]
async fn undoing_an_open_event_conflicts() {
    let app = app(StorageBackendKind::FileSystem);
    let alice = user(&app.repos, "alice").await;
    let event = past_event(&app.repos, alice).await;

    let uri = format!("/events/{}/undo-complete", event.id);
    let (status, body) = send_json(&app, request("POST", &uri, Some(alice), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn rsvp_is_unique_per_user_and_event() {
    let app = app(StorageBackendKind::FileSystem);
    let alice = user(&app.repos, "alice").await;
    let bob = user(&app.repos, "bob").await;
    let (_, created) =
        send_json(&app, request("POST", "/events", Some(alice), Some(future_event_body()))).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/events/{id}/rsvp");

    let (status, body) =
        send_json(&app, request("POST", &uri, Some(bob), Some(json!({"status": "going"})))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "RSVP updated! You are going to this event.");

    let (status, _) = send_json(
        &app,
        request("POST", &uri, Some(bob), Some(json!({"status": "not_going"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let event_id: Uuid = id.parse().unwrap();
    let rsvps = app.repos.rsvps.list_for_user(bob).await.unwrap();
    assert_eq!(rsvps.len(), 1);
    assert_eq!(rsvps[0].status, RsvpStatus::NotGoing);
    assert_eq!(rsvps[0].event_id, event_id);
}

#[tokio::test]
async fn past_events_refuse_rsvps_but_accept_ratings_from_attendees() {
    let app = app(StorageBackendKind::FileSystem);
    let alice = user(&app.repos, "alice").await;
    let bob = user(&app.repos, "bob").await;
    let carol = user(&app.repos, "carol").await;
    let event = past_event(&app.repos, alice).await;
    app.repos
        .rsvps
        .upsert(event.id, bob, RsvpStatus::Going, Utc::now() - Duration::days(5))
        .await
        .unwrap();

    let rsvp_uri = format!("/events/{}/rsvp", event.id);
    let (status, _) = send_json(
        &app,
        request("POST", &rsvp_uri, Some(carol), Some(json!({"status": "going"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let rating_uri = format!("/events/{}/rating", event.id);
    let rating = json!({"stars": 4, "feedback": "Great talks"});
    let (status, _) =
        send_json(&app, request("POST", &rating_uri, Some(carol), Some(rating.clone()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) =
        send_json(&app, request("POST", &rating_uri, Some(bob), Some(rating))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send_json(
        &app,
        request("POST", &rating_uri, Some(bob), Some(json!({"stars": 5}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stars"], 5);
    assert_eq!(app.repos.ratings.average(event.id).await.unwrap(), 5.0);

    let (status, _) = send_json(
        &app,
        request("POST", &rating_uri, Some(bob), Some(json!({"stars": 6}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn calendar_feed_is_a_bare_array() {
    let app = app(StorageBackendKind::FileSystem);
    let alice = user(&app.repos, "alice").await;
    send_json(&app, request("POST", "/events", Some(alice), Some(future_event_body()))).await;

    let (status, body) = send_json(&app, request("GET", "/api/calendar-events", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry["title"], "Rust meetup");
    assert_eq!(entry["start"], "2099-06-10T18:00:00");
    assert_eq!(entry["url"], format!("/events/{}", entry["id"].as_str().unwrap()));
    assert_eq!(entry["backgroundColor"], "#FF7F50");
    assert_eq!(entry["borderColor"], "#FF8C42");
    assert_eq!(entry["textColor"], "#ffffff");
}

#[tokio::test]
async fn missing_database_media_is_not_found() {
    let app = app(StorageBackendKind::Database);
    let (status, _) = send(&app, request("GET", "/db-media/abc123.png", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn database_media_falls_back_to_disk() {
    let app = app(StorageBackendKind::Database);
    let dir = app.media.path().join("event_pics");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("old.png"), b"png bytes").unwrap();

    let (status, body) =
        send(&app, request("GET", "/db-media/uploads/event_pics/old.png", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"png bytes");
}

#[tokio::test]
async fn legacy_default_avatar_name_is_served_from_its_new_location() {
    let app = app(StorageBackendKind::FileSystem);
    let dir = app.media.path().join("profile_pics");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("default.jpg"), b"jpeg bytes").unwrap();

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/media/default.jpg", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"jpeg bytes");
}

#[tokio::test]
async fn media_paths_cannot_escape_the_root() {
    let app = app(StorageBackendKind::FileSystem);
    let (status, _) = send(&app, request("GET", "/media/../secret.txt", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn registering_a_taken_username_conflicts() {
    let app = app(StorageBackendKind::FileSystem);
    let body = json!({"username": "alice", "email": "alice@example.com"});

    let (status, created) =
        send_json(&app, request("POST", "/users", None, Some(body.clone()))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["avatar"], DEFAULT_AVATAR);

    let (status, _) = send_json(&app, request("POST", "/users", None, Some(body))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

async fn create_future_event(app: &TestApp, creator: Uuid) -> String {
    let req = request("POST", "/events", Some(creator), Some(future_event_body()));
    let (status, body) = send_json(app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn event_image_is_bounded_and_replaces_the_previous_upload() {
    let app = app(StorageBackendKind::FileSystem);
    let alice = user(&app.repos, "alice").await;
    let id = create_future_event(&app, alice).await;
    let uri = format!("/events/{id}/image");
    let pics = app.media.path().join("event_pics");
    std::fs::create_dir_all(&pics).unwrap();
    std::fs::write(pics.join("event_default.png"), b"shared default").unwrap();

    let (status, body) =
        send_json(&app, upload(&uri, alice, "image", "photo.png", &png(1600, 900))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["image"], "event_pics/photo.png");
    assert_eq!(body["data"]["image_url"], "/media/event_pics/photo.png");
    assert_eq!(dimensions(&pics.join("photo.png")), (800, 450));
    assert!(pics.join("event_default.png").exists());

    let (status, body) =
        send_json(&app, upload(&uri, alice, "image", "photo.png", &png(400, 300))).await;
    assert_eq!(status, StatusCode::OK);
    let second = body["data"]["image"].as_str().unwrap().to_string();
    assert!(second.starts_with("event_pics/photo_"), "{second}");
    assert!(!pics.join("photo.png").exists());
    assert_eq!(dimensions(&app.media.path().join(&second)), (400, 300));

    let stored = app.repos.events.find_by_id(id.parse().unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.image, second);
}

#[tokio::test]
async fn only_the_creator_can_change_an_event_image() {
    let app = app(StorageBackendKind::FileSystem);
    let alice = user(&app.repos, "alice").await;
    let bob = user(&app.repos, "bob").await;
    let id = create_future_event(&app, alice).await;

    let req = upload(&format!("/events/{id}/image"), bob, "image", "photo.png", &png(10, 10));
    let (status, _) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!app.media.path().join("event_pics").join("photo.png").exists());
}

#[tokio::test]
async fn uploads_need_the_named_file_field() {
    let app = app(StorageBackendKind::FileSystem);
    let alice = user(&app.repos, "alice").await;
    let id = create_future_event(&app, alice).await;

    let req = upload(&format!("/events/{id}/image"), alice, "picture", "photo.png", b"x");
    let (status, body) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Missing 'image' file field");
}

#[tokio::test]
async fn avatar_is_bounded_and_the_default_survives_replacement() {
    let app = app(StorageBackendKind::FileSystem);
    let alice = user(&app.repos, "alice").await;
    let pics = app.media.path().join("profile_pics");
    std::fs::create_dir_all(&pics).unwrap();
    std::fs::write(pics.join("default.jpg"), b"shared default").unwrap();

    let req = upload("/users/me/avatar", alice, "avatar", "me.png", &png(600, 900));
    let (status, body) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["avatar_url"], "/media/profile_pics/me.png");
    assert_eq!(dimensions(&pics.join("me.png")), (200, 300));
    assert!(pics.join("default.jpg").exists());

    let req = upload("/users/me/avatar", alice, "avatar", "me.png", &png(50, 50));
    let (status, body) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    let second = body["data"]["avatar"].as_str().unwrap().to_string();
    assert_ne!(second, "profile_pics/me.png");
    assert!(!pics.join("me.png").exists());

    let stored = app.repos.users.find_by_id(alice).await.unwrap().unwrap();
    assert_eq!(stored.avatar, second);
}

#[tokio::test]
async fn database_uploads_are_served_back_by_key() {
    let app = app(StorageBackendKind::Database);
    let alice = user(&app.repos, "alice").await;
    let id = create_future_event(&app, alice).await;

    let req = upload(&format!("/events/{id}/image"), alice, "image", "x.png", b"notpng");
    let (status, body) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let url = body["data"]["image_url"].as_str().unwrap().to_string();
    let file = url.strip_prefix("/db-media/uploads/").unwrap();
    let token = file.strip_suffix(".png").unwrap();
    assert_eq!(token.len(), 22);
    assert_eq!(body["data"]["image"], format!("uploads/{file}"));

    let response = app
        .router
        .clone()
        .oneshot(request("GET", &url, None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"notpng");
}

#[tokio::test]
async fn only_the_creator_can_edit_or_delete_an_event() {
    let app = app(StorageBackendKind::FileSystem);
    let alice = user(&app.repos, "alice").await;
    let bob = user(&app.repos, "bob").await;
    let id = create_future_event(&app, alice).await;
    let uri = format!("/events/{id}");

    let mut edit = future_event_body();
    edit["title"] = json!("Hijacked");
    let (status, body) = send_json(&app, request("PUT", &uri, Some(bob), Some(edit.clone()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "You can only edit events you created.");

    let (status, _) = send_json(&app, request("DELETE", &uri, Some(bob), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let stored = app.repos.events.find_by_id(id.parse().unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.title, "Rust meetup");

    let (status, body) = send_json(&app, request("PUT", &uri, Some(alice), Some(edit))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Hijacked");

    let (status, _) = send_json(&app, request("DELETE", &uri, Some(alice), None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(&app, request("GET", &uri, None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn completed_listing_holds_finished_events_newest_first() {
    let app = app(StorageBackendKind::FileSystem);
    let alice = user(&app.repos, "alice").await;
    let bob = user(&app.repos, "bob").await;
    let recent = event_in_days(&app.repos, alice, "Recent", -2).await;
    let older = event_in_days(&app.repos, alice, "Older", -6).await;
    let mut closed_early = event_in_days(&app.repos, alice, "Closed early", 5).await;
    event_in_days(&app.repos, alice, "Still open", 9).await;

    closed_early.mark_completed(alice, Utc::now()).unwrap();
    app.repos.events.update(&closed_early).await.unwrap();
    let long_ago = Utc::now() - Duration::days(7);
    app.repos.rsvps.upsert(recent.id, bob, RsvpStatus::Going, long_ago).await.unwrap();
    app.repos.rsvps.upsert(older.id, bob, RsvpStatus::NotGoing, long_ago).await.unwrap();

    let (status, body) = send_json(&app, request("GET", "/events/completed", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, ["Closed early", "Recent", "Older"]);
    assert!(body["data"][0]["can_rate"].is_null());

    let (_, body) = send_json(&app, request("GET", "/events/completed", Some(bob), None)).await;
    assert_eq!(body["data"][1]["can_rate"], true);
    assert_eq!(body["data"][2]["can_rate"], false);

    app.repos
        .ratings
        .upsert(recent.id, bob, 4, String::new(), Utc::now())
        .await
        .unwrap();
    let (_, body) = send_json(&app, request("GET", "/events/completed", Some(bob), None)).await;
    assert_eq!(body["data"][1]["can_rate"], false);
    assert_eq!(body["data"][1]["user_rating"]["stars"], 4);
}

#[tokio::test]
async fn my_rsvps_split_upcoming_from_past() {
    let app = app(StorageBackendKind::FileSystem);
    let alice = user(&app.repos, "alice").await;
    let bob = user(&app.repos, "bob").await;
    let soon = event_in_days(&app.repos, alice, "Soon", 3).await;
    let later = event_in_days(&app.repos, alice, "Later", 20).await;
    let past = event_in_days(&app.repos, alice, "Past", -4).await;
    let long_ago = Utc::now() - Duration::days(7);
    for event in [&later, &soon, &past] {
        app.repos.rsvps.upsert(event.id, bob, RsvpStatus::Going, long_ago).await.unwrap();
    }

    let (status, body) = send_json(&app, request("GET", "/me/rsvps", Some(bob), None)).await;
    assert_eq!(status, StatusCode::OK);
    let upcoming = body["data"]["upcoming"].as_array().unwrap();
    assert_eq!(upcoming.len(), 2);
    assert_eq!(upcoming[0]["event"]["title"], "Soon");
    assert_eq!(upcoming[1]["event"]["title"], "Later");
    assert_eq!(upcoming[0]["can_rate"], false);

    let finished = body["data"]["past"].as_array().unwrap();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0]["event"]["title"], "Past");
    assert_eq!(finished[0]["can_rate"], true);

    app.repos.ratings.upsert(past.id, bob, 5, String::new(), Utc::now()).await.unwrap();
    let (_, body) = send_json(&app, request("GET", "/me/rsvps", Some(bob), None)).await;
    assert_eq!(body["data"]["past"][0]["can_rate"], false);
    assert_eq!(body["data"]["past"][0]["user_rating"]["stars"], 5);
}

/// Delegates to the in-memory store but refuses every update.
struct RejectingUpdates(Arc<dyn EventRepository>);

#[async_trait]
impl EventRepository for RejectingUpdates {
    async fn insert(&self, event: &Event) -> AppResult<()> {
        self.0.insert(event).await
    }
    async fn update(&self, _event: &Event) -> AppResult<()> {
        Err(AppError::InternalServerError("update refused".into()))
    }
    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        self.0.delete(id).await
    }
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Event>> {
        self.0.find_by_id(id).await
    }
    async fn list(&self) -> AppResult<Vec<Event>> {
        self.0.list().await
    }
    async fn list_finished(&self, now: DateTime<Utc>) -> AppResult<Vec<Event>> {
        self.0.list_finished(now).await
    }
    async fn find_starting_on(&self, date: NaiveDate) -> AppResult<Vec<Event>> {
        self.0.find_starting_on(date).await
    }
    async fn find_ended_on(&self, date: NaiveDate) -> AppResult<Vec<Event>> {
        self.0.find_ended_on(date).await
    }
    async fn complete_due(&self, now: DateTime<Utc>) -> AppResult<Vec<Event>> {
        self.0.complete_due(now).await
    }
}

#[tokio::test]
async fn failed_image_update_removes_the_new_file() {
    let mut repos = Repositories::in_memory();
    repos.events = Arc::new(RejectingUpdates(repos.events.clone()));
    let app = app_with(StorageBackendKind::FileSystem, repos);
    let alice = user(&app.repos, "alice").await;
    let event = event_in_days(&app.repos, alice, "Meetup", 5).await;

    let req = upload(&format!("/events/{}/image", event.id), alice, "image", "p.png", &png(8, 8));
    let (status, _) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let pics = app.media.path().join("event_pics");
    let left: Vec<_> = std::fs::read_dir(&pics)
        .map(|entries| entries.map(|e| e.unwrap().file_name()).collect())
        .unwrap_or_default();
    assert!(left.is_empty(), "{left:?}");
}
