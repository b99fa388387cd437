use axum::extract::{Multipart, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{discard_media, read_upload};
use crate::models::user::{User, DEFAULT_AVATAR};
use crate::state::AppState;
use crate::storage::resize::{fit_or_keep_blocking, AVATAR_MAX};
use crate::utils::error::{AppError, AppResult};
use crate::utils::extract::CurrentUser;
use crate::utils::response::{created, success};

const USERNAME_MAX: usize = 150;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileView {
    #[serde(flatten)]
    pub user: User,
    pub avatar_url: String,
    pub going_rsvp_count: i64,
    pub my_events: Vec<Uuid>,
}

fn validate(req: &RegisterRequest) -> AppResult<()> {
    let username = req.username.trim();
    if username.is_empty() || username.chars().count() > USERNAME_MAX {
        return Err(AppError::ValidationError(format!(
            "Username must be 1 to {} characters",
            USERNAME_MAX
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
    {
        return Err(AppError::ValidationError(
            "Username may only contain letters, digits and @/./+/-/_".to_string(),
        ));
    }
    let email = req.email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AppError::ValidationError("Enter a valid email address".to_string())),
    }
}

async fn profile(state: &AppState, user: User) -> AppResult<ProfileView> {
    let going_rsvp_count = state.repos.rsvps.going_count_for_user(user.id).await?;
    let my_events = state
        .repos
        .events
        .list()
        .await?
        .into_iter()
        .filter(|e| e.creator_id == user.id)
        .map(|e| e.id)
        .collect();
    Ok(ProfileView {
        avatar_url: state.storage.url(&user.avatar),
        going_rsvp_count,
        my_events,
        user,
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Response> {
    validate(&req)?;
    let user = User {
        id: Uuid::new_v4(),
        username: req.username.trim().to_string(),
        email: req.email.trim().to_string(),
        first_name: req.first_name.trim().to_string(),
        avatar: DEFAULT_AVATAR.to_string(),
        created_at: Utc::now(),
    };
    state.repos.users.insert(&user).await?;

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");
    let message = format!("Account created for {}!", user.username);
    Ok(created(user, message))
}

pub async fn me(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> AppResult<Response> {
    Ok(success(profile(&state, user).await?, "Profile retrieved"))
}

pub async fn upload_avatar(
    CurrentUser(mut user): CurrentUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Response> {
    let (file_name, mut upload) = read_upload(multipart, "avatar").await?;
    upload.data = fit_or_keep_blocking(upload.data, AVATAR_MAX, "avatar").await;
    let stored = state
        .storage
        .save(&format!("profile_pics/{}", file_name), upload)
        .await?;

    if let Err(e) = state.repos.users.set_avatar(user.id, &stored).await {
        discard_media(&state, &stored, DEFAULT_AVATAR).await;
        return Err(e);
    }
    let previous = std::mem::replace(&mut user.avatar, stored);
    discard_media(&state, &previous, DEFAULT_AVATAR).await;

    Ok(success(profile(&state, user).await?, "Your account has been updated!"))
}
