use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::models::user::User;
use crate::state::AppState;
use crate::utils::error::AppError;

/// Set by the authenticating proxy in front of the service.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The registered user making the request.
pub struct CurrentUser(pub User);

/// The caller's user id if the request carries one.
pub struct MaybeUser(pub Option<Uuid>);

fn header_user_id(parts: &Parts) -> Result<Option<Uuid>, AppError> {
    let Some(raw) = parts.headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    raw.to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .map(Some)
        .ok_or_else(|| AppError::AuthError("Malformed user id header".to_string()))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let id = header_user_id(parts)?
            .ok_or_else(|| AppError::AuthError("Login required".to_string()))?;
        let user = state
            .repos
            .users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::AuthError("Unknown user".to_string()))?;
        Ok(CurrentUser(user))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(header_user_id(parts)?))
    }
}
