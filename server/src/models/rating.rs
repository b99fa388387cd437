use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const MIN_STARS: i16 = 1;
pub const MAX_STARS: i16 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Rating {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub stars: i16,
    pub feedback: String,
    pub created_at: DateTime<Utc>,
}

pub fn stars_in_range(stars: i16) -> bool {
    (MIN_STARS..=MAX_STARS).contains(&stars)
}
