//! Persistence seams. Handlers and batch jobs talk to these traits only; the
//! Postgres store backs them in production and the in-memory store in tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::event::Event;
use crate::models::rating::Rating;
use crate::models::reminder::ReminderKind;
use crate::models::rsvp::{Rsvp, RsvpStatus};
use crate::models::stored_file::StoredFile;
use crate::models::user::User;
use crate::storage::StorageResult;
use crate::utils::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn insert(&self, event: &Event) -> AppResult<()>;
    async fn update(&self, event: &Event) -> AppResult<()>;
    /// Returns `false` when no such event existed.
    async fn delete(&self, id: Uuid) -> AppResult<bool>;
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Event>>;
    /// All events in (date, time) order.
    async fn list(&self) -> AppResult<Vec<Event>>;
    /// Events that are completed or whose end has passed, newest first.
    async fn list_finished(&self, now: DateTime<Utc>) -> AppResult<Vec<Event>>;
    async fn find_starting_on(&self, date: NaiveDate) -> AppResult<Vec<Event>>;
    /// Events whose end falls on `date`; rows without an end use their start date.
    async fn find_ended_on(&self, date: NaiveDate) -> AppResult<Vec<Event>>;
    /// Flags every due, not yet completed event as completed and returns them.
    async fn complete_due(&self, now: DateTime<Utc>) -> AppResult<Vec<Event>>;
}

#[async_trait]
pub trait RsvpRepository: Send + Sync {
    /// Creates or replaces the single RSVP of `user_id` for `event_id`.
    async fn upsert(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        status: RsvpStatus,
        now: DateTime<Utc>,
    ) -> AppResult<Rsvp>;
    async fn find(&self, event_id: Uuid, user_id: Uuid) -> AppResult<Option<Rsvp>>;
    async fn going_counts(&self, event_ids: &[Uuid]) -> AppResult<HashMap<Uuid, i64>>;
    /// Users whose RSVP for the event is `going`.
    async fn attendees(&self, event_id: Uuid) -> AppResult<Vec<User>>;
    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Rsvp>>;
    async fn going_count_for_user(&self, user_id: Uuid) -> AppResult<i64>;
}

#[async_trait]
pub trait RatingRepository: Send + Sync {
    /// Creates or replaces the single rating; the flag is `true` on creation.
    async fn upsert(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        stars: i16,
        feedback: String,
        now: DateTime<Utc>,
    ) -> AppResult<(Rating, bool)>;
    async fn find(&self, event_id: Uuid, user_id: Uuid) -> AppResult<Option<Rating>>;
    /// Mean star count, `0.0` when unrated.
    async fn average(&self, event_id: Uuid) -> AppResult<f64>;
}

#[async_trait]
pub trait ReminderLogRepository: Send + Sync {
    async fn exists(&self, event_id: Uuid, user_id: Uuid, kind: ReminderKind) -> AppResult<bool>;
    async fn record(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        kind: ReminderKind,
        sent_at: DateTime<Utc>,
    ) -> AppResult<()>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: &User) -> AppResult<()>;
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn set_avatar(&self, id: Uuid, avatar: &str) -> AppResult<()>;
}

#[async_trait]
pub trait StoredFileRepository: Send + Sync {
    async fn insert(&self, file: &StoredFile) -> StorageResult<()>;
    async fn find(&self, key: &str) -> StorageResult<Option<StoredFile>>;
    async fn size(&self, key: &str) -> StorageResult<Option<u64>>;
    async fn exists(&self, key: &str) -> StorageResult<bool>;
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

#[derive(Clone)]
pub struct Repositories {
    pub events: Arc<dyn EventRepository>,
    pub rsvps: Arc<dyn RsvpRepository>,
    pub ratings: Arc<dyn RatingRepository>,
    pub reminders: Arc<dyn ReminderLogRepository>,
    pub users: Arc<dyn UserRepository>,
    pub stored_files: Arc<dyn StoredFileRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self::from_store(Arc::new(PgStore::new(pool)))
    }

    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::default()))
    }

    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: EventRepository
            + RsvpRepository
            + RatingRepository
            + ReminderLogRepository
            + UserRepository
            + StoredFileRepository
            + 'static,
    {
        Self {
            events: store.clone(),
            rsvps: store.clone(),
            ratings: store.clone(),
            reminders: store.clone(),
            users: store.clone(),
            stored_files: store,
        }
    }
}
