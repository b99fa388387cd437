use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{
    EventRepository, RatingRepository, ReminderLogRepository, RsvpRepository,
    StoredFileRepository, UserRepository,
};
use crate::models::event::Event;
use crate::models::rating::Rating;
use crate::models::reminder::ReminderKind;
use crate::models::rsvp::{Rsvp, RsvpStatus};
use crate::models::stored_file::StoredFile;
use crate::models::user::User;
use crate::storage::{StorageError, StorageResult};
use crate::utils::error::{AppError, AppResult};

const EVENT_COLUMNS: &str = "id, creator_id, title, description, location, start_date, start_time, \
     duration_days, duration_hours, auto_complete_days, auto_complete_hours, capacity, image, \
     end_datetime, auto_complete_datetime, is_completed, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct RatingUpsertRow {
    #[sqlx(flatten)]
    rating: Rating,
    inserted: bool,
}

#[async_trait]
impl EventRepository for PgStore {
    async fn insert(&self, event: &Event) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO events
                (id, creator_id, title, description, location, start_date, start_time,
                 duration_days, duration_hours, auto_complete_days, auto_complete_hours,
                 capacity, image, end_datetime, auto_complete_datetime, is_completed,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(event.id)
        .bind(event.creator_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.start_date)
        .bind(event.start_time)
        .bind(event.duration_days)
        .bind(event.duration_hours)
        .bind(event.auto_complete_days)
        .bind(event.auto_complete_hours)
        .bind(event.capacity)
        .bind(&event.image)
        .bind(event.end_datetime)
        .bind(event.auto_complete_datetime)
        .bind(event.is_completed)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, event: &Event) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE events SET
                title = $2, description = $3, location = $4, start_date = $5, start_time = $6,
                duration_days = $7, duration_hours = $8, auto_complete_days = $9,
                auto_complete_hours = $10, capacity = $11, image = $12, end_datetime = $13,
                auto_complete_datetime = $14, is_completed = $15, updated_at = $16
            WHERE id = $1
            "#,
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.start_date)
        .bind(event.start_time)
        .bind(event.duration_days)
        .bind(event.duration_hours)
        .bind(event.auto_complete_days)
        .bind(event.auto_complete_hours)
        .bind(event.capacity)
        .bind(&event.image)
        .bind(event.end_datetime)
        .bind(event.auto_complete_datetime)
        .bind(event.is_completed)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Event '{}' was not found", event.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn list(&self) -> AppResult<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events ORDER BY start_date, start_time"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn list_finished(&self, now: DateTime<Utc>) -> AppResult<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE is_completed OR end_datetime < $1 \
             ORDER BY start_date DESC, start_time DESC"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn find_starting_on(&self, date: NaiveDate) -> AppResult<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE start_date = $1 ORDER BY start_time"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn find_ended_on(&self, date: NaiveDate) -> AppResult<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE COALESCE((end_datetime AT TIME ZONE 'UTC')::date, start_date) = $1 \
             ORDER BY start_date, start_time"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn complete_due(&self, now: DateTime<Utc>) -> AppResult<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "UPDATE events SET is_completed = TRUE, updated_at = $1 \
             WHERE auto_complete_datetime <= $1 AND NOT is_completed \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }
}

#[async_trait]
impl RsvpRepository for PgStore {
    async fn upsert(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        status: RsvpStatus,
        now: DateTime<Utc>,
    ) -> AppResult<Rsvp> {
        let rsvp = sqlx::query_as::<_, Rsvp>(
            r#"
            INSERT INTO rsvps (id, event_id, user_id, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id, user_id) DO UPDATE SET status = EXCLUDED.status
            RETURNING id, event_id, user_id, status, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(user_id)
        .bind(status)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(rsvp)
    }

    async fn find(&self, event_id: Uuid, user_id: Uuid) -> AppResult<Option<Rsvp>> {
        let rsvp = sqlx::query_as::<_, Rsvp>(
            "SELECT id, event_id, user_id, status, created_at FROM rsvps \
             WHERE event_id = $1 AND user_id = $2",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rsvp)
    }

    async fn going_counts(&self, event_ids: &[Uuid]) -> AppResult<HashMap<Uuid, i64>> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            "SELECT event_id, COUNT(*) FROM rsvps \
             WHERE status = 'going' AND event_id = ANY($1) \
             GROUP BY event_id",
        )
        .bind(event_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn attendees(&self, event_id: Uuid) -> AppResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.username, u.email, u.first_name, u.avatar, u.created_at
            FROM rsvps r
            JOIN users u ON u.id = r.user_id
            WHERE r.event_id = $1 AND r.status = 'going'
            ORDER BY r.created_at
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Rsvp>> {
        let rsvps = sqlx::query_as::<_, Rsvp>(
            "SELECT id, event_id, user_id, status, created_at FROM rsvps WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rsvps)
    }

    async fn going_count_for_user(&self, user_id: Uuid) -> AppResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM rsvps WHERE user_id = $1 AND status = 'going'")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[async_trait]
impl RatingRepository for PgStore {
    async fn upsert(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        stars: i16,
        feedback: String,
        now: DateTime<Utc>,
    ) -> AppResult<(Rating, bool)> {
        // xmax is zero only for a freshly inserted tuple
        let row = sqlx::query_as::<_, RatingUpsertRow>(
            r#"
            INSERT INTO ratings (id, event_id, user_id, stars, feedback, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (event_id, user_id)
                DO UPDATE SET stars = EXCLUDED.stars, feedback = EXCLUDED.feedback
            RETURNING id, event_id, user_id, stars, feedback, created_at, (xmax = 0) AS inserted
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(user_id)
        .bind(stars)
        .bind(feedback)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok((row.rating, row.inserted))
    }

    async fn find(&self, event_id: Uuid, user_id: Uuid) -> AppResult<Option<Rating>> {
        let rating = sqlx::query_as::<_, Rating>(
            "SELECT id, event_id, user_id, stars, feedback, created_at FROM ratings \
             WHERE event_id = $1 AND user_id = $2",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rating)
    }

    async fn average(&self, event_id: Uuid) -> AppResult<f64> {
        let (avg,): (Option<f64>,) =
            sqlx::query_as("SELECT AVG(stars)::float8 FROM ratings WHERE event_id = $1")
                .bind(event_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(avg.unwrap_or(0.0))
    }
}

#[async_trait]
impl ReminderLogRepository for PgStore {
    async fn exists(&self, event_id: Uuid, user_id: Uuid, kind: ReminderKind) -> AppResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM reminder_logs \
             WHERE event_id = $1 AND user_id = $2 AND reminder_type = $3)",
        )
        .bind(event_id)
        .bind(user_id)
        .bind(kind)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn record(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        kind: ReminderKind,
        sent_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reminder_logs (id, event_id, user_id, reminder_type, sent_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id, user_id, reminder_type) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(user_id)
        .bind(kind)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn insert(&self, user: &User) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, first_name, avatar, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.avatar)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                AppError::Conflict(format!("Username '{}' is already taken", user.username))
            }
            _ => AppError::DatabaseError(e),
        })?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, first_name, avatar, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn set_avatar(&self, id: Uuid, avatar: &str) -> AppResult<()> {
        sqlx::query("UPDATE users SET avatar = $2 WHERE id = $1")
            .bind(id)
            .bind(avatar)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StoredFileRepository for PgStore {
    async fn insert(&self, file: &StoredFile) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO stored_files (key, content_type, created_at, data) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&file.key)
        .bind(&file.content_type)
        .bind(file.created_at)
        .bind(&file.data)
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => StorageError::AlreadyExists(file.key.clone()),
            _ => StorageError::Database(e),
        })?;
        Ok(())
    }

    async fn find(&self, key: &str) -> StorageResult<Option<StoredFile>> {
        let file = sqlx::query_as::<_, StoredFile>(
            "SELECT key, content_type, created_at, data FROM stored_files WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(file)
    }

    async fn size(&self, key: &str) -> StorageResult<Option<u64>> {
        let size: Option<(i32,)> =
            sqlx::query_as("SELECT octet_length(data) FROM stored_files WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(size.map(|(len,)| len.max(0) as u64))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM stored_files WHERE key = $1)")
                .bind(key)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM stored_files WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
