//! Process-local store with the same semantics as the Postgres one, including
//! the (event, user) uniqueness rules. Used by tests and local experiments.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
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

#[derive(Default)]
struct State {
    events: HashMap<Uuid, Event>,
    users: HashMap<Uuid, User>,
    rsvps: HashMap<(Uuid, Uuid), Rsvp>,
    ratings: HashMap<(Uuid, Uuid), Rating>,
    reminders: HashMap<(Uuid, Uuid, ReminderKind), DateTime<Utc>>,
    files: HashMap<String, StoredFile>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means another test thread panicked mid-write.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn by_start(a: &Event, b: &Event) -> std::cmp::Ordering {
    (a.start_date, a.start_time).cmp(&(b.start_date, b.start_time))
}

fn sorted(mut events: Vec<Event>) -> Vec<Event> {
    events.sort_by(by_start);
    events
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn insert(&self, event: &Event) -> AppResult<()> {
        self.lock().events.insert(event.id, event.clone());
        Ok(())
    }

    async fn update(&self, event: &Event) -> AppResult<()> {
        let mut state = self.lock();
        match state.events.get_mut(&event.id) {
            Some(existing) => {
                *existing = event.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Event '{}' was not found", event.id))),
        }
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let mut state = self.lock();
        let removed = state.events.remove(&id).is_some();
        if removed {
            state.rsvps.retain(|(event_id, _), _| *event_id != id);
            state.ratings.retain(|(event_id, _), _| *event_id != id);
            state.reminders.retain(|(event_id, _, _), _| *event_id != id);
        }
        Ok(removed)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Event>> {
        Ok(self.lock().events.get(&id).cloned())
    }

    async fn list(&self) -> AppResult<Vec<Event>> {
        Ok(sorted(self.lock().events.values().cloned().collect()))
    }

    async fn list_finished(&self, now: DateTime<Utc>) -> AppResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .lock()
            .events
            .values()
            .filter(|e| e.is_completed || e.end_datetime.is_some_and(|end| end < now))
            .cloned()
            .collect();
        events.sort_by(|a, b| by_start(b, a));
        Ok(events)
    }

    async fn find_starting_on(&self, date: NaiveDate) -> AppResult<Vec<Event>> {
        Ok(sorted(
            self.lock()
                .events
                .values()
                .filter(|e| e.start_date == date)
                .cloned()
                .collect(),
        ))
    }

    async fn find_ended_on(&self, date: NaiveDate) -> AppResult<Vec<Event>> {
        Ok(sorted(
            self.lock()
                .events
                .values()
                .filter(|e| {
                    e.end_datetime
                        .map(|end| end.date_naive())
                        .unwrap_or(e.start_date)
                        == date
                })
                .cloned()
                .collect(),
        ))
    }

    async fn complete_due(&self, now: DateTime<Utc>) -> AppResult<Vec<Event>> {
        let mut state = self.lock();
        let mut completed = Vec::new();
        for event in state.events.values_mut() {
            if event.is_auto_complete_due(now) {
                event.is_completed = true;
                event.updated_at = now;
                completed.push(event.clone());
            }
        }
        Ok(sorted(completed))
    }
}

#[async_trait]
impl RsvpRepository for MemoryStore {
    async fn upsert(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        status: RsvpStatus,
        now: DateTime<Utc>,
    ) -> AppResult<Rsvp> {
        let mut state = self.lock();
        let rsvp = state
            .rsvps
            .entry((event_id, user_id))
            .and_modify(|r| r.status = status)
            .or_insert_with(|| Rsvp {
                id: Uuid::new_v4(),
                event_id,
                user_id,
                status,
                created_at: now,
            });
        Ok(rsvp.clone())
    }

    async fn find(&self, event_id: Uuid, user_id: Uuid) -> AppResult<Option<Rsvp>> {
        Ok(self.lock().rsvps.get(&(event_id, user_id)).cloned())
    }

    async fn going_counts(&self, event_ids: &[Uuid]) -> AppResult<HashMap<Uuid, i64>> {
        let state = self.lock();
        let mut counts = HashMap::new();
        for rsvp in state.rsvps.values() {
            if rsvp.status == RsvpStatus::Going && event_ids.contains(&rsvp.event_id) {
                *counts.entry(rsvp.event_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn attendees(&self, event_id: Uuid) -> AppResult<Vec<User>> {
        let state = self.lock();
        let mut going: Vec<&Rsvp> = state
            .rsvps
            .values()
            .filter(|r| r.event_id == event_id && r.status == RsvpStatus::Going)
            .collect();
        going.sort_by_key(|r| r.created_at);
        Ok(going
            .into_iter()
            .filter_map(|r| state.users.get(&r.user_id).cloned())
            .collect())
    }

    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Rsvp>> {
        Ok(self
            .lock()
            .rsvps
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn going_count_for_user(&self, user_id: Uuid) -> AppResult<i64> {
        let count = self
            .lock()
            .rsvps
            .values()
            .filter(|r| r.user_id == user_id && r.status == RsvpStatus::Going)
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl RatingRepository for MemoryStore {
    async fn upsert(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        stars: i16,
        feedback: String,
        now: DateTime<Utc>,
    ) -> AppResult<(Rating, bool)> {
        let mut state = self.lock();
        match state.ratings.get_mut(&(event_id, user_id)) {
            Some(existing) => {
                existing.stars = stars;
                existing.feedback = feedback;
                Ok((existing.clone(), false))
            }
            None => {
                let rating = Rating {
                    id: Uuid::new_v4(),
                    event_id,
                    user_id,
                    stars,
                    feedback,
                    created_at: now,
                };
                state.ratings.insert((event_id, user_id), rating.clone());
                Ok((rating, true))
            }
        }
    }

    async fn find(&self, event_id: Uuid, user_id: Uuid) -> AppResult<Option<Rating>> {
        Ok(self.lock().ratings.get(&(event_id, user_id)).cloned())
    }

    async fn average(&self, event_id: Uuid) -> AppResult<f64> {
        let state = self.lock();
        let stars: Vec<i16> = state
            .ratings
            .values()
            .filter(|r| r.event_id == event_id)
            .map(|r| r.stars)
            .collect();
        if stars.is_empty() {
            return Ok(0.0);
        }
        let total: i64 = stars.iter().map(|&s| i64::from(s)).sum();
        Ok(total as f64 / stars.len() as f64)
    }
}

#[async_trait]
impl ReminderLogRepository for MemoryStore {
    async fn exists(&self, event_id: Uuid, user_id: Uuid, kind: ReminderKind) -> AppResult<bool> {
        Ok(self.lock().reminders.contains_key(&(event_id, user_id, kind)))
    }

    async fn record(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        kind: ReminderKind,
        sent_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.lock()
            .reminders
            .entry((event_id, user_id, kind))
            .or_insert(sent_at);
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: &User) -> AppResult<()> {
        let mut state = self.lock();
        if state.users.values().any(|u| u.username == user.username) {
            return Err(AppError::Conflict(format!(
                "Username '{}' is already taken",
                user.username
            )));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn set_avatar(&self, id: Uuid, avatar: &str) -> AppResult<()> {
        if let Some(user) = self.lock().users.get_mut(&id) {
            user.avatar = avatar.to_string();
        }
        Ok(())
    }
}

#[async_trait]
impl StoredFileRepository for MemoryStore {
    async fn insert(&self, file: &StoredFile) -> StorageResult<()> {
        let mut state = self.lock();
        if state.files.contains_key(&file.key) {
            return Err(StorageError::AlreadyExists(file.key.clone()));
        }
        state.files.insert(file.key.clone(), file.clone());
        Ok(())
    }

    async fn find(&self, key: &str) -> StorageResult<Option<StoredFile>> {
        Ok(self.lock().files.get(key).cloned())
    }

    async fn size(&self, key: &str) -> StorageResult<Option<u64>> {
        Ok(self.lock().files.get(key).map(|f| f.data.len() as u64))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.lock().files.contains_key(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.lock().files.remove(key);
        Ok(())
    }
}
