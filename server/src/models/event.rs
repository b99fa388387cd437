use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_EVENT_IMAGE: &str = "event_pics/event_default.png";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    pub description: String,
    pub location: String,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_days: i32,
    pub duration_hours: i32,
    pub auto_complete_days: i32,
    pub auto_complete_hours: i32,
    pub capacity: Option<i32>,
    pub image: String,
    pub end_datetime: Option<DateTime<Utc>>,
    pub auto_complete_datetime: Option<DateTime<Utc>>,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Largest hour component of a [`DayHours`] span; whole days carry the rest.
pub const MAX_HOURS: u32 = 23;

/// A span expressed the way organizers enter it: whole days plus hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub days: u32,
    pub hours: u32,
}

impl DayHours {
    pub fn new(days: u32, hours: u32) -> Self {
        Self { days, hours }
    }

    pub fn is_zero(&self) -> bool {
        self.days == 0 && self.hours == 0
    }

    fn check_hours(self, what: &'static str) -> Result<Self, ScheduleError> {
        if self.hours > MAX_HOURS {
            return Err(ScheduleError::HoursOutOfRange(what));
        }
        Ok(self)
    }

    fn to_delta(self) -> TimeDelta {
        TimeDelta::days(i64::from(self.days)) + TimeDelta::hours(i64::from(self.hours))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("event {0} falls outside the supported calendar range")]
    OutOfRange(&'static str),

    #[error("{0} must not exceed {max}", max = i32::MAX)]
    TooLarge(&'static str),

    #[error("{0} hours must be between 0 and {max}", max = MAX_HOURS)]
    HoursOutOfRange(&'static str),
}

/// Values an organizer supplies when creating or editing an event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub location: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default)]
    pub duration: DayHours,
    #[serde(default)]
    pub auto_complete: DayHours,
    pub capacity: Option<u32>,
}

/// Instants derived from an event's start and its configured spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub end_datetime: DateTime<Utc>,
    pub auto_complete_datetime: Option<DateTime<Utc>>,
}

impl Schedule {
    /// Derives the end instant (`start + duration`) and, when an offset is
    /// configured, the auto-complete instant (`start + offset`).
    pub fn derive(
        date: NaiveDate,
        time: NaiveTime,
        duration: DayHours,
        auto_complete: DayHours,
    ) -> Result<Self, ScheduleError> {
        let duration = duration.check_hours("Duration")?;
        let auto_complete = auto_complete.check_hours("Auto-complete")?;
        let start = start_instant(date, time);

        let end_datetime = start
            .checked_add_signed(duration.to_delta())
            .ok_or(ScheduleError::OutOfRange("end"))?;

        let auto_complete_datetime = if auto_complete.is_zero() {
            None
        } else {
            Some(
                start
                    .checked_add_signed(auto_complete.to_delta())
                    .ok_or(ScheduleError::OutOfRange("auto-complete time"))?,
            )
        };

        Ok(Self {
            end_datetime,
            auto_complete_datetime,
        })
    }
}

fn start_instant(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&NaiveDateTime::new(date, time))
}

fn to_column(value: u32, field: &'static str) -> Result<i32, ScheduleError> {
    i32::try_from(value).map_err(|_| ScheduleError::TooLarge(field))
}

/// Why a manual completion change was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("Only the event creator can mark events as completed.")]
    NotCreatorComplete,

    #[error("Only the event creator can undo marking events as completed.")]
    NotCreatorUndo,

    #[error("Event \"{0}\" is not marked as completed.")]
    NotCompleted(String),
}

impl Event {
    /// Builds a new event, computing its derived instants before it is ever
    /// persisted.
    pub fn create(
        creator_id: Uuid,
        draft: EventDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, ScheduleError> {
        let mut event = Self {
            id: Uuid::new_v4(),
            creator_id,
            title: String::new(),
            description: String::new(),
            location: String::new(),
            start_date: draft.date,
            start_time: draft.time,
            duration_days: 0,
            duration_hours: 0,
            auto_complete_days: 0,
            auto_complete_hours: 0,
            capacity: None,
            image: DEFAULT_EVENT_IMAGE.to_string(),
            end_datetime: None,
            auto_complete_datetime: None,
            is_completed: false,
            created_at: now,
            updated_at: now,
        };
        event.apply(draft, now)?;
        Ok(event)
    }

    /// Replaces the editable fields and recomputes the derived instants. On
    /// error the event is left untouched.
    pub fn apply(&mut self, draft: EventDraft, now: DateTime<Utc>) -> Result<(), ScheduleError> {
        let schedule =
            Schedule::derive(draft.date, draft.time, draft.duration, draft.auto_complete)?;
        let capacity = draft
            .capacity
            .map(|c| to_column(c, "capacity"))
            .transpose()?;
        let duration_days = to_column(draft.duration.days, "duration days")?;
        let duration_hours = to_column(draft.duration.hours, "duration hours")?;
        let auto_complete_days = to_column(draft.auto_complete.days, "auto-complete days")?;
        let auto_complete_hours = to_column(draft.auto_complete.hours, "auto-complete hours")?;

        self.title = draft.title;
        self.description = draft.description;
        self.location = draft.location;
        self.start_date = draft.date;
        self.start_time = draft.time;
        self.duration_days = duration_days;
        self.duration_hours = duration_hours;
        self.auto_complete_days = auto_complete_days;
        self.auto_complete_hours = auto_complete_hours;
        self.capacity = capacity;
        self.end_datetime = Some(schedule.end_datetime);
        self.auto_complete_datetime = schedule.auto_complete_datetime;
        self.updated_at = now;
        Ok(())
    }

    pub fn starts_at(&self) -> DateTime<Utc> {
        start_instant(self.start_date, self.start_time)
    }

    /// Past once `now` is beyond the end instant; rows without one fall back
    /// to comparing calendar dates.
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        match self.end_datetime {
            Some(end) => now > end,
            None => now.date_naive() > self.start_date,
        }
    }

    pub fn can_be_marked_completed(&self, now: DateTime<Utc>) -> bool {
        self.is_past(now) || self.is_completed
    }

    pub fn is_auto_complete_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed && self.auto_complete_datetime.is_some_and(|at| at <= now)
    }

    pub fn mark_completed(
        &mut self,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), CompletionError> {
        if actor != self.creator_id {
            return Err(CompletionError::NotCreatorComplete);
        }
        self.is_completed = true;
        self.updated_at = now;
        Ok(())
    }

    pub fn undo_completed(
        &mut self,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), CompletionError> {
        if actor != self.creator_id {
            return Err(CompletionError::NotCreatorUndo);
        }
        if !self.is_completed {
            return Err(CompletionError::NotCompleted(self.title.clone()));
        }
        self.is_completed = false;
        self.updated_at = now;
        Ok(())
    }
}
