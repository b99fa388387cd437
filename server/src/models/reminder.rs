use serde::{Deserialize, Serialize};

/// Which notification a `reminder_logs` row records. One row per event, user
/// and kind suppresses repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reminder_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    PreEvent,
    PostEvent,
}
