//! Batch entry points run by an external scheduler (cron or similar).
//! Each one takes `now` explicitly and returns what it did.

use serde::Serialize;

pub mod auto_complete;
pub mod reminders;

pub use auto_complete::auto_complete_events;
pub use reminders::{send_event_reminders, send_rating_requests};

/// Outcome of one notification sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub sent: usize,
    /// Recipients that were already notified or no longer need the message.
    pub skipped: usize,
    pub failed: usize,
}
