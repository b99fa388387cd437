use chrono::{DateTime, Days, NaiveDate, Utc};

use super::SweepReport;
use crate::mail::{EmailMessage, Mailer};
use crate::models::event::Event;
use crate::models::reminder::ReminderKind;
use crate::models::user::User;
use crate::repository::Repositories;
use crate::utils::error::{AppError, AppResult};

/// How far ahead of an event attendees are reminded.
pub const REMINDER_LEAD_DAYS: u64 = 2;

/// Emails every `going` attendee of events starting in two days, once.
pub async fn send_event_reminders(
    repos: &Repositories,
    mailer: &dyn Mailer,
    now: DateTime<Utc>,
) -> AppResult<SweepReport> {
    let day = shift(now.date_naive(), REMINDER_LEAD_DAYS, true)?;
    let events = repos.events.find_starting_on(day).await?;
    let mut report = SweepReport::default();

    for event in &events {
        for user in repos.rsvps.attendees(event.id).await? {
            if repos
                .reminders
                .exists(event.id, user.id, ReminderKind::PreEvent)
                .await?
            {
                report.skipped += 1;
                continue;
            }
            let message = pre_event_message(event, &user);
            let kind = ReminderKind::PreEvent;
            deliver(repos, mailer, event, &user, kind, &message, now, &mut report).await;
        }
    }

    tracing::info!(
        date = %day,
        events = events.len(),
        sent = report.sent,
        skipped = report.skipped,
        failed = report.failed,
        "Event reminder sweep finished"
    );
    Ok(report)
}

/// Asks `going` attendees of events that ended yesterday to rate them, unless
/// they already did or were already asked.
pub async fn send_rating_requests(
    repos: &Repositories,
    mailer: &dyn Mailer,
    site_url: &str,
    now: DateTime<Utc>,
) -> AppResult<SweepReport> {
    let day = shift(now.date_naive(), 1, false)?;
    let events = repos.events.find_ended_on(day).await?;
    let mut report = SweepReport::default();

    for event in &events {
        for user in repos.rsvps.attendees(event.id).await? {
            let already_asked = repos
                .reminders
                .exists(event.id, user.id, ReminderKind::PostEvent)
                .await?;
            if already_asked || repos.ratings.find(event.id, user.id).await?.is_some() {
                report.skipped += 1;
                continue;
            }
            let message = rating_request_message(event, &user, site_url);
            let kind = ReminderKind::PostEvent;
            deliver(repos, mailer, event, &user, kind, &message, now, &mut report).await;
        }
    }

    tracing::info!(
        date = %day,
        events = events.len(),
        sent = report.sent,
        skipped = report.skipped,
        failed = report.failed,
        "Rating request sweep finished"
    );
    Ok(report)
}

fn shift(day: NaiveDate, days: u64, forward: bool) -> AppResult<NaiveDate> {
    let shifted = if forward {
        day.checked_add_days(Days::new(days))
    } else {
        day.checked_sub_days(Days::new(days))
    };
    shifted.ok_or_else(|| AppError::InternalServerError(format!("date out of range: {day}")))
}

/// Sends one message and records it. Failures are logged and counted but
/// never abort the sweep; without a log entry the recipient is retried on the
/// next run.
#[allow(clippy::too_many_arguments)]
async fn deliver(
    repos: &Repositories,
    mailer: &dyn Mailer,
    event: &Event,
    user: &User,
    kind: ReminderKind,
    message: &EmailMessage,
    now: DateTime<Utc>,
    report: &mut SweepReport,
) {
    if let Err(e) = mailer.send(message).await {
        tracing::warn!(
            event_id = %event.id,
            to = %user.email,
            kind = ?kind,
            error = %e,
            "Failed to send notification"
        );
        report.failed += 1;
        return;
    }

    match repos.reminders.record(event.id, user.id, kind, now).await {
        Ok(()) => {
            tracing::info!(event_id = %event.id, to = %user.email, ?kind, "Notification sent");
            report.sent += 1;
        }
        Err(e) => {
            tracing::error!(
                event_id = %event.id,
                to = %user.email,
                kind = ?kind,
                error = %e,
                "Notification sent but not recorded"
            );
            report.failed += 1;
        }
    }
}

pub fn pre_event_message(event: &Event, user: &User) -> EmailMessage {
    EmailMessage {
        to: user.email.clone(),
        subject: format!("Reminder: {} is in 2 days!", event.title),
        body: format!(
            "Hi {name},\n\n\
             This is a friendly reminder that you have RSVP'd to attend:\n\n\
             Event: {title}\n\
             Date: {date}\n\
             Time: {time}\n\
             Location: {location}\n\n\
             We're looking forward to seeing you there!\n\n\
             Best regards,\n\
             Event Planner Team\n",
            name = user.greeting_name(),
            title = event.title,
            date = event.start_date.format("%B %d, %Y"),
            time = event.start_time.format("%I:%M %p"),
            location = event.location,
        ),
    }
}

pub fn rating_request_message(event: &Event, user: &User, site_url: &str) -> EmailMessage {
    EmailMessage {
        to: user.email.clone(),
        subject: format!("How was {}? Please rate your experience!", event.title),
        body: format!(
            "Hi {name},\n\n\
             Thank you for attending {title} yesterday!\n\n\
             We hope you had a great time. Please take a moment to rate your experience \
             and help other users discover great events.\n\n\
             You can rate the event by visiting: {site_url}/events/{id}\n\n\
             Your feedback is valuable to us and helps event organizers improve future events.\n\n\
             Best regards,\n\
             Event Planner Team\n",
            name = user.greeting_name(),
            title = event.title,
            id = event.id,
        ),
    }
}
