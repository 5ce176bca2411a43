//! Notification decisions.
//!
//! The core only decides whether a reminder or group notification should
//! exist and what its payload is; delivery belongs to external glue behind
//! the [`MessageSender`] and [`ReminderScheduler`] seams.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Event, EventId};

/// Fallback reminder offset when an event has none of its own: 3 days.
pub const DEFAULT_REMINDER_MINUTES: u32 = 4320;

/// Reminder offsets offered by client surfaces, in minutes before start.
pub const REMINDER_OPTIONS: [u32; 6] = [15, 60, 180, 720, 1440, 4320];

/// Outbound messaging surface (delivery mechanics out of scope).
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, recipient_id: &str, text: &str) -> Result<()>;
}

/// External scheduler for deferred reminders.
#[async_trait]
pub trait ReminderScheduler: Send + Sync {
    async fn schedule(&self, plan: ReminderPlan) -> Result<()>;
    async fn cancel(&self, event_id: &EventId) -> Result<()>;
}

/// A reminder the core has decided should fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderPlan {
    pub event_id: EventId,
    pub title: String,
    pub event_start: DateTime<Utc>,
    pub reminder_minutes: u32,
    pub trigger_at: DateTime<Utc>,
    pub group_id: String,
    pub recipients: Vec<String>,
}

/// Decide whether `event` warrants a scheduled reminder.
///
/// Only future, non-all-day events qualify, and only when the trigger
/// instant itself is still ahead of `now`.
pub fn plan_reminder(
    event: &Event,
    default_minutes: u32,
    recipients: Vec<String>,
    now: DateTime<Utc>,
) -> Option<ReminderPlan> {
    if event.all_day || event.start_date <= now {
        return None;
    }
    let minutes = event.reminder_minutes.unwrap_or(default_minutes);
    let trigger_at = event.start_date - chrono::Duration::minutes(i64::from(minutes));
    if trigger_at <= now {
        return None;
    }
    Some(ReminderPlan {
        event_id: event.id.clone(),
        title: event.title.clone(),
        event_start: event.start_date,
        reminder_minutes: minutes,
        trigger_at,
        group_id: event.group_id.clone(),
        recipients,
    })
}

/// Changed fields worth calling out in an update notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeDetails {
    pub new_title: Option<String>,
    pub new_time: Option<String>,
}

impl ChangeDetails {
    /// Diff two versions of an event into notification-worthy changes.
    pub fn between(before: &Event, after: &Event) -> Self {
        let mut details = Self::default();
        if after.title != before.title {
            details.new_title = Some(after.title.clone());
        }
        if after.start_date != before.start_date || after.end_date != before.end_date {
            details.new_time = Some(if after.all_day {
                after.start_date.format("%d.%m.%Y").to_string()
            } else {
                after.start_date.format("%H:%M").to_string()
            });
        }
        details
    }

    pub fn is_empty(&self) -> bool {
        self.new_title.is_none() && self.new_time.is_none()
    }
}

/// Human-readable date line for an event: `dd.MM.yyyy` for all-day events,
/// otherwise `dd.MM.yyyy, HH:mm` with an end time when it differs.
pub fn event_datetime_line(event: &Event) -> String {
    if event.all_day {
        return event.start_date.format("%d.%m.%Y").to_string();
    }
    let mut line = event.start_date.format("%d.%m.%Y, %H:%M").to_string();
    if event.end_date != event.start_date {
        line.push_str(&event.end_date.format("\u{2013}%H:%M").to_string());
    }
    line
}

pub fn created_message(actor: &str, event: &Event) -> String {
    format!(
        "{actor} added: {}\n{}",
        event.title,
        event_datetime_line(event)
    )
}

pub fn updated_message(actor: &str, before: &Event, after: &Event) -> String {
    let mut message = format!(
        "{actor} changed: {}\nDate: {}",
        before.title,
        event_datetime_line(after)
    );
    let details = ChangeDetails::between(before, after);
    if let Some(new_title) = &details.new_title {
        message.push_str(&format!("\nNew title - {new_title}"));
    }
    if let Some(new_time) = &details.new_time {
        message.push_str(&format!("\nNew time - {new_time}"));
    }
    message
}

pub fn deleted_message(actor: &str, event: &Event) -> String {
    format!(
        "{actor} deleted: {}\n{}",
        event.title,
        event_datetime_line(event)
    )
}

/// Recipients for a group notification, honoring the "notify me about my own
/// actions" setting.
pub fn notification_recipients(
    recipients: &[String],
    own_messaging_id: Option<&str>,
    notify_own_actions: bool,
) -> Vec<String> {
    recipients
        .iter()
        .filter(|id| {
            notify_own_actions || own_messaging_id.map_or(true, |own| own != id.as_str())
        })
        .cloned()
        .collect()
}
