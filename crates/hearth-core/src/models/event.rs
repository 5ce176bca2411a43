//! Event model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Participant, RecurrenceRule};

/// A unique identifier for an event.
///
/// Persisted events carry a UUID v7 (time-sortable). Derived recurrence
/// instances carry `{base}-instance-{n}` ids and are never persisted, which
/// is why this id is string-backed rather than a raw `Uuid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Create a new unique event ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Derived id for the `index`-th occurrence of a recurring base event.
    #[must_use]
    pub fn instance(base: &Self, index: u32) -> Self {
        Self(format!("{}-instance-{index}", base.0))
    }

    /// Split an instance id back into its base id and occurrence index.
    ///
    /// Returns `None` for persisted (non-instance) ids.
    #[must_use]
    pub fn as_instance(&self) -> Option<(Self, u32)> {
        let (base, index) = self.0.rsplit_once("-instance-")?;
        let index = index.parse().ok()?;
        Some((Self(base.to_string()), index))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EventId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Fixed color palette shared by every client surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventColor {
    Red,
    Teal,
    #[default]
    Blue,
    Orange,
    Green,
    Yellow,
    Purple,
    Gray,
}

/// Whether an event occurs once or repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    #[default]
    Single,
    Recurring,
}

/// A calendar event as stored on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Locally-assigned stable identifier
    pub id: EventId,
    /// Remote document id, absent until the create has propagated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub all_day: bool,
    pub color: EventColor,
    pub kind: EventKind,
    /// Present iff `kind == Recurring`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceRule>,
    /// Set only on derived recurrence instances, never persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_event_id: Option<EventId>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    pub group_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    /// Sole field consulted for last-writer-wins merges
    pub updated_at: DateTime<Utc>,
    /// Soft-delete tombstone; tombstoned events are superseded, never removed
    #[serde(default)]
    pub is_deleted: bool,
    /// True iff the last known local state was acknowledged remotely
    #[serde(default)]
    pub is_synced: bool,
    /// Minutes before start for a scheduled reminder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_minutes: Option<u32>,
}

impl Event {
    /// Build a persisted event from user input. Validates the draft and
    /// normalizes the all-day end date.
    pub fn from_draft(draft: EventDraft) -> Result<Self> {
        draft.validate()?;
        let now = Utc::now();
        let end_date = if draft.all_day {
            end_of_day(draft.start_date)
        } else {
            draft.end_date
        };
        Ok(Self {
            id: EventId::new(),
            remote_id: None,
            title: draft.title,
            description: draft.description,
            location: draft.location,
            start_date: draft.start_date,
            end_date,
            all_day: draft.all_day,
            color: draft.color,
            kind: draft.kind,
            recurrence: draft.recurrence,
            parent_event_id: None,
            participants: draft.participants,
            group_id: draft.group_id,
            created_by: draft.created_by,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            is_synced: false,
            reminder_minutes: draft.reminder_minutes,
        })
    }

    /// Invariants that must hold for any stored event.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidInput("event title is empty".to_string()));
        }
        if !self.all_day && self.end_date <= self.start_date {
            return Err(Error::InvalidInput(
                "event end must be after its start".to_string(),
            ));
        }
        if let Some(rule) = &self.recurrence {
            rule.validate()?;
        }
        Ok(())
    }

    /// Event duration, preserved by recurrence expansion.
    pub fn duration(&self) -> chrono::Duration {
        self.end_date - self.start_date
    }
}

/// User input for creating an event.
#[derive(Debug, Clone, Default)]
pub struct EventDraft {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub all_day: bool,
    pub color: EventColor,
    pub kind: EventKind,
    pub recurrence: Option<RecurrenceRule>,
    pub participants: Vec<Participant>,
    pub group_id: String,
    pub created_by: String,
    pub reminder_minutes: Option<u32>,
}

impl EventDraft {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidInput("event title is empty".to_string()));
        }
        if !self.all_day && self.end_date <= self.start_date {
            return Err(Error::InvalidInput(
                "event end must be after its start".to_string(),
            ));
        }
        if self.kind == EventKind::Recurring && self.recurrence.is_none() {
            return Err(Error::InvalidInput(
                "recurring event is missing its recurrence rule".to_string(),
            ));
        }
        if let Some(rule) = &self.recurrence {
            rule.validate()?;
        }
        Ok(())
    }
}

/// Partial update applied to a stored event.
///
/// Outer `None` leaves a field untouched; for optional fields the inner
/// option distinguishes setting from clearing.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub all_day: Option<bool>,
    pub color: Option<EventColor>,
    pub kind: Option<EventKind>,
    pub recurrence: Option<Option<RecurrenceRule>>,
    pub participants: Option<Vec<Participant>>,
    pub reminder_minutes: Option<Option<u32>>,
}

impl EventPatch {
    pub fn apply(&self, event: &mut Event) {
        if let Some(title) = &self.title {
            event.title = title.clone();
        }
        if let Some(description) = &self.description {
            event.description = description.clone();
        }
        if let Some(location) = &self.location {
            event.location = location.clone();
        }
        if let Some(start) = self.start_date {
            event.start_date = start;
        }
        if let Some(end) = self.end_date {
            event.end_date = end;
        }
        if let Some(all_day) = self.all_day {
            event.all_day = all_day;
        }
        if let Some(color) = self.color {
            event.color = color;
        }
        if let Some(kind) = self.kind {
            event.kind = kind;
        }
        if let Some(recurrence) = &self.recurrence {
            event.recurrence = recurrence.clone();
        }
        if let Some(participants) = &self.participants {
            event.participants = participants.clone();
        }
        if let Some(reminder) = self.reminder_minutes {
            event.reminder_minutes = reminder;
        }
        if event.all_day {
            event.end_date = end_of_day(event.start_date);
        }
    }
}

/// Last instant (millisecond precision) of the day `instant` falls on.
pub fn end_of_day(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .date_naive()
        .and_hms_milli_opt(23, 59, 59, 999)
        .map_or(instant, |naive| naive.and_utc())
}

/// First instant of the day `instant` falls on.
pub fn start_of_day(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map_or(instant, |naive| naive.and_utc())
}
