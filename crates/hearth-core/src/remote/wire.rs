//! Wire contract for event documents crossing the remote boundary.
//!
//! Dates travel as integer epoch milliseconds; the recurrence rule travels as
//! a plain structure with its embedded dates normalized the same way. Parsing
//! is strict: a document that does not match this contract is rejected at the
//! boundary instead of being coerced field by field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{
    Event, EventColor, EventId, EventKind, Frequency, Participant, RecurrenceRule,
};

/// Recurrence rule as serialized into a remote document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceDoc {
    pub frequency: Frequency,
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_dates: Vec<i64>,
}

impl From<&RecurrenceRule> for RecurrenceDoc {
    fn from(rule: &RecurrenceRule) -> Self {
        Self {
            frequency: rule.frequency,
            interval: rule.interval,
            end_date: rule.end_date.map(|d| d.timestamp_millis()),
            count: rule.count,
            days_of_week: rule.days_of_week.clone(),
            excluded_dates: rule
                .excluded_dates
                .iter()
                .map(|d| d.timestamp_millis())
                .collect(),
        }
    }
}

impl RecurrenceDoc {
    fn into_rule(self) -> Result<RecurrenceRule> {
        let rule = RecurrenceRule {
            frequency: self.frequency,
            interval: self.interval,
            end_date: self.end_date.map(parse_instant).transpose()?,
            count: self.count,
            days_of_week: self.days_of_week,
            excluded_dates: self
                .excluded_dates
                .into_iter()
                .map(parse_instant)
                .collect::<Result<_>>()?,
        };
        rule.validate()?;
        Ok(rule)
    }
}

/// An event document as stored remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDoc {
    /// Client-generated idempotency key (the local event id), echoed back
    /// verbatim by the remote store so pulls can reconcile a racing snapshot
    /// without guessing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Epoch milliseconds
    pub start_date: i64,
    /// Epoch milliseconds
    pub end_date: i64,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub color: EventColor,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<Participant>,
    pub group_id: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_minutes: Option<u32>,
    /// Epoch milliseconds, stamped by the remote store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Epoch milliseconds, stamped by the remote store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl EventDoc {
    /// Wire shape of a local event, ready for a remote create or update.
    pub fn from_event(event: &Event) -> Self {
        Self {
            client_id: Some(event.id.to_string()),
            title: event.title.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            start_date: event.start_date.timestamp_millis(),
            end_date: event.end_date.timestamp_millis(),
            all_day: event.all_day,
            color: event.color,
            kind: event.kind,
            recurrence: event.recurrence.as_ref().map(RecurrenceDoc::from),
            participants: event.participants.clone(),
            group_id: event.group_id.clone(),
            created_by: event.created_by.clone(),
            is_deleted: event.is_deleted,
            reminder_minutes: event.reminder_minutes,
            created_at: Some(event.created_at.timestamp_millis()),
            updated_at: Some(event.updated_at.timestamp_millis()),
        }
    }

    /// Remote-stamped update instant, when present.
    pub fn updated_instant(&self) -> Option<DateTime<Utc>> {
        self.updated_at.and_then(DateTime::from_timestamp_millis)
    }

    /// Materialize a pulled document as a fresh local record.
    ///
    /// Validates the document; a malformed one is rejected rather than
    /// coerced.
    pub fn into_event(self, remote_id: String) -> Result<Event> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "remote event {remote_id} has an empty title"
            )));
        }
        let start_date = parse_instant(self.start_date)?;
        let end_date = parse_instant(self.end_date)?;
        if !self.all_day && end_date <= start_date {
            return Err(Error::InvalidInput(format!(
                "remote event {remote_id} ends before it starts"
            )));
        }
        let now = Utc::now();
        Ok(Event {
            id: EventId::new(),
            remote_id: Some(remote_id),
            title: self.title,
            description: self.description,
            location: self.location,
            start_date,
            end_date,
            all_day: self.all_day,
            color: self.color,
            kind: self.kind,
            recurrence: self.recurrence.map(RecurrenceDoc::into_rule).transpose()?,
            parent_event_id: None,
            participants: self.participants,
            group_id: self.group_id,
            created_by: self.created_by,
            created_at: self
                .created_at
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or(now),
            updated_at: self
                .updated_at
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or(now),
            is_deleted: self.is_deleted,
            is_synced: true,
            reminder_minutes: self.reminder_minutes,
        })
    }

    /// Fields of a pulled document merged into an existing local record
    /// during a last-writer-wins apply.
    pub fn merge_into(self, event: &mut Event) -> Result<()> {
        let start_date = parse_instant(self.start_date)?;
        let end_date = parse_instant(self.end_date)?;
        if self.title.trim().is_empty() {
            return Err(Error::InvalidInput("remote event title is empty".to_string()));
        }
        if !self.all_day && end_date <= start_date {
            return Err(Error::InvalidInput(
                "remote event ends before it starts".to_string(),
            ));
        }
        event.title = self.title;
        event.description = self.description;
        event.location = self.location;
        event.start_date = start_date;
        event.end_date = end_date;
        event.all_day = self.all_day;
        event.color = self.color;
        event.kind = self.kind;
        event.recurrence = self.recurrence.map(RecurrenceDoc::into_rule).transpose()?;
        event.is_deleted = self.is_deleted;
        event.is_synced = true;
        Ok(())
    }
}

fn parse_instant(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::InvalidInput(format!("timestamp out of range: {ms}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventDraft;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn sample_event() -> Event {
        let mut rule = RecurrenceRule::new(Frequency::Weekly, 1);
        rule.end_date = Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        Event::from_draft(EventDraft {
            title: "Swim practice".to_string(),
            start_date: Utc.with_ymd_and_hms(2025, 1, 13, 17, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2025, 1, 13, 18, 0, 0).unwrap(),
            kind: EventKind::Recurring,
            recurrence: Some(rule),
            group_id: "family".to_string(),
            created_by: "user-1".to_string(),
            ..EventDraft::default()
        })
        .unwrap()
    }

    #[test]
    fn doc_uses_camel_case_and_epoch_millis() {
        let event = sample_event();
        let doc = EventDoc::from_event(&event);
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["startDate"], event.start_date.timestamp_millis());
        assert_eq!(json["type"], "recurring");
        assert_eq!(json["groupId"], "family");
        // Nested rule dates are plain numbers, not structured dates.
        assert!(json["recurrence"]["endDate"].is_i64());
        assert_eq!(json["clientId"], event.id.to_string());
    }

    #[test]
    fn doc_roundtrips_into_event() {
        let event = sample_event();
        let doc = EventDoc::from_event(&event);
        let back = doc.into_event("remote-1".to_string()).unwrap();

        assert_eq!(back.title, event.title);
        assert_eq!(back.start_date, event.start_date);
        assert_eq!(back.recurrence, event.recurrence);
        assert_eq!(back.remote_id.as_deref(), Some("remote-1"));
        assert!(back.is_synced);
        assert_ne!(back.id, event.id);
    }

    #[test]
    fn malformed_times_are_rejected() {
        let event = sample_event();
        let mut doc = EventDoc::from_event(&event);
        doc.all_day = false;
        doc.end_date = doc.start_date;
        assert!(doc.into_event("remote-1".to_string()).is_err());
    }

    #[test]
    fn unknown_color_fails_deserialization() {
        let event = sample_event();
        let mut json = serde_json::to_value(EventDoc::from_event(&event)).unwrap();
        json["color"] = serde_json::Value::String("magenta".to_string());
        assert!(serde_json::from_value::<EventDoc>(json).is_err());
    }

    #[test]
    fn zero_interval_rule_is_rejected() {
        let event = sample_event();
        let mut doc = EventDoc::from_event(&event);
        if let Some(rule) = doc.recurrence.as_mut() {
            rule.interval = 0;
        }
        assert!(doc.into_event("remote-1".to_string()).is_err());
    }
}
