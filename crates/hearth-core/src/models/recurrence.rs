//! Recurrence rule model

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Repeat frequency for a recurring event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Recurrence rule attached to a recurring base event.
///
/// `end_date` and `count` are independent bounds; expansion stops at
/// whichever is hit first. `excluded_dates` holds the start instants of
/// individually deleted occurrences so they stay suppressed across
/// re-expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Step multiplier, must be at least 1
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Weekday ordinals to keep, 0 = Sunday. Empty means every candidate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_dates: Vec<DateTime<Utc>>,
}

impl RecurrenceRule {
    /// Simple rule with no bounds or filters.
    pub fn new(frequency: Frequency, interval: u32) -> Self {
        Self {
            frequency,
            interval,
            end_date: None,
            count: None,
            days_of_week: Vec::new(),
            excluded_dates: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(Error::InvalidInput(
                "recurrence interval must be at least 1".to_string(),
            ));
        }
        if let Some(day) = self.days_of_week.iter().find(|d| **d > 6) {
            return Err(Error::InvalidInput(format!(
                "weekday ordinal out of range: {day}"
            )));
        }
        Ok(())
    }

    /// Whether an occurrence starting at `instant` was individually deleted.
    ///
    /// Matches on the exact millisecond, mirroring how occurrence starts are
    /// derived (stepping is millisecond-exact from the base start).
    pub fn is_excluded(&self, instant: DateTime<Utc>) -> bool {
        self.excluded_dates
            .iter()
            .any(|d| d.timestamp_millis() == instant.timestamp_millis())
    }

    /// Record an individually deleted occurrence.
    pub fn exclude(&mut self, instant: DateTime<Utc>) {
        if !self.is_excluded(instant) {
            self.excluded_dates.push(instant);
        }
    }
}

/// Weekday ordinal with 0 = Sunday, matching the wire convention.
pub fn weekday_ordinal(instant: DateTime<Utc>) -> u8 {
    instant.weekday().num_days_from_sunday() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn validate_rejects_zero_interval() {
        let rule = RecurrenceRule::new(Frequency::Daily, 0);
        assert!(rule.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_weekday() {
        let mut rule = RecurrenceRule::new(Frequency::Weekly, 1);
        rule.days_of_week = vec![7];
        assert!(rule.validate().is_err());
    }

    #[test]
    fn weekday_ordinal_is_sunday_based() {
        // 2025-01-12 is a Sunday, 2025-01-13 a Monday.
        let sunday = Utc.with_ymd_and_hms(2025, 1, 12, 9, 0, 0).unwrap();
        let monday = Utc.with_ymd_and_hms(2025, 1, 13, 9, 0, 0).unwrap();
        assert_eq!(weekday_ordinal(sunday), 0);
        assert_eq!(weekday_ordinal(monday), 1);
    }

    #[test]
    fn exclude_is_idempotent() {
        let mut rule = RecurrenceRule::new(Frequency::Daily, 1);
        let instant = Utc.with_ymd_and_hms(2025, 3, 1, 18, 0, 0).unwrap();
        rule.exclude(instant);
        rule.exclude(instant);
        assert_eq!(rule.excluded_dates.len(), 1);
        assert!(rule.is_excluded(instant));
    }
}
