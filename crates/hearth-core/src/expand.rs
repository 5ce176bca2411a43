//! Recurrence expansion.
//!
//! Turns a recurring base event into the concrete occurrence instances that
//! fall inside a visible date window. Pure: identical inputs yield identical
//! output, and instances are derived values that never touch storage.

use chrono::{DateTime, Months, Utc};

use crate::models::{weekday_ordinal, Event, EventId, EventKind, Frequency};

/// Upper bound on rule steps walked when resolving a single occurrence, so a
/// weekday filter that never matches cannot spin forever.
const OCCURRENCE_SEARCH_LIMIT: u32 = 10_000;

/// Expand `base` into its occurrences within `[window_start, window_end]`.
///
/// Non-recurring events pass through unchanged as a single-element list.
/// Expansion stops at the rule's `count`, at its `end_date`, or at
/// `window_end`, whichever comes first. Candidates before the window consume
/// count slots without being emitted; weekday-filtered candidates inside the
/// window consume nothing. Excluded occurrences consume their slot but are
/// not emitted, which keeps sibling instance indices stable.
pub fn expand_event(
    base: &Event,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<Event> {
    if base.kind != EventKind::Recurring {
        return vec![base.clone()];
    }
    let Some(rule) = base.recurrence.as_ref() else {
        return vec![base.clone()];
    };

    let duration = base.duration();
    let mut instances = Vec::new();
    let mut current = base.start_date;
    let mut slot: u32 = 0;

    loop {
        if let Some(count) = rule.count {
            if slot >= count {
                break;
            }
        }
        if let Some(until) = rule.end_date {
            if current > until {
                break;
            }
        }
        if current > window_end {
            break;
        }

        let next = step(current, rule.frequency, rule.interval);

        if current >= window_start {
            if !rule.days_of_week.is_empty()
                && !rule.days_of_week.contains(&weekday_ordinal(current))
            {
                // Filtered candidates do not consume a count slot.
                if next <= current {
                    break;
                }
                current = next;
                continue;
            }
            if !rule.is_excluded(current) {
                let mut instance = base.clone();
                instance.id = EventId::instance(&base.id, slot);
                instance.start_date = current;
                instance.end_date = current + duration;
                instance.parent_event_id = Some(base.id.clone());
                instances.push(instance);
            }
        }

        slot += 1;
        if next <= current {
            break;
        }
        current = next;
    }

    instances
}

/// Start instant of the occurrence carrying slot `index`, numbered from the
/// start of the series (the numbering a window beginning at the base start
/// produces).
pub fn occurrence_start(base: &Event, index: u32) -> Option<DateTime<Utc>> {
    if base.kind != EventKind::Recurring {
        return None;
    }
    let rule = base.recurrence.as_ref()?;

    let mut current = base.start_date;
    let mut slot: u32 = 0;
    let mut steps: u32 = 0;

    loop {
        if rule.count.is_some_and(|count| slot >= count) {
            return None;
        }
        if rule.end_date.is_some_and(|until| current > until) {
            return None;
        }
        if steps >= OCCURRENCE_SEARCH_LIMIT {
            return None;
        }

        let next = step(current, rule.frequency, rule.interval);
        let filtered = !rule.days_of_week.is_empty()
            && !rule.days_of_week.contains(&weekday_ordinal(current));

        if !filtered {
            if slot == index {
                return Some(current);
            }
            slot += 1;
        }

        if next <= current {
            return None;
        }
        current = next;
        steps += 1;
    }
}

fn step(date: DateTime<Utc>, frequency: Frequency, interval: u32) -> DateTime<Utc> {
    let fallback = date;
    match frequency {
        Frequency::Daily => date + chrono::Duration::days(i64::from(interval)),
        Frequency::Weekly => date + chrono::Duration::weeks(i64::from(interval)),
        Frequency::Monthly => date
            .checked_add_months(Months::new(interval))
            .unwrap_or(fallback),
        Frequency::Yearly => date
            .checked_add_months(Months::new(interval.saturating_mul(12)))
            .unwrap_or(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDraft, RecurrenceRule};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn recurring(rule: RecurrenceRule) -> Event {
        // 2025-01-13 is a Monday.
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
    fn non_recurring_event_passes_through() {
        let mut event = recurring(RecurrenceRule::new(Frequency::Daily, 1));
        event.kind = EventKind::Single;
        event.recurrence = None;

        let window_start = event.start_date;
        let out = expand_event(&event, window_start, window_start + chrono::Duration::days(30));
        assert_eq!(out, vec![event]);
    }

    #[test]
    fn weekly_three_week_window_yields_three_linked_instances() {
        let event = recurring(RecurrenceRule::new(Frequency::Weekly, 1));
        let start = event.start_date;
        let out = expand_event(&event, start, start + chrono::Duration::days(20));

        assert_eq!(out.len(), 3);
        for (index, instance) in out.iter().enumerate() {
            assert_eq!(
                instance.start_date,
                start + chrono::Duration::weeks(index as i64)
            );
            assert_eq!(instance.parent_event_id, Some(event.id.clone()));
            assert_eq!(instance.id, EventId::instance(&event.id, index as u32));
            assert_eq!(instance.duration(), event.duration());
        }
    }

    #[test]
    fn expansion_is_idempotent() {
        let mut rule = RecurrenceRule::new(Frequency::Daily, 2);
        rule.count = Some(5);
        let event = recurring(rule);
        let start = event.start_date;
        let end = start + chrono::Duration::days(30);

        assert_eq!(expand_event(&event, start, end), expand_event(&event, start, end));
    }

    #[test]
    fn count_bound_wins_over_wide_window() {
        let mut rule = RecurrenceRule::new(Frequency::Daily, 1);
        rule.count = Some(3);
        let event = recurring(rule);
        let start = event.start_date;

        let out = expand_event(&event, start, start + chrono::Duration::days(10));
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn weekday_filtered_candidates_do_not_consume_count() {
        // Daily stepping, keep only Mondays, three occurrences total.
        let mut rule = RecurrenceRule::new(Frequency::Daily, 1);
        rule.days_of_week = vec![1];
        rule.count = Some(3);
        let event = recurring(rule);
        let start = event.start_date;

        let out = expand_event(&event, start, start + chrono::Duration::days(60));
        assert_eq!(out.len(), 3);
        for instance in &out {
            assert_eq!(weekday_ordinal(instance.start_date), 1);
        }
        assert_eq!(
            out[2].start_date,
            start + chrono::Duration::weeks(2)
        );
    }

    #[test]
    fn rule_end_date_stops_expansion() {
        let mut rule = RecurrenceRule::new(Frequency::Weekly, 1);
        rule.end_date = Some(Utc.with_ymd_and_hms(2025, 1, 27, 23, 0, 0).unwrap());
        let event = recurring(rule);
        let start = event.start_date;

        let out = expand_event(&event, start, start + chrono::Duration::days(365));
        // Jan 13, Jan 20, Jan 27; Feb 3 is past the rule end.
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn candidates_before_window_consume_slots() {
        let mut rule = RecurrenceRule::new(Frequency::Daily, 1);
        rule.count = Some(3);
        let event = recurring(rule);
        let start = event.start_date;

        // Window opens after two slots have passed; only one remains.
        let out = expand_event(
            &event,
            start + chrono::Duration::days(2),
            start + chrono::Duration::days(30),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, EventId::instance(&event.id, 2));
    }

    #[test]
    fn excluded_occurrence_is_suppressed_but_keeps_indices() {
        let mut rule = RecurrenceRule::new(Frequency::Daily, 1);
        rule.exclude(Utc.with_ymd_and_hms(2025, 1, 14, 17, 0, 0).unwrap());
        let event = recurring(rule);
        let start = event.start_date;

        let out = expand_event(&event, start, start + chrono::Duration::days(2));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, EventId::instance(&event.id, 0));
        assert_eq!(out[1].id, EventId::instance(&event.id, 2));
    }

    #[test]
    fn monthly_stepping_clamps_short_months() {
        let mut event = recurring(RecurrenceRule::new(Frequency::Monthly, 1));
        event.start_date = Utc.with_ymd_and_hms(2025, 1, 31, 9, 0, 0).unwrap();
        event.end_date = Utc.with_ymd_and_hms(2025, 1, 31, 10, 0, 0).unwrap();

        let out = expand_event(
            &event,
            event.start_date,
            Utc.with_ymd_and_hms(2025, 3, 31, 23, 0, 0).unwrap(),
        );
        assert_eq!(out.len(), 3);
        assert_eq!(
            out[1].start_date,
            Utc.with_ymd_and_hms(2025, 2, 28, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn occurrence_start_matches_expansion() {
        let mut rule = RecurrenceRule::new(Frequency::Daily, 1);
        rule.days_of_week = vec![1, 3];
        let event = recurring(rule);
        let start = event.start_date;

        let out = expand_event(&event, start, start + chrono::Duration::days(30));
        for instance in &out {
            let (_, index) = instance.id.as_instance().unwrap();
            assert_eq!(occurrence_start(&event, index), Some(instance.start_date));
        }
    }

    #[test]
    fn occurrence_start_past_bounds_is_none() {
        let mut rule = RecurrenceRule::new(Frequency::Daily, 1);
        rule.count = Some(2);
        let event = recurring(rule);
        assert!(occurrence_start(&event, 5).is_none());
    }
}
