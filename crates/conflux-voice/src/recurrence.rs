//! Occurrence projection for recurring conferences.
//!
//! The anchor row (`event_type=recurring`, `series_id=self`) carries the
//! first occurrence's `scheduled_at`; every date after that is computed from
//! the rule rather than stored, until something needs a concrete row
//! (`VoiceStore::materialize_occurrence_locked`).

use chrono::{DateTime, Months, Utc};

use conflux_core::types::RecurrenceFrequency;

use crate::types::RecurrenceRule;

/// Dates (inclusive of `anchor_at`) at which `rule` fires, up to and
/// including `horizon`. `days_of_week`/`day_of_month` are stored on the rule
/// for future per-weekday expansion but are not consulted here — the anchor
/// date's weekday/day-of-month is reused as the cadence's single slot per
/// period, the simplest rule that picks exactly one occurrence per cadence
/// without inventing a weekday/day-of-month picker UI.
pub fn occurrences_until(
    rule: &RecurrenceRule,
    anchor_at: DateTime<Utc>,
    horizon: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let mut out = Vec::new();
    let mut cur = anchor_at;
    let mut count: u32 = 0;

    loop {
        if cur > horizon {
            break;
        }
        if let Some(until) = rule.until_date {
            if cur > until {
                break;
            }
        }
        if let Some(max) = rule.occurrence_count {
            if count >= max {
                break;
            }
        }
        out.push(cur);
        count += 1;

        cur = match step(rule.frequency, cur) {
            Some(next) => next,
            None => break,
        };
    }

    out
}

fn step(frequency: RecurrenceFrequency, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match frequency {
        RecurrenceFrequency::Daily => Some(from + chrono::Duration::days(1)),
        RecurrenceFrequency::Weekly => Some(from + chrono::Duration::days(7)),
        RecurrenceFrequency::Biweekly => Some(from + chrono::Duration::days(14)),
        RecurrenceFrequency::Monthly => from.checked_add_months(Months::new(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_core::types::ConferenceId;

    fn rule(frequency: RecurrenceFrequency, until_date: Option<DateTime<Utc>>, occurrence_count: Option<u32>) -> RecurrenceRule {
        RecurrenceRule {
            conference_id: ConferenceId::new(),
            frequency,
            days_of_week: Vec::new(),
            day_of_month: None,
            until_date,
            occurrence_count,
        }
    }

    #[test]
    fn weekly_steps_by_seven_days() {
        let anchor = "2026-01-05T10:00:00Z".parse().unwrap();
        let horizon = "2026-01-26T10:00:00Z".parse().unwrap();
        let dates = occurrences_until(&rule(RecurrenceFrequency::Weekly, None, None), anchor, horizon);
        assert_eq!(dates.len(), 4);
        assert_eq!(dates[1], anchor + chrono::Duration::days(7));
    }

    #[test]
    fn occurrence_count_bounds_the_series() {
        let anchor = "2026-01-05T10:00:00Z".parse().unwrap();
        let horizon = "2027-01-05T10:00:00Z".parse().unwrap();
        let dates = occurrences_until(&rule(RecurrenceFrequency::Daily, None, Some(3)), anchor, horizon);
        assert_eq!(dates.len(), 3);
    }

    #[test]
    fn until_date_bounds_the_series() {
        let anchor = "2026-01-05T10:00:00Z".parse().unwrap();
        let until = anchor + chrono::Duration::days(10);
        let horizon = "2026-02-05T10:00:00Z".parse().unwrap();
        let dates = occurrences_until(&rule(RecurrenceFrequency::Daily, Some(until), None), anchor, horizon);
        assert_eq!(dates.len(), 11);
    }
}
