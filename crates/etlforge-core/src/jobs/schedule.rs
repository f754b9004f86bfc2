//! Pure schedule-due computation
//!
//! `is_due` depends only on its arguments, which is what lets the
//! scheduler's readiness predicate be tested without a clock or a
//! database.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// An inclusive range over a calendar field. `None` means "any value",
/// i.e. the full domain.
pub type FieldRange = Option<(u32, u32)>;

/// The interval rule half of a schedule spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalRule {
    /// Due every `n` seconds since the last completion.
    EveryXSeconds(u64),
    /// Due once per calendar day.
    Daily,
}

/// A single schedule spec: a calendar-window filter plus an interval
/// rule. A job is due under this spec if the current time falls inside
/// every populated calendar field *and* the interval rule says enough
/// time (or calendar distance) has elapsed since the last completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub month: FieldRange,
    pub monthday: FieldRange,
    pub weekday: FieldRange,
    pub hour: FieldRange,
    pub minute: FieldRange,
    pub start: Option<DateTime<Utc>>,
    pub interval: IntervalRule,
}

impl ScheduleSpec {
    /// A spec due every `n` seconds with no calendar restriction.
    pub fn every_x_seconds(n: u64) -> Self {
        Self {
            month: None,
            monthday: None,
            weekday: None,
            hour: None,
            minute: None,
            start: None,
            interval: IntervalRule::EveryXSeconds(n),
        }
    }

    /// A spec due once per calendar day with no calendar restriction.
    pub fn daily() -> Self {
        Self {
            month: None,
            monthday: None,
            weekday: None,
            hour: None,
            minute: None,
            start: None,
            interval: IntervalRule::Daily,
        }
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }
}

fn in_range(range: FieldRange, value: u32) -> bool {
    match range {
        None => true,
        Some((lo, hi)) => value >= lo && value <= hi,
    }
}

fn within_calendar_window(spec: &ScheduleSpec, now: DateTime<Utc>) -> bool {
    in_range(spec.month, now.month())
        && in_range(spec.monthday, now.day())
        && in_range(spec.weekday, now.weekday().num_days_from_monday())
        && in_range(spec.hour, now.hour())
        && in_range(spec.minute, now.minute())
}

/// Is this schedule spec due, given the job's last successful
/// completion (`None` if it has never completed) and the current time?
///
/// Pure and referentially transparent: depends only on `spec`, `last`,
/// and `now`.
pub fn is_due(spec: &ScheduleSpec, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    if !within_calendar_window(spec, now) {
        return false;
    }

    match last {
        None => spec.start.map_or(true, |start| now >= start),
        Some(last) => match spec.interval {
            IntervalRule::EveryXSeconds(n) => {
                let interval = chrono::Duration::seconds(n as i64);
                now - last >= interval
            }
            IntervalRule::Daily => now.date_naive() > last.date_naive(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn never_run_with_no_start_is_immediately_due() {
        let spec = ScheduleSpec::every_x_seconds(30);
        assert!(is_due(&spec, None, at(2026, 1, 1, 0, 0)));
    }

    #[test]
    fn never_run_with_future_start_is_not_due() {
        let start = at(2026, 1, 2, 0, 0);
        let spec = ScheduleSpec::every_x_seconds(30).with_start(start);
        assert!(!is_due(&spec, None, at(2026, 1, 1, 0, 0)));
        assert!(is_due(&spec, None, start));
    }

    #[test]
    fn every_x_seconds_respects_interval() {
        let spec = ScheduleSpec::every_x_seconds(30);
        let last = at(2026, 1, 1, 0, 0);
        assert!(!is_due(&spec, Some(last), last + chrono::Duration::seconds(10)));
        assert!(is_due(&spec, Some(last), last + chrono::Duration::seconds(30)));
        assert!(is_due(&spec, Some(last), last + chrono::Duration::seconds(90)));
    }

    #[test]
    fn daily_requires_a_new_calendar_day() {
        let spec = ScheduleSpec::daily();
        let last = at(2026, 1, 1, 23, 59);
        assert!(!is_due(&spec, Some(last), at(2026, 1, 1, 23, 59)));
        assert!(is_due(&spec, Some(last), at(2026, 1, 2, 0, 0)));
    }

    #[test]
    fn calendar_window_excludes_out_of_range_hour() {
        let mut spec = ScheduleSpec::every_x_seconds(1);
        spec.hour = Some((9, 17));
        assert!(!is_due(&spec, None, at(2026, 1, 1, 3, 0)));
        assert!(is_due(&spec, None, at(2026, 1, 1, 10, 0)));
    }

    #[test]
    fn is_due_is_pure_across_repeated_calls() {
        let spec = ScheduleSpec::every_x_seconds(30);
        let last = Some(at(2026, 1, 1, 0, 0));
        let now = at(2026, 1, 1, 0, 1);
        let first = is_due(&spec, last, now);
        let second = is_due(&spec, last, now);
        assert_eq!(first, second);
    }
}
