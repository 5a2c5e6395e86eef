//! Working calendars: weekly attendance rules, leaves, and the interval
//! machinery built on them.
//!
//! A calendar is shared by every resource that references its id. Rules are
//! expressed in the calendar's local time (a fixed UTC offset); leaves are
//! absolute instants.
//!
//! # Precedence
//! Leave always wins over attendance: an instant is working time iff it falls
//! inside a `Working` rule of its local weekday AND inside no applicable leave.

pub mod availability;
pub mod joint;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc, Weekday,
};

use crate::error::ScheduleError;
use crate::models::{hours_to_duration, TimeRange};

/// Whether an attendance sub-period is worked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DayPeriod {
    #[default]
    Working,
    /// Lunch or other scheduled breaks; occupies the day but is never worked.
    Break,
}

/// One weekly attendance window in local hours (`8.5` = 08:30).
#[derive(Clone, Debug, PartialEq)]
pub struct AttendanceRule {
    pub weekday: Weekday,
    pub hour_from: f64,
    pub hour_to: f64,
    pub period: DayPeriod,
}

impl AttendanceRule {
    pub fn working(weekday: Weekday, hour_from: f64, hour_to: f64) -> Self {
        Self {
            weekday,
            hour_from,
            hour_to,
            period: DayPeriod::Working,
        }
    }

    pub fn lunch(weekday: Weekday, hour_from: f64, hour_to: f64) -> Self {
        Self {
            weekday,
            hour_from,
            hour_to,
            period: DayPeriod::Break,
        }
    }

    pub fn hours(&self) -> f64 {
        (self.hour_to - self.hour_from).max(0.0)
    }
}

/// An absolute unavailability period.
#[derive(Clone, Debug, PartialEq)]
pub struct Leave {
    pub range: TimeRange,
    /// `None` applies to every resource sharing the calendar.
    pub resource_id: Option<String>,
}

impl Leave {
    pub fn global(range: TimeRange) -> Self {
        Self {
            range,
            resource_id: None,
        }
    }

    pub fn for_resource(range: TimeRange, resource_id: impl Into<String>) -> Self {
        Self {
            range,
            resource_id: Some(resource_id.into()),
        }
    }

    pub fn applies_to(&self, resource_id: &str) -> bool {
        self.resource_id.as_deref().map_or(true, |r| r == resource_id)
    }
}

/// Recurring weekly availability plus leave exceptions.
#[derive(Clone, Debug, PartialEq)]
pub struct Calendar {
    pub id: String,
    pub utc_offset: FixedOffset,
    pub rules: Vec<AttendanceRule>,
    pub leaves: Vec<Leave>,
}

/// Days Monday through Friday.
pub const WORK_WEEK: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

/// The instant local `date` begins at under `offset`.
pub fn local_midnight(offset: FixedOffset, date: NaiveDate) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    Utc.from_utc_datetime(&(local - Duration::seconds(offset.local_minus_utc() as i64)))
}

impl Calendar {
    /// An empty UTC calendar (no attendance at all).
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            utc_offset: Utc.fix(),
            rules: Vec::new(),
            leaves: Vec::new(),
        }
    }

    /// Set the timezone as a whole-second UTC offset. Out-of-range offsets are
    /// ignored.
    pub fn with_offset_seconds(mut self, seconds: i32) -> Self {
        if let Some(offset) = FixedOffset::east_opt(seconds) {
            self.utc_offset = offset;
        }
        self
    }

    pub fn with_rule(mut self, rule: AttendanceRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add the same working window on each of `days`.
    pub fn with_hours(mut self, days: &[Weekday], hour_from: f64, hour_to: f64) -> Self {
        for day in days {
            self.rules
                .push(AttendanceRule::working(*day, hour_from, hour_to));
        }
        self
    }

    pub fn with_leave(mut self, leave: Leave) -> Self {
        self.leaves.push(leave);
        self
    }

    /// Check the calendar's structural invariants.
    ///
    /// Rules must lie within a day, have positive length, and never overlap
    /// another rule of the same weekday (breaks included).
    pub fn validate(&self) -> Result<(), ScheduleError> {
        let invalid = |reason: String| ScheduleError::InvalidCalendar {
            calendar_id: self.id.clone(),
            reason,
        };

        for rule in &self.rules {
            let in_day = (0.0..=24.0).contains(&rule.hour_from) && (0.0..=24.0).contains(&rule.hour_to);
            if !in_day || rule.hour_from >= rule.hour_to {
                return Err(invalid(format!(
                    "rule {:?} {}..{} is not a positive range within a day",
                    rule.weekday, rule.hour_from, rule.hour_to
                )));
            }
        }

        for day in Self::all_weekdays() {
            let mut spans: Vec<(f64, f64)> = self
                .rules
                .iter()
                .filter(|r| r.weekday == day)
                .map(|r| (r.hour_from, r.hour_to))
                .collect();
            spans.sort_by(|a, b| a.0.total_cmp(&b.0));
            for pair in spans.windows(2) {
                if pair[1].0 < pair[0].1 {
                    return Err(invalid(format!(
                        "overlapping rules on {:?}: {}..{} and {}..{}",
                        day, pair[0].0, pair[0].1, pair[1].0, pair[1].1
                    )));
                }
            }
        }

        for leave in &self.leaves {
            if leave.range.is_empty() {
                return Err(invalid(format!(
                    "leave {} .. {} has no duration",
                    leave.range.start, leave.range.end
                )));
            }
        }

        Ok(())
    }

    fn all_weekdays() -> [Weekday; 7] {
        [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
    }

    /// Worked hours in one week, breaks excluded.
    pub fn weekly_hours(&self) -> f64 {
        self.rules
            .iter()
            .filter(|r| r.period == DayPeriod::Working)
            .map(AttendanceRule::hours)
            .sum()
    }

    /// The calendar-local date of an instant.
    pub fn local_date(&self, t: DateTime<Utc>) -> NaiveDate {
        t.with_timezone(&self.utc_offset).date_naive()
    }

    /// The instant at `hour` (fractional, local) of local `date`.
    pub fn local_instant(&self, date: NaiveDate, hour: f64) -> DateTime<Utc> {
        local_midnight(self.utc_offset, date) + hours_to_duration(hour)
    }

    /// The whole local day as an absolute range.
    pub fn day_range(&self, date: NaiveDate) -> TimeRange {
        TimeRange::new(self.local_instant(date, 0.0), self.local_instant(date, 24.0))
    }

    /// Working ranges of a local date, sorted, before leave subtraction.
    pub fn attendance_on(&self, date: NaiveDate) -> Vec<TimeRange> {
        let weekday = date.weekday();
        let mut ranges: Vec<TimeRange> = self
            .rules
            .iter()
            .filter(|r| r.weekday == weekday && r.period == DayPeriod::Working)
            .map(|r| {
                TimeRange::new(
                    self.local_instant(date, r.hour_from),
                    self.local_instant(date, r.hour_to),
                )
            })
            .filter(|r| !r.is_empty())
            .collect();
        ranges.sort();
        ranges
    }

    /// Leave ranges applying to `resource_id` that overlap `window`.
    pub fn leaves_for(&self, resource_id: &str, window: &TimeRange) -> Vec<TimeRange> {
        self.leaves
            .iter()
            .filter(|l| l.applies_to(resource_id) && l.range.overlaps(window))
            .map(|l| l.range)
            .collect()
    }
}
