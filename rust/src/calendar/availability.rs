//! Calendar interval provider.
//!
//! Expands one resource's calendar into the ordered working intervals of a
//! window. Expansion is lazy, one local day at a time, so long windows cost
//! nothing past the point where the consumer stops pulling.

use chrono::NaiveDate;
use std::collections::VecDeque;

use crate::models::{Resource, ResourceMode, TimeRange};

use super::Calendar;

/// Order in which intervals are produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchDirection {
    /// Chronological.
    Forward,
    /// Latest interval first.
    Backward,
}

/// Hour caps a consumer must honour on top of the interval's own length.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct HourCaps {
    pub daily: Option<f64>,
    pub weekly: Option<f64>,
}

impl HourCaps {
    pub fn for_mode(mode: &ResourceMode) -> Self {
        Self {
            daily: mode.daily_cap(),
            weekly: mode.weekly_cap(),
        }
    }
}

/// A working interval of one resource.
#[derive(Clone, Debug, PartialEq)]
pub struct Interval {
    pub range: TimeRange,
    pub resource_id: String,
    pub caps: HourCaps,
}

/// Lazy, restartable (clone it) iterator over a resource's availability.
#[derive(Clone, Debug)]
pub struct AvailabilityIter<'a> {
    resource: &'a Resource,
    calendar: &'a Calendar,
    window: TimeRange,
    direction: SearchDirection,
    caps: HourCaps,
    leaves: Vec<TimeRange>,
    next_day: Option<NaiveDate>,
    last_day: NaiveDate,
    buffer: VecDeque<TimeRange>,
}

/// Available intervals of `resource` inside `window`.
///
/// Fixed resources yield their calendar's working rules; flexible resources
/// yield whole local days annotated with their caps. Leave and the resource's
/// validity windows are subtracted in both cases. Gaps in coverage are simply
/// absent from the output.
pub fn availability<'a>(
    resource: &'a Resource,
    calendar: &'a Calendar,
    window: TimeRange,
    direction: SearchDirection,
) -> AvailabilityIter<'a> {
    let first = calendar.local_date(window.start);
    let last = calendar.local_date(window.end);
    let (next_day, last_day) = match direction {
        SearchDirection::Forward => (first, last),
        SearchDirection::Backward => (last, first),
    };

    AvailabilityIter {
        resource,
        calendar,
        window,
        direction,
        caps: HourCaps::for_mode(&resource.mode),
        leaves: calendar.leaves_for(&resource.id, &window),
        next_day: (!window.is_empty()).then_some(next_day),
        last_day,
        buffer: VecDeque::new(),
    }
}

/// Total available hours of `resource` inside `window`, caps ignored.
pub fn available_hours(resource: &Resource, calendar: &Calendar, window: TimeRange) -> f64 {
    availability(resource, calendar, window, SearchDirection::Forward)
        .map(|i| i.range.hours())
        .sum()
}

impl<'a> AvailabilityIter<'a> {
    pub fn resource(&self) -> &'a Resource {
        self.resource
    }

    pub fn direction(&self) -> SearchDirection {
        self.direction
    }

    fn advance_day(&mut self, day: NaiveDate) {
        self.next_day = if day == self.last_day {
            None
        } else {
            match self.direction {
                SearchDirection::Forward => day.succ_opt(),
                SearchDirection::Backward => day.pred_opt(),
            }
        };
    }

    /// Working pieces of one local day, sorted chronologically.
    fn expand_day(&self, day: NaiveDate) -> Vec<TimeRange> {
        let base = match self.resource.mode {
            ResourceMode::Fixed => self.calendar.attendance_on(day),
            ResourceMode::CappedFlexible { .. } | ResourceMode::FullyFlexible { .. } => {
                vec![self.calendar.day_range(day)]
            }
        };

        let mut pieces: Vec<TimeRange> = base
            .iter()
            .filter_map(|r| r.intersect(&self.window))
            .flat_map(|r| r.subtract(&self.leaves))
            .flat_map(|r| self.resource.valid_parts(r))
            .filter(|r| !r.is_empty())
            .collect();
        pieces.sort();
        pieces
    }
}

impl Iterator for AvailabilityIter<'_> {
    type Item = Interval;

    fn next(&mut self) -> Option<Interval> {
        loop {
            let next = match self.direction {
                SearchDirection::Forward => self.buffer.pop_front(),
                SearchDirection::Backward => self.buffer.pop_back(),
            };
            if let Some(range) = next {
                return Some(Interval {
                    range,
                    resource_id: self.resource.id.clone(),
                    caps: self.caps,
                });
            }

            let day = self.next_day?;
            self.advance_day(day);
            self.buffer = self.expand_day(day).into();
        }
    }
}
