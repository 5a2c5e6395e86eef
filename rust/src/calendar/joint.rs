//! Joint availability of several resources and the hour caps that bound it.

use chrono::{DateTime, Datelike, FixedOffset, IsoWeek, NaiveDate, Utc};
use rustc_hash::FxHashMap;

use crate::config::MultiResourcePolicy;
use crate::models::{hours_between, Resource, ResourceSlice, TimeRange};

use super::availability::{AvailabilityIter, HourCaps, SearchDirection};
use super::{local_midnight, Calendar};

/// An elementary range during which the same set of resources is available.
#[derive(Clone, Debug, PartialEq)]
pub struct JointSlice {
    pub range: TimeRange,
    /// Sorted ascending.
    pub resource_ids: Vec<String>,
}

impl JointSlice {
    pub fn hours(&self) -> f64 {
        self.range.hours()
    }
}

/// Sweep-merge of per-resource availability into elementary slices.
///
/// Every boundary of every input interval is a slice boundary, so inside one
/// slice the set of available resources is constant. Slices come out in the
/// direction of the inputs (all inputs must share it).
#[derive(Clone, Debug)]
pub struct JointAvailability<'a> {
    sources: Vec<AvailabilityIter<'a>>,
    heads: Vec<Option<TimeRange>>,
    direction: SearchDirection,
    policy: MultiResourcePolicy,
}

impl<'a> JointAvailability<'a> {
    pub fn new(mut sources: Vec<AvailabilityIter<'a>>, policy: MultiResourcePolicy) -> Self {
        sources.sort_by(|a, b| a.resource().id.cmp(&b.resource().id));
        let direction = sources
            .first()
            .map_or(SearchDirection::Forward, |s| s.direction());
        debug_assert!(sources.iter().all(|s| s.direction() == direction));
        let heads = sources.iter_mut().map(|s| s.next().map(|i| i.range)).collect();
        Self {
            sources,
            heads,
            direction,
            policy,
        }
    }

    pub fn direction(&self) -> SearchDirection {
        self.direction
    }

    fn refill(&mut self, idx: usize) {
        let exhausted = self.heads[idx].map_or(true, |h| h.is_empty());
        if exhausted {
            self.heads[idx] = self.sources[idx].next().map(|i| i.range);
        }
    }

    fn sweep_forward(&mut self) -> Option<JointSlice> {
        let start = self.heads.iter().flatten().map(|h| h.start).min()?;
        let end = self
            .heads
            .iter()
            .flatten()
            .map(|h| if h.start == start { h.end } else { h.start })
            .min()?;

        let mut resource_ids = Vec::new();
        for idx in 0..self.heads.len() {
            if let Some(head) = self.heads[idx].as_mut() {
                if head.start == start {
                    head.start = end;
                    resource_ids.push(self.sources[idx].resource().id.clone());
                    self.refill(idx);
                }
            }
        }
        Some(JointSlice {
            range: TimeRange::new(start, end),
            resource_ids,
        })
    }

    fn sweep_backward(&mut self) -> Option<JointSlice> {
        let end = self.heads.iter().flatten().map(|h| h.end).max()?;
        let start = self
            .heads
            .iter()
            .flatten()
            .map(|h| if h.end == end { h.start } else { h.end })
            .max()?;

        let mut resource_ids = Vec::new();
        for idx in 0..self.heads.len() {
            if let Some(head) = self.heads[idx].as_mut() {
                if head.end == end {
                    head.end = start;
                    resource_ids.push(self.sources[idx].resource().id.clone());
                    self.refill(idx);
                }
            }
        }
        Some(JointSlice {
            range: TimeRange::new(start, end),
            resource_ids,
        })
    }
}

impl Iterator for JointAvailability<'_> {
    type Item = JointSlice;

    fn next(&mut self) -> Option<JointSlice> {
        loop {
            let slice = match self.direction {
                SearchDirection::Forward => self.sweep_forward()?,
                SearchDirection::Backward => self.sweep_backward()?,
            };
            if self.policy == MultiResourcePolicy::Together
                && slice.resource_ids.len() < self.sources.len()
            {
                continue;
            }
            return Some(slice);
        }
    }
}

/// Split `remaining` hours across resources with the given capacities.
///
/// Each resource gets an even share of what is left, or its whole capacity
/// when that is smaller; the shortfall goes to the others. Capacities are
/// visited smallest first, ties by resource id, so at most one round per
/// resource is needed. Shares come back in input order.
pub fn water_fill(remaining: f64, capacities: &[(&str, f64)]) -> Vec<f64> {
    let mut shares = vec![0.0; capacities.len()];
    let mut order: Vec<usize> = (0..capacities.len()).collect();
    order.sort_by(|&a, &b| {
        capacities[a]
            .1
            .total_cmp(&capacities[b].1)
            .then_with(|| capacities[a].0.cmp(capacities[b].0))
    });

    let mut budget = remaining.max(0.0);
    let mut left = order.len();
    for idx in order {
        if budget <= 0.0 {
            break;
        }
        let even = budget / left as f64;
        let share = capacities[idx].1.max(0.0).min(even);
        shares[idx] = share;
        budget -= share;
        left -= 1;
    }
    shares
}

#[derive(Clone, Debug)]
struct CapSpec {
    caps: HourCaps,
    offset: FixedOffset,
}

/// Consumed hours per resource by local date and ISO week.
///
/// Only resources registered with caps are tracked; everything else has
/// unbounded remaining capacity.
#[derive(Clone, Debug, Default)]
pub struct CapLedger {
    specs: FxHashMap<String, CapSpec>,
    daily: FxHashMap<(String, NaiveDate), f64>,
    weekly: FxHashMap<(String, IsoWeek), f64>,
}

impl CapLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `resource`'s caps in `calendar`'s local time. Fixed resources
    /// are ignored.
    pub fn register(&mut self, resource: &Resource, calendar: &Calendar) {
        let caps = HourCaps::for_mode(&resource.mode);
        if caps.daily.is_none() && caps.weekly.is_none() {
            return;
        }
        self.specs.insert(
            resource.id.clone(),
            CapSpec {
                caps,
                offset: calendar.utc_offset,
            },
        );
    }

    pub fn is_capped(&self, resource_id: &str) -> bool {
        self.specs.contains_key(resource_id)
    }

    /// Hours left on a local date; `None` when the day is uncapped.
    pub fn daily_remaining(&self, resource_id: &str, date: NaiveDate) -> Option<f64> {
        let cap = self.specs.get(resource_id)?.caps.daily?;
        let used = self
            .daily
            .get(&(resource_id.to_string(), date))
            .copied()
            .unwrap_or(0.0);
        Some((cap - used).max(0.0))
    }

    /// Hours left in an ISO week; `None` when the week is uncapped.
    pub fn weekly_remaining(&self, resource_id: &str, week: IsoWeek) -> Option<f64> {
        let cap = self.specs.get(resource_id)?.caps.weekly?;
        let used = self
            .weekly
            .get(&(resource_id.to_string(), week))
            .copied()
            .unwrap_or(0.0);
        Some((cap - used).max(0.0))
    }

    /// Hours `resource_id` can still work inside `range`.
    pub fn capacity(&self, resource_id: &str, range: TimeRange) -> f64 {
        let Some(spec) = self.specs.get(resource_id) else {
            return range.hours();
        };

        let mut per_week: Vec<(IsoWeek, f64)> = Vec::new();
        for (date, hours) in day_pieces(spec.offset, range) {
            let usable = match self.daily_remaining(resource_id, date) {
                Some(left) => hours.min(left),
                None => hours,
            };
            let week = date.iso_week();
            match per_week.iter_mut().find(|(w, _)| *w == week) {
                Some((_, total)) => *total += usable,
                None => per_week.push((week, usable)),
            }
        }

        per_week
            .into_iter()
            .map(|(week, hours)| match self.weekly_remaining(resource_id, week) {
                Some(left) => hours.min(left),
                None => hours,
            })
            .sum()
    }

    /// Record work done by `resource_id` during `range`.
    pub fn consume(&mut self, resource_id: &str, range: TimeRange) {
        self.apply(resource_id, range, 1.0);
    }

    /// Undo a previous `consume`.
    pub fn release(&mut self, resource_id: &str, range: TimeRange) {
        self.apply(resource_id, range, -1.0);
    }

    pub fn consume_slices(&mut self, slices: &[ResourceSlice]) {
        for slice in slices {
            self.consume(&slice.resource_id, slice.range);
        }
    }

    pub fn release_slices(&mut self, slices: &[ResourceSlice]) {
        for slice in slices {
            self.release(&slice.resource_id, slice.range);
        }
    }

    fn apply(&mut self, resource_id: &str, range: TimeRange, sign: f64) {
        let Some(spec) = self.specs.get(resource_id) else {
            return;
        };
        for (date, hours) in day_pieces(spec.offset, range) {
            let day = self
                .daily
                .entry((resource_id.to_string(), date))
                .or_insert(0.0);
            *day = (*day + sign * hours).max(0.0);
            let week = self
                .weekly
                .entry((resource_id.to_string(), date.iso_week()))
                .or_insert(0.0);
            *week = (*week + sign * hours).max(0.0);
        }
    }
}

/// Split a range at local midnights.
fn day_pieces(offset: FixedOffset, range: TimeRange) -> Vec<(NaiveDate, f64)> {
    let mut pieces = Vec::new();
    let mut cursor: DateTime<Utc> = range.start;
    while cursor < range.end {
        let date = cursor.with_timezone(&offset).date_naive();
        let next = date
            .succ_opt()
            .map_or(range.end, |d| local_midnight(offset, d))
            .min(range.end);
        pieces.push((date, hours_between(cursor, next)));
        cursor = next;
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::availability::availability;
    use crate::calendar::WORK_WEEK;
    use crate::models::ResourceMode;
    use chrono::TimeZone;

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
    }

    fn r(from: (u32, u32), to: (u32, u32)) -> TimeRange {
        TimeRange::new(t(from.0, from.1), t(to.0, to.1))
    }

    fn d(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_sweep_splits_at_every_boundary() {
        let a_cal = Calendar::new("a").with_hours(&WORK_WEEK, 8.0, 12.0);
        let b_cal = Calendar::new("b").with_hours(&WORK_WEEK, 10.0, 14.0);
        let a = Resource::new("a", "a");
        let b = Resource::new("b", "b");
        let window = r((6, 0), (7, 0));

        let joint = JointAvailability::new(
            vec![
                availability(&b, &b_cal, window, SearchDirection::Forward),
                availability(&a, &a_cal, window, SearchDirection::Forward),
            ],
            MultiResourcePolicy::Independent,
        );
        let slices: Vec<JointSlice> = joint.collect();
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[0].range, r((6, 8), (6, 10)));
        assert_eq!(slices[0].resource_ids, vec!["a"]);
        assert_eq!(slices[1].range, r((6, 10), (6, 12)));
        assert_eq!(slices[1].resource_ids, vec!["a", "b"]);
        assert_eq!(slices[2].range, r((6, 12), (6, 14)));
        assert_eq!(slices[2].resource_ids, vec!["b"]);
    }

    #[test]
    fn test_together_keeps_intersection_only() {
        let a_cal = Calendar::new("a").with_hours(&WORK_WEEK, 8.0, 12.0);
        let b_cal = Calendar::new("b").with_hours(&WORK_WEEK, 10.0, 14.0);
        let a = Resource::new("a", "a");
        let b = Resource::new("b", "b");
        let window = r((6, 0), (7, 0));

        let slices: Vec<JointSlice> = JointAvailability::new(
            vec![
                availability(&a, &a_cal, window, SearchDirection::Backward),
                availability(&b, &b_cal, window, SearchDirection::Backward),
            ],
            MultiResourcePolicy::Together,
        )
        .collect();
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].range, r((6, 10), (6, 12)));
    }

    #[test]
    fn test_together_disjoint_is_empty() {
        let a_cal = Calendar::new("a").with_hours(&WORK_WEEK, 8.0, 12.0);
        let b_cal = Calendar::new("b").with_hours(&WORK_WEEK, 13.0, 17.0);
        let a = Resource::new("a", "a");
        let b = Resource::new("b", "b");
        let window = r((6, 0), (11, 0));

        let mut joint = JointAvailability::new(
            vec![
                availability(&a, &a_cal, window, SearchDirection::Forward),
                availability(&b, &b_cal, window, SearchDirection::Forward),
            ],
            MultiResourcePolicy::Together,
        );
        assert!(joint.next().is_none());
    }

    #[test]
    fn test_backward_sweep_order() {
        let a_cal = Calendar::new("a").with_hours(&WORK_WEEK, 8.0, 12.0);
        let b_cal = Calendar::new("b").with_hours(&WORK_WEEK, 10.0, 14.0);
        let a = Resource::new("a", "a");
        let b = Resource::new("b", "b");
        let window = r((6, 0), (7, 0));

        let starts: Vec<DateTime<Utc>> = JointAvailability::new(
            vec![
                availability(&a, &a_cal, window, SearchDirection::Backward),
                availability(&b, &b_cal, window, SearchDirection::Backward),
            ],
            MultiResourcePolicy::Independent,
        )
        .map(|s| s.range.start)
        .collect();
        assert_eq!(starts, vec![t(6, 12), t(6, 10), t(6, 8)]);
    }

    #[test]
    fn test_water_fill_redistributes_shortfall() {
        let shares = water_fill(9.0, &[("b", 10.0), ("a", 2.0), ("c", 10.0)]);
        assert!((shares[1] - 2.0).abs() < 1e-9);
        assert!((shares[0] - 3.5).abs() < 1e-9);
        assert!((shares[2] - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_water_fill_even_split_and_small_budget() {
        let shares = water_fill(2.0, &[("a", 4.0), ("b", 4.0)]);
        assert_eq!(shares, vec![1.0, 1.0]);
        let shares = water_fill(10.0, &[("a", 4.0), ("b", 4.0)]);
        assert_eq!(shares, vec![4.0, 4.0]);
    }

    #[test]
    fn test_ledger_weekly_cap() {
        let cal = Calendar::new("any");
        let flex = Resource::new("flex", "any")
            .with_mode(ResourceMode::FullyFlexible { weekly_cap: 40.0 });
        let mut ledger = CapLedger::new();
        ledger.register(&flex, &cal);

        // Mon 6th 00:00 to Tue 7th 12:00 is 36h
        ledger.consume("flex", r((6, 0), (7, 12)));
        let week = d(2025, 1, 6).iso_week();
        assert!((ledger.weekly_remaining("flex", week).unwrap() - 4.0).abs() < 1e-9);
        assert_eq!(ledger.daily_remaining("flex", d(2025, 1, 6)), None);
        assert!((ledger.capacity("flex", r((8, 0), (9, 0))) - 4.0).abs() < 1e-9);
        // next week is untouched
        assert!((ledger.capacity("flex", r((13, 0), (14, 0))) - 24.0).abs() < 1e-9);

        ledger.release("flex", r((7, 0), (7, 12)));
        assert!((ledger.weekly_remaining("flex", week).unwrap() - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_ledger_daily_cap_and_uncapped() {
        let cal = Calendar::new("any");
        let capped = Resource::new("capped", "any").with_mode(ResourceMode::CappedFlexible {
            daily_cap: 6.0,
            weekly_cap: 30.0,
        });
        let mut ledger = CapLedger::new();
        ledger.register(&capped, &cal);
        ledger.register(&Resource::new("fixed", "any"), &cal);

        assert!(!ledger.is_capped("fixed"));
        assert!((ledger.capacity("fixed", r((6, 8), (6, 12))) - 4.0).abs() < 1e-9);

        ledger.consume("capped", r((6, 8), (6, 12)));
        assert!((ledger.capacity("capped", r((6, 12), (6, 20))) - 2.0).abs() < 1e-9);
        // spans two days: 2h left on the 6th, 6h on the 7th
        assert!((ledger.capacity("capped", r((6, 12), (7, 12))) - 8.0).abs() < 1e-9);
    }
}
