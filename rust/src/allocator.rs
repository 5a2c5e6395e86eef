//! Hour allocation over joint availability slices.

use chrono::Duration;

use crate::calendar::availability::SearchDirection;
use crate::calendar::joint::{water_fill, CapLedger, JointSlice};
use crate::models::{hours_to_duration, ResourceSlice, TimeRange};

/// Work committed from a slice sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct Allocation {
    /// Chronological, merged per resource.
    pub slices: Vec<ResourceSlice>,
    /// Budget left when the slices ran out (`<= epsilon` means satisfied).
    pub hours_remaining: f64,
}

impl Allocation {
    pub fn is_complete(&self, epsilon: f64) -> bool {
        self.hours_remaining <= epsilon
    }

    /// The outer bounds of the committed work.
    pub fn span(&self) -> Option<TimeRange> {
        let start = self.slices.iter().map(|s| s.range.start).min()?;
        let end = self.slices.iter().map(|s| s.range.end).max()?;
        Some(TimeRange::new(start, end))
    }

    pub fn total_hours(&self) -> f64 {
        self.slices.iter().map(ResourceSlice::hours).sum()
    }
}

/// Consume `hours_needed` from `slices` in the order given.
///
/// Each slice's resources split the remaining budget by water-filling against
/// `ledger`, which is charged for what is taken. Forward allocation takes the
/// head of a slice, backward its tail. Slices shorter than `granularity` are
/// skipped. Stops as soon as the budget is within `epsilon` of zero.
pub fn allocate<I>(
    slices: I,
    hours_needed: f64,
    direction: SearchDirection,
    ledger: &mut CapLedger,
    epsilon: f64,
    granularity: Option<Duration>,
) -> Allocation
where
    I: IntoIterator<Item = JointSlice>,
{
    let mut remaining = hours_needed.max(0.0);
    let mut taken: Vec<ResourceSlice> = Vec::new();

    for slice in slices {
        if remaining <= epsilon {
            break;
        }
        if slice.range.is_empty() || slice.resource_ids.is_empty() {
            continue;
        }
        if granularity.is_some_and(|g| slice.range.duration() < g) {
            continue;
        }

        let capacities: Vec<(&str, f64)> = slice
            .resource_ids
            .iter()
            .map(|id| (id.as_str(), ledger.capacity(id, slice.range)))
            .collect();
        let shares = water_fill(remaining, &capacities);

        for ((resource_id, _), share) in capacities.iter().zip(shares) {
            if share <= 0.0 {
                continue;
            }
            let length = hours_to_duration(share);
            if length <= Duration::zero() {
                continue;
            }
            let range = match direction {
                SearchDirection::Forward => {
                    TimeRange::new(slice.range.start, slice.range.start + length)
                }
                SearchDirection::Backward => {
                    TimeRange::new(slice.range.end - length, slice.range.end)
                }
            };
            let range = range.intersect(&slice.range).unwrap_or(slice.range);
            ledger.consume(resource_id, range);
            remaining -= range.hours();
            taken.push(ResourceSlice::new(*resource_id, range));
        }
    }

    Allocation {
        slices: merge_slices(taken),
        hours_remaining: remaining.max(0.0),
    }
}

/// Sort chronologically and join touching ranges of the same resource.
pub fn merge_slices(mut slices: Vec<ResourceSlice>) -> Vec<ResourceSlice> {
    slices.sort_by(|a, b| {
        a.resource_id
            .cmp(&b.resource_id)
            .then_with(|| a.range.cmp(&b.range))
    });

    let mut merged: Vec<ResourceSlice> = Vec::with_capacity(slices.len());
    for slice in slices {
        match merged.last_mut() {
            Some(last)
                if last.resource_id == slice.resource_id && last.range.end >= slice.range.start =>
            {
                last.range.end = last.range.end.max(slice.range.end);
            }
            _ => merged.push(slice),
        }
    }

    merged.sort_by(|a, b| {
        a.range
            .cmp(&b.range)
            .then_with(|| a.resource_id.cmp(&b.resource_id))
    });
    merged
}
