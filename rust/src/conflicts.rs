//! Committed placements indexed per resource for overlap lookups.
//!
//! A task occupies each of its resources for its whole `[begin, deadline)`
//! span, gaps between its work slices included.

use chrono::{DateTime, Duration, Utc};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::models::{Placement, TimeRange};

/// The span one committed task holds on a resource.
#[derive(Clone, Debug, PartialEq)]
pub struct Booking {
    pub range: TimeRange,
    pub task_id: String,
}

/// Bookings of one resource.
///
/// Invariant: `entries` is sorted by start. Bookings of different tasks may
/// overlap (pinned input is not validated); `longest` bounds how far back a
/// booking can start and still reach a query range.
#[derive(Clone, Debug, Default)]
struct ResourceBookings {
    entries: Vec<Booking>,
    longest: Duration,
}

impl ResourceBookings {
    fn insert(&mut self, booking: Booking) {
        self.longest = self.longest.max(booking.range.duration());
        let idx = self
            .entries
            .partition_point(|b| b.range.start <= booking.range.start);
        self.entries.insert(idx, booking);
    }

    fn remove_task(&mut self, task_id: &str) {
        self.entries.retain(|b| b.task_id != task_id);
    }

    fn overlapping(&self, range: &TimeRange) -> impl Iterator<Item = &Booking> + '_ {
        let range = *range;
        let lo = self
            .entries
            .partition_point(|b| b.range.start < range.start - self.longest);
        let hi = self.entries.partition_point(|b| b.range.start < range.end);
        self.entries[lo..hi.max(lo)]
            .iter()
            .filter(move |b| b.range.overlaps(&range))
    }
}

/// The committed placement store.
#[derive(Clone, Debug, Default)]
pub struct PlacementBook {
    by_resource: FxHashMap<String, ResourceBookings>,
    by_task: FxHashMap<String, Placement>,
}

impl PlacementBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_task.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_task.is_empty()
    }

    pub fn get(&self, task_id: &str) -> Option<&Placement> {
        self.by_task.get(task_id)
    }

    pub fn placements(&self) -> impl Iterator<Item = &Placement> {
        self.by_task.values()
    }

    /// Commit `placement`, replacing any earlier placement of the same task.
    pub fn insert(&mut self, placement: Placement) {
        self.remove(&placement.task_id);
        let span = placement.span();
        for resource_id in &placement.resource_ids {
            self.by_resource
                .entry(resource_id.clone())
                .or_default()
                .insert(Booking {
                    range: span,
                    task_id: placement.task_id.clone(),
                });
        }
        self.by_task.insert(placement.task_id.clone(), placement);
    }

    pub fn remove(&mut self, task_id: &str) -> Option<Placement> {
        let placement = self.by_task.remove(task_id)?;
        for resource_id in &placement.resource_ids {
            if let Some(bookings) = self.by_resource.get_mut(resource_id) {
                bookings.remove_task(task_id);
            }
        }
        Some(placement)
    }

    /// Bookings of one resource, sorted by start.
    pub fn bookings(&self, resource_id: &str) -> &[Booking] {
        self.by_resource
            .get(resource_id)
            .map(|b| b.entries.as_slice())
            .unwrap_or_default()
    }

    /// Tasks booked on `resource_id` during `range`, sorted by begin.
    pub fn overlaps(
        &self,
        resource_id: &str,
        range: &TimeRange,
        excluding: &FxHashSet<String>,
    ) -> Vec<String> {
        let Some(bookings) = self.by_resource.get(resource_id) else {
            return Vec::new();
        };
        let ids: FxHashSet<&str> = bookings
            .overlapping(range)
            .map(|b| b.task_id.as_str())
            .filter(|id| !excluding.contains(*id))
            .collect();
        self.sorted_by_begin(ids)
    }

    /// Tasks overlapping any slice of `placement`, sorted by begin.
    pub fn conflicts_with(&self, placement: &Placement, excluding: &FxHashSet<String>) -> Vec<String> {
        let span = placement.span();
        let mut ids: FxHashSet<&str> = FxHashSet::default();
        for resource_id in &placement.resource_ids {
            if let Some(bookings) = self.by_resource.get(resource_id) {
                ids.extend(
                    bookings
                        .overlapping(&span)
                        .map(|b| b.task_id.as_str())
                        .filter(|id| *id != placement.task_id && !excluding.contains(*id)),
                );
            }
        }
        self.sorted_by_begin(ids)
    }

    fn sorted_by_begin(&self, ids: FxHashSet<&str>) -> Vec<String> {
        let mut found: Vec<(&str, Option<DateTime<Utc>>)> = ids
            .into_iter()
            .map(|id| (id, self.by_task.get(id).map(|p| p.begin)))
            .collect();
        found.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        found.into_iter().map(|(id, _)| id.to_string()).collect()
    }
}
