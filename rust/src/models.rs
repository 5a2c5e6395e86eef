//! Core data types for the scheduling engine.

use chrono::{DateTime, Duration, Utc};

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Hours elapsed between two instants (negative if `end < start`).
#[inline]
pub fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / MS_PER_HOUR
}

/// Duration for a fractional number of hours, rounded to the millisecond.
#[inline]
pub fn hours_to_duration(hours: f64) -> Duration {
    Duration::milliseconds((hours * MS_PER_HOUR).round() as i64)
}

/// A half-open time range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Empty or inverted ranges are unusable and get filtered out.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    #[inline]
    pub fn hours(&self) -> f64 {
        hours_between(self.start, self.end).max(0.0)
    }

    #[inline]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    #[inline]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// Whether two ranges share any instant (touching ends do not overlap).
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let r = Self::new(self.start.max(other.start), self.end.min(other.end));
        (!r.is_empty()).then_some(r)
    }

    /// Whether `other` lies entirely inside this range.
    pub fn covers(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Remove every range of `holes` from this one.
    ///
    /// `holes` need not be sorted or disjoint. The result is sorted and only
    /// holds non-empty pieces.
    pub fn subtract(&self, holes: &[TimeRange]) -> Vec<TimeRange> {
        let mut relevant: Vec<TimeRange> = holes
            .iter()
            .filter(|h| !h.is_empty() && h.overlaps(self))
            .copied()
            .collect();
        if relevant.is_empty() {
            return if self.is_empty() { Vec::new() } else { vec![*self] };
        }
        relevant.sort();

        let mut pieces = Vec::new();
        let mut cursor = self.start;
        for hole in relevant {
            if hole.start > cursor {
                pieces.push(Self::new(cursor, hole.start.min(self.end)));
            }
            cursor = cursor.max(hole.end);
            if cursor >= self.end {
                break;
            }
        }
        if cursor < self.end {
            pieces.push(Self::new(cursor, self.end));
        }
        pieces.retain(|p| !p.is_empty());
        pieces
    }
}

/// How a resource's working time is bounded.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum ResourceMode {
    /// Works exactly the attendance rules of its calendar.
    #[default]
    Fixed,
    /// Free start time, but at most `daily_cap` hours per local day.
    CappedFlexible { daily_cap: f64, weekly_cap: f64 },
    /// Any time of day, bounded only by a weekly hour cap.
    FullyFlexible { weekly_cap: f64 },
}

impl ResourceMode {
    pub fn is_flexible(&self) -> bool {
        !matches!(self, Self::Fixed)
    }

    pub fn daily_cap(&self) -> Option<f64> {
        match self {
            Self::CappedFlexible { daily_cap, .. } => Some(*daily_cap),
            _ => None,
        }
    }

    pub fn weekly_cap(&self) -> Option<f64> {
        match self {
            Self::Fixed => None,
            Self::CappedFlexible { weekly_cap, .. } | Self::FullyFlexible { weekly_cap } => {
                Some(*weekly_cap)
            }
        }
    }
}

/// An assignable capacity unit (a worker, a machine).
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    pub id: String,
    /// Calendar shared by reference; many resources may point at one calendar.
    pub calendar_id: String,
    pub mode: ResourceMode,
    /// Periods during which the resource exists at all (contracts,
    /// engagements). Empty means unrestricted.
    pub validity: Vec<TimeRange>,
}

impl Resource {
    pub fn new(id: impl Into<String>, calendar_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            calendar_id: calendar_id.into(),
            mode: ResourceMode::Fixed,
            validity: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: ResourceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_validity(mut self, range: TimeRange) -> Self {
        self.validity.push(range);
        self
    }

    /// Clip `range` to the resource's validity windows.
    pub fn valid_parts(&self, range: TimeRange) -> Vec<TimeRange> {
        if self.validity.is_empty() {
            return if range.is_empty() { Vec::new() } else { vec![range] };
        }
        let mut parts: Vec<TimeRange> = self
            .validity
            .iter()
            .filter_map(|v| v.intersect(&range))
            .collect();
        parts.sort();
        parts
    }
}

/// A unit of work with an hour budget and dependency links.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Task {
    pub id: String,
    pub planned_begin: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    /// Hours of work; 0 means "whatever the dated window provides".
    pub allocated_hours: f64,
    /// Predecessors: this task may not start before they finish.
    pub depends_on: Vec<String>,
    /// Successors, kept as the inverse of `depends_on` by the state.
    pub dependents: Vec<String>,
    pub resource_ids: Vec<String>,
    /// Earliest start accepted by the batch planner.
    pub earliest_start: Option<DateTime<Utc>>,
    /// Target completion used to order batch planning.
    pub due_date: Option<DateTime<Utc>>,
    /// Higher plans first when due dates tie.
    pub priority: i32,
}

impl Task {
    pub fn new(id: impl Into<String>, allocated_hours: f64) -> Self {
        Self {
            id: id.into(),
            allocated_hours: allocated_hours.max(0.0),
            ..Self::default()
        }
    }

    pub fn with_resources<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependencies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dates(mut self, begin: DateTime<Utc>, deadline: DateTime<Utc>) -> Self {
        self.planned_begin = Some(begin);
        self.deadline = Some(deadline);
        self
    }

    pub fn with_earliest_start(mut self, earliest: DateTime<Utc>) -> Self {
        self.earliest_start = Some(earliest);
        self
    }

    pub fn with_due_date(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = Some(due);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// The dated span, if the task is scheduled.
    pub fn span(&self) -> Option<TimeRange> {
        match (self.planned_begin, self.deadline) {
            (Some(begin), Some(end)) => Some(TimeRange::new(begin, end)),
            _ => None,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.span().is_some()
    }
}

/// Hours one resource works on a task during one contiguous range.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceSlice {
    pub resource_id: String,
    pub range: TimeRange,
}

impl ResourceSlice {
    pub fn new(resource_id: impl Into<String>, range: TimeRange) -> Self {
        Self {
            resource_id: resource_id.into(),
            range,
        }
    }

    #[inline]
    pub fn hours(&self) -> f64 {
        self.range.hours()
    }
}

/// The committed dates of one task plus the work slices that justify them.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    pub task_id: String,
    pub begin: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    /// Per-resource sub-intervals, chronologically sorted. Empty for tasks
    /// without resources.
    pub slices: Vec<ResourceSlice>,
    /// Resources whose time the whole `[begin, deadline)` span occupies.
    /// Sorted, no duplicates; always includes every slice's resource.
    pub resource_ids: Vec<String>,
}

impl Placement {
    pub fn new(
        task_id: impl Into<String>,
        begin: DateTime<Utc>,
        deadline: DateTime<Utc>,
        slices: Vec<ResourceSlice>,
    ) -> Self {
        let mut resource_ids: Vec<String> = slices.iter().map(|s| s.resource_id.clone()).collect();
        resource_ids.sort();
        resource_ids.dedup();
        Self {
            task_id: task_id.into(),
            begin,
            deadline,
            slices,
            resource_ids,
        }
    }

    /// Also occupy `ids`, worked or not.
    pub fn with_resources<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_ids.extend(ids.into_iter().map(Into::into));
        self.resource_ids.sort();
        self.resource_ids.dedup();
        self
    }

    pub fn span(&self) -> TimeRange {
        TimeRange::new(self.begin, self.deadline)
    }

    /// Total hours over all slices.
    pub fn total_hours(&self) -> f64 {
        self.slices.iter().map(ResourceSlice::hours).sum()
    }

    /// Hours worked by one resource.
    pub fn hours_for(&self, resource_id: &str) -> f64 {
        self.slices
            .iter()
            .filter(|s| s.resource_id == resource_id)
            .map(ResourceSlice::hours)
            .sum()
    }
}
