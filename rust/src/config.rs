//! Configuration types for the scheduling engine.

use chrono::{DateTime, Duration, Utc};

/// Longest propagation search horizon, in days.
pub const MAX_SEARCH_HORIZON_DAYS: i64 = 36_500;

/// How a task shared by several resources consumes their calendars.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MultiResourcePolicy {
    /// Every slice where at least one assigned resource is available counts;
    /// resources present together share that slice's hours.
    #[default]
    Independent,
    /// Only slices where all assigned resources are available count.
    Together,
}

/// Engine-wide settings.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    pub verbosity: u8,
    /// Conflict retries per task before giving up with `Exhausted`.
    pub max_retries: u32,
    /// Hours below this are treated as zero when consuming a budget.
    pub hour_epsilon: f64,
    /// How far (in days) propagation searches from its anchor. Clamped to
    /// `1..=MAX_SEARCH_HORIZON_DAYS`.
    pub search_horizon_days: i64,
    /// Multi-resource slicing policy.
    pub multi_resource: MultiResourcePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            max_retries: 32,
            hour_epsilon: 1e-4,
            search_horizon_days: 366,
            multi_resource: MultiResourcePolicy::Independent,
        }
    }
}

impl SchedulerConfig {
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_search_horizon_days(mut self, days: i64) -> Self {
        self.search_horizon_days = days.clamp(1, MAX_SEARCH_HORIZON_DAYS);
        self
    }

    pub fn with_multi_resource(mut self, policy: MultiResourcePolicy) -> Self {
        self.multi_resource = policy;
        self
    }

    /// Propagation search horizon as a duration.
    pub fn search_horizon(&self) -> Duration {
        Duration::days(self.search_horizon_days.clamp(1, MAX_SEARCH_HORIZON_DAYS))
    }
}

/// Per-call options for batch auto-planning.
#[derive(Clone, Debug, Default)]
pub struct ScheduleOptions {
    /// Late bound for the placement search (clamps the batch window's end).
    pub last_date_in_view: Option<DateTime<Utc>>,
    /// Resources used for tasks that have none assigned.
    pub default_resource_ids: Vec<String>,
    /// Minimum schedulable slice size; shorter availability slices are skipped.
    pub cell_granularity: Option<Duration>,
}

impl ScheduleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_last_date_in_view(mut self, last: DateTime<Utc>) -> Self {
        self.last_date_in_view = Some(last);
        self
    }

    pub fn with_default_resources<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_resource_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cell_granularity(mut self, granularity: Duration) -> Self {
        self.cell_granularity = Some(granularity);
        self
    }
}
