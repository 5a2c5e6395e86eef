//! Scheduling engine: auto-shift propagation and batch auto-planning.
//!
//! A `Scheduler` owns its `ScheduleState`, so runs over one state are
//! serialized by `&mut self`. Accepted placements are written to the state
//! as they happen and reported to the `PlacementSink`; there is no rollback
//! when a later task of the same run fails.

mod batch;
mod ordering;
mod placement;
mod propagate;
mod state;

pub use ordering::{plan_order, PlanKey};
pub use state::ScheduleState;

use chrono::{Datelike, IsoWeek, NaiveDate};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::calendar::availability::{availability, SearchDirection};
use crate::calendar::joint::{JointAvailability, JointSlice};
use crate::config::SchedulerConfig;
use crate::error::{ScheduleError, Warning, WarningCode};
use crate::models::{Placement, TimeRange};
use crate::sink::{PlacementSink, RecordingSink};
use crate::{log_changes, log_checks};

use placement::SearchParams;

/// Cooperative cancellation shared with the host.
///
/// Checked after each task is verified; placements committed before the
/// check stay committed.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one scheduling run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outcome {
    /// Placements that changed a task's dates or slices, in commit order.
    pub placements: Vec<Placement>,
    /// Tasks examined and left where they were.
    pub unchanged: Vec<String>,
    pub warnings: Vec<Warning>,
    pub cancelled: bool,
}

impl Outcome {
    pub fn placement(&self, task_id: &str) -> Option<&Placement> {
        self.placements.iter().rev().find(|p| p.task_id == task_id)
    }

    pub fn warnings_for(&self, task_id: &str) -> Vec<&Warning> {
        self.warnings.iter().filter(|w| w.task_id == task_id).collect()
    }

    /// True when nothing moved and nothing went wrong.
    pub fn is_noop(&self) -> bool {
        self.placements.is_empty() && self.warnings.is_empty() && !self.cancelled
    }
}

/// Joint availability of a resource set plus its remaining hours.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidIntervals {
    pub slices: Vec<JointSlice>,
    /// Free hours per resource and local date, after bookings and caps.
    pub daily_remaining: BTreeMap<String, BTreeMap<NaiveDate, f64>>,
    /// Free hours per resource and ISO week, after bookings and caps.
    pub weekly_remaining: BTreeMap<String, BTreeMap<IsoWeek, f64>>,
}

/// The scheduling engine.
#[derive(Debug)]
pub struct Scheduler<S: PlacementSink = RecordingSink> {
    state: ScheduleState,
    config: SchedulerConfig,
    sink: S,
    cancel: CancelFlag,
}

impl Scheduler<RecordingSink> {
    /// An engine that records everything it commits.
    pub fn recording(state: ScheduleState, config: SchedulerConfig) -> Self {
        Self::new(state, config, RecordingSink::new())
    }
}

impl<S: PlacementSink> Scheduler<S> {
    pub fn new(state: ScheduleState, config: SchedulerConfig, sink: S) -> Self {
        Self {
            state,
            config,
            sink,
            cancel: CancelFlag::new(),
        }
    }

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ScheduleState {
        &mut self.state
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// A handle that cancels this engine's runs from elsewhere.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn into_parts(self) -> (ScheduleState, S) {
        (self.state, self.sink)
    }

    fn search_params(&self, granularity: Option<chrono::Duration>) -> SearchParams {
        SearchParams {
            policy: self.config.multi_resource,
            epsilon: self.config.hour_epsilon,
            granularity,
        }
    }

    fn commit(&mut self, outcome: &mut Outcome, placement: Placement) {
        log_changes!(
            self.config.verbosity,
            "{}: {} .. {} ({:.2}h)",
            placement.task_id,
            placement.begin,
            placement.deadline,
            placement.total_hours()
        );
        self.sink.commit_placement(&placement);
        self.state.apply(placement.clone());
        outcome.placements.retain(|p| p.task_id != placement.task_id);
        outcome.placements.push(placement);
    }

    fn warn(&mut self, outcome: &mut Outcome, warning: Warning) {
        log_checks!(self.config.verbosity, "warning {}", warning);
        self.sink.emit_warning(&warning);
        outcome.warnings.push(warning);
    }

    fn cancel_rest(&mut self, outcome: &mut Outcome, rest: &[String]) {
        outcome.cancelled = true;
        for id in rest {
            self.warn(
                outcome,
                Warning::new(id, WarningCode::Cancelled, "run cancelled before this task"),
            );
        }
    }

    /// Joint availability of `resource_ids` in `window` and the hours they
    /// have left per day and per week.
    pub fn valid_intervals<R: AsRef<str>>(
        &self,
        resource_ids: &[R],
        window: TimeRange,
    ) -> Result<ValidIntervals, ScheduleError> {
        if window.is_empty() {
            return Err(ScheduleError::InvalidWindow {
                subject: "valid_intervals".to_string(),
                start: window.start,
                end: window.end,
            });
        }
        let mut ids: Vec<&str> = resource_ids.iter().map(AsRef::as_ref).collect();
        ids.sort_unstable();
        ids.dedup();

        let mut sources = Vec::with_capacity(ids.len());
        for id in &ids {
            let (resource, calendar) = self.state.resource_with_calendar(id)?;
            sources.push(availability(resource, calendar, window, SearchDirection::Forward));
        }
        let slices: Vec<JointSlice> =
            JointAvailability::new(sources, self.config.multi_resource).collect();

        let ledger = self.state.cap_ledger();
        let mut result = ValidIntervals {
            slices,
            ..ValidIntervals::default()
        };
        for id in ids {
            let (resource, calendar) = self.state.resource_with_calendar(id)?;
            let bookings = self.state.book().bookings(id);

            let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();
            for interval in availability(resource, calendar, window, SearchDirection::Forward) {
                let booked: f64 = bookings
                    .iter()
                    .filter_map(|b| b.range.intersect(&interval.range))
                    .map(|r| r.hours())
                    .sum();
                let date = calendar.local_date(interval.range.start);
                *daily.entry(date).or_insert(0.0) += (interval.range.hours() - booked).max(0.0);
            }
            for (date, free) in daily.iter_mut() {
                if let Some(left) = ledger.daily_remaining(id, *date) {
                    *free = free.min(left);
                }
            }

            let mut weekly: BTreeMap<IsoWeek, f64> = BTreeMap::new();
            for (date, free) in &daily {
                *weekly.entry(date.iso_week()).or_insert(0.0) += free;
            }
            for (week, free) in weekly.iter_mut() {
                if let Some(left) = ledger.weekly_remaining(id, *week) {
                    *free = free.min(left);
                }
            }

            result.daily_remaining.insert(id.to_string(), daily);
            result.weekly_remaining.insert(id.to_string(), weekly);
        }
        Ok(result)
    }
}

/// Ids of `list` as an owned set.
fn id_set(list: &[String]) -> FxHashSet<String> {
    list.iter().cloned().collect()
}
