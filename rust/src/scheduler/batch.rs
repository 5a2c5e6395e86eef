//! Batch auto-planning of undated tasks.

use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::calendar::availability::SearchDirection;
use crate::calendar::joint::CapLedger;
use crate::config::ScheduleOptions;
use crate::conflicts::PlacementBook;
use crate::error::{ScheduleError, Warning, WarningCode};
use crate::models::{hours_to_duration, Placement, TimeRange};
use crate::sink::PlacementSink;
use crate::{log_checks, log_debug};

use super::ordering::plan_order;
use super::placement::{Placer, Request, Resolution, SearchParams};
use super::{Outcome, Scheduler};

/// Everything a batch has decided so far. Threaded by value through the
/// planning loop so each step sees the placements of the steps before it.
#[derive(Clone, Debug)]
struct BatchAcc {
    book: PlacementBook,
    ledger: CapLedger,
    /// Accepted placements in planning order.
    placed: Vec<Placement>,
    ends: FxHashMap<String, DateTime<Utc>>,
    failed: FxHashSet<String>,
    warnings: Vec<Warning>,
}

impl BatchAcc {
    fn accept(mut self, placement: Placement, ledger: CapLedger) -> Self {
        self.ledger = ledger;
        self.ends.insert(placement.task_id.clone(), placement.deadline);
        self.book.insert(placement.clone());
        self.placed.push(placement);
        self
    }

    fn reject(mut self, warning: Warning) -> Self {
        self.failed.insert(warning.task_id.clone());
        self.warnings.push(warning);
        self
    }
}

/// Fixed inputs of one batch run.
struct BatchPlan<'a> {
    members: FxHashSet<String>,
    window: TimeRange,
    limit: DateTime<Utc>,
    options: &'a ScheduleOptions,
    params: SearchParams,
}

impl<S: PlacementSink> Scheduler<S> {
    /// Place the undated tasks of `task_ids` inside `window`.
    ///
    /// Tasks are planned by due date, then priority, then id, each only once
    /// its in-batch dependencies are placed, starting no earlier than the
    /// window, its own earliest start, and the end of its dependencies. Tasks
    /// that already have dates are left alone. Infeasible tasks and tasks in
    /// a dependency cycle get warnings; the rest of the batch proceeds.
    pub fn schedule_tasks<T: AsRef<str>>(
        &mut self,
        task_ids: &[T],
        window: TimeRange,
        options: &ScheduleOptions,
    ) -> Result<Outcome, ScheduleError> {
        if window.is_empty() {
            return Err(ScheduleError::InvalidWindow {
                subject: "batch".to_string(),
                start: window.start,
                end: window.end,
            });
        }
        for id in &options.default_resource_ids {
            self.state.resource_with_calendar(id)?;
        }

        let mut outcome = Outcome::default();
        let mut members: FxHashSet<String> = FxHashSet::default();
        for id in task_ids {
            let id = id.as_ref();
            let task = self
                .state
                .task(id)
                .ok_or_else(|| ScheduleError::UnknownTask(id.to_string()))?;
            if task.is_scheduled() {
                outcome.unchanged.push(id.to_string());
            } else {
                members.insert(id.to_string());
            }
        }

        let graph = self.state.graph();
        let mut cyclic: Vec<(String, String)> = Vec::new();
        for component in graph.components() {
            if !component.iter().any(|id| members.contains(id)) {
                continue;
            }
            if let Err(err) = graph.check_acyclic(&component) {
                let detail = err.to_string();
                for id in component.into_iter().filter(|id| members.contains(id)) {
                    cyclic.push((id, detail.clone()));
                }
            }
        }
        for (id, detail) in cyclic {
            members.remove(&id);
            self.warn(
                &mut outcome,
                Warning::new(id, WarningCode::CyclicDependency, detail),
            );
        }

        let plan = BatchPlan {
            limit: options
                .last_date_in_view
                .map_or(window.end, |last| last.min(window.end)),
            members,
            window,
            options,
            params: self.search_params(options.cell_granularity),
        };
        let mut pending = plan_order(
            plan.members
                .iter()
                .filter_map(|id| self.state.task(id)),
        );

        let mut acc = BatchAcc {
            book: self.state.book().clone(),
            ledger: self.state.cap_ledger(),
            placed: Vec::new(),
            ends: FxHashMap::default(),
            failed: FxHashSet::default(),
            warnings: Vec::new(),
        };

        while !pending.is_empty() {
            let next = pending.iter().position(|id| self.ready(id, &plan, &acc));
            let Some(idx) = next else {
                break;
            };
            let id = pending.remove(idx);
            acc = self.plan_one(acc, &id, &plan)?;

            if self.cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
        }

        for placement in acc.placed {
            if !placement.slices.is_empty() {
                let resources = self.resources_for(&placement.task_id, plan.options);
                self.state.assign_resources(&placement.task_id, &resources);
            }
            self.commit(&mut outcome, placement);
        }
        for warning in acc.warnings {
            self.warn(&mut outcome, warning);
        }
        if outcome.cancelled {
            self.cancel_rest(&mut outcome, &pending);
        }
        Ok(outcome)
    }

    /// All in-batch dependencies of `id` have been decided.
    fn ready(&self, id: &str, plan: &BatchPlan<'_>, acc: &BatchAcc) -> bool {
        self.state.task(id).map_or(true, |task| {
            task.depends_on
                .iter()
                .filter(|d| plan.members.contains(*d))
                .all(|d| acc.ends.contains_key(d) || acc.failed.contains(d))
        })
    }

    fn resources_for(&self, task_id: &str, options: &ScheduleOptions) -> Vec<String> {
        match self.state.task(task_id) {
            Some(task) if !task.resource_ids.is_empty() => task.resource_ids.clone(),
            _ => options.default_resource_ids.clone(),
        }
    }

    fn plan_one(&self, acc: BatchAcc, id: &str, plan: &BatchPlan<'_>) -> Result<BatchAcc, ScheduleError> {
        let Some(task) = self.state.task(id) else {
            return Ok(acc);
        };

        if let Some(blocked) = task
            .depends_on
            .iter()
            .find(|d| acc.failed.contains(*d))
        {
            return Ok(acc.reject(Warning::new(
                id,
                WarningCode::NoIntervals,
                format!("dependency {blocked} was not placed"),
            )));
        }

        if task.allocated_hours <= plan.params.epsilon {
            return Ok(acc.reject(Warning::new(
                id,
                WarningCode::InvalidWindow,
                "no allocated hours to derive a duration from",
            )));
        }

        let dependency_end = task
            .depends_on
            .iter()
            .filter_map(|d| {
                acc.ends
                    .get(d)
                    .copied()
                    .or_else(|| self.state.task(d)?.deadline)
            })
            .max();
        let floor = [Some(plan.window.start), task.earliest_start, dependency_end]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(plan.window.start);

        let resource_ids = self.resources_for(id, plan.options);
        log_checks!(
            self.config.verbosity,
            "{}: floor {} on {:?}",
            id,
            floor,
            resource_ids
        );
        if floor >= plan.limit {
            return Ok(acc.reject(Warning::new(
                id,
                WarningCode::InvalidWindow,
                format!("earliest start {floor} is past the planning window"),
            )));
        }

        let request = Request {
            task_id: id,
            resource_ids: &resource_ids,
            hours: task.allocated_hours,
            duration: hours_to_duration(task.allocated_hours),
            anchor: floor,
            limit: plan.limit,
            direction: SearchDirection::Forward,
        };
        let excluding = FxHashSet::default();
        let placer = Placer {
            state: &self.state,
            book: &acc.book,
            ledger: &acc.ledger,
            params: &plan.params,
            excluding: &excluding,
            max_retries: self.config.max_retries,
            verbosity: self.config.verbosity,
        };
        let resolution = placer.run(&request)?;

        Ok(match resolution {
            Resolution::Accepted {
                placement, ledger, ..
            } => {
                log_debug!(self.config.verbosity, "{}: accepted", id);
                acc.accept(placement, ledger)
            }
            Resolution::NoIntervals { hours_remaining } => acc.reject(Warning::new(
                id,
                WarningCode::NoIntervals,
                format!("{hours_remaining:.2}h did not fit before {}", plan.limit),
            )),
            Resolution::Exhausted { conflicts } => acc.reject(Warning::new(
                id,
                WarningCode::Exhausted,
                format!("still conflicting with {}", conflicts.join(", ")),
            )),
        })
    }
}
