//! Auto-shift propagation after a manual move.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;

use crate::calendar::availability::SearchDirection;
use crate::error::{ScheduleError, Warning, WarningCode};
use crate::graph::Direction;
use crate::models::{hours_to_duration, Task, TimeRange};
use crate::sink::PlacementSink;
use crate::{log_changes, log_checks};

use super::placement::{Placer, Request, Resolution};
use super::{id_set, Outcome, Scheduler};

/// Constraint a task must satisfy in one propagation direction.
struct Anchor {
    at: DateTime<Utc>,
    violated: bool,
}

impl<S: PlacementSink> Scheduler<S> {
    /// Move `task_id` to `[begin, deadline)` and shift whatever the move
    /// disturbs.
    ///
    /// Tasks overlapping the new dates on a shared resource are pushed out of
    /// the way. Dependents are pushed later when the task moved later,
    /// dependencies earlier when it moved earlier, and both when it was newly
    /// dated or stretched. Tasks that cannot be placed keep their dates and
    /// get a warning, as does the moved task when its allocated hours do not
    /// fit inside the new dates. A dependency cycle through the affected tasks rejects
    /// the call before anything changes.
    pub fn reschedule(
        &mut self,
        task_id: &str,
        begin: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Result<Outcome, ScheduleError> {
        if deadline <= begin {
            return Err(ScheduleError::InvalidWindow {
                subject: task_id.to_string(),
                start: begin,
                end: deadline,
            });
        }
        let task = self
            .state
            .task(task_id)
            .cloned()
            .ok_or_else(|| ScheduleError::UnknownTask(task_id.to_string()))?;
        let new = TimeRange::new(begin, deadline);
        let (forward, backward) = match task.span() {
            Some(old) if old != new => (
                new.start > old.start || new.end > old.end,
                new.start < old.start || new.end < old.end,
            ),
            _ => (true, true),
        };

        // Everything that can fail is computed before the state is touched
        let graph = self.state.graph();
        let ancestors = id_set(&graph.order(task_id, Direction::Backward)?);
        graph.order(task_id, Direction::Forward)?;

        let (moved, shortfall) = self.state.placement_within(task_id, new)?;
        let overlapping = self
            .state
            .book()
            .conflicts_with(&moved, &FxHashSet::default());

        let mut push_later = Vec::new();
        let mut push_earlier = Vec::new();
        for id in overlapping {
            if forward && !ancestors.contains(&id) {
                push_later.push(id);
            } else {
                push_earlier.push(id);
            }
        }
        push_earlier.reverse();

        let mut forward_list = Vec::new();
        if forward {
            let mut roots = vec![task_id.to_string()];
            roots.extend(push_later.iter().cloned());
            forward_list = push_later;
            forward_list.extend(graph.order_from(&roots, Direction::Forward)?);
        }
        let mut backward_list = Vec::new();
        if backward {
            let mut roots = vec![task_id.to_string()];
            roots.extend(push_earlier.iter().cloned());
            backward_list = push_earlier;
            backward_list.extend(graph.order_from(&roots, Direction::Backward)?);
        } else if !push_earlier.is_empty() {
            backward_list = push_earlier;
        }

        log_checks!(
            self.config.verbosity,
            "reschedule {}: forward {:?}, backward {:?}",
            task_id,
            forward_list,
            backward_list
        );

        let mut outcome = Outcome::default();
        if self.state.placement(task_id) == Some(&moved) {
            outcome.unchanged.push(task_id.to_string());
        } else {
            self.commit(&mut outcome, moved);
        }
        if shortfall > self.config.hour_epsilon {
            self.warn(
                &mut outcome,
                Warning::new(
                    task_id,
                    WarningCode::NoIntervals,
                    format!("{shortfall:.2}h do not fit between the new dates"),
                ),
            );
        }

        self.propagate(&mut outcome, forward_list, SearchDirection::Forward);
        if !outcome.cancelled {
            self.propagate(&mut outcome, backward_list, SearchDirection::Backward);
        }
        Ok(outcome)
    }

    fn propagate(&mut self, outcome: &mut Outcome, list: Vec<String>, direction: SearchDirection) {
        let mut pending = id_set(&list);
        let mut ledger = self.state.cap_ledger();
        let params = self.search_params(None);
        let horizon = self.config.search_horizon();

        for (idx, id) in list.iter().enumerate() {
            pending.remove(id);
            let Some(task) = self.state.task(id).cloned() else {
                continue;
            };
            let Some(span) = task.span() else {
                log_checks!(self.config.verbosity, "{}: undated, skipped", id);
                continue;
            };

            let anchor = self.anchor(&task, span, direction);
            let current = self.state.placement(id).cloned();
            let conflict_free = current.as_ref().map_or(true, |p| {
                self.state.book().conflicts_with(p, &pending).is_empty()
            });
            if !anchor.violated && conflict_free {
                log_checks!(self.config.verbosity, "{}: already satisfied", id);
                if !outcome.unchanged.contains(id) {
                    outcome.unchanged.push(id.clone());
                }
                continue;
            }

            let hours = if task.allocated_hours > 0.0 {
                task.allocated_hours
            } else {
                current.as_ref().map_or(0.0, |p| p.total_hours())
            };
            let limit = match direction {
                SearchDirection::Forward => anchor
                    .at
                    .checked_add_signed(horizon)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
                SearchDirection::Backward => anchor
                    .at
                    .checked_sub_signed(horizon)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            };
            let request = Request {
                task_id: id,
                resource_ids: &task.resource_ids,
                hours,
                duration: if task.resource_ids.is_empty() || hours <= params.epsilon {
                    span.duration()
                } else {
                    hours_to_duration(hours)
                },
                anchor: anchor.at,
                limit,
                direction,
            };
            let placer = Placer {
                state: &self.state,
                book: self.state.book(),
                ledger: &ledger,
                params: &params,
                excluding: &pending,
                max_retries: self.config.max_retries,
                verbosity: self.config.verbosity,
            };
            // A broken resource reference only sinks this task
            let resolution = placer.run(&request);

            match resolution {
                Ok(Resolution::Accepted {
                    placement,
                    ledger: next,
                    retries,
                }) => {
                    ledger = next;
                    if current.as_ref() == Some(&placement) {
                        outcome.unchanged.push(id.clone());
                    } else {
                        log_changes!(
                            self.config.verbosity,
                            "{} shifted {:?} after {} retries",
                            id,
                            direction,
                            retries
                        );
                        self.commit(outcome, placement);
                    }
                }
                Ok(Resolution::NoIntervals { hours_remaining }) => self.warn(
                    outcome,
                    Warning::new(
                        id,
                        WarningCode::NoIntervals,
                        format!("{hours_remaining:.2}h did not fit within the search horizon"),
                    ),
                ),
                Ok(Resolution::Exhausted { conflicts }) => self.warn(
                    outcome,
                    Warning::new(
                        id,
                        WarningCode::Exhausted,
                        format!("still conflicting with {}", conflicts.join(", ")),
                    ),
                ),
                Err(err) => self.warn(
                    outcome,
                    Warning::new(id, WarningCode::NoIntervals, err.to_string()),
                ),
            }

            if self.cancel.is_cancelled() {
                self.cancel_rest(outcome, &list[idx + 1..]);
                return;
            }
        }
    }

    /// Where `task` has to be in `direction`, never crossing its current
    /// position the wrong way.
    fn anchor(&self, task: &Task, span: TimeRange, direction: SearchDirection) -> Anchor {
        match direction {
            SearchDirection::Forward => {
                let floor = task
                    .depends_on
                    .iter()
                    .filter_map(|d| self.state.task(d)?.deadline)
                    .max();
                match floor {
                    Some(floor) if floor > span.start => Anchor {
                        at: floor,
                        violated: true,
                    },
                    _ => Anchor {
                        at: span.start,
                        violated: false,
                    },
                }
            }
            SearchDirection::Backward => {
                let ceiling = task
                    .dependents
                    .iter()
                    .filter_map(|d| self.state.task(d)?.planned_begin)
                    .min();
                match ceiling {
                    Some(ceiling) if ceiling < span.end => Anchor {
                        at: ceiling,
                        violated: true,
                    },
                    _ => Anchor {
                        at: span.end,
                        violated: false,
                    },
                }
            }
        }
    }
}
