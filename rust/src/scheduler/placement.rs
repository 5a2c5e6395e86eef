//! Per-task placement state machine shared by propagation and batch planning.
//!
//! `Placing` computes a candidate from the anchor, `Verifying` checks it
//! against the book, and a conflict moves to `Retrying`, which re-anchors past
//! the earliest (forward) or latest (backward) conflicting task. The loop ends
//! `Accepted`, out of intervals, or `Exhausted` after `max_retries`.

use chrono::{DateTime, Duration, Utc};
use rustc_hash::FxHashSet;

use crate::allocator::{allocate, Allocation};
use crate::calendar::availability::{availability, SearchDirection};
use crate::calendar::joint::{CapLedger, JointAvailability};
use crate::config::MultiResourcePolicy;
use crate::conflicts::PlacementBook;
use crate::error::ScheduleError;
use crate::models::{Placement, TimeRange};
use crate::log_debug;

use super::state::ScheduleState;

/// Knobs of one slice search.
#[derive(Clone, Debug)]
pub(crate) struct SearchParams {
    pub policy: MultiResourcePolicy,
    pub epsilon: f64,
    pub granularity: Option<Duration>,
}

/// Allocate `hours` for `resource_ids` inside `window`, charging `ledger`.
pub(crate) fn fill(
    state: &ScheduleState,
    resource_ids: &[String],
    window: TimeRange,
    hours: f64,
    direction: SearchDirection,
    ledger: &mut CapLedger,
    params: &SearchParams,
) -> Result<Allocation, ScheduleError> {
    let mut sources = Vec::with_capacity(resource_ids.len());
    for id in resource_ids {
        let (resource, calendar) = state.resource_with_calendar(id)?;
        sources.push(availability(resource, calendar, window, direction));
    }
    let joint = JointAvailability::new(sources, params.policy);
    Ok(allocate(
        joint,
        hours,
        direction,
        ledger,
        params.epsilon,
        params.granularity,
    ))
}

/// What to place and where to start looking.
#[derive(Clone, Debug)]
pub(crate) struct Request<'a> {
    pub task_id: &'a str,
    pub resource_ids: &'a [String],
    pub hours: f64,
    /// Wall-clock length used when there are no resources.
    pub duration: Duration,
    pub anchor: DateTime<Utc>,
    /// Far end of the search (after the anchor forward, before it backward).
    pub limit: DateTime<Utc>,
    pub direction: SearchDirection,
}

/// Terminal state of one placement.
#[derive(Clone, Debug)]
pub(crate) enum Resolution {
    Accepted {
        placement: Placement,
        ledger: CapLedger,
        retries: u32,
    },
    NoIntervals {
        hours_remaining: f64,
    },
    Exhausted {
        conflicts: Vec<String>,
    },
}

enum Phase {
    Placing {
        anchor: DateTime<Utc>,
    },
    Verifying {
        anchor: DateTime<Utc>,
        candidate: Placement,
        ledger: CapLedger,
    },
    Retrying {
        anchor: DateTime<Utc>,
        conflicts: Vec<String>,
    },
}

/// Places one task against a book and a cap ledger.
pub(crate) struct Placer<'a> {
    pub state: &'a ScheduleState,
    pub book: &'a PlacementBook,
    pub ledger: &'a CapLedger,
    pub params: &'a SearchParams,
    /// Tasks whose bookings are ignored during verification.
    pub excluding: &'a FxHashSet<String>,
    pub max_retries: u32,
    pub verbosity: u8,
}

impl Placer<'_> {
    pub fn run(&self, req: &Request<'_>) -> Result<Resolution, ScheduleError> {
        let mut retries = 0u32;
        let mut phase = Phase::Placing { anchor: req.anchor };

        loop {
            phase = match phase {
                Phase::Placing { anchor } => {
                    log_debug!(self.verbosity, "{}: placing from {}", req.task_id, anchor);
                    match self.candidate(req, anchor)? {
                        Ok((candidate, ledger)) => Phase::Verifying {
                            anchor,
                            candidate,
                            ledger,
                        },
                        Err(hours_remaining) => {
                            return Ok(Resolution::NoIntervals { hours_remaining })
                        }
                    }
                }
                Phase::Verifying {
                    anchor,
                    candidate,
                    ledger,
                } => {
                    let conflicts = self.book.conflicts_with(&candidate, self.excluding);
                    if conflicts.is_empty() {
                        return Ok(Resolution::Accepted {
                            placement: candidate,
                            ledger,
                            retries,
                        });
                    }
                    log_debug!(
                        self.verbosity,
                        "{}: candidate {} .. {} conflicts with {:?}",
                        req.task_id,
                        candidate.begin,
                        candidate.deadline,
                        conflicts
                    );
                    Phase::Retrying { anchor, conflicts }
                }
                Phase::Retrying { anchor, conflicts } => {
                    retries += 1;
                    if retries > self.max_retries {
                        return Ok(Resolution::Exhausted { conflicts });
                    }
                    match self.reanchor(req.direction, anchor, &conflicts) {
                        Some(next) => Phase::Placing { anchor: next },
                        None => return Ok(Resolution::Exhausted { conflicts }),
                    }
                }
            };
        }
    }

    /// A candidate placement from `anchor`, or the hours that did not fit.
    fn candidate(
        &self,
        req: &Request<'_>,
        anchor: DateTime<Utc>,
    ) -> Result<Result<(Placement, CapLedger), f64>, ScheduleError> {
        let window = match req.direction {
            SearchDirection::Forward => TimeRange::new(anchor, req.limit),
            SearchDirection::Backward => TimeRange::new(req.limit, anchor),
        };

        // Nothing to work: keep the wall-clock length instead
        if req.resource_ids.is_empty() || req.hours <= self.params.epsilon {
            if req.duration <= Duration::zero() {
                return Ok(Err(req.hours));
            }
            let span = match req.direction {
                SearchDirection::Forward => TimeRange::new(anchor, anchor + req.duration),
                SearchDirection::Backward => TimeRange::new(anchor - req.duration, anchor),
            };
            if !window.covers(&span) {
                return Ok(Err(req.hours.max(span.hours())));
            }
            let placement = Placement::new(req.task_id, span.start, span.end, Vec::new())
                .with_resources(req.resource_ids.iter().cloned());
            return Ok(Ok((placement, self.ledger.clone())));
        }

        if window.is_empty() {
            return Ok(Err(req.hours));
        }

        let mut ledger = self.ledger.clone();
        if let Some(current) = self.book.get(req.task_id) {
            ledger.release_slices(&current.slices);
        }
        let allocation = fill(
            self.state,
            req.resource_ids,
            window,
            req.hours,
            req.direction,
            &mut ledger,
            self.params,
        )?;
        if !allocation.is_complete(self.params.epsilon) {
            return Ok(Err(allocation.hours_remaining));
        }
        let Some(span) = allocation.span() else {
            return Ok(Err(req.hours));
        };

        let placement = Placement::new(req.task_id, span.start, span.end, allocation.slices)
            .with_resources(req.resource_ids.iter().cloned());
        Ok(Ok((placement, ledger)))
    }

    fn reanchor(
        &self,
        direction: SearchDirection,
        anchor: DateTime<Utc>,
        conflicts: &[String],
    ) -> Option<DateTime<Utc>> {
        let next = match direction {
            SearchDirection::Forward => {
                let first = self.book.get(conflicts.first()?)?;
                first.deadline
            }
            SearchDirection::Backward => {
                let last = self.book.get(conflicts.last()?)?;
                last.begin
            }
        };
        let progressed = match direction {
            SearchDirection::Forward => next > anchor,
            SearchDirection::Backward => next < anchor,
        };
        progressed.then_some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{Calendar, WORK_WEEK};
    use crate::models::{Resource, ResourceSlice, Task};
    use chrono::TimeZone;

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
    }

    fn params() -> SearchParams {
        SearchParams {
            policy: MultiResourcePolicy::Independent,
            epsilon: 1e-4,
            granularity: None,
        }
    }

    fn office_state() -> ScheduleState {
        let mut state = ScheduleState::new();
        state
            .insert_calendar(Calendar::new("office").with_hours(&WORK_WEEK, 8.0, 12.0))
            .unwrap();
        state.insert_resource(Resource::new("r1", "office")).unwrap();
        state
    }

    fn request<'a>(id: &'a str, resources: &'a [String], hours: f64, anchor: DateTime<Utc>) -> Request<'a> {
        Request {
            task_id: id,
            resource_ids: resources,
            hours,
            duration: Duration::zero(),
            anchor,
            limit: anchor + Duration::days(30),
            direction: SearchDirection::Forward,
        }
    }

    #[test]
    fn test_accepts_free_slot() {
        let state = office_state();
        let book = PlacementBook::new();
        let ledger = CapLedger::new();
        let p = params();
        let excluding = FxHashSet::default();
        let placer = Placer {
            state: &state,
            book: &book,
            ledger: &ledger,
            params: &p,
            excluding: &excluding,
            max_retries: 4,
            verbosity: 0,
        };
        let resources = vec!["r1".to_string()];
        match placer.run(&request("t", &resources, 6.0, t(6, 0))).unwrap() {
            Resolution::Accepted { placement, retries, .. } => {
                assert_eq!(placement.begin, t(6, 8));
                assert_eq!(placement.deadline, t(7, 10));
                assert_eq!(retries, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_retries_past_conflict() {
        let state = office_state();
        let mut book = PlacementBook::new();
        book.insert(Placement::new(
            "busy",
            t(6, 8),
            t(6, 12),
            vec![ResourceSlice::new("r1", TimeRange::new(t(6, 8), t(6, 12)))],
        ));
        let ledger = CapLedger::new();
        let p = params();
        let excluding = FxHashSet::default();
        let placer = Placer {
            state: &state,
            book: &book,
            ledger: &ledger,
            params: &p,
            excluding: &excluding,
            max_retries: 4,
            verbosity: 0,
        };
        let resources = vec!["r1".to_string()];
        match placer.run(&request("t", &resources, 2.0, t(6, 0))).unwrap() {
            Resolution::Accepted { placement, retries, .. } => {
                assert_eq!(placement.begin, t(7, 8));
                assert_eq!(retries, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_zero_retries_exhausts() {
        let state = office_state();
        let mut book = PlacementBook::new();
        book.insert(Placement::new(
            "busy",
            t(6, 8),
            t(6, 12),
            vec![ResourceSlice::new("r1", TimeRange::new(t(6, 8), t(6, 12)))],
        ));
        let ledger = CapLedger::new();
        let p = params();
        let excluding = FxHashSet::default();
        let placer = Placer {
            state: &state,
            book: &book,
            ledger: &ledger,
            params: &p,
            excluding: &excluding,
            max_retries: 0,
            verbosity: 0,
        };
        let resources = vec!["r1".to_string()];
        let resolution = placer.run(&request("t", &resources, 2.0, t(6, 0))).unwrap();
        assert!(matches!(resolution, Resolution::Exhausted { ref conflicts } if conflicts == &["busy"]));
    }

    #[test]
    fn test_no_intervals_when_window_too_small() {
        let state = office_state();
        let book = PlacementBook::new();
        let ledger = CapLedger::new();
        let p = params();
        let excluding = FxHashSet::default();
        let placer = Placer {
            state: &state,
            book: &book,
            ledger: &ledger,
            params: &p,
            excluding: &excluding,
            max_retries: 4,
            verbosity: 0,
        };
        let resources = vec!["r1".to_string()];
        let mut req = request("t", &resources, 6.0, t(6, 0));
        req.limit = t(7, 0);
        match placer.run(&req).unwrap() {
            Resolution::NoIntervals { hours_remaining } => {
                assert!((hours_remaining - 2.0).abs() < 1e-9)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_wall_clock_without_resources() {
        let state = office_state();
        let book = PlacementBook::new();
        let ledger = CapLedger::new();
        let p = params();
        let excluding = FxHashSet::default();
        let placer = Placer {
            state: &state,
            book: &book,
            ledger: &ledger,
            params: &p,
            excluding: &excluding,
            max_retries: 4,
            verbosity: 0,
        };
        let task = Task::new("loose", 3.0);
        let mut req = request(&task.id, &[], 3.0, t(6, 0));
        req.duration = Duration::hours(3);
        req.direction = SearchDirection::Backward;
        req.limit = t(5, 0);
        match placer.run(&req).unwrap() {
            Resolution::Accepted { placement, .. } => {
                assert_eq!(placement.span(), TimeRange::new(t(5, 21), t(6, 0)));
                assert!(placement.slices.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_zero_hours_keeps_length_and_holds_resources() {
        let state = office_state();
        let mut book = PlacementBook::new();
        // two short slices spanning the whole Monday morning
        book.insert(Placement::new(
            "wide",
            t(6, 8),
            t(6, 12),
            vec![
                ResourceSlice::new("r1", TimeRange::new(t(6, 8), t(6, 9))),
                ResourceSlice::new("r1", TimeRange::new(t(6, 11), t(6, 12))),
            ],
        ));
        let ledger = CapLedger::new();
        let p = params();
        let excluding = FxHashSet::default();
        let placer = Placer {
            state: &state,
            book: &book,
            ledger: &ledger,
            params: &p,
            excluding: &excluding,
            max_retries: 4,
            verbosity: 0,
        };
        let resources = vec!["r1".to_string()];
        let mut req = request("marker", &resources, 0.0, t(6, 9));
        req.duration = Duration::hours(1);
        match placer.run(&req).unwrap() {
            Resolution::Accepted { placement, retries, .. } => {
                // 09:00-10:00 lies in the gap but inside wide's span
                assert_eq!(placement.span(), TimeRange::new(t(6, 12), t(6, 13)));
                assert_eq!(retries, 1);
                assert!(placement.slices.is_empty());
                assert_eq!(placement.resource_ids, resources);
            }
            other => panic!("unexpected {other:?}"),
        }

        req.duration = Duration::zero();
        assert!(matches!(
            placer.run(&req).unwrap(),
            Resolution::NoIntervals { .. }
        ));
    }
}
