//! Python bindings (enabled with the `python` feature).

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use chrono::{DateTime, Duration, Utc, Weekday};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::calendar::{AttendanceRule, Calendar, Leave};
use crate::config::{MultiResourcePolicy, ScheduleOptions, SchedulerConfig};
use crate::error::ScheduleError;
use crate::models::{Resource, ResourceMode, Task, TimeRange};
use crate::scheduler::{Outcome, ScheduleState, Scheduler};
use crate::sink::RecordingSink;

impl From<ScheduleError> for PyErr {
    fn from(err: ScheduleError) -> Self {
        PyValueError::new_err(err.to_string())
    }
}

fn weekday(index: u8) -> PyResult<Weekday> {
    Ok(match index {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        6 => Weekday::Sun,
        _ => return Err(PyValueError::new_err(format!("weekday {index} not in 0..=6"))),
    })
}

/// Result of a scheduling call.
#[pyclass(name = "Outcome")]
#[derive(Clone, Debug)]
pub struct PyOutcome {
    /// (task_id, begin, deadline)
    #[pyo3(get)]
    pub placements: Vec<(String, DateTime<Utc>, DateTime<Utc>)>,
    /// (task_id, code, detail)
    #[pyo3(get)]
    pub warnings: Vec<(String, String, String)>,
    #[pyo3(get)]
    pub unchanged: Vec<String>,
    #[pyo3(get)]
    pub cancelled: bool,
}

impl From<Outcome> for PyOutcome {
    fn from(outcome: Outcome) -> Self {
        Self {
            placements: outcome
                .placements
                .into_iter()
                .map(|p| (p.task_id, p.begin, p.deadline))
                .collect(),
            warnings: outcome
                .warnings
                .into_iter()
                .map(|w| (w.task_id, w.code.as_str().to_string(), w.detail))
                .collect(),
            unchanged: outcome.unchanged,
            cancelled: outcome.cancelled,
        }
    }
}

#[pymethods]
impl PyOutcome {
    fn __repr__(&self) -> String {
        format!(
            "Outcome(placements={}, warnings={}, unchanged={}, cancelled={})",
            self.placements.len(),
            self.warnings.len(),
            self.unchanged.len(),
            self.cancelled
        )
    }
}

/// Scheduling engine over an in-memory state.
#[pyclass(name = "Scheduler")]
pub struct PyScheduler {
    inner: Scheduler<RecordingSink>,
}

#[pymethods]
impl PyScheduler {
    #[new]
    #[pyo3(signature = (verbosity=0, max_retries=32, together=false))]
    fn new(verbosity: u8, max_retries: u32, together: bool) -> Self {
        let policy = if together {
            MultiResourcePolicy::Together
        } else {
            MultiResourcePolicy::Independent
        };
        let config = SchedulerConfig::default()
            .with_verbosity(verbosity)
            .with_max_retries(max_retries)
            .with_multi_resource(policy);
        Self {
            inner: Scheduler::recording(ScheduleState::new(), config),
        }
    }

    /// `rules` are (weekday 0=Mon, hour_from, hour_to) working windows.
    #[pyo3(signature = (calendar_id, rules, utc_offset_seconds=0))]
    fn add_calendar(
        &mut self,
        calendar_id: String,
        rules: Vec<(u8, f64, f64)>,
        utc_offset_seconds: i32,
    ) -> PyResult<()> {
        let mut calendar = Calendar::new(calendar_id).with_offset_seconds(utc_offset_seconds);
        for (day, from, to) in rules {
            calendar = calendar.with_rule(AttendanceRule::working(weekday(day)?, from, to));
        }
        Ok(self.inner.state_mut().insert_calendar(calendar)?)
    }

    /// Without caps the resource follows its calendar's rules; with a weekly
    /// cap it is flexible.
    #[pyo3(signature = (resource_id, calendar_id, weekly_cap=None, daily_cap=None))]
    fn add_resource(
        &mut self,
        resource_id: String,
        calendar_id: String,
        weekly_cap: Option<f64>,
        daily_cap: Option<f64>,
    ) -> PyResult<()> {
        let mode = match (weekly_cap, daily_cap) {
            (Some(weekly_cap), Some(daily_cap)) => ResourceMode::CappedFlexible {
                daily_cap,
                weekly_cap,
            },
            (Some(weekly_cap), None) => ResourceMode::FullyFlexible { weekly_cap },
            (None, Some(_)) => {
                return Err(PyValueError::new_err("daily_cap requires weekly_cap"));
            }
            (None, None) => ResourceMode::Fixed,
        };
        let resource = Resource::new(resource_id, calendar_id).with_mode(mode);
        Ok(self.inner.state_mut().insert_resource(resource)?)
    }

    #[pyo3(signature = (calendar_id, start, end, resource_id=None))]
    fn add_leave(
        &mut self,
        calendar_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resource_id: Option<String>,
    ) -> PyResult<()> {
        let range = TimeRange::new(start, end);
        let leave = match resource_id {
            Some(id) => Leave::for_resource(range, id),
            None => Leave::global(range),
        };
        Ok(self.inner.state_mut().add_leave(&calendar_id, leave)?)
    }

    #[pyo3(signature = (
        task_id,
        allocated_hours,
        resource_ids=Vec::new(),
        depends_on=Vec::new(),
        planned_begin=None,
        deadline=None,
        earliest_start=None,
        due_date=None,
        priority=0
    ))]
    #[allow(clippy::too_many_arguments)]
    fn add_task(
        &mut self,
        task_id: String,
        allocated_hours: f64,
        resource_ids: Vec<String>,
        depends_on: Vec<String>,
        planned_begin: Option<DateTime<Utc>>,
        deadline: Option<DateTime<Utc>>,
        earliest_start: Option<DateTime<Utc>>,
        due_date: Option<DateTime<Utc>>,
        priority: i32,
    ) -> PyResult<()> {
        let task = Task {
            planned_begin,
            deadline,
            earliest_start,
            due_date,
            priority,
            ..Task::new(task_id, allocated_hours)
                .with_resources(resource_ids)
                .with_dependencies(depends_on)
        };
        Ok(self.inner.state_mut().insert_task(task)?)
    }

    fn archive_task(&mut self, task_id: &str) -> PyResult<()> {
        self.inner.state_mut().archive_task(task_id)?;
        Ok(())
    }

    fn reschedule(
        &mut self,
        task_id: &str,
        begin: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> PyResult<PyOutcome> {
        Ok(self.inner.reschedule(task_id, begin, deadline)?.into())
    }

    #[pyo3(signature = (
        task_ids,
        start,
        end,
        last_date_in_view=None,
        default_resource_ids=Vec::new(),
        cell_granularity_minutes=None
    ))]
    fn schedule_tasks(
        &mut self,
        task_ids: Vec<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        last_date_in_view: Option<DateTime<Utc>>,
        default_resource_ids: Vec<String>,
        cell_granularity_minutes: Option<i64>,
    ) -> PyResult<PyOutcome> {
        let mut options = ScheduleOptions::new().with_default_resources(default_resource_ids);
        if let Some(last) = last_date_in_view {
            options = options.with_last_date_in_view(last);
        }
        if let Some(minutes) = cell_granularity_minutes {
            options = options.with_cell_granularity(Duration::minutes(minutes));
        }
        let outcome = self
            .inner
            .schedule_tasks(&task_ids, TimeRange::new(start, end), &options)?;
        Ok(outcome.into())
    }

    /// Joint slices as (start, end, resource_ids).
    fn valid_intervals(
        &self,
        resource_ids: Vec<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PyResult<Vec<(DateTime<Utc>, DateTime<Utc>, Vec<String>)>> {
        let intervals = self
            .inner
            .valid_intervals(&resource_ids, TimeRange::new(start, end))?;
        Ok(intervals
            .slices
            .into_iter()
            .map(|s| (s.range.start, s.range.end, s.resource_ids))
            .collect())
    }

    fn task_dates(&self, task_id: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let task = self.inner.state().task(task_id)?;
        Some((task.planned_begin?, task.deadline?))
    }

    fn cancel(&self) {
        self.inner.cancel_flag().cancel();
    }
}

/// The taskshift Python module.
#[pymodule]
fn taskshift(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyScheduler>()?;
    m.add_class::<PyOutcome>()?;
    Ok(())
}
