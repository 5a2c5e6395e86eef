//! In-memory snapshot of tasks, resources, calendars and committed placements.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;

use crate::calendar::availability::SearchDirection;
use crate::calendar::joint::CapLedger;
use crate::calendar::{Calendar, Leave};
use crate::conflicts::PlacementBook;
use crate::error::ScheduleError;
use crate::graph::DependencyGraph;
use crate::models::{Placement, Resource, Task, TimeRange};

use super::placement::{fill, SearchParams};

/// Everything the engine reads, plus the placement book it writes.
///
/// The host builds this from its own records. `Task::dependents` is derived
/// here from `depends_on` and never taken from input.
#[derive(Clone, Debug, Default)]
pub struct ScheduleState {
    tasks: FxHashMap<String, Task>,
    resources: FxHashMap<String, Resource>,
    calendars: FxHashMap<String, Calendar>,
    book: PlacementBook,
}

impl ScheduleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_calendar(&mut self, calendar: Calendar) -> Result<(), ScheduleError> {
        calendar.validate()?;
        self.calendars.insert(calendar.id.clone(), calendar);
        Ok(())
    }

    pub fn insert_resource(&mut self, resource: Resource) -> Result<(), ScheduleError> {
        if !self.calendars.contains_key(&resource.calendar_id) {
            return Err(ScheduleError::UnknownCalendar(resource.calendar_id.clone()));
        }
        self.resources.insert(resource.id.clone(), resource);
        Ok(())
    }

    /// Add or replace a task. A dated task is booked on its resources with
    /// the working time its window provides.
    ///
    /// Dependencies on tasks not (yet) present are kept and linked once the
    /// other task is inserted. Cycles are accepted here; the operations that
    /// traverse them report `CyclicDependency`.
    pub fn insert_task(&mut self, mut task: Task) -> Result<(), ScheduleError> {
        for id in &task.resource_ids {
            if !self.resources.contains_key(id) {
                return Err(ScheduleError::UnknownResource(id.clone()));
            }
        }
        let span = match (task.planned_begin, task.deadline) {
            (Some(begin), Some(end)) if end <= begin => {
                return Err(ScheduleError::InvalidWindow {
                    subject: task.id.clone(),
                    start: begin,
                    end,
                })
            }
            (Some(begin), Some(end)) => Some(TimeRange::new(begin, end)),
            _ => {
                task.planned_begin = None;
                task.deadline = None;
                None
            }
        };
        let placement = match span {
            Some(span) => Some(self.derive_placement(&task, span)?.0),
            None => None,
        };

        if self.tasks.contains_key(&task.id) {
            self.unlink(&task.id);
        }
        task.dependents = self
            .tasks
            .values()
            .filter(|other| other.depends_on.contains(&task.id))
            .map(|other| other.id.clone())
            .collect();
        task.dependents.sort();
        for dep in &task.depends_on {
            if let Some(pred) = self.tasks.get_mut(dep) {
                add_unique(&mut pred.dependents, &task.id);
            }
        }

        self.book.remove(&task.id);
        self.tasks.insert(task.id.clone(), task);
        if let Some(placement) = placement {
            self.book.insert(placement);
        }
        Ok(())
    }

    /// Add a leave period to a calendar.
    pub fn add_leave(&mut self, calendar_id: &str, leave: Leave) -> Result<(), ScheduleError> {
        let calendar = self
            .calendars
            .get_mut(calendar_id)
            .ok_or_else(|| ScheduleError::UnknownCalendar(calendar_id.to_string()))?;
        if leave.range.is_empty() {
            return Err(ScheduleError::InvalidWindow {
                subject: format!("leave in {calendar_id}"),
                start: leave.range.start,
                end: leave.range.end,
            });
        }
        calendar.leaves.push(leave);
        Ok(())
    }

    /// Make `task_id` depend on `depends_on`. Rejected if it would close a
    /// cycle.
    pub fn add_dependency(&mut self, task_id: &str, depends_on: &str) -> Result<(), ScheduleError> {
        self.require_task(task_id)?;
        self.require_task(depends_on)?;
        if task_id == depends_on {
            return Err(ScheduleError::CyclicDependency {
                cycle: vec![task_id.to_string(), task_id.to_string()],
            });
        }

        if let Some(task) = self.tasks.get_mut(task_id) {
            add_unique(&mut task.depends_on, depends_on);
        }
        if let Some(pred) = self.tasks.get_mut(depends_on) {
            add_unique(&mut pred.dependents, task_id);
        }

        if let Err(err) = self.graph().check_acyclic(&[task_id]) {
            self.remove_dependency(task_id, depends_on)?;
            return Err(err);
        }
        Ok(())
    }

    pub fn remove_dependency(&mut self, task_id: &str, depends_on: &str) -> Result<(), ScheduleError> {
        self.require_task(task_id)?;
        if let Some(task) = self.tasks.get_mut(task_id) {
            task.depends_on.retain(|d| d != depends_on);
        }
        if let Some(pred) = self.tasks.get_mut(depends_on) {
            pred.dependents.retain(|d| d != task_id);
        }
        Ok(())
    }

    /// Remove a task from the state, its dependency links and the book.
    pub fn archive_task(&mut self, task_id: &str) -> Result<Task, ScheduleError> {
        self.require_task(task_id)?;
        self.unlink(task_id);
        for other in self.tasks.values_mut() {
            other.depends_on.retain(|d| d != task_id);
        }
        self.book.remove(task_id);
        self.tasks
            .remove(task_id)
            .ok_or_else(|| ScheduleError::UnknownTask(task_id.to_string()))
    }

    /// Fix a task's dates by hand. Its work slices are whatever its resources
    /// provide inside the window, up to `allocated_hours` (all of it when 0).
    pub fn pin_task(
        &mut self,
        task_id: &str,
        begin: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Result<Placement, ScheduleError> {
        if deadline <= begin {
            return Err(ScheduleError::InvalidWindow {
                subject: task_id.to_string(),
                start: begin,
                end: deadline,
            });
        }
        let (placement, _) = self.placement_within(task_id, TimeRange::new(begin, deadline))?;
        self.apply(placement.clone());
        Ok(placement)
    }

    /// The placement a task would get if pinned to `span`, without applying
    /// it, and the allocated hours the span could not hold.
    pub(crate) fn placement_within(
        &self,
        task_id: &str,
        span: TimeRange,
    ) -> Result<(Placement, f64), ScheduleError> {
        self.derive_placement(self.require_task(task_id)?, span)
    }

    fn derive_placement(
        &self,
        task: &Task,
        span: TimeRange,
    ) -> Result<(Placement, f64), ScheduleError> {
        if task.resource_ids.is_empty() {
            return Ok((Placement::new(&task.id, span.start, span.end, Vec::new()), 0.0));
        }
        let wanted = task.allocated_hours > 0.0;
        let hours = if wanted {
            task.allocated_hours
        } else {
            f64::INFINITY
        };
        let mut ledger = self.cap_ledger();
        if let Some(current) = self.book.get(&task.id) {
            ledger.release_slices(&current.slices);
        }
        let params = SearchParams {
            policy: Default::default(),
            epsilon: 0.0,
            granularity: None,
        };
        let allocation = fill(
            self,
            &task.resource_ids,
            span,
            hours,
            SearchDirection::Forward,
            &mut ledger,
            &params,
        )?;
        let shortfall = if wanted { allocation.hours_remaining } else { 0.0 };
        let placement = Placement::new(&task.id, span.start, span.end, allocation.slices)
            .with_resources(task.resource_ids.iter().cloned());
        Ok((placement, shortfall))
    }

    /// Commit a placement: the task takes its dates and the book its slices.
    pub(crate) fn apply(&mut self, placement: Placement) {
        if let Some(task) = self.tasks.get_mut(&placement.task_id) {
            task.planned_begin = Some(placement.begin);
            task.deadline = Some(placement.deadline);
        }
        self.book.insert(placement);
    }

    /// Give an unassigned task the resources it was planned with.
    pub(crate) fn assign_resources(&mut self, task_id: &str, resource_ids: &[String]) {
        if let Some(task) = self.tasks.get_mut(task_id) {
            if task.resource_ids.is_empty() {
                task.resource_ids = resource_ids.to_vec();
            }
        }
    }

    fn unlink(&mut self, task_id: &str) {
        for other in self.tasks.values_mut() {
            other.dependents.retain(|d| d != task_id);
        }
    }

    fn require_task(&self, task_id: &str) -> Result<&Task, ScheduleError> {
        self.tasks
            .get(task_id)
            .ok_or_else(|| ScheduleError::UnknownTask(task_id.to_string()))
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn resource(&self, resource_id: &str) -> Option<&Resource> {
        self.resources.get(resource_id)
    }

    pub fn calendar(&self, calendar_id: &str) -> Option<&Calendar> {
        self.calendars.get(calendar_id)
    }

    pub fn book(&self) -> &PlacementBook {
        &self.book
    }

    pub fn placement(&self, task_id: &str) -> Option<&Placement> {
        self.book.get(task_id)
    }

    pub fn resource_with_calendar(
        &self,
        resource_id: &str,
    ) -> Result<(&Resource, &Calendar), ScheduleError> {
        let resource = self
            .resources
            .get(resource_id)
            .ok_or_else(|| ScheduleError::UnknownResource(resource_id.to_string()))?;
        let calendar = self
            .calendars
            .get(&resource.calendar_id)
            .ok_or_else(|| ScheduleError::UnknownCalendar(resource.calendar_id.clone()))?;
        Ok((resource, calendar))
    }

    /// Tasks assigned to `resource_id`, dated ones first by begin, then by id.
    pub fn tasks_by_resource(&self, resource_id: &str) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.resource_ids.iter().any(|r| r == resource_id))
            .collect();
        tasks.sort_by(|a, b| match (a.planned_begin, b.planned_begin) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.id.cmp(&b.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
        tasks
    }

    pub fn graph(&self) -> DependencyGraph {
        DependencyGraph::build(self.tasks.values())
    }

    /// Cap ledger with every capped resource registered and every committed
    /// slice consumed.
    pub fn cap_ledger(&self) -> CapLedger {
        let mut ledger = CapLedger::new();
        for resource in self.resources.values() {
            if let Some(calendar) = self.calendars.get(&resource.calendar_id) {
                ledger.register(resource, calendar);
            }
        }
        for placement in self.book.placements() {
            ledger.consume_slices(&placement.slices);
        }
        ledger
    }
}

fn add_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|x| x == id) {
        list.push(id.to_string());
        list.sort();
    }
}
