//! Batch planning order.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::models::Task;

/// Sort key for batch planning (lower plans first).
///
/// Due date ascending with undated tasks last, then priority descending,
/// then task id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanKey {
    pub due_date: Option<DateTime<Utc>>,
    pub priority: i32,
    pub task_id: String,
}

impl PlanKey {
    pub fn for_task(task: &Task) -> Self {
        Self {
            due_date: task.due_date,
            priority: task.priority,
            task_id: task.id.clone(),
        }
    }
}

impl Ord for PlanKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let due = match (self.due_date, other.due_date) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        due.then(other.priority.cmp(&self.priority))
            .then_with(|| self.task_id.cmp(&other.task_id))
    }
}

impl PartialOrd for PlanKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Task ids in planning order.
pub fn plan_order<'a, I>(tasks: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut keys: Vec<PlanKey> = tasks.into_iter().map(PlanKey::for_task).collect();
    keys.sort();
    keys.into_iter().map(|k| k.task_id).collect()
}
