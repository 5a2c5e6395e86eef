//! Errors and per-task warnings.
//!
//! `ScheduleError` rejects a call before anything is committed. `Warning` is
//! plain data describing a local, recovered outcome for one task; a batch or a
//! propagation run keeps going after emitting one.

use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Errors that reject a scheduling operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    #[error("Invalid window for {subject}: {start} .. {end}")]
    InvalidWindow {
        subject: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
    #[error("Invalid calendar {calendar_id}: {reason}")]
    InvalidCalendar { calendar_id: String, reason: String },
    #[error("Task not found: {0}")]
    UnknownTask(String),
    #[error("Resource not found: {0}")]
    UnknownResource(String),
    #[error("Calendar not found: {0}")]
    UnknownCalendar(String),
}

/// Reason code attached to a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningCode {
    /// No feasible slot with enough hours inside the searched window.
    NoIntervals,
    /// The task belongs to a dependency cycle and was left untouched.
    CyclicDependency,
    /// Conflict resolution hit the retry bound; last good placement kept.
    Exhausted,
    /// The task's own dates were unusable.
    InvalidWindow,
    /// The run was cancelled before this task was examined.
    Cancelled,
}

impl WarningCode {
    /// Stable snake_case code for display layers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoIntervals => "no_intervals",
            Self::CyclicDependency => "cyclic_dependency",
            Self::Exhausted => "exhausted",
            Self::InvalidWindow => "invalid_window",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal outcome for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub task_id: String,
    pub code: WarningCode,
    pub detail: String,
}

impl Warning {
    pub fn new(task_id: impl Into<String>, code: WarningCode, detail: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            code,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.task_id, self.code, self.detail)
    }
}
