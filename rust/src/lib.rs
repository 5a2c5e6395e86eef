//! Resource-calendar-aware task scheduling.
//!
//! Places tasks with hour budgets into the working time of their resources
//! (fixed attendance, flexible hours with caps, leave) and propagates date
//! changes through the task dependency graph so no task starts before its
//! prerequisites finish.
//!
//! The entry point is [`Scheduler`], built over a [`ScheduleState`] snapshot:
//! - [`Scheduler::reschedule`] moves one task and auto-shifts what it disturbs.
//! - [`Scheduler::schedule_tasks`] plans a batch of undated tasks.
//! - [`Scheduler::valid_intervals`] reports joint availability and free hours.

pub mod allocator;
pub mod calendar;
pub mod config;
pub mod conflicts;
pub mod error;
pub mod graph;
pub mod interner;
pub mod logging;
pub mod models;
pub mod scheduler;
pub mod sink;

#[cfg(feature = "python")]
mod python;

pub use calendar::availability::{availability, AvailabilityIter, HourCaps, Interval, SearchDirection};
pub use calendar::joint::{water_fill, CapLedger, JointAvailability, JointSlice};
pub use calendar::{AttendanceRule, Calendar, DayPeriod, Leave};
pub use config::{MultiResourcePolicy, ScheduleOptions, SchedulerConfig};
pub use conflicts::PlacementBook;
pub use error::{ScheduleError, Warning, WarningCode};
pub use graph::{DependencyGraph, Direction};
pub use models::{Placement, Resource, ResourceMode, ResourceSlice, Task, TimeRange};
pub use scheduler::{CancelFlag, Outcome, ScheduleState, Scheduler, ValidIntervals};
pub use sink::{NullSink, PlacementSink, RecordingSink};
