//! Outbound collaborator for committed placements and warnings.

use crate::error::Warning;
use crate::models::Placement;

/// Receives the results of a scheduling run as they happen.
///
/// Each accepted placement and each warning is delivered once per task per
/// run. Implementations persist, notify, or just collect.
pub trait PlacementSink {
    fn commit_placement(&mut self, placement: &Placement);
    fn emit_warning(&mut self, warning: &Warning);
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PlacementSink for NullSink {
    fn commit_placement(&mut self, _placement: &Placement) {}
    fn emit_warning(&mut self, _warning: &Warning) {}
}

/// Keeps everything in memory, in delivery order.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub placements: Vec<Placement>,
    pub warnings: Vec<Warning>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.placements.clear();
        self.warnings.clear();
    }
}

impl PlacementSink for RecordingSink {
    fn commit_placement(&mut self, placement: &Placement) {
        // A later commit for the same task replaces the earlier one
        self.placements.retain(|p| p.task_id != placement.task_id);
        self.placements.push(placement.clone());
    }

    fn emit_warning(&mut self, warning: &Warning) {
        if !self.warnings.contains(warning) {
            self.warnings.push(warning.clone());
        }
    }
}
