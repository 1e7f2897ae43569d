use crate::engine::RunState;
use crate::flood::{FloodKind, FloodPlan, FloodReport};
use crate::report::TargetFailure;
use std::path::Path;

/// Trait for reporting run progress.
///
/// The CLI implements it with indicatif; tests use it to observe ordering.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_state_change(&self, _state: RunState) {}
    fn on_enumerated(&self, _files: usize, _directories: usize, _total_bytes: u64) {}
    /// One rename step of `original` finished; `current` is its name after `cycle`.
    fn on_rename_cycle(&self, _original: &Path, _cycle: u32, _current: &Path) {}
    fn on_rename_progress(&self, _entries_done: usize, _entries_total: usize) {}
    fn on_overwrite_pass(&self, _path: &Path, _pass: u8, _passes: u8) {}
    fn on_target_complete(&self, _path: &Path, _bytes_written: u64) {}
    fn on_target_failed(&self, _failure: &TargetFailure) {}
    fn on_flood_start(&self, _plan: &FloodPlan) {}
    fn on_flood_progress(&self, _kind: FloodKind, _units_done: u64, _units_total: u64) {}
    fn on_flood_complete(&self, _report: &FloodReport) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
