use crate::error::{Error, FailureKind};
use crate::flood::{FloodKind, FloodReport};
use crate::validation::ValidationVerdict;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Where in the run a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Enumerate,
    Rename,
    Overwrite,
    RemoveDirectory,
    JournalFlood,
    ShadowFlood,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub path: PathBuf,
    pub step: Step,
    pub kind: FailureKind,
    pub detail: String,
}

impl TargetFailure {
    pub fn from_error(path: &Path, step: Step, err: &Error) -> Self {
        Self {
            path: path.to_path_buf(),
            step,
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The operator did not confirm; nothing was touched.
    Declined,
    Aborted(FailureKind),
}

#[derive(Debug, Clone, Default)]
pub struct PhaseTimings {
    pub enumerate: Duration,
    pub rename: Duration,
    pub overwrite: Duration,
    pub journal_flood: Duration,
    pub shadow_flood: Duration,
}

/// Final, immutable result of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub targets_total: usize,
    pub targets_processed: usize,
    pub targets_unprocessed: usize,
    pub directories_removed: usize,
    pub bytes_overwritten: u64,
    pub failures: Vec<TargetFailure>,
    pub journal_flood: Option<FloodReport>,
    pub shadow_flood: Option<FloodReport>,
    /// Final on-disk names of every entry as left by the rename pass.
    pub renamed_paths: Vec<PathBuf>,
    pub timings: PhaseTimings,
    pub elapsed: Duration,
    pub validation: Option<ValidationVerdict>,
}

impl RunReport {
    /// Files whose content could not be destroyed.
    pub fn targets_failed(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| f.step == Step::Overwrite)
            .count()
    }

    pub fn flood_operations(&self, kind: FloodKind) -> u64 {
        let report = match kind {
            FloodKind::Journal => self.journal_flood.as_ref(),
            FloodKind::ShadowStorage => self.shadow_flood.as_ref(),
        };
        report.map(|r| r.operations_executed).unwrap_or(0)
    }

    pub fn throughput_bytes_per_sec(&self) -> f64 {
        let secs = self.timings.overwrite.as_secs_f64();
        if secs > 0.0 {
            self.bytes_overwritten as f64 / secs
        } else {
            0.0
        }
    }

    pub fn is_clean(&self) -> bool {
        self.outcome == RunOutcome::Completed && self.failures.is_empty()
    }
}

/// Report state shared by reference across the orchestrator's steps and workers.
pub struct ReportAccumulator {
    root: PathBuf,
    started_at: DateTime<Utc>,
    started: Instant,
    targets_total: AtomicUsize,
    targets_processed: AtomicUsize,
    targets_failed: AtomicUsize,
    directories_removed: AtomicUsize,
    bytes_overwritten: AtomicU64,
    failures: Mutex<Vec<TargetFailure>>,
    state: Mutex<AccumulatorState>,
}

#[derive(Default)]
struct AccumulatorState {
    outcome: Option<RunOutcome>,
    journal_flood: Option<FloodReport>,
    shadow_flood: Option<FloodReport>,
    renamed_paths: Vec<PathBuf>,
    timings: PhaseTimings,
}

impl ReportAccumulator {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            started_at: Utc::now(),
            started: Instant::now(),
            targets_total: AtomicUsize::new(0),
            targets_processed: AtomicUsize::new(0),
            targets_failed: AtomicUsize::new(0),
            directories_removed: AtomicUsize::new(0),
            bytes_overwritten: AtomicU64::new(0),
            failures: Mutex::new(Vec::new()),
            state: Mutex::new(AccumulatorState::default()),
        }
    }

    /// Replace the root once it has been resolved.
    pub fn set_root(&mut self, root: &Path) {
        self.root = root.to_path_buf();
    }

    fn state(&self) -> std::sync::MutexGuard<'_, AccumulatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_targets_total(&self, total: usize) {
        self.targets_total.store(total, Ordering::SeqCst);
    }

    pub fn record_processed(&self, bytes: u64) {
        self.targets_processed.fetch_add(1, Ordering::SeqCst);
        self.bytes_overwritten.fetch_add(bytes, Ordering::SeqCst);
    }

    pub fn record_directory_removed(&self) {
        self.directories_removed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failure(&self, failure: TargetFailure) {
        if failure.step == Step::Overwrite {
            self.targets_failed.fetch_add(1, Ordering::SeqCst);
        }
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(failure);
    }

    pub fn targets_processed(&self) -> usize {
        self.targets_processed.load(Ordering::SeqCst)
    }

    pub fn set_outcome(&self, outcome: RunOutcome) {
        self.state().outcome = Some(outcome);
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        self.state().outcome
    }

    pub fn set_flood_report(&self, report: FloodReport) {
        let mut state = self.state();
        match report.plan.kind {
            FloodKind::Journal => state.journal_flood = Some(report),
            FloodKind::ShadowStorage => state.shadow_flood = Some(report),
        }
    }

    pub fn set_renamed_paths(&self, paths: Vec<PathBuf>) {
        self.state().renamed_paths = paths;
    }

    pub fn record_timing(&self, step: Step, elapsed: Duration) {
        let mut state = self.state();
        let slot = match step {
            Step::Enumerate => &mut state.timings.enumerate,
            Step::Rename => &mut state.timings.rename,
            Step::Overwrite | Step::RemoveDirectory => &mut state.timings.overwrite,
            Step::JournalFlood => &mut state.timings.journal_flood,
            Step::ShadowFlood => &mut state.timings.shadow_flood,
        };
        *slot += elapsed;
    }

    pub fn finish(self) -> RunReport {
        let state = self.state.into_inner().unwrap_or_else(|e| e.into_inner());
        let failures = self.failures.into_inner().unwrap_or_else(|e| e.into_inner());
        let total = self.targets_total.into_inner();
        let processed = self.targets_processed.into_inner();
        let failed = self.targets_failed.into_inner();

        RunReport {
            root: self.root,
            started_at: self.started_at,
            outcome: state.outcome.unwrap_or(RunOutcome::Completed),
            targets_total: total,
            targets_processed: processed,
            targets_unprocessed: total.saturating_sub(processed + failed),
            directories_removed: self.directories_removed.into_inner(),
            bytes_overwritten: self.bytes_overwritten.into_inner(),
            failures,
            journal_flood: state.journal_flood,
            shadow_flood: state.shadow_flood,
            renamed_paths: state.renamed_paths,
            timings: state.timings,
            elapsed: self.started.elapsed(),
            validation: None,
        }
    }
}
