use crate::cancel::CancelToken;
use crate::config::{EngineConfig, PassConfig};
use crate::error::{Error, FailureKind};
use crate::flood::scratch::ScratchDir;
use crate::flood::{
    FloodKind, FloodReport, FloodSizing, JournalFloodController, ShadowStorageFloodController,
    StopReason,
};
use crate::overwrite::ContentOverwriter;
use crate::progress::{ProgressReporter, SilentReporter};
use crate::query::{SystemQuery, UnavailableQuery};
use crate::rename::{EntryRenamer, RenamedEntry, RenamedTarget};
use crate::report::{ReportAccumulator, RunOutcome, RunReport, Step, TargetFailure};
use crate::scanner::{DeletionTarget, EntryKind};
use crate::validation::ValidationHook;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle of a single deletion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Confirming,
    Enumerating,
    Renaming,
    Overwriting,
    JournalFlooding,
    ShadowFlooding,
    Aborting,
    Reporting,
    Done,
}

/// Asked once, before anything on disk is touched.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, root: &Path) -> bool;
}

/// Confirms every run. For callers that already obtained consent.
pub struct AlwaysConfirm;

impl Confirmer for AlwaysConfirm {
    fn confirm(&self, _root: &Path) -> bool {
        true
    }
}

/// Drives one deletion run through its states and produces a [`RunReport`].
pub struct DeletionOrchestrator {
    config: EngineConfig,
    query: Arc<dyn SystemQuery>,
    reporter: Arc<dyn ProgressReporter>,
    confirmer: Arc<dyn Confirmer>,
    validation: Option<Arc<dyn ValidationHook>>,
    scratch_base: Option<PathBuf>,
    cancel: CancelToken,
}

/// Mutable state threaded through the steps of one run.
struct Run {
    root: PathBuf,
    passes: PassConfig,
    journal: Option<FloodSizing>,
    shadow: Option<FloodSizing>,
    acc: Option<ReportAccumulator>,
    target: Option<DeletionTarget>,
    renamed: Option<RenamedTarget>,
    /// Flood scratch space and the flood step that created it.
    scratch: Option<(ScratchDir, Step)>,
    abort_reason: Option<FailureKind>,
    report: Option<RunReport>,
}

impl Run {
    fn new(
        root: &Path,
        passes: PassConfig,
        journal: Option<FloodSizing>,
        shadow: Option<FloodSizing>,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            passes,
            journal,
            shadow,
            acc: Some(ReportAccumulator::new(root)),
            target: None,
            renamed: None,
            scratch: None,
            abort_reason: None,
            report: None,
        }
    }

    fn acc(&self) -> Option<&ReportAccumulator> {
        self.acc.as_ref()
    }

    fn record_failure(&self, failure: TargetFailure) {
        if let Some(acc) = self.acc() {
            acc.record_failure(failure);
        }
    }
}

impl DeletionOrchestrator {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            query: Arc::new(UnavailableQuery),
            reporter: Arc::new(SilentReporter),
            confirmer: Arc::new(AlwaysConfirm),
            validation: None,
            scratch_base: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_system_query(mut self, query: Arc<dyn SystemQuery>) -> Self {
        self.query = query;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    pub fn with_validation_hook(mut self, hook: Arc<dyn ValidationHook>) -> Self {
        self.validation = Some(hook);
        self
    }

    /// Directory in which flood scratch space is created. Defaults to the parent of the root.
    pub fn with_scratch_base(mut self, base: PathBuf) -> Self {
        self.scratch_base = Some(base);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Token that stops the run at the next step or target boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the full pipeline against `root`:
    /// 1. Confirm with the operator
    /// 2. Enumerate the target tree
    /// 3. Rename every entry (unless disabled)
    /// 4. Overwrite and remove files, then remove directories
    /// 5. Flood the change journal and shadow storage when requested
    ///
    /// Per-entry failures are recorded and the run continues. Cancellation,
    /// an unreadable root or a missing pass configuration abort the run; the
    /// report is produced either way.
    pub fn run(
        &self,
        root: &Path,
        passes: PassConfig,
        journal: Option<FloodSizing>,
        shadow: Option<FloodSizing>,
    ) -> RunReport {
        let mut run = Run::new(root, passes, journal, shadow);

        let mut state = RunState::Confirming;
        loop {
            debug!("Entering state {:?}", state);
            self.reporter.on_state_change(state);
            state = match state {
                RunState::Confirming => self.confirm(&mut run),
                RunState::Enumerating => self.enumerate(&mut run),
                RunState::Renaming => self.rename(&mut run),
                RunState::Overwriting => self.overwrite(&mut run),
                RunState::JournalFlooding => self.journal_flood(&mut run),
                RunState::ShadowFlooding => self.shadow_flood(&mut run),
                RunState::Aborting => self.abort(&mut run),
                RunState::Reporting => self.build_report(&mut run),
                RunState::Done => break,
            };
        }

        match run.report {
            Some(report) => report,
            None => ReportAccumulator::new(root).finish(),
        }
    }

    /// Move to `next` unless cancellation was requested, in which case abort.
    fn advance(&self, run: &mut Run, next: RunState) -> RunState {
        if self.cancel.is_cancelled() {
            info!("Cancellation requested, aborting before {:?}", next);
            run.abort_reason = Some(FailureKind::Cancelled);
            return RunState::Aborting;
        }
        next
    }

    fn abort_with(&self, run: &mut Run, reason: FailureKind) -> RunState {
        run.abort_reason = Some(reason);
        RunState::Aborting
    }

    fn confirm(&self, run: &mut Run) -> RunState {
        if !self.confirmer.confirm(&run.root) {
            info!("Deletion of {} declined", run.root.display());
            if let Some(acc) = run.acc() {
                acc.set_outcome(RunOutcome::Declined);
            }
            return RunState::Reporting;
        }
        self.advance(run, RunState::Enumerating)
    }

    fn enumerate(&self, run: &mut Run) -> RunState {
        info!("Enumerating {}...", run.root.display());
        let start = Instant::now();
        let target = match DeletionTarget::enumerate(&run.root) {
            Ok(target) => target,
            Err(err) => {
                error!("Enumeration failed: {}", err);
                let failure = TargetFailure::from_error(&run.root, Step::Enumerate, &err);
                self.reporter.on_target_failed(&failure);
                let kind = failure.kind;
                run.record_failure(failure);
                return self.abort_with(run, kind);
            }
        };

        // A symlinked root is wiped at the place it points to.
        if target.root() != run.root {
            run.root = target.root().to_path_buf();
            if let Some(acc) = run.acc.as_mut() {
                acc.set_root(&run.root);
            }
        }

        for (path, detail) in target.unreadable() {
            let failure = TargetFailure {
                path: path.clone(),
                step: Step::Enumerate,
                kind: FailureKind::IoFailure,
                detail: detail.clone(),
            };
            self.reporter.on_target_failed(&failure);
            run.record_failure(failure);
        }

        let elapsed = start.elapsed();
        debug!(
            "Enumeration completed in {:.2}s: {} files, {} directories, {} bytes",
            elapsed.as_secs_f64(),
            target.file_count(),
            target.directory_count(),
            target.total_bytes(),
        );
        self.reporter.on_enumerated(
            target.file_count(),
            target.directory_count(),
            target.total_bytes(),
        );
        if let Some(acc) = run.acc() {
            acc.set_targets_total(target.file_count());
            acc.record_timing(Step::Enumerate, elapsed);
        }
        run.target = Some(target);
        self.advance(run, RunState::Renaming)
    }

    fn rename(&self, run: &mut Run) -> RunState {
        let Some(target) = run.target.as_ref() else {
            return self.abort_with(run, FailureKind::IoFailure);
        };

        let start = Instant::now();
        let renamed = if run.passes.rename_enabled() {
            info!(
                "Renaming {} entries, {} cycles each...",
                target.entries().len(),
                self.config.rename_cycles
            );
            let renamer = EntryRenamer::new(self.config.rename_cycles, self.config.name_length);
            match renamer.obfuscate(target, &self.cancel, self.reporter.as_ref()) {
                Ok(renamed) => renamed,
                Err(err) => {
                    error!("Rename pass failed: {}", err);
                    let failure = TargetFailure::from_error(&run.root, Step::Rename, &err);
                    let kind = failure.kind;
                    run.record_failure(failure);
                    return self.abort_with(run, kind);
                }
            }
        } else {
            debug!("Renaming disabled");
            RenamedTarget::unchanged(target)
        };

        if let Some(acc) = run.acc() {
            for failure in renamed.failures() {
                acc.record_failure(failure.clone());
            }
            acc.set_renamed_paths(renamed.final_paths());
            acc.record_timing(Step::Rename, start.elapsed());
        }

        let interrupted = renamed.interrupted();
        run.renamed = Some(renamed);
        if interrupted {
            return self.abort_with(run, FailureKind::Cancelled);
        }
        self.advance(run, RunState::Overwriting)
    }

    fn overwrite(&self, run: &mut Run) -> RunState {
        let (Some(renamed), Some(acc)) = (run.renamed.as_ref(), run.acc.as_ref()) else {
            return self.abort_with(run, FailureKind::IoFailure);
        };

        let files: Vec<&RenamedEntry> = renamed
            .entries()
            .iter()
            .filter(|e| e.kind == EntryKind::File)
            .collect();
        let passes = run.passes.pass_count();
        info!("Overwriting {} files with {} passes...", files.len(), passes);

        let start = Instant::now();
        let overwriter = ContentOverwriter::new(self.config.overwrite_chunk_bytes);
        let process = |entry: &RenamedEntry| {
            if self.cancel.is_cancelled() {
                return;
            }
            match overwriter.overwrite(&entry.final_path, passes, self.reporter.as_ref()) {
                Ok(bytes) => {
                    acc.record_processed(bytes);
                    self.reporter.on_target_complete(&entry.original, bytes);
                }
                Err(err) => {
                    error!("Failed to overwrite {}: {}", entry.final_path.display(), err);
                    let failure =
                        TargetFailure::from_error(&entry.final_path, Step::Overwrite, &err);
                    self.reporter.on_target_failed(&failure);
                    acc.record_failure(failure);
                }
            }
        };

        if self.config.workers > 1 && files.len() > 1 {
            match ThreadPoolBuilder::new()
                .num_threads(self.config.workers)
                .build()
            {
                Ok(pool) => pool.install(|| files.par_iter().for_each(|&entry| process(entry))),
                Err(err) => {
                    warn!("Could not start overwrite workers, continuing sequentially: {}", err);
                    files.iter().for_each(|&entry| process(entry));
                }
            }
        } else {
            files.iter().for_each(|&entry| process(entry));
        }

        if self.cancel.is_cancelled() {
            acc.record_timing(Step::Overwrite, start.elapsed());
            return self.abort_with(run, FailureKind::Cancelled);
        }

        // Deepest-first order means every directory is empty by the time it is reached.
        for dir in renamed
            .entries()
            .iter()
            .filter(|e| e.kind == EntryKind::Directory)
        {
            match fs::remove_dir(&dir.final_path) {
                Ok(()) => {
                    debug!("Removed directory {}", dir.final_path.display());
                    acc.record_directory_removed();
                }
                Err(err) => {
                    warn!("Could not remove directory {}: {}", dir.final_path.display(), err);
                    let err = Error::from_io(&dir.final_path, err);
                    let failure =
                        TargetFailure::from_error(&dir.final_path, Step::RemoveDirectory, &err);
                    self.reporter.on_target_failed(&failure);
                    acc.record_failure(failure);
                }
            }
        }

        let elapsed = start.elapsed();
        acc.record_timing(Step::Overwrite, elapsed);
        debug!(
            "Overwrite completed in {:.2}s: {} of {} files",
            elapsed.as_secs_f64(),
            acc.targets_processed(),
            files.len()
        );

        let next = if run.journal.is_some() {
            RunState::JournalFlooding
        } else if run.shadow.is_some() {
            RunState::ShadowFlooding
        } else {
            RunState::Reporting
        };
        self.advance(run, next)
    }

    fn journal_flood(&self, run: &mut Run) -> RunState {
        if let Some(sizing) = run.journal {
            let start = Instant::now();
            let controller = JournalFloodController::new(self.config.journal.clone())
                .with_name_length(self.config.name_length);
            let result = controller
                .plan(self.query.as_ref(), sizing)
                .and_then(|plan| {
                    let base = self.flood_base(run, Step::JournalFlood)?;
                    controller.execute(&base, plan, &self.cancel, self.reporter.as_ref())
                });
            if let Some(state) = self.finish_flood(run, Step::JournalFlood, result, start) {
                return state;
            }
        }

        let next = if run.shadow.is_some() {
            RunState::ShadowFlooding
        } else {
            RunState::Reporting
        };
        self.advance(run, next)
    }

    fn shadow_flood(&self, run: &mut Run) -> RunState {
        if let Some(sizing) = run.shadow {
            let start = Instant::now();
            let controller = ShadowStorageFloodController::new(self.config.shadow.clone());
            let result = controller
                .plan(self.query.as_ref(), sizing)
                .and_then(|plan| {
                    let base = self.flood_base(run, Step::ShadowFlood)?;
                    controller.execute(
                        &base,
                        plan,
                        self.query.as_ref(),
                        &self.cancel,
                        self.reporter.as_ref(),
                    )
                });
            if let Some(state) = self.finish_flood(run, Step::ShadowFlood, result, start) {
                return state;
            }
        }
        self.advance(run, RunState::Reporting)
    }

    /// Record a flood's outcome. Returns `Aborting` when the flood was cancelled.
    /// A flood that failed part-way still contributes its partial report.
    fn finish_flood(
        &self,
        run: &mut Run,
        step: Step,
        result: Result<FloodReport, Error>,
        start: Instant,
    ) -> Option<RunState> {
        let elapsed = start.elapsed();
        if let Some(acc) = run.acc() {
            acc.record_timing(step, elapsed);
        }

        match result {
            Ok(report) => {
                let cancelled = report.stop_reason == StopReason::Cancelled;
                if let Some(acc) = run.acc() {
                    acc.set_flood_report(report);
                }
                if cancelled {
                    return Some(self.abort_with(run, FailureKind::Cancelled));
                }
                None
            }
            Err(err) => {
                let kind = match step {
                    Step::ShadowFlood => FloodKind::ShadowStorage,
                    _ => FloodKind::Journal,
                };
                error!("{} flood failed: {}", kind, err);
                if let (Some(partial), Some(acc)) = (err.partial_flood(), run.acc()) {
                    acc.set_flood_report(partial.clone());
                }
                let failure = TargetFailure::from_error(&run.root, step, &err);
                self.reporter.on_target_failed(&failure);
                run.record_failure(failure);
                None
            }
        }
    }

    /// Flood work happens inside one run-level scratch directory, created on first use
    /// by the flood `step` that needs it.
    fn flood_base(&self, run: &mut Run, step: Step) -> Result<PathBuf, Error> {
        if let Some((scratch, _)) = &run.scratch {
            return Ok(scratch.path().to_path_buf());
        }
        let base = match &self.scratch_base {
            Some(base) => base.clone(),
            None => parent_dir(&run.root),
        };
        let scratch = ScratchDir::create(&base)?;
        let path = scratch.path().to_path_buf();
        run.scratch = Some((scratch, step));
        Ok(path)
    }

    fn release_scratch(&self, run: &mut Run) {
        if let Some((scratch, step)) = run.scratch.take() {
            let path = scratch.path().to_path_buf();
            if let Err(err) = scratch.finish() {
                warn!("Flood scratch space was not fully removed: {}", err);
                run.record_failure(TargetFailure::from_error(&path, step, &err));
            }
        }
    }

    fn abort(&self, run: &mut Run) -> RunState {
        let reason = run.abort_reason.unwrap_or(FailureKind::Cancelled);
        warn!("Aborting run on {}: {}", run.root.display(), reason);
        self.release_scratch(run);
        if let Some(acc) = run.acc() {
            acc.set_outcome(RunOutcome::Aborted(reason));
        }
        RunState::Reporting
    }

    fn build_report(&self, run: &mut Run) -> RunState {
        self.release_scratch(run);
        let Some(acc) = run.acc.take() else {
            return RunState::Done;
        };

        let mut report = acc.finish();
        info!(
            "Run on {} finished as {:?}: {} processed, {} failed, {} unprocessed",
            report.root.display(),
            report.outcome,
            report.targets_processed,
            report.targets_failed(),
            report.targets_unprocessed
        );

        if let Some(hook) = &self.validation {
            let verdict = hook.validate(&report, &report.renamed_paths);
            info!("Validation verdict: {:?}", verdict);
            report.validation = Some(verdict);
        }

        run.report = Some(report);
        RunState::Done
    }
}

fn parent_dir(root: &Path) -> PathBuf {
    match root.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
