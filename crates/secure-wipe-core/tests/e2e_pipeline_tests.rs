use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

use secure_wipe_core::config::{JournalFloodConfig, ShadowFloodConfig};
use secure_wipe_core::query::QueryError;
use secure_wipe_core::{
    CancelToken, DeletionOrchestrator, EngineConfig, FailureKind, FixedQuery, FloodKind,
    FloodSizing, PassConfig, ProgressReporter, ResidueCheck, RunOutcome, RunState, Step,
    StopReason, SystemQuery, UnavailableQuery, ValidationVerdict,
};

fn count_files_recursive(dir: &Path) -> usize {
    let mut count = 0;
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                count += count_files_recursive(&path);
            } else if path.is_file() {
                count += 1;
            }
        }
    }
    count
}

/// Create a temp directory tree to wipe.
/// Layout:
///   root/
///     notes.txt        ("meeting notes")
///     empty.log        (0 bytes)
///     projects/
///       plan.md        ("launch plan")
///       assets/
///         logo.bin     (8KB of 0xAB)
fn create_test_tree(root: &Path) {
    let assets = root.join("projects").join("assets");
    fs::create_dir_all(&assets).unwrap();
    fs::write(root.join("notes.txt"), "meeting notes").unwrap();
    fs::write(root.join("empty.log"), "").unwrap();
    fs::write(root.join("projects").join("plan.md"), "launch plan").unwrap();
    fs::write(assets.join("logo.bin"), vec![0xABu8; 8192]).unwrap();
}

fn small_config() -> EngineConfig {
    EngineConfig {
        journal: JournalFloodConfig {
            batch_size: 8,
            ..JournalFloodConfig::default()
        },
        shadow: ShadowFloodConfig {
            chunk_file_bytes: 4096,
            write_buffer_bytes: 1024,
            safety_margin_bytes: 0,
            ..ShadowFloodConfig::default()
        },
        ..EngineConfig::default()
    }
}

/// Records state transitions and cancels the run after `limit` completed targets.
struct CancelAfter {
    token: CancelToken,
    limit: usize,
    completed: AtomicUsize,
    states: Mutex<Vec<RunState>>,
}

impl CancelAfter {
    fn new(token: CancelToken, limit: usize) -> Self {
        Self {
            token,
            limit,
            completed: AtomicUsize::new(0),
            states: Mutex::new(Vec::new()),
        }
    }
}

impl ProgressReporter for CancelAfter {
    fn on_state_change(&self, state: RunState) {
        self.states.lock().unwrap().push(state);
    }

    fn on_target_complete(&self, _path: &Path, _bytes_written: u64) {
        if self.completed.fetch_add(1, Ordering::SeqCst) + 1 == self.limit {
            self.token.cancel();
        }
    }
}

/// Answers free-space queries a fixed number of times, then fails.
struct FreeSpaceFailsAfter(AtomicU64);

impl SystemQuery for FreeSpaceFailsAfter {
    fn journal_capacity_bytes(&self) -> Result<u64, QueryError> {
        Err(QueryError::Unsupported("change journal introspection"))
    }

    fn shadow_storage_max_bytes(&self) -> Result<u64, QueryError> {
        Err(QueryError::Unsupported("shadow storage introspection"))
    }

    fn shadow_storage_used_bytes(&self) -> Result<u64, QueryError> {
        Err(QueryError::Unsupported("shadow storage introspection"))
    }

    fn available_bytes(&self, _dir: &Path) -> Result<u64, QueryError> {
        let left = self.0.load(Ordering::SeqCst);
        if left == 0 {
            return Err(QueryError::Parse("free space"));
        }
        self.0.store(left - 1, Ordering::SeqCst);
        Ok(u64::MAX)
    }
}

/// Cancels the run as soon as a flood reports progress.
struct CancelDuringFlood(CancelToken);

impl ProgressReporter for CancelDuringFlood {
    fn on_flood_progress(&self, _kind: FloodKind, _done: u64, _total: u64) {
        self.0.cancel();
    }
}

#[test]
fn test_full_wipe_pipeline() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("wipe_root");
    create_test_tree(&root);

    let report = DeletionOrchestrator::new(small_config())
        .with_system_query(Arc::new(UnavailableQuery))
        .with_validation_hook(Arc::new(ResidueCheck))
        .run(
            &root,
            PassConfig::new(3, true).unwrap(),
            Some(FloodSizing::Explicit(40)),
            Some(FloodSizing::Explicit(2 * 4096)),
        );

    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.targets_total, 4);
    assert_eq!(report.targets_processed, 4);
    assert_eq!(report.targets_unprocessed, 0);
    assert_eq!(report.directories_removed, 3);
    let content_bytes = ("meeting notes".len() + "launch plan".len() + 8192) as u64;
    assert_eq!(report.bytes_overwritten, 3 * content_bytes);
    assert_eq!(report.renamed_paths.len(), 7);

    let journal = report.journal_flood.as_ref().unwrap();
    assert_eq!(journal.stop_reason, StopReason::Completed);
    assert_eq!(journal.units_completed, 8);
    assert_eq!(report.flood_operations(FloodKind::Journal), 40);

    let shadow = report.shadow_flood.as_ref().unwrap();
    assert_eq!(shadow.units_completed, 2);
    assert_eq!(shadow.bytes_written, 2 * 4096);

    assert_eq!(report.validation, Some(ValidationVerdict::Clean));
    assert!(!root.exists());
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[test]
fn test_wipe_without_renaming_keeps_names_until_removal() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("plain");
    create_test_tree(&root);

    let report = DeletionOrchestrator::new(EngineConfig::default()).run(
        &root,
        PassConfig::new(1, false).unwrap(),
        None,
        None,
    );

    assert!(report.is_clean(), "{:?}", report.failures);
    let resolved = report.root.clone();
    assert_eq!(resolved, fs::canonicalize(tmp.path()).unwrap().join("plain"));
    assert!(report.renamed_paths.contains(&resolved.join("notes.txt")));
    assert!(report.journal_flood.is_none());
    assert!(!root.exists());
}

#[test]
fn test_parallel_workers_process_every_target() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("many");
    fs::create_dir(&root).unwrap();
    for i in 0..24 {
        fs::write(root.join(format!("f{i}.dat")), vec![i as u8; 512]).unwrap();
    }

    let config = EngineConfig {
        workers: 4,
        ..EngineConfig::default()
    };
    let report = DeletionOrchestrator::new(config).run(
        &root,
        PassConfig::new(2, true).unwrap(),
        None,
        None,
    );

    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(report.targets_processed, 24);
    assert_eq!(report.bytes_overwritten, 24 * 512 * 2);
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[test]
fn test_cancellation_after_two_targets() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("ten");
    fs::create_dir(&root).unwrap();
    for i in 0..10 {
        fs::write(root.join(format!("doc{i}.txt")), format!("document {i}")).unwrap();
    }

    let orchestrator = DeletionOrchestrator::new(small_config());
    let reporter = Arc::new(CancelAfter::new(orchestrator.cancel_token(), 2));
    let report = orchestrator.with_reporter(reporter.clone()).run(
        &root,
        PassConfig::new(1, true).unwrap(),
        Some(FloodSizing::Explicit(100)),
        None,
    );

    assert_eq!(report.outcome, RunOutcome::Aborted(FailureKind::Cancelled));
    assert_eq!(report.targets_total, 10);
    assert_eq!(report.targets_processed, 2);
    assert_eq!(report.targets_unprocessed, 8);
    assert!(report.journal_flood.is_none());

    let states = reporter.states.lock().unwrap().clone();
    assert!(states.contains(&RunState::Aborting));
    assert!(!states.contains(&RunState::JournalFlooding));
    assert_eq!(states.last(), Some(&RunState::Done));

    // The renamed root still holds the eight untouched files and nothing else was left behind.
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    assert_eq!(count_files_recursive(tmp.path()), 8);
}

#[test]
fn test_unavailable_journal_query_is_recorded_not_fatal() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("target");
    create_test_tree(&root);

    let report = DeletionOrchestrator::new(EngineConfig::default())
        .with_system_query(Arc::new(UnavailableQuery))
        .run(
            &root,
            PassConfig::new(1, true).unwrap(),
            Some(FloodSizing::Auto),
            None,
        );

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.targets_processed, 4);
    assert!(report.journal_flood.is_none());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].step, Step::JournalFlood);
    assert_eq!(report.failures[0].kind, FailureKind::QueryUnavailable);
    // No scratch space was created for the failed flood.
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[test]
fn test_measured_journal_flood_through_orchestrator() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("measured");
    create_test_tree(&root);

    // 20_000 * 1.5 / 2000 = 15 operations, 3 dummies
    let report = DeletionOrchestrator::new(EngineConfig::default())
        .with_system_query(Arc::new(FixedQuery::journal(20_000)))
        .run(
            &root,
            PassConfig::new(1, true).unwrap(),
            Some(FloodSizing::Auto),
            None,
        );

    assert!(report.is_clean(), "{:?}", report.failures);
    let journal = report.journal_flood.unwrap();
    assert_eq!(journal.plan.measured_capacity, Some(20_000));
    assert_eq!(journal.plan.volume, 15);
    assert_eq!(journal.units_completed, 3);
    assert_eq!(journal.operations_executed, 15);
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[test]
fn test_cancel_during_flood_removes_scratch_space() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("interrupted");
    create_test_tree(&root);

    let orchestrator = DeletionOrchestrator::new(small_config());
    let reporter = Arc::new(CancelDuringFlood(orchestrator.cancel_token()));
    let report = orchestrator.with_reporter(reporter).run(
        &root,
        PassConfig::new(1, true).unwrap(),
        None,
        Some(FloodSizing::Explicit(10 * 4096)),
    );

    assert_eq!(report.outcome, RunOutcome::Aborted(FailureKind::Cancelled));
    assert_eq!(report.targets_processed, 4);
    let shadow = report.shadow_flood.as_ref().unwrap();
    assert_eq!(shadow.stop_reason, StopReason::Cancelled);
    assert_eq!(shadow.units_completed, 1);
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[test]
fn test_failed_flood_keeps_partial_report() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("partial");
    create_test_tree(&root);

    let report = DeletionOrchestrator::new(small_config())
        .with_system_query(Arc::new(FreeSpaceFailsAfter(AtomicU64::new(3))))
        .run(
            &root,
            PassConfig::new(1, true).unwrap(),
            None,
            Some(FloodSizing::Explicit(10 * 4096)),
        );

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].step, Step::ShadowFlood);
    assert_eq!(report.failures[0].kind, FailureKind::QueryUnavailable);

    let shadow = report.shadow_flood.as_ref().unwrap();
    assert_eq!(shadow.units_completed, 3);
    assert_eq!(shadow.bytes_written, 3 * 4096);
    assert_eq!(report.flood_operations(FloodKind::ShadowStorage), 9);
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[cfg(unix)]
#[test]
fn test_symlinked_root_wipes_the_target_and_keeps_the_link() {
    let tmp = tempdir().unwrap();
    let elsewhere = tmp.path().join("elsewhere");
    fs::create_dir(&elsewhere).unwrap();
    fs::write(elsewhere.join("outside.txt"), "out of tree").unwrap();
    let link = tmp.path().join("link");
    std::os::unix::fs::symlink(&elsewhere, &link).unwrap();
    let resolved = fs::canonicalize(&elsewhere).unwrap();

    let report = DeletionOrchestrator::new(small_config())
        .with_validation_hook(Arc::new(ResidueCheck))
        .run(
            &link,
            PassConfig::new(1, true).unwrap(),
            None,
            Some(FloodSizing::Explicit(4096)),
        );

    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(report.root, resolved);
    assert_eq!(report.targets_processed, 1);
    assert_eq!(report.directories_removed, 1);
    assert_eq!(report.validation, Some(ValidationVerdict::Clean));
    assert!(!elsewhere.exists());
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    // Only the dangling link is left; the flood scratch went next to the real directory.
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
}
