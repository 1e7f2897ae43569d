use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::tempdir;

use secure_wipe_core::naming::{self, DEFAULT_NAME_LENGTH};
use secure_wipe_core::rename::EntryRenamer;
use secure_wipe_core::scanner::{DeletionTarget, EntryKind};
use secure_wipe_core::{CancelToken, ProgressReporter};

/// Records every rename step as (original, cycle, new path).
#[derive(Default)]
struct RenameLog(Mutex<Vec<(PathBuf, u32, PathBuf)>>);

impl ProgressReporter for RenameLog {
    fn on_rename_cycle(&self, original: &Path, cycle: u32, current: &Path) {
        self.0
            .lock()
            .unwrap()
            .push((original.to_path_buf(), cycle, current.to_path_buf()));
    }
}

/// Layout:
///   a/
///     b/
///       c.txt
fn create_nested_tree(base: &Path) -> PathBuf {
    let a = base.join("a");
    fs::create_dir_all(a.join("b")).unwrap();
    fs::write(a.join("b").join("c.txt"), b"nested").unwrap();
    // Enumeration reports resolved paths.
    fs::canonicalize(a).unwrap()
}

#[test]
fn test_three_distinct_hex_names_per_file() {
    let tmp = tempdir().unwrap();
    let file = tmp.path().join("Quarterly Report.docx");
    fs::write(&file, b"confidential").unwrap();
    let target = DeletionTarget::enumerate(&file).unwrap();

    let log = RenameLog::default();
    let renamed = EntryRenamer::new(3, DEFAULT_NAME_LENGTH)
        .obfuscate(&target, &CancelToken::new(), &log)
        .unwrap();

    let entry = &renamed.entries()[0];
    assert!(entry.failure.is_none());
    assert_eq!(entry.names_used.len(), 3);
    let distinct: HashSet<&String> = entry.names_used.iter().collect();
    assert_eq!(distinct.len(), 3);
    for name in &entry.names_used {
        assert!(naming::is_hex_name(name, DEFAULT_NAME_LENGTH), "{}", name);
    }

    assert!(!file.exists());
    assert!(entry.final_path.exists());
    assert_eq!(entry.final_path.extension().unwrap(), "tmp");
    assert_eq!(fs::read(&entry.final_path).unwrap(), b"confidential");
    assert_eq!(log.0.lock().unwrap().len(), 3);
}

#[test]
fn test_children_finish_before_parents_start() {
    let tmp = tempdir().unwrap();
    let root = create_nested_tree(tmp.path());
    let target = DeletionTarget::enumerate(&root).unwrap();

    let log = RenameLog::default();
    let renamed = EntryRenamer::default()
        .obfuscate(&target, &CancelToken::new(), &log)
        .unwrap();
    assert_eq!(renamed.failures().count(), 0);

    let events = log.0.into_inner().unwrap();
    let order: Vec<(PathBuf, u32)> = events.iter().map(|(p, c, _)| (p.clone(), *c)).collect();
    let c = root.join("b").join("c.txt");
    let b = root.join("b");
    assert_eq!(
        order,
        vec![
            (c.clone(), 1),
            (c.clone(), 2),
            (c, 3),
            (b.clone(), 1),
            (b.clone(), 2),
            (b, 3),
            (root.clone(), 1),
            (root.clone(), 2),
            (root, 3),
        ]
    );
}

#[test]
fn test_final_paths_follow_renamed_parents() {
    let tmp = tempdir().unwrap();
    let root = create_nested_tree(tmp.path());
    let target = DeletionTarget::enumerate(&root).unwrap();

    let renamed = EntryRenamer::default()
        .obfuscate(&target, &CancelToken::new(), &RenameLog::default())
        .unwrap();

    for entry in renamed.entries() {
        assert!(
            entry.final_path.exists(),
            "{} should exist",
            entry.final_path.display()
        );
        let name = entry.final_path.file_stem().unwrap().to_str().unwrap();
        assert!(naming::is_hex_name(name, DEFAULT_NAME_LENGTH));
        if entry.kind == EntryKind::Directory {
            assert!(entry.final_path.extension().is_none());
        }
    }
    // Only the renamed root remains next to where the original stood.
    let siblings: Vec<_> = fs::read_dir(tmp.path()).unwrap().flatten().collect();
    assert_eq!(siblings.len(), 1);
    assert!(!root.exists());
}
