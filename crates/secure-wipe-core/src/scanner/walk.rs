use crate::error::Error;
use std::cmp::Reverse;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone)]
pub struct FilesystemEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Length in bytes for files, 0 for directories and symlinks.
    pub size: u64,
    /// 0 for the root itself.
    pub depth: usize,
}

/// Snapshot of a root and everything beneath it, deepest entries first.
///
/// Taken once per run; anything created under the root afterwards is not processed.
#[derive(Debug, Clone)]
pub struct DeletionTarget {
    root: PathBuf,
    entries: Vec<FilesystemEntry>,
    unreadable: Vec<(PathBuf, String)>,
}

impl DeletionTarget {
    /// Walk `root` without following symlinks below it. Failing to read the root is
    /// fatal; failures below it are kept in [`DeletionTarget::unreadable`].
    ///
    /// The root itself is resolved first, so a symlinked root enumerates the tree it
    /// points at and [`DeletionTarget::root`] is the resolved path.
    pub fn enumerate(given: &Path) -> Result<Self, Error> {
        let root = std::fs::canonicalize(given).map_err(|source| Error::Enumeration {
            path: given.to_path_buf(),
            source,
        })?;
        let root = root.as_path();
        if root != given {
            let linked = std::fs::symlink_metadata(given)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);
            if linked {
                warn!(
                    "{} is a symlink; wiping its target {} and leaving the link",
                    given.display(),
                    root.display()
                );
            } else {
                debug!("Resolved {} to {}", given.display(), root.display());
            }
        }

        let metadata = std::fs::symlink_metadata(root).map_err(|source| Error::Enumeration {
            path: root.to_path_buf(),
            source,
        })?;

        let mut entries = Vec::new();
        let mut unreadable = Vec::new();

        for item in WalkDir::new(root).follow_links(false) {
            let entry = match item {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.to_path_buf());
                    if err.depth() == 0 {
                        return Err(Error::Enumeration {
                            path,
                            source: io::Error::from(err),
                        });
                    }
                    error!("Cannot read {}: {}", path.display(), err);
                    unreadable.push((path, err.to_string()));
                    continue;
                }
            };

            let file_type = entry.file_type();
            let (kind, size) = if file_type.is_dir() {
                (EntryKind::Directory, 0)
            } else if file_type.is_symlink() {
                (EntryKind::File, 0)
            } else {
                let size = match entry.metadata() {
                    Ok(m) => m.len(),
                    Err(err) => {
                        error!("Error getting metadata for {}: {}", entry.path().display(), err);
                        unreadable.push((entry.path().to_path_buf(), err.to_string()));
                        continue;
                    }
                };
                (EntryKind::File, size)
            };

            entries.push(FilesystemEntry {
                path: entry.path().to_path_buf(),
                kind,
                size,
                depth: entry.depth(),
            });
        }

        // Deepest first; at equal depth files precede directories.
        entries.sort_by(|a, b| {
            (Reverse(a.depth), a.kind, &a.path).cmp(&(Reverse(b.depth), b.kind, &b.path))
        });

        debug!(
            "Enumerated {} ({} entries, root is a {})",
            root.display(),
            entries.len(),
            if metadata.is_dir() { "directory" } else { "file" },
        );

        Ok(Self {
            root: root.to_path_buf(),
            entries,
            unreadable,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[FilesystemEntry] {
        &self.entries
    }

    pub fn unreadable(&self) -> &[(PathBuf, String)] {
        &self.unreadable
    }

    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|e| e.kind == EntryKind::File).count()
    }

    pub fn directory_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::Directory)
            .count()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_enumerate_orders_deepest_first() {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("a");
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("b").join("c.txt"), b"hello").unwrap();
        fs::write(root.join("top.txt"), b"xy").unwrap();
        let root = fs::canonicalize(&root).unwrap();

        let target = DeletionTarget::enumerate(&root).unwrap();
        let depths: Vec<usize> = target.entries().iter().map(|e| e.depth).collect();
        assert_eq!(depths, vec![2, 1, 1, 0]);

        // Files come before directories at the same depth
        assert_eq!(target.entries()[1].path, root.join("top.txt"));
        assert_eq!(target.entries()[2].path, root.join("b"));
        assert_eq!(target.entries()[3].path, root);

        assert_eq!(target.file_count(), 2);
        assert_eq!(target.directory_count(), 2);
        assert_eq!(target.total_bytes(), 7);
    }

    #[test]
    fn test_enumerate_single_file_root() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("secret.bin");
        fs::write(&file, vec![1u8; 64]).unwrap();

        let target = DeletionTarget::enumerate(&file).unwrap();
        assert_eq!(target.entries().len(), 1);
        assert_eq!(target.entries()[0].kind, EntryKind::File);
        assert_eq!(target.entries()[0].size, 64);
    }

    #[test]
    fn test_enumerate_missing_root_fails() {
        let tmp = tempdir().unwrap();
        let err = DeletionTarget::enumerate(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Enumeration { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_root_resolves_to_target() {
        let tmp = tempdir().unwrap();
        let real = tmp.path().join("real");
        fs::create_dir(&real).unwrap();
        fs::write(real.join("inside.txt"), b"abc").unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let target = DeletionTarget::enumerate(&link).unwrap();
        let real = fs::canonicalize(&real).unwrap();
        assert_eq!(target.root(), real.as_path());
        assert_eq!(target.file_count(), 1);
        assert_eq!(target.directory_count(), 1);
        assert_eq!(target.entries()[0].path, real.join("inside.txt"));
        assert_eq!(target.total_bytes(), 3);
    }
}
