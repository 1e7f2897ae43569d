use crate::cancel::CancelToken;
use crate::error::Error;
use crate::naming;
use crate::progress::ProgressReporter;
use crate::report::{Step, TargetFailure};
use crate::scanner::{DeletionTarget, EntryKind};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_RENAME_CYCLES: u32 = 3;

#[derive(Debug, Clone)]
pub struct RenamedEntry {
    pub original: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
    pub depth: usize,
    /// Where the entry lives now, accounting for renamed ancestors.
    pub final_path: PathBuf,
    /// Random names used, one per completed cycle.
    pub names_used: Vec<String>,
    pub failure: Option<TargetFailure>,
}

/// Result of [`EntryRenamer::obfuscate`], in the target's deepest-first order.
#[derive(Debug, Clone)]
pub struct RenamedTarget {
    entries: Vec<RenamedEntry>,
    interrupted: bool,
}

impl RenamedTarget {
    /// Mapping for a run with renaming disabled: every entry keeps its path.
    pub fn unchanged(target: &DeletionTarget) -> Self {
        let entries = target
            .entries()
            .iter()
            .map(|e| RenamedEntry {
                original: e.path.clone(),
                kind: e.kind,
                size: e.size,
                depth: e.depth,
                final_path: e.path.clone(),
                names_used: Vec::new(),
                failure: None,
            })
            .collect();
        Self {
            entries,
            interrupted: false,
        }
    }

    pub fn entries(&self) -> &[RenamedEntry] {
        &self.entries
    }

    /// True when cancellation stopped the pass before every entry was visited.
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn failures(&self) -> impl Iterator<Item = &TargetFailure> {
        self.entries.iter().filter_map(|e| e.failure.as_ref())
    }

    pub fn final_paths(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| e.final_path.clone()).collect()
    }
}

/// Obfuscates names by renaming every entry several times, children before parents.
pub struct EntryRenamer {
    cycles: u32,
    name_length: usize,
}

impl Default for EntryRenamer {
    fn default() -> Self {
        Self::new(DEFAULT_RENAME_CYCLES, naming::DEFAULT_NAME_LENGTH)
    }
}

impl EntryRenamer {
    pub fn new(cycles: u32, name_length: usize) -> Self {
        Self {
            cycles,
            name_length,
        }
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Rename every entry of `target` `cycles` times.
    ///
    /// Entries are visited deepest-first, so an entry is always renamed while its
    /// parent still has its original path. A failed step leaves the entry under
    /// its last successful name and the pass moves on to the next entry.
    pub fn obfuscate(
        &self,
        target: &DeletionTarget,
        cancel: &CancelToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<RenamedTarget, Error> {
        let source = target.entries();
        let index: HashMap<&Path, usize> = source
            .iter()
            .enumerate()
            .map(|(i, e)| (e.path.as_path(), i))
            .collect();

        let mut final_names: Vec<Option<OsString>> = source
            .iter()
            .map(|e| e.path.file_name().map(|n| n.to_os_string()))
            .collect();
        let mut names_used: Vec<Vec<String>> = vec![Vec::new(); source.len()];
        let mut failures: Vec<Option<TargetFailure>> = vec![None; source.len()];
        let mut interrupted = false;

        for (i, entry) in source.iter().enumerate() {
            if cancel.is_cancelled() {
                interrupted = true;
                break;
            }

            let extension = match entry.kind {
                EntryKind::File => Some(naming::NEUTRAL_EXTENSION),
                EntryKind::Directory => None,
            };
            let outcome = rename_cycles(
                &entry.path,
                self.cycles,
                self.name_length,
                extension,
                |cycle, current| reporter.on_rename_cycle(&entry.path, cycle, current),
            );

            if let Some(name) = outcome.current.file_name() {
                final_names[i] = Some(name.to_os_string());
            }
            names_used[i] = outcome.names;

            match outcome.error {
                None => debug!(
                    "Renamed {} -> {}",
                    entry.path.display(),
                    outcome.current.display()
                ),
                Some(err) => {
                    warn!("Rename of {} stopped: {}", entry.path.display(), err);
                    let failure = TargetFailure::from_error(&entry.path, Step::Rename, &err);
                    reporter.on_target_failed(&failure);
                    failures[i] = Some(failure);
                }
            }
            reporter.on_rename_progress(i + 1, source.len());
        }

        // Shallowest-first, so every parent is resolved before its children.
        let mut final_paths: Vec<Option<PathBuf>> = vec![None; source.len()];
        for i in (0..source.len()).rev() {
            let entry = &source[i];
            let parent_final = entry
                .path
                .parent()
                .and_then(|parent| index.get(parent))
                .and_then(|&p| final_paths[p].clone());
            let base = parent_final
                .or_else(|| entry.path.parent().map(Path::to_path_buf))
                .unwrap_or_default();
            final_paths[i] = Some(match &final_names[i] {
                Some(name) => base.join(name),
                None => entry.path.clone(),
            });
        }

        let entries = source
            .iter()
            .zip(final_paths)
            .zip(names_used)
            .zip(failures)
            .map(|(((entry, final_path), names_used), failure)| RenamedEntry {
                original: entry.path.clone(),
                kind: entry.kind,
                size: entry.size,
                depth: entry.depth,
                final_path: final_path.unwrap_or_else(|| entry.path.clone()),
                names_used,
                failure,
            })
            .collect();

        Ok(RenamedTarget {
            entries,
            interrupted,
        })
    }
}

pub(crate) struct CycleOutcome {
    pub current: PathBuf,
    pub names: Vec<String>,
    pub error: Option<Error>,
}

/// Rename `path` in place `cycles` times, stopping at the first failed step.
pub(crate) fn rename_cycles(
    path: &Path,
    cycles: u32,
    name_length: usize,
    extension: Option<&str>,
    mut on_cycle: impl FnMut(u32, &Path),
) -> CycleOutcome {
    let mut current = path.to_path_buf();
    let mut names = Vec::with_capacity(cycles as usize);

    for cycle in 1..=cycles {
        match rename_once(&current, name_length, extension) {
            Ok((next, name)) => {
                current = next;
                names.push(name);
                on_cycle(cycle, &current);
            }
            Err(err) => {
                return CycleOutcome {
                    current,
                    names,
                    error: Some(err),
                }
            }
        }
    }

    CycleOutcome {
        current,
        names,
        error: None,
    }
}

/// One rename to a fresh random sibling name. A name that already exists is
/// retried once with a new name before giving up.
pub(crate) fn rename_once(
    current: &Path,
    name_length: usize,
    extension: Option<&str>,
) -> Result<(PathBuf, String), Error> {
    let parent = current.parent().unwrap_or_else(|| Path::new("."));

    for _ in 0..2 {
        let name = naming::generate(name_length);
        let file_name = match extension {
            Some(ext) => format!("{}.{}", name, ext),
            None => name.clone(),
        };
        let candidate = parent.join(file_name);

        // rename(2) silently replaces an existing file, so check first.
        if fs::symlink_metadata(&candidate).is_ok() {
            warn!("Random name collision at {}, retrying", candidate.display());
            continue;
        }

        match fs::rename(current, &candidate) {
            Ok(()) => {
                if fs::symlink_metadata(&candidate).is_err()
                    || fs::symlink_metadata(current).is_ok()
                {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::Other,
                        format!(
                            "rename of {} to {} did not take effect",
                            current.display(),
                            candidate.display()
                        ),
                    )));
                }
                return Ok((candidate, name));
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                warn!("Random name collision at {}, retrying", candidate.display());
                continue;
            }
            Err(err) => return Err(Error::from_io(current, err)),
        }
    }

    Err(Error::RenameCollision(current.to_path_buf()))
}
