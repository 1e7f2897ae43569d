use crate::error::Error;
use crate::naming;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A randomly named directory holding ephemeral flood files.
///
/// Every file placed in it is tracked until released. Whatever is still tracked
/// when the guard is finished or dropped is deleted along with the directory,
/// so an early return or a panic never leaves dummy data behind.
pub struct ScratchDir {
    path: PathBuf,
    live: HashSet<PathBuf>,
    cleaned: bool,
}

impl ScratchDir {
    pub fn create(base: &Path) -> Result<Self, Error> {
        let path = base.join(naming::generate(16));
        fs::create_dir(&path).map_err(|e| Error::from_io(&path, e))?;
        debug!("Created scratch directory {}", path.display());
        Ok(Self {
            path,
            live: HashSet::new(),
            cleaned: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// A fresh random file path inside the directory. Not tracked until [`ScratchDir::track`].
    pub fn new_file_path(&self, name_length: usize) -> PathBuf {
        self.path.join(naming::generate_file_name(name_length))
    }

    pub fn track(&mut self, path: PathBuf) {
        self.live.insert(path);
    }

    pub fn moved(&mut self, from: &Path, to: PathBuf) {
        self.live.remove(from);
        self.live.insert(to);
    }

    /// Delete a tracked file and stop tracking it.
    pub fn remove(&mut self, path: &Path) -> Result<(), Error> {
        fs::remove_file(path).map_err(|e| Error::from_io(path, e))?;
        self.live.remove(path);
        Ok(())
    }

    /// Delete remaining files and the directory. Returns how many files could not be removed.
    fn cleanup(&mut self) -> usize {
        if self.cleaned {
            return 0;
        }
        self.cleaned = true;

        let mut leaked = 0;
        for path in self.live.drain() {
            if let Err(err) = fs::remove_file(&path) {
                if path.exists() {
                    warn!("Could not remove scratch file {}: {}", path.display(), err);
                    leaked += 1;
                }
            }
        }
        if let Err(err) = fs::remove_dir_all(&self.path) {
            if self.path.exists() {
                warn!("Could not remove scratch directory {}: {}", self.path.display(), err);
            }
        }
        leaked
    }

    /// Clean up and report leftovers as an error.
    pub fn finish(mut self) -> Result<(), Error> {
        let leaked = self.cleanup();
        if leaked > 0 || self.path.exists() {
            return Err(Error::Other(format!(
                "{} scratch files could not be removed from {}",
                leaked,
                self.path.display()
            )));
        }
        Ok(())
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let leaked = self.cleanup();
        if leaked > 0 {
            warn!("{} scratch files leaked in {}", leaked, self.path.display());
        }
    }
}
