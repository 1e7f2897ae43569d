use crate::config::{MAX_PASSES, MIN_PASSES};
use crate::error::Error;
use crate::platform;
use crate::progress::ProgressReporter;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024; // 1MB

/// Destroys file content with repeated passes of CSPRNG output, then unlinks the file.
pub struct ContentOverwriter {
    chunk_size: usize,
}

impl Default for ContentOverwriter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ContentOverwriter {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Overwrite `path` `passes` times in place and remove it. Returns bytes written.
    ///
    /// The file keeps its length throughout. Data is forced to stable storage once,
    /// after the last pass. Empty files and symlinks take no passes but are still
    /// removed. When the file cannot be opened for writing it is left in place and
    /// the error is returned.
    pub fn overwrite(
        &self,
        path: &Path,
        passes: u8,
        reporter: &dyn ProgressReporter,
    ) -> Result<u64, Error> {
        if !(MIN_PASSES..=MAX_PASSES).contains(&passes) {
            return Err(Error::InvalidPassCount(passes));
        }

        let metadata = fs::symlink_metadata(path).map_err(|e| Error::from_io(path, e))?;
        let mut written = 0;

        if metadata.file_type().is_symlink() {
            debug!("Removing symlink without following it: {}", path.display());
        } else if metadata.len() > 0 {
            platform::clear_protection(path, &metadata).map_err(|e| Error::from_io(path, e))?;
            written = self.write_passes(path, metadata.len(), passes, reporter)?;
        }

        fs::remove_file(path).map_err(|e| Error::from_io(path, e))?;
        debug!("Overwrote and removed {} ({} bytes written)", path.display(), written);
        Ok(written)
    }

    fn write_passes(
        &self,
        path: &Path,
        size: u64,
        passes: u8,
        reporter: &dyn ProgressReporter,
    ) -> Result<u64, Error> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| Error::from_io(path, e))?;

        let buffer_len = usize::try_from(size).unwrap_or(usize::MAX).min(self.chunk_size);
        let mut buffer = vec![0u8; buffer_len];
        let mut written = 0u64;

        for pass in 1..=passes {
            file.seek(SeekFrom::Start(0))
                .map_err(|e| Error::from_io(path, e))?;

            let mut remaining = size;
            while remaining > 0 {
                let chunk = remaining.min(buffer_len as u64) as usize;
                OsRng.fill_bytes(&mut buffer[..chunk]);
                file.write_all(&buffer[..chunk])
                    .map_err(|e| Error::from_io(path, e))?;
                remaining -= chunk as u64;
                written += chunk as u64;
            }

            reporter.on_overwrite_pass(path, pass, passes);
        }

        // Single flush point: intermediate passes are superseded by the next one.
        file.sync_all().map_err(|e| Error::from_io(path, e))?;
        Ok(written)
    }
}
