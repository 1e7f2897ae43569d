use super::scratch::ScratchDir;
use super::{settle, FloodKind, FloodPlan, FloodReport, FloodSizing, StopReason};
use crate::cancel::CancelToken;
use crate::config::ShadowFloodConfig;
use crate::error::Error;
use crate::naming;
use crate::progress::ProgressReporter;
use crate::query::SystemQuery;
use rand::RngCore;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Forces FIFO eviction of old shadow copies by churning large scratch files.
pub struct ShadowStorageFloodController {
    config: ShadowFloodConfig,
}

impl ShadowStorageFloodController {
    pub fn new(config: ShadowFloodConfig) -> Self {
        Self { config }
    }

    /// Size the flood. `Auto` targets `fill_fraction` of the maximum shadow-storage allocation.
    pub fn plan(&self, query: &dyn SystemQuery, sizing: FloodSizing) -> Result<FloodPlan, Error> {
        let chunk = self.config.chunk_file_bytes.max(1);
        let (measured_capacity, volume) = match sizing {
            FloodSizing::Explicit(bytes) => (None, bytes),
            FloodSizing::Auto => {
                let max = query.shadow_storage_max_bytes()?;
                match query.shadow_storage_used_bytes() {
                    Ok(used) => debug!("Shadow storage: {} of {} bytes used", used, max),
                    Err(err) => debug!("Shadow storage usage unknown: {}", err),
                }
                let target = (max as f64 * self.config.fill_fraction).round() as u64;
                (Some(max), target)
            }
        };

        Ok(FloodPlan {
            kind: FloodKind::ShadowStorage,
            measured_capacity,
            target_fill_fraction: self.config.fill_fraction,
            unit_cost: chunk,
            volume,
            units: volume.div_ceil(chunk),
        })
    }

    /// Write and delete chunk files under `base_dir` until the planned volume is
    /// reached or free space would fall below the safety margin.
    ///
    /// Exactly one chunk file exists at a time; it is deleted before the next is
    /// created, and an in-flight chunk is removed on any early exit. Running out of
    /// space mid-chunk stops the flood as [`StopReason::DiskExhausted`].
    pub fn flood(
        &self,
        base_dir: &Path,
        query: &dyn SystemQuery,
        sizing: FloodSizing,
        cancel: &CancelToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<FloodReport, Error> {
        let plan = self.plan(query, sizing)?;
        self.execute(base_dir, plan, query, cancel, reporter)
    }

    /// Run a previously computed plan.
    pub fn execute(
        &self,
        base_dir: &Path,
        plan: FloodPlan,
        query: &dyn SystemQuery,
        cancel: &CancelToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<FloodReport, Error> {
        info!(
            "Shadow storage flood: {} bytes in {} chunk files of {} bytes",
            plan.volume, plan.units, plan.unit_cost
        );
        reporter.on_flood_start(&plan);

        let start = Instant::now();
        let mut scratch = ScratchDir::create(base_dir)?;
        let mut buffer = vec![0u8; self.config.write_buffer_bytes.max(1)];
        let mut rng = rand::thread_rng();
        let mut chunks = 0u64;
        let mut bytes_written = 0u64;
        let mut stop_reason = StopReason::Completed;
        let mut failure = None;

        while bytes_written < plan.volume {
            if cancel.is_cancelled() {
                stop_reason = StopReason::Cancelled;
                break;
            }

            let available = match query.available_bytes(scratch.path()) {
                Ok(available) => available,
                Err(err) => {
                    error!("Free space query failed mid-flood: {}", err);
                    failure = Some(Error::from(err));
                    break;
                }
            };
            if available < plan.unit_cost.saturating_add(self.config.safety_margin_bytes) {
                warn!(
                    "Stopping shadow storage flood: {} bytes free, margin is {}",
                    available, self.config.safety_margin_bytes
                );
                stop_reason = StopReason::DiskExhausted;
                break;
            }

            let path = scratch.new_file_path(naming::DEFAULT_NAME_LENGTH);
            if let Err(err) =
                write_chunk(&mut scratch, &path, plan.unit_cost, &mut buffer, &mut rng)
            {
                if is_disk_full(&err) {
                    warn!(
                        "Volume filled while writing {}, stopping shadow storage flood",
                        path.display()
                    );
                    stop_reason = StopReason::DiskExhausted;
                } else {
                    error!("Failed to write chunk {}: {}", path.display(), err);
                    failure = Some(Error::from_io(&path, err));
                }
                // Left tracked if this fails; the scratch cleanup retries it.
                let _ = scratch.remove(&path);
                break;
            }
            if let Err(err) = scratch.remove(&path) {
                failure = Some(err);
                break;
            }

            chunks += 1;
            bytes_written += plan.unit_cost;
            reporter.on_flood_progress(FloodKind::ShadowStorage, chunks, plan.units);
        }

        let cleanup = scratch.finish();

        let report = FloodReport {
            plan,
            units_completed: chunks,
            // create, write and delete per chunk
            operations_executed: chunks * 3,
            bytes_written,
            stop_reason,
            elapsed: start.elapsed(),
        };
        info!(
            "Shadow storage flood {:?}: {} chunks, {} bytes in {:.2}s",
            report.stop_reason,
            report.units_completed,
            report.bytes_written,
            report.elapsed.as_secs_f64()
        );
        reporter.on_flood_complete(&report);
        settle(report, failure, cleanup)
    }
}

/// Create `path`, fill it with `len` random bytes and flush it to disk.
fn write_chunk(
    scratch: &mut ScratchDir,
    path: &Path,
    len: u64,
    buffer: &mut [u8],
    rng: &mut impl RngCore,
) -> io::Result<()> {
    let mut file = File::create(path)?;
    scratch.track(path.to_path_buf());
    fill(&mut file, len, buffer, rng)?;
    // The snapshot provider only sees blocks that reach the disk.
    file.sync_all()
}

fn fill<W: Write>(
    writer: &mut W,
    mut remaining: u64,
    buffer: &mut [u8],
    rng: &mut impl RngCore,
) -> io::Result<()> {
    while remaining > 0 {
        let len = remaining.min(buffer.len() as u64) as usize;
        rng.fill_bytes(&mut buffer[..len]);
        writer.write_all(&buffer[..len])?;
        remaining -= len as u64;
    }
    Ok(())
}

/// The volume ran out of space underneath the flood.
fn is_disk_full(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::StorageFull
}
