use super::scratch::ScratchDir;
use super::{settle, FloodKind, FloodPlan, FloodReport, FloodSizing, StopReason};
use crate::cancel::CancelToken;
use crate::config::JournalFloodConfig;
use crate::error::Error;
use crate::naming;
use crate::progress::ProgressReporter;
use crate::query::SystemQuery;
use crate::rename;
use rand::RngCore;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};

/// Rotates the change journal by putting dummy files through create, rename and delete.
pub struct JournalFloodController {
    config: JournalFloodConfig,
    name_length: usize,
}

impl JournalFloodController {
    pub fn new(config: JournalFloodConfig) -> Self {
        Self {
            config,
            name_length: naming::DEFAULT_NAME_LENGTH,
        }
    }

    pub fn with_name_length(mut self, name_length: usize) -> Self {
        self.name_length = name_length;
        self
    }

    /// Size the flood. `Auto` measures journal capacity and targets `fill_fraction`
    /// of it: `ceil(capacity * fill / (record_size * ops_per_lifecycle))` operations.
    pub fn plan(&self, query: &dyn SystemQuery, sizing: FloodSizing) -> Result<FloodPlan, Error> {
        let ops_per_lifecycle = self.config.ops_per_lifecycle.max(1);
        let (measured_capacity, volume) = match sizing {
            FloodSizing::Explicit(operations) => (None, operations),
            FloodSizing::Auto => {
                let capacity = query.journal_capacity_bytes()?;
                let per_lifecycle = (self.config.record_size * ops_per_lifecycle) as f64;
                let operations =
                    (capacity as f64 * self.config.fill_fraction / per_lifecycle).ceil() as u64;
                (Some(capacity), operations)
            }
        };

        Ok(FloodPlan {
            kind: FloodKind::Journal,
            measured_capacity,
            target_fill_fraction: self.config.fill_fraction,
            unit_cost: self.config.record_size,
            volume,
            units: volume.div_ceil(ops_per_lifecycle),
        })
    }

    /// Run the flood inside a scratch directory under `base_dir`.
    ///
    /// Sizing happens before anything is created, so an unavailable query leaves
    /// no trace. Dummies are processed in batches and every dummy created is
    /// deleted before this returns, whether the flood completes, fails or is
    /// cancelled. A failure comes back as [`Error::FloodInterrupted`] carrying the
    /// operations executed before it.
    pub fn flood(
        &self,
        base_dir: &Path,
        query: &dyn SystemQuery,
        sizing: FloodSizing,
        cancel: &CancelToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<FloodReport, Error> {
        let plan = self.plan(query, sizing)?;
        self.execute(base_dir, plan, cancel, reporter)
    }

    /// Run a previously computed plan.
    pub fn execute(
        &self,
        base_dir: &Path,
        plan: FloodPlan,
        cancel: &CancelToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<FloodReport, Error> {
        info!(
            "Journal flood: {} operations across {} dummy files",
            plan.volume, plan.units
        );
        reporter.on_flood_start(&plan);

        let start = Instant::now();
        let mut scratch = ScratchDir::create(base_dir)?;
        let mut tally = BatchTally::default();
        let mut completed = 0u64;
        let mut stop_reason = StopReason::Completed;
        let mut failure = None;

        while completed < plan.units {
            if cancel.is_cancelled() {
                stop_reason = StopReason::Cancelled;
                break;
            }
            let batch = self.config.batch_size.max(1).min(plan.units - completed);
            if let Err(err) = self.run_batch(&mut scratch, batch, &mut tally) {
                error!("Journal flood batch failed: {}", err);
                failure = Some(err);
                break;
            }
            completed += batch;
            reporter.on_flood_progress(FloodKind::Journal, completed, plan.units);
        }

        let cleanup = scratch.finish();

        let report = FloodReport {
            plan,
            units_completed: completed,
            operations_executed: tally.operations,
            bytes_written: tally.bytes,
            stop_reason,
            elapsed: start.elapsed(),
        };
        info!(
            "Journal flood {:?}: {} dummy files, {} operations in {:.2}s",
            report.stop_reason,
            report.units_completed,
            report.operations_executed,
            report.elapsed.as_secs_f64()
        );
        reporter.on_flood_complete(&report);
        settle(report, failure, cleanup)
    }

    /// Create `count` dummies, rename each through every cycle, then delete them all.
    /// Operations are counted into `tally` as they happen, so a failed batch still
    /// shows what it did.
    fn run_batch(
        &self,
        scratch: &mut ScratchDir,
        count: u64,
        tally: &mut BatchTally,
    ) -> Result<(), Error> {
        let mut payload = vec![0u8; self.config.dummy_file_bytes];
        let mut rng = rand::thread_rng();
        let mut dummies: Vec<PathBuf> = Vec::with_capacity(count as usize);
        let before = tally.operations;

        for _ in 0..count {
            let path = scratch.new_file_path(self.name_length);
            rng.fill_bytes(&mut payload);
            {
                let mut file = File::create(&path).map_err(|e| Error::from_io(&path, e))?;
                scratch.track(path.clone());
                tally.operations += 1;
                file.write_all(&payload).map_err(|e| Error::from_io(&path, e))?;
            }
            tally.bytes += payload.len() as u64;
            dummies.push(path);
        }

        for dummy in dummies.iter_mut() {
            let outcome = rename::rename_cycles(
                dummy.as_path(),
                self.config.rename_cycles,
                self.name_length,
                Some(naming::NEUTRAL_EXTENSION),
                |_, _| {},
            );
            tally.operations += outcome.names.len() as u64;
            if outcome.current != *dummy {
                scratch.moved(dummy.as_path(), outcome.current.clone());
                *dummy = outcome.current;
            }
            if let Some(err) = outcome.error {
                return Err(err);
            }
        }

        for dummy in &dummies {
            scratch.remove(dummy)?;
            tally.operations += 1;
        }

        debug!(
            "Journal flood batch: {} dummies, {} operations",
            count,
            tally.operations - before
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BatchTally {
    operations: u64,
    bytes: u64,
}
