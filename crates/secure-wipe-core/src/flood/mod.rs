//! Flooding: benign high-volume filesystem churn that pushes old metadata out of
//! the change journal and old snapshots out of shadow-copy storage.

pub mod journal;
pub mod scratch;
pub mod shadow;

pub use journal::JournalFloodController;
pub use shadow::ShadowStorageFloodController;

use crate::error::Error;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloodKind {
    Journal,
    ShadowStorage,
}

impl fmt::Display for FloodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloodKind::Journal => f.write_str("journal"),
            FloodKind::ShadowStorage => f.write_str("shadow storage"),
        }
    }
}

/// How the caller wants a flood sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodSizing {
    /// Measure live capacity through the system query.
    Auto,
    /// Journal: operation count. Shadow storage: bytes. Bypasses the query.
    Explicit(u64),
}

/// Flood sizing derived from one live measurement. Never reused across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct FloodPlan {
    pub kind: FloodKind,
    /// `None` when the size was given explicitly.
    pub measured_capacity: Option<u64>,
    pub target_fill_fraction: f64,
    /// Journal: bytes per operation record. Shadow storage: bytes per chunk file.
    pub unit_cost: u64,
    /// Journal: operations. Shadow storage: bytes.
    pub volume: u64,
    /// Dummy files (journal) or chunk files (shadow storage) the volume works out to.
    pub units: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    /// Free space reached the safety margin. A natural stop, not a failure.
    DiskExhausted,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloodReport {
    pub plan: FloodPlan,
    pub units_completed: u64,
    pub operations_executed: u64,
    pub bytes_written: u64,
    pub stop_reason: StopReason,
    pub elapsed: Duration,
}

/// Settle a flood that has finished its loop. An error that stopped the loop,
/// or failing to clean up afterwards, comes back with the partial report attached.
pub(crate) fn settle(
    report: FloodReport,
    failure: Option<Error>,
    cleanup: Result<(), Error>,
) -> Result<FloodReport, Error> {
    match failure.or(cleanup.err()) {
        Some(source) => Err(Error::FloodInterrupted {
            report: Box::new(report),
            source: Box::new(source),
        }),
        None => Ok(report),
    }
}
