use crate::flood::FloodReport;
use crate::query::QueryError;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid pass count {0}: expected a value between 1 and 10")]
    InvalidPassCount(u8),

    #[error("Permission denied for {}: {source}", .path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Capacity query unavailable: {0}")]
    QueryUnavailable(#[from] QueryError),

    #[error("Rename destination already exists for {}", .0.display())]
    RenameCollision(PathBuf),

    #[error("Cannot enumerate {}: {source}", .path.display())]
    Enumeration {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Operation cancelled")]
    Cancelled,

    /// A flood stopped on an error; `report` holds the work done until then.
    #[error(
        "{} flood failed after {} units: {source}",
        .report.plan.kind,
        .report.units_completed
    )]
    FloodInterrupted {
        report: Box<FloodReport>,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    Other(String),
}

/// Failure taxonomy recorded in the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    PermissionDenied,
    IoFailure,
    QueryUnavailable,
    DiskExhausted,
    Cancelled,
    InvalidConfiguration,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::PermissionDenied => "permission denied",
            FailureKind::IoFailure => "io failure",
            FailureKind::QueryUnavailable => "query unavailable",
            FailureKind::DiskExhausted => "disk exhausted",
            FailureKind::Cancelled => "cancelled",
            FailureKind::InvalidConfiguration => "invalid configuration",
        };
        f.write_str(label)
    }
}

impl Error {
    /// Wrap an I/O error for `path`, keeping permission problems distinguishable.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            Error::PermissionDenied {
                path: path.to_path_buf(),
                source: err,
            }
        } else {
            Error::Io(io::Error::new(
                err.kind(),
                format!("{}: {}", path.display(), err),
            ))
        }
    }

    /// The partial flood report carried by [`Error::FloodInterrupted`].
    pub fn partial_flood(&self) -> Option<&FloodReport> {
        match self {
            Error::FloodInterrupted { report, .. } => Some(&**report),
            _ => None,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Error::PermissionDenied { .. } => FailureKind::PermissionDenied,
            Error::Io(err) | Error::Enumeration { source: err, .. } => {
                if err.kind() == io::ErrorKind::PermissionDenied {
                    FailureKind::PermissionDenied
                } else {
                    FailureKind::IoFailure
                }
            }
            // Collisions are retried once before surfacing, then count as plain I/O failures.
            Error::RenameCollision(_) => FailureKind::IoFailure,
            Error::QueryUnavailable(_) => FailureKind::QueryUnavailable,
            Error::Cancelled => FailureKind::Cancelled,
            Error::FloodInterrupted { source, .. } => source.kind(),
            Error::Config(_) | Error::InvalidConfig(_) | Error::InvalidPassCount(_) => {
                FailureKind::InvalidConfiguration
            }
            Error::Other(_) => FailureKind::IoFailure,
        }
    }
}
