use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    #[error("No volume could be resolved for {}", .0.display())]
    NoVolume(PathBuf),

    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Could not parse {0} from command output")]
    Parse(&'static str),

    #[error("{0} is unbounded")]
    Unbounded(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Live filesystem introspection consumed by the flood controllers.
///
/// Platform glue implements this against OS tooling; tests substitute [`FixedQuery`].
/// No implementation is assumed to be available, which is why every flood also
/// accepts an explicit size that bypasses the query.
pub trait SystemQuery: Send + Sync {
    fn journal_capacity_bytes(&self) -> Result<u64, QueryError>;
    fn shadow_storage_max_bytes(&self) -> Result<u64, QueryError>;
    fn shadow_storage_used_bytes(&self) -> Result<u64, QueryError>;

    /// Free space on the volume holding `dir`.
    fn available_bytes(&self, dir: &Path) -> Result<u64, QueryError> {
        Ok(fs2::available_space(dir)?)
    }
}

/// Query used where no platform introspection exists.
pub struct UnavailableQuery;

impl SystemQuery for UnavailableQuery {
    fn journal_capacity_bytes(&self) -> Result<u64, QueryError> {
        Err(QueryError::Unsupported("change journal introspection"))
    }

    fn shadow_storage_max_bytes(&self) -> Result<u64, QueryError> {
        Err(QueryError::Unsupported("shadow storage introspection"))
    }

    fn shadow_storage_used_bytes(&self) -> Result<u64, QueryError> {
        Err(QueryError::Unsupported("shadow storage introspection"))
    }
}

/// Query answering from fixed values; `None` means "unavailable".
#[derive(Debug, Clone, Default)]
pub struct FixedQuery {
    pub journal_capacity: Option<u64>,
    pub shadow_max: Option<u64>,
    pub shadow_used: Option<u64>,
    /// Overrides the real free-space query when set.
    pub available: Option<u64>,
}

impl FixedQuery {
    pub fn journal(capacity: u64) -> Self {
        Self {
            journal_capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn shadow_storage(max: u64, used: u64) -> Self {
        Self {
            shadow_max: Some(max),
            shadow_used: Some(used),
            ..Self::default()
        }
    }

    pub fn with_available(mut self, bytes: u64) -> Self {
        self.available = Some(bytes);
        self
    }
}

impl SystemQuery for FixedQuery {
    fn journal_capacity_bytes(&self) -> Result<u64, QueryError> {
        self.journal_capacity
            .ok_or(QueryError::Unsupported("change journal introspection"))
    }

    fn shadow_storage_max_bytes(&self) -> Result<u64, QueryError> {
        self.shadow_max
            .ok_or(QueryError::Unsupported("shadow storage introspection"))
    }

    fn shadow_storage_used_bytes(&self) -> Result<u64, QueryError> {
        self.shadow_used
            .ok_or(QueryError::Unsupported("shadow storage introspection"))
    }

    fn available_bytes(&self, dir: &Path) -> Result<u64, QueryError> {
        match self.available {
            Some(bytes) => Ok(bytes),
            None => Ok(fs2::available_space(dir)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_query_fails_every_measurement() {
        let query = UnavailableQuery;
        assert!(matches!(
            query.journal_capacity_bytes(),
            Err(QueryError::Unsupported(_))
        ));
        assert!(query.shadow_storage_max_bytes().is_err());
        assert!(query.shadow_storage_used_bytes().is_err());
    }

    #[test]
    fn test_fixed_query_reports_configured_values() {
        let query = FixedQuery::journal(1_000_000).with_available(42);
        assert_eq!(query.journal_capacity_bytes().unwrap(), 1_000_000);
        assert!(query.shadow_storage_max_bytes().is_err());
        assert_eq!(query.available_bytes(Path::new(".")).unwrap(), 42);
    }
}
