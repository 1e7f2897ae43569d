use crate::report::RunReport;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    /// Nothing recoverable was found.
    Clean,
    /// Paths that still exist or were recovered.
    Residue(Vec<PathBuf>),
    Inconclusive(String),
}

/// Recovery check run after the report is built. Real scanners live outside the engine.
pub trait ValidationHook: Send + Sync {
    fn validate(&self, report: &RunReport, renamed_paths: &[PathBuf]) -> ValidationVerdict;
}

/// Checks that neither the original root nor any renamed entry is still on disk.
pub struct ResidueCheck;

impl ValidationHook for ResidueCheck {
    fn validate(&self, report: &RunReport, renamed_paths: &[PathBuf]) -> ValidationVerdict {
        let residue: Vec<PathBuf> = std::iter::once(&report.root)
            .chain(renamed_paths.iter())
            .filter(|p| p.symlink_metadata().is_ok())
            .cloned()
            .collect();

        if residue.is_empty() {
            ValidationVerdict::Clean
        } else {
            ValidationVerdict::Residue(residue)
        }
    }
}
