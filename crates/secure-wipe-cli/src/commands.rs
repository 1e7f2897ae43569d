use clap::{Args, Parser, Subcommand};
use secure_wipe_core::{EngineConfig, FloodSizing};
use std::path::PathBuf;

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Parser)]
#[command(name = "secure-wipe")]
#[command(about = "Destroy files beyond recovery", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Rename, overwrite and remove a file or directory tree
    Wipe(WipeArgs),
    /// Show what can be measured about the recovery surfaces of a path's volume
    Inspect {
        /// Any path on the volume to inspect
        path: PathBuf,
    },
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct WipeArgs {
    /// File or directory to destroy
    pub path: PathBuf,

    /// Overwrite passes per file
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub passes: Option<u8>,

    /// Skip the rename pass
    #[arg(long)]
    pub no_rename: bool,

    /// Flood the change journal afterwards, optionally with an explicit operation count
    #[arg(long, value_name = "OPERATIONS", num_args = 0..=1, require_equals = true)]
    pub flood_journal: Option<Option<u64>>,

    /// Flood shadow storage afterwards, optionally with an explicit size in GiB
    #[arg(long, value_name = "GIB", num_args = 0..=1, require_equals = true)]
    pub flood_shadow: Option<Option<u64>>,

    /// Concurrent overwrite workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Check for residue once the run is finished
    #[arg(long)]
    pub validate: bool,
}

impl WipeArgs {
    /// Apply flag overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(passes) = self.passes {
            config.passes = passes;
        }
        if self.no_rename {
            config.rename = false;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
    }

    pub fn journal_sizing(&self) -> Option<FloodSizing> {
        self.flood_journal.map(|count| match count {
            Some(operations) => FloodSizing::Explicit(operations),
            None => FloodSizing::Auto,
        })
    }

    pub fn shadow_sizing(&self) -> Option<FloodSizing> {
        self.flood_shadow.map(|size| match size {
            Some(gib) => FloodSizing::Explicit(gib.saturating_mul(GIB)),
            None => FloodSizing::Auto,
        })
    }
}
