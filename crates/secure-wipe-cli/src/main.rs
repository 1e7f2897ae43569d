mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, WipeArgs};
use console::Term;
use dotenv::dotenv;
use progress::CliReporter;
use secure_wipe_core::flood::{JournalFloodController, ShadowStorageFloodController};
use secure_wipe_core::{
    platform, AlwaysConfirm, CancelToken, Confirmer, DeletionOrchestrator, EngineConfig,
    FloodSizing, ResidueCheck, RunOutcome, RunReport, SystemQuery, ValidationVerdict,
};
use tracing::{error, info, warn};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match secure_wipe_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    match args.command {
        Some(Commands::Wipe(wipe)) => {
            let report = run_wipe(config, &wipe)?;
            print_summary(&report);
            if !matches!(report.outcome, RunOutcome::Declined) && !report.is_clean() {
                process::exit(2);
            }
        }
        Some(Commands::Inspect { path }) => run_inspect(&config, &path)?,
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn run_wipe(mut config: EngineConfig, args: &WipeArgs) -> anyhow::Result<RunReport> {
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;
    let passes = config.pass_config()?;

    let query: Arc<dyn SystemQuery> = Arc::from(platform::system_query_for(&args.path));
    let confirmer: Arc<dyn Confirmer> = if args.yes {
        Arc::new(AlwaysConfirm)
    } else {
        Arc::new(TypedConfirm)
    };

    let mut orchestrator = DeletionOrchestrator::new(config)
        .with_system_query(query)
        .with_reporter(Arc::new(CliReporter::new()))
        .with_confirmer(confirmer);
    if args.validate {
        orchestrator = orchestrator.with_validation_hook(Arc::new(ResidueCheck));
    }

    // Ctrl-C cancels at the next step or target boundary.
    if let Err(err) = ctrlc::set_handler(interrupt_handler(orchestrator.cancel_token())) {
        warn!("Could not install Ctrl-C handler: {}", err);
    }

    info!(
        "Wiping {} with {} passes{}",
        args.path.display(),
        passes.pass_count(),
        if passes.rename_enabled() { "" } else { ", renaming disabled" }
    );

    let report = orchestrator.run(
        &args.path,
        passes,
        args.journal_sizing(),
        args.shadow_sizing(),
    );
    // The reporter hides the cursor while bars are drawn.
    let _ = Term::stderr().show_cursor();

    Ok(report)
}

fn interrupt_handler(token: CancelToken) -> impl FnMut() + Send + 'static {
    move || {
        if !token.is_cancelled() {
            eprintln!("Interrupted, stopping after the current step...");
        }
        token.cancel();
    }
}

fn print_summary(report: &RunReport) {
    println!();
    match report.outcome {
        RunOutcome::Declined => {
            info!("{}", "Nothing was deleted".yellow());
            return;
        }
        RunOutcome::Completed => info!("Run {}", "completed".green()),
        RunOutcome::Aborted(kind) => info!("Run {} ({})", "aborted".red(), kind),
    }

    info!(
        "Started {}, took {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        format!("{:.2}s", report.elapsed.as_secs_f64()).green(),
    );
    info!(
        "Rename: {}, Overwrite: {}, Journal flood: {}, Shadow flood: {}",
        format!("{:.2}s", report.timings.rename.as_secs_f64()).green(),
        format!("{:.2}s", report.timings.overwrite.as_secs_f64()).green(),
        format!("{:.2}s", report.timings.journal_flood.as_secs_f64()).green(),
        format!("{:.2}s", report.timings.shadow_flood.as_secs_f64()).green(),
    );
    info!(
        "{} of {} files destroyed, {} failed, {} not processed, {} directories removed",
        format!("{}", report.targets_processed).green(),
        report.targets_total,
        format!("{}", report.targets_failed()).red(),
        format!("{}", report.targets_unprocessed).yellow(),
        report.directories_removed,
    );
    info!(
        "{} bytes overwritten at {:.1} MiB/s",
        report.bytes_overwritten,
        report.throughput_bytes_per_sec() / (1024.0 * 1024.0),
    );

    for flood in [&report.journal_flood, &report.shadow_flood].into_iter().flatten() {
        info!(
            "{} flood: {} of {} units, {} operations, stopped {:?}",
            flood.plan.kind,
            flood.units_completed,
            flood.plan.units,
            format!("{}", flood.operations_executed).cyan(),
            flood.stop_reason,
        );
    }

    for failure in &report.failures {
        warn!(
            "{:?} {} [{}]: {}",
            failure.step,
            failure.path.display(),
            failure.kind,
            failure.detail
        );
    }

    match &report.validation {
        Some(ValidationVerdict::Clean) => info!("Validation: {}", "clean".green()),
        Some(ValidationVerdict::Residue(paths)) => {
            warn!("Validation: {} residual paths", format!("{}", paths.len()).red());
            for path in paths {
                warn!("  {}", path.display());
            }
        }
        Some(ValidationVerdict::Inconclusive(reason)) => {
            warn!("Validation inconclusive: {}", reason)
        }
        None => {}
    }
}

fn run_inspect(config: &EngineConfig, path: &Path) -> anyhow::Result<()> {
    let query = platform::system_query_for(path);
    let drive = platform::get_drive_letter(path);
    info!(
        "Volume: {}",
        drive
            .as_ref()
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string())
    );

    match query.available_bytes(path) {
        Ok(bytes) => info!("Free space: {} bytes", bytes),
        Err(err) => warn!("Free space unknown: {}", err),
    }

    let journal = JournalFloodController::new(config.journal.clone());
    match journal.plan(query.as_ref(), FloodSizing::Auto) {
        Ok(plan) => info!(
            "Change journal: {} bytes; a flood would run {} operations over {} dummy files",
            plan.measured_capacity.unwrap_or(0),
            format!("{}", plan.volume).cyan(),
            plan.units,
        ),
        Err(err) => warn!(
            "Change journal not measurable ({}); use --flood-journal=<operations>",
            err
        ),
    }

    match query.shadow_storage_used_bytes() {
        Ok(used) => info!("Shadow storage in use: {} bytes", used),
        Err(err) => warn!("Shadow storage usage unknown: {}", err),
    }
    let shadow = ShadowStorageFloodController::new(config.shadow.clone());
    match shadow.plan(query.as_ref(), FloodSizing::Auto) {
        Ok(plan) => info!(
            "Shadow storage: {} bytes maximum; a flood would write {} bytes in {} chunks",
            plan.measured_capacity.unwrap_or(0),
            format!("{}", plan.volume).cyan(),
            plan.units,
        ),
        Err(err) => warn!(
            "Shadow storage not measurable ({}); use --flood-shadow=<GiB>",
            err
        ),
    }

    info!(
        "{}",
        "Backups and synced copies outside this volume are not reached by a wipe"
            .yellow()
    );
    Ok(())
}

/// Requires the operator to type `DELETE` before anything is touched.
struct TypedConfirm;

impl Confirmer for TypedConfirm {
    fn confirm(&self, root: &Path) -> bool {
        match prompt_typed_confirm(root) {
            Ok(confirmed) => confirmed,
            Err(err) => {
                error!("Could not read confirmation: {}", err);
                false
            }
        }
    }
}

fn prompt_typed_confirm(root: &Path) -> io::Result<bool> {
    let mut input = String::new();

    println!(
        "{} {} will be destroyed and cannot be recovered.",
        "WARNING:".red().bold(),
        root.display()
    );
    print!("Type DELETE to continue: ");
    io::stdout().flush()?;

    io::stdin().read_line(&mut input)?;
    Ok(input.trim() == "DELETE")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_cancels_the_run() {
        let token = CancelToken::new();
        let mut handler = interrupt_handler(token.clone());
        assert!(!token.is_cancelled());
        handler();
        assert!(token.is_cancelled());
        handler();
        assert!(token.is_cancelled());
    }
}
