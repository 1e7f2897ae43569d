use console::Term;
use indicatif::{ProgressBar, ProgressStyle};
use secure_wipe_core::flood::{FloodKind, FloodPlan, FloodReport, StopReason};
use secure_wipe_core::{ProgressReporter, RunState, Step, TargetFailure};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Enumeration: spinner (entry count unknown upfront)
/// - Rename and overwrite: progress bars sized from the enumeration
/// - Floods: progress bars sized from the flood plan
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
    term: Term,
    entries: AtomicUsize,
    files: AtomicUsize,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            term: Term::stderr(),
            entries: AtomicUsize::new(0),
            files: AtomicUsize::new(0),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.guard();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.guard().take() {
            pb.finish_and_clear();
        }
    }

    fn spinner(&self, message: &'static str) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(style("{spinner:.cyan} {msg}"));
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn bar(&self, label: &str, len: u64, unit: &str) {
        let pb = ProgressBar::new(len);
        pb.set_style(
            style(&format!(
                "  {{spinner:.cyan}} {label} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} {unit} ({{eta}} remaining)"
            ))
            .progress_chars("━╸─"),
        );
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    /// Print above the active bar, or straight to stderr when none is shown.
    fn println(&self, line: String) {
        match self.guard().as_ref() {
            Some(pb) => pb.println(line),
            None => eprintln!("{}", line),
        }
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_chars(TICK_CHARS)
}

impl ProgressReporter for CliReporter {
    fn on_state_change(&self, state: RunState) {
        match state {
            RunState::Enumerating => {
                let _ = self.term.hide_cursor();
                self.spinner("Enumerating target...")
            }
            RunState::Renaming => {
                self.bar("Renaming", self.entries.load(Ordering::SeqCst) as u64, "entries")
            }
            RunState::Overwriting => {
                self.bar("Overwriting", self.files.load(Ordering::SeqCst) as u64, "files")
            }
            RunState::Aborting | RunState::Reporting => {
                self.finish_bar();
                let _ = self.term.show_cursor();
            }
            _ => {}
        }
    }

    fn on_enumerated(&self, files: usize, directories: usize, total_bytes: u64) {
        self.entries.store(files + directories, Ordering::SeqCst);
        self.files.store(files, Ordering::SeqCst);
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Enumerated {} files and {} directories ({} bytes)",
            files, directories, total_bytes
        );
    }

    fn on_rename_progress(&self, entries_done: usize, _entries_total: usize) {
        if let Some(pb) = self.guard().as_ref() {
            pb.set_position(entries_done as u64);
        }
    }

    fn on_target_complete(&self, _path: &Path, _bytes_written: u64) {
        if let Some(pb) = self.guard().as_ref() {
            pb.inc(1);
        }
    }

    fn on_target_failed(&self, failure: &TargetFailure) {
        if failure.step == Step::Overwrite {
            if let Some(pb) = self.guard().as_ref() {
                pb.inc(1);
            }
        }
        self.println(format!(
            "  \x1b[31m✗\x1b[0m {:?} failed for {}: {}",
            failure.step,
            failure.path.display(),
            failure.detail
        ));
    }

    fn on_flood_start(&self, plan: &FloodPlan) {
        let (label, unit) = match plan.kind {
            FloodKind::Journal => ("Journal flood", "dummies"),
            FloodKind::ShadowStorage => ("Shadow flood", "chunks"),
        };
        self.bar(label, plan.units, unit);
    }

    fn on_flood_progress(&self, _kind: FloodKind, units_done: u64, _units_total: u64) {
        if let Some(pb) = self.guard().as_ref() {
            pb.set_position(units_done);
        }
    }

    fn on_flood_complete(&self, report: &FloodReport) {
        self.finish_bar();
        let note = match report.stop_reason {
            StopReason::Completed => "",
            StopReason::DiskExhausted => " (stopped at free-space margin)",
            StopReason::Cancelled => " (cancelled)",
        };
        eprintln!(
            "  \x1b[32m✓\x1b[0m {} flood: {} operations, {} bytes in {:.2}s{}",
            report.plan.kind,
            report.operations_executed,
            report.bytes_written,
            report.elapsed.as_secs_f64(),
            note
        );
    }
}
