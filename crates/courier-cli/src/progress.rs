use courier_core::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

/// CLI progress reporter using indicatif.
///
/// - Scan phase: spinner (entry count unknown upfront)
/// - Per subject: progress bar over its series groups
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }

    fn inc_bar(&self) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.inc(1);
        }
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.set_message("Scanning archive...");
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_scan_complete(&self, subjects: usize, entries: usize, skipped: usize) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Scan complete: {} subjects, {} files ({} skipped)",
            subjects, entries, skipped
        );
    }

    fn on_subject_start(&self, label: &str, _files: usize, groups: usize) {
        let pb = ProgressBar::new(groups as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "  {spinner:.cyan} {msg} [{bar:30.cyan/dim}] {pos}/{len} series",
            )
            .unwrap()
            .progress_chars("━╸─")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.set_message(label.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_group_deposited(&self, _series_uid: &str, _bundle: &str) {
        self.inc_bar();
    }

    fn on_group_failed(&self, _series_uid: &str) {
        self.inc_bar();
    }

    fn on_subject_complete(&self, label: &str) {
        self.finish_bar();
        eprintln!("  \x1b[32m✓\x1b[0m Subject {} done", label);
    }

    fn on_subject_failed(&self, label: &str) {
        self.finish_bar();
        eprintln!("  \x1b[31m✗\x1b[0m Subject {} aborted", label);
    }
}
