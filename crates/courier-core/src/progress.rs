/// Trait for reporting pipeline progress.
///
/// CLI implements with indicatif; tests and offline runs use [`SilentReporter`].
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self) {}
    fn on_scan_complete(&self, _subjects: usize, _entries: usize, _skipped: usize) {}
    fn on_subject_start(&self, _label: &str, _files: usize, _groups: usize) {}
    fn on_group_deposited(&self, _series_uid: &str, _bundle: &str) {}
    fn on_group_failed(&self, _series_uid: &str) {}
    fn on_subject_complete(&self, _label: &str) {}
    fn on_subject_failed(&self, _label: &str) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
