use crate::config::AppConfig;
use crate::error::Error;
use crate::grouper::{self, SeriesGroup};
use crate::metadata::HeaderReader;
use crate::packager;
use crate::progress::ProgressReporter;
use crate::remote::{ContainerRef, RemoteStore};
use crate::scanner::{self, ScanOutcome};
use crate::sync::{self, HierarchyPath, RetryPolicy};
use rayon::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use zip::ZipArchive;

pub struct UploadEngine {
    config: AppConfig,
    archive_path: PathBuf,
    seg_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeAction {
    Deposited,
    Failed,
}

impl OutcomeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeAction::Deposited => "deposited",
            OutcomeAction::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub subject: String,
    pub series_uid: String,
    pub bundle: String,
    pub action: OutcomeAction,
    pub error: Option<String>,
}

/// Per-run aggregation of explicit outcomes, in place of exception
/// interception at arbitrary points.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub subjects_processed: usize,
    pub subjects_failed: usize,
    pub entries_skipped: usize,
    pub groups_packaged: usize,
    pub groups_deposited: usize,
    pub groups_failed: usize,
    pub outcomes: Vec<GroupOutcome>,
}

/// What an upload run would do, without touching the remote store.
#[derive(Debug, Default)]
pub struct PreviewReport {
    pub entries_skipped: usize,
    pub subjects: Vec<SubjectPreview>,
}

#[derive(Debug)]
pub struct SubjectPreview {
    pub label: String,
    pub files: usize,
    pub groups: Vec<GroupPreview>,
    /// Set when grouping failed for the subject.
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct GroupPreview {
    pub series_uid: String,
    pub bundle: String,
    pub members: usize,
    pub hierarchy: HierarchyPath,
}

struct SubjectCounts {
    packaged: usize,
    deposited: usize,
    failed: usize,
    outcomes: Vec<GroupOutcome>,
}

impl UploadEngine {
    pub fn new(config: AppConfig, archive_path: impl Into<PathBuf>, seg_index: usize) -> Self {
        Self {
            config,
            archive_path: archive_path.into(),
            seg_index,
        }
    }

    /// Run the full pipeline:
    /// 1. Scan the archive into subject buckets
    /// 2. Per subject: group by series in a scoped workspace
    /// 3. Per group: package a bundle, then sync it into the hierarchy
    ///
    /// An unreadable archive or unresolvable project is fatal. A metadata
    /// failure aborts one subject; a packaging or sync failure aborts one
    /// group. Everything else in the batch continues.
    pub fn run<S, R, P>(&self, store: &S, reader: &R, reporter: &P) -> Result<RunSummary, Error>
    where
        S: RemoteStore + ?Sized,
        R: HeaderReader + ?Sized,
        P: ProgressReporter + ?Sized,
    {
        let project = store
            .find_project(&self.config.project)?
            .ok_or_else(|| Error::MissingProject(self.config.project.clone()))?;
        info!(project = %project.label, "Project resolved");

        let scan = self.scan(reporter)?;
        let retry = RetryPolicy::from_config(&self.config);

        let subjects: Vec<(String, Vec<String>)> = scan.buckets.into_iter().collect();
        info!("Found {} subjects in archive", subjects.len());

        let process = |(label, entries): &(String, Vec<String>)| {
            let result =
                self.process_subject(store, reader, reporter, &project, &retry, label, entries);
            (label.clone(), result)
        };

        let results: Vec<(String, Result<SubjectCounts, Error>)> =
            if self.config.max_workers > 1 {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(self.config.max_workers)
                    .build()
                    .map_err(|e| Error::Other(e.to_string()))?;
                pool.install(|| subjects.par_iter().map(process).collect())
            } else {
                subjects.iter().map(process).collect()
            };

        let mut summary = RunSummary {
            entries_skipped: scan.skipped_no_marker + scan.skipped_ignored,
            ..RunSummary::default()
        };

        for (label, result) in results {
            match result {
                Ok(counts) => {
                    summary.subjects_processed += 1;
                    summary.groups_packaged += counts.packaged;
                    summary.groups_deposited += counts.deposited;
                    summary.groups_failed += counts.failed;
                    summary.outcomes.extend(counts.outcomes);
                    reporter.on_subject_complete(&label);
                }
                Err(err) => {
                    error!(subject = %label, "Subject aborted: {}", err);
                    summary.subjects_failed += 1;
                    reporter.on_subject_failed(&label);
                }
            }
        }

        info!(
            "Upload processing complete: {} subjects ({} failed), {} bundles deposited, {} failed",
            summary.subjects_processed,
            summary.subjects_failed,
            summary.groups_deposited,
            summary.groups_failed,
        );
        Ok(summary)
    }

    /// Scan and group only; compute the bundle names and hierarchy paths an
    /// upload would produce. Makes no remote calls.
    pub fn preview<R, P>(&self, reader: &R, reporter: &P) -> Result<PreviewReport, Error>
    where
        R: HeaderReader + ?Sized,
        P: ProgressReporter + ?Sized,
    {
        let scan = self.scan(reporter)?;

        let mut report = PreviewReport {
            entries_skipped: scan.skipped_no_marker + scan.skipped_ignored,
            subjects: Vec::new(),
        };

        for (label, entries) in &scan.buckets {
            let workspace = tempfile::tempdir()?;
            let mut preview = SubjectPreview {
                label: label.clone(),
                files: entries.len(),
                groups: Vec::new(),
                error: None,
            };

            match grouper::group_subject(&self.archive_path, entries, workspace.path(), reader) {
                Ok(groups) => {
                    for group in groups.values() {
                        // Derive errors stay subject-local, as in the upload path
                        let hierarchy = match HierarchyPath::derive(
                            &group.representative,
                            self.seg_index,
                            &group.study_date,
                        ) {
                            Ok(hierarchy) => hierarchy,
                            Err(err) => {
                                preview.error = Some(err.to_string());
                                continue;
                            }
                        };
                        preview.groups.push(GroupPreview {
                            series_uid: group.series_uid.clone(),
                            bundle: packager::bundle_name(
                                &group.representative,
                                group.series_number,
                            ),
                            members: group.members.len(),
                            hierarchy,
                        });
                    }
                }
                Err(err) => preview.error = Some(err.to_string()),
            }

            report.subjects.push(preview);
        }

        Ok(report)
    }

    fn scan<P>(&self, reporter: &P) -> Result<ScanOutcome, Error>
    where
        P: ProgressReporter + ?Sized,
    {
        reporter.on_scan_start();
        info!("Scanning archive for DICOM files...");

        // Fails fast when the archive is unreadable
        let file = File::open(&self.archive_path)?;
        let mut zip = ZipArchive::new(file)?;

        let ignore = scanner::compile_patterns(&self.config.ignore_patterns);
        let scan = scanner::scan_archive(&mut zip, &self.config.subject_marker, &ignore);

        reporter.on_scan_complete(
            scan.buckets.len(),
            scan.total_matched,
            scan.skipped_no_marker + scan.skipped_ignored,
        );
        Ok(scan)
    }

    /// All-or-nothing grouping for one subject, then per-group package and
    /// sync with group-level failure isolation.
    #[allow(clippy::too_many_arguments)]
    fn process_subject<S, R, P>(
        &self,
        store: &S,
        reader: &R,
        reporter: &P,
        project: &ContainerRef,
        retry: &RetryPolicy,
        label: &str,
        entries: &[String],
    ) -> Result<SubjectCounts, Error>
    where
        S: RemoteStore + ?Sized,
        R: HeaderReader + ?Sized,
        P: ProgressReporter + ?Sized,
    {
        info!("Processing subject {} with {} files...", label, entries.len());

        let workspace = tempfile::tempdir()?;
        let groups = grouper::group_subject(&self.archive_path, entries, workspace.path(), reader)?;
        reporter.on_subject_start(label, entries.len(), groups.len());

        let mut counts = SubjectCounts {
            packaged: 0,
            deposited: 0,
            failed: 0,
            outcomes: Vec::new(),
        };

        for (series_uid, group) in &groups {
            let bundle_name = packager::bundle_name(&group.representative, group.series_number);
            let record_failure = |counts: &mut SubjectCounts, err: Error| {
                error!(series_uid = %series_uid, "Failed to upload series: {}", err);
                counts.failed += 1;
                counts.outcomes.push(GroupOutcome {
                    subject: label.to_string(),
                    series_uid: series_uid.clone(),
                    bundle: bundle_name.clone(),
                    action: OutcomeAction::Failed,
                    error: Some(err.to_string()),
                });
                reporter.on_group_failed(series_uid);
            };

            let bundle = match packager::pack(group, workspace.path()) {
                Ok(bundle) => {
                    counts.packaged += 1;
                    bundle
                }
                Err(err) => {
                    record_failure(&mut counts, err);
                    continue;
                }
            };

            match self.sync_group(store, project, retry, group, &bundle) {
                Ok(()) => {
                    counts.deposited += 1;
                    counts.outcomes.push(GroupOutcome {
                        subject: label.to_string(),
                        series_uid: series_uid.clone(),
                        bundle: bundle_name.clone(),
                        action: OutcomeAction::Deposited,
                        error: None,
                    });
                    reporter.on_group_deposited(series_uid, &bundle_name);
                }
                Err(err) => record_failure(&mut counts, err),
            }
        }

        Ok(counts)
    }

    fn sync_group<S>(
        &self,
        store: &S,
        project: &ContainerRef,
        retry: &RetryPolicy,
        group: &SeriesGroup,
        bundle: &Path,
    ) -> Result<(), Error>
    where
        S: RemoteStore + ?Sized,
    {
        let hierarchy =
            HierarchyPath::derive(&group.representative, self.seg_index, &group.study_date)?;
        sync::deposit(store, project, &hierarchy, bundle, retry)
    }
}
