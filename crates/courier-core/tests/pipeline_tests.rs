use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use courier_core::grouper;
use courier_core::remote::MemoryStore;
use courier_core::{
    AppConfig, ContainerLevel, Error, FileMetadata, HeaderReader, SilentReporter, UploadEngine,
};
use tempfile::tempdir;
use zip::write::FileOptions;
use zip::ZipWriter;

/// Header stub: each fixture file's content is "series_uid|study_date|series_number".
/// Anything else fails the read, standing in for a corrupt DICOM header.
struct StubReader;

impl HeaderReader for StubReader {
    fn read_header(&self, path: &Path) -> Result<FileMetadata, Error> {
        let text = fs::read_to_string(path)?;
        let mut parts = text.trim().split('|');
        let (Some(uid), Some(date), Some(number)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::Metadata {
                path: path.display().to_string(),
                reason: "missing header fields".to_string(),
            });
        };
        let series_number = number.parse::<i64>().map_err(|e| Error::Metadata {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(FileMetadata {
            series_uid: uid.to_string(),
            study_date: date.to_string(),
            series_number,
        })
    }
}

fn build_archive(dir: &Path, entries: &[(&str, &str)]) -> PathBuf {
    let path = dir.join("input.zip");
    let file = fs::File::create(&path).unwrap();
    let mut writer = ZipWriter::new(file);
    for (name, contents) in entries {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
    path
}

fn test_config() -> AppConfig {
    AppConfig {
        api_key: String::new(),
        project: "NACC".to_string(),
        api_base_url: "http://localhost".to_string(),
        subject_marker: "NACC".to_string(),
        ignore_patterns: vec![],
        max_workers: 1,
        retry_attempts: 1,
        retry_backoff_ms: 0,
        connect_timeout_secs: 1,
        request_timeout_secs: 1,
        report_path: None,
    }
}

#[test]
fn test_two_file_single_series_scenario() {
    let tmp = tempdir().unwrap();
    let archive = build_archive(
        tmp.path(),
        &[
            ("root/NACC001/acq1/a.dcm", "S1|20240101|3"),
            ("root/NACC001/acq1/b.dcm", "S1|20240101|3"),
        ],
    );

    let store = MemoryStore::with_project("NACC Uploads");
    let engine = UploadEngine::new(test_config(), &archive, 1);
    let summary = engine.run(&store, &StubReader, &SilentReporter).unwrap();

    assert_eq!(summary.subjects_processed, 1);
    assert_eq!(summary.subjects_failed, 0);
    assert_eq!(summary.groups_packaged, 1);
    assert_eq!(summary.groups_deposited, 1);
    assert_eq!(summary.groups_failed, 0);

    assert_eq!(store.labels_at(ContainerLevel::Subject), vec!["NACC001"]);
    assert_eq!(
        store.labels_at(ContainerLevel::Session),
        vec!["20240101_MRI"]
    );
    assert_eq!(store.labels_at(ContainerLevel::Acquisition), vec!["acq1"]);

    let deposits = store.deposits();
    assert_eq!(deposits.len(), 1);
    assert_eq!(deposits[0].file_name, "3-a.zip");
    assert_eq!(deposits[0].container_label, "acq1");
    assert_eq!(deposits[0].metadata, serde_json::json!({ "type": "dicom" }));
}

#[test]
fn test_markerless_archive_makes_no_remote_calls() {
    let tmp = tempdir().unwrap();
    let archive = build_archive(tmp.path(), &[("root/misc/acq1/a.dcm", "S1|20240101|3")]);

    let store = MemoryStore::with_project("NACC Uploads");
    let engine = UploadEngine::new(test_config(), &archive, 1);
    let summary = engine.run(&store, &StubReader, &SilentReporter).unwrap();

    assert_eq!(summary.subjects_processed, 0);
    assert_eq!(summary.entries_skipped, 1);
    assert_eq!(summary.groups_packaged, 0);

    assert_eq!(store.find_calls(), 0);
    assert_eq!(store.create_calls(), 0);
    assert_eq!(store.deposit_calls(), 0);
}

#[test]
fn test_missing_project_is_fatal() {
    let tmp = tempdir().unwrap();
    let archive = build_archive(tmp.path(), &[("root/NACC001/acq1/a.dcm", "S1|20240101|3")]);

    let store = MemoryStore::with_project("Unrelated Project");
    let engine = UploadEngine::new(test_config(), &archive, 1);
    let err = engine.run(&store, &StubReader, &SilentReporter).unwrap_err();

    assert!(matches!(err, Error::MissingProject(_)));
}

#[test]
fn test_unreadable_archive_is_fatal() {
    let tmp = tempdir().unwrap();
    let store = MemoryStore::with_project("NACC Uploads");
    let engine = UploadEngine::new(test_config(), tmp.path().join("missing.zip"), 1);
    let err = engine.run(&store, &StubReader, &SilentReporter).unwrap_err();

    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn test_subject_isolation_on_metadata_failure() {
    let tmp = tempdir().unwrap();
    let archive = build_archive(
        tmp.path(),
        &[
            ("root/NACC001/acq1/bad.dcm", "garbage"),
            ("root/NACC001/acq1/good.dcm", "S1|20240101|3"),
            ("root/NACC002/acq1/a.dcm", "S2|20240202|5"),
        ],
    );

    let store = MemoryStore::with_project("NACC Uploads");
    let engine = UploadEngine::new(test_config(), &archive, 1);
    let summary = engine.run(&store, &StubReader, &SilentReporter).unwrap();

    // NACC001 aborted whole, nothing of it deposited; NACC002 untouched by the failure
    assert_eq!(summary.subjects_failed, 1);
    assert_eq!(summary.subjects_processed, 1);
    assert_eq!(summary.groups_deposited, 1);

    assert_eq!(store.labels_at(ContainerLevel::Subject), vec!["NACC002"]);
    let deposits = store.deposits();
    assert_eq!(deposits.len(), 1);
    assert_eq!(deposits[0].file_name, "5-a.zip");
}

#[test]
fn test_group_isolation_on_deposit_failure() {
    let tmp = tempdir().unwrap();
    let archive = build_archive(
        tmp.path(),
        &[
            ("root/NACC001/acq1/a.dcm", "S1|20240101|3"),
            ("root/NACC001/acq1/c_br_x.dcm", "S2|20240101|7"),
        ],
    );

    let store = MemoryStore::with_project("NACC Uploads");
    store.fail_deposit_of("3-a.zip");

    let engine = UploadEngine::new(test_config(), &archive, 1);
    let summary = engine.run(&store, &StubReader, &SilentReporter).unwrap();

    assert_eq!(summary.groups_packaged, 2);
    assert_eq!(summary.groups_deposited, 1);
    assert_eq!(summary.groups_failed, 1);
    assert_eq!(summary.subjects_processed, 1);

    let deposits = store.deposits();
    assert_eq!(deposits.len(), 1);
    assert_eq!(deposits[0].file_name, "7-c.zip");

    let failed: Vec<_> = summary
        .outcomes
        .iter()
        .filter(|o| o.error.is_some())
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].bundle, "3-a.zip");
}

#[test]
fn test_rerun_creates_no_duplicate_containers() {
    let tmp = tempdir().unwrap();
    let archive = build_archive(
        tmp.path(),
        &[
            ("root/NACC001/acq1/a.dcm", "S1|20240101|3"),
            ("root/NACC001/acq2/b.dcm", "S2|20240101|4"),
        ],
    );

    let store = MemoryStore::with_project("NACC Uploads");
    let engine = UploadEngine::new(test_config(), &archive, 1);

    engine.run(&store, &StubReader, &SilentReporter).unwrap();
    let containers_after_first = store.container_count();
    let creates_after_first = store.create_calls();

    engine.run(&store, &StubReader, &SilentReporter).unwrap();

    assert_eq!(store.container_count(), containers_after_first);
    assert_eq!(store.create_calls(), creates_after_first);
}

#[test]
fn test_parallel_subjects_all_deposited() {
    let tmp = tempdir().unwrap();
    let archive = build_archive(
        tmp.path(),
        &[
            ("root/NACC001/acq1/a.dcm", "S1|20240101|3"),
            ("root/NACC002/acq1/b.dcm", "S2|20240202|4"),
            ("root/NACC003/acq1/c.dcm", "S3|20240303|5"),
        ],
    );

    let store = MemoryStore::with_project("NACC Uploads");
    let mut config = test_config();
    config.max_workers = 4;

    let engine = UploadEngine::new(config, &archive, 1);
    let summary = engine.run(&store, &StubReader, &SilentReporter).unwrap();

    assert_eq!(summary.subjects_processed, 3);
    assert_eq!(summary.groups_deposited, 3);

    let mut subjects = store.labels_at(ContainerLevel::Subject);
    subjects.sort();
    assert_eq!(subjects, vec!["NACC001", "NACC002", "NACC003"]);
}

#[test]
fn test_grouping_partitions_by_series_uid() {
    let tmp = tempdir().unwrap();
    let archive = build_archive(
        tmp.path(),
        &[
            ("root/NACC001/acq1/a.dcm", "S1|20240101|3"),
            ("root/NACC001/acq1/b.dcm", "S2|20240101|4"),
            ("root/NACC001/acq1/c.dcm", "S1|20240101|3"),
        ],
    );

    let workspace = tempdir().unwrap();
    let entries = vec![
        "root/NACC001/acq1/a.dcm".to_string(),
        "root/NACC001/acq1/b.dcm".to_string(),
        "root/NACC001/acq1/c.dcm".to_string(),
    ];
    let groups =
        grouper::group_subject(&archive, &entries, workspace.path(), &StubReader).unwrap();

    assert_eq!(groups.len(), 2);
    assert_eq!(
        groups["S1"].members,
        vec!["root/NACC001/acq1/a.dcm", "root/NACC001/acq1/c.dcm"]
    );
    assert_eq!(groups["S1"].representative, "root/NACC001/acq1/a.dcm");
    assert_eq!(groups["S2"].members, vec!["root/NACC001/acq1/b.dcm"]);

    // Every entry lands in exactly one group
    let total: usize = groups.values().map(|g| g.members.len()).sum();
    assert_eq!(total, entries.len());
}

#[test]
fn test_group_keeps_first_members_date_and_number() {
    let tmp = tempdir().unwrap();
    let archive = build_archive(
        tmp.path(),
        &[
            ("root/NACC001/acq1/a.dcm", "S1|20240101|3"),
            ("root/NACC001/acq1/b.dcm", "S1|20249999|9"),
        ],
    );

    let workspace = tempdir().unwrap();
    let entries = vec![
        "root/NACC001/acq1/a.dcm".to_string(),
        "root/NACC001/acq1/b.dcm".to_string(),
    ];
    let groups =
        grouper::group_subject(&archive, &entries, workspace.path(), &StubReader).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups["S1"].study_date, "20240101");
    assert_eq!(groups["S1"].series_number, 3);
    assert_eq!(groups["S1"].members.len(), 2);
}

#[test]
fn test_grouping_is_all_or_nothing_per_subject() {
    let tmp = tempdir().unwrap();
    let archive = build_archive(
        tmp.path(),
        &[
            ("root/NACC001/acq1/a.dcm", "S1|20240101|3"),
            ("root/NACC001/acq1/bad.dcm", "garbage"),
        ],
    );

    let workspace = tempdir().unwrap();
    let entries = vec![
        "root/NACC001/acq1/a.dcm".to_string(),
        "root/NACC001/acq1/bad.dcm".to_string(),
    ];
    let err = grouper::group_subject(&archive, &entries, workspace.path(), &StubReader)
        .unwrap_err();

    assert!(matches!(err, Error::Metadata { .. }));
}

#[test]
fn test_duplicate_entry_names_join_group_once() {
    let tmp = tempdir().unwrap();
    // Same entry name written twice, which the ZIP format permits
    let archive = build_archive(
        tmp.path(),
        &[
            ("root/NACC001/acq1/a.dcm", "S1|20240101|3"),
            ("root/NACC001/acq1/a.dcm", "S1|20240101|3"),
            ("root/NACC001/acq1/b.dcm", "S1|20240101|3"),
        ],
    );

    let workspace = tempdir().unwrap();
    let entries = vec![
        "root/NACC001/acq1/a.dcm".to_string(),
        "root/NACC001/acq1/a.dcm".to_string(),
        "root/NACC001/acq1/b.dcm".to_string(),
    ];
    let groups =
        grouper::group_subject(&archive, &entries, workspace.path(), &StubReader).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(
        groups["S1"].members,
        vec!["root/NACC001/acq1/a.dcm", "root/NACC001/acq1/b.dcm"]
    );
}

#[test]
fn test_preview_keeps_derive_failures_subject_local() {
    let tmp = tempdir().unwrap();
    let archive = build_archive(
        tmp.path(),
        &[
            // Too few path segments for seg index 1: no acquisition token
            ("NACC001/a.dcm", "S1|20240101|3"),
            ("root/NACC002/acq1/b.dcm", "S2|20240202|5"),
        ],
    );

    let engine = UploadEngine::new(test_config(), &archive, 1);
    let report = engine.preview(&StubReader, &SilentReporter).unwrap();

    assert_eq!(report.subjects.len(), 2);

    let bad = &report.subjects[0];
    assert_eq!(bad.label, "NACC001");
    assert!(bad.groups.is_empty());
    assert!(bad.error.as_deref().unwrap().contains("no segment"));

    // The other subject still previews normally
    let good = &report.subjects[1];
    assert_eq!(good.label, "NACC002");
    assert!(good.error.is_none());
    assert_eq!(good.groups.len(), 1);
    assert_eq!(good.groups[0].bundle, "5-b.zip");
}

#[test]
fn test_preview_reports_bundles_and_hierarchy() {
    let tmp = tempdir().unwrap();
    let archive = build_archive(
        tmp.path(),
        &[
            ("root/NACC001/acq1/a.dcm", "S1|20240101|3"),
            ("root/NACC001/acq1/b.dcm", "S1|20240101|3"),
            ("root/other/c.dcm", "S9|20240101|1"),
        ],
    );

    let engine = UploadEngine::new(test_config(), &archive, 1);
    let report = engine.preview(&StubReader, &SilentReporter).unwrap();

    assert_eq!(report.entries_skipped, 1);
    assert_eq!(report.subjects.len(), 1);

    let subject = &report.subjects[0];
    assert_eq!(subject.label, "NACC001");
    assert_eq!(subject.files, 2);
    assert!(subject.error.is_none());
    assert_eq!(subject.groups.len(), 1);

    let group = &subject.groups[0];
    assert_eq!(group.bundle, "3-a.zip");
    assert_eq!(group.members, 2);
    assert_eq!(group.hierarchy.subject, "NACC001");
    assert_eq!(group.hierarchy.session, "20240101_MRI");
    assert_eq!(group.hierarchy.acquisition, "acq1");
}
