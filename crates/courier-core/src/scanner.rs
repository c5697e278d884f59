use glob::Pattern;
use std::collections::BTreeMap;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::{error, warn};
use zip::ZipArchive;

/// Subject label → entry paths, in archive scan order within each bucket.
/// BTreeMap so subjects come out in a deterministic order.
pub type SubjectBuckets = BTreeMap<String, Vec<String>>;

#[derive(Debug)]
pub struct ScanOutcome {
    pub buckets: SubjectBuckets,
    /// DICOM entries that landed in a bucket.
    pub total_matched: usize,
    /// DICOM entries whose path carried no subject-marker token.
    pub skipped_no_marker: usize,
    /// Entries excluded by an ignore glob.
    pub skipped_ignored: usize,
}

pub fn compile_patterns(globs: &[String]) -> Vec<Pattern> {
    globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect()
}

/// Partition archive entries into subject buckets.
///
/// Entries are visited in index (central directory) order, not via
/// `file_names()`, whose HashMap iteration order varies per process — the
/// first entry of a bucket is the series representative downstream, so scan
/// order must be reproducible.
///
/// Keeps entries whose extension is `.dcm` (case-insensitive); everything else
/// is skipped silently. The subject label is the first `/`-separated path
/// token containing `marker`; entries with no such token are dropped with a
/// warning.
pub fn scan_archive<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    marker: &str,
    ignore_patterns: &[Pattern],
) -> ScanOutcome {
    let mut outcome = ScanOutcome {
        buckets: BTreeMap::new(),
        total_matched: 0,
        skipped_no_marker: 0,
        skipped_ignored: 0,
    };

    for index in 0..zip.len() {
        let Ok(entry) = zip.by_index_raw(index) else {
            continue;
        };
        let name = entry.name();
        if !has_dcm_extension(name) {
            continue;
        }

        if ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(Path::new(name)))
        {
            outcome.skipped_ignored += 1;
            continue;
        }

        let subject_label = name.split('/').find(|segment| segment.contains(marker));
        match subject_label {
            Some(label) => {
                outcome
                    .buckets
                    .entry(label.to_string())
                    .or_default()
                    .push(name.to_string());
                outcome.total_matched += 1;
            }
            None => {
                warn!("No {} token in entry path: {}", marker, name);
                outcome.skipped_no_marker += 1;
            }
        }
    }

    outcome
}

fn has_dcm_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("dcm"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn archive_of(names: &[&str]) -> ZipArchive<Cursor<Vec<u8>>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for name in names {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(b"x").unwrap();
        }
        let cursor = writer.finish().unwrap();
        ZipArchive::new(cursor).unwrap()
    }

    #[test]
    fn test_buckets_by_first_marker_token() {
        let mut zip = archive_of(&[
            "root/NACC001/acq1/a.dcm",
            "root/NACC001/acq1/b.dcm",
            "root/NACC002/acq1/c.dcm",
        ]);
        let outcome = scan_archive(&mut zip, "NACC", &[]);

        assert_eq!(outcome.buckets.len(), 2);
        assert_eq!(
            outcome.buckets["NACC001"],
            vec![
                "root/NACC001/acq1/a.dcm".to_string(),
                "root/NACC001/acq1/b.dcm".to_string(),
            ]
        );
        assert_eq!(outcome.buckets["NACC002"].len(), 1);
        assert_eq!(outcome.total_matched, 3);
        assert_eq!(outcome.skipped_no_marker, 0);
    }

    #[test]
    fn test_bucket_preserves_archive_entry_order() {
        let names = [
            "root/NACC001/acq1/a.dcm",
            "root/NACC001/acq1/b.dcm",
            "root/NACC001/acq1/c.dcm",
            "root/NACC001/acq1/d.dcm",
            "root/NACC001/acq1/e.dcm",
        ];
        let mut zip = archive_of(&names);

        // Repeated scans of the same archive must agree on the first entry;
        // it becomes the series representative downstream
        for _ in 0..3 {
            let outcome = scan_archive(&mut zip, "NACC", &[]);
            assert_eq!(outcome.buckets["NACC001"], names);
        }
    }

    #[test]
    fn test_non_dicom_entries_skipped_silently() {
        let mut zip = archive_of(&[
            "root/NACC001/acq1/a.dcm",
            "root/NACC001/acq1/notes.txt",
            "root/NACC001/acq1/",
        ]);
        let outcome = scan_archive(&mut zip, "NACC", &[]);
        assert_eq!(outcome.total_matched, 1);
        assert_eq!(outcome.skipped_no_marker, 0);
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let mut zip = archive_of(&["root/NACC001/acq1/a.DCM"]);
        let outcome = scan_archive(&mut zip, "NACC", &[]);
        assert_eq!(outcome.total_matched, 1);
    }

    #[test]
    fn test_no_marker_token_drops_entry_with_warning() {
        let mut zip = archive_of(&["root/misc/acq1/a.dcm"]);
        let outcome = scan_archive(&mut zip, "NACC", &[]);
        assert!(outcome.buckets.is_empty());
        assert_eq!(outcome.skipped_no_marker, 1);
    }

    #[test]
    fn test_ignore_patterns_exclude_entries() {
        let mut zip = archive_of(&[
            "root/NACC001/localizer/a.dcm",
            "root/NACC001/acq1/b.dcm",
        ]);
        let patterns = compile_patterns(&["**/localizer/**".to_string()]);
        let outcome = scan_archive(&mut zip, "NACC", &patterns);
        assert_eq!(outcome.total_matched, 1);
        assert_eq!(outcome.skipped_ignored, 1);
        assert_eq!(outcome.buckets["NACC001"], vec!["root/NACC001/acq1/b.dcm"]);
    }

    #[test]
    fn test_invalid_glob_is_dropped_not_fatal() {
        let patterns = compile_patterns(&["[".to_string(), "*.bak".to_string()]);
        assert_eq!(patterns.len(), 1);
    }
}
