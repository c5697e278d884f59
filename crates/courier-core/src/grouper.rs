use crate::error::Error;
use crate::metadata::{FileMetadata, HeaderReader};
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use zip::ZipArchive;

/// One imaging series within a subject. `study_date` and `series_number`
/// are the first member's values; later members are not reconciled.
#[derive(Debug, Clone)]
pub struct SeriesGroup {
    pub series_uid: String,
    /// First entry appended, used for naming and hierarchy derivation.
    pub representative: String,
    pub study_date: String,
    pub series_number: i64,
    pub members: Vec<String>,
}

/// Materialize one subject's entries into `workspace` and partition them by
/// SeriesInstanceUID.
///
/// Header reads run in parallel; grouping folds in scan order so the "first
/// member" of each series stays deterministic. Any unreadable header fails
/// the whole subject — partial results are discarded.
pub fn group_subject<R>(
    archive_path: &Path,
    entries: &[String],
    workspace: &Path,
    reader: &R,
) -> Result<BTreeMap<String, SeriesGroup>, Error>
where
    R: HeaderReader + ?Sized,
{
    let extracted = extract_entries(archive_path, entries, workspace)?;

    let header_map: DashMap<&str, FileMetadata> = DashMap::new();
    extracted.par_iter().try_for_each(|(entry, local_path)| {
        let meta = reader.read_header(local_path)?;
        header_map.insert(entry.as_str(), meta);
        Ok::<_, Error>(())
    })?;

    let mut groups: BTreeMap<String, SeriesGroup> = BTreeMap::new();
    for (entry, _) in &extracted {
        let Some((_, meta)) = header_map.remove(entry.as_str()) else {
            // A ZIP may legally repeat an entry name; only one file exists
            // behind it, so only the first occurrence joins a group
            warn!(entry = %entry, "Duplicate archive entry name; keeping first occurrence");
            continue;
        };

        match groups.entry(meta.series_uid.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(SeriesGroup {
                    series_uid: meta.series_uid,
                    representative: entry.clone(),
                    study_date: meta.study_date,
                    series_number: meta.series_number,
                    members: vec![entry.clone()],
                });
            }
            Entry::Occupied(mut occupied) => {
                let group = occupied.get_mut();
                if group.study_date != meta.study_date
                    || group.series_number != meta.series_number
                {
                    warn!(
                        series_uid = %group.series_uid,
                        entry = %entry,
                        "Inconsistent date/number within series; keeping first member's values"
                    );
                }
                group.members.push(entry.clone());
            }
        }
    }

    Ok(groups)
}

/// Extract the given entries under `workspace`, preserving archive-relative
/// paths. Returns (entry, local path) pairs in scan order.
fn extract_entries(
    archive_path: &Path,
    entries: &[String],
    workspace: &Path,
) -> Result<Vec<(String, PathBuf)>, Error> {
    let file = File::open(archive_path)?;
    let mut zip = ZipArchive::new(file)?;

    let mut extracted = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut zip_file = zip.by_name(entry)?;
        let relative = zip_file
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::Other(format!("Unsafe path in archive: {}", entry)))?;

        let local_path = workspace.join(relative);
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&local_path)?;
        io::copy(&mut zip_file, &mut out)?;

        extracted.push((entry.clone(), local_path));
    }

    Ok(extracted)
}
