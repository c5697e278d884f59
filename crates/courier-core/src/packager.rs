use crate::error::Error;
use crate::grouper::SeriesGroup;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Filename marker separating the meaningful stem from scanner-appended noise.
const BASE_NAME_DELIMITER: &str = "_br";

/// Deterministic bundle name for a series: `"{series_number}-{base}.zip"`.
///
/// `base` is the representative's file name truncated at the first `_br`;
/// when no `_br` is present, the file stem (extension stripped) is used.
pub fn bundle_name(representative: &str, series_number: i64) -> String {
    let file_name = representative.rsplit('/').next().unwrap_or(representative);
    let base = match file_name.find(BASE_NAME_DELIMITER) {
        Some(idx) => &file_name[..idx],
        None => Path::new(file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(file_name),
    };
    format!("{}-{}.zip", series_number, base)
}

/// Write the group's members into a fresh ZIP inside `workspace`.
///
/// Members are stored under their base file name only; directory structure is
/// flattened. The workspace owns physical deletion of the bundle on teardown.
pub fn pack(group: &SeriesGroup, workspace: &Path) -> Result<PathBuf, Error> {
    let name = bundle_name(&group.representative, group.series_number);
    let bundle_path = workspace.join(&name);

    debug!(series_uid = %group.series_uid, bundle = %name, "Packaging series");

    let file = File::create(&bundle_path)?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for member in &group.members {
        let base = member.rsplit('/').next().unwrap_or(member);
        writer.start_file(base, options)?;
        let mut source = File::open(workspace.join(member))?;
        io::copy(&mut source, &mut writer)?;
    }

    writer.finish()?;
    Ok(bundle_path)
}
