use crate::error::Error;
use dicom_core::Tag;
use dicom_object::{DefaultDicomObject, OpenFileOptions};
use std::path::Path;

const SERIES_INSTANCE_UID: Tag = Tag(0x0020, 0x000E);
const STUDY_DATE: Tag = Tag(0x0008, 0x0020);
const SERIES_NUMBER: Tag = Tag(0x0020, 0x0011);
const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);

/// The three header fields the pipeline groups and names by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub series_uid: String,
    pub study_date: String,
    pub series_number: i64,
}

/// Seam between the pipeline and the file format. Production uses
/// [`DicomHeaderReader`]; tests substitute a stub.
pub trait HeaderReader: Send + Sync {
    fn read_header(&self, path: &Path) -> Result<FileMetadata, Error>;
}

/// Reads DICOM headers up to (not including) pixel data.
pub struct DicomHeaderReader;

impl HeaderReader for DicomHeaderReader {
    fn read_header(&self, path: &Path) -> Result<FileMetadata, Error> {
        let obj = OpenFileOptions::new()
            .read_until(PIXEL_DATA)
            .open_file(path)
            .map_err(|e| metadata_error(path, e))?;

        let series_uid = element_str(&obj, SERIES_INSTANCE_UID, path)?;
        let study_date = element_str(&obj, STUDY_DATE, path)?;

        let series_number = obj
            .element(SERIES_NUMBER)
            .map_err(|e| metadata_error(path, e))?
            .to_int::<i64>()
            .map_err(|e| metadata_error(path, e))?;

        Ok(FileMetadata {
            series_uid,
            study_date,
            series_number,
        })
    }
}

fn element_str(obj: &DefaultDicomObject, tag: Tag, path: &Path) -> Result<String, Error> {
    let value = obj
        .element(tag)
        .map_err(|e| metadata_error(path, e))?
        .to_str()
        .map_err(|e| metadata_error(path, e))?;
    // UID values are commonly padded to even length with a trailing NUL
    Ok(value.trim_end_matches('\0').trim().to_string())
}

fn metadata_error(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::Metadata {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}
