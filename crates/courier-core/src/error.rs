use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Cannot read header of '{path}': {reason}")]
    Metadata { path: String, reason: String },

    #[error("Remote store error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Container '{0}' was created concurrently")]
    CreateConflict(String),

    #[error("No project found starting with '{0}'")]
    MissingProject(String),

    #[error("Path '{entry}' has no segment at index {index}")]
    SegmentIndex { entry: String, index: usize },

    #[error("Report error: {0}")]
    Report(#[from] csv::Error),

    #[error("{0}")]
    Other(String),
}
