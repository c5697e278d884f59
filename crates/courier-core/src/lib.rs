pub mod config;
pub mod engine;
pub mod error;
pub mod grouper;
pub mod metadata;
pub mod packager;
pub mod progress;
pub mod remote;
pub mod report;
pub mod scanner;
pub mod sync;

pub use config::AppConfig;
pub use engine::{GroupOutcome, OutcomeAction, PreviewReport, RunSummary, UploadEngine};
pub use error::Error;
pub use metadata::{DicomHeaderReader, FileMetadata, HeaderReader};
pub use progress::{ProgressReporter, SilentReporter};
pub use remote::{ContainerLevel, ContainerRef, RemoteStore};
pub use sync::HierarchyPath;
