pub mod flywheel;
pub mod memory;

pub use flywheel::FlywheelClient;
pub use memory::MemoryStore;

use crate::error::Error;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerLevel {
    Project,
    Subject,
    Session,
    Acquisition,
}

impl ContainerLevel {
    /// The level nested directly under this one, if any.
    pub fn child(self) -> Option<ContainerLevel> {
        match self {
            ContainerLevel::Project => Some(ContainerLevel::Subject),
            ContainerLevel::Subject => Some(ContainerLevel::Session),
            ContainerLevel::Session => Some(ContainerLevel::Acquisition),
            ContainerLevel::Acquisition => None,
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            ContainerLevel::Project => "projects",
            ContainerLevel::Subject => "subjects",
            ContainerLevel::Session => "sessions",
            ContainerLevel::Acquisition => "acquisitions",
        }
    }

    /// Body key naming the parent when creating a container at this level.
    pub fn parent_key(self) -> &'static str {
        match self {
            ContainerLevel::Project => "group",
            ContainerLevel::Subject => "project",
            ContainerLevel::Session => "subject",
            ContainerLevel::Acquisition => "session",
        }
    }
}

/// Transient handle to a remote container. Never cached beyond one group's
/// processing.
#[derive(Debug, Clone)]
pub struct ContainerRef {
    pub id: String,
    pub label: String,
    pub level: ContainerLevel,
}

/// The three operations the pipeline needs from the remote store, plus
/// project resolution. Implemented by [`FlywheelClient`] for production and
/// [`MemoryStore`] for tests and offline runs.
pub trait RemoteStore: Send + Sync {
    /// First project whose label starts with `label_prefix`.
    fn find_project(&self, label_prefix: &str) -> Result<Option<ContainerRef>, Error>;

    /// Child of `parent` with exactly this label, if present.
    fn find_child(&self, parent: &ContainerRef, label: &str)
        -> Result<Option<ContainerRef>, Error>;

    /// Create a child of `parent` with this label. Returns
    /// [`Error::CreateConflict`] when a concurrent creator won the race.
    fn create_child(&self, parent: &ContainerRef, label: &str) -> Result<ContainerRef, Error>;

    /// Attach a local file to `container` with the given metadata document.
    fn deposit_file(
        &self,
        container: &ContainerRef,
        local_path: &Path,
        file_name: &str,
        metadata: &serde_json::Value,
    ) -> Result<(), Error>;
}
