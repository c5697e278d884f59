use crate::config::AppConfig;
use crate::error::Error;
use crate::remote::{ContainerRef, RemoteStore};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Fixed suffix appended to the study date when labeling a session.
const SESSION_SUFFIX: &str = "_MRI";

/// Metadata document attached to every deposited bundle.
fn deposit_metadata() -> serde_json::Value {
    serde_json::json!({ "type": "dicom" })
}

/// Labels of the three container levels a group lands under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyPath {
    pub subject: String,
    pub session: String,
    pub acquisition: String,
}

impl HierarchyPath {
    /// Derive labels from the representative entry's path: subject at
    /// `seg_index`, acquisition at `seg_index + 1`, session from the study
    /// date plus the fixed suffix.
    pub fn derive(representative: &str, seg_index: usize, study_date: &str) -> Result<Self, Error> {
        let segments: Vec<&str> = representative.split('/').collect();

        let segment_at = |index: usize| -> Result<&str, Error> {
            segments.get(index).copied().ok_or(Error::SegmentIndex {
                entry: representative.to_string(),
                index,
            })
        };

        Ok(Self {
            subject: segment_at(seg_index)?.to_string(),
            session: format!("{}{}", study_date, SESSION_SUFFIX),
            acquisition: segment_at(seg_index + 1)?.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// No sleeping between attempts. For tests.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff: Duration::ZERO,
        }
    }
}

/// Ensure subject → session → acquisition exist under `project`, creating
/// each missing level, then attach the bundle to the acquisition.
///
/// Lookup always precedes create, so re-running against the same archive
/// never duplicates containers.
pub fn deposit<S>(
    store: &S,
    project: &ContainerRef,
    path: &HierarchyPath,
    bundle: &Path,
    retry: &RetryPolicy,
) -> Result<(), Error>
where
    S: RemoteStore + ?Sized,
{
    let subject = resolve_child(store, project, &path.subject, retry)?;
    let session = resolve_child(store, &subject, &path.session, retry)?;
    let acquisition = resolve_child(store, &session, &path.acquisition, retry)?;

    let file_name = bundle
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::Other(format!("Bundle has no file name: {}", bundle.display())))?;

    with_retry(retry, || {
        store.deposit_file(&acquisition, bundle, file_name, &deposit_metadata())
    })
}

/// Find `label` under `parent`, or create it. A create conflict means a
/// concurrent creator won; the winner's container is looked up again.
fn resolve_child<S>(
    store: &S,
    parent: &ContainerRef,
    label: &str,
    retry: &RetryPolicy,
) -> Result<ContainerRef, Error>
where
    S: RemoteStore + ?Sized,
{
    if let Some(existing) = with_retry(retry, || store.find_child(parent, label))? {
        return Ok(existing);
    }

    info!(label, parent = %parent.label, "Creating container");
    match with_retry(retry, || store.create_child(parent, label)) {
        Ok(created) => Ok(created),
        Err(Error::CreateConflict(_)) => {
            warn!(label, "Create conflicted; re-reading winner");
            with_retry(retry, || store.find_child(parent, label))?.ok_or_else(|| {
                Error::Remote(format!(
                    "Container '{}' conflicted on create but cannot be found",
                    label
                ))
            })
        }
        Err(other) => Err(other),
    }
}

/// Bounded retry with linear backoff. Create conflicts are not retried;
/// the caller resolves them by re-reading.
fn with_retry<T, F>(retry: &RetryPolicy, mut call: F) -> Result<T, Error>
where
    F: FnMut() -> Result<T, Error>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call() {
            Ok(value) => return Ok(value),
            Err(conflict @ Error::CreateConflict(_)) => return Err(conflict),
            Err(err) if attempt < retry.attempts => {
                warn!(
                    "Remote call failed (attempt {}/{}): {}",
                    attempt, retry.attempts, err
                );
                thread::sleep(retry.backoff * attempt);
            }
            Err(err) => return Err(err),
        }
    }
}
