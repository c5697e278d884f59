use crate::engine::RunSummary;
use crate::error::Error;
use chrono::Utc;
use std::path::Path;
use tracing::info;

/// Write per-group outcomes to a CSV file, one row per bundle attempted.
pub fn write_report(path: &Path, summary: &RunSummary) -> Result<(), Error> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["timestamp", "subject", "series_uid", "bundle", "action", "error"])?;

    let timestamp = Utc::now().to_rfc3339();
    for outcome in &summary.outcomes {
        writer.write_record([
            timestamp.as_str(),
            outcome.subject.as_str(),
            outcome.series_uid.as_str(),
            outcome.bundle.as_str(),
            outcome.action.as_str(),
            outcome.error.as_deref().unwrap_or(""),
        ])?;
    }

    writer.flush()?;
    info!("Run report written to {}", path.display());
    Ok(())
}
