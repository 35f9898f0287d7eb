//! Exporter (progress snapshots during a run) and Consolidator (final
//! catalog-wide report). Both render the same tabular report.

pub mod consolidate;
pub mod exporter;
pub mod report;

pub use consolidate::{
    consolidate, ConsolidatedReport, ConsolidationOutput, ConsolidationSummary, Consolidator,
};
pub use exporter::Exporter;
pub use report::ReportRow;

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::ExportError;
use crate::storage::ArtifactStore;

/// Directory (and object key prefix) for report files.
pub const EXPORT_PREFIX: &str = "exports";

/// `<stem>_<YYYYmmdd_HHMMSS>.csv`
pub fn report_file_name(stem: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}.csv", stem, at.format("%Y%m%d_%H%M%S"))
}

/// Writes a report under `<output_directory>/exports/` and uploads it to
/// `exports/<file_name>`. The local file is replaced in one rename, so
/// readers never see a partial report. Returns the uploaded URI.
pub(crate) fn write_and_upload(
    output_directory: &Path,
    store: &dyn ArtifactStore,
    file_name: &str,
    content: &[u8],
) -> Result<String, ExportError> {
    let dir = output_directory.join(EXPORT_PREFIX);
    std::fs::create_dir_all(&dir).map_err(|e| ExportError::WriteReport {
        path: dir.clone(),
        source: e,
    })?;
    let path = dir.join(file_name);
    let partial = dir.join(format!(".{}.partial", file_name));
    std::fs::write(&partial, content).map_err(|e| ExportError::WriteReport {
        path: partial.clone(),
        source: e,
    })?;
    std::fs::rename(&partial, &path).map_err(|e| ExportError::WriteReport {
        path: path.clone(),
        source: e,
    })?;

    let key = format!("{}/{}", EXPORT_PREFIX, file_name);
    Ok(store.put(&key, content, "text/csv")?)
}
