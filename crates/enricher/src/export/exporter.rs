use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, info_span, warn};

use super::report::{to_csv_bytes, ReportRow};
use super::{report_file_name, write_and_upload};
use crate::catalog::ProductRecord;
use crate::error::ExportError;
use crate::pipeline::{RunObserver, RunSummary};
use crate::state::{ProcessingState, ProductId};
use crate::storage::ArtifactStore;

#[derive(Default)]
struct Progress {
    rows: BTreeMap<ProductId, ReportRow>,
    concluded: usize,
}

/// Collects the records concluded during one run and periodically writes
/// them as `exports/processed_products_<run start>.csv`.
///
/// Snapshots are observational: failures are logged and never reach the
/// orchestrator. Workers may conclude records concurrently; snapshots are
/// serialized so the file and the upload always hold one complete report.
pub struct Exporter {
    store: Arc<dyn ArtifactStore>,
    output_directory: PathBuf,
    file_name: String,
    snapshot_every: usize,
    progress: Mutex<Progress>,
    writing: Mutex<()>,
}

impl Exporter {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        output_directory: impl AsRef<Path>,
        snapshot_every: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            store,
            output_directory: output_directory.as_ref().to_path_buf(),
            file_name: report_file_name("processed_products", started_at),
            snapshot_every: snapshot_every.max(1),
            progress: Mutex::new(Progress::default()),
            writing: Mutex::new(()),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Writes and uploads the rows collected so far.
    pub fn snapshot(&self) -> Result<String, ExportError> {
        // Rows are read under the write lock so a later snapshot never
        // lands before an earlier, smaller one.
        let _writing = self.writing.lock().unwrap_or_else(|p| p.into_inner());
        let rows: Vec<ReportRow> = {
            let progress = self.progress.lock().unwrap_or_else(|p| p.into_inner());
            progress.rows.values().cloned().collect()
        };
        let _span = info_span!("export_snapshot", rows = rows.len()).entered();

        let content = to_csv_bytes(&rows)?;
        let uri = write_and_upload(
            &self.output_directory,
            self.store.as_ref(),
            &self.file_name,
            &content,
        )?;
        debug!(uri = %uri, "Snapshot uploaded");
        Ok(uri)
    }

    fn snapshot_or_warn(&self) {
        if let Err(e) = self.snapshot() {
            warn!(error = %e, file = %self.file_name, "Snapshot export failed, continuing");
        }
    }
}

impl RunObserver for Exporter {
    fn record_concluded(&self, record: &ProductRecord, state: &ProcessingState) {
        let due = {
            let mut progress = self.progress.lock().unwrap_or_else(|p| p.into_inner());
            progress
                .rows
                .insert(record.id, ReportRow::new(record, Some(state.clone())));
            progress.concluded += 1;
            progress.concluded % self.snapshot_every == 0
        };
        if due {
            self.snapshot_or_warn();
        }
    }

    fn run_finished(&self, summary: &RunSummary) {
        let empty = self
            .progress
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .rows
            .is_empty();
        if empty {
            debug!("No records concluded, skipping final snapshot");
            return;
        }
        match self.snapshot() {
            Ok(uri) => info!(
                uri = %uri,
                completed = summary.completed,
                failed = summary.failed,
                permanently_failed = summary.permanently_failed,
                "Final snapshot exported"
            ),
            Err(e) => warn!(error = %e, "Final snapshot export failed"),
        }
    }
}
