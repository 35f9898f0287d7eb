//! Consolidation: a read-only left join of the full catalog against the
//! state store. Never writes processing state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, info_span};

use super::report::{to_csv_bytes, ReportRow};
use super::{report_file_name, write_and_upload, EXPORT_PREFIX};
use crate::catalog::{read_all, CatalogSource};
use crate::db::{state_repo, Database};
use crate::error::{ExportError, Result};
use crate::state::ProcessingStatus;
use crate::storage::ArtifactStore;

/// One row per catalog product, in catalog id order.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedReport {
    pub rows: Vec<ReportRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidationSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub permanently_failed: usize,
    pub pending: usize,
    pub processing: usize,
}

impl ConsolidatedReport {
    pub fn summary(&self) -> ConsolidationSummary {
        let mut summary = ConsolidationSummary {
            total: self.rows.len(),
            ..Default::default()
        };
        for row in &self.rows {
            match row.status() {
                ProcessingStatus::Completed => summary.completed += 1,
                ProcessingStatus::Failed => summary.failed += 1,
                ProcessingStatus::PermanentlyFailed => summary.permanently_failed += 1,
                ProcessingStatus::Pending => summary.pending += 1,
                ProcessingStatus::Processing => summary.processing += 1,
            }
        }
        summary
    }

    pub fn to_csv(&self) -> std::result::Result<Vec<u8>, ExportError> {
        to_csv_bytes(&self.rows)
    }
}

/// Joins every catalog product with its state. Products without state are
/// kept (reported as pending); state rows without a product are dropped.
pub fn consolidate(
    catalog: &dyn CatalogSource,
    db: &Database,
    page_size: usize,
) -> Result<ConsolidatedReport> {
    let records = read_all(catalog, page_size)?;
    let mut states: HashMap<_, _> = state_repo::all(db)?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let rows: Vec<ReportRow> = records
        .iter()
        .map(|record| ReportRow::new(record, states.remove(&record.id)))
        .collect();

    if !states.is_empty() {
        debug!(
            orphaned = states.len(),
            "State rows without a catalog product were left out"
        );
    }

    Ok(ConsolidatedReport { rows })
}

/// Result of a consolidation pass.
#[derive(Debug, Clone)]
pub struct ConsolidationOutput {
    pub local_path: PathBuf,
    pub uri: String,
    pub summary: ConsolidationSummary,
}

/// Builds the consolidated report and publishes it as
/// `exports/consolidated_products_<timestamp>.csv`.
pub struct Consolidator {
    db: Database,
    catalog: Arc<dyn CatalogSource>,
    store: Arc<dyn ArtifactStore>,
    output_directory: PathBuf,
    page_size: usize,
}

impl Consolidator {
    pub fn new(
        db: Database,
        catalog: Arc<dyn CatalogSource>,
        store: Arc<dyn ArtifactStore>,
        output_directory: impl AsRef<Path>,
        page_size: usize,
    ) -> Self {
        Self {
            db,
            catalog,
            store,
            output_directory: output_directory.as_ref().to_path_buf(),
            page_size: page_size.max(1),
        }
    }

    pub fn run(&self) -> Result<ConsolidationOutput> {
        let _span = info_span!("consolidate").entered();

        let report = consolidate(self.catalog.as_ref(), &self.db, self.page_size)?;
        let summary = report.summary();
        let content = report.to_csv()?;

        let file_name = report_file_name("consolidated_products", Utc::now());
        let uri = write_and_upload(
            &self.output_directory,
            self.store.as_ref(),
            &file_name,
            &content,
        )?;

        info!(
            total = summary.total,
            completed = summary.completed,
            failed = summary.failed,
            permanently_failed = summary.permanently_failed,
            pending = summary.pending,
            processing = summary.processing,
            uri = %uri,
            "Consolidated report published"
        );

        Ok(ConsolidationOutput {
            local_path: self.output_directory.join(EXPORT_PREFIX).join(file_name),
            uri,
            summary,
        })
    }
}
