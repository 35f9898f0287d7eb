//! The tabular report shared by snapshots and consolidation: one row per
//! product with its attributes and processing outcome.

use std::collections::BTreeSet;
use std::io::Write;

use chrono::SecondsFormat;

use crate::catalog::{Attributes, ProductRecord};
use crate::error::ExportError;
use crate::state::{ProcessingState, ProcessingStatus, ProductId};

const STATE_COLUMNS: &[&str] = &[
    "status",
    "attempt_count",
    "image_uri",
    "description",
    "last_error",
    "updated_at",
];

/// A product joined with its processing state. `state` is `None` for
/// products the orchestrator has not reached yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub id: ProductId,
    pub attributes: Attributes,
    pub state: Option<ProcessingState>,
}

impl ReportRow {
    pub fn new(record: &ProductRecord, state: Option<ProcessingState>) -> Self {
        Self {
            id: record.id,
            attributes: record.attributes.clone(),
            state,
        }
    }

    /// Missing state reads as `pending`.
    pub fn status(&self) -> ProcessingStatus {
        self.state
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(ProcessingStatus::Pending)
    }

    fn state_fields(&self) -> [String; 6] {
        match &self.state {
            Some(s) => [
                s.status.to_string(),
                s.attempt_count.to_string(),
                s.image_uri.clone().unwrap_or_default(),
                s.description.clone().unwrap_or_default(),
                s.last_error.clone().unwrap_or_default(),
                s.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ],
            None => [
                ProcessingStatus::Pending.to_string(),
                "0".to_string(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
            ],
        }
    }
}

/// Attribute columns: the sorted union of attribute names across rows.
fn attribute_columns(rows: &[ReportRow]) -> Vec<&str> {
    rows.iter()
        .flat_map(|r| r.attributes.keys().map(String::as_str))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Header name for an attribute, renamed when it collides with a fixed column.
fn attribute_header(name: &str) -> String {
    if name == "id" || STATE_COLUMNS.contains(&name) {
        format!("attribute_{}", name)
    } else {
        name.to_string()
    }
}

/// Writes rows as CSV: `id`, attribute columns, then the state columns.
pub fn write_csv<W: Write>(writer: W, rows: &[ReportRow]) -> Result<(), ExportError> {
    let columns = attribute_columns(rows);
    let mut csv = csv::Writer::from_writer(writer);

    let mut header = Vec::with_capacity(1 + columns.len() + STATE_COLUMNS.len());
    header.push("id".to_string());
    header.extend(columns.iter().map(|c| attribute_header(c)));
    header.extend(STATE_COLUMNS.iter().map(|c| c.to_string()));
    csv.write_record(&header)?;

    for row in rows {
        let mut fields = Vec::with_capacity(header.len());
        fields.push(row.id.to_string());
        for column in &columns {
            fields.push(row.attributes.get(*column).cloned().unwrap_or_default());
        }
        fields.extend(row.state_fields());
        csv.write_record(&fields)?;
    }

    csv.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Renders rows to an in-memory CSV document.
pub fn to_csv_bytes(rows: &[ReportRow]) -> Result<Vec<u8>, ExportError> {
    let mut buffer = Vec::new();
    write_csv(&mut buffer, rows)?;
    Ok(buffer)
}
