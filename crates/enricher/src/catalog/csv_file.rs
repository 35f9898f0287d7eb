//! Catalog exported as a CSV file with a header row and an `id` column.

use std::io::Read;
use std::path::Path;

use super::{MemoryCatalog, ProductRecord};
use crate::error::SourceError;

const ID_COLUMN: &str = "id";

/// Loads a CSV catalog from disk.
pub fn load(path: &Path) -> Result<MemoryCatalog, SourceError> {
    let file = std::fs::File::open(path).map_err(|e| SourceError::ReadFile {
        path: path.to_path_buf(),
        source: csv::Error::from(e),
    })?;
    let catalog = parse(file, path)?;
    log::info!(
        "Loaded {} products from {}",
        catalog.len(),
        path.display()
    );
    Ok(catalog)
}

/// Parses CSV catalog content. `origin` is only used in error messages.
pub fn parse<R: Read>(reader: R, origin: &Path) -> Result<MemoryCatalog, SourceError> {
    let read_err = |e: csv::Error| SourceError::ReadFile {
        path: origin.to_path_buf(),
        source: e,
    };

    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers().map_err(read_err)?.clone();
    let id_index = headers
        .iter()
        .position(|h| h == ID_COLUMN)
        .ok_or_else(|| SourceError::MissingColumn {
            column: ID_COLUMN.to_string(),
        })?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(read_err)?;
        let raw_id = row.get(id_index).unwrap_or_default();
        let id = raw_id.parse::<i64>().map_err(|e| SourceError::InvalidId {
            value: raw_id.to_string(),
            reason: e.to_string(),
        })?;

        let mut record = ProductRecord::new(id);
        for (index, (header, value)) in headers.iter().zip(row.iter()).enumerate() {
            if index != id_index {
                record.attributes.insert(header.to_string(), value.to_string());
            }
        }
        records.push(record);
    }

    MemoryCatalog::new(records)
}
