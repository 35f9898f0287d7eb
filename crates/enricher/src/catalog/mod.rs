//! Source Reader over the authoritative product catalog.
//!
//! The catalog is read-only to this crate and is always paged in ascending
//! id order so a run can resume from any point.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::config::CatalogConfig;
use crate::error::SourceError;
use crate::state::ProductId;

pub mod csv_file;
pub mod memory;
pub mod sqlite;

pub use memory::MemoryCatalog;
pub use sqlite::SqliteCatalog;

/// Product fields keyed by column name.
pub type Attributes = BTreeMap<String, String>;

/// One immutable catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRecord {
    pub id: ProductId,
    /// Product fields used as generation input.
    pub attributes: Attributes,
}

impl ProductRecord {
    pub fn new(id: ProductId) -> Self {
        Self {
            id,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        attribute(&self.attributes, key)
    }
}

/// Looks up a non-empty attribute value.
pub fn attribute<'a>(attributes: &'a Attributes, key: &str) -> Option<&'a str> {
    attributes
        .get(key)
        .map(|v| v.as_str())
        .filter(|v| !v.is_empty())
}

/// Deterministic pagination over the catalog.
pub trait CatalogSource: Send + Sync {
    /// Returns up to `limit` records with id strictly greater than
    /// `after_id` (or from the start when `None`), in ascending id order.
    fn fetch_batch(
        &self,
        after_id: Option<ProductId>,
        limit: usize,
    ) -> Result<Vec<ProductRecord>, SourceError>;
}

/// Reads the whole catalog page by page.
pub fn read_all(
    source: &dyn CatalogSource,
    page_size: usize,
) -> Result<Vec<ProductRecord>, SourceError> {
    let page_size = page_size.max(1);
    let mut records = Vec::new();
    let mut after = None;
    loop {
        let page = source.fetch_batch(after, page_size)?;
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.id);
        let short = page.len() < page_size;
        records.extend(page);
        if short {
            break;
        }
    }
    Ok(records)
}

/// Opens the catalog described by the configuration.
pub fn open(config: &CatalogConfig) -> Result<Box<dyn CatalogSource>, SourceError> {
    match config {
        CatalogConfig::Sqlite { path, table } => {
            Ok(Box::new(SqliteCatalog::open(Path::new(path), table)?))
        }
        CatalogConfig::Csv { path } => Ok(Box::new(csv_file::load(Path::new(path))?)),
    }
}
