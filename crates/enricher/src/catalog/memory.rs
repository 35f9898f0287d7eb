//! Catalog held in memory, sorted by id.

use std::collections::HashSet;

use super::{CatalogSource, ProductRecord};
use crate::error::SourceError;
use crate::state::ProductId;

#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    records: Vec<ProductRecord>,
}

impl MemoryCatalog {
    /// Builds a catalog from records in any order. Ids must be unique.
    pub fn new(mut records: Vec<ProductRecord>) -> Result<Self, SourceError> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.id) {
                return Err(SourceError::DuplicateId(record.id));
            }
        }
        records.sort_by_key(|r| r.id);
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl CatalogSource for MemoryCatalog {
    fn fetch_batch(
        &self,
        after_id: Option<ProductId>,
        limit: usize,
    ) -> Result<Vec<ProductRecord>, SourceError> {
        let start = match after_id {
            Some(after) => self.records.partition_point(|r| r.id <= after),
            None => 0,
        };
        Ok(self.records.iter().skip(start).take(limit).cloned().collect())
    }
}
