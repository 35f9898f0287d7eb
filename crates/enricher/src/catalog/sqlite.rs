//! Catalog stored as a table in an SQLite database.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags};

use super::{CatalogSource, ProductRecord};
use crate::error::SourceError;
use crate::state::ProductId;

pub struct SqliteCatalog {
    conn: Mutex<Connection>,
    table: String,
}

/// Only plain identifiers are interpolated into SQL.
pub fn is_valid_table_name(table: &str) -> bool {
    !table.is_empty()
        && !table.starts_with(|c: char| c.is_ascii_digit())
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl SqliteCatalog {
    /// Opens the catalog read-only.
    pub fn open(path: &Path, table: &str) -> Result<Self, SourceError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Self::from_connection(conn, table)
    }

    pub fn from_connection(conn: Connection, table: &str) -> Result<Self, SourceError> {
        if !is_valid_table_name(table) {
            return Err(SourceError::InvalidTable(table.to_string()));
        }

        let has_id: bool = conn
            .prepare(&format!("PRAGMA table_info({})", table))?
            .query_map([], |row| row.get::<_, String>(1))?
            .any(|r| r.map(|name| name == "id").unwrap_or(false));
        if !has_id {
            return Err(SourceError::MissingColumn {
                column: "id".to_string(),
            });
        }

        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }
}

fn value_to_string(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        // Binary columns are not generation input.
        ValueRef::Blob(_) => None,
    }
}

impl CatalogSource for SqliteCatalog {
    fn fetch_batch(
        &self,
        after_id: Option<ProductId>,
        limit: usize,
    ) -> Result<Vec<ProductRecord>, SourceError> {
        let conn = self.conn.lock().map_err(|_| SourceError::LockPoisoned)?;
        let sql = format!(
            "SELECT * FROM {} WHERE id > ?1 ORDER BY id LIMIT ?2",
            self.table
        );
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let after = after_id.unwrap_or(i64::MIN);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = stmt.query(params![after, limit])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut id = None;
            let mut record = ProductRecord::new(0);
            for (index, column) in columns.iter().enumerate() {
                let value = row.get_ref(index)?;
                if column == "id" {
                    id = Some(match value {
                        ValueRef::Integer(i) => i,
                        other => {
                            let raw = value_to_string(other).unwrap_or_default();
                            raw.parse::<i64>().map_err(|e| SourceError::InvalidId {
                                value: raw.clone(),
                                reason: e.to_string(),
                            })?
                        }
                    });
                } else if let Some(text) = value_to_string(value) {
                    record.attributes.insert(column.clone(), text);
                }
            }
            record.id = id.ok_or_else(|| SourceError::MissingColumn {
                column: "id".to_string(),
            })?;
            records.push(record);
        }

        Ok(records)
    }
}
