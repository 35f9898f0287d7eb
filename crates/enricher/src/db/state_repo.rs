//! State repository: per-record progress documents in `processing_state`.
//!
//! Every function is a single statement under the connection lock, so each
//! call is an atomic read-modify-write on its row.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::state::{Phase, ProcessingState, ProcessingStatus, ProductId};

const COLUMNS: &str = "id, status, attempt_count, image_uri, description, last_error, phase, \
                       claimed_by, created_at, started_at, updated_at, completed_at";

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, raw: String) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_ts(idx: usize, raw: Option<String>) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    raw.map(|r| parse_ts(idx, r)).transpose()
}

fn from_row(row: &Row<'_>) -> Result<ProcessingState, rusqlite::Error> {
    let status: String = row.get(1)?;
    let status = status
        .parse::<ProcessingStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    let phase = row
        .get::<_, Option<String>>(6)?
        .map(|raw| raw.parse::<Phase>())
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(ProcessingState {
        id: row.get(0)?,
        status,
        attempt_count: row.get(2)?,
        image_uri: row.get(3)?,
        description: row.get(4)?,
        last_error: row.get(5)?,
        phase,
        claimed_by: row.get(7)?,
        created_at: parse_ts(8, row.get(8)?)?,
        started_at: parse_opt_ts(9, row.get(9)?)?,
        updated_at: parse_ts(10, row.get(10)?)?,
        completed_at: parse_opt_ts(11, row.get(11)?)?,
    })
}

/// Finds the state of a product.
pub fn get(db: &Database, id: ProductId) -> Result<Option<ProcessingState>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {} FROM processing_state WHERE id = ?1", COLUMNS);
        let state = conn
            .query_row(&sql, params![id], from_row)
            .optional()?;
        Ok(state)
    })
}

/// Creates a `pending` document if none exists and returns the current one.
pub fn init_pending(
    db: &Database,
    id: ProductId,
    now: DateTime<Utc>,
) -> Result<ProcessingState, DatabaseError> {
    db.with_conn(|conn| {
        let ts = format_ts(&now);
        conn.execute(
            "INSERT OR IGNORE INTO processing_state
             (id, status, attempt_count, created_at, updated_at)
             VALUES (?1, 'pending', 0, ?2, ?2)",
            params![id, ts],
        )?;
        let sql = format!("SELECT {} FROM processing_state WHERE id = ?1", COLUMNS);
        Ok(conn.query_row(&sql, params![id], from_row)?)
    })
}

/// Writes the full document for `state.id`.
///
/// Returns `false` when the stored row is already terminal; such rows are
/// never overwritten.
pub fn put(db: &Database, state: &ProcessingState) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "INSERT INTO processing_state (id, status, attempt_count, image_uri, description,
             last_error, phase, claimed_by, created_at, started_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
               status = excluded.status,
               attempt_count = excluded.attempt_count,
               image_uri = excluded.image_uri,
               description = excluded.description,
               last_error = excluded.last_error,
               phase = excluded.phase,
               claimed_by = excluded.claimed_by,
               started_at = excluded.started_at,
               updated_at = excluded.updated_at,
               completed_at = excluded.completed_at
             WHERE processing_state.status NOT IN ('completed', 'permanently_failed')",
            params![
                state.id,
                state.status.as_str(),
                state.attempt_count,
                state.image_uri,
                state.description,
                state.last_error,
                state.phase.map(|p| p.as_str()),
                state.claimed_by,
                format_ts(&state.created_at),
                state.started_at.as_ref().map(format_ts),
                format_ts(&state.updated_at),
                state.completed_at.as_ref().map(format_ts),
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Atomically claims a record for `run_id` (compare-and-swap on status).
///
/// Succeeds only for `pending` rows, `failed` rows with attempts left, and
/// `processing` rows left behind by a different run. Exactly one concurrent
/// caller can win a given row.
pub fn claim(
    db: &Database,
    id: ProductId,
    run_id: &str,
    max_attempts: u32,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE processing_state
             SET status = 'processing', claimed_by = ?2, phase = ?5,
                 started_at = ?4, updated_at = ?4
             WHERE id = ?1
               AND attempt_count < ?3
               AND (status IN ('pending', 'failed')
                    OR (status = 'processing'
                        AND (claimed_by IS NULL OR claimed_by <> ?2)))",
            params![
                id,
                run_id,
                max_attempts,
                format_ts(&now),
                Phase::Claimed.as_str()
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Records the step in flight for a record held by `run_id`.
pub fn set_phase(
    db: &Database,
    id: ProductId,
    run_id: &str,
    phase: Phase,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE processing_state SET phase = ?3, updated_at = ?4
             WHERE id = ?1 AND status = 'processing' AND claimed_by = ?2",
            params![id, run_id, phase.as_str(), format_ts(&now)],
        )?;
        Ok(changed == 1)
    })
}

/// Returns all documents with the given status, ordered by id.
pub fn query_by_status(
    db: &Database,
    status: ProcessingStatus,
) -> Result<Vec<ProcessingState>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM processing_state WHERE status = ?1 ORDER BY id",
            COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![status.as_str()], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Returns `failed` documents that still have attempts left.
pub fn retry_eligible(
    db: &Database,
    max_attempts: u32,
) -> Result<Vec<ProcessingState>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM processing_state
             WHERE status = 'failed' AND attempt_count < ?1 ORDER BY id",
            COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![max_attempts], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Returns every document, ordered by id.
pub fn all(db: &Database) -> Result<Vec<ProcessingState>, DatabaseError> {
    db.with_conn(|conn| {
        let sql = format!("SELECT {} FROM processing_state ORDER BY id", COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts documents per status. Statuses with no rows are reported as zero.
pub fn count_by_status(db: &Database) -> Result<Vec<(ProcessingStatus, u64)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut counts: Vec<(ProcessingStatus, u64)> =
            ProcessingStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM processing_state GROUP BY status")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?)))?;
        for row in rows {
            let (status, count) = row?;
            match status.parse::<ProcessingStatus>() {
                Ok(status) => {
                    if let Some(slot) = counts.iter_mut().find(|(s, _)| *s == status) {
                        slot.1 = count;
                    }
                }
                Err(e) => log::warn!("Ignoring {} rows: {}", count, e),
            }
        }
        Ok(counts)
    })
}
