//! Append-only storage of report items.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::model::ObjectKind;
use crate::report::{PluginState, ReportItem};

use super::{Database, DatabaseError};

fn item_from_row(row: &Row<'_>) -> Result<ReportItem, rusqlite::Error> {
    let kind: String = row.get("object_kind")?;
    let state: String = row.get("state")?;
    let timestamp: String = row.get("timestamp")?;
    let block_id: Option<i64> = row.get("block_id")?;

    let object_kind = ObjectKind::parse(&kind).map_err(|e| conversion_error(2, e))?;
    let state = PluginState::parse(&state).map_err(|e| conversion_error(3, e))?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(5, e))?;

    Ok(ReportItem {
        object_id: row.get("object_id")?,
        object_kind,
        state,
        details: row.get("details")?,
        timestamp,
        block_id: block_id.map(|id| id as u64),
    })
}

fn conversion_error<E>(column: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

/// Appends a block's items in one transaction, keeping their order.
pub fn append(db: &Database, job_id: &str, items: &[ReportItem]) -> Result<(), DatabaseError> {
    db.with_transaction(|tx| {
        let mut stmt = tx.prepare(
            "INSERT INTO report_items (job_id, block_id, object_id, object_kind, state, details,
             timestamp) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for item in items {
            stmt.execute(params![
                job_id,
                item.block_id.map(|id| id as i64),
                item.object_id,
                item.object_kind.as_str(),
                item.state.as_str(),
                item.details,
                item.timestamp.to_rfc3339(),
            ])?;
        }
        Ok(())
    })
}

/// All items of a job in the order they were appended.
pub fn list(db: &Database, job_id: &str) -> Result<Vec<ReportItem>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT object_id, object_kind, state, details, block_id, timestamp
             FROM report_items WHERE job_id = ?1 ORDER BY seq",
        )?;
        let items = stmt
            .query_map(params![job_id], item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    })
}

pub fn count_by_state(
    db: &Database,
    job_id: &str,
    state: PluginState,
) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM report_items WHERE job_id = ?1 AND state = ?2",
            params![job_id, state.as_str()],
            |r| r.get(0),
        )?)
    })
}
