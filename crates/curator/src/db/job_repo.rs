//! CRUD for the `jobs` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw job row. Parameters and source are stored as JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRow {
    pub id: String,
    pub plugin_id: String,
    pub plugin_version: String,
    pub owner: Option<String>,
    pub parameters: String,
    pub source: String,
    pub state: String,
    pub total: u64,
    pub waiting: u64,
    pub processing: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub completion_percentage: u8,
    pub created_at: String,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub updated_at: String,
    pub error: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            plugin_id: row.get("plugin_id")?,
            plugin_version: row.get("plugin_version")?,
            owner: row.get("owner")?,
            parameters: row.get("parameters")?,
            source: row.get("source")?,
            state: row.get("state")?,
            total: row.get("total")?,
            waiting: row.get("waiting")?,
            processing: row.get("processing")?,
            succeeded: row.get("succeeded")?,
            failed: row.get("failed")?,
            completion_percentage: row.get("completion_percentage")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            ended_at: row.get("ended_at")?,
            updated_at: row.get("updated_at")?,
            error: row.get("error")?,
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub state: Option<String>,
    pub plugin_id: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts the row, or overwrites every mutable column of an existing one.
pub fn upsert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, plugin_id, plugin_version, owner, parameters, source, state,
             total, waiting, processing, succeeded, failed, completion_percentage,
             created_at, started_at, ended_at, updated_at, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
             ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                total = excluded.total,
                waiting = excluded.waiting,
                processing = excluded.processing,
                succeeded = excluded.succeeded,
                failed = excluded.failed,
                completion_percentage = excluded.completion_percentage,
                started_at = excluded.started_at,
                ended_at = excluded.ended_at,
                updated_at = excluded.updated_at,
                error = excluded.error",
            params![
                job.id,
                job.plugin_id,
                job.plugin_version,
                job.owner,
                job.parameters,
                job.source,
                job.state,
                job.total,
                job.waiting,
                job.processing,
                job.succeeded,
                job.failed,
                job.completion_percentage,
                job.created_at,
                job.started_at,
                job.ended_at,
                job.updated_at,
                job.error,
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row("SELECT * FROM jobs WHERE id = ?1", params![id], JobRow::from_row)
            .optional()?)
    })
}

/// Queries jobs newest first, returning (rows, total matching).
pub fn query(db: &Database, filter: &JobFilter) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref state) = filter.state {
            conditions.push(format!("state = ?{}", values.len() + 1));
            values.push(Box::new(state.clone()));
        }
        if let Some(ref plugin_id) = filter.plugin_id {
            conditions.push(format!("plugin_id = ?{}", values.len() + 1));
            values.push(Box::new(plugin_id.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let total: u64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM jobs {}", where_clause),
            refs.as_slice(),
            |r| r.get(0),
        )?;

        values.push(Box::new(filter.limit.unwrap_or(100) as i64));
        values.push(Box::new(filter.offset.unwrap_or(0) as i64));
        let sql = format!(
            "SELECT * FROM jobs {} ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            values.len() - 1,
            values.len()
        );
        let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(refs.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Jobs left `CREATED` or `STARTED` by a process that died mid-run.
pub fn find_unfinished(db: &Database) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM jobs WHERE state IN ('CREATED', 'STARTED') ORDER BY created_at",
        )?;
        let rows = stmt
            .query_map([], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
