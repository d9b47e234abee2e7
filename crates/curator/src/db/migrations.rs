//! Versioned schema migrations.
//!
//! Applied versions are recorded in `_migrations`. Each pending migration
//! runs in its own transaction together with its bookkeeping row, so a
//! failed step leaves the schema at the previous version.

use chrono::Utc;
use rusqlite::{params, Connection, Transaction};

use super::error::DatabaseError;

enum Step {
    Script,
    /// `ALTER TABLE .. ADD COLUMN`, a no-op when the column already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
    step: Step,
}

impl Migration {
    fn apply(&self, tx: &Transaction<'_>) -> Result<(), DatabaseError> {
        let needed = match self.step {
            Step::Script => true,
            Step::AddColumn { table, column } => !column_exists(tx, table, column)?,
        };
        if needed {
            tx.execute_batch(self.sql)
                .map_err(|e| DatabaseError::Migration {
                    version: self.version,
                    reason: e.to_string(),
                })?;
        } else {
            log::debug!("Migration v{} has nothing to do", self.version);
        }

        tx.execute(
            "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![self.version, self.name, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "jobs",
        sql: include_str!("sql/001_create_jobs.sql"),
        step: Step::Script,
    },
    Migration {
        version: 2,
        name: "report_items",
        sql: include_str!("sql/002_create_report_items.sql"),
        step: Step::Script,
    },
    Migration {
        version: 3,
        name: "jobs_error_column",
        sql: include_str!("sql/003_add_error_to_jobs.sql"),
        step: Step::AddColumn {
            table: "jobs",
            column: "error",
        },
    },
];

pub fn latest_version() -> u32 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Version of the newest applied migration, 0 for an empty database.
pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;
    Ok(conn.query_row("SELECT IFNULL(MAX(version), 0) FROM _migrations", [], |row| {
        row.get(0)
    })?)
}

pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    let from = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > from).collect();
    if pending.is_empty() {
        return Ok(());
    }

    for migration in pending {
        log::info!("Applying migration v{} ({})", migration.version, migration.name);
        let tx = conn.unchecked_transaction()?;
        migration.apply(&tx)?;
        tx.commit()?;
    }
    log::info!("Job database schema at v{}", latest_version());
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
