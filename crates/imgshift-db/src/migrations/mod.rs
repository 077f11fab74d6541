//! Embedded schema migrations.
//!
//! Each step is a SQL script compiled into the binary. Applied steps are
//! recorded in `schema_migrations`, so opening an existing database only runs
//! the scripts it has not seen yet.

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Schema bookkeeping failed: {0}")]
    Bookkeeping(#[from] rusqlite::Error),

    #[error("Schema step {version} ({name}) failed: {source}")]
    Step {
        version: u32,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

struct SchemaStep {
    version: u32,
    name: &'static str,
    script: &'static str,
}

const STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    name: "images",
    script: include_str!("001_images.sql"),
}];

const BOOKKEEPING: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

fn applied_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.execute(BOOKKEEPING, [])?;
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

fn apply(conn: &Connection, step: &SchemaStep) -> Result<(), MigrationError> {
    let failed = |source| MigrationError::Step {
        version: step.version,
        name: step.name,
        source,
    };

    let tx = conn.unchecked_transaction().map_err(failed)?;
    tx.execute_batch(step.script).map_err(failed)?;
    tx.execute(
        "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
        params![step.version, step.name],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}

/// Bring the schema up to date, returning how many steps were applied.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    let from = applied_version(conn)?;

    let mut applied = 0;
    for step in STEPS.iter().filter(|s| s.version > from) {
        apply(conn, step)?;
        tracing::info!(version = step.version, name = step.name, "Applied schema step");
        applied += 1;
    }

    if applied == 0 {
        tracing::debug!(version = from, "Schema is current");
    }
    Ok(applied)
}

/// Highest schema version recorded in the database.
pub fn current_version(conn: &Connection) -> Result<u32, MigrationError> {
    Ok(applied_version(conn)?)
}

/// Highest schema version this build knows about.
pub fn latest_version() -> u32 {
    STEPS.iter().map(|s| s.version).max().unwrap_or(0)
}
