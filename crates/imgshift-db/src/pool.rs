//! SQLite connection pooling.
//!
//! Both pools run pending schema steps before they are handed out, so callers
//! can query `images` straight away.

use imgshift_common::{Error, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::migrations;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Connections for a file database. Migration workers read pages while a
/// batch commit writes, so a handful is enough.
const FILE_POOL_SIZE: u32 = 4;

fn session_pragmas(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
}

fn build(manager: SqliteConnectionManager, size: u32) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(size)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to open database: {}", e)))?;

    let conn = get_conn(&pool)?;
    let applied = migrations::run_migrations(&conn)
        .map_err(|e| Error::database(format!("Failed to migrate schema: {}", e)))?;
    if applied > 0 {
        tracing::debug!(applied, "Database schema updated");
    }
    drop(conn);

    Ok(pool)
}

/// Open (or create) the database at `db_path` in WAL mode.
///
/// ```no_run
/// let pool = imgshift_db::pool::init_pool("/var/lib/app/images.db").unwrap();
/// ```
pub fn init_pool(db_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        session_pragmas(conn)?;
        conn.pragma_update(None, "journal_mode", "WAL")
    });
    build(manager, FILE_POOL_SIZE)
}

/// Single-connection in-memory database.
///
/// Each in-memory connection is a separate database, so only one connection
/// may exist. Release it before asking for another.
pub fn init_memory_pool() -> Result<DbPool> {
    build(
        SqliteConnectionManager::memory().with_init(session_pragmas),
        1,
    )
}

pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("No database connection available: {}", e)))
}
