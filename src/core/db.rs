use crate::core::error::LogchainError;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Busy timeout applied to every connection.
const BUSY_TIMEOUT_SECS: u64 = 5;

pub fn db_connect(db_path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    Ok(conn)
}

/// Create parent directories and apply `schema` statements to the DB at `db_path`.
pub fn initialize_db(db_path: &Path, schema: &[&str]) -> Result<(), LogchainError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let conn = db_connect(db_path)?;
    for stmt in schema {
        conn.execute(stmt, [])?;
    }
    Ok(())
}
