/// Connection Setup Module
///
/// Opens SQLite connections and applies the pragmas from [`SqliteConfig`].

use crate::config::SqliteConfig;
use crate::core::{RelbindError, Result};
use rusqlite::Connection;
use tracing::debug;

/// Opens a SQLite database and prepares it for use.
///
/// # Arguments
///
/// * `db_path` - Path to the SQLite database file, or ":memory:" for an in-memory database
/// * `config` - Foreign key enforcement and extra pragmas
///
/// # Returns
///
/// The open connection, or `RelbindError::Database` when it cannot be opened
/// and `RelbindError::Config` for a pragma that is not a single statement.
pub fn connect(db_path: &str, config: &SqliteConfig) -> Result<Connection> {
    let conn = Connection::open(db_path)?;

    let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
    apply_pragma(&conn, &format!("foreign_keys = {}", foreign_keys))?;
    for pragma in &config.pragmas {
        apply_pragma(&conn, pragma)?;
    }

    debug!("Connected to database {}", db_path);
    Ok(conn)
}

/// Runs `PRAGMA <pragma>`, discarding any rows it reports back.
fn apply_pragma(conn: &Connection, pragma: &str) -> Result<()> {
    if pragma.contains(';') {
        return Err(RelbindError::Config(format!("Pragma must be a single statement: {:?}", pragma)));
    }
    let mut stmt = conn.prepare(&format!("PRAGMA {}", pragma))?;
    let mut rows = stmt.query([])?;
    while rows.next()?.is_some() {}
    debug!("Applied pragma {}", pragma);
    Ok(())
}
