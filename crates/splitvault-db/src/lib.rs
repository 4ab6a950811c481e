//! # splitvault-db
//!
//! SQLite persistence for the split ledger daemon: one file,
//! `splitvault.db`, under the daemon's data directory.
//!
//! Connections run in WAL mode with foreign keys on and `synchronous = FULL`.
//! Ids are 32-byte BLOBs, amounts are INTEGER and never exceed `i64::MAX`,
//! times are Unix seconds. `PRAGMA user_version` tracks the schema.

pub mod migrations;
pub mod queries;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// Database file name inside the data directory.
pub const DB_FILE_NAME: &str = "splitvault.db";

/// Errors from the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("schema migration: {0}")]
    Migration(String),

    #[error("no such record: {0}")]
    NotFound(String),

    #[error("value not storable: {0}")]
    Constraint(String),

    #[error("malformed stored value: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open (creating if needed) the ledger database at `path` and bring its
/// schema up to date.
pub fn open(path: &Path) -> Result<Connection> {
    prepare(Connection::open(path)?)
}

/// A private in-memory database with the current schema.
pub fn open_memory() -> Result<Connection> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(mut conn: Connection) -> Result<Connection> {
    // Reports "memory" for in-memory databases.
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    migrations::run(&mut conn)?;
    Ok(conn)
}

/// Convert a ledger amount to its stored form.
pub(crate) fn to_sql_amount(amount: u64) -> Result<i64> {
    i64::try_from(amount)
        .map_err(|_| DbError::Constraint(format!("amount {amount} exceeds storable range")))
}

/// Convert a stored amount back to a ledger amount.
pub(crate) fn from_sql_amount(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| DbError::Serialization(format!("negative amount {value}")))
}

/// Convert a stored identifier BLOB to its fixed-size form.
pub(crate) fn blob32(bytes: Vec<u8>) -> Result<[u8; 32]> {
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| DbError::Serialization(format!("identifier blob has {len} bytes, want 32")))
}

/// Current Unix time in seconds.
pub(crate) fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
