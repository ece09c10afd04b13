//! SQLite-backed durable store: metric history, users and the action log.
//!
//! One connection behind a mutex; each operation is a single statement or a
//! single transaction. Timestamps are stored as unix milliseconds.

pub mod audit;
pub mod metrics;
pub mod users;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{0} already exists")]
    Conflict(String),
    #[error("stored value is invalid: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'viewer',
    created_at INTEGER NOT NULL,
    last_login INTEGER
);

CREATE TABLE IF NOT EXISTS action_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    action TEXT NOT NULL,
    instance_name TEXT,
    timestamp INTEGER NOT NULL,
    details TEXT,
    status TEXT NOT NULL DEFAULT 'success'
);

CREATE INDEX IF NOT EXISTS idx_action_logs_timestamp ON action_logs(timestamp);

CREATE TABLE IF NOT EXISTS metrics_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    cpu_percent REAL NOT NULL,
    ram_percent REAL NOT NULL,
    ram_used_gb REAL NOT NULL,
    ram_total_gb REAL NOT NULL,
    disk_percent REAL,
    disk_used_gb REAL,
    disk_total_gb REAL,
    network_sent_mb REAL NOT NULL,
    network_recv_mb REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_metrics_history_timestamp ON metrics_history(timestamp);
"#;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database file and make sure the tables exist.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // A panic mid-statement leaves SQLite itself consistent, so recover the guard.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub(crate) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

/// Column-level conversion for row mappers.
pub(crate) fn millis_column(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_file_database_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel.db");
        {
            let db = Database::open(&path).unwrap();
            assert_eq!(db.metric_count().unwrap(), 0);
        }
        // schema creation is idempotent
        let db = Database::open(&path).unwrap();
        assert_eq!(db.user_count().unwrap(), 0);
    }

    #[test]
    fn millis_round_trip() {
        let t = Utc.timestamp_millis_opt(1_700_000_123_456).unwrap();
        assert_eq!(millis_column(0, to_millis(t)).unwrap(), t);
    }
}
