//! SQLite-backed strategic store.
//!
//! The database lives at `~/.strategic-workspace/strategic.db` unless the
//! config names another file. It holds every entity of the workspace model
//! plus the ingestion audit log. Components never touch the file directly:
//! they receive a `StrategicDb` handle and go through its methods.
//!
//! Each background worker opens its own connection. WAL mode lets the
//! prioritization pass read a consistent snapshot while ingestion writes.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub mod changes;
pub mod engagements;
pub mod health;
pub mod meetings;
pub mod recommendations;
pub mod stakeholders;
pub mod tasks;
pub mod templates;
pub mod types;
pub use types::*;

/// How long a writer waits on a locked database before surfacing `DatabaseBusy`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct StrategicDb {
    conn: Connection,
}

impl StrategicDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a write transaction.
    /// Commits on Ok, rolls back on Err. Nested calls join the outer transaction.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        if !self.conn.is_autocommit() {
            return f(self);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Run read-only queries against one consistent snapshot.
    ///
    /// A deferred transaction pins the WAL read mark at its first read, so
    /// every query in `f` sees the same state while writers keep committing.
    pub fn read_snapshot<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        if !self.conn.is_autocommit() {
            return f(self);
        }
        self.conn.execute_batch("BEGIN DEFERRED")?;
        let result = f(self);
        let _ = self.conn.execute_batch("COMMIT");
        result
    }

    /// Open a database at an explicit path and apply the schema.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // WAL gives readers a stable snapshot without blocking the writer
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.strategic-workspace/strategic.db`.
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".strategic-workspace").join("strategic.db"))
    }
}

/// Encode a typed list/object for a JSON TEXT column.
pub(crate) fn to_json_column<T: Serialize + ?Sized>(value: &T) -> Result<String, DbError> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a JSON TEXT column inside a row mapper.
pub(crate) fn json_column<T: DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Collect a `query_map` iterator, propagating the first row error.
pub(crate) fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>, DbError> {
    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}
