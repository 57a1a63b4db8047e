//! SQLite-backed note storage.
//!
//! # Responsibility
//! - Persist notes to a local SQLite file for devices or tools without a
//!   remote database.
//!
//! # Invariants
//! - Connections come from `db::open_db*`, so migrations are applied.
//! - Writes are single-statement inserts; the `(collection, key)` primary key
//!   turns a taken key into `StoreError::Conflict`.
//! - Calls run inline on the caller's task; each is one short statement.

use super::{NoteBackend, StoreError, StoreResult, StoredChild};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::key::NoteKey;
use rusqlite::{params, Connection, ErrorCode};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Local SQLite backing store.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    location: Option<PathBuf>,
}

impl SqliteBackend {
    /// Opens (or creates) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = open_db(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            location: Some(path.to_path_buf()),
        })
    }

    pub fn in_memory() -> StoreResult<Self> {
        let conn = open_db_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            location: None,
        })
    }

    /// Wraps an already-migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            location: None,
        }
    }

    /// Database file path, `None` for in-memory databases.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NoteBackend for SqliteBackend {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn create_child(&self, collection: &str, key: &NoteKey, body: &str) -> StoreResult<()> {
        let conn = self.lock();
        let inserted = conn
            .execute(
                "INSERT INTO notes (collection, key, body)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (collection, key) DO NOTHING;",
                params![collection, key.as_str(), body],
            )
            .map_err(map_sqlite_error)?;
        if inserted == 0 {
            return Err(StoreError::Conflict(format!("{collection}/{key}")));
        }
        Ok(())
    }

    async fn list_children(&self, collection: &str) -> StoreResult<Vec<StoredChild>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT key, body FROM notes WHERE collection = ?1;")
            .map_err(map_sqlite_error)?;
        let mut rows = stmt.query([collection]).map_err(map_sqlite_error)?;
        let mut children = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqlite_error)? {
            children.push(StoredChild {
                key: row.get("key").map_err(map_sqlite_error)?,
                body: row.get("body").map_err(map_sqlite_error)?,
            });
        }
        Ok(children)
    }
}

fn map_sqlite_error(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ReadOnly)
        | Some(ErrorCode::PermissionDenied)
        | Some(ErrorCode::AuthorizationForStatementDenied) => StoreError::Permission(err.to_string()),
        Some(ErrorCode::DiskFull) => StoreError::Quota(err.to_string()),
        _ => StoreError::Db(DbError::Sqlite(err)),
    }
}
