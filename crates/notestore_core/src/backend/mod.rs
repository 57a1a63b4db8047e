//! Backing store abstractions and implementations.
//!
//! # Responsibility
//! - Define the two-operation contract the note store needs: create one child
//!   under a collection, read every child of a collection.
//! - Translate transport/storage failures into one `StoreError` taxonomy.
//!
//! # Invariants
//! - `list_children` makes no ordering promise; callers sort explicitly.
//! - A failed `create_child` leaves no readable child behind.
//! - `create_child` never replaces an existing child; a taken key is reported
//!   as `StoreError::Conflict`.
//! - Collection names never contain `/ . $ # [ ]`.

use crate::db::DbError;
use crate::key::NoteKey;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::Arc;

pub mod memory;
pub mod rtdb;
pub mod sqlite;

pub use memory::{InjectedFailure, MemoryBackend};
pub use rtdb::{RtdbBackend, RtdbSettings};
pub use sqlite::SqliteBackend;

/// Collection used when none is configured.
pub const DEFAULT_COLLECTION: &str = "notes";

const FORBIDDEN_PATH_CHARS: &[char] = &['/', '.', '$', '#', '[', ']'];

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by a backing store.
#[derive(Debug)]
pub enum StoreError {
    /// Store unreachable or request timed out.
    Network(String),
    /// Access rules denied the read or write.
    Permission(String),
    /// Quota, storage or rate limit exhausted.
    Quota(String),
    /// Store answered with data the core cannot interpret.
    InvalidData(String),
    /// The key is already taken in the collection.
    Conflict(String),
    /// Backend was constructed with unusable settings.
    Misconfigured(String),
    /// Local SQLite failure not covered by the variants above.
    Db(DbError),
    /// Any other backend-side failure.
    Backend(String),
}

impl StoreError {
    /// Stable snake_case code used by logs and FFI envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Permission(_) => "permission",
            Self::Quota(_) => "quota",
            Self::InvalidData(_) => "invalid_data",
            Self::Conflict(_) => "conflict",
            Self::Misconfigured(_) => "misconfigured",
            Self::Db(_) => "db",
            Self::Backend(_) => "backend",
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(message) => write!(f, "backing store unreachable: {message}"),
            Self::Permission(message) => write!(f, "permission denied: {message}"),
            Self::Quota(message) => write!(f, "quota exceeded: {message}"),
            Self::InvalidData(message) => write!(f, "invalid data from backing store: {message}"),
            Self::Conflict(message) => write!(f, "key already taken: {message}"),
            Self::Misconfigured(message) => write!(f, "backing store misconfigured: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Backend(message) => write!(f, "backing store error: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

/// One child as returned by a backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChild {
    pub key: String,
    pub body: String,
}

impl StoredChild {
    pub fn new(key: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            body: body.into(),
        }
    }
}

/// Key/value contract of a backing store.
pub trait NoteBackend: Send + Sync {
    /// Short label used in log events.
    fn kind(&self) -> &'static str;

    /// Writes `body` at `{collection}/{key}` when that key is still free.
    ///
    /// # Errors
    /// - `StoreError::Conflict` when a child already exists at `key`.
    fn create_child(
        &self,
        collection: &str,
        key: &NoteKey,
        body: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Returns every child under `{collection}/`, in no particular order.
    fn list_children(
        &self,
        collection: &str,
    ) -> impl Future<Output = StoreResult<Vec<StoredChild>>> + Send;
}

impl<B: NoteBackend> NoteBackend for Arc<B> {
    fn kind(&self) -> &'static str {
        (**self).kind()
    }

    fn create_child(
        &self,
        collection: &str,
        key: &NoteKey,
        body: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).create_child(collection, key, body)
    }

    fn list_children(
        &self,
        collection: &str,
    ) -> impl Future<Output = StoreResult<Vec<StoredChild>>> + Send {
        (**self).list_children(collection)
    }
}

/// Backend selected at runtime from configuration.
pub enum AnyBackend {
    Memory(MemoryBackend),
    Sqlite(SqliteBackend),
    Rtdb(RtdbBackend),
}

impl NoteBackend for AnyBackend {
    fn kind(&self) -> &'static str {
        match self {
            Self::Memory(backend) => backend.kind(),
            Self::Sqlite(backend) => backend.kind(),
            Self::Rtdb(backend) => backend.kind(),
        }
    }

    async fn create_child(&self, collection: &str, key: &NoteKey, body: &str) -> StoreResult<()> {
        match self {
            Self::Memory(backend) => backend.create_child(collection, key, body).await,
            Self::Sqlite(backend) => backend.create_child(collection, key, body).await,
            Self::Rtdb(backend) => backend.create_child(collection, key, body).await,
        }
    }

    async fn list_children(&self, collection: &str) -> StoreResult<Vec<StoredChild>> {
        match self {
            Self::Memory(backend) => backend.list_children(collection).await,
            Self::Sqlite(backend) => backend.list_children(collection).await,
            Self::Rtdb(backend) => backend.list_children(collection).await,
        }
    }
}

/// Validates a collection name for use as a single path segment.
pub fn validate_collection(collection: &str) -> StoreResult<()> {
    if collection.trim().is_empty() {
        return Err(StoreError::Misconfigured(
            "collection name cannot be empty".to_string(),
        ));
    }
    if collection.contains(FORBIDDEN_PATH_CHARS) || collection.chars().any(char::is_control) {
        return Err(StoreError::Misconfigured(format!(
            "collection name `{collection}` contains a forbidden character"
        )));
    }
    Ok(())
}
