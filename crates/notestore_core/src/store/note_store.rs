//! Save and fetch-latest over an injected backing store.
//!
//! # Invariants
//! - `save` creates exactly one child per successful call and never replaces
//!   an existing one; only key conflicts are retried.
//! - `fetch_latest` picks the lexicographically greatest stored key
//!   explicitly; backend child order is ignored.
//! - A collection with any child never reads as empty.
//! - "No notes" is `Ok(None)`; backend failures stay on the error channel.
//! - Note bodies are never logged, only their byte length.

use crate::backend::{validate_collection, NoteBackend, StoreError, StoreResult, StoredChild};
use crate::backend::DEFAULT_COLLECTION;
use crate::clock::{Clock, SystemClock};
use crate::key::{KeyEncoder, KeySequencer, NoteKey};
use crate::model::note::Note;
use log::{error, info, warn};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Keys tried per save before a conflict is reported.
const MAX_KEY_ATTEMPTS: usize = 8;

/// Result of a latest-note lookup with "empty" and "failed" kept apart.
#[derive(Debug)]
pub enum FetchOutcome {
    Empty,
    Found(Note),
    Failed(StoreError),
}

impl FetchOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl From<StoreResult<Option<Note>>> for FetchOutcome {
    fn from(value: StoreResult<Option<Note>>) -> Self {
        match value {
            Ok(Some(note)) => Self::Found(note),
            Ok(None) => Self::Empty,
            Err(err) => Self::Failed(err),
        }
    }
}

/// Note persistence facade over one backend.
pub struct NoteStore<B, C = SystemClock> {
    backend: B,
    clock: C,
    collection: String,
    keys: Mutex<KeySequencer>,
}

impl<B: NoteBackend> NoteStore<B, SystemClock> {
    /// Creates a store on the wall clock with the default key policy.
    pub fn new(backend: B) -> Self {
        Self::with_clock(backend, SystemClock, KeyEncoder::default())
    }
}

impl<B: NoteBackend, C: Clock> NoteStore<B, C> {
    pub fn with_clock(backend: B, clock: C, encoder: KeyEncoder) -> Self {
        Self {
            backend,
            clock,
            collection: DEFAULT_COLLECTION.to_string(),
            keys: Mutex::new(KeySequencer::new(encoder)),
        }
    }

    /// Targets another collection than `notes`.
    pub fn with_collection(mut self, collection: impl Into<String>) -> StoreResult<Self> {
        let collection = collection.into();
        validate_collection(&collection)?;
        self.collection = collection;
        Ok(self)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn encoder(&self) -> KeyEncoder {
        *self.lock_keys().encoder()
    }

    /// Saves `body` under a fresh key and returns that key once the backend
    /// acknowledged the write.
    ///
    /// A key another writer already took is retried under the next sequenced
    /// key, up to `MAX_KEY_ATTEMPTS` times.
    ///
    /// # Errors
    /// - Returns the backend's `StoreError` unchanged; transport failures are
    ///   never retried.
    /// - `StoreError::Conflict` when no free key was found.
    pub async fn save(&self, body: &str) -> StoreResult<NoteKey> {
        let started_at = Instant::now();
        let mut attempt = 1;

        loop {
            let key = self.next_key()?;
            match self.backend.create_child(&self.collection, &key, body).await {
                Ok(()) => {
                    info!(
                        "event=note_save module=store status=ok backend={} collection={} key={} body_bytes={} attempts={attempt} duration_ms={}",
                        self.backend.kind(),
                        self.collection,
                        key,
                        body.len(),
                        started_at.elapsed().as_millis()
                    );
                    return Ok(key);
                }
                Err(StoreError::Conflict(_)) if attempt < MAX_KEY_ATTEMPTS => {
                    warn!(
                        "event=note_save module=store status=key_taken backend={} collection={} key={} attempt={attempt}",
                        self.backend.kind(),
                        self.collection,
                        key
                    );
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        "event=note_save module=store status=error backend={} collection={} key={} attempts={attempt} duration_ms={} error_code={} error={}",
                        self.backend.kind(),
                        self.collection,
                        key,
                        started_at.elapsed().as_millis(),
                        err.kind(),
                        err
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Returns the note with the greatest key, or `None` when the collection
    /// holds no notes.
    ///
    /// Keys outside the note key grammar still take part in the comparison.
    pub async fn fetch_latest(&self) -> StoreResult<Option<Note>> {
        let started_at = Instant::now();

        let children = match self.backend.list_children(&self.collection).await {
            Ok(children) => children,
            Err(err) => {
                error!(
                    "event=note_fetch_latest module=store status=error backend={} collection={} duration_ms={} error_code={} error={}",
                    self.backend.kind(),
                    self.collection,
                    started_at.elapsed().as_millis(),
                    err.kind(),
                    err
                );
                return Err(err);
            }
        };

        let total = children.len();
        let latest = select_latest(children);
        let foreign = latest
            .as_ref()
            .filter(|note| !NoteKey::is_well_formed(note.key.as_str()));
        if let Some(note) = foreign {
            warn!(
                "event=note_fetch_latest module=store status=foreign_key collection={} key={}",
                self.collection, note.key
            );
        }
        info!(
            "event=note_fetch_latest module=store status=ok backend={} collection={} children={total} found={} duration_ms={}",
            self.backend.kind(),
            self.collection,
            latest.is_some(),
            started_at.elapsed().as_millis()
        );
        Ok(latest)
    }

    /// Body-only variant of [`NoteStore::fetch_latest`].
    pub async fn fetch_latest_body(&self) -> StoreResult<Option<String>> {
        Ok(self.fetch_latest().await?.map(Note::into_body))
    }

    /// `fetch_latest` folded into a [`FetchOutcome`].
    pub async fn fetch_outcome(&self) -> FetchOutcome {
        self.fetch_latest().await.into()
    }

    fn next_key(&self) -> StoreResult<NoteKey> {
        let now = self.clock.now();
        self.lock_keys()
            .next_key(now)
            .map_err(|err| StoreError::Conflict(err.to_string()))
    }

    fn lock_keys(&self) -> MutexGuard<'_, KeySequencer> {
        self.keys
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Picks the child with the lexicographically greatest key.
fn select_latest(children: Vec<StoredChild>) -> Option<Note> {
    children
        .into_iter()
        .max_by(|left, right| left.key.cmp(&right.key))
        .map(|child| Note::new(NoteKey::from_stored(child.key), child.body))
}
