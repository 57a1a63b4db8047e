use super::{NoteBackend, StoreError, StoreResult, StoredChild};
use crate::key::NoteKey;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Failure mode a `MemoryBackend` can be told to simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Network,
    Permission,
    Quota,
}

impl InjectedFailure {
    fn to_error(self, operation: &str) -> StoreError {
        match self {
            Self::Network => StoreError::Network(format!("simulated outage during {operation}")),
            Self::Permission => {
                StoreError::Permission(format!("simulated access rule denied {operation}"))
            }
            Self::Quota => StoreError::Quota(format!("simulated quota exhausted during {operation}")),
        }
    }
}

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, HashMap<String, String>>,
    read_failure: Option<InjectedFailure>,
    write_failure: Option<InjectedFailure>,
}

/// In-process backing store.
///
/// Children live in a `HashMap`, so `list_children` order is arbitrary, the
/// same as a remote store that promises nothing about child order.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following write fail with `failure` until cleared.
    pub fn fail_writes_with(&self, failure: InjectedFailure) {
        self.lock().write_failure = Some(failure);
    }

    /// Makes every following read fail with `failure` until cleared.
    pub fn fail_reads_with(&self, failure: InjectedFailure) {
        self.lock().read_failure = Some(failure);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.read_failure = None;
        state.write_failure = None;
    }

    /// Seeds a child directly, bypassing key generation.
    pub fn insert_raw(&self, collection: &str, key: &str, body: &str) {
        self.lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), body.to_string());
    }

    pub fn get(&self, collection: &str, key: &str) -> Option<String> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|children| children.get(key).cloned())
    }

    pub fn len(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NoteBackend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn create_child(&self, collection: &str, key: &NoteKey, body: &str) -> StoreResult<()> {
        let mut state = self.lock();
        if let Some(failure) = state.write_failure {
            return Err(failure.to_error("write"));
        }
        let children = state.collections.entry(collection.to_string()).or_default();
        if children.contains_key(key.as_str()) {
            return Err(StoreError::Conflict(format!("{collection}/{key}")));
        }
        children.insert(key.as_str().to_string(), body.to_string());
        Ok(())
    }

    async fn list_children(&self, collection: &str) -> StoreResult<Vec<StoredChild>> {
        let state = self.lock();
        if let Some(failure) = state.read_failure {
            return Err(failure.to_error("read"));
        }
        Ok(state
            .collections
            .get(collection)
            .map(|children| {
                children
                    .iter()
                    .map(|(key, body)| StoredChild::new(key.as_str(), body.as_str()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::{InjectedFailure, MemoryBackend};
    use crate::backend::{NoteBackend, StoreError};
    use crate::key::NoteKey;

    #[tokio::test]
    async fn collections_are_isolated() {
        let backend = MemoryBackend::new();
        let key = NoteKey::parse("20240101_000000").unwrap();
        backend.create_child("notes", &key, "a").await.unwrap();
        backend.create_child("drafts", &key, "b").await.unwrap();

        assert_eq!(backend.get("notes", key.as_str()).as_deref(), Some("a"));
        assert_eq!(backend.get("drafts", key.as_str()).as_deref(), Some("b"));
        assert_eq!(backend.list_children("notes").await.unwrap().len(), 1);
        assert!(backend.list_children("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_write_failure_leaves_nothing_behind() {
        let backend = MemoryBackend::new();
        backend.fail_writes_with(InjectedFailure::Permission);
        let key = NoteKey::parse("20240101_000000").unwrap();

        let err = backend.create_child("notes", &key, "x").await.unwrap_err();
        assert!(matches!(err, StoreError::Permission(_)));
        assert!(backend.is_empty("notes"));

        backend.clear_failures();
        backend.create_child("notes", &key, "x").await.unwrap();
        assert_eq!(backend.len("notes"), 1);
    }

    #[tokio::test]
    async fn existing_key_is_a_conflict_and_keeps_first_body() {
        let backend = MemoryBackend::new();
        let key = NoteKey::parse("20240101_000000").unwrap();
        backend.create_child("notes", &key, "first").await.unwrap();

        let err = backend.create_child("notes", &key, "second").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(backend.get("notes", key.as_str()).as_deref(), Some("first"));
    }
}
