//! Headless state of the note-taking screen.
//!
//! # Responsibility
//! - Hold the draft text and the "latest note" view the UI renders.
//! - Drive the store: one fetch on first display, one save per submit.
//!
//! # Invariants
//! - `on_first_display` reaches the store at most once per screen.
//! - The draft is cleared only after the store confirmed the save; a failed
//!   save keeps the draft and records the error.
//! - A failed fetch is shown as `LatestView::Failed`, never as `Empty`.

use crate::backend::{NoteBackend, StoreResult};
use crate::clock::Clock;
use crate::key::NoteKey;
use crate::store::{FetchOutcome, NoteStore};

/// What the "latest note" area shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LatestView {
    #[default]
    Loading,
    Empty,
    Found(String),
    Failed(String),
}

impl From<FetchOutcome> for LatestView {
    fn from(value: FetchOutcome) -> Self {
        match value {
            FetchOutcome::Empty => Self::Empty,
            FetchOutcome::Found(note) => Self::Found(note.into_body()),
            FetchOutcome::Failed(err) => Self::Failed(err.to_string()),
        }
    }
}

#[derive(Debug, Default)]
pub struct NoteScreen {
    draft: String,
    latest: LatestView,
    last_save_error: Option<String>,
    displayed: bool,
}

impl NoteScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn latest(&self) -> &LatestView {
        &self.latest
    }

    pub fn last_save_error(&self) -> Option<&str> {
        self.last_save_error.as_deref()
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Loads the latest note the first time the screen is shown.
    ///
    /// Returns `false` without touching the store on later calls.
    pub async fn on_first_display<B: NoteBackend, C: Clock>(
        &mut self,
        store: &NoteStore<B, C>,
    ) -> bool {
        if self.displayed {
            return false;
        }
        self.displayed = true;
        self.refresh(store).await;
        true
    }

    /// Re-reads the latest note unconditionally.
    pub async fn refresh<B: NoteBackend, C: Clock>(&mut self, store: &NoteStore<B, C>) {
        self.latest = LatestView::Loading;
        self.latest = store.fetch_outcome().await.into();
    }

    /// Saves the current draft.
    ///
    /// On success the draft is cleared and the saved text becomes the latest
    /// note. On failure the draft stays so the user can retry.
    pub async fn submit<B: NoteBackend, C: Clock>(
        &mut self,
        store: &NoteStore<B, C>,
    ) -> StoreResult<NoteKey> {
        match store.save(&self.draft).await {
            Ok(key) => {
                let saved = std::mem::take(&mut self.draft);
                self.latest = LatestView::Found(saved);
                self.last_save_error = None;
                Ok(key)
            }
            Err(err) => {
                self.last_save_error = Some(err.to_string());
                Err(err)
            }
        }
    }
}
