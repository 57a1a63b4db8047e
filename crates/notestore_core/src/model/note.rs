//! Note domain model.
//!
//! # Invariants
//! - `key` is unique inside its collection and encodes creation time.
//! - `body` may be empty; no length limit is enforced here.

use crate::key::NoteKey;
use serde::{Deserialize, Serialize};

/// One saved note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub key: NoteKey,
    pub body: String,
}

impl Note {
    pub fn new(key: NoteKey, body: impl Into<String>) -> Self {
        Self {
            key,
            body: body.into(),
        }
    }

    /// Consumes the note and returns its body.
    pub fn into_body(self) -> String {
        self.body
    }
}
