//! Note store use-cases.
//!
//! # Responsibility
//! - Turn "save this text" and "show the latest note" into backend calls.
//! - Keep UI/FFI layers decoupled from backend and key details.

pub mod note_store;

pub use note_store::{FetchOutcome, NoteStore};
