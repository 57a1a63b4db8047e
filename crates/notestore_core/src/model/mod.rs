//! Domain model for saved notes.
//!
//! # Responsibility
//! - Define the note record shared by store, screen and FFI layers.
//!
//! # Invariants
//! - A note is identified by its `NoteKey`; the body never changes after save.

pub mod note;
