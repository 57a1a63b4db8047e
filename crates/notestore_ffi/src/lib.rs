//! Flutter-facing bindings for the NoteStore core.

pub mod api;
