//! Core note persistence for the NoteStore app.
//! Saves note text under time-derived keys and reads back the latest note.

pub mod backend;
pub mod clock;
pub mod config;
pub mod db;
pub mod key;
pub mod logging;
pub mod model;
pub mod screen;
pub mod store;

pub use backend::{
    AnyBackend, InjectedFailure, MemoryBackend, NoteBackend, RtdbBackend, RtdbSettings,
    SqliteBackend, StoreError, StoreResult, StoredChild, DEFAULT_COLLECTION,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, NoteStoreConfig};
pub use key::{KeyEncoder, KeyError, KeyResolution, KeySequencer, KeyTimezone, NoteKey};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::note::Note;
pub use screen::{LatestView, NoteScreen};
pub use store::{FetchOutcome, NoteStore};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
