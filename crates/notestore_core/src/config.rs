//! # Configuration
//!
//! Settings are loaded with [`confique`] from, in priority order:
//! 1. Environment variables (`NOTESTORE_BACKEND`, `NOTESTORE_DATABASE_URL`, ...).
//! 2. A TOML file (`notestore.toml`), when given.
//! 3. Compiled defaults.
//!
//! ```toml
//! [backend]
//! kind = "rtdb"                 # memory | sqlite | rtdb
//! collection = "notes"
//! database_url = "https://demo-default-rtdb.firebaseio.com"
//! timeout_secs = 10
//!
//! [keys]
//! timezone = "local"            # local | utc | +HH:MM
//! resolution = "seconds"        # seconds | millis
//!
//! [logging]
//! level = "info"
//! dir = "/var/log/notestore"
//! ```

use crate::backend::{
    AnyBackend, MemoryBackend, RtdbBackend, RtdbSettings, SqliteBackend, StoreError,
};
use crate::key::{KeyEncoder, KeyError, KeyResolution, KeyTimezone};
use crate::logging::default_log_level;
use crate::store::NoteStore;
use confique::Config;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SQLITE_FILE_NAME: &str = "notestore.sqlite3";

/// Configuration loading/validation failure.
#[derive(Debug)]
pub enum ConfigError {
    Load(confique::Error),
    Invalid { field: &'static str, message: String },
    Store(StoreError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load(err) => write!(f, "failed to load configuration: {err}"),
            Self::Invalid { field, message } => write!(f, "invalid `{field}`: {message}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Load(err) => Some(err),
            Self::Invalid { .. } => None,
            Self::Store(err) => Some(err),
        }
    }
}

impl From<confique::Error> for ConfigError {
    fn from(value: confique::Error) -> Self {
        Self::Load(value)
    }
}

impl From<StoreError> for ConfigError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

#[derive(Config, Debug, Clone)]
pub struct NoteStoreConfig {
    #[config(nested)]
    pub backend: BackendConfig,
    #[config(nested)]
    pub keys: KeysConfig,
    #[config(nested)]
    pub logging: LoggingConfig,
}

#[derive(Config, Debug, Clone)]
pub struct BackendConfig {
    /// `memory`, `sqlite` or `rtdb`.
    #[config(env = "NOTESTORE_BACKEND", default = "sqlite")]
    pub kind: String,

    /// Collection (top-level path) notes are written under.
    #[config(env = "NOTESTORE_COLLECTION", default = "notes")]
    pub collection: String,

    /// SQLite file. Defaults to `notestore.sqlite3` in the temp directory.
    #[config(env = "NOTESTORE_SQLITE_PATH")]
    pub sqlite_path: Option<PathBuf>,

    /// Realtime Database root URL. Required for `rtdb`.
    #[config(env = "NOTESTORE_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Optional database secret or ID token, sent as `auth`.
    #[config(env = "NOTESTORE_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    #[config(env = "NOTESTORE_TIMEOUT_SECS", default = 10)]
    pub timeout_secs: u64,
}

#[derive(Config, Debug, Clone)]
pub struct KeysConfig {
    /// `local`, `utc` or a fixed offset such as `+05:30`.
    #[config(env = "NOTESTORE_KEY_TIMEZONE", default = "local")]
    pub timezone: String,

    /// `seconds` or `millis`.
    #[config(env = "NOTESTORE_KEY_RESOLUTION", default = "seconds")]
    pub resolution: String,
}

#[derive(Config, Debug, Clone)]
pub struct LoggingConfig {
    /// Defaults to `debug` in debug builds and `info` in release builds.
    #[config(env = "NOTESTORE_LOG_LEVEL")]
    pub level: Option<String>,

    /// Absolute directory for rolling log files. Logging stays off when unset.
    #[config(env = "NOTESTORE_LOG_DIR")]
    pub dir: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn effective_level(&self) -> &str {
        self.level.as_deref().unwrap_or(default_log_level())
    }
}

/// Supported backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Sqlite,
    Rtdb,
}

impl BackendConfig {
    pub fn parsed_kind(&self) -> Result<BackendKind, ConfigError> {
        match self.kind.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "sqlite" => Ok(BackendKind::Sqlite),
            "rtdb" | "firebase" => Ok(BackendKind::Rtdb),
            other => Err(ConfigError::Invalid {
                field: "backend.kind",
                message: format!("unsupported backend `{other}`; expected memory|sqlite|rtdb"),
            }),
        }
    }

    /// SQLite path with the temp-dir default applied.
    pub fn effective_sqlite_path(&self) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_SQLITE_FILE_NAME))
    }
}

impl NoteStoreConfig {
    /// Loads defaults, then `path` (when given), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Self::builder().env();
        if let Some(path) = path {
            builder = builder.file(path);
        }
        Ok(builder.load()?)
    }

    /// Loads defaults and `path`, ignoring the environment.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::builder().file(path).load()?)
    }

    /// Compiled defaults only.
    pub fn defaults() -> Result<Self, ConfigError> {
        Ok(Self::builder().load()?)
    }

    pub fn key_encoder(&self) -> Result<KeyEncoder, ConfigError> {
        let timezone: KeyTimezone = self
            .keys
            .timezone
            .parse()
            .map_err(|err: KeyError| invalid("keys.timezone", err))?;
        let resolution: KeyResolution = self
            .keys
            .resolution
            .parse()
            .map_err(|err: KeyError| invalid("keys.resolution", err))?;
        Ok(KeyEncoder::new(timezone, resolution))
    }

    /// Constructs the configured backend.
    pub fn build_backend(&self) -> Result<AnyBackend, ConfigError> {
        let backend = match self.backend.parsed_kind()? {
            BackendKind::Memory => AnyBackend::Memory(MemoryBackend::new()),
            BackendKind::Sqlite => {
                AnyBackend::Sqlite(SqliteBackend::open(self.backend.effective_sqlite_path())?)
            }
            BackendKind::Rtdb => {
                let database_url = self
                    .backend
                    .database_url
                    .clone()
                    .filter(|url| !url.trim().is_empty())
                    .ok_or(ConfigError::Invalid {
                        field: "backend.database_url",
                        message: "required when backend.kind is `rtdb`".to_string(),
                    })?;
                AnyBackend::Rtdb(RtdbBackend::new(RtdbSettings {
                    database_url,
                    auth_token: self.backend.auth_token.clone(),
                    timeout: Duration::from_secs(self.backend.timeout_secs.max(1)),
                })?)
            }
        };
        Ok(backend)
    }

    /// Constructs a wall-clock store over the configured backend.
    pub fn build_store(&self) -> Result<NoteStore<AnyBackend>, ConfigError> {
        let encoder = self.key_encoder()?;
        let backend = self.build_backend()?;
        let store = NoteStore::with_clock(backend, crate::clock::SystemClock, encoder)
            .with_collection(self.backend.collection.trim())?;
        Ok(store)
    }
}

fn invalid(field: &'static str, err: impl Display) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{BackendKind, ConfigError, NoteStoreConfig};
    use crate::backend::AnyBackend;
    use crate::key::{KeyResolution, KeyTimezone};
    use crate::logging::default_log_level;
    use std::io::Write;

    fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notestore.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn defaults_select_sqlite_notes_and_local_seconds() {
        let config = NoteStoreConfig::defaults().unwrap();
        assert_eq!(config.backend.parsed_kind().unwrap(), BackendKind::Sqlite);
        assert_eq!(config.backend.collection, "notes");
        assert_eq!(config.backend.timeout_secs, 10);
        let encoder = config.key_encoder().unwrap();
        assert_eq!(encoder.timezone(), KeyTimezone::Local);
        assert_eq!(encoder.resolution(), KeyResolution::Seconds);
        assert!(config.logging.dir.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let (_dir, path) = write_config(
            r#"
[backend]
kind = "memory"
collection = "journal"

[keys]
timezone = "utc"
resolution = "millis"
"#,
        );
        let config = NoteStoreConfig::load_file(&path).unwrap();
        assert_eq!(config.backend.parsed_kind().unwrap(), BackendKind::Memory);

        let store = config.build_store().unwrap();
        assert_eq!(store.collection(), "journal");
        assert!(matches!(store.backend(), AnyBackend::Memory(_)));
        assert_eq!(store.encoder().resolution(), KeyResolution::Millis);
    }

    #[test]
    fn rtdb_without_url_is_rejected() {
        let (_dir, path) = write_config("[backend]\nkind = \"rtdb\"\n");
        let config = NoteStoreConfig::load_file(&path).unwrap();
        let err = config.build_backend().err().expect("missing url should fail");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "backend.database_url",
                ..
            }
        ));
    }

    #[test]
    fn unknown_backend_and_bad_timezone_are_rejected() {
        let (_dir, path) = write_config(
            "[backend]\nkind = \"postgres\"\n\n[keys]\ntimezone = \"Mars/Olympus\"\n",
        );
        let config = NoteStoreConfig::load_file(&path).unwrap();
        assert!(config.backend.parsed_kind().is_err());
        assert!(matches!(
            config.key_encoder(),
            Err(ConfigError::Invalid {
                field: "keys.timezone",
                ..
            })
        ));
    }

    #[test]
    fn logging_level_falls_back_to_build_default() {
        let (_dir, path) = write_config("[logging]\ndir = \"/var/log/notestore\"\n");
        let config = NoteStoreConfig::load_file(&path).unwrap();
        assert_eq!(config.logging.effective_level(), default_log_level());

        let (_dir, path) = write_config("[logging]\nlevel = \"warn\"\n");
        let config = NoteStoreConfig::load_file(&path).unwrap();
        assert_eq!(config.logging.effective_level(), "warn");
    }

    #[test]
    fn invalid_collection_is_rejected_at_build() {
        let (_dir, path) = write_config("[backend]\nkind = \"memory\"\ncollection = \"a/b\"\n");
        let config = NoteStoreConfig::load_file(&path).unwrap();
        assert!(matches!(config.build_store(), Err(ConfigError::Store(_))));
    }
}
