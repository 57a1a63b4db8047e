//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose save / fetch-latest to Dart via FRB with plain response envelopes.
//! - Own the process-wide store and the runtime its futures run on.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - A failed fetch is reported as `state == "failed"`, never as `"empty"`.
//! - The store is built once per process; later `configure` calls are rejected.

use log::warn;
use notestore_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    AnyBackend, FetchOutcome, LatestView, NoteScreen, NoteStore, NoteStoreConfig, StoreError,
};
use once_cell::sync::{Lazy, OnceCell};
use std::future::Future;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tokio::runtime::{Builder, Runtime};

const CONFIG_PATH_ENV: &str = "NOTESTORE_CONFIG";

static STORE: OnceCell<NoteStore<AnyBackend>> = OnceCell::new();
static RUNTIME: OnceCell<Runtime> = OnceCell::new();
static SCREEN: Lazy<Mutex<NoteScreen>> = Lazy::new(|| Mutex::new(NoteScreen::new()));

/// Minimal health-check API for FRB smoke integration.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory where rolling logs are written.
/// - Returns an empty string on success and an error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.trim()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Builds the process-wide store from a TOML file (plus `NOTESTORE_*` env).
///
/// # FFI contract
/// - Call before the first save/fetch; otherwise the store is built lazily
///   from `NOTESTORE_CONFIG` or compiled defaults.
/// - Returns an empty string on success and an error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn configure(config_path: Option<String>) -> String {
    if STORE.get().is_some() {
        return "note store already configured".to_string();
    }
    let path = config_path.as_deref().map(str::trim).filter(|p| !p.is_empty());
    match build_store(path.map(Path::new)) {
        Ok(store) => match STORE.set(store) {
            Ok(()) => String::new(),
            Err(_) => "note store already configured".to_string(),
        },
        Err(err) => err,
    }
}

/// Save result envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSaveResponse {
    pub ok: bool,
    /// Generated note key on success.
    pub key: Option<String>,
    /// Stable error code (`network`, `permission`, ...) on failure.
    pub error_kind: Option<String>,
    pub message: String,
}

/// Latest-note envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteLatestResponse {
    /// `empty`, `found` or `failed`.
    pub state: String,
    pub key: Option<String>,
    pub body: Option<String>,
    pub error_kind: Option<String>,
    pub message: String,
}

/// Saves one note.
///
/// # FFI contract
/// - Async from Dart's point of view; blocks only an FRB worker thread.
/// - Never panics; failures come back with `ok == false` and `error_kind`.
pub fn note_save(body: String) -> NoteSaveResponse {
    let result = with_store(|store| async move { store.save(&body).await });
    match result {
        Ok(Ok(key)) => NoteSaveResponse {
            ok: true,
            key: Some(key.into_string()),
            error_kind: None,
            message: "Note saved.".to_string(),
        },
        Ok(Err(err)) => NoteSaveResponse {
            ok: false,
            key: None,
            error_kind: Some(err.kind().to_string()),
            message: format!("note_save failed: {err}"),
        },
        Err(setup) => NoteSaveResponse {
            ok: false,
            key: None,
            error_kind: Some("setup".to_string()),
            message: format!("note_save failed: {setup}"),
        },
    }
}

/// Fetches the most recently saved note.
///
/// # FFI contract
/// - Async from Dart's point of view; blocks only an FRB worker thread.
/// - Never panics.
pub fn note_fetch_latest() -> NoteLatestResponse {
    match with_store(|store| async move { store.fetch_outcome().await }) {
        Ok(outcome) => latest_response(outcome),
        Err(setup) => NoteLatestResponse {
            state: "failed".to_string(),
            key: None,
            body: None,
            error_kind: Some("setup".to_string()),
            message: format!("note_fetch_latest failed: {setup}"),
        },
    }
}

fn latest_response(outcome: FetchOutcome) -> NoteLatestResponse {
    match outcome {
        FetchOutcome::Empty => NoteLatestResponse {
            state: "empty".to_string(),
            key: None,
            body: None,
            error_kind: None,
            message: "No notes yet.".to_string(),
        },
        FetchOutcome::Found(note) => NoteLatestResponse {
            state: "found".to_string(),
            key: Some(note.key.into_string()),
            body: Some(note.body),
            error_kind: None,
            message: "Latest note loaded.".to_string(),
        },
        FetchOutcome::Failed(err) => failed_latest(&err),
    }
}

fn failed_latest(err: &StoreError) -> NoteLatestResponse {
    NoteLatestResponse {
        state: "failed".to_string(),
        key: None,
        body: None,
        error_kind: Some(err.kind().to_string()),
        message: format!("note_fetch_latest failed: {err}"),
    }
}

/// Snapshot of the note screen for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteScreenState {
    pub draft: String,
    /// `loading`, `empty`, `found` or `failed`.
    pub latest_state: String,
    pub latest_body: Option<String>,
    /// Fetch failure message when `latest_state == "failed"`.
    pub latest_error: Option<String>,
    /// Message of the last failed save; cleared by the next successful one.
    pub save_error: Option<String>,
}

/// Shows the screen; the latest note is fetched on the first call only.
pub fn screen_open() -> NoteScreenState {
    let mut screen = lock_screen();
    match handles() {
        Ok((store, runtime)) => {
            runtime.block_on(screen.on_first_display(store));
            screen_state(&screen)
        }
        Err(setup) => {
            warn!("event=screen_open module=ffi status=error error={setup}");
            setup_failed_state(&screen, setup, false)
        }
    }
}

/// Replaces the draft text.
#[flutter_rust_bridge::frb(sync)]
pub fn screen_set_draft(text: String) -> NoteScreenState {
    let mut screen = lock_screen();
    screen.set_draft(text);
    screen_state(&screen)
}

/// Saves the draft. The draft is kept when the save fails.
pub fn screen_submit() -> NoteScreenState {
    let mut screen = lock_screen();
    match handles() {
        Ok((store, runtime)) => {
            // Failures are recorded on the screen as `last_save_error`.
            let _ = runtime.block_on(screen.submit(store));
            screen_state(&screen)
        }
        Err(setup) => setup_failed_state(&screen, setup, true),
    }
}

/// Re-reads the latest note.
pub fn screen_refresh() -> NoteScreenState {
    let mut screen = lock_screen();
    match handles() {
        Ok((store, runtime)) => {
            runtime.block_on(screen.refresh(store));
            screen_state(&screen)
        }
        Err(setup) => setup_failed_state(&screen, setup, false),
    }
}

fn screen_state(screen: &NoteScreen) -> NoteScreenState {
    let (latest_state, latest_body, latest_error) = match screen.latest() {
        LatestView::Loading => ("loading", None, None),
        LatestView::Empty => ("empty", None, None),
        LatestView::Found(body) => ("found", Some(body.clone()), None),
        LatestView::Failed(message) => ("failed", None, Some(message.clone())),
    };
    NoteScreenState {
        draft: screen.draft().to_string(),
        latest_state: latest_state.to_string(),
        latest_body,
        latest_error,
        save_error: screen.last_save_error().map(str::to_string),
    }
}

/// Store or runtime setup failed, so no latest note can ever load.
fn setup_failed_state(screen: &NoteScreen, setup: String, during_save: bool) -> NoteScreenState {
    let mut state = screen_state(screen);
    state.latest_state = "failed".to_string();
    state.latest_body = None;
    if during_save {
        state.save_error = Some(setup.clone());
    }
    state.latest_error = Some(setup);
    state
}

fn lock_screen() -> MutexGuard<'static, NoteScreen> {
    SCREEN
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn build_store(path: Option<&Path>) -> Result<NoteStore<AnyBackend>, String> {
    let config = NoteStoreConfig::load(path).map_err(|err| err.to_string())?;
    config.build_store().map_err(|err| err.to_string())
}

fn store() -> Result<&'static NoteStore<AnyBackend>, String> {
    STORE.get_or_try_init(|| {
        let env_path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());
        if env_path.is_none() {
            warn!("event=ffi_store_init module=ffi status=defaulted reason=no_config_path");
        }
        build_store(env_path.as_deref().map(Path::new))
    })
}

fn runtime() -> Result<&'static Runtime, String> {
    RUNTIME.get_or_try_init(|| {
        Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("notestore-io")
            .enable_all()
            .build()
            .map_err(|err| format!("failed to start async runtime: {err}"))
    })
}

fn with_store<F, Fut, T>(f: F) -> Result<T, String>
where
    F: FnOnce(&'static NoteStore<AnyBackend>) -> Fut,
    Fut: Future<Output = T>,
{
    let (store, runtime) = handles()?;
    Ok(runtime.block_on(f(store)))
}

fn handles() -> Result<(&'static NoteStore<AnyBackend>, &'static Runtime), String> {
    Ok((store()?, runtime()?))
}
