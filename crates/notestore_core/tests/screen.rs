use chrono::{TimeZone, Utc};
use notestore_core::{
    InjectedFailure, KeyEncoder, KeyResolution, KeyTimezone, LatestView, ManualClock,
    MemoryBackend, NoteScreen, NoteStore,
};
use std::sync::Arc;

fn store_with(backend: Arc<MemoryBackend>) -> NoteStore<Arc<MemoryBackend>, ManualClock> {
    NoteStore::with_clock(
        backend,
        ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()),
        KeyEncoder::new(KeyTimezone::Utc, KeyResolution::Seconds),
    )
}

#[tokio::test]
async fn first_display_fetches_once() {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert_raw("notes", "20240101_000000", "seeded");
    let store = store_with(backend.clone());
    let mut screen = NoteScreen::new();
    assert_eq!(screen.latest(), &LatestView::Loading);

    assert!(screen.on_first_display(&store).await);
    assert_eq!(screen.latest(), &LatestView::Found("seeded".to_string()));

    backend.insert_raw("notes", "20240102_000000", "newer");
    assert!(!screen.on_first_display(&store).await);
    assert_eq!(screen.latest(), &LatestView::Found("seeded".to_string()));

    screen.refresh(&store).await;
    assert_eq!(screen.latest(), &LatestView::Found("newer".to_string()));
}

#[tokio::test]
async fn empty_store_shows_empty_view() {
    let store = store_with(Arc::new(MemoryBackend::new()));
    let mut screen = NoteScreen::new();
    screen.on_first_display(&store).await;
    assert_eq!(screen.latest(), &LatestView::Empty);
}

#[tokio::test]
async fn failed_fetch_shows_failed_view() {
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_reads_with(InjectedFailure::Network);
    let store = store_with(backend);
    let mut screen = NoteScreen::new();

    screen.on_first_display(&store).await;
    assert!(matches!(screen.latest(), LatestView::Failed(message) if message.contains("unreachable")));
}

#[tokio::test]
async fn successful_submit_clears_draft_and_updates_latest() {
    let backend = Arc::new(MemoryBackend::new());
    let store = store_with(backend.clone());
    let mut screen = NoteScreen::new();
    screen.on_first_display(&store).await;

    screen.set_draft("buy milk");
    let key = screen.submit(&store).await.unwrap();

    assert_eq!(screen.draft(), "");
    assert_eq!(screen.latest(), &LatestView::Found("buy milk".to_string()));
    assert!(screen.last_save_error().is_none());
    assert_eq!(backend.get("notes", key.as_str()).as_deref(), Some("buy milk"));
}

#[tokio::test]
async fn failed_submit_keeps_draft_and_surfaces_error() {
    let backend = Arc::new(MemoryBackend::new());
    let store = store_with(backend.clone());
    let mut screen = NoteScreen::new();
    screen.on_first_display(&store).await;

    backend.fail_writes_with(InjectedFailure::Quota);
    screen.set_draft("do not lose me");
    assert!(screen.submit(&store).await.is_err());

    assert_eq!(screen.draft(), "do not lose me");
    assert!(screen.last_save_error().unwrap().contains("quota"));
    assert_eq!(screen.latest(), &LatestView::Empty);

    backend.clear_failures();
    screen.submit(&store).await.unwrap();
    assert_eq!(screen.draft(), "");
    assert!(screen.last_save_error().is_none());
}
