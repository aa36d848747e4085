use crate::config::Config;
use crate::error::AppError;
use crate::leaderboard::{LeaderboardSync, RemoteEntry, StreamEvent, ranked};
use crate::stats::{ReadingStatus, calculate_stats, user_books};
use crate::store::{Book, Progress, Store};
use crate::tracker::{BookPatch, Tracker, is_duplicate};

fn test_store() -> Store {
    Store::open_memory().unwrap()
}

fn test_tracker() -> Tracker {
    Tracker::open(test_store(), LeaderboardSync::disabled()).unwrap()
}

fn book(title: &str, isbn: &str, pages: u32) -> Book {
    Book {
        id: String::new(),
        isbn: isbn.to_string(),
        title: title.to_string(),
        authors: vec!["Test Author".to_string()],
        page_count: pages,
        cover_url: None,
        description: None,
        published_date: None,
        publisher: None,
    }
}

fn peer(id: &str, name: &str, pages: u64) -> RemoteEntry {
    RemoteEntry {
        id: id.to_string(),
        name: name.to_string(),
        pages_read: pages,
        books_completed: 0,
        last_updated: 0,
    }
}

fn put_event(path: &str, data: serde_json::Value) -> StreamEvent {
    StreamEvent {
        event: "put".to_string(),
        data: serde_json::json!({"path": path, "data": data}).to_string(),
    }
}

// ========== STORE ==========

#[test]
fn store_missing_user_returns_default() {
    let store = test_store();

    assert!(!store.has_user().unwrap());

    let user = store.user().unwrap();
    assert_eq!(user.name, "Reader");
    assert!(user.id.starts_with("id_"));

    assert!(store.books().unwrap().is_empty());
    assert!(store.progress().unwrap().is_empty());
}

#[test]
fn store_save_and_reload_user() {
    let store = test_store();

    let mut user = store.user().unwrap();
    user.name = "Ana".to_string();
    user.email = "ana@example.com".to_string();
    store.save_user(&user).unwrap();

    assert!(store.has_user().unwrap());

    let found = store.user().unwrap();
    assert_eq!(found.id, user.id);
    assert_eq!(found.name, "Ana");
    assert_eq!(found.email, "ana@example.com");
}

#[test]
fn store_save_books_replaces_collection() {
    let store = test_store();

    let mut first = book("Dune", "", 412);
    first.id = "id_dune".to_string();
    let mut second = book("Emma", "", 474);
    second.id = "id_emma".to_string();

    store.save_books(&[first.clone(), second]).unwrap();
    assert_eq!(store.books().unwrap().len(), 2);

    store.save_books(&[first]).unwrap();
    let books = store.books().unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].title, "Dune");
}

#[test]
fn store_malformed_document_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let store = Store::open(&path).unwrap();
    let mut b = book("Dune", "", 412);
    b.id = "id_dune".to_string();
    store.save_books(&[b]).unwrap();

    // Corrupt the stored document behind the store's back
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute(
        "UPDATE records SET value = '{broken' WHERE key = 'books'",
        [],
    )
    .unwrap();

    assert!(matches!(store.books(), Err(AppError::Json(_))));
}

#[test]
fn store_export_import_round_trip() {
    let store = test_store();

    let mut user = store.user().unwrap();
    user.name = "Ana".to_string();
    store.save_user(&user).unwrap();

    let mut dune = book("Dune", "9780441013593", 412);
    dune.id = "id_dune".to_string();
    store.save_books(std::slice::from_ref(&dune)).unwrap();
    store
        .save_progress(&[Progress::new(&user.id, &dune.id)])
        .unwrap();

    let exported = store.export_all().unwrap();

    store.clear_all().unwrap();
    assert!(store.books().unwrap().is_empty());

    store.import_all(&exported).unwrap();
    assert_eq!(store.export_all().unwrap(), exported);
}

#[test]
fn store_import_partial_snapshot_keeps_other_collections() {
    let store = test_store();

    let mut user = store.user().unwrap();
    user.name = "Ana".to_string();
    store.save_user(&user).unwrap();

    store
        .import_all(r#"{"books": [{"id": "id_x", "title": "Emma", "pageCount": 474}]}"#)
        .unwrap();

    assert_eq!(store.user().unwrap().name, "Ana");

    let books = store.books().unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].title, "Emma");
    assert_eq!(books[0].page_count, 474);
    assert!(books[0].authors.is_empty());
}

#[test]
fn store_import_malformed_aborts_unchanged() {
    let store = test_store();

    let mut b = book("Dune", "", 412);
    b.id = "id_dune".to_string();
    store.save_books(std::slice::from_ref(&b)).unwrap();

    assert!(store.import_all("not json at all").is_err());
    assert!(store.import_all(r#"{"books": 42}"#).is_err());

    let books = store.books().unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].title, "Dune");
}

#[test]
fn store_clear_all_removes_everything() {
    let store = test_store();

    let user = store.user().unwrap();
    store.save_user(&user).unwrap();
    let mut b = book("Dune", "", 412);
    b.id = "id_dune".to_string();
    store.save_books(&[b]).unwrap();

    store.clear_all().unwrap();

    assert!(!store.has_user().unwrap());
    assert!(store.books().unwrap().is_empty());
    assert!(store.progress().unwrap().is_empty());
}

// ========== TRACKER ==========

#[test]
fn tracker_first_open_persists_profile() {
    let store = test_store();

    let first = Tracker::open(store.clone(), LeaderboardSync::disabled()).unwrap();
    let id = first.user().unwrap().id;
    assert!(!id.is_empty());

    let second = Tracker::open(store, LeaderboardSync::disabled()).unwrap();
    assert_eq!(second.user().unwrap().id, id);
}

#[tokio::test]
async fn tracker_add_book_creates_progress() {
    let tracker = test_tracker();

    assert!(tracker.add_book(book("Dune", "9780441013593", 412)).await.unwrap());

    let books = tracker.books().unwrap();
    assert_eq!(books.len(), 1);
    assert!(!books[0].id.is_empty());

    let progress = tracker.progress().unwrap();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].book_id, books[0].id);
    assert_eq!(progress[0].user_id, tracker.user().unwrap().id);
    assert_eq!(progress[0].current_page, 0);
    assert!(!progress[0].is_completed);
}

#[tokio::test]
async fn tracker_duplicate_title_is_rejected_case_insensitive() {
    let tracker = test_tracker();

    assert!(tracker.add_book(book("Dune", "", 412)).await.unwrap());
    assert!(!tracker.add_book(book("dune", "", 200)).await.unwrap());
    assert!(!tracker.add_book(book("  DUNE  ", "", 200)).await.unwrap());

    assert_eq!(tracker.books().unwrap().len(), 1);
    assert_eq!(tracker.progress().unwrap().len(), 1);
}

#[tokio::test]
async fn tracker_duplicate_isbn_is_rejected() {
    let tracker = test_tracker();

    assert!(tracker.add_book(book("Dune", "9780441013593", 412)).await.unwrap());
    assert!(
        !tracker
            .add_book(book("Dune (Deluxe)", "9780441013593", 500))
            .await
            .unwrap()
    );

    assert_eq!(tracker.books().unwrap().len(), 1);
}

#[tokio::test]
async fn tracker_empty_isbn_never_collides() {
    let tracker = test_tracker();

    assert!(tracker.add_book(book("Dune", "", 412)).await.unwrap());
    assert!(tracker.add_book(book("Emma", "", 474)).await.unwrap());

    assert_eq!(tracker.books().unwrap().len(), 2);
}

#[test]
fn tracker_duplicate_predicate_matches_title_or_isbn() {
    let dune = book("Dune", "9780441013593", 412);

    assert!(is_duplicate(&dune, &book("  DUNE ", "", 0)));
    assert!(is_duplicate(&dune, &book("Dune: Deluxe", "9780441013593", 500)));
    assert!(!is_duplicate(&dune, &book("Emma", "9780141439587", 474)));
    assert!(!is_duplicate(&book("Dune", "", 412), &book("Emma", "", 474)));
}

#[tokio::test]
async fn tracker_delete_cascades_progress() {
    let tracker = test_tracker();

    tracker.add_book(book("Dune", "", 412)).await.unwrap();
    tracker.add_book(book("Emma", "", 474)).await.unwrap();
    let id = tracker.find_book("Dune").unwrap().id;

    assert!(tracker.delete_book(&id).await.unwrap());
    assert!(!tracker.delete_book(&id).await.unwrap());

    assert_eq!(tracker.books().unwrap().len(), 1);
    let progress = tracker.progress().unwrap();
    assert_eq!(progress.len(), 1);
    assert_ne!(progress[0].book_id, id);
}

#[tokio::test]
async fn tracker_progress_clamps_to_page_count() {
    let tracker = test_tracker();

    tracker.add_book(book("Dune", "", 100)).await.unwrap();
    let id = tracker.find_book("Dune").unwrap().id;

    let record = tracker.update_progress(&id, 150).await.unwrap();
    assert_eq!(record.current_page, 100);
    assert!(record.is_completed);

    // Stats see the clamped value, not the requested one
    assert_eq!(tracker.stats().unwrap().total_pages, 100);
}

#[tokio::test]
async fn tracker_completion_is_monotonic() {
    let tracker = test_tracker();

    tracker.add_book(book("Dune", "", 412)).await.unwrap();
    let id = tracker.find_book("Dune").unwrap().id;

    let done = tracker.update_progress(&id, 412).await.unwrap();
    assert!(done.is_completed);
    let completed_at = done.date_completed.unwrap();

    // Rereading from page 10 keeps the completion and its stamp
    let reread = tracker.update_progress(&id, 10).await.unwrap();
    assert_eq!(reread.current_page, 10);
    assert!(reread.is_completed);
    assert_eq!(reread.date_completed, Some(completed_at));

    let stats = tracker.stats().unwrap();
    assert_eq!(stats.completed_books, 1);
    assert_eq!(stats.total_pages, 10);
}

#[tokio::test]
async fn tracker_unknown_page_count_never_completes() {
    let tracker = test_tracker();

    tracker.add_book(book("Mystery", "", 0)).await.unwrap();
    let id = tracker.find_book("Mystery").unwrap().id;

    let record = tracker.update_progress(&id, 50).await.unwrap();
    assert_eq!(record.current_page, 0);
    assert!(!record.is_completed);
}

#[tokio::test]
async fn tracker_update_book_keeps_completion_flag() {
    let tracker = test_tracker();

    tracker.add_book(book("Dune", "", 100)).await.unwrap();
    let id = tracker.find_book("Dune").unwrap().id;
    tracker.update_progress(&id, 100).await.unwrap();

    let patch = BookPatch {
        page_count: Some(50),
        ..BookPatch::default()
    };
    assert!(tracker.update_book(&id, patch).await.unwrap());

    assert_eq!(tracker.find_book("Dune").unwrap().page_count, 50);

    // The record is flagged in the log, not repaired
    let progress = tracker.progress().unwrap();
    assert_eq!(progress[0].current_page, 100);
    assert!(progress[0].is_completed);
}

#[tokio::test]
async fn tracker_remaining_pages_saturate_after_page_count_shrunk() {
    let tracker = test_tracker();

    tracker.add_book(book("Dune", "", 412)).await.unwrap();
    let id = tracker.find_book("Dune").unwrap().id;
    tracker.update_progress(&id, 300).await.unwrap();

    let patch = BookPatch {
        page_count: Some(100),
        ..BookPatch::default()
    };
    tracker.update_book(&id, patch).await.unwrap();

    // Progress now exceeds the page count; the view reports zero left
    // instead of wrapping around
    let entries = tracker.user_books().unwrap();
    assert_eq!(entries[0].progress.current_page, 300);
    assert!(!entries[0].progress.is_completed);
    assert_eq!(entries[0].pages_remaining(), 0);
    assert_eq!(entries[0].percent, 300);
}

#[tokio::test]
async fn tracker_update_book_rejects_empty_title() {
    let tracker = test_tracker();

    tracker.add_book(book("Dune", "", 412)).await.unwrap();
    let id = tracker.find_book("Dune").unwrap().id;

    let patch = BookPatch {
        title: Some("   ".to_string()),
        ..BookPatch::default()
    };
    assert!(matches!(
        tracker.update_book(&id, patch).await,
        Err(AppError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn tracker_find_book_by_id_and_title() {
    let tracker = test_tracker();

    tracker.add_book(book("Dune", "", 412)).await.unwrap();
    tracker.add_book(book("Dune Messiah", "", 256)).await.unwrap();
    tracker.add_book(book("Emma", "", 474)).await.unwrap();

    let id = tracker.books().unwrap()[0].id.clone();
    assert_eq!(tracker.find_book(&id).unwrap().title, "Dune");

    // Unique substring resolves, ambiguous one is an error
    assert_eq!(tracker.find_book("emm").unwrap().title, "Emma");
    assert_eq!(tracker.find_book("messiah").unwrap().title, "Dune Messiah");
    assert!(matches!(
        tracker.find_book("dune"),
        Err(AppError::InvalidInput(_))
    ));
    assert!(matches!(
        tracker.find_book("persuasion"),
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn tracker_update_profile_trims_and_rejects_empty_name() {
    let tracker = test_tracker();

    let user = tracker
        .update_profile(Some("  Ana  ".to_string()), Some("ana@example.com".to_string()))
        .await
        .unwrap();
    assert_eq!(user.name, "Ana");
    assert_eq!(user.email, "ana@example.com");

    assert!(matches!(
        tracker.update_profile(Some("   ".to_string()), None).await,
        Err(AppError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn tracker_reset_creates_fresh_profile() {
    let tracker = test_tracker();

    let old_id = tracker.user().unwrap().id;
    tracker.add_book(book("Dune", "", 412)).await.unwrap();

    let user = tracker.reset_all().await.unwrap();

    assert_ne!(user.id, old_id);
    assert!(tracker.books().unwrap().is_empty());
    assert!(tracker.progress().unwrap().is_empty());
    assert_eq!(tracker.user().unwrap().id, user.id);
}

// ========== STATS ==========

#[test]
fn stats_zero_for_empty() {
    let stats = calculate_stats(&[]);

    assert_eq!(stats.total_pages, 0);
    assert_eq!(stats.completed_books, 0);
    assert_eq!(stats.streak, 0);
}

#[test]
fn stats_sums_pages_and_counts_completed() {
    let mut records = vec![
        Progress::new("u", "a"),
        Progress::new("u", "b"),
        Progress::new("u", "c"),
    ];
    records[0].current_page = 50;
    records[1].current_page = 120;
    records[2].current_page = 200;
    records[2].is_completed = true;

    let stats = calculate_stats(&records);

    assert_eq!(stats.total_pages, 370);
    assert_eq!(stats.completed_books, 1);
    assert_eq!(stats.streak, 1);
}

#[test]
fn user_books_joins_in_book_order_with_status() {
    let store = test_store();

    let mut dune = book("Dune", "", 412);
    dune.id = "id_dune".to_string();
    let mut emma = book("Emma", "", 474);
    emma.id = "id_emma".to_string();
    let mut short = book("Novella", "", 100);
    short.id = "id_novella".to_string();
    store.save_books(&[dune, emma, short]).unwrap();

    let mut reading = Progress::new("u", "id_emma");
    reading.current_page = 237;
    let mut done = Progress::new("u", "id_novella");
    done.current_page = 100;
    done.is_completed = true;
    let fresh = Progress::new("u", "id_dune");
    store.save_progress(&[fresh, reading, done]).unwrap();

    let entries = user_books(&store.books().unwrap(), &store.progress().unwrap());

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].book.title, "Dune");
    assert_eq!(entries[0].status, ReadingStatus::Want);
    assert_eq!(entries[0].percent, 0);

    assert_eq!(entries[1].book.title, "Emma");
    assert_eq!(entries[1].status, ReadingStatus::Reading);
    assert_eq!(entries[1].percent, 50);
    assert_eq!(entries[1].pages_remaining(), 237);

    assert_eq!(entries[2].book.title, "Novella");
    assert_eq!(entries[2].status, ReadingStatus::Completed);
    assert_eq!(entries[2].percent, 100);
}

#[test]
fn user_books_missing_record_gets_placeholder() {
    let mut orphan = book("Orphan", "", 300);
    orphan.id = "id_orphan".to_string();

    let entries = user_books(&[orphan], &[]);

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, ReadingStatus::Want);
    assert_eq!(entries[0].progress.current_page, 0);
    assert_eq!(entries[0].percent, 0);
}

// ========== LEADERBOARD ==========

#[test]
fn leaderboard_ranking_sorts_and_ranks() {
    let local = peer("id_me", "You", 120);
    let peers = vec![peer("id_a", "Ana", 200), peer("id_b", "Ben", 50)];

    let entries = ranked(&local, &peers);

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].name, "Ana");
    assert_eq!(entries[0].rank, 1);
    assert!(!entries[0].is_current);

    assert_eq!(entries[1].name, "You");
    assert_eq!(entries[1].rank, 2);
    assert!(entries[1].is_current);

    assert_eq!(entries[2].name, "Ben");
    assert_eq!(entries[2].rank, 3);
}

#[test]
fn leaderboard_tie_keeps_local_first() {
    let local = peer("id_me", "You", 100);
    let peers = vec![peer("id_a", "Ana", 100), peer("id_b", "Ben", 100)];

    let entries = ranked(&local, &peers);

    assert_eq!(entries[0].id, "id_me");
    assert_eq!(entries[0].rank, 1);
    assert_eq!(entries[1].id, "id_a");
    assert_eq!(entries[1].rank, 2);
    assert_eq!(entries[2].id, "id_b");
    assert_eq!(entries[2].rank, 3);
}

#[test]
fn leaderboard_drops_remote_self() {
    let local = peer("id_me", "You", 120);
    let peers = vec![peer("id_me", "Stale Me", 999), peer("id_a", "Ana", 50)];

    let entries = ranked(&local, &peers);

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "You");
    assert_eq!(entries[0].pages_read, 120);
}

#[tokio::test]
async fn leaderboard_sync_disabled_is_noop() {
    let tracker = test_tracker();
    let sync = tracker.sync();

    assert!(!sync.is_enabled());
    sync.fetch_peers().await.unwrap();
    assert!(sync.peers().is_empty());

    let user = tracker.user().unwrap();
    let stats = tracker.stats().unwrap();
    sync.push_stats(&user, &stats).await.unwrap();

    let entries = sync.leaderboard(&user, &stats);
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_current);
}

#[test]
fn leaderboard_stream_events_update_cache() {
    let sync = LeaderboardSync::disabled();
    let changes = sync.subscribe();

    sync.apply_stream_event(&put_event(
        "/",
        serde_json::json!({
            "id_a": {"id": "id_a", "name": "Ana", "pagesRead": 200},
            "id_b": {"id": "id_b", "name": "Ben", "pagesRead": 50},
        }),
    ));
    assert_eq!(sync.peers().len(), 2);
    let after_snapshot = *changes.borrow();

    // Child put adds one record
    sync.apply_stream_event(&put_event(
        "/id_c",
        serde_json::json!({"id": "id_c", "name": "Cy", "pagesRead": 10}),
    ));
    assert_eq!(sync.peers().len(), 3);

    // Null data removes the record at the path
    sync.apply_stream_event(&put_event("/id_a", serde_json::Value::Null));
    let peers = sync.peers();
    assert_eq!(peers.len(), 2);
    assert!(peers.iter().all(|entry| entry.id != "id_a"));

    assert!(*changes.borrow() > after_snapshot);
}

#[test]
fn leaderboard_stream_replay_is_idempotent() {
    let sync = LeaderboardSync::disabled();
    let changes = sync.subscribe();

    let snapshot = put_event(
        "/",
        serde_json::json!({"id_a": {"id": "id_a", "name": "Ana", "pagesRead": 200}}),
    );

    sync.apply_stream_event(&snapshot);
    let generation = *changes.borrow();

    sync.apply_stream_event(&snapshot);
    assert_eq!(sync.peers().len(), 1);
    assert_eq!(*changes.borrow(), generation);
}

#[test]
fn leaderboard_keep_alive_and_nested_changes_are_ignored() {
    let sync = LeaderboardSync::disabled();

    sync.apply_stream_event(&put_event(
        "/",
        serde_json::json!({"id_a": {"id": "id_a", "name": "Ana", "pagesRead": 200}}),
    ));

    sync.apply_stream_event(&StreamEvent {
        event: "keep-alive".to_string(),
        data: "null".to_string(),
    });
    sync.apply_stream_event(&put_event("/id_a/pagesRead", serde_json::json!(500)));

    let peers = sync.peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].pages_read, 200);
}

#[test]
fn remote_entry_wire_format_is_camel_case() {
    let entry = peer("id_me", "Ana", 120);
    let json = serde_json::to_string(&entry).unwrap();

    assert!(json.contains("\"pagesRead\":120"));
    assert!(json.contains("\"booksCompleted\":0"));
    assert!(json.contains("\"lastUpdated\":0"));
}

// ========== CONFIG ==========

#[test]
fn config_parse_toml() {
    let toml = r#"
[database]
path = "/tmp/test.db"

[catalog]
url = "https://catalog.example"

[leaderboard]
url = "https://readers.example"
"#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.database.path, std::path::PathBuf::from("/tmp/test.db"));
    assert_eq!(config.catalog.url, "https://catalog.example");
    assert_eq!(config.leaderboard.url.as_deref(), Some("https://readers.example"));
}

#[test]
fn config_default_values() {
    let config = Config::default();
    assert_eq!(config.catalog.url, "https://openlibrary.org");
    assert!(config.leaderboard.url.is_none());
    assert!(config.database.path.ends_with("library.db"));
}
