//! End-to-end tests driving a reading session through its public API
//! with mock renderers and an in-memory store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use folio::session::{ReaderEvent, ReaderSession};
use folio::settings::ReaderSettings;
use folio::store::JsonBookStore;
use folio::test_utils::{MemorySurface, MockFactory, anchor_toc, chapter_toc};
use folio::{BookFormat, BookRecord, BookStore, NavCommand, ReadingMode};
use tempfile::TempDir;

fn fake_pdf(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("book.pdf");
    std::fs::write(&path, b"%PDF-1.4 fake body").unwrap();
    path
}

fn open_session(factory: MockFactory) -> (ReaderSession, TempDir) {
    let dir = TempDir::new().unwrap();
    let path = fake_pdf(&dir);
    let session = ReaderSession::open(
        "book-1",
        &path,
        Arc::new(factory),
        Box::new(JsonBookStore::ephemeral()),
        Box::new(MemorySurface::new()),
        ReaderSettings::default(),
    )
    .unwrap();
    (session, dir)
}

/// Tick until a ContentReady for `page` arrives, collecting every event
fn tick_until_ready(session: &mut ReaderSession, page: usize) -> Vec<ReaderEvent> {
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut events = Vec::new();
    loop {
        session.tick(Instant::now());
        events.extend(session.drain_events());
        if events
            .iter()
            .any(|e| matches!(e, ReaderEvent::ContentReady { page: p } if *p == page))
        {
            return events;
        }
        assert!(
            Instant::now() < deadline,
            "page {page} never became ready; events: {events:?}"
        );
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn go_to_page_commits_then_content_arrives() {
    let (mut session, _dir) = open_session(MockFactory::pages(100));
    let now = Instant::now();

    session.go_to_page(50, now);

    // Navigation commits synchronously, content catches up on tick
    let state = session.ui_state();
    assert_eq!(state.current_page, 50);
    assert!(!state.content_ready);

    let events = tick_until_ready(&mut session, 50);
    assert!(events.contains(&ReaderEvent::PageChanged { page: 50 }));
    assert!(session.ui_state().content_ready);
}

#[test]
fn out_of_range_target_clamps_to_last_page() {
    let (mut session, _dir) = open_session(MockFactory::pages(100));

    session.go_to_page(5000, Instant::now());
    assert_eq!(session.ui_state().current_page, 100);
}

#[test]
fn undo_returns_to_origin_and_empties_the_slot() {
    let (mut session, _dir) = open_session(MockFactory::pages(100));
    let now = Instant::now();

    session.go_to_page(10, now);
    session.go_to_page(20, now);
    session.tick(now);
    assert!(session.ui_state().undo_active);

    session.undo_jump(now);
    assert_eq!(session.ui_state().current_page, 10);

    session.tick(now);
    let events = session.drain_events();
    assert!(events.contains(&ReaderEvent::UndoChanged { active: false }));

    // Slot is single-use
    session.undo_jump(now);
    assert_eq!(session.ui_state().current_page, 10);
}

#[test]
fn chapter_navigation_walks_the_toc() {
    let (mut session, _dir) =
        open_session(MockFactory::pages(100).with_toc(chapter_toc(5)));
    let now = Instant::now();

    session.go_to_page(15, now);
    session.command(NavCommand::NextChapter, now);
    assert_eq!(session.ui_state().current_page, 21);

    session.command(NavCommand::PrevChapter, now);
    assert_eq!(session.ui_state().current_page, 11);
}

#[test]
fn seek_scrub_previews_only_the_settled_position() {
    let (mut session, _dir) = open_session(MockFactory::pages(100));
    let t0 = Instant::now();

    session.seek_start(t0);
    for (i, page) in [5, 17, 42, 80].iter().enumerate() {
        session.seek_change(*page, t0 + Duration::from_millis(i as u64 * 10));
    }

    // Still inside the quiet period: scrubbing shows a label, no render
    session.tick(t0 + Duration::from_millis(40));
    assert_eq!(session.ui_state().seeking, Some(80));
    assert_eq!(session.ui_state().current_page, 1);

    // Quiet period elapsed: the settled position previews, skipped
    // positions never render
    let settled = t0 + Duration::from_millis(300);
    session.tick(settled);
    let events = tick_until_ready(&mut session, 80);
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, ReaderEvent::ContentReady { page: 17 | 42 })),
        "skipped scrub positions rendered: {events:?}"
    );

    session.seek_end(80, settled);
    assert_eq!(session.ui_state().current_page, 80);
    assert_eq!(session.ui_state().seeking, None);
}

#[test]
fn mode_switches_recover_to_fresh_content() {
    let (mut session, _dir) = open_session(
        MockFactory::pages(100).with_render_delay(Duration::from_millis(20)),
    );
    let now = Instant::now();

    session.go_to_page(30, now);

    // Two quick switches strand the in-flight renders behind stale
    // tokens; the live generation still converges to ready content.
    session.switch_mode(ReadingMode::Continuous, now);
    session.switch_mode(ReadingMode::Paged, now);
    assert!(!session.ui_state().content_ready);

    tick_until_ready(&mut session, 30);
    assert_eq!(session.ui_state().current_page, 30);
}

#[test]
fn continuous_scroll_derives_the_committed_page() {
    let (mut session, _dir) = open_session(MockFactory::pages(100));
    let now = Instant::now();
    session.switch_mode(ReadingMode::Continuous, now);
    session.drain_events();

    // Estimated page height 1200 plus a 1px divider
    session.scroll_to(2500, now + Duration::from_millis(16));
    assert_eq!(session.ui_state().current_page, 3);
    assert!(
        session
            .drain_events()
            .contains(&ReaderEvent::PageChanged { page: 3 })
    );

    // Scrolling within the same page does not re-announce it
    session.scroll_to(2600, now + Duration::from_millis(32));
    assert!(session.drain_events().is_empty());
}

#[test]
fn reaching_the_last_page_emits_finished_and_persists() {
    let dir = TempDir::new().unwrap();
    let path = fake_pdf(&dir);
    let store_path = dir.path().join("books.json");

    let mut session = ReaderSession::open(
        "book-1",
        &path,
        Arc::new(MockFactory::pages(10)),
        Box::new(JsonBookStore::with_file(&store_path).unwrap()),
        Box::new(MemorySurface::new()),
        ReaderSettings::default(),
    )
    .unwrap();

    session.go_to_page(10, Instant::now());
    session.tick(Instant::now());
    assert!(session.drain_events().contains(&ReaderEvent::Finished));
    drop(session);

    let store = JsonBookStore::with_file(&store_path).unwrap();
    let record = store.get_book("book-1").unwrap();
    assert!(record.finished);
    assert_eq!(record.current_page, 10);
}

#[test]
fn stored_position_resumes_on_open() {
    let dir = TempDir::new().unwrap();
    let path = fake_pdf(&dir);
    let store_path = dir.path().join("books.json");

    {
        let mut session = ReaderSession::open(
            "book-1",
            &path,
            Arc::new(MockFactory::pages(100)),
            Box::new(JsonBookStore::with_file(&store_path).unwrap()),
            Box::new(MemorySurface::new()),
            ReaderSettings::default(),
        )
        .unwrap();
        session.go_to_page(42, Instant::now());
    }

    let session = ReaderSession::open(
        "book-1",
        &path,
        Arc::new(MockFactory::pages(100)),
        Box::new(JsonBookStore::with_file(&store_path).unwrap()),
        Box::new(MemorySurface::new()),
        ReaderSettings::default(),
    )
    .unwrap();
    assert_eq!(session.ui_state().current_page, 42);
}

#[test]
fn accelerated_init_failure_opens_degraded() {
    let (mut session, _dir) = open_session(MockFactory::pages(10).fail_accelerated_init());

    session.go_to_page(5, Instant::now());
    tick_until_ready(&mut session, 5);
}

#[test]
fn unusable_backend_fails_open() {
    let dir = TempDir::new().unwrap();
    let path = fake_pdf(&dir);

    let result = ReaderSession::open(
        "book-1",
        &path,
        Arc::new(MockFactory::pages(10).fail_all_init()),
        Box::new(JsonBookStore::ephemeral()),
        Box::new(MemorySurface::new()),
        ReaderSettings::default(),
    );
    assert!(result.is_err());
}

#[test]
fn unknown_bytes_fail_the_format_sniff() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mystery.bin");
    std::fs::write(&path, [0u8, 159, 146, 150]).unwrap();

    let result = ReaderSession::open(
        "book-1",
        &path,
        Arc::new(MockFactory::pages(10)),
        Box::new(JsonBookStore::ephemeral()),
        Box::new(MemorySurface::new()),
        ReaderSettings::default(),
    );
    assert!(result.is_err());
}

#[test]
fn anchor_toc_entries_resolve_for_chapter_navigation() {
    let (mut session, _dir) =
        open_session(MockFactory::pages(100).with_toc(anchor_toc(10)));
    let now = Instant::now();

    session.go_to_page(50, now);
    session.command(NavCommand::NextChapter, now);
    assert_eq!(session.ui_state().current_page, 51);

    session.command(NavCommand::PrevChapter, now);
    assert_eq!(session.ui_state().current_page, 41);
}

#[test]
fn anchor_jump_lands_on_its_page_and_arms_undo() {
    let (mut session, _dir) =
        open_session(MockFactory::pages(100).with_toc(anchor_toc(10)));
    let now = Instant::now();

    assert!(session.go_to_anchor("ch3", now));
    assert_eq!(session.ui_state().current_page, 21);
    assert!(session.ui_state().undo_active);

    assert!(!session.go_to_anchor("missing", now));
    assert_eq!(session.ui_state().current_page, 21);
}

#[test]
fn backend_progress_overrides_the_persisted_position() {
    let dir = TempDir::new().unwrap();
    let path = fake_pdf(&dir);
    let store_path = dir.path().join("books.json");

    {
        let mut session = ReaderSession::open(
            "book-1",
            &path,
            Arc::new(MockFactory::pages(100).reporting_progress(0.5)),
            Box::new(JsonBookStore::with_file(&store_path).unwrap()),
            Box::new(MemorySurface::new()),
            ReaderSettings::default(),
        )
        .unwrap();
        session.go_to_page(30, Instant::now());
    }

    let store = JsonBookStore::with_file(&store_path).unwrap();
    let record = store.get_book("book-1").unwrap();
    assert_eq!(record.precise_progress, 50.0);
}

#[test]
fn subscribers_hear_events_without_polling() {
    let (mut session, _dir) = open_session(MockFactory::pages(100));
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    session.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

    session.go_to_page(7, Instant::now());
    assert!(seen
        .lock()
        .unwrap()
        .contains(&ReaderEvent::PageChanged { page: 7 }));
    // The polled queue still carries the same event
    assert!(session
        .drain_events()
        .contains(&ReaderEvent::PageChanged { page: 7 }));
}

#[test]
fn continuous_resume_restores_the_scroll_offset() {
    let dir = TempDir::new().unwrap();
    let path = fake_pdf(&dir);
    let store_path = dir.path().join("books.json");

    let mut record = BookRecord::new("book-1", &path, BookFormat::Pdf);
    record.total_pages = 100;
    record.current_page = 42;
    record.mode = ReadingMode::Continuous;
    let mut store = JsonBookStore::with_file(&store_path).unwrap();
    store.insert(record).unwrap();

    let session = ReaderSession::open(
        "book-1",
        &path,
        Arc::new(MockFactory::pages(100)),
        Box::new(store),
        Box::new(MemorySurface::new()),
        ReaderSettings::default(),
    )
    .unwrap();

    assert_eq!(session.book().mode, ReadingMode::Continuous);
    // Page 42 sits below 41 pages of 1200 units plus the 1-unit gaps
    assert_eq!(session.scroll_offset(), 41 * 1201);
}

#[test]
fn capture_produces_a_decodable_png_of_the_surface() {
    let (mut session, _dir) = open_session(MockFactory::pages(10));

    session.go_to_page(3, Instant::now());
    tick_until_ready(&mut session, 3);

    let png = session.capture().unwrap();
    assert!(png.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]));

    let decoded = image::load_from_memory(&png).unwrap();
    assert_eq!(decoded.width(), 21);
    assert_eq!(decoded.height(), 1);
}
