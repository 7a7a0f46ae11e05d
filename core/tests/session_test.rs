use std::cell::RefCell;
use std::rc::Rc;

use epub_reader_core::engine::{Passage, ScriptedEngine};
use epub_reader_core::position::IndexStatus;
use epub_reader_core::store::{FileBackend, MemoryBackend, PersistenceGateway};
use epub_reader_core::{
    ContentLocation, EngineSignal, ReaderConfig, ReaderError, ReaderEvent, ReaderSession,
};

fn passages() -> Vec<Passage> {
    (0..20)
        .map(|i| {
            Passage::new(
                format!("epubcfi(/6/{}!/4/2)", i * 2 + 2),
                format!("text/ch{:02}.xhtml", i / 5),
                format!("Chapter {}", i / 5 + 1),
                format!("Paragraph {i} of the story, long enough to count."),
            )
        })
        .collect()
}

fn loc(i: usize) -> ContentLocation {
    ContentLocation::new(format!("epubcfi(/6/{}!/4/2)", i * 2 + 2))
}

fn config() -> ReaderConfig {
    ReaderConfig::default().with_index_granularity(40)
}

fn memory_session(engine: ScriptedEngine) -> ReaderSession<ScriptedEngine> {
    ReaderSession::with_gateway(
        engine,
        config(),
        PersistenceGateway::new(Box::new(MemoryBackend::new())),
    )
}

fn record_events(session: &mut ReaderSession<ScriptedEngine>) -> Rc<RefCell<Vec<String>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    session.subscribe(move |event: &ReaderEvent| sink.borrow_mut().push(event.name().to_string()));
    seen
}

fn ready(session: &mut ReaderSession<ScriptedEngine>) {
    session.open("library/story.epub").unwrap();
    session.handle(EngineSignal::BookReady);
    session.handle(EngineSignal::Started);
    assert!(session.wait_for_index());
}

#[test]
fn bookmarking_the_same_location_twice_keeps_one() {
    let mut session = memory_session(ScriptedEngine::new(passages()));
    ready(&mut session);
    let events = record_events(&mut session);

    assert!(session.add_bookmark(&loc(3)).is_some());
    assert!(session.add_bookmark(&loc(3)).is_none());

    assert_eq!(session.bookmarks().len(), 1);
    assert_eq!(session.bookmarks()[0].location, loc(3));
    assert_eq!(*events.borrow(), vec!["bookmark-added".to_string()]);
}

#[test]
fn note_can_be_added_then_cleared() {
    let mut session = memory_session(ScriptedEngine::new(passages()));
    ready(&mut session);

    session.add_highlight(&loc(6)).unwrap();
    session.set_note(&loc(6), Some("hello")).unwrap();
    let cleared = session.set_note(&loc(6), None).unwrap();

    assert_eq!(cleared.note, None);
    assert_eq!(session.highlights().len(), 1);
    assert!(session.highlights()[0].note.is_none());
}

#[test]
fn navigation_works_while_index_is_building() {
    let (engine, gate) = ScriptedEngine::new(passages()).with_gated_index();
    let mut session = memory_session(engine);
    session.open("library/story.epub").unwrap();
    session.handle(EngineSignal::BookReady);
    assert_eq!(session.index_status(), IndexStatus::Building);

    session.navigate_to(&loc(12)).unwrap();
    assert_eq!(session.engine().displayed(), Some(&loc(12)));
    assert_eq!(session.jump_to_position(1), Err(ReaderError::IndexPending));

    // Annotations still order by the engine comparator in the meantime.
    session.add_bookmark(&loc(9));
    session.add_bookmark(&loc(2));
    let order: Vec<_> = session.bookmarks().iter().map(|b| b.location.clone()).collect();
    assert_eq!(order, vec![loc(2), loc(9)]);
    assert!(session.bookmarks().iter().all(|b| b.position.is_none()));

    gate.release();
    assert!(session.wait_for_index());
    assert!(session.bookmarks().iter().all(|b| b.position.is_some()));
    assert!(session.jump_to_position(1).is_ok());
}

#[test]
fn removing_missing_highlight_emits_nothing() {
    let mut session = memory_session(ScriptedEngine::new(passages()));
    ready(&mut session);
    let events = record_events(&mut session);

    assert!(session.remove_highlight(&loc(4)).is_none());
    assert!(events.borrow().is_empty());
}

#[test]
fn annotations_survive_a_restart_with_file_storage() {
    let temp = tempfile::tempdir().expect("temp dir");

    let mut first = ReaderSession::with_gateway(
        ScriptedEngine::new(passages()),
        config(),
        PersistenceGateway::new(Box::new(FileBackend::open_in(temp.path()).unwrap())),
    );
    ready(&mut first);
    first.add_bookmark(&loc(10));
    first.add_bookmark(&loc(1));
    first.add_highlight(&loc(5));
    first.set_note(&loc(5), Some("foreshadowing"));
    first.navigate_to(&loc(7)).unwrap();
    let position = first.engine().reading_position().unwrap();
    first.handle(EngineSignal::Relocated(position));
    let saved_bookmarks = first.bookmarks().to_vec();
    let saved_highlights = first.highlights().to_vec();
    drop(first);

    let config = config().with_storage_dir(temp.path());
    let mut second = ReaderSession::new(ScriptedEngine::new(passages()), config).unwrap();
    ready(&mut second);

    let strip = |entries: &[epub_reader_core::Bookmark]| {
        entries.iter().map(|b| (b.location.clone(), b.text.clone(), b.seq)).collect::<Vec<_>>()
    };
    assert_eq!(strip(second.bookmarks()), strip(saved_bookmarks.as_slice()));
    assert_eq!(second.highlights()[0].note.as_deref(), Some("foreshadowing"));
    assert_eq!(second.highlights()[0].location, saved_highlights[0].location);
    assert!(second.engine().is_marked(&loc(1)));
    assert!(second.engine().is_highlighted(&loc(5)));
    // Started restored the saved reading position.
    assert_eq!(second.engine().displayed(), Some(&loc(7)));
}

#[test]
fn index_is_reused_from_storage_on_reopen() {
    let mut session = memory_session(ScriptedEngine::new(passages()));
    ready(&mut session);
    let total = match session.index_status() {
        IndexStatus::Ready { total } => total,
        other => panic!("index not ready: {other:?}"),
    };

    session.open("library/story.epub").unwrap();
    session.handle(EngineSignal::BookReady);
    assert_eq!(session.index_status(), IndexStatus::Ready { total });
}

#[test]
fn storage_failure_degrades_without_losing_state() {
    let mut session = ReaderSession::with_gateway(
        ScriptedEngine::new(passages()),
        config(),
        PersistenceGateway::new(Box::new(MemoryBackend::with_quota(64))),
    );
    ready(&mut session);

    session.add_highlight(&loc(2)).unwrap();
    assert!(session.gateway().is_degraded());
    assert_eq!(session.highlights().len(), 1);
}

#[test]
fn page_turns_emit_direction() {
    let mut session = memory_session(ScriptedEngine::new(passages()));
    ready(&mut session);
    let events = record_events(&mut session);

    session.next_page().unwrap();
    session.prev_page().unwrap();
    assert_eq!(*events.borrow(), vec!["page-changed".to_string(), "page-changed".to_string()]);
}

#[test]
fn toc_tracks_current_section() {
    use epub_reader_core::types::NavPoint;

    let mut session = memory_session(ScriptedEngine::new(passages()));
    ready(&mut session);
    session.handle(EngineSignal::NavigationLoaded(vec![
        NavPoint { label: "One".into(), href: "text/ch00.xhtml".into(), children: Vec::new() },
        NavPoint { label: "Two".into(), href: "text/ch01.xhtml#top".into(), children: Vec::new() },
    ]));

    session.navigate_to(&loc(6)).unwrap();
    let position = session.engine().reading_position().unwrap();
    session.handle(EngineSignal::Relocated(position));

    let active: Vec<_> = session.toc().iter().filter(|e| e.active).map(|e| e.label.as_str()).collect();
    assert_eq!(active, vec!["Two"]);
}
