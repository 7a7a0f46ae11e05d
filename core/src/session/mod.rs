//! Reader session: the context object a host owns for one reading surface.
//!
//! The session wires the rendering engine to the position index, the annotation store, the
//! selection controller and persistence. Engine callbacks enter through [`ReaderSession::handle`]
//! and host notifications leave through the [`EventBus`]. Everything runs on the caller's
//! thread except location generation; call [`ReaderSession::pump`] from the host loop to adopt
//! a finished index.

use std::cmp::Ordering;

use tracing::{debug, error, info, warn};

use crate::annotations::{AnnotationStore, PositionResolver, choose_excerpt};
use crate::book::{BookMetadata, TocEntry, flatten_toc, mark_active, validate_archive};
use crate::config::ReaderConfig;
use crate::engine::{EngineSignal, RenderingEngine};
use crate::error::{ErrorReport, ReaderError};
use crate::events::{EventBus, PageDirection, ReaderEvent, SubscriptionId};
use crate::keymap::{ActionId, InputGesture, Key, Keymap, SwipeTracker, Viewport};
use crate::position::{IndexStatus, PositionIndex};
use crate::search::{ExternalBrowser, SearchEngine, query_url};
use crate::selection::{MenuAction, MenuItem, SelectionCommand, SelectionController, menu_items};
use crate::store::{FileBackend, PersistenceGateway, RecordKey, RecordKind};
use crate::theme::{Theme, ThemeChange};
use crate::types::{
    BookId, Bookmark, ContentLocation, Highlight, Mark, NumericPosition, Point, ReadingPosition,
    SearchHit,
};

/// Non-fatal problem worth telling the user about, e.g. a failed jump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
}

/// Where the open book came from, kept so a failed load can be retried.
#[derive(Debug, Clone)]
enum BookSource {
    Path(String),
    Bytes { name: String, bytes: Vec<u8> },
}

impl BookSource {
    fn name(&self) -> &str {
        match self {
            BookSource::Path(path) => path,
            BookSource::Bytes { name, .. } => name,
        }
    }
}

/// Resolves positions against the live index, falling back to engine order while it builds.
struct IndexResolver<'a> {
    index: &'a PositionIndex,
    engine: &'a dyn RenderingEngine,
}

impl PositionResolver for IndexResolver<'_> {
    fn position(&self, location: &ContentLocation) -> Option<NumericPosition> {
        self.index.location_to_position(location, self.engine).ok()
    }

    fn compare(&self, a: &ContentLocation, b: &ContentLocation) -> Ordering {
        self.engine.compare(a, b)
    }
}

#[derive(Debug)]
pub struct ReaderSession<E> {
    engine: E,
    config: ReaderConfig,
    gateway: PersistenceGateway,
    index: PositionIndex,
    annotations: AnnotationStore,
    selection: SelectionController,
    theme: Theme,
    events: EventBus,
    browser: Option<Box<dyn ExternalBrowser>>,
    book: Option<BookId>,
    source: Option<BookSource>,
    current: Option<ReadingPosition>,
    metadata: BookMetadata,
    toc: Vec<TocEntry>,
    bookmarked: bool,
    indicator: String,
    error: Option<ErrorReport>,
    notice: Option<Notice>,
    note_editor: Option<ContentLocation>,
    search_query: Option<String>,
    search_results: Vec<SearchHit>,
    keymap: Keymap,
    swipe: SwipeTracker,
}

impl<E: RenderingEngine> ReaderSession<E> {
    /// Create a session whose storage follows `config`: a file store under the configured data
    /// directory, or memory only when local storage is off.
    pub fn new(engine: E, config: ReaderConfig) -> crate::Result<Self> {
        let gateway = if config.use_local_storage {
            PersistenceGateway::new(Box::new(FileBackend::open_in(config.resolved_storage_dir())?))
        } else {
            PersistenceGateway::disabled()
        };
        Ok(Self::with_gateway(engine, config, gateway))
    }

    pub fn with_gateway(engine: E, config: ReaderConfig, gateway: PersistenceGateway) -> Self {
        Self {
            engine,
            config,
            gateway,
            index: PositionIndex::new(),
            annotations: AnnotationStore::new(),
            selection: SelectionController::new(),
            theme: Theme::default(),
            events: EventBus::new(),
            browser: None,
            book: None,
            source: None,
            current: None,
            metadata: BookMetadata::default(),
            toc: Vec::new(),
            bookmarked: false,
            indicator: String::new(),
            error: None,
            notice: None,
            note_editor: None,
            search_query: None,
            search_results: Vec::new(),
            keymap: Keymap::default(),
            swipe: SwipeTracker::new(),
        }
    }

    /// Browser used for web searches launched from the selection menu.
    pub fn set_browser(&mut self, browser: impl ExternalBrowser + 'static) {
        self.browser = Some(Box::new(browser));
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&ReaderEvent) + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn gateway(&self) -> &PersistenceGateway {
        &self.gateway
    }

    pub fn book(&self) -> Option<&BookId> {
        self.book.as_ref()
    }

    pub fn metadata(&self) -> &BookMetadata {
        &self.metadata
    }

    pub fn toc(&self) -> &[TocEntry] {
        &self.toc
    }

    pub fn current(&self) -> Option<&ReadingPosition> {
        self.current.as_ref()
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn index_status(&self) -> IndexStatus {
        self.index.status()
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        self.annotations.bookmarks()
    }

    pub fn highlights(&self) -> &[Highlight] {
        self.annotations.highlights()
    }

    pub fn selection(&self) -> &SelectionController {
        &self.selection
    }

    /// Whether the current page carries a bookmark.
    pub fn is_bookmarked(&self) -> bool {
        self.bookmarked
    }

    /// Progress label for the footer.
    pub fn indicator(&self) -> &str {
        &self.indicator
    }

    /// Fatal error state, set until the next successful open.
    pub fn error(&self) -> Option<&ErrorReport> {
        self.error.as_ref()
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    /// Highlight whose note editor is open.
    pub fn note_editor(&self) -> Option<&ContentLocation> {
        self.note_editor.as_ref()
    }

    pub fn search_results(&self) -> &[SearchHit] {
        &self.search_results
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    pub fn keymap_mut(&mut self) -> &mut Keymap {
        &mut self.keymap
    }

    /// Open the book at `source`. Any previously open book is closed first.
    pub fn open(&mut self, source: &str) -> Result<(), ReaderError> {
        self.load(BookSource::Path(source.to_string()))
    }

    /// Open a book from raw archive bytes, rejecting anything that is not an EPUB. `name`
    /// identifies the book for storage, typically the picked file's name.
    pub fn open_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<(), ReaderError> {
        if let Err(err) = validate_archive(bytes) {
            self.source = None;
            return Err(self.fail("invalid file", err, true));
        }
        self.load(BookSource::Bytes { name: name.to_string(), bytes: bytes.to_vec() })
    }

    /// Re-open the last source after a fatal error.
    pub fn retry(&mut self) -> Result<(), ReaderError> {
        let Some(source) = self.source.clone() else {
            return Err(ReaderError::Load("no book to retry".to_string()));
        };
        info!(target: "session", source = source.name(), "retrying");
        self.load(source)
    }

    fn load(&mut self, source: BookSource) -> Result<(), ReaderError> {
        self.close();
        let book = BookId::from_source(source.name());
        info!(target: "session", book = %book, source = source.name(), "opening book");

        self.error = None;
        self.theme =
            self.gateway.load(&RecordKey::new(&book, RecordKind::Settings)).unwrap_or_default();
        self.engine.apply_styles(&self.theme.style_sheet());
        self.book = Some(book);

        let loaded = match &source {
            BookSource::Path(path) => self.engine.load(path),
            BookSource::Bytes { bytes, .. } => self.engine.load_bytes(bytes),
        };
        self.source = Some(source);
        loaded.map_err(|err| self.fail("error loading book", err, false))
    }

    /// Forget the open book. Persisted records are untouched.
    pub fn close(&mut self) {
        if let Some(book) = self.book.take() {
            debug!(target: "session", book = %book, "closing book");
        }
        self.index.reset();
        self.annotations.clear();
        self.selection = SelectionController::new();
        self.current = None;
        self.metadata = BookMetadata::default();
        self.toc.clear();
        self.bookmarked = false;
        self.indicator.clear();
        self.notice = None;
        self.note_editor = None;
        self.search_query = None;
        self.search_results.clear();
        self.swipe = SwipeTracker::new();
    }

    /// Consume one engine callback. Failures are reported, never propagated.
    pub fn handle(&mut self, signal: EngineSignal) {
        match signal {
            EngineSignal::BookReady => self.on_book_ready(),
            EngineSignal::MetadataLoaded(raw) => {
                let cover_url = self.metadata.cover_url.take();
                self.metadata = BookMetadata { cover_url, ..BookMetadata::from_raw(&raw) };
            }
            EngineSignal::NavigationLoaded(points) => {
                self.toc = flatten_toc(&points);
                if let Some(href) = self.current.as_ref().map(|pos| pos.href.clone()) {
                    mark_active(&mut self.toc, &href, |h| self.engine.canonical(h));
                }
            }
            EngineSignal::CoverLoaded(url) => self.metadata.cover_url = url,
            EngineSignal::Started => self.restore_position(),
            EngineSignal::Relocated(position) => self.on_relocated(position),
            EngineSignal::Selected(range) => self.on_selected(range),
            EngineSignal::Clicked(point) => self.on_clicked(point),
            EngineSignal::HighlightTapped(range) => self.on_highlight_tapped(range),
            EngineSignal::MenuRendered => self.selection.menu_rendered(),
            EngineSignal::LoadError(reason) => {
                self.fail("error loading book", ReaderError::Load(reason), false);
            }
            EngineSignal::DisplayError(reason) => {
                self.fail("error displaying book", ReaderError::Load(reason), false);
            }
        }
    }

    fn on_book_ready(&mut self) {
        let Some(book) = self.book.clone() else {
            warn!(target: "session", "book ready without an open book");
            return;
        };

        let bookmarks: Vec<Bookmark> =
            self.gateway.load(&RecordKey::new(&book, RecordKind::Bookmarks)).unwrap_or_default();
        let highlights: Vec<Highlight> =
            self.gateway.load(&RecordKey::new(&book, RecordKind::Highlights)).unwrap_or_default();
        self.annotations.restore(bookmarks, highlights);
        for bookmark in self.annotations.bookmarks() {
            self.engine.mark(&bookmark.location);
        }
        for highlight in self.annotations.highlights() {
            self.engine.highlight(&highlight.location);
        }

        let status = self.index.start(
            &book,
            self.config.index_granularity,
            self.engine.location_generator(),
            &self.gateway,
        );
        self.recompute_order();
        info!(
            target: "session",
            book = %book,
            bookmarks = self.annotations.bookmarks().len(),
            highlights = self.annotations.highlights().len(),
            ?status,
            "book ready"
        );

        let title = Some(self.metadata.title.clone()).filter(|title| !title.is_empty());
        self.events.emit(ReaderEvent::BookOpened { book, title });
    }

    fn restore_position(&mut self) {
        let Some(book) = &self.book else { return };
        let saved: Option<ContentLocation> =
            self.gateway.load(&RecordKey::new(book, RecordKind::CurrentPosition));
        if let Some(location) = saved {
            debug!(target: "session", location = %location, "restoring saved position");
            if let Err(err) = self.engine.display(&location) {
                self.notify(err);
            }
        }
    }

    fn on_relocated(&mut self, position: ReadingPosition) {
        if let Some(book) = &self.book {
            self.gateway.save(&RecordKey::new(book, RecordKind::CurrentPosition), &position.location);
        }
        mark_active(&mut self.toc, &position.href, |h| self.engine.canonical(h));

        let numeric =
            self.index.location_to_position(&position.location, &self.engine).ok().or(position.position);
        self.indicator = self.index.indicator(numeric, position.fraction);

        let location = position.location.clone();
        self.current = Some(position);
        self.refresh_bookmarked();
        self.events.emit(ReaderEvent::PositionChanged { location });
    }

    fn on_selected(&mut self, range: ContentLocation) {
        let already_highlighted = self.annotations.highlight(&range).is_some();
        let text = self.engine.range_text(&range).unwrap_or_default();
        let commands = self.selection.select(range.clone(), already_highlighted);
        self.run(commands);
        self.events.emit(ReaderEvent::TextSelected { range, text });
    }

    fn on_clicked(&mut self, point: Point) {
        let hit = self
            .annotations
            .highlights()
            .iter()
            .find(|h| self.engine.range_bounds(&h.location).is_some_and(|rect| rect.contains(point)))
            .map(|h| h.location.clone());
        match hit {
            Some(range) => self.on_highlight_tapped(range),
            None if !self.selection.is_idle() => {
                self.dismiss();
            }
            None => {}
        }
    }

    fn on_highlight_tapped(&mut self, range: ContentLocation) {
        if self.annotations.highlight(&range).is_none() {
            debug!(target: "session", range = %range, "tap on unknown highlight ignored");
            return;
        }
        let commands = self.selection.tap(range);
        self.run(commands);
    }

    pub fn next_page(&mut self) -> Result<(), ReaderError> {
        self.turn(PageDirection::Next)
    }

    pub fn prev_page(&mut self) -> Result<(), ReaderError> {
        self.turn(PageDirection::Prev)
    }

    fn turn(&mut self, direction: PageDirection) -> Result<(), ReaderError> {
        let turned = match direction {
            PageDirection::Next => self.engine.next_page(),
            PageDirection::Prev => self.engine.prev_page(),
        };
        turned.map_err(|err| self.notify(err))?;
        let location = self.current.as_ref().map(|pos| pos.location.clone());
        self.events.emit(ReaderEvent::PageChanged { direction, location });
        Ok(())
    }

    /// Display `target` directly. Works whether or not the index is built.
    pub fn navigate_to(&mut self, target: &ContentLocation) -> Result<(), ReaderError> {
        debug!(target: "session", location = %target, "navigate");
        self.engine.display(target).map_err(|err| self.notify(err))
    }

    /// Display the location at a numeric position. Needs the index.
    pub fn jump_to_position(&mut self, position: i64) -> Result<ContentLocation, ReaderError> {
        let location = self.index.position_to_location(position).map_err(|err| self.notify(err))?;
        self.engine.display(&location).map_err(|err| self.notify(err))?;

        let book_length = self.index.total().unwrap_or(0);
        self.events.emit(ReaderEvent::LocationJumped {
            position: NumericPosition(position as u32),
            location: location.clone(),
            book_length,
        });
        Ok(location)
    }

    /// Jump to a fraction of the book, as from a progress slider.
    pub fn jump_to_fraction(&mut self, fraction: f32) -> Result<ContentLocation, ReaderError> {
        let position = self.index.position_for_fraction(fraction).map_err(|err| self.notify(err))?;
        self.jump_to_position(i64::from(position.get()))
    }

    /// Adopt a finished index build. Returns `true` when the index just became ready.
    pub fn pump(&mut self) -> bool {
        let ready = self.index.poll(&mut self.gateway);
        if ready {
            self.on_index_ready();
        }
        ready
    }

    /// Block until the index build finishes.
    pub fn wait_for_index(&mut self) -> bool {
        let ready = self.index.wait(&mut self.gateway);
        if ready {
            self.on_index_ready();
        }
        ready
    }

    fn on_index_ready(&mut self) {
        self.recompute_order();
        if let Some(position) = &self.current {
            let numeric = self.index.location_to_position(&position.location, &self.engine).ok();
            self.indicator = self.index.indicator(numeric, position.fraction);
        }
        self.refresh_bookmarked();
    }

    pub fn add_bookmark(&mut self, location: &ContentLocation) -> Option<Bookmark> {
        if self.annotations.bookmark(location).is_some() {
            debug!(target: "session", location = %location, "bookmark already present");
            return None;
        }

        let (text, chapter_label) = self.capture_excerpt(location);
        let bookmark = Bookmark { location: location.clone(), position: None, text, chapter_label, seq: 0 };
        let resolver = IndexResolver { index: &self.index, engine: &self.engine };
        let stored = self.annotations.insert_bookmark(bookmark, &resolver)?;

        self.persist_bookmarks();
        self.engine.mark(location);
        self.refresh_bookmarked();
        self.events.emit(ReaderEvent::BookmarkAdded { bookmark: stored.clone() });
        Some(stored)
    }

    pub fn remove_bookmark(&mut self, location: &ContentLocation) -> Option<Bookmark> {
        let removed = self.annotations.remove_bookmark(location)?;
        self.engine.unmark(location);
        self.persist_bookmarks();
        self.refresh_bookmarked();
        self.events.emit(ReaderEvent::BookmarkRemoved { bookmark: removed.clone() });
        Some(removed)
    }

    /// Bookmark the current page, or remove the bookmark already on it. Returns the new state.
    pub fn toggle_bookmark(&mut self) -> bool {
        let Some(current) = self.current.as_ref().map(|pos| pos.location.clone()) else {
            return false;
        };
        match self.bookmark_on_page(&current) {
            Some(existing) => {
                self.remove_bookmark(&existing);
            }
            None => {
                self.add_bookmark(&current);
            }
        }
        self.bookmarked
    }

    pub fn add_highlight(&mut self, range: &ContentLocation) -> Option<Highlight> {
        if self.annotations.highlight(range).is_some() {
            debug!(target: "session", range = %range, "highlight already present");
            return None;
        }

        let (text, chapter_label) = self.capture_excerpt(range);
        let highlight = Highlight {
            location: range.clone(),
            position: None,
            text,
            chapter_label,
            note: None,
            seq: 0,
        };
        let resolver = IndexResolver { index: &self.index, engine: &self.engine };
        let stored = self.annotations.insert_highlight(highlight, &resolver)?;

        self.persist_highlights();
        self.engine.highlight(range);
        self.engine.clear_selection();
        self.events.emit(ReaderEvent::HighlightAdded { highlight: stored.clone() });
        Some(stored)
    }

    /// Remove the highlight for `range`. Silent when there is none.
    pub fn remove_highlight(&mut self, range: &ContentLocation) -> Option<Highlight> {
        let removed = self.annotations.remove_highlight(range)?;
        self.engine.unhighlight(range);
        self.engine.clear_selection();
        self.selection.forget(range);
        if self.note_editor.as_ref() == Some(range) {
            self.note_editor = None;
        }
        self.persist_highlights();
        self.events.emit(ReaderEvent::HighlightRemoved { highlight: removed.clone() });
        Some(removed)
    }

    /// Attach a note to the highlight for `range`; `None` or blank text clears it.
    pub fn set_note(&mut self, range: &ContentLocation, note: Option<&str>) -> Option<Highlight> {
        let updated = self.annotations.set_note(range, note)?;
        self.persist_highlights();
        self.events.emit(ReaderEvent::NoteSaved { highlight: updated.clone() });
        Some(updated)
    }

    /// Save the text typed into the open note editor and close it.
    pub fn save_note(&mut self, note: Option<&str>) -> Option<Highlight> {
        let range = self.note_editor.take()?;
        self.set_note(&range, note)
    }

    pub fn cancel_note(&mut self) {
        self.note_editor = None;
    }

    /// Re-derive positions for every annotation and re-sort.
    pub fn recompute_order(&mut self) {
        let resolver = IndexResolver { index: &self.index, engine: &self.engine };
        self.annotations.recompute_order(&resolver);
    }

    /// Bookmarks and highlights merged in reading order.
    pub fn marks(&mut self) -> Vec<Mark> {
        self.recompute_order();
        let resolver = IndexResolver { index: &self.index, engine: &self.engine };
        self.annotations.marks(&resolver)
    }

    /// Entries of the open menu, if any.
    pub fn menu(&self) -> Option<Vec<MenuItem>> {
        let active = self.selection.active()?;
        let has_note = self.annotations.highlight(&active.range).is_some_and(|h| h.note.is_some());
        Some(menu_items(has_note))
    }

    pub fn choose(&mut self, action: MenuAction) {
        let commands = self.selection.choose(action);
        self.run(commands);
    }

    /// Close the menu without a choice.
    pub fn dismiss(&mut self) {
        let commands = self.selection.dismiss();
        self.run(commands);
    }

    fn run(&mut self, commands: Vec<SelectionCommand>) {
        for command in commands {
            match command {
                SelectionCommand::CreateHighlight(range) => {
                    self.add_highlight(&range);
                }
                SelectionCommand::RemoveHighlight(range) => {
                    self.remove_highlight(&range);
                }
                SelectionCommand::OpenNoteEditor(range) => self.note_editor = Some(range),
                SelectionCommand::Search { engine, range } => self.search_web(engine, &range),
            }
        }
    }

    fn search_web(&mut self, engine: SearchEngine, range: &ContentLocation) {
        let text = match self.engine.range_text(range) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => self.annotations.highlight(range).map(|h| h.text.clone()).unwrap_or_default(),
        };
        let url = query_url(engine, &text);
        match self.browser.as_mut() {
            Some(browser) => browser.open(&url),
            None => warn!(target: "session", %engine, "no browser configured for web search"),
        }
        self.events.emit(ReaderEvent::SearchExecuted { query: text, engine: Some(engine), results: 0 });
    }

    /// Search the whole book. Results are capped by the configured limit.
    pub fn search_book(&mut self, query: &str) -> Result<Vec<SearchHit>, ReaderError> {
        let mut hits = self.engine.find(query).map_err(|err| self.notify(err))?;
        hits.truncate(self.config.search_result_limit);
        debug!(target: "session", query, results = hits.len(), "book search");

        self.search_results = hits.clone();
        self.events.emit(ReaderEvent::SearchExecuted {
            query: query.to_string(),
            engine: None,
            results: hits.len(),
        });
        Ok(hits)
    }

    pub fn clear_search(&mut self) {
        self.search_results.clear();
    }

    /// Text typed into the search box, run by [`ActionId::SubmitSearch`].
    pub fn set_search_query(&mut self, query: &str) {
        self.search_query = Some(query.to_string()).filter(|q| !q.trim().is_empty());
    }

    pub fn search_query(&self) -> Option<&str> {
        self.search_query.as_deref()
    }

    /// Run whatever `gesture` is bound to. Returns the action taken, `None` when unbound or
    /// when there was nothing to do.
    pub fn handle_input(&mut self, gesture: InputGesture) -> Result<Option<ActionId>, ReaderError> {
        let Some(action) = self.keymap.action(&gesture) else {
            return Ok(None);
        };
        debug!(target: "session", ?gesture, ?action, "input");
        match action {
            ActionId::PrevPage => self.prev_page()?,
            ActionId::NextPage => self.next_page()?,
            ActionId::SubmitSearch => {
                let Some(query) = self.search_query.take() else {
                    return Ok(None);
                };
                self.search_book(&query)?;
            }
        }
        Ok(Some(action))
    }

    /// Key press by DOM key code.
    pub fn key_down(&mut self, code: u32) -> Result<Option<ActionId>, ReaderError> {
        match Key::from_code(code) {
            Some(key) => self.handle_input(InputGesture::Key(key)),
            None => Ok(None),
        }
    }

    pub fn touch_start(&mut self, point: Point) {
        self.swipe.touch_start(point);
    }

    pub fn touch_move(&mut self, point: Point) {
        self.swipe.touch_move(point);
    }

    /// Finish a touch sequence, paging when it was a horizontal swipe.
    pub fn touch_end(
        &mut self,
        point: Point,
        viewport: Viewport,
    ) -> Result<Option<ActionId>, ReaderError> {
        match self.swipe.touch_end(point, viewport) {
            Some(swipe) => self.handle_input(InputGesture::Swipe(swipe)),
            None => Ok(None),
        }
    }

    /// Apply one settings change, persist the theme and push new styles to the engine.
    pub fn change_theme(&mut self, change: ThemeChange) {
        let previous = self.theme.clone();
        self.theme.apply(change);
        if self.theme == previous {
            return;
        }

        if let Some(book) = &self.book {
            self.gateway.save(&RecordKey::new(book, RecordKind::Settings), &self.theme);
        }
        self.engine.apply_styles(&self.theme.style_sheet());
        self.events.emit(ReaderEvent::SettingsChanged { settings: self.theme.clone() });

        if previous.affects_layout(&self.theme) {
            debug!(target: "session", "layout changed, recomputing annotation order");
            self.recompute_order();
            self.refresh_bookmarked();
        }
    }

    /// Wipe every persisted record and the open book's annotations.
    pub fn reset_storage(&mut self) {
        warn!(target: "session", "resetting local storage");
        self.gateway.reset();
        for bookmark in self.annotations.bookmarks() {
            self.engine.unmark(&bookmark.location);
        }
        for highlight in self.annotations.highlights() {
            self.engine.unhighlight(&highlight.location);
        }
        self.annotations.clear();
        self.selection = SelectionController::new();
        self.bookmarked = false;
        self.theme = Theme::default();
        self.engine.apply_styles(&self.theme.style_sheet());
    }

    fn capture_excerpt(&self, location: &ContentLocation) -> (String, String) {
        let range_text = self.engine.range_text(location).unwrap_or_default();
        let node_text = if range_text.trim().is_empty() {
            self.engine.start_node_text(location).unwrap_or_default()
        } else {
            String::new()
        };
        let chapter = self.engine.chapter_label(location);
        let text =
            choose_excerpt(&range_text, &node_text, chapter.as_deref(), self.config.excerpt_chars);
        (text, chapter.unwrap_or_default())
    }

    /// Bookmark at `location`, or at the same numeric position.
    fn bookmark_on_page(&self, location: &ContentLocation) -> Option<ContentLocation> {
        if let Some(bookmark) = self.annotations.bookmark(location) {
            return Some(bookmark.location.clone());
        }
        let numeric = self.index.location_to_position(location, &self.engine).ok()?;
        self.annotations
            .bookmarks()
            .iter()
            .find(|b| b.position == Some(numeric))
            .map(|b| b.location.clone())
    }

    fn refresh_bookmarked(&mut self) {
        self.bookmarked = match self.current.as_ref().map(|pos| pos.location.clone()) {
            Some(location) => self.bookmark_on_page(&location).is_some(),
            None => false,
        };
    }

    fn persist_bookmarks(&mut self) {
        if let Some(book) = &self.book {
            self.gateway.save(&RecordKey::new(book, RecordKind::Bookmarks), self.annotations.bookmarks());
        }
    }

    fn persist_highlights(&mut self) {
        if let Some(book) = &self.book {
            self.gateway
                .save(&RecordKey::new(book, RecordKind::Highlights), self.annotations.highlights());
        }
    }

    fn notify(&mut self, err: ReaderError) -> ReaderError {
        warn!(target: "session", "{err}");
        self.notice = Some(Notice { message: err.to_string() });
        err
    }

    fn fail(&mut self, context: &str, err: ReaderError, users_fault: bool) -> ReaderError {
        error!(target: "session", "{context}: {err}");
        let report = ErrorReport::new(context, &err, users_fault);
        self.error = Some(report.clone());
        self.events.emit(ReaderEvent::FatalError { report });
        err
    }
}
