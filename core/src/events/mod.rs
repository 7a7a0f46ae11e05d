//! Outbound notifications to the embedding host.
//!
//! Event names are part of the host contract and must stay stable.

use std::fmt;

use serde::Serialize;
use tracing::trace;

use crate::error::ErrorReport;
use crate::search::SearchEngine;
use crate::theme::Theme;
use crate::types::{BookId, Bookmark, ContentLocation, Highlight, NumericPosition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageDirection {
    Next,
    Prev,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ReaderEvent {
    #[serde(rename_all = "camelCase")]
    BookOpened { book: BookId, title: Option<String> },
    #[serde(rename_all = "camelCase")]
    PageChanged { direction: PageDirection, location: Option<ContentLocation> },
    #[serde(rename_all = "camelCase")]
    PositionChanged { location: ContentLocation },
    /// Explicit jump to a numeric position.
    #[serde(rename_all = "camelCase")]
    LocationJumped { position: NumericPosition, location: ContentLocation, book_length: usize },
    BookmarkAdded { bookmark: Bookmark },
    BookmarkRemoved { bookmark: Bookmark },
    HighlightAdded { highlight: Highlight },
    HighlightRemoved { highlight: Highlight },
    TextSelected { range: ContentLocation, text: String },
    NoteSaved { highlight: Highlight },
    SettingsChanged { settings: Theme },
    #[serde(rename_all = "camelCase")]
    SearchExecuted { query: String, engine: Option<SearchEngine>, results: usize },
    FatalError { report: ErrorReport },
}

impl ReaderEvent {
    /// Stable event name as seen by the host.
    pub fn name(&self) -> &'static str {
        match self {
            ReaderEvent::BookOpened { .. } => "book-opened",
            ReaderEvent::PageChanged { .. } => "page-changed",
            ReaderEvent::PositionChanged { .. } => "position-changed",
            ReaderEvent::LocationJumped { .. } => "location-jumped",
            ReaderEvent::BookmarkAdded { .. } => "bookmark-added",
            ReaderEvent::BookmarkRemoved { .. } => "bookmark-removed",
            ReaderEvent::HighlightAdded { .. } => "highlight-added",
            ReaderEvent::HighlightRemoved { .. } => "highlight-removed",
            ReaderEvent::TextSelected { .. } => "text-selected",
            ReaderEvent::NoteSaved { .. } => "note-saved",
            ReaderEvent::SettingsChanged { .. } => "settings-changed",
            ReaderEvent::SearchExecuted { .. } => "search-executed",
            ReaderEvent::FatalError { .. } => "fatal-error",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Identifies a listener so it can be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&ReaderEvent)>;

/// Fan-out of reader events to host listeners, in subscription order.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: u64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus").field("listeners", &self.listeners.len()).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&ReaderEvent) + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    pub fn emit(&mut self, event: ReaderEvent) {
        trace!(target: "events", name = event.name(), "emit");
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
    }
}
