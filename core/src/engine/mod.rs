//! Contract with the external rendering engine.
//!
//! The engine owns layout, location generation and location comparison. The core only calls
//! into it through [`RenderingEngine`] and receives its lifecycle callbacks as
//! [`EngineSignal`] values.

#[cfg(any(test, feature = "testing"))]
pub mod scripted;

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::ReaderError;
use crate::theme::StyleSheet;
use crate::types::{
    ContentLocation, NavPoint, Point, RawMetadata, ReadingPosition, Rect, SearchHit,
};

#[cfg(any(test, feature = "testing"))]
pub use scripted::{IndexGate, Passage, ScriptedEngine};

pub type EngineResult<T> = std::result::Result<T, ReaderError>;

/// Produces the book's location table. Runs off the UI thread, hence `Send + Sync`.
pub trait LocationGenerator: Send + Sync {
    /// Split the book into locations roughly `granularity` characters apart, in reading order.
    fn generate(&self, granularity: u32) -> EngineResult<Vec<ContentLocation>>;
}

/// Operations the core needs from the rendering surface.
pub trait RenderingEngine {
    /// Start loading the book at `source`. Lifecycle signals follow once it is parsed.
    fn load(&mut self, source: &str) -> EngineResult<()>;
    /// Start loading a book from archive bytes already in memory, e.g. a picked file.
    fn load_bytes(&mut self, bytes: &[u8]) -> EngineResult<()>;
    /// Display the page containing `target`.
    fn display(&mut self, target: &ContentLocation) -> EngineResult<()>;
    fn next_page(&mut self) -> EngineResult<()>;
    fn prev_page(&mut self) -> EngineResult<()>;

    /// Reading-order comparison of two locations.
    fn compare(&self, a: &ContentLocation, b: &ContentLocation) -> Ordering;
    /// Plain text covered by a location or range. Empty for a collapsed point.
    fn range_text(&self, location: &ContentLocation) -> EngineResult<String>;
    /// Text of the node a location starts in, used when the range itself is empty.
    fn start_node_text(&self, location: &ContentLocation) -> EngineResult<String>;
    /// Label of the navigation entry for the section containing `location`.
    fn chapter_label(&self, location: &ContentLocation) -> Option<String>;
    /// Canonical form of a section href for equality checks.
    fn canonical(&self, href: &str) -> String;

    /// Render a bookmark marker.
    fn mark(&mut self, location: &ContentLocation);
    fn unmark(&mut self, location: &ContentLocation);
    /// Shade a range. Taps on it must come back as [`EngineSignal::HighlightTapped`].
    fn highlight(&mut self, range: &ContentLocation);
    fn unhighlight(&mut self, range: &ContentLocation);
    /// On-screen box of a rendered range, if it is currently displayed.
    fn range_bounds(&self, range: &ContentLocation) -> Option<Rect>;
    /// Remove the native text-selection overlay.
    fn clear_selection(&mut self);

    fn apply_styles(&mut self, sheet: &StyleSheet);
    fn location_generator(&self) -> Arc<dyn LocationGenerator>;
    /// Search every section for `query`.
    fn find(&self, query: &str) -> EngineResult<Vec<SearchHit>>;
}

/// Lifecycle callbacks delivered by the engine to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineSignal {
    BookReady,
    MetadataLoaded(RawMetadata),
    NavigationLoaded(Vec<NavPoint>),
    CoverLoaded(Option<String>),
    /// First render started; the saved position can be restored.
    Started,
    Relocated(ReadingPosition),
    Selected(ContentLocation),
    Clicked(Point),
    HighlightTapped(ContentLocation),
    MenuRendered,
    LoadError(String),
    DisplayError(String),
}
