//! Shared data structures exchanged between the core, the rendering engine, and the host.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of an opened book. Namespaces every persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(String);

impl BookId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Derive a stable identity from the source URL or path the book was opened from.
    pub fn from_source(source: &str) -> Self {
        let hash = blake3::hash(source.trim().as_bytes());
        let hex = hash.to_hex();
        Self(format!("epub-{}", &hex.as_str()[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque, reflow-stable fragment identifier supplied by the rendering engine.
///
/// In practice this is an EPUB CFI (point or range). The core never parses it; ordering
/// between two locations is always asked of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentLocation(String);

impl ContentLocation {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentLocation {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Linear ordering of a location along the reading order. Only valid for the layout it was
/// computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NumericPosition(pub u32);

impl NumericPosition {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NumericPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A position marker created at the current reading location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub location: ContentLocation,
    #[serde(default)]
    pub position: Option<NumericPosition>,
    pub text: String,
    #[serde(default)]
    pub chapter_label: String,
    #[serde(default)]
    pub seq: u64,
}

/// A confirmed text selection, optionally carrying a free-text note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub location: ContentLocation,
    #[serde(default)]
    pub position: Option<NumericPosition>,
    pub text: String,
    #[serde(default)]
    pub chapter_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub seq: u64,
}

/// Either kind of annotation, used for the merged "marks" view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Mark {
    Bookmark(Bookmark),
    Highlight(Highlight),
}

impl Mark {
    pub fn location(&self) -> &ContentLocation {
        match self {
            Mark::Bookmark(b) => &b.location,
            Mark::Highlight(h) => &h.location,
        }
    }

    pub fn position(&self) -> Option<NumericPosition> {
        match self {
            Mark::Bookmark(b) => b.position,
            Mark::Highlight(h) => h.position,
        }
    }

    fn seq(&self) -> u64 {
        match self {
            Mark::Bookmark(b) => b.seq,
            Mark::Highlight(h) => h.seq,
        }
    }

    pub(crate) fn sort_key(&self) -> (Option<NumericPosition>, u64) {
        (self.position(), self.seq())
    }
}

/// Payload of a relocation: where the visible page now starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingPosition {
    pub location: ContentLocation,
    /// Section href the page belongs to.
    pub href: String,
    /// Engine-reported position, when its own index is ready.
    #[serde(default)]
    pub position: Option<NumericPosition>,
    /// Engine-reported fraction of the book, `0.0..=1.0`.
    #[serde(default)]
    pub fraction: f32,
}

/// Point in rendering-surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Axis-aligned bounding box of a rendered range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    /// Strict containment; taps on the border do not count.
    pub fn contains(&self, point: Point) -> bool {
        point.x > self.left && point.x < self.right && point.y > self.top && point.y < self.bottom
    }
}

/// Raw document metadata as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMetadata {
    pub title: String,
    pub creator: String,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub series_index: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// Node of the engine's navigation tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavPoint {
    pub label: String,
    pub href: String,
    #[serde(default)]
    pub children: Vec<NavPoint>,
}

/// A single in-book search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub location: ContentLocation,
    pub excerpt: String,
}
