//! Core of an embeddable ePub reader: position index, annotations, selection menu, persistence
//! and host events around an external rendering engine.

#![deny(missing_debug_implementations)]

pub mod annotations;
pub mod book;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod keymap;
pub mod log;
pub mod position;
pub mod search;
pub mod selection;
pub mod session;
pub mod store;
pub mod theme;
pub mod types;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

pub use config::ReaderConfig;
pub use engine::{EngineSignal, LocationGenerator, RenderingEngine};
pub use error::{ErrorReport, ReaderError};
pub use events::{ReaderEvent, SubscriptionId};
pub use session::{Notice, ReaderSession};
pub use types::{
    BookId, Bookmark, ContentLocation, Highlight, Mark, NumericPosition, ReadingPosition,
};

/// Returns the version of the core crate for telemetry and debugging.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_semver_version() {
        assert!(version().contains('.'));
    }

    #[test]
    fn event_payloads_use_camel_case_fields() {
        let bookmark = Bookmark {
            location: ContentLocation::new("epubcfi(/6/4!/4/2:0)"),
            position: Some(NumericPosition(12)),
            text: "It was a dark and stormy night".into(),
            chapter_label: "Chapter 1".into(),
            seq: 1,
        };
        let json = ReaderEvent::BookmarkAdded { bookmark }.to_json().unwrap();
        assert!(json.starts_with(r#"{"event":"bookmark-added""#));
        assert!(json.contains(r#""chapterLabel":"Chapter 1""#));
    }
}
