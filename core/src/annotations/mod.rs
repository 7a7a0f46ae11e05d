//! Bookmark and highlight collections.
//!
//! Both lists stay sorted by numeric position, ties broken by insertion order (`seq`). The
//! store itself is storage- and engine-agnostic: callers hand it a resolver that maps a
//! location to its position under the current layout.

use std::cmp::Ordering;

use crate::types::{Bookmark, ContentLocation, Highlight, Mark, NumericPosition};

/// Maps locations to positions for sorting. `position` returns `None` while the index is
/// unavailable; `compare` is then used to order entries directly.
pub trait PositionResolver {
    fn position(&self, location: &ContentLocation) -> Option<NumericPosition>;
    fn compare(&self, a: &ContentLocation, b: &ContentLocation) -> Ordering;
}

/// Point-in-time copy of both collections, for comparing store states.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationSnapshot {
    pub bookmarks: Vec<Bookmark>,
    pub highlights: Vec<Highlight>,
}

#[derive(Debug, Default)]
pub struct AnnotationStore {
    bookmarks: Vec<Bookmark>,
    highlights: Vec<Highlight>,
    next_seq: u64,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with previously persisted collections.
    ///
    /// Entries are deduplicated by location (first wins) and legacy entries without a `seq`
    /// get one from their stored order.
    pub fn restore(&mut self, bookmarks: Vec<Bookmark>, highlights: Vec<Highlight>) {
        self.bookmarks.clear();
        self.highlights.clear();
        self.next_seq = bookmarks
            .iter()
            .map(|b| b.seq)
            .chain(highlights.iter().map(|h| h.seq))
            .max()
            .map_or(0, |max| max + 1);

        for mut bookmark in bookmarks {
            if self.bookmark(&bookmark.location).is_some() {
                continue;
            }
            if bookmark.seq == 0 {
                bookmark.seq = self.allocate_seq();
            }
            self.bookmarks.push(bookmark);
        }
        for mut highlight in highlights {
            if self.highlight(&highlight.location).is_some() {
                continue;
            }
            if highlight.seq == 0 {
                highlight.seq = self.allocate_seq();
            }
            self.highlights.push(highlight);
        }
    }

    pub fn snapshot(&self) -> AnnotationSnapshot {
        AnnotationSnapshot { bookmarks: self.bookmarks.clone(), highlights: self.highlights.clone() }
    }

    pub fn clear(&mut self) {
        self.bookmarks.clear();
        self.highlights.clear();
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn highlights(&self) -> &[Highlight] {
        &self.highlights
    }

    pub fn bookmark(&self, location: &ContentLocation) -> Option<&Bookmark> {
        self.bookmarks.iter().find(|b| &b.location == location)
    }

    pub fn highlight(&self, range: &ContentLocation) -> Option<&Highlight> {
        self.highlights.iter().find(|h| &h.location == range)
    }

    /// Insert a bookmark unless one already exists at its location. Returns the stored entry.
    pub fn insert_bookmark(
        &mut self,
        mut bookmark: Bookmark,
        resolver: &dyn PositionResolver,
    ) -> Option<Bookmark> {
        if self.bookmark(&bookmark.location).is_some() {
            return None;
        }
        bookmark.seq = self.allocate_seq();
        self.bookmarks.push(bookmark.clone());
        self.recompute_order(resolver);
        self.bookmark(&bookmark.location).cloned()
    }

    pub fn remove_bookmark(&mut self, location: &ContentLocation) -> Option<Bookmark> {
        let index = self.bookmarks.iter().position(|b| &b.location == location)?;
        Some(self.bookmarks.remove(index))
    }

    /// Insert a highlight unless one already exists for the exact range.
    pub fn insert_highlight(
        &mut self,
        mut highlight: Highlight,
        resolver: &dyn PositionResolver,
    ) -> Option<Highlight> {
        if self.highlight(&highlight.location).is_some() {
            return None;
        }
        highlight.seq = self.allocate_seq();
        self.highlights.push(highlight.clone());
        self.recompute_order(resolver);
        self.highlight(&highlight.location).cloned()
    }

    pub fn remove_highlight(&mut self, range: &ContentLocation) -> Option<Highlight> {
        let index = self.highlights.iter().position(|h| &h.location == range)?;
        Some(self.highlights.remove(index))
    }

    /// Attach or clear the note on the highlight for `range`. An empty or blank note clears it.
    pub fn set_note(&mut self, range: &ContentLocation, note: Option<&str>) -> Option<Highlight> {
        let highlight = self.highlights.iter_mut().find(|h| &h.location == range)?;
        highlight.note = note.map(str::trim).filter(|text| !text.is_empty()).map(str::to_string);
        Some(highlight.clone())
    }

    /// Re-derive every position and re-sort both collections.
    ///
    /// Each collection is ordered by position only when every one of its entries resolves.
    /// Otherwise its positions are cleared and it falls back to `resolver.compare` as a whole,
    /// since positioned and unpositioned entries have no common order.
    pub fn recompute_order(&mut self, resolver: &dyn PositionResolver) {
        reorder(&mut self.bookmarks, resolver);
        reorder(&mut self.highlights, resolver);
    }

    /// Merged bookmarks and highlights in reading order. Call after [`Self::recompute_order`].
    pub fn marks(&self, resolver: &dyn PositionResolver) -> Vec<Mark> {
        let mut marks: Vec<Mark> = self
            .bookmarks
            .iter()
            .cloned()
            .map(Mark::Bookmark)
            .chain(self.highlights.iter().cloned().map(Mark::Highlight))
            .collect();
        marks.sort_by(|a, b| match (a.position(), b.position()) {
            (Some(_), Some(_)) => a.sort_key().cmp(&b.sort_key()),
            _ => resolver.compare(a.location(), b.location()).then(a.sort_key().1.cmp(&b.sort_key().1)),
        });
        marks
    }

    fn allocate_seq(&mut self) -> u64 {
        self.next_seq = self.next_seq.max(1);
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// Fields the ordering needs from either kind of annotation.
trait Ordered {
    fn location(&self) -> &ContentLocation;
    fn seq(&self) -> u64;
    fn position(&self) -> Option<NumericPosition>;
    fn position_mut(&mut self) -> &mut Option<NumericPosition>;
}

impl Ordered for Bookmark {
    fn location(&self) -> &ContentLocation {
        &self.location
    }

    fn seq(&self) -> u64 {
        self.seq
    }

    fn position(&self) -> Option<NumericPosition> {
        self.position
    }

    fn position_mut(&mut self) -> &mut Option<NumericPosition> {
        &mut self.position
    }
}

impl Ordered for Highlight {
    fn location(&self) -> &ContentLocation {
        &self.location
    }

    fn seq(&self) -> u64 {
        self.seq
    }

    fn position(&self) -> Option<NumericPosition> {
        self.position
    }

    fn position_mut(&mut self) -> &mut Option<NumericPosition> {
        &mut self.position
    }
}

fn reorder<T: Ordered>(entries: &mut [T], resolver: &dyn PositionResolver) {
    let positions: Option<Vec<NumericPosition>> =
        entries.iter().map(|entry| resolver.position(entry.location())).collect();

    match positions {
        Some(positions) => {
            for (entry, position) in entries.iter_mut().zip(positions) {
                *entry.position_mut() = Some(position);
            }
            entries.sort_by_key(|entry| (entry.position(), entry.seq()));
        }
        None => {
            for entry in entries.iter_mut() {
                *entry.position_mut() = None;
            }
            entries.sort_by(|a, b| {
                resolver.compare(a.location(), b.location()).then(a.seq().cmp(&b.seq()))
            });
        }
    }
}

/// Choose the excerpt stored with an annotation.
///
/// Uses the range text, falling back to the start of the containing node, truncated to
/// `max_chars`. A chapter label longer than that text replaces it: the location is then most
/// likely the start of a chapter.
pub fn choose_excerpt(
    range_text: &str,
    node_text: &str,
    chapter_label: Option<&str>,
    max_chars: usize,
) -> String {
    let source = if range_text.trim().is_empty() { node_text } else { range_text };
    let text: String = source.trim().chars().take(max_chars).collect();
    match chapter_label.map(str::trim) {
        Some(label) if label.chars().count() > text.chars().count() => label.to_string(),
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Table {
        positions: HashMap<ContentLocation, NumericPosition>,
        pending: bool,
    }

    impl Table {
        fn with(entries: &[(&str, u32)]) -> Self {
            Self {
                positions: entries
                    .iter()
                    .map(|(loc, pos)| (ContentLocation::new(*loc), NumericPosition(*pos)))
                    .collect(),
                pending: false,
            }
        }
    }

    impl PositionResolver for Table {
        fn position(&self, location: &ContentLocation) -> Option<NumericPosition> {
            if self.pending { None } else { self.positions.get(location).copied() }
        }

        fn compare(&self, a: &ContentLocation, b: &ContentLocation) -> Ordering {
            a.cmp(b)
        }
    }

    fn bookmark(loc: &str) -> Bookmark {
        Bookmark {
            location: ContentLocation::new(loc),
            position: None,
            text: format!("text at {loc}"),
            chapter_label: "Chapter".into(),
            seq: 0,
        }
    }

    fn highlight(loc: &str) -> Highlight {
        Highlight {
            location: ContentLocation::new(loc),
            position: None,
            text: format!("quote at {loc}"),
            chapter_label: "Chapter".into(),
            note: None,
            seq: 0,
        }
    }

    fn locations(store: &AnnotationStore) -> Vec<&str> {
        store.bookmarks().iter().map(|b| b.location.as_str()).collect()
    }

    #[test]
    fn inserts_keep_bookmarks_sorted() {
        let table = Table::with(&[("c", 30), ("a", 10), ("b", 20)]);
        let mut store = AnnotationStore::new();
        for loc in ["c", "a", "b"] {
            store.insert_bookmark(bookmark(loc), &table).unwrap();
        }
        assert_eq!(locations(&store), vec!["a", "b", "c"]);
        assert_eq!(store.bookmarks()[0].position, Some(NumericPosition(10)));
    }

    #[test]
    fn duplicate_bookmark_is_a_no_op() {
        let table = Table::with(&[("a", 1)]);
        let mut store = AnnotationStore::new();
        assert!(store.insert_bookmark(bookmark("a"), &table).is_some());
        let before = store.snapshot();
        assert!(store.insert_bookmark(bookmark("a"), &table).is_none());
        assert_eq!(store.snapshot(), before);
        assert_eq!(store.bookmarks().len(), 1);
    }

    #[test]
    fn equal_positions_keep_insertion_order() {
        let table = Table::with(&[("z", 5), ("m", 5), ("a", 5), ("first", 1)]);
        let mut store = AnnotationStore::new();
        for loc in ["z", "m", "a", "first"] {
            store.insert_bookmark(bookmark(loc), &table);
        }
        assert_eq!(locations(&store), vec!["first", "z", "m", "a"]);
    }

    #[test]
    fn reflow_reorders_on_recompute() {
        let mut table = Table::with(&[("a", 1), ("b", 2)]);
        let mut store = AnnotationStore::new();
        store.insert_bookmark(bookmark("a"), &table);
        store.insert_bookmark(bookmark("b"), &table);

        table = Table::with(&[("a", 9), ("b", 2)]);
        store.recompute_order(&table);
        assert_eq!(locations(&store), vec!["b", "a"]);
        assert_eq!(store.bookmarks()[1].position, Some(NumericPosition(9)));
    }

    #[test]
    fn pending_index_orders_by_location_comparison() {
        let mut table = Table::with(&[("b", 1), ("a", 2)]);
        let mut store = AnnotationStore::new();
        store.insert_bookmark(bookmark("a"), &table);
        store.insert_bookmark(bookmark("b"), &table);
        assert_eq!(locations(&store), vec!["b", "a"]);

        table.pending = true;
        store.recompute_order(&table);
        assert_eq!(locations(&store), vec!["a", "b"]);
        assert!(store.bookmarks().iter().all(|b| b.position.is_none()));
    }

    #[test]
    fn unresolved_highlight_does_not_unsort_bookmarks() {
        let table = Table::with(&[("b", 1), ("a", 2)]);
        let mut store = AnnotationStore::new();
        store.restore(vec![bookmark("a"), bookmark("b")], vec![highlight("x"), highlight("h")]);
        store.recompute_order(&table);

        assert_eq!(locations(&store), vec!["b", "a"]);
        assert_eq!(store.bookmarks()[0].position, Some(NumericPosition(1)));
        let ranges: Vec<&str> = store.highlights().iter().map(|h| h.location.as_str()).collect();
        assert_eq!(ranges, vec!["h", "x"]);
        assert!(store.highlights().iter().all(|h| h.position.is_none()));
    }

    #[test]
    fn note_can_be_set_and_cleared() {
        let table = Table::with(&[("r1", 3)]);
        let mut store = AnnotationStore::new();
        store.insert_highlight(highlight("r1"), &table);

        let noted = store.set_note(&ContentLocation::new("r1"), Some("hello")).unwrap();
        assert_eq!(noted.note.as_deref(), Some("hello"));
        let cleared = store.set_note(&ContentLocation::new("r1"), None).unwrap();
        assert_eq!(cleared.note, None);
        assert!(store.set_note(&ContentLocation::new("r1"), Some("   ")).unwrap().note.is_none());
        assert!(store.set_note(&ContentLocation::new("missing"), Some("x")).is_none());
    }

    #[test]
    fn removing_absent_entries_returns_none() {
        let mut store = AnnotationStore::new();
        assert!(store.remove_highlight(&ContentLocation::new("r1")).is_none());
        assert!(store.remove_bookmark(&ContentLocation::new("b1")).is_none());
    }

    #[test]
    fn restore_assigns_seq_and_dedupes() {
        let table = Table::with(&[("a", 1), ("b", 1), ("c", 4), ("h", 2)]);
        let mut store = AnnotationStore::new();
        store.restore(vec![bookmark("b"), bookmark("a"), bookmark("b")], vec![highlight("h")]);
        assert_eq!(store.bookmarks().len(), 2);

        store.recompute_order(&table);
        assert_eq!(locations(&store), vec!["b", "a"]);

        let added = store.insert_bookmark(bookmark("c"), &table).unwrap();
        assert!(added.seq > store.highlights()[0].seq);
    }

    #[test]
    fn marks_merge_both_collections() {
        let table = Table::with(&[("a", 1), ("h", 2), ("b", 3)]);
        let mut store = AnnotationStore::new();
        store.insert_bookmark(bookmark("b"), &table);
        store.insert_highlight(highlight("h"), &table);
        store.insert_bookmark(bookmark("a"), &table);

        let marks = store.marks(&table);
        let order: Vec<&str> = marks.iter().map(|m| m.location().as_str()).collect();
        assert_eq!(order, vec!["a", "h", "b"]);
    }

    #[test]
    fn excerpt_prefers_longer_chapter_label() {
        assert_eq!(choose_excerpt("Hi", "", Some("Chapter One: Beginnings"), 200), "Chapter One: Beginnings");
        assert_eq!(choose_excerpt("A long enough passage", "", Some("Ch. 1"), 200), "A long enough passage");
        assert_eq!(choose_excerpt("", "node text here", None, 4), "node");
    }
}
