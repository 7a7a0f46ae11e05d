//! In-memory rendering engine for tests and headless hosts.
//!
//! The book is a flat list of [`Passage`]s in reading order. Each passage location doubles as
//! a selectable range, and locations are ordered by passage index.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::ReaderError;
use crate::theme::StyleSheet;
use crate::types::{ContentLocation, ReadingPosition, Rect, SearchHit};

use super::{EngineResult, LocationGenerator, RenderingEngine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    pub location: ContentLocation,
    pub href: String,
    pub chapter: String,
    pub text: String,
}

impl Passage {
    pub fn new(
        location: impl Into<String>,
        href: impl Into<String>,
        chapter: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            location: ContentLocation::new(location),
            href: href.into(),
            chapter: chapter.into(),
            text: text.into(),
        }
    }
}

/// Blocks location generation until [`IndexGate::release`] is called.
#[derive(Debug, Clone, Default)]
pub struct IndexGate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl IndexGate {
    pub fn release(&self) {
        let (open, cvar) = &*self.inner;
        *open.lock() = true;
        cvar.notify_all();
    }

    fn wait(&self) {
        let (open, cvar) = &*self.inner;
        let mut guard = open.lock();
        while !*guard {
            cvar.wait(&mut guard);
        }
    }
}

#[derive(Debug)]
struct ScriptedGenerator {
    passages: Vec<Passage>,
    gate: Option<IndexGate>,
}

impl LocationGenerator for ScriptedGenerator {
    fn generate(&self, granularity: u32) -> EngineResult<Vec<ContentLocation>> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }

        let mut locations = Vec::new();
        let mut budget = 0usize;
        for passage in &self.passages {
            if locations.is_empty() || budget >= granularity as usize {
                locations.push(passage.location.clone());
                budget = 0;
            }
            budget += passage.text.chars().count();
        }
        Ok(locations)
    }
}

/// Deterministic [`RenderingEngine`] backed by a list of passages.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    passages: Vec<Passage>,
    order: HashMap<ContentLocation, usize>,
    gate: Option<IndexGate>,
    displayed: Option<usize>,
    marks: BTreeSet<ContentLocation>,
    highlights: BTreeSet<ContentLocation>,
    bounds: HashMap<ContentLocation, Rect>,
    styles: Option<StyleSheet>,
    selection_clears: usize,
    loaded: Option<String>,
    loaded_bytes: Option<usize>,
    load_failure: Option<String>,
}

impl ScriptedEngine {
    pub fn new(passages: Vec<Passage>) -> Self {
        let order = passages
            .iter()
            .enumerate()
            .map(|(index, passage)| (passage.location.clone(), index))
            .collect();
        Self { passages, order, ..Self::default() }
    }

    /// Hold location generation until the returned gate is released.
    pub fn with_gated_index(mut self) -> (Self, IndexGate) {
        let gate = IndexGate::default();
        self.gate = Some(gate.clone());
        (self, gate)
    }

    /// Make the next [`RenderingEngine::load`] call fail with `reason`.
    pub fn reject_next_load(&mut self, reason: impl Into<String>) {
        self.load_failure = Some(reason.into());
    }

    pub fn loaded(&self) -> Option<&str> {
        self.loaded.as_deref()
    }

    /// Size of the archive handed to [`RenderingEngine::load_bytes`], if that is how the book
    /// was loaded.
    pub fn loaded_bytes(&self) -> Option<usize> {
        self.loaded_bytes
    }

    fn begin_load(&mut self) -> EngineResult<()> {
        if let Some(reason) = self.load_failure.take() {
            return Err(ReaderError::Load(reason));
        }
        self.displayed = None;
        Ok(())
    }

    pub fn set_bounds(&mut self, range: &ContentLocation, rect: Rect) {
        self.bounds.insert(range.clone(), rect);
    }

    pub fn displayed(&self) -> Option<&ContentLocation> {
        self.displayed.map(|index| &self.passages[index].location)
    }

    /// Relocation payload for the displayed passage, as a real engine would report it.
    pub fn reading_position(&self) -> Option<ReadingPosition> {
        let index = self.displayed?;
        let passage = &self.passages[index];
        Some(ReadingPosition {
            location: passage.location.clone(),
            href: passage.href.clone(),
            position: None,
            fraction: index as f32 / self.passages.len().max(1) as f32,
        })
    }

    pub fn is_marked(&self, location: &ContentLocation) -> bool {
        self.marks.contains(location)
    }

    pub fn is_highlighted(&self, range: &ContentLocation) -> bool {
        self.highlights.contains(range)
    }

    pub fn styles(&self) -> Option<&StyleSheet> {
        self.styles.as_ref()
    }

    pub fn selection_clears(&self) -> usize {
        self.selection_clears
    }

    fn index_of(&self, location: &ContentLocation) -> Option<usize> {
        self.order.get(location).copied()
    }

    fn passage(&self, location: &ContentLocation) -> EngineResult<&Passage> {
        self.index_of(location)
            .map(|index| &self.passages[index])
            .ok_or_else(|| ReaderError::navigation(location, "unknown location"))
    }

    fn step(&mut self, forward: bool) -> EngineResult<()> {
        let current = self.displayed.unwrap_or(0);
        let next = if forward {
            (current + 1).min(self.passages.len().saturating_sub(1))
        } else {
            current.saturating_sub(1)
        };
        self.displayed = Some(next);
        Ok(())
    }
}

impl RenderingEngine for ScriptedEngine {
    fn load(&mut self, source: &str) -> EngineResult<()> {
        self.begin_load()?;
        self.loaded = Some(source.to_string());
        self.loaded_bytes = None;
        Ok(())
    }

    fn load_bytes(&mut self, bytes: &[u8]) -> EngineResult<()> {
        self.begin_load()?;
        self.loaded = None;
        self.loaded_bytes = Some(bytes.len());
        Ok(())
    }

    fn display(&mut self, target: &ContentLocation) -> EngineResult<()> {
        let index =
            self.index_of(target).ok_or_else(|| ReaderError::navigation(target, "unknown location"))?;
        self.displayed = Some(index);
        Ok(())
    }

    fn next_page(&mut self) -> EngineResult<()> {
        self.step(true)
    }

    fn prev_page(&mut self) -> EngineResult<()> {
        self.step(false)
    }

    fn compare(&self, a: &ContentLocation, b: &ContentLocation) -> Ordering {
        match (self.index_of(a), self.index_of(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => a.cmp(b),
        }
    }

    fn range_text(&self, location: &ContentLocation) -> EngineResult<String> {
        Ok(self.passage(location)?.text.clone())
    }

    fn start_node_text(&self, location: &ContentLocation) -> EngineResult<String> {
        self.range_text(location)
    }

    fn chapter_label(&self, location: &ContentLocation) -> Option<String> {
        self.passage(location).ok().map(|passage| passage.chapter.clone())
    }

    fn canonical(&self, href: &str) -> String {
        href.split('#').next().unwrap_or(href).trim_start_matches("./").to_string()
    }

    fn mark(&mut self, location: &ContentLocation) {
        self.marks.insert(location.clone());
    }

    fn unmark(&mut self, location: &ContentLocation) {
        self.marks.remove(location);
    }

    fn highlight(&mut self, range: &ContentLocation) {
        self.highlights.insert(range.clone());
    }

    fn unhighlight(&mut self, range: &ContentLocation) {
        self.highlights.remove(range);
    }

    fn range_bounds(&self, range: &ContentLocation) -> Option<Rect> {
        self.bounds.get(range).copied()
    }

    fn clear_selection(&mut self) {
        self.selection_clears += 1;
    }

    fn apply_styles(&mut self, sheet: &StyleSheet) {
        self.styles = Some(sheet.clone());
    }

    fn location_generator(&self) -> Arc<dyn LocationGenerator> {
        Arc::new(ScriptedGenerator { passages: self.passages.clone(), gate: self.gate.clone() })
    }

    fn find(&self, query: &str) -> EngineResult<Vec<SearchHit>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(ReaderError::Search("empty query".to_string()));
        }
        Ok(self
            .passages
            .iter()
            .filter(|passage| passage.text.to_lowercase().contains(&needle))
            .map(|passage| SearchHit {
                location: passage.location.clone(),
                excerpt: passage.text.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> Vec<Passage> {
        (0..6)
            .map(|i| {
                Passage::new(
                    format!("epubcfi(/6/{}!/4/2)", i * 2 + 2),
                    format!("ch{}.xhtml", i / 2),
                    format!("Chapter {}", i / 2 + 1),
                    "x".repeat(100),
                )
            })
            .collect()
    }

    #[test]
    fn generator_respects_granularity() {
        let engine = ScriptedEngine::new(book());
        let locations = engine.location_generator().generate(200).unwrap();
        assert_eq!(locations.len(), 3);
        assert_eq!(locations[0].as_str(), "epubcfi(/6/2!/4/2)");
    }

    #[test]
    fn paging_clamps_to_book_bounds() {
        let mut engine = ScriptedEngine::new(book());
        engine.prev_page().unwrap();
        assert_eq!(engine.displayed().unwrap().as_str(), "epubcfi(/6/2!/4/2)");
        for _ in 0..10 {
            engine.next_page().unwrap();
        }
        assert_eq!(engine.displayed().unwrap().as_str(), "epubcfi(/6/12!/4/2)");
    }

    #[test]
    fn rejected_load_fails_once() {
        let mut engine = ScriptedEngine::new(book());
        engine.reject_next_load("corrupt container");
        assert!(matches!(engine.load("a.epub"), Err(ReaderError::Load(_))));
        assert!(engine.load("a.epub").is_ok());
        assert_eq!(engine.loaded(), Some("a.epub"));
    }

    #[test]
    fn loading_bytes_replaces_path_source() {
        let mut engine = ScriptedEngine::new(book());
        engine.load("a.epub").unwrap();
        engine.load_bytes(&[0x50, 0x4b, 0x03, 0x04]).unwrap();
        assert_eq!(engine.loaded(), None);
        assert_eq!(engine.loaded_bytes(), Some(4));
    }

    #[test]
    fn canonical_strips_fragments() {
        let engine = ScriptedEngine::new(book());
        assert_eq!(engine.canonical("./ch1.xhtml#sec2"), "ch1.xhtml");
    }
}
