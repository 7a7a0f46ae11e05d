//! Position index: content locations ⇄ numeric positions.
//!
//! The location table is produced by the engine's [`LocationGenerator`] on a background thread
//! and cached per `(book, granularity)`. Lookups are never memoised; every call resolves against
//! the current table through the engine's comparator.

use std::cmp::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::{LocationGenerator, RenderingEngine};
use crate::error::ReaderError;
use crate::store::{PersistenceGateway, RecordKey, RecordKind};
use crate::types::{BookId, ContentLocation, NumericPosition};

pub type IndexResult<T> = std::result::Result<T, ReaderError>;

/// Ordered list of locations at a fixed granularity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationTable {
    locations: Vec<ContentLocation>,
}

impl LocationTable {
    pub fn new(locations: Vec<ContentLocation>) -> Self {
        Self { locations }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Insertion point of `location`, clamped to the last entry.
    fn position_of<F>(&self, location: &ContentLocation, cmp: F) -> Option<NumericPosition>
    where
        F: Fn(&ContentLocation, &ContentLocation) -> Ordering,
    {
        if self.locations.is_empty() {
            return None;
        }
        let point = self.locations.partition_point(|entry| cmp(entry, location) == Ordering::Less);
        let last = self.locations.len() - 1;
        Some(NumericPosition(point.min(last) as u32))
    }

    fn location_at(&self, position: i64) -> IndexResult<&ContentLocation> {
        let upper = self.locations.len() as i64 - 1;
        if position < 0 || position > upper {
            return Err(ReaderError::OutOfRange { position, upper });
        }
        Ok(&self.locations[position as usize])
    }
}

type BuildOutcome = IndexResult<LocationTable>;

#[derive(Debug, Default)]
struct BuildSlot {
    outcome: Mutex<Option<BuildOutcome>>,
    done: Condvar,
}

/// Handle on an in-flight background build.
#[derive(Debug)]
struct PendingBuild {
    slot: Arc<BuildSlot>,
    started: Instant,
}

#[derive(Debug, Default)]
enum IndexState {
    #[default]
    Empty,
    Building(PendingBuild),
    Ready(LocationTable),
    Failed(ReaderError),
}

/// Progress of the index, as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Empty,
    Building,
    Ready { total: usize },
    Failed,
}

#[derive(Debug, Default)]
pub struct PositionIndex {
    book: Option<BookId>,
    granularity: u32,
    state: IndexState,
}

impl PositionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> IndexStatus {
        match &self.state {
            IndexState::Empty => IndexStatus::Empty,
            IndexState::Building(_) => IndexStatus::Building,
            IndexState::Ready(table) => IndexStatus::Ready { total: table.len() },
            IndexState::Failed(_) => IndexStatus::Failed,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, IndexState::Ready(_))
    }

    pub fn granularity(&self) -> u32 {
        self.granularity
    }

    /// Number of positions, once built.
    pub fn total(&self) -> Option<usize> {
        self.table().map(LocationTable::len)
    }

    /// Load the cached table for `book`, or start generating it in the background.
    ///
    /// Any build already running for a previous book is abandoned.
    pub fn start(
        &mut self,
        book: &BookId,
        granularity: u32,
        generator: Arc<dyn LocationGenerator>,
        gateway: &PersistenceGateway,
    ) -> IndexStatus {
        self.book = Some(book.clone());
        self.granularity = granularity;

        let key = RecordKey::new(book, RecordKind::Positions { granularity });
        if let Some(table) = gateway.load::<LocationTable>(&key).filter(|t| !t.is_empty()) {
            debug!(target: "position::index", book = %book, total = table.len(), "loaded cached index");
            self.state = IndexState::Ready(table);
            return self.status();
        }

        info!(target: "position::index", book = %book, granularity, "generating position index");
        let slot = Arc::new(BuildSlot::default());
        let worker_slot = Arc::clone(&slot);
        let spawned = thread::Builder::new().name("position-index".to_string()).spawn(move || {
            let outcome = generator.generate(granularity).map(LocationTable::new);
            *worker_slot.outcome.lock() = Some(outcome);
            worker_slot.done.notify_all();
        });

        self.state = match spawned {
            Ok(_) => IndexState::Building(PendingBuild { slot, started: Instant::now() }),
            Err(err) => {
                warn!(target: "position::index", "failed to spawn index worker: {err}");
                IndexState::Failed(ReaderError::Load(format!("index worker: {err}")))
            }
        };
        self.status()
    }

    /// Adopt a finished background build, persisting it. Returns `true` when the index just
    /// became ready.
    pub fn poll(&mut self, gateway: &mut PersistenceGateway) -> bool {
        let outcome = match &self.state {
            IndexState::Building(pending) => pending.slot.outcome.lock().take(),
            _ => None,
        };
        match outcome {
            Some(outcome) => self.finish(outcome, gateway),
            None => false,
        }
    }

    /// Block until a running build completes. Intended for hosts without an event loop.
    pub fn wait(&mut self, gateway: &mut PersistenceGateway) -> bool {
        let outcome = match &self.state {
            IndexState::Building(pending) => {
                let mut guard = pending.slot.outcome.lock();
                while guard.is_none() {
                    pending.slot.done.wait(&mut guard);
                }
                guard.take()
            }
            _ => None,
        };
        match outcome {
            Some(outcome) => self.finish(outcome, gateway),
            None => self.is_ready(),
        }
    }

    fn finish(&mut self, outcome: BuildOutcome, gateway: &mut PersistenceGateway) -> bool {
        let elapsed_ms = match &self.state {
            IndexState::Building(pending) => pending.started.elapsed().as_millis() as u64,
            _ => 0,
        };
        match outcome {
            Ok(table) => {
                if let Some(book) = &self.book {
                    let key =
                        RecordKey::new(book, RecordKind::Positions { granularity: self.granularity });
                    gateway.save(&key, &table);
                }
                info!(target: "position::index", total = table.len(), elapsed_ms, "position index ready");
                self.state = IndexState::Ready(table);
                true
            }
            Err(err) => {
                warn!(target: "position::index", "error generating locations: {err}");
                self.state = IndexState::Failed(err);
                false
            }
        }
    }

    /// Drop the table, e.g. when the book is closed.
    pub fn reset(&mut self) {
        self.book = None;
        self.state = IndexState::Empty;
    }

    fn table(&self) -> Option<&LocationTable> {
        match &self.state {
            IndexState::Ready(table) => Some(table),
            _ => None,
        }
    }

    fn ready_table(&self) -> IndexResult<&LocationTable> {
        match &self.state {
            IndexState::Ready(table) => Ok(table),
            IndexState::Failed(ReaderError::Load(reason)) => {
                Err(ReaderError::IndexUnavailable(reason.clone()))
            }
            IndexState::Failed(err) => Err(ReaderError::IndexUnavailable(err.to_string())),
            IndexState::Empty | IndexState::Building(_) => Err(ReaderError::IndexPending),
        }
    }

    pub fn location_to_position(
        &self,
        location: &ContentLocation,
        engine: &dyn RenderingEngine,
    ) -> IndexResult<NumericPosition> {
        let table = self.ready_table()?;
        table
            .position_of(location, |a, b| engine.compare(a, b))
            .ok_or(ReaderError::IndexPending)
    }

    pub fn position_to_location(&self, position: i64) -> IndexResult<ContentLocation> {
        self.ready_table()?.location_at(position).cloned()
    }

    /// Fraction of the book at `position`, `0.0..=1.0`.
    pub fn fraction_for_position(&self, position: NumericPosition) -> IndexResult<f32> {
        let table = self.ready_table()?;
        if table.is_empty() {
            return Ok(0.0);
        }
        Ok((position.get() as f32 / table.len() as f32).clamp(0.0, 1.0))
    }

    pub fn position_for_fraction(&self, fraction: f32) -> IndexResult<NumericPosition> {
        let table = self.ready_table()?;
        let last = table.len().saturating_sub(1);
        let raw = (fraction.clamp(0.0, 1.0) * table.len() as f32).floor() as usize;
        Ok(NumericPosition(raw.min(last) as u32))
    }

    /// Progress label: `"Loc n/total"` once positions are known, a percentage otherwise.
    pub fn indicator(&self, position: Option<NumericPosition>, fraction: f32) -> String {
        match (position, self.total()) {
            (Some(pos), Some(total)) if pos.get() > 0 => format!("Loc {pos}/{total}"),
            _ if fraction > 0.0 && fraction < 1.0 => format!("{}%", (fraction * 100.0).round()),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Passage, ScriptedEngine};
    use crate::store::MemoryBackend;

    fn engine(count: usize) -> ScriptedEngine {
        ScriptedEngine::new(
            (0..count)
                .map(|i| Passage::new(format!("loc-{i:03}"), "ch.xhtml", "Chapter", "abcdefghij"))
                .collect(),
        )
    }

    fn gateway() -> PersistenceGateway {
        PersistenceGateway::new(Box::new(MemoryBackend::new()))
    }

    fn ready_index(engine: &ScriptedEngine, gateway: &mut PersistenceGateway) -> PositionIndex {
        let mut index = PositionIndex::new();
        index.start(&BookId::new("book"), 10, engine.location_generator(), gateway);
        assert!(index.wait(gateway));
        index
    }

    #[test]
    fn round_trips_positions() {
        let engine = engine(20);
        let mut gateway = gateway();
        let index = ready_index(&engine, &mut gateway);

        let loc = ContentLocation::new("loc-007");
        let pos = index.location_to_position(&loc, &engine).unwrap();
        let back = index.position_to_location(pos.get() as i64).unwrap();
        assert_eq!(index.location_to_position(&back, &engine).unwrap(), pos);
    }

    #[test]
    fn rejects_out_of_range_positions() {
        let engine = engine(5);
        let mut gateway = gateway();
        let index = ready_index(&engine, &mut gateway);

        assert!(matches!(index.position_to_location(-1), Err(ReaderError::OutOfRange { .. })));
        assert!(matches!(
            index.position_to_location(5),
            Err(ReaderError::OutOfRange { position: 5, upper: 4 })
        ));
        assert!(index.position_to_location(4).is_ok());
    }

    #[derive(Debug)]
    struct BrokenGenerator;

    impl LocationGenerator for BrokenGenerator {
        fn generate(&self, _granularity: u32) -> IndexResult<Vec<ContentLocation>> {
            Err(ReaderError::Load("spine is empty".to_string()))
        }
    }

    #[test]
    fn failed_build_reports_unavailable_positions() {
        let mut gateway = gateway();
        let mut index = PositionIndex::new();
        index.start(&BookId::new("book"), 10, Arc::new(BrokenGenerator), &gateway);
        assert!(!index.wait(&mut gateway));
        assert_eq!(index.status(), IndexStatus::Failed);

        let err = index.position_to_location(0).unwrap_err();
        assert_eq!(err, ReaderError::IndexUnavailable("spine is empty".to_string()));
        assert!(!err.is_fatal());
        assert!(!err.to_string().contains("failed to load book"));
    }

    #[test]
    fn pending_index_reports_index_pending() {
        let (engine, gate) = engine(5).with_gated_index();
        let mut gateway = gateway();
        let mut index = PositionIndex::new();
        index.start(&BookId::new("book"), 10, engine.location_generator(), &gateway);

        assert_eq!(index.status(), IndexStatus::Building);
        assert!(!index.poll(&mut gateway));
        assert_eq!(
            index.location_to_position(&ContentLocation::new("loc-001"), &engine),
            Err(ReaderError::IndexPending)
        );

        gate.release();
        assert!(index.wait(&mut gateway));
        assert_eq!(index.status(), IndexStatus::Ready { total: 5 });
    }

    #[test]
    fn built_index_is_cached_per_granularity() {
        let engine = engine(8);
        let mut gateway = gateway();
        let _ = ready_index(&engine, &mut gateway);

        let (gated, _gate) = engine_gated();
        let mut again = PositionIndex::new();
        let status = again.start(&BookId::new("book"), 10, gated.location_generator(), &gateway);
        assert_eq!(status, IndexStatus::Ready { total: 8 });

        let mut other = PositionIndex::new();
        let status = other.start(&BookId::new("book"), 20, gated.location_generator(), &gateway);
        assert_eq!(status, IndexStatus::Building);
    }

    fn engine_gated() -> (ScriptedEngine, crate::engine::IndexGate) {
        engine(8).with_gated_index()
    }

    #[test]
    fn unknown_locations_clamp_to_last_entry() {
        let engine = engine(4);
        let mut gateway = gateway();
        let index = ready_index(&engine, &mut gateway);
        let pos = index.location_to_position(&ContentLocation::new("zzz"), &engine).unwrap();
        assert_eq!(pos, NumericPosition(3));
    }

    #[test]
    fn indicator_prefers_location_then_percentage() {
        let engine = engine(10);
        let mut gateway = gateway();
        let index = ready_index(&engine, &mut gateway);

        assert_eq!(index.indicator(Some(NumericPosition(3)), 0.3), "Loc 3/10");
        assert_eq!(index.indicator(Some(NumericPosition(0)), 0.25), "25%");
        assert_eq!(index.indicator(None, 0.0), "");
        assert_eq!(index.position_for_fraction(0.5).unwrap(), NumericPosition(5));
        assert_eq!(index.position_for_fraction(1.0).unwrap(), NumericPosition(9));
        assert!((index.fraction_for_position(NumericPosition(5)).unwrap() - 0.5).abs() < f32::EPSILON);
    }
}
