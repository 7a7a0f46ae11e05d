//! Typed, versioned access to per-book records.
//!
//! Records are addressed by `(BookId, RecordKind)` and stored as JSON wrapped in a
//! `{ "version", "data" }` envelope. Unversioned blobs written by earlier hosts are still read.
//! A failing write flips the gateway into [`GatewayMode::Degraded`]: from then on writes only
//! land in an in-memory shadow so the reading flow never stops on a storage fault.
//! Removals and resets still reach the backend while degraded; when the backend refuses them,
//! the gateway stops reading through to it for the affected keys.

use std::collections::HashSet;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ReaderError;
use crate::types::BookId;

use super::backend::{MemoryBackend, StorageBackend};

/// Current envelope version written by [`PersistenceGateway::save`].
pub const SCHEMA_VERSION: u32 = 1;

/// Kind of record stored for a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Settings,
    /// Generated position index at the given granularity.
    Positions { granularity: u32 },
    Bookmarks,
    Highlights,
    CurrentPosition,
}

impl RecordKind {
    fn slug(self) -> String {
        match self {
            RecordKind::Settings => "settings".to_string(),
            RecordKind::Positions { granularity } => format!("locations-{granularity}"),
            RecordKind::Bookmarks => "bookmarks".to_string(),
            RecordKind::Highlights => "highlights".to_string(),
            RecordKind::CurrentPosition => "pos".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub book: BookId,
    pub kind: RecordKind,
}

impl RecordKey {
    pub fn new(book: &BookId, kind: RecordKind) -> Self {
        Self { book: book.clone(), kind }
    }

    fn storage_key(&self) -> String {
        format!("{}:{}", self.book, self.kind.slug())
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    /// Reads and writes hit the backend.
    Persistent,
    /// A write failed; writes now stay in memory for the rest of the session.
    Degraded,
    /// Local storage is turned off; everything stays in memory.
    Disabled,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T: ?Sized> {
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    version: u32,
    data: T,
}

/// Typed persistence facade owned by the reader session.
#[derive(Debug)]
pub struct PersistenceGateway {
    backend: Box<dyn StorageBackend>,
    shadow: MemoryBackend,
    mode: GatewayMode,
    /// Keys removed while the backend could not be written.
    tombstones: HashSet<String>,
    /// A reset failed to reach the backend; nothing stored there is trusted any more.
    detached: bool,
}

impl PersistenceGateway {
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self::with_mode(backend, GatewayMode::Persistent)
    }

    /// A gateway that never touches durable storage.
    pub fn disabled() -> Self {
        Self::with_mode(Box::new(MemoryBackend::new()), GatewayMode::Disabled)
    }

    fn with_mode(backend: Box<dyn StorageBackend>, mode: GatewayMode) -> Self {
        Self {
            backend,
            shadow: MemoryBackend::new(),
            mode,
            tombstones: HashSet::new(),
            detached: false,
        }
    }

    pub fn mode(&self) -> GatewayMode {
        self.mode
    }

    pub fn is_degraded(&self) -> bool {
        self.mode == GatewayMode::Degraded
    }

    /// Read a record. Absence, unreadable storage and undecodable payloads all yield `None`.
    pub fn load<T: DeserializeOwned>(&self, key: &RecordKey) -> Option<T> {
        let storage_key = key.storage_key();
        let raw = match self.read_raw(&storage_key) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(target: "store::gateway", key = %storage_key, "read failed: {err}");
                return None;
            }
        };

        match decode::<T>(&raw) {
            Ok((version, value)) => {
                if version < SCHEMA_VERSION {
                    debug!(target: "store::gateway", key = %storage_key, version, "read legacy record");
                }
                Some(value)
            }
            Err(err) => {
                warn!(target: "store::gateway", key = %storage_key, "discarding unreadable record: {err}");
                None
            }
        }
    }

    /// Write a record. Never fails the caller: a storage error degrades the gateway instead.
    pub fn save<T: Serialize + ?Sized>(&mut self, key: &RecordKey, value: &T) {
        let storage_key = key.storage_key();
        let encoded =
            match serde_json::to_string(&EnvelopeRef { version: SCHEMA_VERSION, data: value }) {
                Ok(encoded) => encoded,
                Err(err) => {
                    warn!(target: "store::gateway", key = %storage_key, "failed to encode record: {err}");
                    return;
                }
            };

        if self.mode != GatewayMode::Persistent {
            self.write_shadow(&storage_key, encoded);
            return;
        }

        if let Err(err) = self.backend.set(&storage_key, encoded.clone()) {
            self.degrade(&ReaderError::Storage(format!("{err:#}")));
            self.write_shadow(&storage_key, encoded);
        }
    }

    pub fn remove(&mut self, key: &RecordKey) {
        let storage_key = key.storage_key();
        let _ = self.shadow.remove(&storage_key);
        if self.mode == GatewayMode::Disabled {
            return;
        }
        match self.backend.remove(&storage_key) {
            Ok(()) => {
                self.tombstones.remove(&storage_key);
            }
            Err(err) => {
                self.degrade(&ReaderError::Storage(format!("{err:#}")));
                self.tombstones.insert(storage_key);
            }
        }
    }

    /// Drop every stored record, for every book.
    pub fn reset(&mut self) {
        let _ = self.shadow.clear();
        self.tombstones.clear();
        if self.mode == GatewayMode::Disabled {
            return;
        }
        if let Err(err) = self.backend.clear() {
            self.degrade(&ReaderError::Storage(format!("{err:#}")));
            self.detached = true;
        }
    }

    fn read_raw(&self, storage_key: &str) -> super::Result<Option<String>> {
        if let Some(raw) = self.shadow.get(storage_key)? {
            return Ok(Some(raw));
        }
        if self.mode == GatewayMode::Disabled
            || self.detached
            || self.tombstones.contains(storage_key)
        {
            return Ok(None);
        }
        self.backend.get(storage_key)
    }

    fn write_shadow(&self, storage_key: &str, encoded: String) {
        // The shadow is unbounded, so this cannot fail.
        let _ = self.shadow.set(storage_key, encoded);
    }

    fn degrade(&mut self, err: &ReaderError) {
        warn!(target: "store::gateway", "{err}; continuing with in-memory storage");
        self.mode = GatewayMode::Degraded;
    }
}

fn decode<T: DeserializeOwned>(raw: &str) -> serde_json::Result<(u32, T)> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        // Earlier hosts stored the current position as a bare, unquoted string.
        Err(_) => serde_json::Value::String(raw.to_string()),
    };

    let is_envelope = value
        .as_object()
        .map(|object| object.len() == 2 && object.contains_key("version") && object.contains_key("data"))
        .unwrap_or(false);

    if is_envelope {
        let envelope: Envelope<T> = serde_json::from_value(value)?;
        Ok((envelope.version, envelope.data))
    } else {
        Ok((0, serde_json::from_value(value)?))
    }
}
