//! Raw string key-value backends.

use std::collections::HashMap;
use std::fmt;

use anyhow::anyhow;
use parking_lot::Mutex;

use super::Result;

/// String-keyed storage the gateway writes serialized records into.
///
/// Implementations take `&self` and synchronise internally, mirroring browser-style local
/// storage where any component may read or write.
pub trait StorageBackend: fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: String) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Process-local backend, optionally bounded by a byte quota.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that rejects writes once keys plus values exceed `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self { entries: Mutex::new(HashMap::new()), quota_bytes: Some(quota_bytes) }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn bytes_with(entries: &HashMap<String, String>, key: &str, value: &str) -> usize {
        let others: usize = entries
            .iter()
            .filter(|(existing, _)| existing.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum();
        others + key.len() + value.len()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let mut entries = self.entries.lock();
        if let Some(quota) = self.quota_bytes {
            let needed = Self::bytes_with(&entries, key, &value);
            if needed > quota {
                return Err(anyhow!("storage quota exceeded ({needed} > {quota} bytes)"));
            }
        }
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_rejects_oversized_writes() {
        let backend = MemoryBackend::with_quota(16);
        backend.set("a", "12345".into()).unwrap();
        let err = backend.set("b", "x".repeat(32)).unwrap_err();
        assert!(err.to_string().contains("quota"));
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn replacing_a_key_does_not_double_count() {
        let backend = MemoryBackend::with_quota(10);
        backend.set("key", "1234567".into()).unwrap();
        backend.set("key", "7654321".into()).unwrap();
        assert_eq!(backend.get("key").unwrap().as_deref(), Some("7654321"));
    }
}
