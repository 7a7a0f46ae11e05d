//! Session configuration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::Result;

pub(crate) const APP_QUALIFIER: &str = "com";
pub(crate) const APP_ORGANISATION: &str = "EpubReader";
pub(crate) const APP_NAME: &str = "epub-reader";

/// Characters per generated location; matches the granularity hosts have historically cached.
pub const DEFAULT_INDEX_GRANULARITY: u32 = 1650;

/// Tunables for a reader session. Every field has a default so partial JSON files load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReaderConfig {
    /// Persist settings, positions and annotations between sessions.
    pub use_local_storage: bool,
    /// Characters per entry in the generated position index.
    pub index_granularity: u32,
    /// Maximum length of a captured annotation excerpt.
    pub excerpt_chars: usize,
    /// Maximum number of in-book search hits kept.
    pub search_result_limit: usize,
    /// Directory holding the storage file. `None` resolves to the platform data directory.
    pub storage_dir: Option<PathBuf>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            use_local_storage: true,
            index_granularity: DEFAULT_INDEX_GRANULARITY,
            excerpt_chars: 200,
            search_result_limit: 200,
            storage_dir: None,
        }
    }
}

impl ReaderConfig {
    /// Load a JSON config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing reader config at {}", path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => {
                Err(err).with_context(|| format!("reading reader config at {}", path.display()))
            }
        }
    }

    pub fn with_local_storage(mut self, enabled: bool) -> Self {
        self.use_local_storage = enabled;
        self
    }

    pub fn with_storage_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.storage_dir = Some(path.into());
        self
    }

    pub fn with_index_granularity(mut self, granularity: u32) -> Self {
        self.index_granularity = granularity.max(1);
        self
    }

    /// Resolve the directory used by the file-backed store.
    pub fn resolved_storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(default_data_dir)
    }
}

pub(crate) fn default_data_dir() -> PathBuf {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANISATION, APP_NAME)
        .map(|dirs| dirs.data_dir().join("state"))
        .unwrap_or_else(|| std::env::temp_dir().join("epub-reader-state"))
}
