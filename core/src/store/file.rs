//! Single-document JSON backend persisted under the application data directory.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::Result;
use super::backend::StorageBackend;

const STORE_FILE_NAME: &str = "reader-store.json";

/// Stores every record in one JSON file, rewritten atomically through a temp file on each write.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    lock: Mutex<()>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    entries: BTreeMap<String, String>,
}

impl FileBackend {
    /// Open (or lazily create) the store inside `dir`.
    pub fn open_in(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("creating storage directory at {}", dir.display()))?;
        Ok(Self { path: dir.join(STORE_FILE_NAME), lock: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<StoreFile> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing store file {}", self.path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(StoreFile::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_file(&self, file: &StoreFile) -> Result<()> {
        let Some(parent) = self.path.parent() else {
            return Err(anyhow!("store path {} has no parent directory", self.path.display()));
        };
        fs::create_dir_all(parent)?;
        let data = serde_json::to_vec_pretty(file)?;
        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(&data)?;
        temp.flush()?;
        match temp.persist(&self.path) {
            Ok(_) => Ok(()),
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                if let Err(remove_err) = fs::remove_file(&self.path) {
                    if remove_err.kind() != io::ErrorKind::NotFound {
                        return Err(remove_err.into());
                    }
                }
                err.file.persist(&self.path).map(|_| ()).map_err(|again| again.error.into())
            }
            Err(err) => Err(err.error.into()),
        }
    }

    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut StoreFile),
    {
        let _guard = self.lock.lock();
        let mut file = self.read_file()?;
        f(&mut file);
        self.write_file(&file)
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.read_file()?.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.update(|file| {
            file.entries.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|file| {
            file.entries.remove(key);
        })
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_reads_entries() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let backend = FileBackend::open_in(temp.path())?;

        backend.set("book:bookmarks", "[]".into())?;
        backend.set("book:pos", "\"epubcfi(/6/2)\"".into())?;

        let reopened = FileBackend::open_in(temp.path())?;
        assert_eq!(reopened.get("book:bookmarks")?.as_deref(), Some("[]"));
        assert_eq!(reopened.get("book:missing")?, None);
        Ok(())
    }

    #[test]
    fn clear_is_idempotent() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let backend = FileBackend::open_in(temp.path())?;
        backend.set("k", "v".into())?;
        backend.clear()?;
        backend.clear()?;
        assert!(backend.get("k")?.is_none());
        assert!(!backend.path().exists());
        Ok(())
    }

    #[test]
    fn corrupt_file_reports_context() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let backend = FileBackend::open_in(temp.path())?;
        fs::write(backend.path(), b"not json")?;
        let err = backend.get("k").unwrap_err();
        assert!(err.to_string().contains("parsing store file"));
        Ok(())
    }
}
