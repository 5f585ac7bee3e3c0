//! Durable storage backends for scheduler and backoff state.
//!
//! State is advisory: a missing or malformed file means "start fresh",
//! and a failed write costs at most one extra or delayed retry.

use crate::error::{OmahaError, Result};
use crate::state::StoredRecord;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Load/save contract for the scheduler's persisted record.
pub trait StateStore: Send {
    /// Read the record, or `None` if nothing has been persisted yet.
    fn load(&self) -> Result<Option<StoredRecord>>;

    /// Overwrite the persisted record.
    fn save(&self, record: &StoredRecord) -> Result<()>;
}

/// A single JSON document on disk, replaced atomically on write.
#[derive(Debug, Clone)]
pub struct JsonFile<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> JsonFile<T> {
    /// Bind to `path`. Nothing is read until [`JsonFile::read`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document. A missing file is `Ok(None)`; a malformed one is
    /// logged and also treated as absent.
    pub fn read(&self) -> Result<Option<T>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(OmahaError::State(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )));
            }
        };

        match serde_json::from_slice::<T>(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(
                    "ignoring malformed state file {}: {e}",
                    self.path.display()
                );
                Ok(None)
            }
        }
    }

    /// Write the document via a temp file and rename.
    pub fn write(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OmahaError::State(format!(
                    "cannot create state directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let json = serde_json::to_string_pretty(value)
            .map_err(|e| OmahaError::State(format!("cannot serialize state: {e}")))?;

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, json).map_err(|e| {
            OmahaError::State(format!("cannot write {}: {e}", tmp_path.display()))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            OmahaError::State(format!("cannot finalize {}: {e}", self.path.display()))
        })?;
        Ok(())
    }
}

/// [`StateStore`] backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    file: JsonFile<StoredRecord>,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<StoredRecord>> {
        self.file.read()
    }

    fn save(&self, record: &StoredRecord) -> Result<()> {
        self.file.write(record)
    }
}

/// In-memory [`StateStore`]. Clones share the same record, so a test can
/// keep a handle while the scheduler owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    record: Arc<Mutex<Option<StoredRecord>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `record`.
    #[must_use]
    pub fn with_record(record: StoredRecord) -> Self {
        Self {
            record: Arc::new(Mutex::new(Some(record))),
        }
    }

    /// Current record, if any.
    pub fn snapshot(&self) -> Option<StoredRecord> {
        self.record.lock().map(|r| r.clone()).unwrap_or(None)
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<StoredRecord>> {
        self.record
            .lock()
            .map(|r| r.clone())
            .map_err(|_| OmahaError::State("memory store lock poisoned".to_owned()))
    }

    fn save(&self, record: &StoredRecord) -> Result<()> {
        let mut guard = self
            .record
            .lock()
            .map_err(|_| OmahaError::State("memory store lock poisoned".to_owned()))?;
        *guard = Some(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn record() -> StoredRecord {
        StoredRecord {
            install_source: Some("organic".to_owned()),
            timestamp_of_install: Some(42),
            send_install_event: Some(false),
            ..Default::default()
        }
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn file_store_round_trip_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("state.json"));
        store.save(&record()).unwrap();

        let restored = store.load().unwrap().expect("record");
        assert_eq!(restored, record());
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn malformed_file_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = JsonFileStore::new(path);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn memory_store_clones_share_record() {
        let store = MemoryStore::new();
        let handle = store.clone();
        assert!(handle.snapshot().is_none());
        store.save(&record()).unwrap();
        assert_eq!(handle.snapshot(), Some(record()));
        assert_eq!(handle.load().unwrap(), Some(record()));
    }
}
