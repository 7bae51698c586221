//! Rolling history of completed results.
//!
//! The newest result comes first and at most [`MAX_HISTORY`] are kept. The
//! list is stored as one JSON array under [`HISTORY_KEY`] in a
//! [`KeyValueStore`]. Store failures never reach the caller: they are
//! logged and the in-memory list stays authoritative.

use crate::errors::SpeedTestError;
use crate::results::SpeedTestResult;
use log::{debug, warn};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const HISTORY_KEY: &str = "speedTestHistory";

pub const MAX_HISTORY: usize = 10;

/// String values by key.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SpeedTestError>;

    fn set(&self, key: &str, value: &str) -> Result<(), SpeedTestError>;

    fn remove(&self, key: &str) -> Result<(), SpeedTestError>;
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The platform's local data directory, e.g.
    /// `~/.local/share/speedgauge` on Linux.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join(env!("CARGO_PKG_NAME")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, SpeedTestError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error("read", &self.path_for(key), e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SpeedTestError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| storage_error("create", &self.dir, e))?;

        let path = self.path_for(key);
        fs::write(&path, value).map_err(|e| storage_error("write", &path, e))
    }

    fn remove(&self, key: &str) -> Result<(), SpeedTestError> {
        let path = self.path_for(key);

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("remove", &path, e)),
        }
    }
}

fn storage_error(
    action: &str,
    path: &Path,
    error: std::io::Error,
) -> SpeedTestError {
    SpeedTestError::storage(format!(
        "cannot {} {}: {}",
        action,
        path.display(),
        error
    ))
    .with_suggestion("Check that the data directory exists and is writable.")
    .with_source(error)
}

/// Values held in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, SpeedTestError> {
        let values = self
            .values
            .lock()
            .map_err(|_| SpeedTestError::storage("memory store poisoned"))?;

        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SpeedTestError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| SpeedTestError::storage("memory store poisoned"))?;

        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SpeedTestError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| SpeedTestError::storage("memory store poisoned"))?;

        values.remove(key);
        Ok(())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, SpeedTestError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SpeedTestError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), SpeedTestError> {
        (**self).remove(key)
    }
}

/// Newest-first list of at most [`MAX_HISTORY`] results.
pub struct History {
    entries: Vec<SpeedTestResult>,
    store: Box<dyn KeyValueStore>,
}

impl History {
    /// Load the persisted list. An unreadable or corrupt value yields an
    /// empty history.
    pub fn load(store: Box<dyn KeyValueStore>) -> Self {
        let entries = match store.get(HISTORY_KEY) {
            Ok(Some(json)) => parse_entries(&json),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Could not load history: {}", e.message);
                Vec::new()
            }
        };

        debug!("Loaded {} history entries", entries.len());

        Self { entries, store }
    }

    pub fn entries(&self) -> &[SpeedTestResult] {
        &self.entries
    }

    pub fn latest(&self) -> Option<&SpeedTestResult> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Prepend `result`, drop anything beyond the newest ten, persist.
    pub fn push(&mut self, result: SpeedTestResult) {
        self.entries.insert(0, result);
        self.entries.truncate(MAX_HISTORY);
        self.persist();
    }

    pub fn clear(&mut self) {
        self.entries.clear();

        if let Err(e) = self.store.remove(HISTORY_KEY) {
            warn!("Could not clear persisted history: {}", e.message);
        }
    }

    fn persist(&self) {
        let json = match serde_json::to_string(&self.entries) {
            Ok(json) => json,
            Err(e) => {
                warn!("Could not serialize history: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.set(HISTORY_KEY, &json) {
            warn!("Could not save history: {}", e.message);
        }
    }
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History").field("entries", &self.entries).finish()
    }
}

fn parse_entries(json: &str) -> Vec<SpeedTestResult> {
    match serde_json::from_str::<Vec<SpeedTestResult>>(json) {
        Ok(mut entries) => {
            entries.truncate(MAX_HISTORY);
            entries
        }
        Err(e) => {
            warn!("Ignoring corrupt history: {}", e);
            Vec::new()
        }
    }
}
