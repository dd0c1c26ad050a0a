//! Durable key-value backends for persisted state.
//!
//! Values are opaque strings. [`FileStore`] keeps one file per key under the
//! configured state directory; [`MemoryStore`] is process-local and used
//! when nothing should touch disk (tests, the demo server with `--ephemeral`).

use std::collections::HashMap;
use std::fs;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::StoreConfig;

/// A minimal durable key-value interface.
///
/// Implementations must make `put` atomic per key: a reader sees either the
/// previous value or the new one, never a torn write.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

// Compile-time assertion: KeyValueStore must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn KeyValueStore) {}
};

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// Stores each key as `<state_dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    config: StoreConfig,
}

impl FileStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.config.path_for_key(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("failed to read state file {}", path.display()))
            }
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let dir = self.config.state_dir();
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create state directory {}", dir.display()))?;

        let path = self.config.path_for_key(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)
            .with_context(|| format!("failed to write state file {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to replace state file {}", path.display()))?;

        debug!(key, path = %path.display(), "state written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.config.path_for_key(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("failed to remove state file {}", path.display()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}
