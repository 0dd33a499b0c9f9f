//! In-memory key/value storage for per-peer data items.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::Error;
use crate::error::Result;

/// Thread-safe ordered map holding the data items stored at one peer.
/// Iteration order is the key order, which keeps snapshots deterministic.
#[derive(Debug, Default)]
pub struct MemStore {
    table: Mutex<BTreeMap<String, String>>,
}

impl MemStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.table.lock().map_err(|_| Error::SyncLockPoisoned)
    }

    /// Read a value.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    /// Store a value, replacing any previous one.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// All items in key order.
    pub fn get_all(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .lock()?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Drop a value if present.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    /// Drop everything.
    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    /// Number of stored items.
    pub fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(key))
    }
}
