//! Flat engines - synchronous string stores
//!
//! TigerStyle: the flat engine stores raw strings only. Encoding structured
//! values is the backend's job, not the engine's.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{EngineError, EngineResult, FlatEngine};
use crate::constants::FLAT_QUOTA_BYTES_DEFAULT;

// =============================================================================
// MemoryFlatEngine
// =============================================================================

/// In-process flat engine with a byte quota over keys plus values.
#[derive(Debug)]
pub struct MemoryFlatEngine {
    items: Mutex<HashMap<String, String>>,
    quota_bytes: usize,
}

impl MemoryFlatEngine {
    /// Create an empty engine with the default quota.
    #[must_use]
    pub fn new() -> Self {
        Self::with_quota(FLAT_QUOTA_BYTES_DEFAULT)
    }

    /// Create an empty engine with a custom quota.
    ///
    /// # Panics
    /// Panics if the quota is zero.
    #[must_use]
    pub fn with_quota(quota_bytes: usize) -> Self {
        assert!(quota_bytes > 0, "quota must be positive");
        Self {
            items: Mutex::new(HashMap::new()),
            quota_bytes,
        }
    }

    /// Bytes currently used by keys and values.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        used_bytes(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryFlatEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn used_bytes(items: &HashMap<String, String>) -> usize {
    items.iter().map(|(k, v)| k.len() + v.len()).sum()
}

impl FlatEngine for MemoryFlatEngine {
    fn get_item(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> EngineResult<()> {
        let mut items = self.lock();

        let replaced = items.get(key).map_or(0, |old| key.len() + old.len());
        let used = used_bytes(&items) - replaced;
        let requested = key.len() + value.len();
        if used + requested > self.quota_bytes {
            return Err(EngineError::QuotaExceeded {
                used,
                requested,
                quota: self.quota_bytes,
            });
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> EngineResult<()> {
        self.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> EngineResult<()> {
        self.lock().clear();
        Ok(())
    }

    fn length(&self) -> usize {
        self.lock().len()
    }
}

// =============================================================================
// FileFlatEngine
// =============================================================================

/// Flat engine persisted as a JSON object in a single file.
///
/// The whole map is rewritten after every mutation, and a mutation only
/// becomes visible once the file is written.
#[derive(Debug)]
pub struct FileFlatEngine {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileFlatEngine {
    /// Open the engine, loading the file if it exists.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed, or the
    /// parent directory cannot be created.
    pub fn open(path: &Path) -> EngineResult<Self> {
        let items: BTreeMap<String, String> = if path.exists() {
            let bytes = std::fs::read(path)?;
            serde_json::from_slice(&bytes)?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            items: Mutex::new(items),
        })
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, items: &BTreeMap<String, String>) -> EngineResult<()> {
        let bytes = serde_json::to_vec_pretty(items)?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }
}

impl FlatEngine for FileFlatEngine {
    fn get_item(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> EngineResult<()> {
        let mut items = self.lock();
        let mut next = items.clone();
        next.insert(key.to_string(), value.to_string());
        self.save(&next)?;
        *items = next;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> EngineResult<()> {
        let mut items = self.lock();
        if !items.contains_key(key) {
            return Ok(());
        }
        let mut next = items.clone();
        next.remove(key);
        self.save(&next)?;
        *items = next;
        Ok(())
    }

    fn clear(&self) -> EngineResult<()> {
        let mut items = self.lock();
        let next = BTreeMap::new();
        self.save(&next)?;
        *items = next;
        Ok(())
    }

    fn length(&self) -> usize {
        self.lock().len()
    }
}

// =============================================================================
// Tests
// =============================================================================
