//! Engines - Storage Capabilities of the Host
//!
//! TigerStyle: all persistence goes through injectable interfaces.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │     TransactionalEngine      │   │          FlatEngine          │
//! │  open(name, version) async   │   │  get/set/remove_item (sync)  │
//! │    → Connection              │   │  clear, length               │
//! │      → transaction(mode)     │   │  strings only                │
//! │        → ObjectStore         │   │                              │
//! └──────────────────────────────┘   └──────────────────────────────┘
//!        ↑                                  ↑             ↑
//! ┌──────┴─────────────────┐   ┌────────────┴──────┐ ┌────┴───────────┐
//! │MemoryObjectStoreEngine │   │ MemoryFlatEngine  │ │ FileFlatEngine │
//! └────────────────────────┘   └───────────────────┘ └────────────────┘
//! ```
//!
//! The backends in [`crate::storage`] only ever see these traits, so a host
//! binding (for example a browser's IndexedDB and localStorage) plugs in by
//! implementing them.

mod error;
mod flat;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use error::{EngineError, EngineResult};
pub use flat::{FileFlatEngine, MemoryFlatEngine};
pub use memory::{FaultType, MemoryObjectStoreEngine};

// =============================================================================
// Transactional Engine
// =============================================================================

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
    /// Reads only
    ReadOnly,
    /// Reads and writes
    ReadWrite,
}

impl TransactionMode {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "readonly",
            Self::ReadWrite => "readwrite",
        }
    }
}

impl std::fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Options used when creating an object store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreOptions {
    /// Path inside the value used as key. `None` means keys are supplied
    /// with every operation.
    pub key_path: Option<String>,
    /// Whether the engine generates keys
    pub auto_increment: bool,
}

/// Schema access handed to an [`UpgradeHandler`] while a database upgrades.
pub trait SchemaEditor {
    /// Check if an object store exists.
    fn has_object_store(&self, name: &str) -> bool;

    /// Create an object store.
    ///
    /// # Errors
    /// Returns [`EngineError::DuplicateObjectStore`] if it already exists.
    fn create_object_store(&mut self, name: &str, options: ObjectStoreOptions)
        -> EngineResult<()>;
}

/// Called by the engine when a database is opened at a newer version than
/// the one on record. A database that never existed is at version 0.
pub trait UpgradeHandler: Send + Sync {
    /// Apply schema changes from `old_version` to `new_version`.
    ///
    /// # Errors
    /// Any error aborts the open request.
    fn on_upgrade_needed(
        &self,
        schema: &mut dyn SchemaEditor,
        old_version: u32,
        new_version: u32,
    ) -> EngineResult<()>;
}

/// An asynchronous, versioned object-store engine.
#[async_trait]
pub trait TransactionalEngine: Send + Sync {
    /// Open (or create) a database, running `upgrade` first if `version` is
    /// newer than the stored one.
    ///
    /// # Errors
    /// Fails if the engine refuses the open or the upgrade fails.
    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: &dyn UpgradeHandler,
    ) -> EngineResult<Arc<dyn Connection>>;
}

/// An open database.
pub trait Connection: Send + Sync {
    /// Database name.
    fn name(&self) -> &str;

    /// Version the database was opened at.
    fn version(&self) -> u32;

    /// Start a transaction scoped to a single object store.
    ///
    /// # Errors
    /// Fails if the store does not exist.
    fn transaction(&self, store: &str, mode: TransactionMode)
        -> EngineResult<Box<dyn ObjectStore>>;
}

/// One object store seen through one transaction.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Mode of the owning transaction.
    fn mode(&self) -> TransactionMode;

    /// Read a value.
    async fn get(&self, key: &str) -> EngineResult<Option<Value>>;

    /// Insert or overwrite a value.
    async fn put(&self, key: &str, value: Value) -> EngineResult<()>;

    /// Delete a value. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> EngineResult<()>;

    /// Delete every value.
    async fn clear(&self) -> EngineResult<()>;

    /// Number of values.
    async fn count(&self) -> EngineResult<u64>;
}

// =============================================================================
// Flat Engine
// =============================================================================

/// A synchronous string-to-string store.
pub trait FlatEngine: Send + Sync {
    /// Read the raw string under `key`.
    fn get_item(&self, key: &str) -> Option<String>;

    /// Write the raw string under `key`.
    ///
    /// # Errors
    /// Fails when the engine is out of space or cannot persist.
    fn set_item(&self, key: &str, value: &str) -> EngineResult<()>;

    /// Remove `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    /// Fails when the engine cannot persist.
    fn remove_item(&self, key: &str) -> EngineResult<()>;

    /// Remove every key.
    ///
    /// # Errors
    /// Fails when the engine cannot persist.
    fn clear(&self) -> EngineResult<()>;

    /// Number of keys.
    fn length(&self) -> usize;
}
