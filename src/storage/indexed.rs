//! IndexedBackend - storage over a transactional object-store engine
//!
//! TigerStyle: lazy connection, one transaction per operation, minimum mode.
//!
//! # Connection
//!
//! ```text
//!  Unopened ──first op──→ Opening ──open ok──→ Ready
//!                            │                   │
//!                            └──open failed──→ Unopened
//! ```
//!
//! There is no pending-open queue. Every operation that finds no cached
//! connection issues its own open request, so concurrent operations during
//! `Opening` open concurrently and the last successful open wins the cache.
//! The engine is responsible for serializing the opens.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::error::{Operation, StorageError, StorageResult};
use super::{deliver, BackendKind, Storage};
use crate::config::StorageConfig;
use crate::constants::{DATABASE_NAME_DEFAULT, DATABASE_VERSION_DEFAULT, STORE_NAME_DEFAULT};
use crate::diagnostics::Diagnostics;
use crate::engine::{
    Connection, EngineResult, ObjectStore, ObjectStoreOptions, SchemaEditor, TransactionMode,
    TransactionalEngine, UpgradeHandler,
};

// =============================================================================
// Options
// =============================================================================

/// Where the backend keeps its pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedOptions {
    /// Database name
    pub database_name: String,
    /// Database version
    pub database_version: u32,
    /// Object store name
    pub store_name: String,
}

impl Default for IndexedOptions {
    fn default() -> Self {
        Self {
            database_name: DATABASE_NAME_DEFAULT.to_string(),
            database_version: DATABASE_VERSION_DEFAULT,
            store_name: STORE_NAME_DEFAULT.to_string(),
        }
    }
}

impl From<&StorageConfig> for IndexedOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            database_name: config.database_name.clone(),
            database_version: config.database_version,
            store_name: config.store_name.clone(),
        }
    }
}

/// Lifecycle of the shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no open request in flight
    Unopened,
    /// At least one open request in flight, none completed yet
    Opening,
    /// Connection cached
    Ready,
}

// =============================================================================
// Upgrade
// =============================================================================

/// First-time setup: an empty object store with out-of-line keys.
struct CreateKeyValueStore<'a> {
    store_name: &'a str,
}

impl UpgradeHandler for CreateKeyValueStore<'_> {
    fn on_upgrade_needed(
        &self,
        schema: &mut dyn SchemaEditor,
        old_version: u32,
        new_version: u32,
    ) -> EngineResult<()> {
        if schema.has_object_store(self.store_name) {
            return Ok(());
        }
        tracing::debug!(
            store = self.store_name,
            old_version,
            new_version,
            "creating object store"
        );
        schema.create_object_store(self.store_name, ObjectStoreOptions::default())
    }
}

/// Counts an open request as in flight until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// IndexedBackend
// =============================================================================

/// Storage backed by a [`TransactionalEngine`].
pub struct IndexedBackend {
    engine: Arc<dyn TransactionalEngine>,
    options: IndexedOptions,
    connection: RwLock<Option<Arc<dyn Connection>>>,
    opens_in_flight: AtomicUsize,
    diagnostics: Diagnostics,
}

impl IndexedBackend {
    /// Create a backend. Nothing is opened until the first operation.
    ///
    /// # Panics
    /// Panics if a name is empty or the version is zero.
    #[must_use]
    pub fn new(
        engine: Arc<dyn TransactionalEngine>,
        options: IndexedOptions,
        diagnostics: Diagnostics,
    ) -> Self {
        // Preconditions
        assert!(!options.database_name.is_empty(), "database name cannot be empty");
        assert!(!options.store_name.is_empty(), "store name cannot be empty");
        assert!(options.database_version > 0, "database version must be positive");

        Self {
            engine,
            options,
            connection: RwLock::new(None),
            opens_in_flight: AtomicUsize::new(0),
            diagnostics,
        }
    }

    /// Database and store this backend uses.
    #[must_use]
    pub fn options(&self) -> &IndexedOptions {
        &self.options
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        let ready = self
            .connection
            .try_read()
            .map(|cached| cached.is_some())
            .unwrap_or(false);

        if ready {
            ConnectionState::Ready
        } else if self.opens_in_flight.load(Ordering::SeqCst) > 0 {
            ConnectionState::Opening
        } else {
            ConnectionState::Unopened
        }
    }

    /// Issue an open request and cache the resulting connection.
    async fn open(&self) -> StorageResult<Arc<dyn Connection>> {
        let _in_flight = InFlight::enter(&self.opens_in_flight);
        let upgrade = CreateKeyValueStore {
            store_name: &self.options.store_name,
        };

        let connection = self
            .engine
            .open(
                &self.options.database_name,
                self.options.database_version,
                &upgrade,
            )
            .await
            .map_err(StorageError::connection)?;

        // Postcondition
        assert_eq!(
            connection.version(),
            self.options.database_version,
            "engine must open the requested version"
        );

        tracing::debug!(
            database = %self.options.database_name,
            version = connection.version(),
            "database opened"
        );

        *self.connection.write().await = Some(Arc::clone(&connection));
        Ok(connection)
    }

    /// Object store of a fresh transaction, opening the database if needed.
    async fn with_store(
        &self,
        op: Operation,
        mode: TransactionMode,
    ) -> StorageResult<Box<dyn ObjectStore>> {
        let cached = self.connection.read().await.clone();
        let connection = match cached {
            Some(connection) => connection,
            None => self.open().await?,
        };

        let store = connection
            .transaction(&self.options.store_name, mode)
            .map_err(|e| StorageError::operation(op, e))?;

        // Postcondition
        assert_eq!(store.mode(), mode, "transaction must have the requested mode");

        Ok(store)
    }

    async fn fetch(&self, key: &str) -> StorageResult<Value> {
        let store = self.with_store(Operation::Get, TransactionMode::ReadOnly).await?;
        let value = store
            .get(key)
            .await
            .map_err(|e| StorageError::operation(Operation::Get, e))?;
        Ok(value.unwrap_or(Value::Null))
    }

    async fn put(&self, key: &str, value: Value) -> StorageResult<()> {
        let store = self.with_store(Operation::Set, TransactionMode::ReadWrite).await?;
        store
            .put(key, value)
            .await
            .map_err(|e| StorageError::operation(Operation::Set, e))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let store = self.with_store(Operation::Remove, TransactionMode::ReadWrite).await?;
        store
            .delete(key)
            .await
            .map_err(|e| StorageError::operation(Operation::Remove, e))
    }

    async fn clear_store(&self) -> StorageResult<()> {
        let store = self.with_store(Operation::Clear, TransactionMode::ReadWrite).await?;
        store
            .clear()
            .await
            .map_err(|e| StorageError::operation(Operation::Clear, e))
    }

    async fn count(&self) -> StorageResult<u64> {
        let store = self.with_store(Operation::Length, TransactionMode::ReadOnly).await?;
        store
            .count()
            .await
            .map_err(|e| StorageError::operation(Operation::Length, e))
    }
}

impl std::fmt::Debug for IndexedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedBackend")
            .field("options", &self.options)
            .field("state", &self.connection_state())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Storage for IndexedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Indexed
    }

    fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    async fn try_get(&self, key: &str) -> StorageResult<Value> {
        let result = self.fetch(key).await;
        deliver(result).await
    }

    async fn try_set(&self, key: &str, value: Value) -> StorageResult<()> {
        if value.is_null() {
            return self.try_remove(key).await;
        }
        let result = self.put(key, value).await;
        deliver(result).await
    }

    async fn try_remove(&self, key: &str) -> StorageResult<()> {
        let result = self.delete(key).await;
        deliver(result).await
    }

    async fn try_clear(&self) -> StorageResult<()> {
        let result = self.clear_store().await;
        deliver(result).await
    }

    async fn try_length(&self) -> StorageResult<u64> {
        let result = self.count().await;
        deliver(result).await
    }
}

// =============================================================================
// Tests
// =============================================================================
