//! MemoryObjectStoreEngine - In-process Transactional Engine
//!
//! TigerStyle: deterministic stand-in for a browser object-store engine,
//! with fault injection and optional snapshot persistence.
//!
//! Every request (open or store operation) completes on a later scheduler
//! turn, like the request/event model of the engine it stands in for.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    Connection, EngineError, EngineResult, ObjectStore, ObjectStoreOptions, SchemaEditor,
    TransactionMode, TransactionalEngine, UpgradeHandler,
};
use crate::constants::NAME_BYTES_MAX;

// =============================================================================
// Faults
// =============================================================================

/// Faults that can be injected into [`MemoryObjectStoreEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultType {
    /// Every open request fails
    OpenFail,
    /// Every object store operation fails
    OperationFail,
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    options: ObjectStoreOptions,
    entries: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DatabaseState {
    version: u32,
    stores: HashMap<String, StoreState>,
}

#[derive(Debug, Default)]
struct Shared {
    databases: Mutex<HashMap<String, DatabaseState>>,
    snapshot_path: Option<PathBuf>,
    open_fail: AtomicBool,
    operation_fail: AtomicBool,
    open_requests: AtomicU64,
    readonly_transactions: AtomicU64,
    readwrite_transactions: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, DatabaseState>> {
        self.databases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fault_flag(&self, fault: FaultType) -> &AtomicBool {
        match fault {
            FaultType::OpenFail => &self.open_fail,
            FaultType::OperationFail => &self.operation_fail,
        }
    }

    fn is_faulted(&self, fault: FaultType) -> bool {
        self.fault_flag(fault).load(Ordering::SeqCst)
    }

    /// Write the snapshot file, if one is configured.
    fn persist(&self, databases: &HashMap<String, DatabaseState>) -> EngineResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(databases)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Let the request complete on a later turn, then apply faults.
    async fn settle_request(&self) -> EngineResult<()> {
        tokio::task::yield_now().await;
        if self.is_faulted(FaultType::OperationFail) {
            return Err(EngineError::Injected("object store operation failed"));
        }
        Ok(())
    }
}

// =============================================================================
// MemoryObjectStoreEngine
// =============================================================================

/// In-process transactional engine.
///
/// Cloning yields another handle to the same databases, which lets tests keep
/// an inspection handle while a backend owns the engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStoreEngine {
    shared: Arc<Shared>,
}

impl MemoryObjectStoreEngine {
    /// Create an empty engine that lives in memory only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine persisted to a JSON snapshot file.
    ///
    /// The snapshot is loaded if it exists and rewritten after every write.
    ///
    /// # Errors
    /// Returns error if the snapshot exists but cannot be read or parsed.
    pub fn with_snapshot(path: &Path) -> EngineResult<Self> {
        let databases: HashMap<String, DatabaseState> = if path.exists() {
            let bytes = std::fs::read(path)?;
            serde_json::from_slice(&bytes)?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            HashMap::new()
        };

        tracing::debug!(path = %path.display(), databases = databases.len(), "loaded object store snapshot");

        Ok(Self {
            shared: Arc::new(Shared {
                databases: Mutex::new(databases),
                snapshot_path: Some(path.to_path_buf()),
                ..Shared::default()
            }),
        })
    }

    /// Start failing requests of the given kind.
    pub fn inject(&self, fault: FaultType) {
        self.shared.fault_flag(fault).store(true, Ordering::SeqCst);
    }

    /// Stop failing requests of the given kind.
    pub fn heal(&self, fault: FaultType) {
        self.shared.fault_flag(fault).store(false, Ordering::SeqCst);
    }

    /// Number of open requests received so far.
    #[must_use]
    pub fn open_requests(&self) -> u64 {
        self.shared.open_requests.load(Ordering::SeqCst)
    }

    /// Number of transactions started in the given mode.
    #[must_use]
    pub fn transactions_started(&self, mode: TransactionMode) -> u64 {
        match mode {
            TransactionMode::ReadOnly => self.shared.readonly_transactions.load(Ordering::SeqCst),
            TransactionMode::ReadWrite => self.shared.readwrite_transactions.load(Ordering::SeqCst),
        }
    }

    /// Version of a database, `None` if it was never created.
    #[must_use]
    pub fn database_version(&self, name: &str) -> Option<u32> {
        self.shared.lock().get(name).map(|db| db.version)
    }

    /// Sorted object store names of a database.
    #[must_use]
    pub fn object_store_names(&self, name: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .shared
            .lock()
            .get(name)
            .map(|db| db.stores.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Creation options of an object store.
    #[must_use]
    pub fn object_store_options(&self, name: &str, store: &str) -> Option<ObjectStoreOptions> {
        self.shared
            .lock()
            .get(name)
            .and_then(|db| db.stores.get(store))
            .map(|s| s.options.clone())
    }
}

#[async_trait]
impl TransactionalEngine for MemoryObjectStoreEngine {
    async fn open(
        &self,
        name: &str,
        version: u32,
        upgrade: &dyn UpgradeHandler,
    ) -> EngineResult<Arc<dyn Connection>> {
        // Preconditions
        assert!(!name.is_empty(), "database name cannot be empty");
        assert!(
            name.len() <= NAME_BYTES_MAX,
            "database name {} bytes exceeds max {}",
            name.len(),
            NAME_BYTES_MAX
        );
        assert!(version > 0, "database version must be positive");

        self.shared.open_requests.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if self.shared.is_faulted(FaultType::OpenFail) {
            return Err(EngineError::Injected("open request failed"));
        }

        {
            let mut databases = self.shared.lock();
            let current = databases.get(name).map_or(0, |db| db.version);

            if version < current {
                return Err(EngineError::VersionMismatch {
                    name: name.to_string(),
                    current,
                    requested: version,
                });
            }

            if version > current {
                // Upgrade against a copy so a failing handler leaves no trace
                let mut stores = databases
                    .get(name)
                    .map(|db| db.stores.clone())
                    .unwrap_or_default();
                upgrade.on_upgrade_needed(&mut MemorySchema { stores: &mut stores }, current, version)?;

                let previous =
                    databases.insert(name.to_string(), DatabaseState { version, stores });
                if let Err(error) = self.shared.persist(&databases) {
                    match previous {
                        Some(db) => databases.insert(name.to_string(), db),
                        None => databases.remove(name),
                    };
                    return Err(error);
                }

                tracing::debug!(
                    database = name,
                    old_version = current,
                    new_version = version,
                    "upgraded database"
                );
            }
        }

        Ok(Arc::new(MemoryConnection {
            shared: Arc::clone(&self.shared),
            name: name.to_string(),
            version,
        }))
    }
}

// =============================================================================
// Schema
// =============================================================================

struct MemorySchema<'a> {
    stores: &'a mut HashMap<String, StoreState>,
}

impl SchemaEditor for MemorySchema<'_> {
    fn has_object_store(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    fn create_object_store(
        &mut self,
        name: &str,
        options: ObjectStoreOptions,
    ) -> EngineResult<()> {
        assert!(!name.is_empty(), "object store name cannot be empty");

        if self.stores.contains_key(name) {
            return Err(EngineError::DuplicateObjectStore(name.to_string()));
        }
        self.stores.insert(
            name.to_string(),
            StoreState {
                options,
                entries: HashMap::new(),
            },
        );
        Ok(())
    }
}

// =============================================================================
// Connection
// =============================================================================

struct MemoryConnection {
    shared: Arc<Shared>,
    name: String,
    version: u32,
}

impl Connection for MemoryConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn transaction(
        &self,
        store: &str,
        mode: TransactionMode,
    ) -> EngineResult<Box<dyn ObjectStore>> {
        let exists = self
            .shared
            .lock()
            .get(&self.name)
            .is_some_and(|db| db.stores.contains_key(store));
        if !exists {
            return Err(EngineError::MissingObjectStore(store.to_string()));
        }

        let counter = match mode {
            TransactionMode::ReadOnly => &self.shared.readonly_transactions,
            TransactionMode::ReadWrite => &self.shared.readwrite_transactions,
        };
        counter.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryObjectStore {
            shared: Arc::clone(&self.shared),
            database: self.name.clone(),
            store: store.to_string(),
            mode,
        }))
    }
}

// =============================================================================
// Object Store
// =============================================================================

struct MemoryObjectStore {
    shared: Arc<Shared>,
    database: String,
    store: String,
    mode: TransactionMode,
}

impl MemoryObjectStore {
    fn require_writable(&self) -> EngineResult<()> {
        match self.mode {
            TransactionMode::ReadWrite => Ok(()),
            TransactionMode::ReadOnly => Err(EngineError::ReadOnlyTransaction(self.store.clone())),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> EngineResult<T> {
        let databases = self.shared.lock();
        let store = databases
            .get(&self.database)
            .and_then(|db| db.stores.get(&self.store))
            .ok_or_else(|| EngineError::MissingObjectStore(self.store.clone()))?;
        Ok(f(store))
    }

    fn store_mut<'a>(
        &self,
        databases: &'a mut HashMap<String, DatabaseState>,
    ) -> EngineResult<&'a mut StoreState> {
        databases
            .get_mut(&self.database)
            .and_then(|db| db.stores.get_mut(&self.store))
            .ok_or_else(|| EngineError::MissingObjectStore(self.store.clone()))
    }

    /// Apply `f`, then persist. A failed persist rolls the store back.
    fn write(&self, f: impl FnOnce(&mut StoreState)) -> EngineResult<()> {
        self.require_writable()?;
        let mut databases = self.shared.lock();

        let store = self.store_mut(&mut databases)?;
        let previous = store.clone();
        f(store);

        if let Err(error) = self.shared.persist(&databases) {
            *self.store_mut(&mut databases)? = previous;
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn mode(&self) -> TransactionMode {
        self.mode
    }

    async fn get(&self, key: &str) -> EngineResult<Option<Value>> {
        self.shared.settle_request().await?;
        self.read(|store| store.entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> EngineResult<()> {
        self.shared.settle_request().await?;
        self.write(|store| {
            store.entries.insert(key.to_string(), value);
        })
    }

    async fn delete(&self, key: &str) -> EngineResult<()> {
        self.shared.settle_request().await?;
        self.write(|store| {
            store.entries.remove(key);
        })
    }

    async fn clear(&self) -> EngineResult<()> {
        self.shared.settle_request().await?;
        self.write(|store| store.entries.clear())
    }

    async fn count(&self) -> EngineResult<u64> {
        self.shared.settle_request().await?;
        self.read(|store| store.entries.len() as u64)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Creates `kv` with default options on first open.
    struct CreateKv;

    impl UpgradeHandler for CreateKv {
        fn on_upgrade_needed(
            &self,
            schema: &mut dyn SchemaEditor,
            _old_version: u32,
            _new_version: u32,
        ) -> EngineResult<()> {
            if !schema.has_object_store("kv") {
                schema.create_object_store("kv", ObjectStoreOptions::default())?;
            }
            Ok(())
        }
    }

    /// Always tries to create `kv`, failing on the second upgrade.
    struct AlwaysCreateKv;

    impl UpgradeHandler for AlwaysCreateKv {
        fn on_upgrade_needed(
            &self,
            schema: &mut dyn SchemaEditor,
            _old_version: u32,
            _new_version: u32,
        ) -> EngineResult<()> {
            schema.create_object_store("kv", ObjectStoreOptions::default())
        }
    }

    #[tokio::test]
    async fn test_open_creates_database() {
        let engine = MemoryObjectStoreEngine::new();
        assert_eq!(engine.database_version("db"), None);

        let conn = engine.open("db", 1, &CreateKv).await.unwrap();

        assert_eq!(conn.name(), "db");
        assert_eq!(conn.version(), 1);
        assert_eq!(engine.database_version("db"), Some(1));
        assert_eq!(engine.object_store_names("db"), vec!["kv".to_string()]);
        assert_eq!(engine.open_requests(), 1);
    }

    #[tokio::test]
    async fn test_reopen_same_version_skips_upgrade() {
        let engine = MemoryObjectStoreEngine::new();
        engine.open("db", 1, &AlwaysCreateKv).await.unwrap();

        // A second upgrade would fail with DuplicateObjectStore
        let result = engine.open("db", 1, &AlwaysCreateKv).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_failed_upgrade_leaves_no_database() {
        let engine = MemoryObjectStoreEngine::new();
        engine.open("db", 1, &AlwaysCreateKv).await.unwrap();

        let result = engine.open("db", 2, &AlwaysCreateKv).await;
        assert!(matches!(result, Err(EngineError::DuplicateObjectStore(_))));
        assert_eq!(engine.database_version("db"), Some(1));
    }

    #[tokio::test]
    async fn test_open_older_version_rejected() {
        let engine = MemoryObjectStoreEngine::new();
        engine.open("db", 3, &CreateKv).await.unwrap();

        let result = engine.open("db", 2, &CreateKv).await;
        assert!(matches!(
            result,
            Err(EngineError::VersionMismatch { current: 3, requested: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_store_crud() {
        let engine = MemoryObjectStoreEngine::new();
        let conn = engine.open("db", 1, &CreateKv).await.unwrap();

        let store = conn.transaction("kv", TransactionMode::ReadWrite).unwrap();
        store.put("a", json!({"n": 1})).await.unwrap();
        store.put("b", json!(2)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.get("a").await.unwrap(), Some(json!({"n": 1})));

        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_readonly_transaction_rejects_writes() {
        let engine = MemoryObjectStoreEngine::new();
        let conn = engine.open("db", 1, &CreateKv).await.unwrap();

        let store = conn.transaction("kv", TransactionMode::ReadOnly).unwrap();
        let result = store.put("a", json!(1)).await;

        assert!(matches!(result, Err(EngineError::ReadOnlyTransaction(_))));
        assert_eq!(engine.transactions_started(TransactionMode::ReadOnly), 1);
        assert_eq!(engine.transactions_started(TransactionMode::ReadWrite), 0);
    }

    #[tokio::test]
    async fn test_missing_store() {
        let engine = MemoryObjectStoreEngine::new();
        let conn = engine.open("db", 1, &CreateKv).await.unwrap();

        let result = conn.transaction("other", TransactionMode::ReadOnly);
        assert!(matches!(result, Err(EngineError::MissingObjectStore(_))));
    }

    #[tokio::test]
    async fn test_faults() {
        let engine = MemoryObjectStoreEngine::new();

        engine.inject(FaultType::OpenFail);
        assert!(engine.open("db", 1, &CreateKv).await.is_err());
        engine.heal(FaultType::OpenFail);

        let conn = engine.open("db", 1, &CreateKv).await.unwrap();
        let store = conn.transaction("kv", TransactionMode::ReadOnly).unwrap();

        engine.inject(FaultType::OperationFail);
        assert!(matches!(store.count().await, Err(EngineError::Injected(_))));
        engine.heal(FaultType::OperationFail);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshot.json");

        {
            let engine = MemoryObjectStoreEngine::with_snapshot(&path).unwrap();
            let conn = engine.open("db", 1, &CreateKv).await.unwrap();
            let store = conn.transaction("kv", TransactionMode::ReadWrite).unwrap();
            store.put("k", json!([1, 2, 3])).await.unwrap();
        }

        {
            let engine = MemoryObjectStoreEngine::with_snapshot(&path).unwrap();
            assert_eq!(engine.database_version("db"), Some(1));
            let conn = engine.open("db", 1, &CreateKv).await.unwrap();
            let store = conn.transaction("kv", TransactionMode::ReadOnly).unwrap();
            assert_eq!(store.get("k").await.unwrap(), Some(json!([1, 2, 3])));
        }
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back_write() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        let engine = MemoryObjectStoreEngine::with_snapshot(&nested.join("snapshot.json")).unwrap();
        let conn = engine.open("db", 1, &CreateKv).await.unwrap();
        let store = conn.transaction("kv", TransactionMode::ReadWrite).unwrap();
        store.put("kept", json!(1)).await.unwrap();

        std::fs::remove_dir_all(&nested).unwrap();

        assert!(matches!(store.put("k", json!(1)).await, Err(EngineError::Io(_))));
        assert!(matches!(store.delete("kept").await, Err(EngineError::Io(_))));
        assert!(matches!(store.clear().await, Err(EngineError::Io(_))));

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.get("kept").await.unwrap(), Some(json!(1)));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        let engine = MemoryObjectStoreEngine::with_snapshot(&nested.join("snapshot.json")).unwrap();
        engine.open("db", 1, &CreateKv).await.unwrap();

        std::fs::remove_dir_all(&nested).unwrap();

        let result = engine.open("db", 2, &CreateKv).await;
        assert!(matches!(result, Err(EngineError::Io(_))));
        assert_eq!(engine.database_version("db"), Some(1));

        let result = engine.open("other", 1, &CreateKv).await;
        assert!(matches!(result, Err(EngineError::Io(_))));
        assert_eq!(engine.database_version("other"), None);
    }
}
