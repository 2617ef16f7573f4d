//! Selector - picks the backend once, at startup
//!
//! TigerStyle: capability is probed once and the choice never changes. If the
//! chosen backend fails later, there is no fallback to the other one.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::StorageConfig;
use crate::constants::{FLAT_STORE_FILE_NAME, OBJECT_STORE_FILE_NAME};
use crate::diagnostics::Diagnostics;
use crate::engine::{
    EngineResult, FileFlatEngine, FlatEngine, MemoryFlatEngine, MemoryObjectStoreEngine,
    TransactionalEngine,
};
use crate::storage::{
    BackendKind, FlatBackend, IndexedBackend, IndexedOptions, Storage, StorageResult,
};

// =============================================================================
// Host Environment
// =============================================================================

/// Storage capabilities of the host.
///
/// The flat engine is always present; the transactional engine may not be.
#[derive(Clone)]
pub struct HostEnvironment {
    transactional: Option<Arc<dyn TransactionalEngine>>,
    flat: Arc<dyn FlatEngine>,
}

impl HostEnvironment {
    /// Host with only a flat engine.
    #[must_use]
    pub fn new(flat: Arc<dyn FlatEngine>) -> Self {
        Self {
            transactional: None,
            flat,
        }
    }

    /// Add the transactional capability.
    #[must_use]
    pub fn with_transactional(mut self, engine: Arc<dyn TransactionalEngine>) -> Self {
        self.transactional = Some(engine);
        self
    }

    /// Host with both capabilities, in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryFlatEngine::new()))
            .with_transactional(Arc::new(MemoryObjectStoreEngine::new()))
    }

    /// Host without the transactional capability, in memory.
    #[must_use]
    pub fn flat_only() -> Self {
        Self::new(Arc::new(MemoryFlatEngine::new()))
    }

    /// Host with both capabilities persisted under `dir`.
    ///
    /// # Errors
    /// Returns error if existing files cannot be loaded.
    pub fn on_disk(dir: &Path) -> EngineResult<Self> {
        let flat = FileFlatEngine::open(&dir.join(FLAT_STORE_FILE_NAME))?;
        let transactional = MemoryObjectStoreEngine::with_snapshot(&dir.join(OBJECT_STORE_FILE_NAME))?;
        Ok(Self::new(Arc::new(flat)).with_transactional(Arc::new(transactional)))
    }

    /// Check if the host offers the transactional capability.
    #[must_use]
    pub fn has_transactional(&self) -> bool {
        self.transactional.is_some()
    }
}

impl std::fmt::Debug for HostEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostEnvironment")
            .field("transactional", &self.has_transactional())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Which backend the host supports best.
#[must_use]
pub fn probe(host: &HostEnvironment) -> BackendKind {
    if host.has_transactional() {
        BackendKind::Indexed
    } else {
        BackendKind::Flat
    }
}

/// Build the storage for this process. Call once at startup and share the
/// result.
#[must_use]
pub fn select_backend(host: &HostEnvironment, config: &StorageConfig) -> SelectedBackend {
    let diagnostics = config.diagnostics();

    let selected = match (&host.transactional, config.force_flat) {
        (Some(engine), false) => SelectedBackend::Indexed(IndexedBackend::new(
            Arc::clone(engine),
            IndexedOptions::from(config),
            diagnostics,
        )),
        _ => SelectedBackend::Flat(FlatBackend::new(
            Arc::clone(&host.flat),
            config.codec,
            diagnostics,
        )),
    };

    tracing::info!(
        backend = %selected.kind(),
        probed = %probe(host),
        force_flat = config.force_flat,
        "selected storage backend"
    );

    selected
}

/// The backend chosen at startup.
#[derive(Debug)]
pub enum SelectedBackend {
    /// Transactional object store
    Indexed(IndexedBackend),
    /// Flat string store
    Flat(FlatBackend),
}

impl SelectedBackend {
    /// Shareable handle to inject into consumers.
    #[must_use]
    pub fn into_shared(self) -> Arc<dyn Storage> {
        match self {
            Self::Indexed(backend) => Arc::new(backend),
            Self::Flat(backend) => Arc::new(backend),
        }
    }

    fn inner(&self) -> &dyn Storage {
        match self {
            Self::Indexed(backend) => backend,
            Self::Flat(backend) => backend,
        }
    }
}

#[async_trait]
impl Storage for SelectedBackend {
    fn kind(&self) -> BackendKind {
        self.inner().kind()
    }

    fn diagnostics(&self) -> Diagnostics {
        self.inner().diagnostics()
    }

    async fn try_get(&self, key: &str) -> StorageResult<Value> {
        self.inner().try_get(key).await
    }

    async fn try_set(&self, key: &str, value: Value) -> StorageResult<()> {
        self.inner().try_set(key, value).await
    }

    async fn try_remove(&self, key: &str) -> StorageResult<()> {
        self.inner().try_remove(key).await
    }

    async fn try_clear(&self) -> StorageResult<()> {
        self.inner().try_clear().await
    }

    async fn try_length(&self) -> StorageResult<u64> {
        self.inner().try_length().await
    }
}

// =============================================================================
// Tests
// =============================================================================
