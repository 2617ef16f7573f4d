//! Storage - Backend Trait and Implementations
//!
//! TigerStyle: one contract, two backends, chosen once at startup.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Storage Trait                          │
//! │        get / set / remove / clear / length (+ try_*)         │
//! └─────────────────────────────────────────────────────────────┘
//!          ↑                              ↑
//!          │                              │
//! ┌────────┴────────┐           ┌────────┴────────┐
//! │ IndexedBackend  │           │   FlatBackend   │
//! │ (object store)  │           │ (string store)  │
//! └─────────────────┘           └─────────────────┘
//! ```
//!
//! # Delivery
//!
//! Every operation yields to the scheduler before it completes, so a caller
//! never sees a result within the poll that started the operation.
//!
//! # Errors
//!
//! The default operations never return errors. A failure is reported to
//! [`Diagnostics`] and the future stays pending forever; callers that need
//! a bound apply their own timeout. The `try_*` operations return the error
//! instead.

mod codec;
mod error;
mod flat;
mod indexed;

use async_trait::async_trait;
use serde_json::Value;

use crate::diagnostics::Diagnostics;

pub use codec::{unwrap_envelope, CodecKind, LegacyEnvelopeCodec, PlainJsonCodec, ValueCodec};
pub use error::{Operation, StorageError, StorageResult};
pub use flat::FlatBackend;
pub use indexed::{ConnectionState, IndexedBackend, IndexedOptions};

// =============================================================================
// Backend Kind
// =============================================================================

/// Which backend serves the storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Transactional object store
    Indexed,
    /// Flat string store
    Flat,
}

impl BackendKind {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Indexed => "indexed",
            Self::Flat => "flat",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Storage Trait
// =============================================================================

/// Asynchronous key-value storage.
///
/// Implementors provide the `try_*` operations; the plain operations are
/// derived from them.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Backend serving this storage.
    fn kind(&self) -> BackendKind;

    /// Where errors of the plain operations go.
    fn diagnostics(&self) -> Diagnostics;

    /// Read a value. A missing key yields `Value::Null`.
    async fn try_get(&self, key: &str) -> StorageResult<Value>;

    /// Write a value. `Value::Null` removes the key.
    async fn try_set(&self, key: &str, value: Value) -> StorageResult<()>;

    /// Remove a key. Removing an absent key succeeds.
    async fn try_remove(&self, key: &str) -> StorageResult<()>;

    /// Remove every key.
    async fn try_clear(&self) -> StorageResult<()>;

    /// Number of keys.
    async fn try_length(&self) -> StorageResult<u64>;

    /// Read a value; pending forever on error.
    async fn get(&self, key: &str) -> Value {
        settle(self.diagnostics(), self.try_get(key).await).await
    }

    /// Write a value; pending forever on error.
    async fn set(&self, key: &str, value: Value) {
        settle(self.diagnostics(), self.try_set(key, value).await).await;
    }

    /// Remove a key; pending forever on error.
    async fn remove(&self, key: &str) {
        settle(self.diagnostics(), self.try_remove(key).await).await;
    }

    /// Remove every key; pending forever on error.
    async fn clear(&self) {
        settle(self.diagnostics(), self.try_clear().await).await;
    }

    /// Number of keys; pending forever on error.
    async fn length(&self) -> u64 {
        settle(self.diagnostics(), self.try_length().await).await
    }
}

/// Unwrap a result, or report the error and never complete.
async fn settle<T>(diagnostics: Diagnostics, result: StorageResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => {
            diagnostics.report(&error);
            futures::future::pending().await
        }
    }
}

/// Yield once so completion lands on a later scheduler turn.
pub(crate) async fn deliver<T>(result: StorageResult<T>) -> StorageResult<T> {
    tokio::task::yield_now().await;
    result
}
