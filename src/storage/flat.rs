//! FlatBackend - storage over a flat string engine
//!
//! TigerStyle: the engine is synchronous, delivery is not. Every result is
//! handed back after a scheduler yield, same as the transactional backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::codec::{CodecKind, ValueCodec};
use super::error::{Operation, StorageError, StorageResult};
use super::{deliver, BackendKind, Storage};
use crate::diagnostics::Diagnostics;
use crate::engine::FlatEngine;

/// Storage backed by a [`FlatEngine`].
pub struct FlatBackend {
    engine: Arc<dyn FlatEngine>,
    codec: Box<dyn ValueCodec>,
    codec_kind: CodecKind,
    diagnostics: Diagnostics,
}

impl FlatBackend {
    /// Create a backend over `engine`.
    #[must_use]
    pub fn new(engine: Arc<dyn FlatEngine>, codec: CodecKind, diagnostics: Diagnostics) -> Self {
        Self {
            engine,
            codec: codec.codec(),
            codec_kind: codec,
            diagnostics,
        }
    }

    /// Codec used for values.
    #[must_use]
    pub fn codec_kind(&self) -> CodecKind {
        self.codec_kind
    }

    /// Decode a raw string, falling back to the raw string itself.
    fn decode(&self, raw: String) -> Value {
        match self.codec.decode(&raw) {
            Ok(value) => value,
            Err(error) => {
                tracing::trace!(%error, "flat value is not JSON, returning raw string");
                Value::String(raw)
            }
        }
    }

    fn read(&self, key: &str) -> Value {
        self.engine
            .get_item(key)
            .map_or(Value::Null, |raw| self.decode(raw))
    }

    fn write(&self, key: &str, value: &Value) -> StorageResult<()> {
        let encoded = self.codec.encode(value)?;
        self.engine
            .set_item(key, &encoded)
            .map_err(|e| StorageError::operation(Operation::Set, e))
    }
}

impl std::fmt::Debug for FlatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatBackend")
            .field("codec", &self.codec_kind)
            .field("length", &self.engine.length())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Storage for FlatBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Flat
    }

    fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    async fn try_get(&self, key: &str) -> StorageResult<Value> {
        let value = self.read(key);
        deliver(Ok(value)).await
    }

    async fn try_set(&self, key: &str, value: Value) -> StorageResult<()> {
        if value.is_null() {
            return self.try_remove(key).await;
        }
        let result = self.write(key, &value);
        deliver(result).await
    }

    async fn try_remove(&self, key: &str) -> StorageResult<()> {
        let result = self
            .engine
            .remove_item(key)
            .map_err(|e| StorageError::operation(Operation::Remove, e));
        deliver(result).await
    }

    async fn try_clear(&self) -> StorageResult<()> {
        let result = self
            .engine
            .clear()
            .map_err(|e| StorageError::operation(Operation::Clear, e));

        // Postcondition
        if result.is_ok() {
            assert_eq!(self.engine.length(), 0, "store should be empty after clear");
        }

        deliver(result).await
    }

    async fn try_length(&self) -> StorageResult<u64> {
        let length = self.engine.length() as u64;
        deliver(Ok(length)).await
    }
}

// =============================================================================
// Tests
// =============================================================================
