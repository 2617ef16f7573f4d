//! kvshim - Uniform Async Key-Value Storage
//!
//! One storage contract over two very different engines: a transactional,
//! asynchronous object store and a synchronous flat string store. The
//! backend is picked once at startup from what the host offers, and callers
//! never see which one is active.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │         select_backend(host, config)        │
//! ├─────────────────────────────────────────────┤
//! │  Storage trait        │ get/set/remove/     │
//! │                       │ clear/length        │
//! ├───────────────────────┼─────────────────────┤
//! │  IndexedBackend       │ FlatBackend         │
//! │  lazy connection      │ JSON + envelope     │
//! ├───────────────────────┼─────────────────────┤
//! │  TransactionalEngine  │ FlatEngine          │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use kvshim::{select_backend, HostEnvironment, Storage, StorageConfig};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let storage = select_backend(&HostEnvironment::in_memory(), &StorageConfig::default())
//!     .into_shared();
//!
//! storage.set("x", json!({"n": 1})).await;
//! assert_eq!(storage.get("x").await, json!({"n": 1}));
//! assert_eq!(storage.length().await, 1);
//! # });
//! ```
//!
//! # Errors
//!
//! The plain operations never surface errors: a failing operation is logged
//! (when `debug` is on) and its future never completes. Use the `try_*`
//! operations to get a [`StorageError`] instead.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod callback;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod engine;
pub mod selector;
pub mod storage;

// Re-export common types
pub use callback::{CallbackStorage, NoCallback};
pub use config::{ConfigError, StorageConfig};
pub use constants::*;
pub use diagnostics::Diagnostics;
pub use engine::{
    EngineError, EngineResult, FaultType, FileFlatEngine, FlatEngine, MemoryFlatEngine,
    MemoryObjectStoreEngine, TransactionMode, TransactionalEngine,
};
pub use selector::{probe, select_backend, HostEnvironment, SelectedBackend};
pub use storage::{
    BackendKind, CodecKind, ConnectionState, FlatBackend, IndexedBackend, IndexedOptions,
    Operation, Storage, StorageError, StorageResult,
};
