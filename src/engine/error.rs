//! Engine errors
//!
//! Failures reported by the storage engines themselves. Backends wrap these
//! into [`crate::StorageError`] together with the operation that hit them.

/// Result type for engine calls.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by a transactional or flat engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The host has no such engine
    #[error("storage engine is not available in this host")]
    Unavailable,

    /// Open requested an older version than the stored one
    #[error("database {name} is at version {current}, cannot open at {requested}")]
    VersionMismatch {
        /// Database name
        name: String,
        /// Stored version
        current: u32,
        /// Requested version
        requested: u32,
    },

    /// Transaction on an unknown object store
    #[error("object store {0} does not exist")]
    MissingObjectStore(String),

    /// Object store created twice
    #[error("object store {0} already exists")]
    DuplicateObjectStore(String),

    /// Write inside a readonly transaction
    #[error("write attempted in a readonly transaction on {0}")]
    ReadOnlyTransaction(String),

    /// Flat engine out of space
    #[error("quota exceeded: {used} + {requested} bytes > {quota}")]
    QuotaExceeded {
        /// Bytes in use, not counting an overwritten entry
        used: usize,
        /// Bytes of the new entry
        requested: usize,
        /// Engine quota
        quota: usize,
    },

    /// Simulated failure
    #[error("injected fault: {0}")]
    Injected(&'static str),

    /// Persistence failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted data could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
