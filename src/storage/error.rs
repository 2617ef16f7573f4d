//! Storage errors
//!
//! TigerStyle: every failure names the operation that hit it.

use crate::engine::EngineError;

/// Result type for the fallible `try_*` storage channel.
pub type StorageResult<T> = Result<T, StorageError>;

/// The five storage operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Read one key
    Get,
    /// Write one key
    Set,
    /// Delete one key
    Remove,
    /// Delete every key
    Clear,
    /// Count keys
    Length,
}

impl Operation {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Remove => "remove",
            Self::Clear => "clear",
            Self::Length => "length",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors seen by storage callers.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend connection could not be opened or created.
    #[error("can't open database: {source}")]
    Connection {
        /// Engine failure
        source: EngineError,
    },

    /// A single operation failed against an open backend.
    #[error("error in storage.{op}(): {source}")]
    Operation {
        /// Failed operation
        op: Operation,
        /// Engine failure
        source: EngineError,
    },

    /// A stored flat value is not valid JSON.
    #[error("stored value is not valid JSON: {source}")]
    Decode {
        /// Parser failure
        source: serde_json::Error,
    },

    /// A value could not be encoded for the flat engine.
    #[error("value cannot be encoded: {source}")]
    Encode {
        /// Encoder failure
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Create a connection error.
    #[must_use]
    pub fn connection(source: EngineError) -> Self {
        Self::Connection { source }
    }

    /// Create an operation error.
    #[must_use]
    pub fn operation(op: Operation, source: EngineError) -> Self {
        Self::Operation { op, source }
    }

    /// The operation that failed, if the error is tied to one.
    #[must_use]
    pub fn op(&self) -> Option<Operation> {
        match self {
            Self::Operation { op, .. } => Some(*op),
            _ => None,
        }
    }

    /// Check if this is a connection error.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = StorageError::operation(Operation::Get, EngineError::Injected("boom"));
        assert_eq!(err.to_string(), "error in storage.get(): injected fault: boom");
        assert_eq!(err.op(), Some(Operation::Get));
        assert!(!err.is_connection());

        let err = StorageError::connection(EngineError::Unavailable);
        assert!(err.is_connection());
        assert_eq!(err.op(), None);
    }
}
