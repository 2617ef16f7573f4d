//! Diagnostics - optional error output
//!
//! Backend errors never reach callers of the default operations. When
//! diagnostics are enabled they are emitted through `tracing`; otherwise they
//! are dropped. Either way control flow is the same.

use crate::storage::StorageError;

/// Debug switch for backend error output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    enabled: bool,
}

impl Diagnostics {
    /// Create with the given switch.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Diagnostics that drop everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    /// Check if errors are emitted.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Emit a backend error if enabled.
    pub fn report(&self, error: &StorageError) {
        if self.enabled {
            tracing::error!(op = ?error.op(), "storage: {error}");
        }
    }
}
