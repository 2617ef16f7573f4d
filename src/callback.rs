//! CallbackStorage - completion-callback surface
//!
//! For callers written against the callback contract: every call spawns the
//! operation on the tokio runtime and returns at once. The callback runs on a
//! later turn when the operation succeeds, and never runs when it fails.
//!
//! Must be used from within a tokio runtime.

use std::sync::Arc;

use serde_json::Value;

use crate::storage::{BackendKind, Storage};

/// Callback-style wrapper over a shared [`Storage`].
#[derive(Clone)]
pub struct CallbackStorage {
    inner: Arc<dyn Storage>,
}

impl CallbackStorage {
    /// Wrap a shared storage.
    #[must_use]
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self { inner }
    }

    /// Backend serving the wrapped storage.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    /// Read `key` and pass the value (or `Null`) to `callback`.
    pub fn get<F>(&self, key: impl Into<String>, callback: F)
    where
        F: FnOnce(Value) + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let key = key.into();
        tokio::spawn(async move {
            let value = inner.get(&key).await;
            callback(value);
        });
    }

    /// Write `value` under `key`; `Null` removes it.
    pub fn set<F>(&self, key: impl Into<String>, value: Value, callback: Option<F>)
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let key = key.into();
        tokio::spawn(async move {
            inner.set(&key, value).await;
            if let Some(callback) = callback {
                callback();
            }
        });
    }

    /// Remove `key`.
    pub fn remove<F>(&self, key: impl Into<String>, callback: Option<F>)
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let key = key.into();
        tokio::spawn(async move {
            inner.remove(&key).await;
            if let Some(callback) = callback {
                callback();
            }
        });
    }

    /// Remove every key.
    pub fn clear<F>(&self, callback: Option<F>)
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.clear().await;
            if let Some(callback) = callback {
                callback();
            }
        });
    }

    /// Pass the number of keys to `callback`.
    pub fn length<F>(&self, callback: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let length = inner.length().await;
            callback(length);
        });
    }
}

impl std::fmt::Debug for CallbackStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackStorage")
            .field("kind", &self.inner.kind())
            .finish()
    }
}

/// Placeholder type for passing no callback: `None::<NoCallback>`.
pub type NoCallback = fn();

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::selector::{select_backend, HostEnvironment};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::oneshot;

    fn callbacks(host: &HostEnvironment) -> CallbackStorage {
        CallbackStorage::new(select_backend(host, &StorageConfig::default()).into_shared())
    }

    #[tokio::test]
    async fn test_callback_runs_later() {
        let storage = callbacks(&HostEnvironment::flat_only());
        let fired = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();

        let flag = Arc::clone(&fired);
        storage.set(
            "k",
            json!(1),
            Some(move || {
                flag.store(true, Ordering::SeqCst);
                let _ = tx.send(());
            }),
        );

        // Nothing ran yet
        assert!(!fired.load(Ordering::SeqCst));

        rx.await.unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_get_and_length_callbacks() {
        let storage = callbacks(&HostEnvironment::in_memory());

        let (tx, rx) = oneshot::channel();
        storage.set("x", json!({"n": 1}), Some(move || {
            let _ = tx.send(());
        }));
        rx.await.unwrap();

        let (tx, rx) = oneshot::channel();
        storage.get("x", move |value| {
            let _ = tx.send(value);
        });
        assert_eq!(rx.await.unwrap(), json!({"n": 1}));

        let (tx, rx) = oneshot::channel();
        storage.length(move |length| {
            let _ = tx.send(length);
        });
        assert_eq!(rx.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_callbacks_are_optional() {
        let storage = callbacks(&HostEnvironment::flat_only());

        storage.set("a", json!(1), None::<NoCallback>);
        storage.remove("a", None::<NoCallback>);

        let (tx, rx) = oneshot::channel();
        storage.clear(Some(move || {
            let _ = tx.send(());
        }));
        rx.await.unwrap();

        let (tx, rx) = oneshot::channel();
        storage.length(move |length| {
            let _ = tx.send(length);
        });
        assert_eq!(rx.await.unwrap(), 0);
    }
}
