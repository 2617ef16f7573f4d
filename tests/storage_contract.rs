//! The storage contract, checked against both backends
//!
//! Every property here must hold no matter which backend the selector picks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kvshim::{
    select_backend, BackendKind, CallbackStorage, FaultType, FlatEngine, HostEnvironment,
    MemoryFlatEngine, MemoryObjectStoreEngine, NoCallback, Operation, Storage, StorageConfig,
    StorageError,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio_test::{assert_pending, task};

/// How long a hanging operation is given before we call it hung.
const HANG_TIMEOUT: Duration = Duration::from_millis(100);

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// One shared storage per backend kind.
fn both_backends() -> Vec<Arc<dyn Storage>> {
    init_logging();
    let config = StorageConfig::default();
    vec![
        select_backend(&HostEnvironment::in_memory(), &config).into_shared(),
        select_backend(&HostEnvironment::flat_only(), &config).into_shared(),
    ]
}

#[tokio::test]
async fn test_selected_kinds() {
    let kinds: Vec<BackendKind> = both_backends().iter().map(|s| s.kind()).collect();
    assert_eq!(kinds, vec![BackendKind::Indexed, BackendKind::Flat]);
}

#[tokio::test]
async fn test_empty_store_scenario() {
    for storage in both_backends() {
        // get("missing") on empty store
        assert_eq!(storage.get("missing").await, Value::Null, "{}", storage.kind());

        // length() on empty store
        assert_eq!(storage.length().await, 0, "{}", storage.kind());

        // set("x", {n:1}) then get("x")
        storage.set("x", json!({"n": 1})).await;
        assert_eq!(storage.get("x").await, json!({"n": 1}), "{}", storage.kind());
    }
}

#[tokio::test]
async fn test_roundtrip_values() {
    let values = [
        json!({"a": 1, "b": [1, 2, 3]}),
        json!([{"nested": {"deep": true}}, 2.5]),
        json!({"unicode": "héllo ✓"}),
        json!(17),
        json!(true),
        json!("plain text"),
        json!("null"),
        json!("42"),
        json!("true"),
        json!(r#"{"n":1}"#),
        json!(""),
    ];

    for storage in both_backends() {
        for (i, value) in values.iter().enumerate() {
            let key = format!("key{i}");
            storage.set(&key, value.clone()).await;
            assert_eq!(&storage.get(&key).await, value, "{} {key}", storage.kind());
        }
    }
}

#[tokio::test]
async fn test_set_null_is_remove() {
    for storage in both_backends() {
        storage.set("k", json!({"n": 1})).await;
        storage.set("k", Value::Null).await;

        assert_eq!(storage.get("k").await, Value::Null);
        assert_eq!(storage.length().await, 0);
    }
}

#[tokio::test]
async fn test_clear_resets_store() {
    for storage in both_backends() {
        for i in 0..5 {
            storage.set(&format!("k{i}"), json!(i)).await;
        }
        assert_eq!(storage.length().await, 5);

        storage.clear().await;

        assert_eq!(storage.length().await, 0);
        for i in 0..5 {
            assert_eq!(storage.get(&format!("k{i}")).await, Value::Null);
        }
    }
}

#[tokio::test]
async fn test_remove_absent_key_succeeds() {
    for storage in both_backends() {
        assert!(storage.try_remove("never-set").await.is_ok());
        storage.remove("never-set").await;
        assert_eq!(storage.length().await, 0);
    }
}

#[tokio::test]
async fn test_length_counts_distinct_keys() {
    for storage in both_backends() {
        for i in 0..10 {
            storage.set(&format!("k{i}"), json!({"i": i})).await;
        }
        assert_eq!(storage.length().await, 10);

        // Overwrite keeps the count
        storage.set("k3", json!("replaced")).await;
        assert_eq!(storage.length().await, 10);
        assert_eq!(storage.get("k3").await, json!("replaced"));
    }
}

#[tokio::test]
async fn test_json_looking_strings_identical_on_both_backends() {
    let mut seen = Vec::new();
    for storage in both_backends() {
        storage.set("k", json!("null")).await;
        storage.set("n", json!("42")).await;
        seen.push((
            storage.get("k").await,
            storage.get("n").await,
            storage.length().await,
        ));
    }
    assert_eq!(seen[0], (json!("null"), json!("42"), 2));
    assert_eq!(seen[0], seen[1]);
}

#[tokio::test]
async fn test_keys_are_opaque() {
    let long = "x".repeat(2048);
    let keys = ["", " ", "ключ", "キー ✓", "a/b?c=d&e", long.as_str()];

    for storage in both_backends() {
        for (i, key) in keys.iter().enumerate() {
            storage.set(key, json!({"i": i})).await;
        }
        assert_eq!(storage.length().await, keys.len() as u64, "{}", storage.kind());

        for (i, key) in keys.iter().enumerate() {
            assert_eq!(storage.get(key).await, json!({"i": i}), "{} {key:?}", storage.kind());
        }
        for key in keys {
            assert!(storage.try_remove(key).await.is_ok());
        }
        assert_eq!(storage.length().await, 0);
    }
}

#[tokio::test]
async fn test_operations_pending_on_first_poll() {
    for storage in both_backends() {
        // Open the connection first so only delivery is left to defer
        storage.length().await;

        let mut set = task::spawn(storage.set("k", json!(1)));
        assert_pending!(set.poll(), "{}", storage.kind());
        drop(set);

        let mut length = task::spawn(storage.length());
        assert_pending!(length.poll(), "{}", storage.kind());
    }
}

#[tokio::test]
async fn test_failed_write_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();

    for force_flat in [false, true] {
        let data_dir = dir.path().join(format!("data-{force_flat}"));
        let config = StorageConfig {
            force_flat,
            ..StorageConfig::default()
        };
        let host = HostEnvironment::on_disk(&data_dir).unwrap();
        let storage = select_backend(&host, &config);
        storage.set("kept", json!(1)).await;

        std::fs::remove_dir_all(&data_dir).unwrap();

        let result = storage.try_set("k", json!(2)).await;
        assert!(
            matches!(result, Err(StorageError::Operation { op: Operation::Set, .. })),
            "force_flat={force_flat}"
        );
        assert!(storage.try_remove("kept").await.is_err());
        assert!(storage.try_clear().await.is_err());

        assert_eq!(storage.try_get("k").await.unwrap(), Value::Null);
        assert_eq!(storage.try_get("kept").await.unwrap(), json!(1));
        assert_eq!(storage.try_length().await.unwrap(), 1);
    }
}

#[tokio::test]
async fn test_prewrapped_legacy_value_on_flat() {
    let engine = Arc::new(MemoryFlatEngine::new());
    engine
        .set_item("legacy", r#"{"-moz-stringifier":{"a":1,"b":[1,2,3]}}"#)
        .unwrap();

    let storage = select_backend(&HostEnvironment::new(engine), &StorageConfig::default());

    assert_eq!(storage.get("legacy").await, json!({"a": 1, "b": [1, 2, 3]}));
}

#[tokio::test]
async fn test_callback_not_yet_fired_after_call() {
    for storage in both_backends() {
        let callbacks = CallbackStorage::new(Arc::clone(&storage));
        let fired = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();

        let flag = Arc::clone(&fired);
        callbacks.set("k", json!(1), Some(move || {
            flag.store(true, Ordering::SeqCst);
            let _ = tx.send(());
        }));

        // Checked synchronously: the callback has not run
        assert!(!fired.load(Ordering::SeqCst), "{}", storage.kind());

        rx.await.unwrap();
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(storage.get("k").await, json!(1));
    }
}

#[tokio::test]
async fn test_flat_write_not_visible_before_first_poll() {
    let engine = Arc::new(MemoryFlatEngine::new());
    let storage = select_backend(&HostEnvironment::new(engine.clone()), &StorageConfig::default());

    let pending = storage.set("k", json!(1));
    assert_eq!(engine.length(), 0);

    pending.await;
    assert_eq!(engine.length(), 1);
}

#[tokio::test]
async fn test_callback_never_fires_on_error() {
    init_logging();
    let engine = MemoryObjectStoreEngine::new();
    engine.inject(FaultType::OpenFail);
    let host = HostEnvironment::flat_only().with_transactional(Arc::new(engine.clone()));
    let config = StorageConfig {
        debug: true,
        ..StorageConfig::default()
    };
    let storage = select_backend(&host, &config).into_shared();
    let callbacks = CallbackStorage::new(Arc::clone(&storage));

    let (tx, rx) = oneshot::channel::<Value>();
    callbacks.get("k", move |value| {
        let _ = tx.send(value);
    });
    callbacks.clear(None::<NoCallback>);

    let result = tokio::time::timeout(HANG_TIMEOUT, rx).await;
    assert!(result.is_err(), "callback must not fire when the open fails");

    let result = storage.try_get("k").await;
    assert!(matches!(result, Err(StorageError::Connection { .. })));

    // No fallback to the flat backend
    assert_eq!(storage.kind(), BackendKind::Indexed);
}

#[tokio::test]
async fn test_persistence_across_restart() {
    let dir = tempfile::tempdir().unwrap();

    for force_flat in [false, true] {
        let config = StorageConfig {
            force_flat,
            ..StorageConfig::default()
        };

        {
            let host = HostEnvironment::on_disk(dir.path()).unwrap();
            let storage = select_backend(&host, &config);
            storage.set("profile", json!({"name": "ada", "tags": [1, 2]})).await;
        }

        let host = HostEnvironment::on_disk(dir.path()).unwrap();
        let storage = select_backend(&host, &config);
        assert_eq!(
            storage.get("profile").await,
            json!({"name": "ada", "tags": [1, 2]}),
            "force_flat={force_flat}"
        );
    }
}
