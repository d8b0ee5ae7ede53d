//! Stack state cache behaviour under concurrent use.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use common::{MemoryClient, snapshot, template};
use stackplan::cache::{CacheBackend, CacheTtl, DataKind, StackCache};
use stackplan::stack::{CachedClient, OrchestrationClient, StackSnapshot};

fn client() -> MemoryClient {
    MemoryClient::new().with_stack(snapshot("app", template(json!({"Resources": {}}))))
}

#[tokio::test]
async fn test_concurrent_fetches_share_one_refresh() {
    let cached = Arc::new(CachedClient::new(client(), Arc::new(StackCache::local())));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cached = Arc::clone(&cached);
            tokio::spawn(async move { cached.fetch_stack("app").await })
        })
        .collect();

    for handle in handles {
        let snapshot = handle.await.expect("join").expect("fetch");
        assert_eq!(snapshot.name, "app");
    }
    assert_eq!(cached.inner().fetches(), 1);
}

#[tokio::test]
async fn test_file_cache_shared_between_instances() {
    let dir = TempDir::new().expect("temp dir");
    let ttl = CacheTtl {
        stack: Duration::from_secs(60),
        account: Duration::from_secs(3600),
    };
    let first = Arc::new(StackCache::new(CacheBackend::File(dir.path().to_path_buf()), ttl));
    let second = Arc::new(StackCache::new(CacheBackend::File(dir.path().to_path_buf()), ttl));

    let writer = CachedClient::new(client(), first);
    writer.fetch_stack("app").await.expect("fetch");

    // A second process sees the fresh value without fetching
    let reader = CachedClient::new(client(), Arc::clone(&second));
    reader.fetch_stack("app").await.expect("fetch");
    assert_eq!(reader.inner().fetches(), 0);
    assert!(!second.update_allowed("stack:app", DataKind::Stack).await.expect("check"));
}

#[tokio::test]
async fn test_file_lock_excludes_other_instances() {
    let dir = TempDir::new().expect("temp dir");
    let first = StackCache::with_dir(dir.path());
    let second = StackCache::with_dir(dir.path());

    let guard = first.lock("stack:app", Duration::from_millis(100)).await.expect("lock");
    let err = second
        .lock("stack:app", Duration::from_millis(100))
        .await
        .expect_err("held by first");
    assert!(err.is_lock_timeout());

    let value = snapshot("app", template(json!({"Resources": {}})));
    first.store(&guard, "stack:app", &value).await.expect("store");
    drop(guard);

    let _guard = second.lock("stack:app", Duration::from_millis(100)).await.expect("released");
    let stored = second
        .get::<StackSnapshot>("stack:app")
        .await
        .expect("get")
        .expect("value present");
    assert_eq!(stored.value, value);
}
