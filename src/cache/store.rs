//! Stack state cache.
//!
//! The cache holds stamped snapshots keyed by name. Reads never take a lock
//! and see the last written snapshot. Writes require the named lock for the
//! key, so concurrent refreshes of the same stack serialize.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::error::{CacheError, Result, StackPlanError};

use super::lock::{CacheLockGuard, LockInfo, file_stem, generate_holder_id};
use super::stamped::StampedValue;

/// Default freshness window for stack snapshots.
pub const DEFAULT_STACK_TTL: Duration = Duration::from_secs(15);

/// Default freshness window for account-level data.
pub const DEFAULT_ACCOUNT_TTL: Duration = Duration::from_secs(3600);

/// Delay between lock file acquisition attempts.
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Lock file subdirectory.
const LOCKS_DIR: &str = "locks";

/// Value file subdirectory.
const VALUES_DIR: &str = "values";

/// Where locks and values live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    /// In-process only.
    Local,
    /// Shared directory on disk.
    File(PathBuf),
}

/// Kind of cached data, selecting its freshness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// Stack snapshots.
    Stack,
    /// Account-level data.
    Account,
}

/// Freshness windows per data kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    /// Stack snapshot window.
    pub stack: Duration,
    /// Account data window.
    pub account: Duration,
}

/// Shared cache of remote stack state.
#[derive(Debug)]
pub struct StackCache {
    /// Storage backend.
    backend: CacheBackend,
    /// Freshness windows.
    ttl: CacheTtl,
    /// Holder identifier written into lock files.
    holder: String,
    /// Process-local locks by name.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Process-local values by key.
    values: RwLock<HashMap<String, StampedValue<Value>>>,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            stack: DEFAULT_STACK_TTL,
            account: DEFAULT_ACCOUNT_TTL,
        }
    }
}

impl CacheTtl {
    /// Window for a data kind.
    #[must_use]
    pub const fn for_kind(&self, kind: DataKind) -> Duration {
        match kind {
            DataKind::Stack => self.stack,
            DataKind::Account => self.account,
        }
    }
}

impl StackCache {
    /// Creates a cache with the given backend and freshness windows.
    #[must_use]
    pub fn new(backend: CacheBackend, ttl: CacheTtl) -> Self {
        Self {
            backend,
            ttl,
            holder: generate_holder_id(),
            locks: Mutex::new(HashMap::new()),
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Creates an in-process cache with default windows.
    #[must_use]
    pub fn local() -> Self {
        Self::new(CacheBackend::Local, CacheTtl::default())
    }

    /// Creates a directory-backed cache with default windows.
    #[must_use]
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(CacheBackend::File(dir.into()), CacheTtl::default())
    }

    /// Gets the freshness windows.
    #[must_use]
    pub const fn ttl(&self) -> &CacheTtl {
        &self.ttl
    }

    /// Gets the backend type name.
    #[must_use]
    pub const fn backend_type(&self) -> &'static str {
        match self.backend {
            CacheBackend::Local => "local",
            CacheBackend::File(_) => "file",
        }
    }

    /// Acquires the named lock, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::LockTimeout`] if the lock is still held when
    /// the timeout elapses, or an error if the lock file cannot be written.
    pub async fn lock(&self, name: &str, timeout: Duration) -> Result<CacheLockGuard> {
        match &self.backend {
            CacheBackend::Local => self.lock_local(name, timeout).await,
            CacheBackend::File(dir) => self.lock_file(dir, name, timeout).await,
        }
    }

    async fn lock_local(&self, name: &str, timeout: Duration) -> Result<CacheLockGuard> {
        let mutex = {
            let mut locks = self.locks.lock().await;
            Arc::clone(
                locks
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => {
                trace!("Acquired local lock {name}");
                Ok(CacheLockGuard::local(LockInfo::new(name, &self.holder), guard))
            }
            Err(_) => {
                debug!("Timed out waiting for local lock {name}");
                Err(CacheError::lock_timeout(name, timeout).into())
            }
        }
    }

    async fn lock_file(&self, dir: &Path, name: &str, timeout: Duration) -> Result<CacheLockGuard> {
        let locks_dir = dir.join(LOCKS_DIR);
        ensure_dir(&locks_dir).await?;
        let path = locks_dir.join(format!("{}.lock", file_stem(name)));
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(guard) = self.try_lock_file(name, &path).await? {
                return Ok(guard);
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("Timed out waiting for lock file {}", path.display());
                return Err(CacheError::lock_timeout(name, timeout).into());
            }
            tokio::time::sleep(LOCK_RETRY_DELAY.min(deadline - now)).await;
        }
    }

    async fn try_lock_file(&self, name: &str, path: &Path) -> Result<Option<CacheLockGuard>> {
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if let Some(existing) = read_lock_file(path).await?
                    && existing.is_expired()
                {
                    debug!("Expired lock held by {}, taking over", existing.holder);
                    remove_if_exists(path).await?;
                }
                return Ok(None);
            }
            Err(e) => {
                return Err(CacheError::lock_failed(format!(
                    "Failed to create lock file {}: {e}",
                    path.display()
                ))
                .into());
            }
        };

        let info = LockInfo::new(name, &self.holder);
        let content = serde_json::to_string_pretty(&info)
            .map_err(|e| CacheError::serialization(format!("Failed to serialize lock: {e}")))?;

        file.write_all(content.as_bytes()).await.map_err(|e| {
            CacheError::lock_failed(format!("Failed to write lock file: {e}"))
        })?;
        file.sync_all().await.map_err(|e| {
            CacheError::lock_failed(format!("Failed to sync lock file: {e}"))
        })?;

        trace!("Acquired lock file {}", path.display());
        Ok(Some(CacheLockGuard::file(info, path.to_path_buf())))
    }

    /// Reads the last written value for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value cannot be read or decoded as `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<StampedValue<T>>> {
        let stored = match &self.backend {
            CacheBackend::Local => self.values.read().await.get(key).cloned(),
            CacheBackend::File(dir) => read_value_file(&value_path(dir, key)).await?,
        };

        stored
            .map(|stamped| {
                let stamp = stamped.stamp;
                serde_json::from_value(stamped.value)
                    .map(|value| StampedValue::with_stamp(value, stamp))
                    .map_err(|e| {
                        StackPlanError::from(CacheError::Corrupted {
                            message: format!("Cached value {key} has unexpected shape: {e}"),
                        })
                    })
            })
            .transpose()
    }

    /// Writes a value for `key` while holding its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if `guard` is not the lock for `key` or the value
    /// cannot be written.
    pub async fn store<T: Serialize + Sync>(
        &self,
        guard: &CacheLockGuard,
        key: &str,
        value: &T,
    ) -> Result<()> {
        if guard.name() != key {
            return Err(CacheError::lock_failed(format!(
                "Writing {key} requires its lock, held lock is {}",
                guard.name()
            ))
            .into());
        }

        let value = serde_json::to_value(value)
            .map_err(|e| CacheError::serialization(format!("Failed to serialize {key}: {e}")))?;
        let stamped = StampedValue::new(value);

        match &self.backend {
            CacheBackend::Local => {
                self.values.write().await.insert(key.to_string(), stamped);
            }
            CacheBackend::File(dir) => {
                ensure_dir(&dir.join(VALUES_DIR)).await?;
                write_value_file(&value_path(dir, key), &stamped).await?;
            }
        }

        debug!("Stored cache value {key}");
        Ok(())
    }

    /// Returns true if `key` is missing or older than the window for `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value cannot be read.
    pub async fn update_allowed(&self, key: &str, kind: DataKind) -> Result<bool> {
        Ok(self
            .get::<Value>(key)
            .await?
            .is_none_or(|stamped| stamped.update_allowed(self.ttl.for_kind(kind))))
    }
}

fn value_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(VALUES_DIR).join(format!("{}.json", file_stem(key)))
}

async fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        info!("Creating cache directory: {}", dir.display());
        fs::create_dir_all(dir).await.map_err(|e| {
            CacheError::lock_failed(format!("Failed to create cache directory: {e}"))
        })?;
    }
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::lock_failed(format!("Failed to delete lock file: {e}")).into()),
    }
}

async fn read_lock_file(path: &Path) -> Result<Option<LockInfo>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CacheError::Corrupted {
                message: format!("Failed to read lock file: {e}"),
            }
            .into());
        }
    };

    // A lock file is created before its content is written
    if content.trim().is_empty() {
        return Ok(None);
    }

    let info = serde_json::from_str(&content).map_err(|e| CacheError::Corrupted {
        message: format!("Failed to parse lock file: {e}"),
    })?;
    Ok(Some(info))
}

async fn read_value_file(path: &Path) -> Result<Option<StampedValue<Value>>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).await.map_err(|e| CacheError::Corrupted {
        message: format!("Failed to read cache file: {e}"),
    })?;

    let stamped = serde_json::from_str(&content).map_err(|e| CacheError::Corrupted {
        message: format!("Failed to parse cache file: {e}"),
    })?;
    Ok(Some(stamped))
}

async fn write_value_file(path: &Path, stamped: &StampedValue<Value>) -> Result<()> {
    let content = serde_json::to_string_pretty(stamped)
        .map_err(|e| CacheError::serialization(format!("Failed to serialize cache value: {e}")))?;

    // Write to a temporary file first, then rename for atomicity
    let temp_path = path.with_extension("tmp");

    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await?;
    fs::rename(&temp_path, path).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_store_and_get() {
        let cache = StackCache::local();
        let guard = cache.lock("stack:app", TIMEOUT).await.expect("lock");
        cache
            .store(&guard, "stack:app", &vec!["a", "b"])
            .await
            .expect("store");
        drop(guard);

        let stamped = cache
            .get::<Vec<String>>("stack:app")
            .await
            .expect("get")
            .expect("value present");
        assert_eq!(stamped.value, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_store_requires_matching_lock() {
        let cache = StackCache::local();
        let guard = cache.lock("stack:other", TIMEOUT).await.expect("lock");
        assert!(cache.store(&guard, "stack:app", &1).await.is_err());
    }

    #[tokio::test]
    async fn test_update_allowed_by_kind() {
        let cache = StackCache::new(
            CacheBackend::Local,
            CacheTtl {
                stack: Duration::ZERO,
                account: Duration::from_secs(3600),
            },
        );
        assert!(cache.update_allowed("account", DataKind::Account).await.expect("check"));

        let guard = cache.lock("account", TIMEOUT).await.expect("lock");
        cache.store(&guard, "account", &"123").await.expect("store");

        assert!(!cache.update_allowed("account", DataKind::Account).await.expect("check"));
        assert!(cache.update_allowed("account", DataKind::Stack).await.expect("check"));
    }

    #[tokio::test]
    async fn test_local_lock_timeout() {
        let cache = StackCache::local();
        let _held = cache.lock("stack:app", TIMEOUT).await.expect("lock");

        let err = cache
            .lock("stack:app", Duration::from_millis(20))
            .await
            .expect_err("second lock must time out");
        assert!(err.is_lock_timeout());

        // Other names are independent
        assert!(cache.lock("stack:db", Duration::from_millis(20)).await.is_ok());
    }

    #[tokio::test]
    async fn test_local_lock_released_on_drop() {
        let cache = StackCache::local();
        drop(cache.lock("stack:app", TIMEOUT).await.expect("lock"));
        assert!(cache.lock("stack:app", TIMEOUT).await.is_ok());
    }

    #[tokio::test]
    async fn test_file_backend_shares_state() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let writer = StackCache::with_dir(dir.path());
        let reader = StackCache::with_dir(dir.path());

        let guard = writer.lock("stack:app", TIMEOUT).await.expect("lock");
        let err = reader
            .lock("stack:app", Duration::from_millis(60))
            .await
            .expect_err("lock file held by writer");
        assert!(err.is_lock_timeout());

        writer.store(&guard, "stack:app", &42_u32).await.expect("store");
        drop(guard);

        let value = reader
            .get::<u32>("stack:app")
            .await
            .expect("get")
            .expect("value present");
        assert_eq!(value.value, 42);
        assert!(reader.lock("stack:app", TIMEOUT).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_lock_file_taken_over() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let locks = dir.path().join(LOCKS_DIR);
        std::fs::create_dir_all(&locks).expect("mkdir");

        let mut stale = LockInfo::new("stack:app", "crashed-holder");
        stale.expires_at = chrono::Utc::now() - chrono::Duration::seconds(1);
        std::fs::write(
            locks.join("stack_app.lock"),
            serde_json::to_string(&stale).expect("serialize"),
        )
        .expect("write stale lock");

        let cache = StackCache::with_dir(dir.path());
        let guard = cache.lock("stack:app", TIMEOUT).await.expect("take over");
        assert_ne!(guard.info().holder, "crashed-holder");
    }

    #[tokio::test]
    async fn test_drop_leaves_taken_over_lock_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let cache = StackCache::with_dir(dir.path());
        let guard = cache.lock("stack:app", TIMEOUT).await.expect("lock");

        // Another holder replaced the lock after it expired
        let path = dir.path().join(LOCKS_DIR).join("stack_app.lock");
        let successor = LockInfo::new("stack:app", "successor");
        std::fs::write(&path, serde_json::to_string(&successor).expect("serialize"))
            .expect("write successor lock");

        drop(guard);

        let content = std::fs::read_to_string(&path).expect("lock file kept");
        let held: LockInfo = serde_json::from_str(&content).expect("parse");
        assert_eq!(held.lock_id, successor.lock_id);
    }

    #[tokio::test]
    async fn test_drop_removes_own_lock_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let cache = StackCache::with_dir(dir.path());
        let guard = cache.lock("stack:app", TIMEOUT).await.expect("lock");
        let path = dir.path().join(LOCKS_DIR).join("stack_app.lock");
        assert!(path.exists());

        drop(guard);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_corrupted_value_reported() {
        let cache = StackCache::local();
        let guard = cache.lock("stack:app", TIMEOUT).await.expect("lock");
        cache.store(&guard, "stack:app", &"text").await.expect("store");

        let err = cache.get::<u32>("stack:app").await.expect_err("shape mismatch");
        assert!(matches!(err, StackPlanError::Cache(CacheError::Corrupted { .. })));
    }
}
