//! Caching decorator for orchestration clients.
//!
//! Stack snapshots and the account id are kept in a [`StackCache`]. A fresh
//! entry is served without contacting the wrapped client. A stale entry is
//! refreshed under the entry's named lock; if the lock cannot be taken in
//! time the stale entry is served instead.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{DataKind, StackCache};
use crate::error::Result;

use super::client::OrchestrationClient;
use super::types::StackSnapshot;

/// Default time to wait for a refresh lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of attempts for retryable failures.
const MAX_RETRIES: u32 = 3;

/// Cache key of the account id.
const ACCOUNT_KEY: &str = "account_id";

/// Orchestration client wrapped with the stack state cache.
#[derive(Debug)]
pub struct CachedClient<C> {
    /// Wrapped client.
    inner: C,
    /// Shared cache.
    cache: Arc<StackCache>,
    /// Time to wait for a refresh lock.
    lock_timeout: Duration,
}

impl<C: OrchestrationClient> CachedClient<C> {
    /// Wraps a client with a shared cache.
    #[must_use]
    pub fn new(inner: C, cache: Arc<StackCache>) -> Self {
        Self {
            inner,
            cache,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets the lock timeout (builder style).
    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Gets the wrapped client.
    #[must_use]
    pub const fn inner(&self) -> &C {
        &self.inner
    }

    /// Gets the cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<StackCache> {
        &self.cache
    }

    fn stack_key(name: &str) -> String {
        format!("stack:{name}")
    }

    /// Fetches from the wrapped client, retrying retryable failures.
    async fn fetch_with_retry(&self, name: &str) -> Result<StackSnapshot> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.fetch_stack(name).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    let delay = e.retry_delay_secs().unwrap_or(1);
                    debug!("Retry attempt {attempt} of {MAX_RETRIES} for {name} in {delay}s: {e}");
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<C: OrchestrationClient> OrchestrationClient for CachedClient<C> {
    async fn fetch_stack(&self, name: &str) -> Result<StackSnapshot> {
        let key = Self::stack_key(name);
        let cached = self.cache.get::<StackSnapshot>(&key).await?;

        if let Some(stamped) = &cached
            && !stamped.update_allowed(self.cache.ttl().for_kind(DataKind::Stack))
        {
            debug!("Serving cached snapshot for {name}");
            return Ok(stamped.value.clone());
        }

        let guard = match self.cache.lock(&key, self.lock_timeout).await {
            Ok(guard) => guard,
            Err(e) if e.is_lock_timeout() => {
                if let Some(stamped) = cached {
                    warn!("Refresh of {name} is locked, serving stale snapshot");
                    return Ok(stamped.value);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        // Another task may have refreshed while we waited
        if !self.cache.update_allowed(&key, DataKind::Stack).await?
            && let Some(stamped) = self.cache.get::<StackSnapshot>(&key).await?
        {
            return Ok(stamped.value);
        }

        let snapshot = self.fetch_with_retry(name).await?;
        self.cache.store(&guard, &key, &snapshot).await?;
        Ok(snapshot)
    }

    async fn account_id(&self) -> Result<String> {
        let cached = self.cache.get::<String>(ACCOUNT_KEY).await?;

        if let Some(stamped) = &cached
            && !stamped.update_allowed(self.cache.ttl().for_kind(DataKind::Account))
        {
            return Ok(stamped.value.clone());
        }

        let guard = match self.cache.lock(ACCOUNT_KEY, self.lock_timeout).await {
            Ok(guard) => guard,
            Err(e) if e.is_lock_timeout() => {
                if let Some(stamped) = cached {
                    warn!("Refresh of the account id is locked, serving stale value");
                    return Ok(stamped.value);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if !self.cache.update_allowed(ACCOUNT_KEY, DataKind::Account).await?
            && let Some(stamped) = self.cache.get::<String>(ACCOUNT_KEY).await?
        {
            return Ok(stamped.value);
        }

        let account_id = self.inner.account_id().await?;
        self.cache.store(&guard, ACCOUNT_KEY, &account_id).await?;
        Ok(account_id)
    }

    fn region(&self) -> &str {
        self.inner.region()
    }

    fn stack_types(&self) -> &[String] {
        self.inner.stack_types()
    }

    fn backend_type(&self) -> &'static str {
        self.inner.backend_type()
    }
}
