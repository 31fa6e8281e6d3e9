// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Stale-while-revalidate read path.
//!
//! Composes [`TimedCache`] and [`RequestDeduplicator`]: callers get an
//! instant response whenever a usable (even if aging) value exists, and a
//! detached background refresh keeps the cache from going stale forever.
//! The caller is never blocked on a network round trip when the cache holds
//! anything servable.
//!
//! ```text
//! get(key)
//!   │
//!   ├─ cached, valid  → on_update(cached), return cached
//!   ├─ cached, stale  → on_update(cached), return cached
//!   │                    └─ spawn refresh → set + on_update(fresh)
//!   │                                       (failure only logged)
//!   └─ miss / forced  → fetch now → set + on_update(fresh), return fresh
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::TimedCache;
use crate::dedup::RequestDeduplicator;
use crate::error::RemoteError;

/// Cache-first read path with background revalidation.
pub struct StaleWhileRevalidate<V> {
    cache: Arc<TimedCache<V>>,
    dedup: Arc<RequestDeduplicator<V>>,
    /// TTL applied to values written by this read path
    ttl: Duration,
}

impl<V> StaleWhileRevalidate<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        cache: Arc<TimedCache<V>>,
        dedup: Arc<RequestDeduplicator<V>>,
        ttl: Duration,
    ) -> Self {
        Self { cache, dedup, ttl }
    }

    /// Resolve `key`, preferring the cache.
    ///
    /// `on_update` is invoked with the cached value when one is served, and
    /// again with the fresh value once a refresh lands. Fetches are routed
    /// through the deduplicator, so concurrent reads of the same key share
    /// one network call. Background refresh failures are swallowed (the
    /// caller already holds a usable value) and surfaced only via logging.
    pub async fn get<F, Fut, U>(
        &self,
        key: &str,
        fetch: F,
        force_refresh: bool,
        on_update: U,
    ) -> Result<V, RemoteError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, RemoteError>> + Send,
        U: Fn(V) + Send + Sync + 'static,
    {
        if !force_refresh {
            if let Some(cached) = self.cache.get(key) {
                on_update(cached.clone());

                if self.cache.needs_refresh(key) {
                    debug!(key, "serving stale value, refreshing in background");
                    self.spawn_refresh(key.to_string(), fetch, on_update);
                }

                return Ok(cached);
            }
        }

        // Cache miss or forced refresh: the caller waits for the fetch.
        let fresh = self.dedup.dedupe(key, fetch).await?;
        self.cache.set(key, fresh.clone(), self.ttl);
        on_update(fresh.clone());
        Ok(fresh)
    }

    fn spawn_refresh<F, Fut, U>(&self, key: String, fetch: F, on_update: U)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, RemoteError>> + Send,
        U: Fn(V) + Send + Sync + 'static,
    {
        let cache = Arc::clone(&self.cache);
        let dedup = Arc::clone(&self.dedup);
        let ttl = self.ttl;

        tokio::spawn(async move {
            match dedup.dedupe(&key, fetch).await {
                Ok(fresh) => {
                    cache.set(&key, fresh.clone(), ttl);
                    on_update(fresh);
                    debug!(key, "background refresh complete");
                }
                Err(error) => {
                    // The caller already has a stale-but-usable value.
                    warn!(key, %error, "background refresh failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn swr(ttl_secs: u64) -> StaleWhileRevalidate<String> {
        StaleWhileRevalidate::new(
            Arc::new(TimedCache::new()),
            Arc::new(RequestDeduplicator::new()),
            Duration::from_secs(ttl_secs),
        )
    }

    /// Wait for a detached refresh task to run to completion.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_miss_fetches_synchronously() {
        let swr = swr(10);
        let updates = Arc::new(Mutex::new(Vec::new()));
        let seen = updates.clone();

        let value = swr
            .get(
                "events",
                || async { Ok("fresh".to_string()) },
                false,
                move |v| seen.lock().push(v),
            )
            .await
            .unwrap();

        assert_eq!(value, "fresh");
        assert_eq!(*updates.lock(), vec!["fresh".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_hit_served_without_fetch() {
        let swr = swr(10);
        let fetches = Arc::new(AtomicUsize::new(0));

        // Populate
        swr.get("events", || async { Ok("v1".to_string()) }, false, |_| {})
            .await
            .unwrap();

        let counter = fetches.clone();
        let value = swr
            .get(
                "events",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok("v2".to_string())
                },
                false,
                |_| {},
            )
            .await
            .unwrap();

        assert_eq!(value, "v1");
        settle().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_hit_returns_old_and_refreshes_once() {
        let swr = swr(10);
        let fetches = Arc::new(AtomicUsize::new(0));
        let updates = Arc::new(Mutex::new(Vec::new()));

        swr.get("events", || async { Ok("v1".to_string()) }, false, |_| {})
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        let counter = fetches.clone();
        let seen = updates.clone();
        let value = swr
            .get(
                "events",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok("v2".to_string())
                },
                false,
                move |v| seen.lock().push(v),
            )
            .await
            .unwrap();

        // Caller got the stale value instantly
        assert_eq!(value, "v1");

        settle().await;

        // Exactly one background fetch; on_update saw stale then fresh
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(*updates.lock(), vec!["v1".to_string(), "v2".to_string()]);

        // Cache now holds the fresh value
        let value = swr
            .get("events", || async { Ok("v3".to_string()) }, false, |_| {})
            .await
            .unwrap();
        assert_eq!(value, "v2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_background_refresh_is_swallowed() {
        let swr = swr(10);

        swr.get("events", || async { Ok("v1".to_string()) }, false, |_| {})
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        let value = swr
            .get(
                "events",
                || async { Err(RemoteError::Network) },
                false,
                |_| {},
            )
            .await
            .unwrap();

        // Stale value served despite the refresh failing
        assert_eq!(value, "v1");
        settle().await;

        // Entry still present (stale), not clobbered by the failure
        let again = swr
            .get("events", || async { Err(RemoteError::Network) }, false, |_| {})
            .await
            .unwrap();
        assert_eq!(again, "v1");
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_cache() {
        let swr = swr(10);

        swr.get("events", || async { Ok("v1".to_string()) }, false, |_| {})
            .await
            .unwrap();

        let value = swr
            .get("events", || async { Ok("v2".to_string()) }, true, |_| {})
            .await
            .unwrap();

        assert_eq!(value, "v2");
    }

    #[tokio::test]
    async fn test_miss_with_failing_fetch_propagates() {
        let swr = swr(10);

        let result = swr
            .get(
                "events",
                || async { Err(RemoteError::Server { status: 502 }) },
                false,
                |_| {},
            )
            .await;

        assert_eq!(result.unwrap_err(), RemoteError::Server { status: 502 });
    }
}
