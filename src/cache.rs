// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Timed cache with valid/stale/expired states.
//!
//! Entries live through three phases relative to their write time:
//!
//! ```text
//! written ──── ttl ──── stale_ttl
//!    │  valid   │  stale   │  expired
//!    │ returned │ returned │ evicted on next read
//!    │          │ + needs_refresh() == true
//! ```
//!
//! Stale values are still served (the caller gets an instant response) while
//! [`TimedCache::needs_refresh`] tells the read path to kick off a background
//! refresh. Entries are replaced wholesale on every write, never partially
//! mutated, so concurrent readers never observe a torn entry.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// A single cache entry. Replaced wholesale on every refresh.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    written_at: Instant,
    ttl: Duration,
    stale_ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_valid(&self, now: Instant) -> bool {
        now.duration_since(self.written_at) < self.ttl
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.written_at) >= self.stale_ttl
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Reads served from a valid entry
    pub hits: u64,
    /// Reads served from a stale entry (refresh due)
    pub stale_hits: u64,
    /// Reads that found nothing usable
    pub misses: u64,
    /// Entries evicted because they outlived their stale window
    pub evictions: u64,
    /// Current number of entries
    pub entry_count: usize,
    /// Hit rate including stale hits (0.0 - 1.0)
    pub hit_rate: f64,
}

/// In-memory keyed cache with time-to-live semantics.
///
/// The entry table is a [`DashMap`], so concurrent `get`/`set` calls are
/// serialized per shard and never observe partial updates.
pub struct TimedCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    /// Multiplier deriving the stale window from the ttl (`stale_ttl = ttl * stale_factor`)
    stale_factor: u32,
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> TimedCache<V> {
    /// Create a cache with the default stale window (3x the ttl).
    #[must_use]
    pub fn new() -> Self {
        Self::with_stale_factor(3)
    }

    /// Create a cache whose stale window is `ttl * stale_factor`.
    ///
    /// `stale_factor` must be at least 2 so `stale_ttl > ttl` always holds.
    #[must_use]
    pub fn with_stale_factor(stale_factor: u32) -> Self {
        Self {
            entries: DashMap::new(),
            stale_factor: stale_factor.max(2),
            hits: AtomicU64::new(0),
            stale_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Get the value for `key` if it is valid or stale.
    ///
    /// Expired entries are evicted and `None` is returned. Stale entries are
    /// still returned; pair with [`needs_refresh`](Self::needs_refresh) to
    /// decide whether a background refresh is due.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired(now) {
                drop(entry); // release the shard lock before removing
                self.entries.remove(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cache_access("expired");
                return None;
            }

            if entry.is_valid(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cache_access("hit");
            } else {
                self.stale_hits.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cache_access("stale");
            }
            return Some(entry.value.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_cache_access("miss");
        None
    }

    /// True once the ttl has elapsed, independent of whether the value is
    /// still being returned. Missing entries report `false` (there is nothing
    /// to refresh; the read path will fetch synchronously instead).
    #[must_use]
    pub fn needs_refresh(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|entry| {
            Instant::now().duration_since(entry.written_at) >= entry.ttl
        })
    }

    /// Insert or replace the entry for `key` wholesale.
    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        self.set_with_stale(key, value, ttl, ttl.saturating_mul(self.stale_factor));
    }

    /// Insert with an explicit stale window. `stale_ttl` is clamped to be
    /// strictly greater than `ttl` (saturating, so extreme ttls don't panic).
    pub fn set_with_stale(&self, key: &str, value: V, ttl: Duration, stale_ttl: Duration) {
        let stale_ttl = stale_ttl.max(ttl.saturating_add(Duration::from_millis(1)));
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                written_at: Instant::now(),
                ttl,
                stale_ttl,
            },
        );
    }

    /// Remove the entry for `key`, if any.
    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Current number of entries (stale included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let stale_hits = self.stale_hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + stale_hits + misses;

        CacheStats {
            hits,
            stale_hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            entry_count: self.entries.len(),
            hit_rate: if total > 0 {
                (hits + stale_hits) as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

impl<V: Clone> Default for TimedCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
