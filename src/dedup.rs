// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request deduplication (single-flight).
//!
//! Concurrent fetches sharing a key are collapsed into one underlying call:
//! the first caller becomes the leader and actually runs the request, later
//! callers subscribe to the leader's broadcast channel and receive the same
//! outcome. Registration and deregistration happen under one mutex, so for
//! any key at most one request is in flight at a time.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::RemoteError;

/// Deduplicator statistics.
#[derive(Debug, Clone)]
pub struct DedupStats {
    /// Requests this deduplicator actually started
    pub started: u64,
    /// Callers that joined an already in-flight request
    pub joined: u64,
    /// Keys currently in flight
    pub in_flight: usize,
}

/// Collapses concurrent requests for the same key into one in-flight call.
///
/// `V` must be `Clone` because every joined caller receives its own copy of
/// the leader's result.
pub struct RequestDeduplicator<V> {
    in_flight: Mutex<HashMap<String, broadcast::Sender<Result<V, RemoteError>>>>,
    started: AtomicU64,
    joined: AtomicU64,
}

impl<V: Clone + Send + 'static> RequestDeduplicator<V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            started: AtomicU64::new(0),
            joined: AtomicU64::new(0),
        }
    }

    /// Run `request` under `key`, or join the in-flight request for `key`.
    ///
    /// All concurrent callers for the same key observe the identical outcome,
    /// success or failure. If the leader is cancelled before completing, the
    /// key is deregistered and joined callers receive a clean error.
    pub async fn dedupe<F, Fut>(&self, key: &str, request: F) -> Result<V, RemoteError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, RemoteError>>,
    {
        // Register atomically: either we are the leader or we subscribe.
        let rx = {
            let mut map = self.in_flight.lock();
            match map.get(key) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _) = broadcast::channel(1);
                    map.insert(key.to_string(), tx);
                    None
                }
            }
        };

        if let Some(mut rx) = rx {
            self.joined.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_dedupe("joined");
            debug!(key, "joining in-flight request");
            return match rx.recv().await {
                Ok(result) => result,
                // Leader dropped without publishing (cancelled mid-flight)
                Err(_) => Err(RemoteError::Other(
                    "deduplicated request was cancelled".to_string(),
                )),
            };
        }

        self.started.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_dedupe("started");

        // Deregister even if this future is dropped at the await below,
        // otherwise later callers would wait on a leaderless channel forever.
        let guard = FlightGuard {
            key,
            map: &self.in_flight,
        };

        let result = request().await;

        // Deregister first so a caller arriving now starts a fresh request,
        // then publish to everyone who joined while we were in flight.
        if let Some(tx) = guard.disarm() {
            let _ = tx.send(result.clone());
        }

        result
    }

    /// Number of keys currently in flight.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Get deduplicator statistics.
    #[must_use]
    pub fn stats(&self) -> DedupStats {
        DedupStats {
            started: self.started.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            in_flight: self.in_flight_count(),
        }
    }
}

impl<V: Clone + Send + 'static> Default for RequestDeduplicator<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the key from the in-flight table when dropped, covering both the
/// normal completion path (via [`disarm`](Self::disarm)) and cancellation.
struct FlightGuard<'a, V> {
    key: &'a str,
    map: &'a Mutex<HashMap<String, broadcast::Sender<Result<V, RemoteError>>>>,
}

impl<V> FlightGuard<'_, V> {
    /// Deregister now and hand back the sender for publishing the result.
    fn disarm(self) -> Option<broadcast::Sender<Result<V, RemoteError>>> {
        let tx = self.map.lock().remove(self.key);
        std::mem::forget(self);
        tx
    }
}

impl<V> Drop for FlightGuard<'_, V> {
    fn drop(&mut self) {
        // Cancellation path: dropping the sender closes the channel, so
        // joined callers wake with a recv error instead of hanging.
        self.map.lock().remove(self.key);
    }
}
