// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Client-side resilience layer for applications talking to an unreliable
//! remote service.
//!
//! The layer sits between the application's mutation/read paths and the
//! network, and provides:
//!
//! - a durable, replayable offline queue for mutations ([`queue`])
//! - transient/permanent failure classification ([`classify`])
//! - per-resource exponential-backoff retry coordination ([`retry`])
//! - a TTL cache with stale-while-revalidate reads ([`cache`], [`revalidate`])
//! - single-flight request deduplication ([`dedup`])
//! - connectivity tracking with drain-on-reconnect ([`connectivity`])
//!
//! ```text
//!                     ┌──────────────────────────────┐
//!   writes ──────────►│ PersistentOperationQueue     │──┐
//!                     │  (snapshot persistence)      │  │
//!                     └──────────────────────────────┘  │ drain
//!                     ┌──────────────────────────────┐  │ (FIFO)
//!   connectivity ────►│ ConnectivityMonitor          │──┤
//!                     └──────────────────────────────┘  ▼
//!                     ┌──────────────┐   ┌──────────────────┐
//!   reads ───────────►│ TimedCache + │──►│ RetryCoordinator │──► RemoteCall
//!                     │ SWR + dedup  │   │  (backoff +      │
//!                     └──────────────┘   │   classification)│
//!                                        └──────────────────┘
//! ```
//!
//! Failures flow through one classification point ([`classify::classify`]):
//! transient failures consume retry budget, permanent failures latch a
//! reconnect-required flag until the user re-authenticates.

pub mod cache;
pub mod classify;
pub mod config;
pub mod connectivity;
pub mod dedup;
pub mod error;
mod metrics;
pub mod operation;
pub mod queue;
pub mod remote;
pub mod retry;
pub mod revalidate;
pub mod storage;

pub use cache::{CacheStats, TimedCache};
pub use classify::{classify, FailureClass};
pub use config::ResilienceConfig;
pub use connectivity::{
    spawn_drain_on_reconnect, ConnectivityMonitor, ConnectivityState, CredentialStore,
};
pub use dedup::{DedupStats, RequestDeduplicator};
pub use error::RemoteError;
pub use operation::{Operation, OperationKind};
pub use queue::{DrainReport, PersistentOperationQueue, QueueError, QueueStats};
pub use remote::RemoteCall;
pub use retry::{RetryCoordinator, RetryOutcome, RetrySnapshot};
pub use revalidate::StaleWhileRevalidate;
pub use storage::{JsonFileStore, MemoryStore, QueueStore, StoreError};
