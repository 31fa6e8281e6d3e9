// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable offline operation queue.
//!
//! Mutations made while the remote service is unreachable are captured as
//! [`Operation`]s, persisted before the enqueue call returns, and replayed in
//! FIFO order once connectivity returns. The full queue is snapshotted to the
//! store on every state change, so the on-disk view is never more than one
//! mutation behind the in-memory one.
//!
//! Drains are mutually exclusive (an `AtomicBool` admission flag plus a drop
//! guard), sequential, and per-operation isolated: one failing operation is
//! requeued with its retry count bumped while the rest of the batch proceeds.
//! Operations that exhaust their retry budget are retained but skipped by
//! subsequent automatic drains until [`PersistentOperationQueue::force_retry_all`]
//! resets them.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::operation::{Operation, OperationKind};
use crate::remote::RemoteCall;
use crate::storage::{QueueStore, StoreError};

/// Errors surfaced by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The payload was not a well-formed command object
    #[error("operation payload is not encodable: {0}")]
    Encoding(String),

    /// The persistence backend failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one drain pass.
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    /// Operations attempted this pass
    pub processed: usize,
    /// Operations acknowledged by the remote and removed
    pub succeeded: usize,
    /// Operations that failed and were requeued with budget remaining
    pub requeued: usize,
    /// Operations that crossed the retry budget during this pass
    pub exhausted: usize,
    /// Operations still queued after the pass (exhausted included)
    pub remaining: usize,
    /// True when another drain was already in flight and this call did nothing
    pub skipped: bool,
}

impl DrainReport {
    /// True when the pass ran and left nothing pending.
    #[must_use]
    pub fn is_fully_drained(&self) -> bool {
        !self.skipped && self.remaining == 0
    }
}

/// Queue statistics.
#[derive(Debug, Clone)]
pub struct QueueStats {
    /// Total operations queued (exhausted included)
    pub pending: usize,
    /// Operations that have used up their retry budget
    pub exhausted: usize,
    /// Operations enqueued over this instance's lifetime
    pub total_enqueued: u64,
    /// Operations acknowledged and removed over this instance's lifetime
    pub total_succeeded: u64,
}

/// FIFO queue of pending mutations with snapshot persistence.
pub struct PersistentOperationQueue {
    store: Arc<dyn QueueStore>,
    operations: Mutex<VecDeque<Operation>>,
    draining: AtomicBool,
    max_retries: u32,
    total_enqueued: std::sync::atomic::AtomicU64,
    total_succeeded: std::sync::atomic::AtomicU64,
}

impl PersistentOperationQueue {
    /// Open a queue over `store`, loading any persisted snapshot.
    pub async fn open(store: Arc<dyn QueueStore>) -> Result<Self, QueueError> {
        Self::open_with_budget(store, 3).await
    }

    /// Open with an explicit per-operation retry budget.
    pub async fn open_with_budget(
        store: Arc<dyn QueueStore>,
        max_retries: u32,
    ) -> Result<Self, QueueError> {
        let restored = store.load().await?;
        if !restored.is_empty() {
            info!(count = restored.len(), "restored pending operations from storage");
        }

        let queue = Self {
            store,
            operations: Mutex::new(restored.into()),
            draining: AtomicBool::new(false),
            max_retries: max_retries.max(1),
            total_enqueued: std::sync::atomic::AtomicU64::new(0),
            total_succeeded: std::sync::atomic::AtomicU64::new(0),
        };
        queue.publish_gauges();
        Ok(queue)
    }

    /// Append a mutation to the queue, persisting before returning.
    ///
    /// Payloads must be JSON objects; anything else is rejected up front so a
    /// malformed command can never poison the replay loop later.
    pub async fn enqueue(
        &self,
        kind: OperationKind,
        payload: Value,
    ) -> Result<Operation, QueueError> {
        if !payload.is_object() {
            return Err(QueueError::Encoding(format!(
                "payload for {} must be a JSON object",
                kind
            )));
        }

        let operation = Operation::new(kind, payload);
        {
            let mut ops = self.operations.lock();
            ops.push_back(operation.clone());
        }

        // A failed persist rolls the push back: the caller sees the error and
        // memory agrees with disk, so the operation can never replay anyway.
        if let Err(error) = self.persist().await {
            let mut ops = self.operations.lock();
            ops.retain(|op| op.id != operation.id);
            return Err(error);
        }

        self.total_enqueued.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_queue_operation("enqueued");
        self.publish_gauges();
        debug!(id = %operation.id, kind = %operation.kind, "operation enqueued");

        Ok(operation)
    }

    /// Replay eligible operations through `remote`, oldest first.
    ///
    /// At most one drain runs at a time; a second concurrent call returns a
    /// report with `skipped` set and touches nothing. Each operation is
    /// attempted exactly once per pass. Failures bump the operation's retry
    /// count and requeue it in place (order preserved); the rest of the batch
    /// still runs.
    pub async fn drain(&self, remote: &dyn RemoteCall) -> Result<DrainReport, QueueError> {
        if self.draining.swap(true, Ordering::SeqCst) {
            debug!("drain already in flight, skipping");
            return Ok(DrainReport {
                skipped: true,
                remaining: self.pending_count(),
                ..DrainReport::default()
            });
        }
        let _guard = DrainGuard(&self.draining);

        // Snapshot the batch up front: operations enqueued mid-drain wait for
        // the next pass, keeping a pass finite.
        let batch: Vec<Operation> = {
            let ops = self.operations.lock();
            ops.iter()
                .filter(|op| !op.is_exhausted(self.max_retries))
                .cloned()
                .collect()
        };

        let mut report = DrainReport::default();

        for mut operation in batch {
            report.processed += 1;

            match remote.send(&operation).await {
                Ok(()) => {
                    report.succeeded += 1;
                    self.total_succeeded.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_queue_operation("succeeded");
                    debug!(id = %operation.id, kind = %operation.kind, "operation acknowledged");

                    let mut ops = self.operations.lock();
                    ops.retain(|op| op.id != operation.id);
                }
                Err(error) => {
                    operation.retry_count += 1;
                    operation.last_error = Some(error.to_string());

                    if operation.is_exhausted(self.max_retries) {
                        report.exhausted += 1;
                        crate::metrics::record_queue_operation("exhausted");
                        warn!(
                            id = %operation.id,
                            kind = %operation.kind,
                            retries = operation.retry_count,
                            %error,
                            "operation exhausted its retry budget, parking"
                        );
                    } else {
                        report.requeued += 1;
                        crate::metrics::record_queue_operation("requeued");
                        debug!(
                            id = %operation.id,
                            retries = operation.retry_count,
                            %error,
                            "operation failed, requeued"
                        );
                    }

                    // Update in place so FIFO order survives the failure.
                    let mut ops = self.operations.lock();
                    if let Some(slot) = ops.iter_mut().find(|op| op.id == operation.id) {
                        *slot = operation;
                    }
                }
            }

            // Persist after every operation so a crash mid-drain never replays
            // an already-acknowledged mutation.
            self.persist().await?;
        }

        report.remaining = self.pending_count();
        self.publish_gauges();
        crate::metrics::record_drain(&report);

        if report.processed > 0 {
            info!(
                processed = report.processed,
                succeeded = report.succeeded,
                requeued = report.requeued,
                exhausted = report.exhausted,
                remaining = report.remaining,
                "drain pass complete"
            );
        }

        Ok(report)
    }

    /// Reset every operation's retry count and drain immediately. Used after
    /// the user resolves whatever was failing (re-authentication, the service
    /// coming back) and explicitly asks for another go.
    pub async fn force_retry_all(&self, remote: &dyn RemoteCall) -> Result<DrainReport, QueueError> {
        let reset = {
            let mut ops = self.operations.lock();
            let mut reset = 0;
            for op in ops.iter_mut() {
                if op.retry_count > 0 {
                    op.retry_count = 0;
                    op.last_error = None;
                    reset += 1;
                }
            }
            reset
        };

        if reset > 0 {
            self.persist().await?;
            self.publish_gauges();
            info!(count = reset, "retry counts reset, forcing a drain");
        }
        self.drain(remote).await
    }

    /// Drop every queued operation, acknowledged or not.
    ///
    /// Storage is cleared first: if the persist fails, memory is left intact
    /// so the cleared operations cannot resurrect from disk on the next open.
    pub async fn clear(&self) -> Result<(), QueueError> {
        self.store.save(&[]).await?;
        self.operations.lock().clear();
        self.publish_gauges();
        Ok(())
    }

    /// Total queued operations, exhausted included.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.operations.lock().len()
    }

    /// Operations that have used up their retry budget.
    #[must_use]
    pub fn exhausted_count(&self) -> usize {
        self.operations
            .lock()
            .iter()
            .filter(|op| op.is_exhausted(self.max_retries))
            .count()
    }

    /// Snapshot of the exhausted operations, for surfacing to the user.
    #[must_use]
    pub fn exhausted_operations(&self) -> Vec<Operation> {
        self.operations
            .lock()
            .iter()
            .filter(|op| op.is_exhausted(self.max_retries))
            .cloned()
            .collect()
    }

    /// Get queue statistics.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending_count(),
            exhausted: self.exhausted_count(),
            total_enqueued: self.total_enqueued.load(Ordering::Relaxed),
            total_succeeded: self.total_succeeded.load(Ordering::Relaxed),
        }
    }

    async fn persist(&self) -> Result<(), QueueError> {
        let snapshot: Vec<Operation> = {
            let ops = self.operations.lock();
            ops.iter().cloned().collect()
        };
        self.store.save(&snapshot).await?;
        Ok(())
    }

    fn publish_gauges(&self) {
        crate::metrics::set_queue_pending(self.pending_count());
        crate::metrics::set_queue_exhausted(self.exhausted_count());
    }
}

/// Clears the drain flag when a pass ends, success or error.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
