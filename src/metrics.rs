// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics emission helpers.
//!
//! Thin wrappers over the `metrics` crate macros so call sites stay one-line
//! and metric names stay consistent. All metrics carry the `offline_sync_`
//! prefix:
//!
//! - `offline_sync_cache_access_total{status}` — hit / stale / miss / expired
//! - `offline_sync_dedupe_total{status}` — started / joined
//! - `offline_sync_retry_outcome_total{status}` — success / permanent / exhausted
//! - `offline_sync_queue_operations_total{status}` — enqueued / succeeded / requeued / exhausted
//! - `offline_sync_queue_pending` / `offline_sync_queue_exhausted` — gauges
//! - `offline_sync_drain_processed` — operations attempted per drain pass
//!
//! Recording is a no-op unless the host application installs a recorder.

use metrics::{counter, gauge, histogram};

use crate::queue::DrainReport;

pub(crate) fn record_cache_access(status: &'static str) {
    counter!("offline_sync_cache_access_total", "status" => status).increment(1);
}

pub(crate) fn record_dedupe(status: &'static str) {
    counter!("offline_sync_dedupe_total", "status" => status).increment(1);
}

pub(crate) fn record_retry_outcome(status: &'static str) {
    counter!("offline_sync_retry_outcome_total", "status" => status).increment(1);
}

pub(crate) fn record_queue_operation(status: &'static str) {
    counter!("offline_sync_queue_operations_total", "status" => status).increment(1);
}

pub(crate) fn set_queue_pending(count: usize) {
    gauge!("offline_sync_queue_pending").set(count as f64);
}

pub(crate) fn set_queue_exhausted(count: usize) {
    gauge!("offline_sync_queue_exhausted").set(count as f64);
}

pub(crate) fn record_drain(report: &DrainReport) {
    if !report.skipped {
        histogram!("offline_sync_drain_processed").record(report.processed as f64);
    }
}
