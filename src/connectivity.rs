// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connectivity tracking and the reconnect-drain hook.
//!
//! The application reports online/offline transitions (from whatever platform
//! signal it has); a background task watches those transitions and drains the
//! operation queue on every offline-to-online edge, provided credentials are
//! present to act with.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::queue::PersistentOperationQueue;
use crate::remote::RemoteCall;

/// Reported reachability of the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Online,
    Offline,
}

/// Source of truth for connectivity transitions.
///
/// The application calls [`mark_online`](Self::mark_online) /
/// [`mark_offline`](Self::mark_offline) as its platform signal changes;
/// consumers subscribe to a [`watch`] channel and react to edges.
pub struct ConnectivityMonitor {
    tx: watch::Sender<ConnectivityState>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the given initial state.
    #[must_use]
    pub fn new(initial: ConnectivityState) -> (Self, watch::Receiver<ConnectivityState>) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx }, rx)
    }

    pub fn mark_online(&self) {
        if self.tx.send_if_modified(|state| {
            let changed = *state != ConnectivityState::Online;
            *state = ConnectivityState::Online;
            changed
        }) {
            info!("connectivity restored");
        }
    }

    pub fn mark_offline(&self) {
        if self.tx.send_if_modified(|state| {
            let changed = *state != ConnectivityState::Offline;
            *state = ConnectivityState::Offline;
            changed
        }) {
            info!("connectivity lost");
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    /// Attach another consumer.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }
}

/// Read access to whether usable credentials exist.
///
/// A reconnect drain without credentials would burn every queued operation's
/// retry budget on guaranteed auth failures, so the drain task checks this
/// first and waits for the next edge instead.
pub trait CredentialStore: Send + Sync {
    fn has_credentials(&self) -> bool;
}

/// Spawn the task that drains the queue on every offline-to-online edge.
///
/// The task ends when the monitor (the sending half) is dropped.
pub fn spawn_drain_on_reconnect(
    queue: Arc<PersistentOperationQueue>,
    remote: Arc<dyn RemoteCall>,
    credentials: Arc<dyn CredentialStore>,
    mut rx: watch::Receiver<ConnectivityState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut previous = *rx.borrow();

        while rx.changed().await.is_ok() {
            let current = *rx.borrow();
            let reconnected =
                previous == ConnectivityState::Offline && current == ConnectivityState::Online;
            previous = current;

            if !reconnected {
                continue;
            }

            if !credentials.has_credentials() {
                debug!("reconnected without credentials, skipping drain");
                continue;
            }

            debug!(pending = queue.pending_count(), "reconnected, draining queue");
            match queue.drain(remote.as_ref()).await {
                Ok(report) if report.skipped => {
                    debug!("reconnect drain skipped, another drain in flight");
                }
                Ok(report) => {
                    debug!(
                        succeeded = report.succeeded,
                        remaining = report.remaining,
                        "reconnect drain finished"
                    );
                }
                Err(error) => {
                    warn!(%error, "reconnect drain failed to persist");
                }
            }
        }
    })
}
