// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-resource retry coordination with exponential backoff.
//!
//! Each logical remote resource (a sync provider, an account) gets its own
//! retry state machine:
//!
//! ```text
//! Idle → Attempting(n) → Success          → Idle
//!                      → Transient        → backoff → Attempting(n+1)
//!                      → Permanent        → ReconnectRequired
//!                      → budget exhausted → ReconnectRequired
//! ```
//!
//! `ReconnectRequired` is terminal until an external actor calls
//! [`RetryCoordinator::reset_retry_state`] (e.g., after the user
//! re-authenticates). A resource whose last attempt is older than the idle
//! window is treated as a fresh situation, so a transient failure from hours
//! ago never permanently pollutes the bookkeeping.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::classify::{classify, FailureClass};
use crate::error::RemoteError;

/// Outcome of [`RetryCoordinator::attempt_with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The operation succeeded within the retry budget
    Success,
    /// A retry sequence for this resource is already in flight; nothing started
    AlreadyRetrying,
    /// The resource is flagged for reconnection; nothing attempted
    ReconnectRequired,
    /// An attempt failed with a permanent classification; retries halted
    PermanentFailure,
    /// Every attempt in the budget failed transiently
    RetriesExhausted,
}

impl RetryOutcome {
    /// The boolean contract: did the operation eventually succeed?
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for RetryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::AlreadyRetrying => write!(f, "already_retrying"),
            Self::ReconnectRequired => write!(f, "reconnect_required"),
            Self::PermanentFailure => write!(f, "permanent_failure"),
            Self::RetriesExhausted => write!(f, "retries_exhausted"),
        }
    }
}

/// Point-in-time view of a resource's retry state, for status surfacing.
#[derive(Debug, Clone)]
pub struct RetrySnapshot {
    pub resource_key: String,
    pub attempt_count: u32,
    pub is_retrying: bool,
    pub reconnect_required: bool,
    pub status_message: String,
}

#[derive(Debug, Default)]
struct RetryState {
    attempt_count: u32,
    last_attempt_at: Option<Instant>,
    is_retrying: bool,
    reconnect_required: bool,
    status_message: String,
}

/// Drives exponential-backoff retries per resource key.
pub struct RetryCoordinator {
    states: Mutex<HashMap<String, RetryState>>,
    /// Base backoff delay (delay after attempt n is `base * 2^(n-1)`)
    base_delay: Duration,
    /// Total attempts allowed per sequence
    max_retries: u32,
    /// Inactivity window after which a resource is treated as fresh
    idle_reset: Duration,
}

impl RetryCoordinator {
    /// Production defaults: base 2s, 3 attempts, 10 minute idle window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(Duration::from_secs(2), 3, Duration::from_secs(600))
    }

    #[must_use]
    pub fn with_policy(base_delay: Duration, max_retries: u32, idle_reset: Duration) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            base_delay,
            max_retries: max_retries.max(1),
            idle_reset,
        }
    }

    /// Run `operation` for `resource_key`, retrying transient failures with
    /// exponential backoff.
    ///
    /// Returns [`RetryOutcome::AlreadyRetrying`] without starting anything if
    /// a sequence for this key is in flight, and
    /// [`RetryOutcome::ReconnectRequired`] without attempting if the resource
    /// is still flagged from a previous permanent failure. Both failure
    /// outcomes leave `reconnect_required` set for the key.
    pub async fn attempt_with_retry<F, Fut>(
        &self,
        resource_key: &str,
        operation: F,
    ) -> RetryOutcome
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), RemoteError>>,
    {
        // Admission check + idle reset, one short critical section.
        {
            let mut states = self.states.lock();
            let state = states.entry(resource_key.to_string()).or_default();

            if state.is_retrying {
                debug!(resource = resource_key, "retry sequence already in flight");
                return RetryOutcome::AlreadyRetrying;
            }

            if let Some(last) = state.last_attempt_at {
                if last.elapsed() >= self.idle_reset {
                    debug!(resource = resource_key, "idle window elapsed, resetting state");
                    state.attempt_count = 0;
                    state.reconnect_required = false;
                    state.status_message = String::new();
                }
            }

            if state.reconnect_required {
                debug!(resource = resource_key, "resource requires reconnection, not attempting");
                return RetryOutcome::ReconnectRequired;
            }

            state.is_retrying = true;
            state.attempt_count = 0;
        }

        // Cleared on every exit path, including panics inside `operation`.
        let _guard = RetryingGuard {
            key: resource_key,
            states: &self.states,
        };

        let mut attempt = 1u32;
        loop {
            {
                let mut states = self.states.lock();
                if let Some(state) = states.get_mut(resource_key) {
                    state.attempt_count = attempt;
                    state.last_attempt_at = Some(Instant::now());
                }
            }

            match operation().await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(resource = resource_key, attempt, "succeeded after retries");
                    }
                    self.update_state(resource_key, |state| {
                        state.attempt_count = 0;
                        state.reconnect_required = false;
                        state.status_message = "up to date".to_string();
                    });
                    crate::metrics::record_retry_outcome("success");
                    return RetryOutcome::Success;
                }
                Err(error) => match classify(&error) {
                    FailureClass::Permanent => {
                        warn!(resource = resource_key, attempt, %error, "permanent failure, halting retries");
                        self.update_state(resource_key, |state| {
                            state.reconnect_required = true;
                            state.status_message = format!("reconnect required: {}", error);
                        });
                        crate::metrics::record_retry_outcome("permanent");
                        return RetryOutcome::PermanentFailure;
                    }
                    FailureClass::Transient => {
                        if attempt >= self.max_retries {
                            warn!(
                                resource = resource_key,
                                attempts = attempt,
                                %error,
                                "retry budget exhausted"
                            );
                            self.update_state(resource_key, |state| {
                                state.reconnect_required = true;
                                state.status_message =
                                    format!("failed after {} attempts: {}", attempt, error);
                            });
                            crate::metrics::record_retry_outcome("exhausted");
                            return RetryOutcome::RetriesExhausted;
                        }

                        // Saturate rather than panic for budgets past 32 attempts
                        let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
                        let delay = self.base_delay.saturating_mul(factor);
                        warn!(
                            resource = resource_key,
                            attempt,
                            max = self.max_retries,
                            %error,
                            delay_secs = delay.as_secs(),
                            "transient failure, backing off"
                        );
                        self.update_state(resource_key, |state| {
                            state.status_message =
                                format!("attempt {}/{} failed: {}", attempt, self.max_retries, error);
                        });

                        sleep(delay).await;
                        attempt += 1;
                    }
                },
            }
        }
    }

    /// Clear all bookkeeping for `resource_key` (e.g., after the user
    /// re-authenticated). Does not cancel any network call already dispatched;
    /// it only affects scheduling of future attempts.
    pub fn reset_retry_state(&self, resource_key: &str) {
        let mut states = self.states.lock();
        if states.remove(resource_key).is_some() {
            info!(resource = resource_key, "retry state reset");
        }
    }

    /// Whether the resource is flagged as needing an explicit reconnect.
    #[must_use]
    pub fn needs_reconnection(&self, resource_key: &str) -> bool {
        self.states
            .lock()
            .get(resource_key)
            .is_some_and(|state| state.reconnect_required)
    }

    /// Snapshot a resource's retry state, if it has any.
    #[must_use]
    pub fn snapshot(&self, resource_key: &str) -> Option<RetrySnapshot> {
        self.states.lock().get(resource_key).map(|state| RetrySnapshot {
            resource_key: resource_key.to_string(),
            attempt_count: state.attempt_count,
            is_retrying: state.is_retrying,
            reconnect_required: state.reconnect_required,
            status_message: state.status_message.clone(),
        })
    }

    fn update_state(&self, resource_key: &str, f: impl FnOnce(&mut RetryState)) {
        let mut states = self.states.lock();
        if let Some(state) = states.get_mut(resource_key) {
            f(state);
        }
    }
}

impl Default for RetryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the per-key `is_retrying` flag when the sequence ends.
struct RetryingGuard<'a> {
    key: &'a str,
    states: &'a Mutex<HashMap<String, RetryState>>,
}

impl Drop for RetryingGuard<'_> {
    fn drop(&mut self) {
        let mut states = self.states.lock();
        if let Some(state) = states.get_mut(self.key) {
            state.is_retrying = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn failing_transiently(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn() -> std::future::Ready<Result<(), RemoteError>> {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err(RemoteError::Timeout))
        }
    }

    #[tokio::test]
    async fn test_immediate_success() {
        let coordinator = RetryCoordinator::new();

        let outcome = coordinator
            .attempt_with_retry("google", || async { Ok(()) })
            .await;

        assert_eq!(outcome, RetryOutcome::Success);
        assert!(outcome.is_success());
        assert!(!coordinator.needs_reconnection("google"));

        let snapshot = coordinator.snapshot("google").unwrap();
        assert_eq!(snapshot.attempt_count, 0);
        assert!(!snapshot.is_retrying);
        assert_eq!(snapshot.status_message, "up to date");
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let coordinator = RetryCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let outcome = coordinator
            .attempt_with_retry("google", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) + 1 < 3 {
                        Err(RemoteError::Network)
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert_eq!(outcome, RetryOutcome::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!coordinator.needs_reconnection("google"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_retry_then_exhausted() {
        let coordinator = RetryCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let outcome = coordinator
            .attempt_with_retry("google", failing_transiently(calls.clone()))
            .await;

        assert_eq!(outcome, RetryOutcome::RetriesExhausted);
        assert!(!outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(coordinator.needs_reconnection("google"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_timing() {
        let coordinator = RetryCoordinator::new();
        let timestamps: Arc<parking_lot::Mutex<Vec<Instant>>> =
            Arc::new(parking_lot::Mutex::new(Vec::new()));

        let stamps = timestamps.clone();
        coordinator
            .attempt_with_retry("google", move || {
                stamps.lock().push(Instant::now());
                std::future::ready(Err::<(), _>(RemoteError::Timeout))
            })
            .await;

        let stamps = timestamps.lock();
        assert_eq!(stamps.len(), 3);
        // Delay after attempt n is base * 2^(n-1): 2s then 4s
        assert!(stamps[1] - stamps[0] >= Duration::from_secs(2));
        assert!(stamps[2] - stamps[1] >= Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_permanent_short_circuits_on_first_attempt() {
        let coordinator = RetryCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let outcome = coordinator
            .attempt_with_retry("google", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err(RemoteError::CredentialRevoked))
            })
            .await;

        assert_eq!(outcome, RetryOutcome::PermanentFailure);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(coordinator.needs_reconnection("google"));

        let snapshot = coordinator.snapshot("google").unwrap();
        assert_eq!(snapshot.attempt_count, 1);
        assert!(snapshot.status_message.contains("reconnect required"));
    }

    #[tokio::test]
    async fn test_reconnect_required_blocks_new_attempts() {
        let coordinator = RetryCoordinator::new();

        coordinator
            .attempt_with_retry("google", || async { Err(RemoteError::Unauthorized) })
            .await;

        let calls = Arc::new(AtomicUsize::new(0));
        let outcome = coordinator
            .attempt_with_retry("google", failing_transiently(calls.clone()))
            .await;

        assert_eq!(outcome, RetryOutcome::ReconnectRequired);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reset_clears_reconnect_flag() {
        let coordinator = RetryCoordinator::new();

        coordinator
            .attempt_with_retry("google", || async { Err(RemoteError::ConsentWithdrawn) })
            .await;
        assert!(coordinator.needs_reconnection("google"));

        coordinator.reset_retry_state("google");
        assert!(!coordinator.needs_reconnection("google"));

        let outcome = coordinator
            .attempt_with_retry("google", || async { Ok(()) })
            .await;
        assert_eq!(outcome, RetryOutcome::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutual_exclusion_per_resource() {
        let coordinator = Arc::new(RetryCoordinator::new());

        // First sequence parks in its backoff sleep
        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .attempt_with_retry("google", || async { Err(RemoteError::Timeout) })
                    .await
            })
        };
        tokio::task::yield_now().await;

        // Second call for the same resource must not start a parallel sequence
        let second = coordinator
            .attempt_with_retry("google", || async { Ok(()) })
            .await;
        assert_eq!(second, RetryOutcome::AlreadyRetrying);

        assert_eq!(first.await.unwrap(), RetryOutcome::RetriesExhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_resources_run_concurrently() {
        let coordinator = Arc::new(RetryCoordinator::new());

        let google = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .attempt_with_retry("google", || async { Err(RemoteError::Timeout) })
                    .await
            })
        };
        tokio::task::yield_now().await;

        // A different resource is unaffected by google's in-flight sequence
        let outlook = coordinator
            .attempt_with_retry("outlook", || async { Ok(()) })
            .await;
        assert_eq!(outlook, RetryOutcome::Success);

        assert_eq!(google.await.unwrap(), RetryOutcome::RetriesExhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_window_resets_stale_state() {
        let coordinator = RetryCoordinator::new();

        // Exhaust the budget and latch reconnect_required
        coordinator
            .attempt_with_retry("google", || async { Err(RemoteError::Timeout) })
            .await;
        assert!(coordinator.needs_reconnection("google"));

        // More than 10 minutes later the resource is a fresh situation
        tokio::time::advance(Duration::from_secs(601)).await;

        let outcome = coordinator
            .attempt_with_retry("google", || async { Ok(()) })
            .await;

        assert_eq!(outcome, RetryOutcome::Success);
        assert!(!coordinator.needs_reconnection("google"));
        assert_eq!(coordinator.snapshot("google").unwrap().attempt_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_within_idle_window_state_persists() {
        let coordinator = RetryCoordinator::new();

        coordinator
            .attempt_with_retry("google", || async { Err(RemoteError::Unauthorized) })
            .await;

        tokio::time::advance(Duration::from_secs(300)).await; // 5 min < 10 min

        let outcome = coordinator
            .attempt_with_retry("google", || async { Ok(()) })
            .await;
        assert_eq!(outcome, RetryOutcome::ReconnectRequired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_budget_saturates_backoff() {
        // 35 attempts pushes 2^(n-1) past u32 range; the delay must clamp,
        // not panic
        let coordinator =
            RetryCoordinator::with_policy(Duration::from_secs(2), 35, Duration::MAX);
        let calls = Arc::new(AtomicUsize::new(0));

        let outcome = coordinator
            .attempt_with_retry("google", failing_transiently(calls.clone()))
            .await;

        assert_eq!(outcome, RetryOutcome::RetriesExhausted);
        assert_eq!(calls.load(Ordering::SeqCst), 35);
    }

    #[tokio::test]
    async fn test_snapshot_unknown_resource() {
        let coordinator = RetryCoordinator::new();
        assert!(coordinator.snapshot("nope").is_none());
        assert!(!coordinator.needs_reconnection("nope"));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(RetryOutcome::Success.to_string(), "success");
        assert_eq!(RetryOutcome::AlreadyRetrying.to_string(), "already_retrying");
        assert_eq!(RetryOutcome::RetriesExhausted.to_string(), "retries_exhausted");
    }
}
