//! In-memory store, mainly for tests and ephemeral configurations.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::traits::{QueueStore, StoreError};
use crate::operation::Operation;

/// [`QueueStore`] backed by a mutex-guarded vec.
///
/// Supports fault injection (`fail_next_save`) so queue tests can exercise
/// the persistence-failure paths without a real filesystem.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<Vec<Operation>>,
    fail_next_save: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `save` call fail with a backend error.
    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    /// Number of operations in the current snapshot.
    #[must_use]
    pub fn stored_count(&self) -> usize {
        self.snapshot.lock().len()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn load(&self) -> Result<Vec<Operation>, StoreError> {
        Ok(self.snapshot.lock().clone())
    }

    async fn save(&self, operations: &[Operation]) -> Result<(), StoreError> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected save failure".to_string()));
        }
        *self.snapshot.lock() = operations.to_vec();
        Ok(())
    }
}
