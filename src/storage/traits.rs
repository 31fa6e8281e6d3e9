//! Storage trait for the durable operation queue.

use async_trait::async_trait;
use thiserror::Error;

use crate::operation::Operation;

/// Errors surfaced by queue persistence backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence backend for the operation queue.
///
/// The queue persists full snapshots: `save` replaces whatever was stored
/// before, and `load` returns the most recent snapshot in its entirety (an
/// empty vec when nothing has been stored yet). Implementations must make
/// `save` atomic with respect to crashes: after a failure mid-save, `load`
/// returns either the old snapshot or the new one, never a torn mix.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Load the last persisted snapshot. Absent storage yields an empty vec.
    async fn load(&self) -> Result<Vec<Operation>, StoreError>;

    /// Atomically replace the persisted snapshot.
    async fn save(&self, operations: &[Operation]) -> Result<(), StoreError>;
}
