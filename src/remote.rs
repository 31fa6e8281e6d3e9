//! The seam between the resilience layer and the actual remote service.

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::operation::Operation;

/// Dispatches a queued operation to the remote service.
///
/// Implementations translate the operation's kind and payload into the
/// concrete API call and map failures onto [`RemoteError`]. The queue treats
/// `Ok(())` as a durable acknowledgment: the operation is removed and never
/// replayed again.
#[async_trait]
pub trait RemoteCall: Send + Sync {
    async fn send(&self, operation: &Operation) -> Result<(), RemoteError>;
}
