//! Error taxonomy for the resilience layer.
//!
//! [`RemoteError`] is the closed enumeration the transport must map its
//! failures into. The classifier switches on these variants directly, so
//! retry policy never depends on error message wording.

use thiserror::Error;

/// Failure reported by the remote-call transport.
///
/// This is a closed set: transports translate whatever their HTTP/SDK layer
/// produces into one of these variants. Anything that genuinely fits no
/// pattern goes into [`RemoteError::Other`], which the classifier treats as
/// transient (it consumes retry budget rather than locking the resource out).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Network unreachable or connection dropped
    #[error("network unavailable")]
    Network,

    /// The transport-level timeout elapsed
    #[error("request timed out")]
    Timeout,

    /// The remote service is rate limiting us
    #[error("rate limited by remote service")]
    RateLimited,

    /// 5xx-class server condition
    #[error("server error (status {status})")]
    Server { status: u16 },

    /// Request rejected as unauthorized
    #[error("unauthorized")]
    Unauthorized,

    /// The credential/session was explicitly revoked
    #[error("credential revoked")]
    CredentialRevoked,

    /// The user withdrew consent for this integration
    #[error("consent withdrawn")]
    ConsentWithdrawn,

    /// The remote explicitly signalled that re-authentication is required
    #[error("re-authentication required")]
    ReauthRequired,

    /// No credentials available locally; nothing was sent
    #[error("no credentials available")]
    MissingCredentials,

    /// Anything the transport could not map onto a known variant
    #[error("unclassified remote failure: {0}")]
    Other(String),
}
