//! Failure classification: transient (retry) versus permanent (reconnect).
//!
//! A pure function over the structured [`RemoteError`] enumeration. Permanent
//! means the credential/session is fundamentally invalid and retrying is
//! pointless until the user re-authenticates; everything else is worth the
//! retry budget.

use crate::error::RemoteError;

/// Retry policy classification for a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Expected to resolve itself; eligible for automatic retry
    Transient,
    /// Requires external remediation (re-authentication); halt retries
    Permanent,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Classify a remote failure.
///
/// Unrecognized errors ([`RemoteError::Other`]) default to transient: the
/// layer favors retrying over premature lockout, at the cost of possibly
/// spending the retry budget on a truly permanent condition.
#[must_use]
pub fn classify(error: &RemoteError) -> FailureClass {
    match error {
        RemoteError::Unauthorized
        | RemoteError::CredentialRevoked
        | RemoteError::ConsentWithdrawn
        | RemoteError::ReauthRequired => FailureClass::Permanent,

        RemoteError::Network
        | RemoteError::Timeout
        | RemoteError::RateLimited
        | RemoteError::Server { .. }
        | RemoteError::MissingCredentials
        | RemoteError::Other(_) => FailureClass::Transient,
    }
}
