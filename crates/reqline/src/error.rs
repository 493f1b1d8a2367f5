//! Error types for the request-correlation layer.
//!
//! ## Error Cases
//! - `Timeout`: a blocking wait ran out of time. The underlying request is
//!   *not* cancelled and may still complete later.
//! - `Remote`: the remote side reported a terminal failure for a request
//!   before any result arrived.
//! - `ContractViolation`: an inbound callback or a caller broke the protocol
//!   contract (an error after results, a negative identifier). These point at
//!   a bug upstream and are never coerced into a valid state.
//! - `InvalidConfig`: a session was constructed with unusable settings.
//!
//! Rate limiting never produces an error; admission only adds latency.

use core::time::Duration;

/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for request correlation and identifier allocation.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A blocking wait exceeded its bound with no terminal signal.
    #[error("Timed out after {waited:?} waiting for {operation}")]
    Timeout {
        operation: &'static str,
        waited: Duration,
    },

    /// The remote side failed the request for `descriptor`.
    #[error("Remote error for {descriptor}: {message}")]
    Remote { descriptor: String, message: String },

    /// A caller or the inbound dispatcher broke the protocol contract.
    #[error("Contract violation: {reason}")]
    ContractViolation { reason: String },

    /// The session configuration was rejected.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    pub(crate) fn timeout(operation: &'static str, waited: Duration) -> Self {
        Self::Timeout { operation, waited }
    }

    pub(crate) fn violation(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        #[cfg(feature = "tracing")]
        tracing::error!(%reason, "contract violation");
        Self::ContractViolation { reason }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error is a [`Error::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
