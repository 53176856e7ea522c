//! Coordination-service error types.

use std::time::Duration;

use thiserror::Error;

use super::types::LeaseId;

/// Failure modes reported by a [`CoordinationClient`](super::CoordinationClient)
/// backend.
///
/// [`CoordinationError::NoLeader`] is not a failure: it is the distinguished
/// answer to a leader query on an empty election and callers are expected to
/// branch on it with [`is_no_leader`](CoordinationError::is_no_leader).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CoordinationError {
    /// The election currently has no leader record.
    #[error("election has no leader")]
    NoLeader,

    /// The lease backing the session is gone.
    #[error("session lease {0} has expired")]
    SessionExpired(LeaseId),

    /// A caller asked to re-attach to a lease the service does not know.
    #[error("lease {0} not found")]
    LeaseNotFound(LeaseId),

    /// The operation was abandoned because its caller was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation did not complete within its bound.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The service could not be reached.
    #[error("coordination service unavailable: {0}")]
    Unavailable(String),

    /// Any other error surfaced by the backend.
    #[error("coordination backend error: {0}")]
    Backend(String),
}

impl CoordinationError {
    /// `true` for the "no leader yet" answer of a leader query.
    pub fn is_no_leader(&self) -> bool {
        matches!(self, CoordinationError::NoLeader)
    }
}

/// Result alias for coordination-service calls.
pub type CoordinationResult<T> = Result<T, CoordinationError>;
