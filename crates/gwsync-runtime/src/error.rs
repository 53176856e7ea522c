//! Election engine error types

use gwsync_kernel::{CoordinationError, ElectionConfigError};
use thiserror::Error;

/// Errors surfaced to the host by the election engine.
///
/// Only startup can fail: once [`LeaderElection::start`](crate::LeaderElection::start)
/// has returned, coordination failures are absorbed and retried internally.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ElectionError {
    #[error("invalid election config: {0}")]
    InvalidConfig(#[from] ElectionConfigError),

    #[error("failed to create coordination session: {0}")]
    SessionCreation(#[source] CoordinationError),

    #[error("failed to discover election leader: {0}")]
    Discovery(#[source] CoordinationError),

    #[error("failed to register election metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("election cancelled")]
    Cancelled,
}

pub type ElectionResult<T> = Result<T, ElectionError>;
