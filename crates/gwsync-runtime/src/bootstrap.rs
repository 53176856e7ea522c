//! Startup barrier.
//!
//! Runs once before the election is reported ready so the host never starts
//! with an indeterminate leadership state: it polls the leader record until
//! the election is observably led or observably empty.

use gwsync_kernel::{CandidateIdentity, Election, ElectionConfig, LeaderRecord};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ElectionError, ElectionResult};
use crate::signal::LeadershipPublisher;

/// Wait for a definitive view of the election.
///
/// "No leader" is retried every `discovery_interval` up to
/// `discovery_attempts` times, after which the election is taken to be empty
/// and `Ok(None)` is returned. Any other query error is fatal. When another
/// candidate already leads, a single `false` is queued as the first event the
/// host will see.
pub(crate) async fn await_initial_leader(
    election: &mut dyn Election,
    identity: &CandidateIdentity,
    config: &ElectionConfig,
    publisher: &mut LeadershipPublisher,
    cancel: &CancellationToken,
) -> ElectionResult<Option<LeaderRecord>> {
    let attempts = config.discovery_attempts.max(1);

    for attempt in 1..=attempts {
        let queried = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ElectionError::Cancelled),
            res = election.leader() => res,
        };

        match queried {
            Ok(record) => {
                if !identity.matches(&record.value) {
                    publisher.announce_follower();
                }
                info!(leader = %record.value, candidate = %identity, "initial leader discovered");
                return Ok(Some(record));
            }
            Err(e) if e.is_no_leader() => {
                debug!(attempt, "election has no leader yet");
            }
            Err(e) => return Err(ElectionError::Discovery(e)),
        }

        if attempt < attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ElectionError::Cancelled),
                _ = tokio::time::sleep(config.discovery_interval()) => {}
            }
        }
    }

    info!(candidate = %identity, "election has no leader");
    Ok(None)
}
