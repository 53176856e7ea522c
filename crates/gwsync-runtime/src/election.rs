//! Host-facing election handle.

use std::sync::Arc;

use gwsync_kernel::{CandidateIdentity, CoordinationClient, ElectionConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bootstrap::await_initial_leader;
use crate::coordinator::ElectionCoordinator;
use crate::error::ElectionResult;
use crate::metrics::ElectionMetrics;
use crate::session::SessionManager;
use crate::signal::{LeadershipFlag, LeadershipSignal, leadership_channel};

/// A running election for one candidate.
///
/// Obtaining one means the startup barrier has passed: the election was seen
/// either with a leader or definitively empty, and if another candidate
/// leads, `false` is already queued on the signal.
pub struct LeaderElection {
    identity: CandidateIdentity,
    flag: LeadershipFlag,
    signal: Option<LeadershipSignal>,
    metrics: ElectionMetrics,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LeaderElection {
    /// Validate `config`, open the first session, run the startup barrier and
    /// spawn the background election task.
    ///
    /// Errors from the first session or the barrier are returned to the
    /// caller. Afterwards every transport failure is retried internally.
    /// Cancelling `cancel` (or calling [`shutdown`](Self::shutdown)) stops
    /// the task, resigning first if this candidate leads.
    pub async fn start(
        client: Arc<dyn CoordinationClient>,
        identity: CandidateIdentity,
        config: ElectionConfig,
        cancel: CancellationToken,
    ) -> ElectionResult<Self> {
        config.validate()?;
        let cancel = cancel.child_token();
        let metrics = ElectionMetrics::new(&config.election_name, identity.as_str())?;

        let sessions = SessionManager::new(client, config.election_name.clone(), config.ttl());
        let mut active = sessions.new_session(&cancel, None).await?;
        let (publisher, signal, flag) = leadership_channel(config.signal_capacity, cancel.clone());
        let mut publisher = publisher.with_metrics(metrics.clone());

        let barrier = await_initial_leader(
            active.election.as_mut(),
            &identity,
            &config,
            &mut publisher,
            &cancel,
        )
        .await;
        if let Err(e) = barrier {
            active.close().await;
            return Err(e);
        }

        info!(
            candidate = %identity,
            election = %config.election_name,
            lease = %active.lease_id(),
            "leader election ready"
        );

        let coordinator = ElectionCoordinator::new(
            identity.clone(),
            config,
            sessions,
            active,
            publisher,
            metrics.clone(),
            cancel.clone(),
        );
        let task = tokio::spawn(coordinator.run());

        Ok(Self {
            identity,
            flag,
            signal: Some(signal),
            metrics,
            cancel,
            task,
        })
    }

    pub fn identity(&self) -> &CandidateIdentity {
        &self.identity
    }

    /// Whether this candidate currently leads.
    pub fn is_leader(&self) -> bool {
        self.flag.is_leader()
    }

    pub fn leadership_flag(&self) -> LeadershipFlag {
        self.flag.clone()
    }

    /// Leadership and reconnect series for this election.
    pub fn metrics(&self) -> &ElectionMetrics {
        &self.metrics
    }

    /// Take the leadership event stream. There is a single consumer, so this
    /// returns `Some` only once.
    pub fn take_signal(&mut self) -> Option<LeadershipSignal> {
        self.signal.take()
    }

    /// Stop the election and wait for the background task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(candidate = %self.identity, error = %e, "election task failed");
        }
    }
}

impl std::fmt::Debug for LeaderElection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderElection")
            .field("identity", &self.identity)
            .field("is_leader", &self.is_leader())
            .finish_non_exhaustive()
    }
}
