//! Election state machine.
//!
//! One background task owns the session, the election handle and the
//! leadership state. Every state is a method that returns its successor:
//!
//! | State | Success | Failure | Cancellation |
//! |-------|---------|---------|--------------|
//! | `DiscoverLeader` | `Campaign`, or `Observe` on resume | `Reconnect` | `Terminated` |
//! | `Campaign` | `Observe` (leader) | `Reconnect` (error or session lost) | `Terminated` |
//! | `Observe` | stays, tracking the leader value | `Reconnect` (stream closed or session lost) | resign if leader, `Terminated` |
//! | `Reconnect` | `DiscoverLeader` | retry after backoff | `Terminated` |
//!
//! Every suspension point races the cancellation token and, where a session
//! is involved, the session's done-token.

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use gwsync_kernel::{CandidateIdentity, CoordinationError, ElectionConfig, LeaderRecord};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ElectionError;
use crate::metrics::ElectionMetrics;
use crate::session::{ActiveSession, SessionManager};
use crate::signal::LeadershipPublisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    DiscoverLeader,
    Campaign,
    Observe,
    Reconnect,
    Terminated,
}

enum CampaignOutcome {
    Cancelled,
    SessionLost,
    Finished(Result<(), CoordinationError>),
}

enum ObserveEvent {
    Cancelled,
    SessionLost,
    Value(Option<String>),
}

pub(crate) struct ElectionCoordinator {
    identity: CandidateIdentity,
    config: ElectionConfig,
    sessions: SessionManager,
    active: Option<ActiveSession>,
    publisher: LeadershipPublisher,
    metrics: ElectionMetrics,
    cancel: CancellationToken,
    /// When the last session was requested; reconnects are paced from here.
    last_attempt: Instant,
}

impl ElectionCoordinator {
    pub(crate) fn new(
        identity: CandidateIdentity,
        config: ElectionConfig,
        sessions: SessionManager,
        active: ActiveSession,
        publisher: LeadershipPublisher,
        metrics: ElectionMetrics,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            identity,
            config,
            sessions,
            active: Some(active),
            publisher,
            metrics,
            cancel,
            last_attempt: Instant::now(),
        }
    }

    /// Drive the state machine until cancelled, then close the leadership
    /// signal.
    pub(crate) async fn run(mut self) {
        let mut state = State::DiscoverLeader;
        while state != State::Terminated {
            debug!(candidate = %self.identity, ?state, "election state");
            state = self.step(state).await;
        }
        self.publisher.close();
        info!(candidate = %self.identity, "election coordinator stopped");
    }

    async fn step(&mut self, state: State) -> State {
        match state {
            State::DiscoverLeader => self.discover_leader().await,
            State::Campaign => self.campaign().await,
            State::Observe => self.observe().await,
            State::Reconnect => self.reconnect().await,
            State::Terminated => State::Terminated,
        }
    }

    /// Await `fut` unless cancellation comes first.
    async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }

    // ── DiscoverLeader ──────────────────────────────────────────────────────

    async fn discover_leader(&mut self) -> State {
        let cancel = self.cancel.clone();
        let Some(active) = self.active.as_mut() else {
            return State::Reconnect;
        };

        let queried = match Self::until_cancelled(&cancel, active.election.leader()).await {
            Some(res) => res,
            None => return self.terminate().await,
        };

        match queried {
            Err(e) if e.is_no_leader() => {
                debug!(candidate = %self.identity, "no leader, campaigning");
            }
            Err(e) => {
                warn!(candidate = %self.identity, error = %e, "leader query failed");
                return State::Reconnect;
            }
            Ok(record) if self.identity.matches(&record.value) => {
                if self.config.resume_leader_on_restart {
                    return self.resume(record).await;
                }
                match self.relinquish(&record).await {
                    Ok(()) => {}
                    Err(CoordinationError::Cancelled) => return self.terminate().await,
                    Err(e) => {
                        warn!(candidate = %self.identity, error = %e, "failed to resign stale leadership");
                        return State::Reconnect;
                    }
                }
            }
            Ok(record) => {
                debug!(candidate = %self.identity, leader = %record.value, "following current leader");
            }
        }

        self.publisher.set(false).await;
        State::Campaign
    }

    /// Re-attach to the lease of a leader record that names us, without
    /// campaigning again.
    async fn resume(&mut self, record: LeaderRecord) -> State {
        if let Some(previous) = self.active.take() {
            previous.close().await;
        }

        let resumed = match self.sessions.new_session(&self.cancel, Some(record.lease)).await {
            Ok(active) => active,
            Err(ElectionError::Cancelled) => return self.terminate().await,
            Err(e) => {
                warn!(candidate = %self.identity, lease = %record.lease, error = %e, "failed to resume leader lease");
                return State::Reconnect;
            }
        };

        let election = self
            .sessions
            .resume_election(resumed.session.clone(), &record);
        info!(
            candidate = %self.identity,
            lease = %record.lease,
            revision = record.create_revision,
            "resuming existing leadership"
        );
        self.active = Some(ActiveSession {
            session: resumed.session,
            election,
        });
        State::Observe
    }

    /// Resign a leader record that names us but belongs to a previous run.
    async fn relinquish(&mut self, record: &LeaderRecord) -> Result<(), CoordinationError> {
        let Some(active) = self.active.as_ref() else {
            return Err(CoordinationError::Cancelled);
        };
        let mut stale = self.sessions.resume_election(active.session.clone(), record);
        let ttl = self.config.ttl();

        info!(candidate = %self.identity, lease = %record.lease, "resigning leadership from a previous run");
        match Self::until_cancelled(&self.cancel, tokio::time::timeout(ttl, stale.resign())).await {
            Some(Ok(res)) => res,
            Some(Err(_)) => Err(CoordinationError::Timeout(ttl)),
            None => Err(CoordinationError::Cancelled),
        }
    }

    // ── Campaign ────────────────────────────────────────────────────────────

    async fn campaign(&mut self) -> State {
        let cancel = self.cancel.clone();
        let Some(active) = self.active.as_mut() else {
            return State::Reconnect;
        };
        let session_done = active.done();
        let lease = active.lease_id();

        info!(candidate = %self.identity, lease = %lease, "campaigning for leadership");
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => CampaignOutcome::Cancelled,
            _ = session_done.cancelled() => CampaignOutcome::SessionLost,
            res = active.election.campaign(self.identity.as_str()) => CampaignOutcome::Finished(res),
        };

        match outcome {
            CampaignOutcome::Cancelled => self.terminate().await,
            CampaignOutcome::SessionLost => {
                warn!(candidate = %self.identity, lease = %lease, "session lost while campaigning");
                State::Reconnect
            }
            CampaignOutcome::Finished(Ok(())) => {
                info!(candidate = %self.identity, lease = %lease, "elected leader");
                self.publisher.set(true).await;
                State::Observe
            }
            CampaignOutcome::Finished(Err(e)) => {
                warn!(candidate = %self.identity, error = %e, "campaign failed");
                State::Reconnect
            }
        }
    }

    // ── Observe ─────────────────────────────────────────────────────────────

    async fn observe(&mut self) -> State {
        let cancel = self.cancel.clone();
        let Some(active) = self.active.as_mut() else {
            return State::Reconnect;
        };
        let session_done = active.done();

        let mut values = match Self::until_cancelled(&cancel, active.election.observe()).await {
            None => return self.terminate().await,
            Some(Ok(values)) => values,
            Some(Err(e)) => {
                warn!(candidate = %self.identity, error = %e, "failed to observe election");
                return State::Reconnect;
            }
        };

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => ObserveEvent::Cancelled,
                _ = session_done.cancelled() => ObserveEvent::SessionLost,
                value = values.next() => ObserveEvent::Value(value),
            };

            match event {
                ObserveEvent::Cancelled => return self.terminate().await,
                ObserveEvent::SessionLost => {
                    warn!(candidate = %self.identity, "session lost while observing");
                    return State::Reconnect;
                }
                ObserveEvent::Value(Some(leader)) => {
                    debug!(candidate = %self.identity, leader = %leader, "observed leader");
                    let leading = self.identity.matches(&leader);
                    self.publisher.set(leading).await;
                }
                ObserveEvent::Value(None) => {
                    warn!(candidate = %self.identity, "leader observation ended");
                    return State::Reconnect;
                }
            }
        }
    }

    // ── Reconnect ───────────────────────────────────────────────────────────

    async fn reconnect(&mut self) -> State {
        self.metrics.record_reconnect();
        self.publisher.set(false).await;
        if let Some(previous) = self.active.take() {
            previous.close().await;
        }

        let backoff = self.config.reconnect_backoff();
        let mut attempt: u32 = 0;
        loop {
            // Consecutive session requests are at least one backoff apart,
            // including the one that opened the session we just lost.
            let wait = backoff.saturating_sub(self.last_attempt.elapsed());
            if wait > Duration::ZERO
                && Self::until_cancelled(&self.cancel, tokio::time::sleep(wait))
                    .await
                    .is_none()
            {
                return self.terminate().await;
            }

            attempt = attempt.saturating_add(1);
            self.last_attempt = Instant::now();
            match self.sessions.new_session(&self.cancel, None).await {
                Ok(active) => {
                    info!(candidate = %self.identity, lease = %active.lease_id(), attempt, "session re-established");
                    self.active = Some(active);
                    return State::DiscoverLeader;
                }
                Err(ElectionError::Cancelled) => return self.terminate().await,
                Err(e) => {
                    self.metrics.record_session_failure();
                    warn!(
                        candidate = %self.identity,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "failed to create session, retrying"
                    );
                }
            }
        }
    }

    // ── Terminated ──────────────────────────────────────────────────────────

    /// Step down and release the session. Resignation is attempted only when
    /// leading, and never waits longer than the session TTL.
    async fn terminate(&mut self) -> State {
        let was_leader = self.publisher.is_leader();
        self.publisher.set(false).await;

        if let Some(mut active) = self.active.take() {
            if was_leader {
                let ttl = self.config.ttl();
                match tokio::time::timeout(ttl, active.election.resign()).await {
                    Ok(Ok(())) => info!(candidate = %self.identity, "resigned leadership"),
                    Ok(Err(e)) => warn!(candidate = %self.identity, error = %e, "resignation failed"),
                    Err(_) => warn!(candidate = %self.identity, ttl_ms = ttl.as_millis() as u64, "resignation timed out"),
                }
            }
            active.close().await;
        }
        State::Terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryCoordinator;
    use crate::signal::{LeadershipSignal, leadership_channel};
    use gwsync_kernel::CoordinationClient;
    use std::sync::Arc;
    use std::time::Duration;

    const ELECTION: &str = "coordinator";

    async fn coordinator(
        store: &MemoryCoordinator,
        id: &str,
        config: ElectionConfig,
    ) -> (ElectionCoordinator, LeadershipSignal, CancellationToken) {
        let cancel = CancellationToken::new();
        let sessions = SessionManager::new(Arc::new(store.clone()), ELECTION, config.ttl());
        let active = sessions.new_session(&cancel, None).await.unwrap();
        let metrics = ElectionMetrics::new(ELECTION, id).unwrap();
        let (publisher, signal, _flag) = leadership_channel(8, cancel.clone());
        let coordinator = ElectionCoordinator::new(
            CandidateIdentity::new(id),
            config,
            sessions,
            active,
            publisher.with_metrics(metrics.clone()),
            metrics,
            cancel.clone(),
        );
        (coordinator, signal, cancel)
    }

    fn config() -> ElectionConfig {
        ElectionConfig::new(ELECTION).with_reconnect_backoff(Duration::from_millis(100))
    }

    async fn hold(store: &MemoryCoordinator, who: &str) {
        let session = store.create_session(Duration::from_secs(2), None).await.unwrap();
        store.new_election(session, ELECTION).campaign(who).await.unwrap();
    }

    #[tokio::test]
    async fn empty_election_goes_to_campaign() {
        let store = MemoryCoordinator::new();
        let (mut c, mut signal, _cancel) = coordinator(&store, "pod-a", config()).await;

        assert_eq!(c.step(State::DiscoverLeader).await, State::Campaign);
        assert_eq!(signal.try_recv(), None);
    }

    #[tokio::test]
    async fn stale_self_record_is_resigned_before_campaigning() {
        let store = MemoryCoordinator::new();
        hold(&store, "pod-a").await;
        let (mut c, _signal, _cancel) = coordinator(&store, "pod-a", config()).await;

        assert_eq!(c.step(State::DiscoverLeader).await, State::Campaign);
        assert_eq!(store.resign_count(), 1);
        assert!(store.current_leader(ELECTION).is_none());
    }

    #[tokio::test]
    async fn self_record_is_resumed_when_enabled() {
        let store = MemoryCoordinator::new();
        hold(&store, "pod-a").await;
        let held = store.current_leader(ELECTION).unwrap().lease;
        let (mut c, _signal, _cancel) =
            coordinator(&store, "pod-a", config().with_resume_leader_on_restart(true)).await;

        assert_eq!(c.step(State::DiscoverLeader).await, State::Observe);
        assert_eq!(c.active.as_ref().map(ActiveSession::lease_id), Some(held));
        assert_eq!(store.campaign_count(), 1);
    }

    #[tokio::test]
    async fn winning_campaign_sets_leadership() {
        let store = MemoryCoordinator::new();
        let (mut c, mut signal, _cancel) = coordinator(&store, "pod-a", config()).await;

        assert_eq!(c.step(State::Campaign).await, State::Observe);
        assert_eq!(signal.try_recv(), Some(true));
        assert!(c.publisher.is_leader());
    }

    #[tokio::test]
    async fn lost_session_during_campaign_reconnects() {
        let store = MemoryCoordinator::new();
        let (mut c, _signal, _cancel) = coordinator(&store, "pod-a", config()).await;
        let lease = c.active.as_ref().map(ActiveSession::lease_id).unwrap();
        store.revoke_lease(lease);

        assert_eq!(c.step(State::Campaign).await, State::Reconnect);
    }

    #[tokio::test]
    async fn cancelled_campaign_terminates_without_resigning() {
        let store = MemoryCoordinator::new();
        hold(&store, "pod-z").await;
        let (mut c, _signal, cancel) = coordinator(&store, "pod-a", config()).await;
        cancel.cancel();

        assert_eq!(c.step(State::Campaign).await, State::Terminated);
        assert!(c.active.is_none());
        assert_eq!(store.resign_count(), 0);
    }

    #[tokio::test]
    async fn observing_another_leader_clears_leadership() {
        let store = MemoryCoordinator::new();
        let (mut c, mut signal, cancel) = coordinator(&store, "pod-a", config()).await;
        c.publisher.set(true).await;
        hold(&store, "pod-z").await;

        let observing = tokio::spawn(async move { c.step(State::Observe).await });
        assert_eq!(signal.recv().await, Some(true));
        assert_eq!(signal.recv().await, Some(false));

        cancel.cancel();
        assert_eq!(observing.await.unwrap(), State::Terminated);
        assert_eq!(store.resign_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_retries_until_a_session_is_created() {
        let store = MemoryCoordinator::new();
        let (mut c, _signal, _cancel) = coordinator(&store, "pod-a", config()).await;
        store.fail_next_sessions(3);

        let started = tokio::time::Instant::now();
        assert_eq!(c.step(State::Reconnect).await, State::DiscoverLeader);
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(store.sessions_created(), 2);
        assert_eq!(c.metrics.session_failures(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_is_paced_even_when_sessions_succeed() {
        let store = MemoryCoordinator::new();
        let (mut c, _signal, _cancel) = coordinator(&store, "pod-a", config()).await;

        let started = tokio::time::Instant::now();
        assert_eq!(c.step(State::Reconnect).await, State::DiscoverLeader);
        assert_eq!(c.step(State::Reconnect).await, State::DiscoverLeader);

        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(store.sessions_created(), 3);
        assert_eq!(c.metrics.reconnects(), 2);
        assert_eq!(c.metrics.session_failures(), 0);
    }

    #[tokio::test]
    async fn failed_leader_query_reconnects() {
        let store = MemoryCoordinator::new();
        let (mut c, mut signal, _cancel) = coordinator(&store, "pod-a", config()).await;
        store.fail_next_leader_queries(1);

        assert_eq!(c.step(State::DiscoverLeader).await, State::Reconnect);
        assert_eq!(signal.try_recv(), None);
        assert_eq!(store.campaign_count(), 0);
    }

    #[tokio::test]
    async fn failed_campaign_reconnects() {
        let store = MemoryCoordinator::new();
        let (mut c, mut signal, _cancel) = coordinator(&store, "pod-a", config()).await;
        store.fail_next_campaigns(1);

        assert_eq!(c.step(State::Campaign).await, State::Reconnect);
        assert_eq!(signal.try_recv(), None);
        assert!(store.current_leader(ELECTION).is_none());
    }

    #[tokio::test]
    async fn failed_stale_resignation_reconnects() {
        let store = MemoryCoordinator::new();
        hold(&store, "pod-a").await;
        let (mut c, _signal, _cancel) = coordinator(&store, "pod-a", config()).await;
        store.fail_next_resigns(1);

        assert_eq!(c.step(State::DiscoverLeader).await, State::Reconnect);
        assert_eq!(store.resign_count(), 1);
        assert_eq!(store.current_leader(ELECTION).unwrap().value, "pod-a");
    }

    #[tokio::test(start_paused = true)]
    async fn hung_stale_resignation_gives_up_after_ttl() {
        let store = MemoryCoordinator::new();
        hold(&store, "pod-a").await;
        let config = config().with_ttl_secs(2);
        let (mut c, _signal, _cancel) = coordinator(&store, "pod-a", config).await;
        store.hang_resigns(true);

        let started = tokio::time::Instant::now();
        assert_eq!(c.step(State::DiscoverLeader).await, State::Reconnect);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_stale_resignation_terminates() {
        let store = MemoryCoordinator::new();
        hold(&store, "pod-a").await;
        let config = config().with_ttl_secs(10);
        let (mut c, mut signal, cancel) = coordinator(&store, "pod-a", config).await;
        store.hang_resigns(true);

        let started = tokio::time::Instant::now();
        let stepping = tokio::spawn(async move { c.step(State::DiscoverLeader).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        assert_eq!(stepping.await.unwrap(), State::Terminated);
        assert!(started.elapsed() < Duration::from_secs(10));
        // never led, so only the stale record was asked to resign
        assert_eq!(store.resign_count(), 1);
        assert_eq!(signal.try_recv(), None);
    }

    #[tokio::test]
    async fn failed_observation_reconnects() {
        let store = MemoryCoordinator::new();
        let (mut c, _signal, _cancel) = coordinator(&store, "pod-a", config()).await;
        store.fail_next_observes(1);

        assert_eq!(c.step(State::Observe).await, State::Reconnect);
    }

    #[tokio::test]
    async fn run_closes_the_signal_on_exit() {
        let store = MemoryCoordinator::new();
        let (c, mut signal, cancel) = coordinator(&store, "pod-a", config()).await;
        cancel.cancel();

        c.run().await;
        assert_eq!(signal.recv().await, None);
    }
}
