//! In-process coordination service.
//!
//! A strongly consistent, single-process stand-in for an etcd-style service:
//! monotonically increasing revisions, leases that die only when closed or
//! revoked, and elections whose leader is the candidate entry with the lowest
//! create revision. Shared by cloning; every clone sees the same store.
//!
//! Fault-injection hooks ([`revoke_lease`](MemoryCoordinator::revoke_lease),
//! the `fail_next_*` family, [`hang_resigns`](MemoryCoordinator::hang_resigns),
//! [`close_observers`](MemoryCoordinator::close_observers)) let tests drive
//! the election engine through its failure paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use gwsync_kernel::{
    CoordinationClient, CoordinationError, CoordinationResult, Election, LeaderRecord,
    LeaderStream, LeaseId, Session,
};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

struct Candidate {
    key: String,
    value: String,
    lease: LeaseId,
}

/// Candidate entries of one election, keyed by create revision.
struct ElectionRecords {
    candidates: BTreeMap<i64, Candidate>,
    /// Leader feed for campaigners.
    leader: watch::Sender<Option<LeaderRecord>>,
    /// Leader feed for observers; replaceable without disturbing campaigners.
    observed: watch::Sender<Option<LeaderRecord>>,
}

impl ElectionRecords {
    fn new() -> Self {
        Self {
            candidates: BTreeMap::new(),
            leader: watch::channel(None).0,
            observed: watch::channel(None).0,
        }
    }

    fn current(&self) -> Option<LeaderRecord> {
        self.candidates.iter().next().map(|(rev, c)| {
            LeaderRecord::new(c.value.clone(), c.key.clone(), *rev, c.lease)
        })
    }

    fn publish(&self) {
        let current = self.current();
        for feed in [&self.leader, &self.observed] {
            feed.send_if_modified(|value| {
                if *value == current {
                    false
                } else {
                    *value = current.clone();
                    true
                }
            });
        }
    }
}

/// Pending injected failures. Counters are consumed one per call.
#[derive(Default)]
struct Faults {
    sessions: usize,
    leader_queries: usize,
    campaigns: usize,
    observes: usize,
    resigns: usize,
    hang_resigns: bool,
    empty_observations: bool,
}

fn take(counter: &mut usize) -> bool {
    if *counter == 0 {
        return false;
    }
    *counter -= 1;
    true
}

fn injected(op: &str) -> CoordinationError {
    CoordinationError::Unavailable(format!("injected {op} failure"))
}

#[derive(Default)]
struct Store {
    revision: i64,
    next_lease: i64,
    leases: HashMap<LeaseId, CancellationToken>,
    elections: HashMap<String, ElectionRecords>,
    faults: Faults,
}

impl Store {
    fn election(&mut self, name: &str) -> &mut ElectionRecords {
        self.elections
            .entry(name.to_string())
            .or_insert_with(ElectionRecords::new)
    }

    fn grant(&mut self) -> (LeaseId, CancellationToken) {
        self.next_lease += 1;
        let lease = LeaseId::new(self.next_lease);
        let token = CancellationToken::new();
        self.leases.insert(lease, token.clone());
        (lease, token)
    }

    /// Drop a lease and every candidate entry attached to it.
    fn revoke(&mut self, lease: LeaseId) -> bool {
        let Some(token) = self.leases.remove(&lease) else {
            return false;
        };
        token.cancel();
        for records in self.elections.values_mut() {
            let before = records.candidates.len();
            records.candidates.retain(|_, c| c.lease != lease);
            if records.candidates.len() != before {
                records.publish();
            }
        }
        true
    }
}

#[derive(Default)]
struct Inner {
    store: Mutex<Store>,
    sessions: AtomicUsize,
    campaigns: AtomicUsize,
    resigns: AtomicUsize,
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryCoordinator
// ─────────────────────────────────────────────────────────────────────────────

/// In-process [`CoordinationClient`].
#[derive(Clone, Default)]
pub struct MemoryCoordinator {
    inner: Arc<Inner>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current leader of `election`, if any.
    pub fn current_leader(&self, election: &str) -> Option<LeaderRecord> {
        self.inner
            .store
            .lock()
            .elections
            .get(election)
            .and_then(ElectionRecords::current)
    }

    /// Leases currently campaigning in `election`, oldest entry first.
    pub fn candidate_leases(&self, election: &str) -> Vec<LeaseId> {
        self.inner
            .store
            .lock()
            .elections
            .get(election)
            .map(|r| r.candidates.values().map(|c| c.lease).collect())
            .unwrap_or_default()
    }

    /// Expire `lease` as if its TTL ran out. Returns `false` if it was unknown.
    pub fn revoke_lease(&self, lease: LeaseId) -> bool {
        let revoked = self.inner.store.lock().revoke(lease);
        if revoked {
            debug!(lease = %lease, "lease revoked");
        }
        revoked
    }

    /// Make the next `count` session creations fail as unavailable.
    pub fn fail_next_sessions(&self, count: usize) {
        self.inner.store.lock().faults.sessions = count;
    }

    /// Make the next `count` leader queries fail as unavailable.
    pub fn fail_next_leader_queries(&self, count: usize) {
        self.inner.store.lock().faults.leader_queries = count;
    }

    /// Make the next `count` campaigns fail before entering the election.
    pub fn fail_next_campaigns(&self, count: usize) {
        self.inner.store.lock().faults.campaigns = count;
    }

    /// Make the next `count` observe calls fail.
    pub fn fail_next_observes(&self, count: usize) {
        self.inner.store.lock().faults.observes = count;
    }

    /// Make the next `count` resignations fail without touching the record.
    pub fn fail_next_resigns(&self, count: usize) {
        self.inner.store.lock().faults.resigns = count;
    }

    /// While set, resignations never complete.
    pub fn hang_resigns(&self, hang: bool) {
        self.inner.store.lock().faults.hang_resigns = hang;
    }

    /// While set, observe streams end without yielding anything.
    pub fn end_observations_immediately(&self, end: bool) {
        self.inner.store.lock().faults.empty_observations = end;
    }

    /// End every open leader-observation stream without touching leases.
    pub fn close_observers(&self) {
        let mut store = self.inner.store.lock();
        for records in store.elections.values_mut() {
            let current = records.observed.borrow().clone();
            records.observed = watch::channel(current).0;
        }
    }

    /// Sessions successfully created so far.
    pub fn sessions_created(&self) -> usize {
        self.inner.sessions.load(Ordering::SeqCst)
    }

    /// Campaign calls issued so far.
    pub fn campaign_count(&self) -> usize {
        self.inner.campaigns.load(Ordering::SeqCst)
    }

    /// Resign calls issued so far.
    pub fn resign_count(&self) -> usize {
        self.inner.resigns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CoordinationClient for MemoryCoordinator {
    async fn create_session(
        &self,
        _ttl: Duration,
        lease: Option<LeaseId>,
    ) -> CoordinationResult<Arc<dyn Session>> {
        let (lease, done) = {
            let mut store = self.inner.store.lock();
            if take(&mut store.faults.sessions) {
                return Err(injected("session"));
            }
            match lease {
                Some(id) => {
                    let token = store
                        .leases
                        .get(&id)
                        .cloned()
                        .ok_or(CoordinationError::LeaseNotFound(id))?;
                    (id, token)
                }
                None => store.grant(),
            }
        };
        self.inner.sessions.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(MemorySession {
            store: self.clone(),
            lease,
            done,
        }))
    }

    fn new_election(&self, session: Arc<dyn Session>, name: &str) -> Box<dyn Election> {
        Box::new(MemoryElection {
            store: self.clone(),
            name: name.to_string(),
            lease: session.lease_id(),
            entry: None,
        })
    }

    fn resume_election(
        &self,
        session: Arc<dyn Session>,
        name: &str,
        record: &LeaderRecord,
    ) -> Box<dyn Election> {
        Box::new(MemoryElection {
            store: self.clone(),
            name: name.to_string(),
            lease: session.lease_id(),
            entry: Some((record.key.clone(), record.create_revision)),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session / Election
// ─────────────────────────────────────────────────────────────────────────────

/// Memory leases never expire on their own, so the TTL is not kept.
struct MemorySession {
    store: MemoryCoordinator,
    lease: LeaseId,
    done: CancellationToken,
}

#[async_trait]
impl Session for MemorySession {
    fn lease_id(&self) -> LeaseId {
        self.lease
    }

    fn done(&self) -> CancellationToken {
        self.done.clone()
    }

    async fn close(&self) {
        self.store.inner.store.lock().revoke(self.lease);
    }
}

struct MemoryElection {
    store: MemoryCoordinator,
    name: String,
    lease: LeaseId,
    /// Key and create revision of our campaign entry.
    entry: Option<(String, i64)>,
}

#[async_trait]
impl Election for MemoryElection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn leader(&mut self) -> CoordinationResult<LeaderRecord> {
        if take(&mut self.store.inner.store.lock().faults.leader_queries) {
            return Err(injected("leader query"));
        }
        self.store
            .current_leader(&self.name)
            .ok_or(CoordinationError::NoLeader)
    }

    async fn campaign(&mut self, value: &str) -> CoordinationResult<()> {
        let key = format!("{}/{}", self.name, self.lease);
        let (revision, mut leader_rx) = {
            let mut store = self.store.inner.store.lock();
            self.store.inner.campaigns.fetch_add(1, Ordering::SeqCst);
            if take(&mut store.faults.campaigns) {
                return Err(CoordinationError::Backend("injected campaign failure".to_string()));
            }
            if !store.leases.contains_key(&self.lease) {
                return Err(CoordinationError::SessionExpired(self.lease));
            }
            store.revision += 1;
            let next_revision = store.revision;

            let records = store.election(&self.name);
            let existing = records
                .candidates
                .iter_mut()
                .find(|(_, c)| c.key == key)
                .map(|(rev, c)| {
                    c.value = value.to_string();
                    *rev
                });
            let revision = match existing {
                Some(rev) => rev,
                None => {
                    records.candidates.insert(
                        next_revision,
                        Candidate {
                            key: key.clone(),
                            value: value.to_string(),
                            lease: self.lease,
                        },
                    );
                    next_revision
                }
            };
            records.publish();
            (revision, records.leader.subscribe())
        };
        self.entry = Some((key.clone(), revision));

        // Like etcd's client, a campaign whose lease disappears keeps waiting
        // rather than failing.
        loop {
            let elected = leader_rx
                .borrow_and_update()
                .as_ref()
                .is_some_and(|leader| leader.key == key && leader.create_revision == revision);
            if elected {
                return Ok(());
            }
            if leader_rx.changed().await.is_err() {
                return Err(CoordinationError::Backend("election store dropped".to_string()));
            }
        }
    }

    async fn observe(&mut self) -> CoordinationResult<LeaderStream> {
        let rx = {
            let mut store = self.store.inner.store.lock();
            if take(&mut store.faults.observes) {
                return Err(injected("observe"));
            }
            if store.faults.empty_observations {
                return Ok(futures::stream::empty().boxed());
            }
            store.election(&self.name).observed.subscribe()
        };

        Ok(WatchStream::new(rx)
            .filter_map(|leader| futures::future::ready(leader.map(|l| l.value)))
            .boxed())
    }

    async fn resign(&mut self) -> CoordinationResult<()> {
        self.store.inner.resigns.fetch_add(1, Ordering::SeqCst);
        let hang = {
            let mut store = self.store.inner.store.lock();
            if take(&mut store.faults.resigns) {
                return Err(injected("resign"));
            }
            store.faults.hang_resigns
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let Some((key, revision)) = self.entry.take() else {
            return Ok(());
        };

        let mut store = self.store.inner.store.lock();
        if let Some(records) = store.elections.get_mut(&self.name) {
            let ours = records
                .candidates
                .get(&revision)
                .is_some_and(|c| c.key == key);
            if ours {
                records.candidates.remove(&revision);
                records.publish();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ELECTION: &str = "unit";
    const TTL: Duration = Duration::from_secs(2);

    async fn candidate(store: &MemoryCoordinator) -> (Arc<dyn Session>, Box<dyn Election>) {
        let session = store.create_session(TTL, None).await.unwrap();
        let election = store.new_election(session.clone(), ELECTION);
        (session, election)
    }

    #[tokio::test]
    async fn empty_election_reports_no_leader() {
        let store = MemoryCoordinator::new();
        let (_session, mut election) = candidate(&store).await;

        assert_eq!(election.leader().await, Err(CoordinationError::NoLeader));
    }

    #[tokio::test]
    async fn first_campaigner_leads() {
        let store = MemoryCoordinator::new();
        let (session, mut election) = candidate(&store).await;

        election.campaign("pod-a").await.unwrap();

        let leader = election.leader().await.unwrap();
        assert_eq!(leader.value, "pod-a");
        assert_eq!(leader.lease, session.lease_id());
        assert_eq!(store.campaign_count(), 1);
    }

    #[tokio::test]
    async fn second_campaigner_waits_for_resignation() {
        let store = MemoryCoordinator::new();
        let (_a, mut first) = candidate(&store).await;
        let (_b, mut second) = candidate(&store).await;

        first.campaign("pod-a").await.unwrap();
        let waiting = tokio::spawn(async move {
            second.campaign("pod-b").await.unwrap();
            second
        });
        tokio::task::yield_now().await;
        assert!(!waiting.is_finished());

        first.resign().await.unwrap();
        let mut second = waiting.await.unwrap();
        assert_eq!(second.leader().await.unwrap().value, "pod-b");
    }

    #[tokio::test]
    async fn revoking_a_lease_fires_done_and_drops_its_entries() {
        let store = MemoryCoordinator::new();
        let (session, mut election) = candidate(&store).await;
        election.campaign("pod-a").await.unwrap();

        let done = session.done();
        assert!(store.revoke_lease(session.lease_id()));

        assert!(done.is_cancelled());
        assert_eq!(election.leader().await, Err(CoordinationError::NoLeader));
        assert!(!store.revoke_lease(session.lease_id()));
    }

    #[tokio::test]
    async fn resumed_handle_resigns_the_original_entry() {
        let store = MemoryCoordinator::new();
        let (_a, mut original) = candidate(&store).await;
        original.campaign("pod-a").await.unwrap();
        let record = store.current_leader(ELECTION).unwrap();

        let (other, _) = candidate(&store).await;
        let mut resumed = store.resume_election(other, ELECTION, &record);
        resumed.resign().await.unwrap();

        assert!(store.current_leader(ELECTION).is_none());
        assert_eq!(store.resign_count(), 1);
    }

    #[tokio::test]
    async fn observers_see_current_leader_then_changes() {
        let store = MemoryCoordinator::new();
        let (_a, mut first) = candidate(&store).await;
        let (_b, mut second) = candidate(&store).await;
        first.campaign("pod-a").await.unwrap();

        let mut values = first.observe().await.unwrap();
        assert_eq!(values.next().await.as_deref(), Some("pod-a"));

        let waiting = tokio::spawn(async move { second.campaign("pod-b").await });
        tokio::task::yield_now().await;
        first.resign().await.unwrap();
        waiting.await.unwrap().unwrap();

        assert_eq!(values.next().await.as_deref(), Some("pod-b"));
    }

    #[tokio::test]
    async fn close_observers_ends_streams_but_keeps_leases() {
        let store = MemoryCoordinator::new();
        let (session, mut election) = candidate(&store).await;
        election.campaign("pod-a").await.unwrap();
        let mut values = election.observe().await.unwrap();
        assert_eq!(values.next().await.as_deref(), Some("pod-a"));

        store.close_observers();

        assert_eq!(values.next().await, None);
        assert!(!session.done().is_cancelled());
        assert_eq!(store.current_leader(ELECTION).unwrap().value, "pod-a");
    }

    #[tokio::test]
    async fn resume_requires_a_live_lease() {
        let store = MemoryCoordinator::new();
        let (session, _) = candidate(&store).await;
        let lease = session.lease_id();

        let resumed = store.create_session(TTL, Some(lease)).await.unwrap();
        assert_eq!(resumed.lease_id(), lease);

        session.close().await;
        assert!(resumed.done().is_cancelled());
        assert_eq!(
            store.create_session(TTL, Some(lease)).await.err(),
            Some(CoordinationError::LeaseNotFound(lease))
        );
    }
}
