//! Coordination-service traits.
//!
//! Implementations live in `gwsync-runtime::backend` (an in-process store and
//! an etcd client). The election engine only ever talks to these traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use super::error::CoordinationResult;
use super::types::{LeaderRecord, LeaseId};

/// Stream of leader identities published for an election.
///
/// The first item is the leader at subscription time (if any). The stream may
/// end for backend-specific reasons; lease expiry is *not* guaranteed to end
/// it, so consumers watch [`Session::done`] alongside it.
pub type LeaderStream = BoxStream<'static, String>;

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// A client-held membership bound to a TTL-expiring lease.
#[async_trait]
pub trait Session: Send + Sync {
    /// Lease this session keeps alive.
    fn lease_id(&self) -> LeaseId;

    /// Token cancelled once the session is no longer valid: lease expired,
    /// revoked, keep-alive failed or the session was closed.
    fn done(&self) -> CancellationToken;

    /// Release the session and revoke its lease.
    ///
    /// Best-effort: the call returns even when the revoke cannot be
    /// confirmed. Closing twice is a no-op.
    async fn close(&self);
}

// ─────────────────────────────────────────────────────────────────────────────
// Election
// ─────────────────────────────────────────────────────────────────────────────

/// Handle onto one election record, bound to the session it was created with.
#[async_trait]
pub trait Election: Send {
    /// Election name (the key prefix of the record).
    fn name(&self) -> &str;

    /// Current leader record, or [`CoordinationError::NoLeader`].
    ///
    /// [`CoordinationError::NoLeader`]: super::CoordinationError::NoLeader
    async fn leader(&mut self) -> CoordinationResult<LeaderRecord>;

    /// Block until `value` is the elected leader.
    ///
    /// Dropping the future abandons the campaign. Backends are not required to
    /// fail this call when the session lease expires underneath it.
    async fn campaign(&mut self, value: &str) -> CoordinationResult<()>;

    /// Subscribe to leader-value changes.
    async fn observe(&mut self) -> CoordinationResult<LeaderStream>;

    /// Give up leadership held by this handle.
    async fn resign(&mut self) -> CoordinationResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// CoordinationClient
// ─────────────────────────────────────────────────────────────────────────────

/// Entry point onto a coordination service.
#[async_trait]
pub trait CoordinationClient: Send + Sync + 'static {
    /// Create a session with the given TTL.
    ///
    /// `lease = None` grants a fresh lease; `Some(id)` re-attaches to an
    /// existing one.
    async fn create_session(
        &self,
        ttl: Duration,
        lease: Option<LeaseId>,
    ) -> CoordinationResult<Arc<dyn Session>>;

    /// Election handle for `name` that campaigns with `session`'s lease.
    fn new_election(&self, session: Arc<dyn Session>, name: &str) -> Box<dyn Election>;

    /// Election handle rebound to an existing campaign entry, without
    /// campaigning again.
    fn resume_election(
        &self,
        session: Arc<dyn Session>,
        name: &str,
        record: &LeaderRecord,
    ) -> Box<dyn Election>;
}
