//! Session creation and replacement.

use std::sync::Arc;
use std::time::Duration;

use gwsync_kernel::{CoordinationClient, Election, LeaderRecord, LeaseId, Session};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ElectionError, ElectionResult};

/// A live session together with the election handle bound to it.
///
/// Replaced wholesale on reconnect, never mutated in place.
pub struct ActiveSession {
    pub session: Arc<dyn Session>,
    pub election: Box<dyn Election>,
}

impl ActiveSession {
    pub fn lease_id(&self) -> LeaseId {
        self.session.lease_id()
    }

    /// Token cancelled when the underlying lease is lost.
    pub fn done(&self) -> CancellationToken {
        self.session.done()
    }

    /// Close the session, revoking its lease.
    pub async fn close(self) {
        debug!(lease = %self.session.lease_id(), "closing session");
        self.session.close().await;
    }
}

/// Creates sessions bound to the configured TTL and the election handles
/// that go with them.
///
/// Holds no mutable state, so it is safe to call in a retry loop: every call
/// is independent. Closing sessions the caller discards is the caller's job.
#[derive(Clone)]
pub struct SessionManager {
    client: Arc<dyn CoordinationClient>,
    election_name: String,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        election_name: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            client,
            election_name: election_name.into(),
            ttl,
        }
    }

    /// Create a session and a fresh election handle for it.
    ///
    /// `existing_lease` re-attaches to a lease instead of granting a new one.
    /// Returns [`ElectionError::Cancelled`] if `cancel` fires first.
    pub async fn new_session(
        &self,
        cancel: &CancellationToken,
        existing_lease: Option<LeaseId>,
    ) -> ElectionResult<ActiveSession> {
        let created = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ElectionError::Cancelled),
            res = self.client.create_session(self.ttl, existing_lease) => res,
        };
        let session = created.map_err(ElectionError::SessionCreation)?;
        let election = self.client.new_election(session.clone(), &self.election_name);

        debug!(
            lease = %session.lease_id(),
            resumed = existing_lease.is_some(),
            election = %self.election_name,
            "session created"
        );

        Ok(ActiveSession { session, election })
    }

    /// Election handle bound to an existing campaign entry.
    pub fn resume_election(
        &self,
        session: Arc<dyn Session>,
        record: &LeaderRecord,
    ) -> Box<dyn Election> {
        self.client
            .resume_election(session, &self.election_name, record)
    }
}
