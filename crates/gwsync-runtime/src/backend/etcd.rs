//! etcd v3 coordination backend.
//!
//! Sessions are leases kept alive by a background task at a third of the TTL;
//! the session's done-token fires as soon as a keep-alive fails, the lease
//! reports a non-positive TTL, or the session is closed. Elections use the
//! etcd v3 election service (`Campaign`/`Leader`/`Observe`/`Resign`).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, LeaderKey, ResignOptions};
use futures::StreamExt;
use gwsync_kernel::{
    CoordinationClient, CoordinationError, CoordinationResult, Election, LeaderRecord,
    LeaderStream, LeaseId, Session,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Message etcd returns from `Leader` on an empty election.
const NO_LEADER_MESSAGE: &str = "election: no leader";

const MIN_KEEPALIVE_INTERVAL: Duration = Duration::from_millis(500);

fn map_err(err: etcd_client::Error) -> CoordinationError {
    match err {
        etcd_client::Error::GRpcStatus(status) => {
            if status.message().contains(NO_LEADER_MESSAGE) {
                return CoordinationError::NoLeader;
            }
            match status.code() {
                tonic::Code::Unavailable | tonic::Code::DeadlineExceeded => {
                    CoordinationError::Unavailable(status.message().to_string())
                }
                _ => CoordinationError::Backend(status.to_string()),
            }
        }
        etcd_client::Error::TransportError(e) => CoordinationError::Unavailable(e.to_string()),
        other => {
            let message = other.to_string();
            if message.contains(NO_LEADER_MESSAGE) {
                CoordinationError::NoLeader
            } else {
                CoordinationError::Backend(message)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EtcdCoordinator
// ─────────────────────────────────────────────────────────────────────────────

/// [`CoordinationClient`] backed by an etcd cluster.
#[derive(Clone)]
pub struct EtcdCoordinator {
    client: Client,
}

impl EtcdCoordinator {
    /// Connect to the given endpoints.
    pub async fn connect(
        endpoints: &[String],
        connect_timeout: Duration,
    ) -> CoordinationResult<Self> {
        let options = ConnectOptions::new().with_connect_timeout(connect_timeout);
        let client = Client::connect(endpoints, Some(options))
            .await
            .map_err(map_err)?;
        info!(endpoints = ?endpoints, "connected to etcd");
        Ok(Self { client })
    }
}

#[async_trait]
impl CoordinationClient for EtcdCoordinator {
    async fn create_session(
        &self,
        ttl: Duration,
        lease: Option<LeaseId>,
    ) -> CoordinationResult<Arc<dyn Session>> {
        let mut client = self.client.clone();
        let ttl_secs = ttl.as_secs().max(1) as i64;

        let lease = match lease {
            Some(id) => {
                let remaining = client
                    .lease_time_to_live(id.get(), None)
                    .await
                    .map_err(map_err)?;
                if remaining.ttl() <= 0 {
                    return Err(CoordinationError::LeaseNotFound(id));
                }
                id
            }
            None => LeaseId::new(client.lease_grant(ttl_secs, None).await.map_err(map_err)?.id()),
        };

        let (keeper, responses) = client.lease_keep_alive(lease.get()).await.map_err(map_err)?;
        let done = CancellationToken::new();
        let interval = (ttl / 3).max(MIN_KEEPALIVE_INTERVAL);
        tokio::spawn(keep_alive(lease, interval, keeper, responses, done.clone()));

        Ok(Arc::new(EtcdSession {
            client,
            lease,
            ttl,
            done,
            closed: AtomicBool::new(false),
        }))
    }

    fn new_election(&self, session: Arc<dyn Session>, name: &str) -> Box<dyn Election> {
        Box::new(EtcdElection {
            client: self.client.clone(),
            name: name.to_string(),
            lease: session.lease_id(),
            leader: None,
        })
    }

    fn resume_election(
        &self,
        session: Arc<dyn Session>,
        name: &str,
        record: &LeaderRecord,
    ) -> Box<dyn Election> {
        let leader = LeaderKey::new()
            .with_name(name)
            .with_key(record.key.as_str())
            .with_rev(record.create_revision)
            .with_lease(record.lease.get());
        Box::new(EtcdElection {
            client: self.client.clone(),
            name: name.to_string(),
            lease: session.lease_id(),
            leader: Some(leader),
        })
    }
}

/// Refresh `lease` every `interval` until it fails or `done` is cancelled,
/// then cancel `done`.
async fn keep_alive(
    lease: LeaseId,
    interval: Duration,
    mut keeper: etcd_client::LeaseKeeper,
    mut responses: etcd_client::LeaseKeepAliveStream,
    done: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = keeper.keep_alive().await {
                    warn!(lease = %lease, error = %e, "lease keep-alive failed");
                    break;
                }
                match responses.message().await {
                    Ok(Some(resp)) if resp.ttl() > 0 => {}
                    Ok(Some(_)) => {
                        warn!(lease = %lease, "lease expired");
                        break;
                    }
                    Ok(None) => {
                        warn!(lease = %lease, "lease keep-alive stream closed");
                        break;
                    }
                    Err(e) => {
                        warn!(lease = %lease, error = %e, "lease keep-alive stream failed");
                        break;
                    }
                }
            }
        }
    }
    done.cancel();
    debug!(lease = %lease, "lease keep-alive stopped");
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

struct EtcdSession {
    client: Client,
    lease: LeaseId,
    ttl: Duration,
    done: CancellationToken,
    closed: AtomicBool,
}

#[async_trait]
impl Session for EtcdSession {
    fn lease_id(&self) -> LeaseId {
        self.lease
    }

    fn done(&self) -> CancellationToken {
        self.done.clone()
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.done.cancel();

        let mut client = self.client.clone();
        match tokio::time::timeout(self.ttl, client.lease_revoke(self.lease.get())).await {
            Ok(Ok(_)) => debug!(lease = %self.lease, "lease revoked"),
            Ok(Err(e)) => warn!(lease = %self.lease, error = %e, "lease revoke failed"),
            Err(_) => warn!(lease = %self.lease, "lease revoke timed out"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Election
// ─────────────────────────────────────────────────────────────────────────────

struct EtcdElection {
    client: Client,
    name: String,
    lease: LeaseId,
    /// Campaign entry we hold, set by `campaign` or by resuming.
    leader: Option<LeaderKey>,
}

fn leader_record(resp: &etcd_client::LeaderResponse) -> CoordinationResult<LeaderRecord> {
    let kv = resp.kv().ok_or(CoordinationError::NoLeader)?;
    let value = kv.value_str().map_err(map_err)?;
    Ok(LeaderRecord::new(
        value,
        String::from_utf8_lossy(kv.key()),
        kv.create_revision(),
        LeaseId::new(kv.lease()),
    ))
}

#[async_trait]
impl Election for EtcdElection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn leader(&mut self) -> CoordinationResult<LeaderRecord> {
        let resp = self
            .client
            .leader(self.name.as_str())
            .await
            .map_err(map_err)?;
        leader_record(&resp)
    }

    async fn campaign(&mut self, value: &str) -> CoordinationResult<()> {
        let resp = self
            .client
            .campaign(self.name.as_str(), value, self.lease.get())
            .await
            .map_err(map_err)?;
        self.leader = resp.leader().cloned();
        Ok(())
    }

    async fn observe(&mut self) -> CoordinationResult<LeaderStream> {
        let stream = self
            .client
            .observe(self.name.as_str())
            .await
            .map_err(map_err)?;

        let values = futures::stream::unfold(stream, |mut stream| async move {
            loop {
                match stream.message().await {
                    Ok(Some(resp)) => {
                        if let Ok(record) = leader_record(&resp) {
                            return Some((record.value, stream));
                        }
                    }
                    Ok(None) => return None,
                    Err(e) => {
                        debug!(error = %e, "leader observation stream failed");
                        return None;
                    }
                }
            }
        });
        Ok(values.boxed())
    }

    async fn resign(&mut self) -> CoordinationResult<()> {
        let Some(leader) = self.leader.take() else {
            return Ok(());
        };
        self.client
            .resign(Some(ResignOptions::new().with_leader(leader)))
            .await
            .map_err(map_err)?;
        Ok(())
    }
}
