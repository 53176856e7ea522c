//! Gateway configuration sync, gated on leadership.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gwsync_runtime::LeadershipFlag;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One reconciliation pass against the gateway's config store.
///
/// Only the leader calls this; implementations may assume no other replica
/// is writing concurrently.
#[async_trait]
pub trait GatewaySync: Send + Sync {
    async fn sync(&self) -> eyre::Result<()>;
}

/// [`GatewaySync`] that only records that a pass happened.
#[derive(Debug, Default)]
pub struct LoggingSync {
    passes: AtomicU64,
}

impl LoggingSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl GatewaySync for LoggingSync {
    async fn sync(&self) -> eyre::Result<()> {
        let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        info!(pass, "gateway configuration synced");
        Ok(())
    }
}

/// Run `sync` every `interval` while `leader` holds, until `cancel` fires.
///
/// The flag is re-read each cycle, so a replica that loses leadership stops
/// writing on its next tick. Failed passes are logged and retried next tick.
pub async fn run_sync_loop<S>(
    sync: &S,
    leader: LeadershipFlag,
    interval: Duration,
    cancel: CancellationToken,
) where
    S: GatewaySync + ?Sized,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !leader.is_leader() {
            debug!("not leader, skipping sync");
            continue;
        }
        if let Err(e) = sync.sync().await {
            warn!(error = %e, "gateway sync failed");
        }
    }
    debug!("sync loop stopped");
}
