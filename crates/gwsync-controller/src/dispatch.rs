//! Leadership dispatch loop.
//!
//! Consumes the election's leadership events. The first event of either
//! value starts the sync loop exactly once; from then on the sync loop gates
//! each pass on the leadership flag, so later events only need logging.

use std::sync::Arc;
use std::time::Duration;

use gwsync_runtime::{LeadershipFlag, LeadershipSignal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::latch::OneShotLatch;
use crate::sync::{GatewaySync, run_sync_loop};

pub struct Dispatcher {
    sync: Arc<dyn GatewaySync>,
    flag: LeadershipFlag,
    interval: Duration,
    started: OneShotLatch,
}

impl Dispatcher {
    pub fn new(sync: Arc<dyn GatewaySync>, flag: LeadershipFlag, interval: Duration) -> Self {
        Self {
            sync,
            flag,
            interval,
            started: OneShotLatch::new(),
        }
    }

    /// Process events until the signal closes, then stop the sync loop.
    ///
    /// Returns the number of leadership transitions seen.
    pub async fn run(self, mut signal: LeadershipSignal, cancel: CancellationToken) -> usize {
        let stop = cancel.child_token();
        let mut worker = None;
        let mut transitions = 0;

        while let Some(leader) = signal.recv().await {
            transitions += 1;
            if leader {
                info!("acquired leadership, gateway writes enabled");
            } else {
                info!("not leader, gateway writes disabled");
            }

            if self.started.fire() {
                let sync = self.sync.clone();
                let flag = self.flag.clone();
                let interval = self.interval;
                let stop = stop.clone();
                worker = Some(tokio::spawn(async move {
                    run_sync_loop(sync.as_ref(), flag, interval, stop).await;
                }));
                info!(interval_ms = interval.as_millis() as u64, "sync loop started");
            }
        }

        stop.cancel();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "sync loop task failed");
            }
        }
        info!(transitions, "leadership dispatch stopped");
        transitions
    }
}
