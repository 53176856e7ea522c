//! Leadership transition events.
//!
//! A bounded, ordered, single-writer queue of `bool` events plus a shared
//! flag holding the current leadership state. The election task is the only
//! writer and the only party that closes the queue; the host reads the queue
//! through [`LeadershipSignal`] and the flag through [`LeadershipFlag`].
//!
//! Two consecutive events never carry the same value.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::ElectionMetrics;

/// Build a leadership queue with room for `capacity` undelivered events.
pub(crate) fn leadership_channel(
    capacity: usize,
    cancel: CancellationToken,
) -> (LeadershipPublisher, LeadershipSignal, LeadershipFlag) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let flag = LeadershipFlag::default();
    let publisher = LeadershipPublisher {
        tx: Some(tx),
        flag: flag.clone(),
        announced: false,
        cancel,
        metrics: None,
    };
    (publisher, LeadershipSignal { rx }, flag)
}

// ─────────────────────────────────────────────────────────────────────────────
// LeadershipFlag
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only view of the current leadership state. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct LeadershipFlag(Arc<AtomicBool>);

impl LeadershipFlag {
    pub fn is_leader(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn store(&self, leader: bool) {
        self.0.store(leader, Ordering::Release);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LeadershipSignal
// ─────────────────────────────────────────────────────────────────────────────

/// Consumer side of the leadership queue.
///
/// Yields `true` when this candidate becomes leader and `false` when it stops
/// being one. Returns `None` once the election task has terminated.
///
/// The writer waits for room when the queue is full, but gives up once the
/// election is cancelled: a consumer that stops reading during shutdown can
/// miss the final `false`. [`LeadershipFlag`] is always current.
#[derive(Debug)]
pub struct LeadershipSignal {
    rx: mpsc::Receiver<bool>,
}

impl LeadershipSignal {
    /// Wait for the next leadership transition.
    pub async fn recv(&mut self) -> Option<bool> {
        self.rx.recv().await
    }

    /// Next already-queued transition, if any.
    pub fn try_recv(&mut self) -> Option<bool> {
        self.rx.try_recv().ok()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LeadershipPublisher
// ─────────────────────────────────────────────────────────────────────────────

/// Writer side, owned by the election task.
pub(crate) struct LeadershipPublisher {
    tx: Option<mpsc::Sender<bool>>,
    flag: LeadershipFlag,
    /// Whether anything has been pushed onto the queue yet.
    announced: bool,
    cancel: CancellationToken,
    metrics: Option<ElectionMetrics>,
}

impl LeadershipPublisher {
    /// Mirror every leadership change into `metrics`.
    pub(crate) fn with_metrics(mut self, metrics: ElectionMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub(crate) fn is_leader(&self) -> bool {
        self.flag.is_leader()
    }

    /// Record the leadership state, emitting an event only if it changed.
    pub(crate) async fn set(&mut self, leader: bool) {
        if self.flag.is_leader() == leader {
            return;
        }
        self.flag.store(leader);
        if let Some(metrics) = &self.metrics {
            metrics.record_leadership(leader);
        }
        info!(leader, "leadership changed");
        self.emit(leader).await;
    }

    /// Push the startup `false` for a candidate that found another leader.
    ///
    /// Only valid as the very first event; later calls are ignored.
    pub(crate) fn announce_follower(&mut self) {
        if self.announced || self.flag.is_leader() {
            return;
        }
        self.announced = true;
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.try_send(false) {
                debug!(error = %e, "initial follower event not delivered");
            }
        }
    }

    async fn emit(&mut self, leader: bool) {
        self.announced = true;
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(leader) {
            Ok(()) => {}
            Err(TrySendError::Closed(_)) => {
                debug!(leader, "leadership consumer gone, event dropped");
            }
            Err(TrySendError::Full(_)) => {
                warn!(leader, "leadership queue full, waiting for consumer");
                let delivered = tokio::select! {
                    biased;
                    res = tx.send(leader) => res.is_ok(),
                    _ = self.cancel.cancelled() => tx.try_send(leader).is_ok(),
                };
                if !delivered {
                    warn!(leader, "leadership queue full or closed, event dropped");
                }
            }
        }
    }

    /// Close the queue. Idempotent; the consumer sees `None` afterwards.
    pub(crate) fn close(&mut self) {
        if self.tx.take().is_some() {
            debug!("leadership signal closed");
        }
    }
}
