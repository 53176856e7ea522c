//! Shared helpers for the election integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gwsync_runtime::backend::MemoryCoordinator;
use gwsync_runtime::{CandidateIdentity, ElectionConfig, LeaderElection, LeadershipSignal};
use tokio_util::sync::CancellationToken;

pub const ELECTION: &str = "gateway-sync";

/// Generous upper bound for a single expected event. Tests run on paused
/// time, so this only elapses when the event is genuinely missing.
const EVENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Short discovery so empty elections settle quickly.
pub fn config() -> ElectionConfig {
    ElectionConfig::new(ELECTION)
        .with_ttl_secs(2)
        .with_discovery(Duration::from_millis(50), 2)
        .with_reconnect_backoff(Duration::from_millis(500))
}

pub async fn start(
    store: &MemoryCoordinator,
    id: &str,
    config: ElectionConfig,
    cancel: &CancellationToken,
) -> LeaderElection {
    LeaderElection::start(
        Arc::new(store.clone()),
        CandidateIdentity::new(id),
        config,
        cancel.clone(),
    )
    .await
    .expect("election should start")
}

/// Next leadership event, `None` once the signal is closed.
pub async fn next(signal: &mut LeadershipSignal) -> Option<bool> {
    tokio::time::timeout(EVENT_TIMEOUT, signal.recv())
        .await
        .expect("timed out waiting for a leadership event")
}

/// Assert nothing arrives on `signal` for `window`.
pub async fn assert_quiet(signal: &mut LeadershipSignal, window: Duration) {
    if let Ok(event) = tokio::time::timeout(window, signal.recv()).await {
        panic!("unexpected leadership event: {event:?}");
    }
}

/// Poll `cond` until it holds.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {what}");
}
