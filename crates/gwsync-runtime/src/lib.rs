//! `gwsync-runtime`: the leader-election engine.
//!
//! Given N independently running controller replicas sharing one
//! coordination service, this crate guarantees at most one of them treats
//! itself as leader at any moment, recovers from leader and session loss, and
//! reports leadership transitions to its host in order and without
//! duplicates.
//!
//! ```text
//!  LeaderElection::start
//!      │  first session (fatal on failure)
//!      │  bootstrap barrier ──▶ optional initial `false`
//!      ▼
//!  ElectionCoordinator task
//!      DiscoverLeader ─▶ Campaign ─▶ Observe
//!            ▲              │           │
//!            └── Reconnect ◀┴───────────┘        ──▶ LeadershipSignal / LeadershipFlag
//! ```
//!
//! | Component | Role |
//! |-----------|------|
//! | [`LeaderElection`] | host-facing handle: readiness, signal, flag, shutdown |
//! | [`SessionManager`] | creates sessions and their election handles |
//! | [`LeadershipSignal`] | ordered, deduplicated leadership events |
//! | [`ElectionMetrics`] | Prometheus leadership and reconnect series |
//! | [`backend`] | [`MemoryCoordinator`](backend::MemoryCoordinator) and, with feature `etcd`, an etcd client |

pub mod backend;
mod bootstrap;
mod coordinator;
pub mod election;
pub mod error;
pub mod metrics;
pub mod session;
pub mod signal;

pub use election::LeaderElection;
pub use error::{ElectionError, ElectionResult};
pub use metrics::ElectionMetrics;
pub use session::{ActiveSession, SessionManager};
pub use signal::{LeadershipFlag, LeadershipSignal};

pub use gwsync_kernel::{CandidateIdentity, ElectionConfig};
