//! `gwsync-controller`: hosts a [`LeaderElection`](gwsync_runtime::LeaderElection)
//! and gates gateway configuration writes on it.
//!
//! | Module | Role |
//! |--------|------|
//! | [`settings`] | file + environment settings |
//! | [`dispatch`] | consumes leadership events, starts the sync loop once |
//! | [`sync`] | [`GatewaySync`](sync::GatewaySync) and the leader-gated loop |
//! | [`shutdown`] | SIGINT/SIGTERM to cancellation |

pub mod dispatch;
pub mod latch;
pub mod settings;
pub mod shutdown;
pub mod sync;

pub use dispatch::Dispatcher;
pub use latch::OneShotLatch;
pub use settings::{BackendKind, ControllerSettings, LogFormat};
pub use sync::{GatewaySync, LoggingSync};
