//! gwsync controller: entry point.
//!
//! Joins the leader election and runs gateway configuration sync while this
//! replica leads.
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GWSYNC_CONFIG` | *(none)* | Settings file (YAML, TOML, JSON, INI, RON, JSON5). |
//! | `GWSYNC__<SECTION>__<KEY>` | | Overrides a setting, e.g. `GWSYNC__ELECTION__TTL_SECS=5`. |
//! | `POD_NAME` | time-derived | Candidate identity when `candidate_id` is unset. |
//! | `RUST_LOG` | `gwsync=info` | Log filter. |

use std::sync::Arc;

use eyre::{Result, WrapErr, eyre};
use gwsync_controller::settings::EtcdSettings;
use gwsync_controller::shutdown::cancel_on_shutdown;
use gwsync_controller::{BackendKind, ControllerSettings, Dispatcher, LogFormat, LoggingSync};
use gwsync_kernel::CoordinationClient;
use gwsync_runtime::LeaderElection;
use gwsync_runtime::backend::MemoryCoordinator;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("gwsync=info".parse()?);
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
    Ok(())
}

async fn connect(settings: &ControllerSettings) -> Result<Arc<dyn CoordinationClient>> {
    match settings.backend {
        BackendKind::Memory => {
            warn!("using the in-memory coordination backend, leadership is not shared across processes");
            Ok(Arc::new(MemoryCoordinator::new()))
        }
        BackendKind::Etcd => connect_etcd(&settings.etcd).await,
    }
}

#[cfg(feature = "etcd")]
async fn connect_etcd(etcd: &EtcdSettings) -> Result<Arc<dyn CoordinationClient>> {
    let client = gwsync_runtime::backend::EtcdCoordinator::connect(
        &etcd.endpoints,
        etcd.connect_timeout(),
    )
    .await
    .wrap_err("failed to connect to etcd")?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "etcd"))]
async fn connect_etcd(etcd: &EtcdSettings) -> Result<Arc<dyn CoordinationClient>> {
    Err(eyre!(
        "etcd backend requested ({:?}) but gwsync-controller was built without the `etcd` feature",
        etcd.endpoints
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = ControllerSettings::from_env().wrap_err("failed to load controller settings")?;
    init_tracing(settings.log_format)?;

    let identity = settings.identity();
    info!(
        candidate = %identity,
        backend = ?settings.backend,
        election = %settings.election.election_name,
        ttl_secs = settings.election.ttl_secs,
        "gwsync controller starting"
    );

    let cancel = CancellationToken::new();
    let bridge = cancel_on_shutdown(cancel.clone());

    let client = connect(&settings).await?;
    let mut election =
        LeaderElection::start(client, identity, settings.election.clone(), cancel.clone())
            .await
            .wrap_err("failed to start leader election")?;
    let signal = election
        .take_signal()
        .ok_or_else(|| eyre!("leadership signal already taken"))?;

    let dispatcher = Dispatcher::new(
        Arc::new(LoggingSync::new()),
        election.leadership_flag(),
        settings.sync_interval(),
    );
    let dispatching = tokio::spawn(dispatcher.run(signal, cancel.clone()));

    cancel.cancelled().await;
    let metrics = election.metrics().clone();
    election.shutdown().await;
    match metrics.render() {
        Ok(text) => debug!(metrics = %text, "final election metrics"),
        Err(e) => warn!(error = %e, "failed to render election metrics"),
    }
    dispatching.await.wrap_err("dispatch task failed")?;
    bridge.await.wrap_err("signal bridge failed")?;

    info!("gwsync controller stopped");
    Ok(())
}
