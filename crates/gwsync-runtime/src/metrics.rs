//! Prometheus metrics for one election.

use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

/// Leadership and session-churn metrics, registered in a registry owned by
/// the election. Cheap to clone; clones share the same series.
#[derive(Clone)]
pub struct ElectionMetrics {
    registry: Registry,
    leader: IntGauge,
    transitions: IntCounter,
    reconnects: IntCounter,
    session_failures: IntCounter,
}

impl ElectionMetrics {
    pub fn new(election: &str, candidate: &str) -> prometheus::Result<Self> {
        let opts = |name: &str, help: &str| {
            Opts::new(name, help)
                .namespace("gwsync")
                .const_label("election", election)
                .const_label("candidate", candidate)
        };

        let leader = IntGauge::with_opts(opts("is_leader", "1 while this candidate leads"))?;
        let transitions = IntCounter::with_opts(opts(
            "leadership_transitions_total",
            "Leadership changes observed by this candidate",
        ))?;
        let reconnects = IntCounter::with_opts(opts(
            "reconnects_total",
            "Times the election entered reconnect",
        ))?;
        let session_failures = IntCounter::with_opts(opts(
            "session_failures_total",
            "Failed session creation attempts",
        ))?;

        let registry = Registry::new();
        registry.register(Box::new(leader.clone()))?;
        registry.register(Box::new(transitions.clone()))?;
        registry.register(Box::new(reconnects.clone()))?;
        registry.register(Box::new(session_failures.clone()))?;

        Ok(Self {
            registry,
            leader,
            transitions,
            reconnects,
            session_failures,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every series.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn transitions(&self) -> u64 {
        self.transitions.get()
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.get()
    }

    pub fn session_failures(&self) -> u64 {
        self.session_failures.get()
    }

    pub(crate) fn record_leadership(&self, leader: bool) {
        self.leader.set(i64::from(leader));
        self.transitions.inc();
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.inc();
    }

    pub(crate) fn record_session_failure(&self) {
        self.session_failures.inc();
    }
}

impl std::fmt::Debug for ElectionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElectionMetrics")
            .field("is_leader", &self.leader.get())
            .field("transitions", &self.transitions())
            .field("reconnects", &self.reconnects())
            .finish_non_exhaustive()
    }
}
