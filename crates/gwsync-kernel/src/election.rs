//! Candidate identity and election configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// CandidateIdentity
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque string identifying this process among its peers.
///
/// Stored as the election record value when this candidate leads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateIdentity(String);

impl CandidateIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Time-derived identity used when nothing better is configured.
    pub fn placeholder() -> Self {
        let nanos = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| chrono::Utc::now().timestamp_micros());
        Self(format!("gwsync-{nanos}"))
    }

    /// Read the identity from `var`, falling back to [`placeholder`](Self::placeholder)
    /// when the variable is unset or blank.
    pub fn from_env_or_placeholder(var: &str) -> Self {
        match std::env::var(var) {
            Ok(v) if !v.trim().is_empty() => Self(v.trim().to_string()),
            _ => Self::placeholder(),
        }
    }

    /// Use the configured value when it is non-blank, otherwise fall back to
    /// [`from_env_or_placeholder`](Self::from_env_or_placeholder).
    pub fn configured_or_env(id: Option<&str>, var: &str) -> Self {
        match id.map(str::trim) {
            Some(v) if !v.is_empty() => Self(v.to_string()),
            _ => Self::from_env_or_placeholder(var),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` if an election record value names this candidate.
    pub fn matches(&self, value: &str) -> bool {
        self.0 == value
    }
}

impl fmt::Display for CandidateIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ElectionConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Definition-time errors in an [`ElectionConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ElectionConfigError {
    #[error("election name cannot be empty")]
    EmptyElectionName,

    #[error("session ttl must be at least 1 second")]
    ZeroTtl,

    #[error("reconnect backoff must be greater than 0 ms")]
    ZeroBackoff,

    #[error("discovery interval must be greater than 0 ms")]
    ZeroDiscoveryInterval,

    #[error("leadership signal capacity must be at least 1")]
    ZeroSignalCapacity,
}

/// Leader-election settings. Read-only once the election is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// Key prefix under which the election record lives.
    pub election_name: String,
    /// Session lease TTL in seconds. Also bounds resignation on shutdown.
    pub ttl_secs: u64,
    /// Re-attach to our own lease when we restart and find ourselves leader.
    pub resume_leader_on_restart: bool,
    /// Fixed delay between failed session-creation attempts.
    pub reconnect_backoff_ms: u64,
    /// Interval between leader queries of the startup barrier.
    pub discovery_interval_ms: u64,
    /// Leader queries the startup barrier makes before settling on
    /// "no leader".
    pub discovery_attempts: u32,
    /// Capacity of the leadership event queue.
    pub signal_capacity: usize,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            election_name: "gwsync-leader".to_string(),
            ttl_secs: 2,
            resume_leader_on_restart: false,
            reconnect_backoff_ms: 2_000,
            discovery_interval_ms: 200,
            discovery_attempts: 5,
            signal_capacity: 16,
        }
    }
}

impl ElectionConfig {
    pub fn new(election_name: impl Into<String>) -> Self {
        Self {
            election_name: election_name.into(),
            ..Default::default()
        }
    }

    /// Builder: set the lease TTL in seconds.
    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Builder: enable or disable resuming our own leadership on restart.
    pub fn with_resume_leader_on_restart(mut self, resume: bool) -> Self {
        self.resume_leader_on_restart = resume;
        self
    }

    /// Builder: set the reconnect backoff.
    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Builder: set the startup discovery cadence.
    pub fn with_discovery(mut self, interval: Duration, attempts: u32) -> Self {
        self.discovery_interval_ms = interval.as_millis() as u64;
        self.discovery_attempts = attempts;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ElectionConfigError> {
        if self.election_name.trim().is_empty() {
            return Err(ElectionConfigError::EmptyElectionName);
        }
        if self.ttl_secs == 0 {
            return Err(ElectionConfigError::ZeroTtl);
        }
        if self.reconnect_backoff_ms == 0 {
            return Err(ElectionConfigError::ZeroBackoff);
        }
        if self.discovery_interval_ms == 0 {
            return Err(ElectionConfigError::ZeroDiscoveryInterval);
        }
        if self.signal_capacity == 0 {
            return Err(ElectionConfigError::ZeroSignalCapacity);
        }
        Ok(())
    }
}
