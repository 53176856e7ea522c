//! Controller settings.
//!
//! Loaded from an optional file (format picked by extension) layered under
//! `GWSYNC__`-prefixed environment variables, e.g.
//! `GWSYNC__ELECTION__TTL_SECS=5` or `GWSYNC__ETCD__ENDPOINTS=a:2379,b:2379`.

use std::time::Duration;

use gwsync_kernel::config::{self, ConfigResult};
use gwsync_kernel::{CandidateIdentity, ElectionConfig};
use serde::{Deserialize, Serialize};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "GWSYNC";

/// Variable naming the settings file.
pub const CONFIG_PATH_VAR: &str = "GWSYNC_CONFIG";

/// Variable consulted for the candidate identity when none is configured.
pub const IDENTITY_VAR: &str = "POD_NAME";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process store; only meaningful for a single replica.
    #[default]
    Memory,
    Etcd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtcdSettings {
    pub endpoints: Vec<String>,
    pub connect_timeout_ms: u64,
}

impl Default for EtcdSettings {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://127.0.0.1:2379".to_string()],
            connect_timeout_ms: 5000,
        }
    }
}

impl EtcdSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Candidate identity; falls back to `$POD_NAME`, then a time-derived
    /// placeholder.
    pub candidate_id: Option<String>,
    pub backend: BackendKind,
    pub etcd: EtcdSettings,
    pub election: ElectionConfig,
    pub sync_interval_ms: u64,
    pub log_format: LogFormat,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            candidate_id: None,
            backend: BackendKind::default(),
            etcd: EtcdSettings::default(),
            election: ElectionConfig::default(),
            sync_interval_ms: 1000,
            log_format: LogFormat::default(),
        }
    }
}

impl ControllerSettings {
    /// Load from `path` when given, otherwise from the environment alone.
    pub fn load(path: Option<&str>) -> ConfigResult<Self> {
        match path {
            Some(path) => config::load_with_env(path, ENV_PREFIX),
            None => config::load_from_env(ENV_PREFIX),
        }
    }

    /// Load using the file named by `$GWSYNC_CONFIG`, if set.
    pub fn from_env() -> ConfigResult<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).ok();
        Self::load(path.as_deref())
    }

    pub fn identity(&self) -> CandidateIdentity {
        CandidateIdentity::configured_or_env(self.candidate_id.as_deref(), IDENTITY_VAR)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(name: &str, body: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(body.as_bytes())
            .unwrap();
        let path = path.to_string_lossy().into_owned();
        (dir, path)
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let (_dir, path) = write("controller.toml", "candidate_id = \"pod-7\"\n");

        let settings = ControllerSettings::load(Some(&path)).unwrap();

        assert_eq!(settings.identity().as_str(), "pod-7");
        assert_eq!(settings.backend, BackendKind::Memory);
        assert_eq!(settings.election, ElectionConfig::default());
        assert_eq!(settings.sync_interval(), Duration::from_secs(1));
    }

    #[test]
    fn yaml_settings_with_etcd_backend() {
        let (_dir, path) = write(
            "controller.yaml",
            r#"
backend: etcd
log_format: json
sync_interval_ms: 250
etcd:
  endpoints: ["http://etcd-0:2379", "http://etcd-1:2379"]
  connect_timeout_ms: 1500
election:
  election_name: apisix-ingress
  ttl_secs: 5
  resume_leader_on_restart: true
"#,
        );

        let settings = ControllerSettings::load(Some(&path)).unwrap();

        assert_eq!(settings.backend, BackendKind::Etcd);
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.etcd.endpoints.len(), 2);
        assert_eq!(settings.etcd.connect_timeout(), Duration::from_millis(1500));
        assert_eq!(settings.election.election_name, "apisix-ingress");
        assert_eq!(settings.election.ttl_secs, 5);
        assert!(settings.election.resume_leader_on_restart);
        assert_eq!(settings.election.reconnect_backoff_ms, 2000);
    }

    #[test]
    fn blank_candidate_id_is_not_an_identity() {
        let settings = ControllerSettings {
            candidate_id: Some("   ".to_string()),
            ..Default::default()
        };

        assert!(!settings.identity().as_str().trim().is_empty());
    }
}
