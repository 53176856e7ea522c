//! File-based configuration loading tests.

#[cfg(test)]
mod integration_tests {
    use crate::ElectionConfig;
    use crate::config::*;
    use serde::Deserialize;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestSettings {
        candidate_id: Option<String>,
        #[serde(default)]
        election: ElectionConfig,
        etcd: Option<EtcdSection>,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct EtcdSection {
        endpoints: Vec<String>,
    }

    fn create_test_file(dir: &TempDir, filename: &str, content: &str) -> PathBuf {
        let path = dir.path().join(filename);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_yaml_and_toml_load_the_same_settings() {
        let temp_dir = TempDir::new().unwrap();

        let yaml = r#"
candidate_id: pod-a
election:
  election_name: ingress
  ttl_secs: 4
etcd:
  endpoints:
    - http://127.0.0.1:2379
"#;
        let yaml_path = create_test_file(&temp_dir, "gwsync.yaml", yaml);
        let from_yaml: TestSettings = load_config(yaml_path.to_str().unwrap()).unwrap();

        let toml = r#"
candidate_id = "pod-a"

[election]
election_name = "ingress"
ttl_secs = 4

[etcd]
endpoints = ["http://127.0.0.1:2379"]
"#;
        let toml_path = create_test_file(&temp_dir, "gwsync.toml", toml);
        let from_toml: TestSettings = load_config(toml_path.to_str().unwrap()).unwrap();

        assert_eq!(from_yaml, from_toml);
        assert_eq!(from_yaml.candidate_id.as_deref(), Some("pod-a"));
        assert_eq!(from_yaml.election.ttl_secs, 4);
        assert_eq!(from_yaml.election.reconnect_backoff_ms, 2_000);
    }

    #[test]
    fn test_env_substitution_in_file() {
        let temp_dir = TempDir::new().unwrap();
        // SAFETY: test-only, unique variable name.
        unsafe { std::env::set_var("GWSYNC_TEST_POD_NAME", "pod-from-env") };

        let json = r#"{ "candidate_id": "${GWSYNC_TEST_POD_NAME}" }"#;
        let path = create_test_file(&temp_dir, "gwsync.json", json);
        let settings: TestSettings = load_config(path.to_str().unwrap()).unwrap();

        assert_eq!(settings.candidate_id.as_deref(), Some("pod-from-env"));
        assert_eq!(settings.election, ElectionConfig::default());

        unsafe { std::env::remove_var("GWSYNC_TEST_POD_NAME") };
    }

    #[test]
    fn test_env_overrides_file_values() {
        let temp_dir = TempDir::new().unwrap();
        // SAFETY: test-only, unique prefix.
        unsafe { std::env::set_var("GWSYNCOVR__ELECTION__TTL_SECS", "9") };

        let yaml = r#"
election:
  election_name: ingress
  ttl_secs: 3
"#;
        let path = create_test_file(&temp_dir, "gwsync.yml", yaml);
        let settings: TestSettings = load_with_env(path.to_str().unwrap(), "GWSYNCOVR").unwrap();

        assert_eq!(settings.election.election_name, "ingress");
        assert_eq!(settings.election.ttl_secs, 9);

        unsafe { std::env::remove_var("GWSYNCOVR__ELECTION__TTL_SECS") };
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config::<TestSettings>("/nonexistent/gwsync.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = create_test_file(&temp_dir, "gwsync.conf", "candidate_id = \"a\"");
        let err = load_config::<TestSettings>(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }
}
