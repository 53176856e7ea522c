//! Configuration loading
//!
//! Loads settings from any format the `config` crate understands, picked by
//! file extension: YAML, TOML, JSON, INI, RON, JSON5.
//!
//! ## Features
//!
//! - Auto-detection of format from file extension
//! - Environment variable substitution (`${VAR}` and `$VAR` syntax)
//! - Prefixed environment overrides with `__` nesting (`GWSYNC__ELECTION__TTL_SECS`)

use std::path::Path;
use std::sync::LazyLock;

use config::{Config as Cfg, ConfigBuilder, Environment, File, builder::DefaultState};
use regex::Regex;
use serde::de::DeserializeOwned;

pub use config::FileFormat;

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

static BRACED_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("braced env-var pattern is valid")
});

static BARE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("bare env-var pattern is valid")
});

/// Detect configuration format from file extension
///
/// # Supported Extensions
///
/// - YAML: `.yaml`, `.yml`
/// - TOML: `.toml`
/// - JSON: `.json`
/// - INI: `.ini`
/// - RON: `.ron`
/// - JSON5: `.json5`
pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "ini" => Ok(FileFormat::Ini),
        "ron" => Ok(FileFormat::Ron),
        "json5" => Ok(FileFormat::Json5),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Substitute environment variables in a string
///
/// `${VAR_NAME}` is replaced first, then bare `$VAR_NAME`. References to
/// unset variables are left untouched.
pub fn substitute_env_vars(content: &str) -> String {
    let braced = BRACED_VAR.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    BARE_VAR
        .replace_all(&braced, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

fn deserialize<T>(builder: ConfigBuilder<DefaultState>) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let config = builder
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

fn env_source(prefix: &str) -> Environment {
    Environment::with_prefix(prefix)
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("etcd.endpoints")
}

/// Load configuration from a file
///
/// Detects the format from the file extension and substitutes environment
/// variables in the content before parsing.
///
/// # Example
///
/// ```rust,ignore
/// use gwsync_kernel::config::load_config;
///
/// let settings: ControllerSettings = load_config("gwsync.yaml")?;
/// ```
pub fn load_config<T>(path: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let substituted = substitute_env_vars(&content);

    deserialize(Cfg::builder().add_source(File::from_str(&substituted, format)))
}

/// Load configuration from a string with explicit format
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let substituted = substitute_env_vars(content);

    deserialize(Cfg::builder().add_source(File::from_str(&substituted, format)))
}

/// Load configuration from a file with environment variable overrides
///
/// Environment variables carry the given prefix and use double underscores
/// `__` for nesting: with prefix `GWSYNC`, `GWSYNC__ELECTION__TTL_SECS=5`
/// overrides `election.ttl_secs`.
pub fn load_with_env<T>(path: &str, env_prefix: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let substituted = substitute_env_vars(&content);

    deserialize(
        Cfg::builder()
            .add_source(File::from_str(&substituted, format))
            .add_source(env_source(env_prefix)),
    )
}

/// Load configuration purely from prefixed environment variables.
///
/// Fields absent from the environment fall back to the target type's serde
/// defaults.
pub fn load_from_env<T>(env_prefix: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    deserialize(Cfg::builder().add_source(env_source(env_prefix)))
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format("gwsync.yaml").unwrap(), FileFormat::Yaml);
        assert_eq!(detect_format("gwsync.yml").unwrap(), FileFormat::Yaml);
        assert_eq!(detect_format("gwsync.toml").unwrap(), FileFormat::Toml);
        assert_eq!(detect_format("gwsync.json").unwrap(), FileFormat::Json);
        assert_eq!(detect_format("gwsync.ini").unwrap(), FileFormat::Ini);
        assert_eq!(detect_format("gwsync.ron").unwrap(), FileFormat::Ron);
        assert_eq!(detect_format("gwsync.json5").unwrap(), FileFormat::Json5);
        assert!(detect_format("gwsync.txt").is_err());
        assert!(detect_format("gwsync").is_err());
    }

    #[test]
    fn test_from_str_toml() {
        let toml = r#"
election_name = "apisix-ingress"
ttl_secs = 5
"#;

        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct TestConfig {
            election_name: String,
            ttl_secs: u64,
        }

        let config: TestConfig = from_str(toml, FileFormat::Toml).unwrap();
        assert_eq!(config.election_name, "apisix-ingress");
        assert_eq!(config.ttl_secs, 5);
    }

    #[test]
    fn test_from_str_yaml_into_election_config() {
        let yaml = r#"
election_name: ingress
resume_leader_on_restart: true
"#;

        let config: crate::ElectionConfig = from_str(yaml, FileFormat::Yaml).unwrap();
        assert_eq!(config.election_name, "ingress");
        assert!(config.resume_leader_on_restart);
        assert_eq!(config.ttl_secs, 2);
    }

    #[test]
    fn test_unset_variables_are_left_verbatim() {
        let out = substitute_env_vars("endpoint: ${GWSYNC_TEST_SURELY_UNSET_VAR}");
        assert_eq!(out, "endpoint: ${GWSYNC_TEST_SURELY_UNSET_VAR}");
    }
}

// Include integration tests
#[cfg(test)]
mod tests;
