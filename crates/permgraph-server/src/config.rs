//! Configuration management for permgraph.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use permgraph_server::config::ServerConfig;
//!
//! // Load from file with env overrides
//! let config = ServerConfig::load("permgraph.yaml")?;
//!
//! // Or load from environment only
//! let config = ServerConfig::from_env()?;
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use permgraph_domain::{AuthorizerConfig, CacheMode, PermissionCacheConfig};

/// Environment variable prefix.
const ENV_PREFIX: &str = "PERMGRAPH";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Permission cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Authorization settings
    #[serde(default)]
    pub authorization: AuthorizationSettings,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Permission cache settings.
///
/// Overridable with `PERMGRAPH_CACHE__<FIELD>`, e.g.
/// `PERMGRAPH_CACHE__MODE=async`.
///
/// # Example YAML Configuration
///
/// ```yaml
/// cache:
///   mode: async
///   ttl_secs: 172800
///   key_prefix: perm_v1_
///   poll_interval_ms: 100
///   wait_deadline_ms: 30000
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSettings {
    /// "sync" recomputes inline on miss; "async" waits for the refresh worker.
    #[serde(default = "default_cache_mode")]
    pub mode: String,

    /// Entry lifetime in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Versioned key prefix; bump it when the entry format changes
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Maximum number of cached principals
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,

    /// Store re-read interval while waiting (async mode)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Longest wait for the refresh worker (async mode)
    #[serde(default = "default_wait_deadline_ms")]
    pub wait_deadline_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            mode: default_cache_mode(),
            ttl_secs: default_ttl_secs(),
            key_prefix: default_key_prefix(),
            max_capacity: default_max_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
            wait_deadline_ms: default_wait_deadline_ms(),
        }
    }
}

impl CacheSettings {
    /// Cache mode named by `mode`. Unknown names fall back to synchronous;
    /// `ServerConfig::validate` rejects them first.
    pub fn cache_mode(&self) -> CacheMode {
        match self.mode.to_lowercase().as_str() {
            "async" => CacheMode::Asynchronous,
            _ => CacheMode::Synchronous,
        }
    }

    pub fn to_cache_config(&self) -> PermissionCacheConfig {
        PermissionCacheConfig::default()
            .with_mode(self.cache_mode())
            .with_ttl(Duration::from_secs(self.ttl_secs))
            .with_key_prefix(self.key_prefix.clone())
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_wait_deadline(Duration::from_millis(self.wait_deadline_ms))
    }
}

fn default_cache_mode() -> String {
    "sync".to_string()
}

fn default_ttl_secs() -> u64 {
    172_800
}

fn default_key_prefix() -> String {
    permgraph_domain::cache::DEFAULT_KEY_PREFIX.to_string()
}

fn default_max_capacity() -> u64 {
    100_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_wait_deadline_ms() -> u64 {
    30_000
}

/// Authorization settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AuthorizationSettings {
    /// Group whose read grants apply to every principal
    pub anonymous_group_id: Option<String>,
}

impl AuthorizationSettings {
    pub fn to_authorizer_config(&self) -> AuthorizerConfig {
        match &self.anonymous_group_id {
            Some(group) => AuthorizerConfig::default().with_anonymous_group(group.clone()),
            None => AuthorizerConfig::default(),
        }
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Storage backend type: "memory"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// JSON file of edges loaded into the backend at startup
    pub seed_file: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            seed_file: None,
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `PERMGRAPH_` and use `__` as
    /// separator. For example:
    /// - `PERMGRAPH_CACHE__MODE=async` overrides `cache.mode`
    /// - `PERMGRAPH_STORAGE__SEED_FILE=...` overrides `storage.seed_file`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(env_source())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(env_source())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_modes = ["sync", "async"];
        if !valid_modes.contains(&self.cache.mode.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "cache.mode must be one of: {:?}, got: {}",
                valid_modes, self.cache.mode
            )));
        }

        if self.cache.ttl_secs == 0 {
            return Err(invalid("cache.ttl_secs must be greater than 0"));
        }

        if self.cache.key_prefix.trim().is_empty() {
            return Err(invalid("cache.key_prefix cannot be empty"));
        }

        if self.cache.max_capacity == 0 {
            return Err(invalid("cache.max_capacity must be greater than 0"));
        }

        if self.cache.poll_interval_ms == 0 {
            return Err(invalid("cache.poll_interval_ms must be greater than 0"));
        }

        if self.cache.wait_deadline_ms < self.cache.poll_interval_ms {
            return Err(invalid(format!(
                "cache.wait_deadline_ms ({}) must be at least cache.poll_interval_ms ({})",
                self.cache.wait_deadline_ms, self.cache.poll_interval_ms
            )));
        }

        if self
            .authorization
            .anonymous_group_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err(invalid("authorization.anonymous_group_id cannot be empty"));
        }

        let valid_backends = ["memory"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(invalid(format!(
                "storage.backend must be one of: {:?}, got: {}",
                valid_backends, self.storage.backend
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "logging.level must be one of: {:?}, got: {}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}

/// Environment source: `PERMGRAPH_CACHE__MODE` -> `cache.mode`.
fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

fn invalid(message: impl Into<String>) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Test: Can load config from YAML file
    #[test]
    #[serial]
    fn test_can_load_config_from_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
cache:
  mode: async
  ttl_secs: 600
  key_prefix: perm_v2_
  poll_interval_ms: 50
  wait_deadline_ms: 5000

authorization:
  anonymous_group_id: anonymous

storage:
  backend: memory
  seed_file: /tmp/edges.json

logging:
  level: debug
  json: true
"#
        )
        .unwrap();

        let config = ServerConfig::load(file.path()).unwrap();

        assert_eq!(config.cache.cache_mode(), CacheMode::Asynchronous);
        assert_eq!(config.cache.ttl_secs, 600);
        assert_eq!(config.cache.key_prefix, "perm_v2_");
        assert_eq!(config.cache.poll_interval_ms, 50);
        assert_eq!(config.cache.wait_deadline_ms, 5000);
        assert_eq!(
            config.authorization.anonymous_group_id.as_deref(),
            Some("anonymous")
        );
        assert_eq!(config.storage.seed_file.as_deref(), Some("/tmp/edges.json"));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    /// Test: Can override config with env vars
    #[test]
    #[serial]
    fn test_can_override_config_with_env_vars() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
cache:
  mode: sync
  ttl_secs: 600
"#
        )
        .unwrap();

        std::env::set_var("PERMGRAPH_CACHE__MODE", "async");
        std::env::set_var("PERMGRAPH_LOGGING__LEVEL", "warn");

        let config = ServerConfig::load(file.path());

        std::env::remove_var("PERMGRAPH_CACHE__MODE");
        std::env::remove_var("PERMGRAPH_LOGGING__LEVEL");

        let config = config.unwrap();
        assert_eq!(config.cache.mode, "async"); // Overridden by env
        assert_eq!(config.cache.ttl_secs, 600); // From file
        assert_eq!(config.logging.level, "warn"); // Overridden by env
    }

    /// Test: from_env loads defaults with env overrides
    #[test]
    #[serial]
    fn test_from_env_loads_defaults_with_env_overrides() {
        std::env::set_var("PERMGRAPH_CACHE__WAIT_DEADLINE_MS", "1500");

        let config = ServerConfig::from_env();

        std::env::remove_var("PERMGRAPH_CACHE__WAIT_DEADLINE_MS");

        let config = config.unwrap();
        assert_eq!(config.cache.wait_deadline_ms, 1500);
        assert_eq!(config.cache.poll_interval_ms, 100); // default
    }

    /// Test: Config validation catches errors
    #[test]
    fn test_config_validation_catches_errors() {
        let cases: [(&str, fn(&mut ServerConfig)); 9] = [
            ("cache.mode", |c| c.cache.mode = "eventually".to_string()),
            ("cache.ttl_secs", |c| c.cache.ttl_secs = 0),
            ("cache.key_prefix", |c| c.cache.key_prefix = " ".to_string()),
            ("cache.max_capacity", |c| c.cache.max_capacity = 0),
            ("cache.poll_interval_ms", |c| c.cache.poll_interval_ms = 0),
            ("cache.wait_deadline_ms", |c| c.cache.wait_deadline_ms = 10),
            ("authorization.anonymous_group_id", |c| {
                c.authorization.anonymous_group_id = Some(String::new())
            }),
            ("storage.backend", |c| c.storage.backend = "postgres".to_string()),
            ("logging.level", |c| c.logging.level = "loud".to_string()),
        ];

        for (field, mutate) in cases {
            let mut config = ServerConfig::default();
            mutate(&mut config);
            let err = config.validate().unwrap_err();
            assert!(
                err.to_string().contains(field),
                "error for {field} should name it, got: {err}"
            );
        }
    }

    /// Test: Invalid config returns clear error
    #[test]
    fn test_invalid_config_returns_clear_error() {
        let result = ServerConfig::load("/nonexistent/path/permgraph.yaml");
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigLoadError::FileNotFound { .. }));
        assert!(err.to_string().contains("not found"));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid: yaml: syntax: [").unwrap();

        let err = ServerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Load(_)));
    }

    /// Test: Default config is valid
    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());

        assert_eq!(config.cache.cache_mode(), CacheMode::Synchronous);
        assert_eq!(config.cache.ttl_secs, 172_800);
        assert_eq!(config.cache.key_prefix, "perm_v1_");
        assert_eq!(config.cache.wait_deadline_ms, 30_000);
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.logging.level, "info");
        assert!(config.authorization.anonymous_group_id.is_none());
    }

    #[test]
    fn test_settings_convert_to_domain_config() {
        let mut config = ServerConfig::default();
        config.cache.mode = "ASYNC".to_string();
        config.cache.ttl_secs = 60;
        config.cache.poll_interval_ms = 20;
        config.authorization.anonymous_group_id = Some("anonymous".to_string());

        let cache = config.cache.to_cache_config();
        assert_eq!(cache.mode, CacheMode::Asynchronous);
        assert_eq!(cache.ttl, Duration::from_secs(60));
        assert_eq!(cache.poll_interval, Duration::from_millis(20));

        let authz = config.authorization.to_authorizer_config();
        assert_eq!(authz.anonymous_group_id.as_deref(), Some("anonymous"));
    }
}
