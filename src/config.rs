//! Service configuration
//!
//! Configuration is read once at startup from a TOML file and is immutable
//! afterwards. Every section has defaults, so an empty file (or no file at all)
//! yields a runnable configuration apart from the collaborator secret, which is
//! always read from the environment variable named in `[collaborator]`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main service configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub collaborator: CollaboratorSection,
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub retry: RetrySection,
}

/// Listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSection {
    /// Service name reported by the health endpoint
    #[serde(default = "default_service_name")]
    pub name: String,
    /// TCP port for the intake endpoint
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            port: default_port(),
        }
    }
}

fn default_service_name() -> String {
    "async-calculation-service".to_string()
}

fn default_port() -> u16 {
    8081
}

/// Order-management collaborator that receives computed results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollaboratorSection {
    /// Base URL, without the callback path
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable containing the shared secret
    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,
    /// Timeout for one relay call in seconds (default: 10)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CollaboratorSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            secret_key_env: default_secret_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_secret_key_env() -> String {
    "COLLABORATOR_SECRET_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

/// Background dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchSection {
    /// Lower bound of the simulated processing latency in seconds
    #[serde(default = "default_min_delay_secs")]
    pub min_delay_secs: u64,
    /// Upper bound (inclusive) of the simulated processing latency in seconds
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// Maximum number of orders processed concurrently; unbounded when absent
    pub max_in_flight: Option<usize>,
    /// Reject a submission whose order id is already being processed
    #[serde(default = "default_reject_duplicate_orders")]
    pub reject_duplicate_orders: bool,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            min_delay_secs: default_min_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            max_in_flight: None,
            reject_duplicate_orders: default_reject_duplicate_orders(),
        }
    }
}

fn default_min_delay_secs() -> u64 {
    5
}

fn default_max_delay_secs() -> u64 {
    10
}

fn default_reject_duplicate_orders() -> bool {
    true
}

/// Relay retry settings; the default performs no retry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySection {
    /// Additional relay attempts after the first failure
    #[serde(default)]
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each subsequent one
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

fn default_initial_backoff_ms() -> u64 {
    500
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid collaborator URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ServiceConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.collaborator_url()?;

        if self.collaborator.timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "collaborator.timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.dispatch.min_delay_secs > self.dispatch.max_delay_secs {
            return Err(ConfigError::InvalidConfig(format!(
                "dispatch.min_delay_secs ({}) exceeds dispatch.max_delay_secs ({})",
                self.dispatch.min_delay_secs, self.dispatch.max_delay_secs
            )));
        }

        if self.dispatch.max_in_flight == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "dispatch.max_in_flight must be greater than zero when set".to_string(),
            ));
        }

        if self.collaborator.secret_key_env.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "collaborator.secret_key_env must name an environment variable".to_string(),
            ));
        }

        Ok(())
    }

    /// Parsed collaborator base URL
    pub fn collaborator_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.collaborator.base_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.collaborator.base_url.clone(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ConfigError::InvalidUrl {
                url: self.collaborator.base_url.clone(),
                reason: format!("unsupported scheme '{scheme}'"),
            }),
        }
    }

    /// Read the collaborator secret from its environment variable
    pub fn get_secret_key(&self) -> Result<String, ConfigError> {
        let name = &self.collaborator.secret_key_env;
        match std::env::var(name) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(ConfigError::EnvVarNotFound(name.clone())),
        }
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator.timeout_secs)
    }

    /// Create a test configuration with no simulated latency
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[service]
port = 18081

[collaborator]
base_url = "http://127.0.0.1:9"
secret_key_env = "TEST_COLLABORATOR_SECRET"
timeout_secs = 2

[dispatch]
min_delay_secs = 0
max_delay_secs = 0
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}
