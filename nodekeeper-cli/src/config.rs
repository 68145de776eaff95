//! Configuration management for nodekeeper
//!
//! Settings are loaded once per invocation and handed to each component.
//! Sources, in increasing priority:
//! 1. Default values
//! 2. Configuration file (TOML format)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Cluster membership agent
    pub consul: ConsulConfig,
    /// Monitoring server API
    pub api: ApiConfig,
    /// Cloud provider access
    pub aws: AwsConfig,
    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Consul agent configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsulConfig {
    pub host: String,
    pub port: u16,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// ACL token sent as `X-Consul-Token`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Monitoring server API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// AWS configuration
///
/// Keys left unset here are looked up by the credential provider chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AwsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Inventory API endpoint override (e.g. a VPC endpoint)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Instance metadata service base URL
    pub metadata_endpoint: String,
    pub timeout_secs: u64,
    /// Instance metadata requests only; kept short so runs off EC2 fail fast
    pub metadata_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Optional log file; console logging always goes to stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    /// Use JSON formatting on the console
    pub json: bool,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8500,
            timeout_secs: 5,
            token: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4567,
            timeout_secs: 5,
            user: None,
            password: None,
        }
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            access_key: None,
            secret_key: None,
            region: None,
            endpoint: None,
            metadata_endpoint: "http://169.254.169.254".to_string(),
            timeout_secs: 10,
            metadata_timeout_secs: 1,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file_path: None,
            json: false,
        }
    }
}

impl ConsulConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ApiConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AwsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }
}

impl Settings {
    /// Load settings from an explicit file, or the first standard location found,
    /// then apply environment overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_file(),
        };

        let mut settings = match path {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };

        settings.apply_env_overrides(|key| std::env::var(key).ok());
        settings.validate()?;

        Ok(settings)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            std::env::var("NODEKEEPER_CONFIG").ok().map(PathBuf::from),
            Some(PathBuf::from("/etc/nodekeeper/config.toml")),
            Some(PathBuf::from("./nodekeeper.toml")),
        ];

        paths.into_iter().flatten().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Consul
        if let Some(host) = lookup("CONSUL_HOST") {
            self.consul.host = host;
        }
        if let Some(port) = lookup("CONSUL_PORT").and_then(|p| p.parse().ok()) {
            self.consul.port = port;
        }
        if let Some(token) = lookup("CONSUL_HTTP_TOKEN").filter(|t| !t.is_empty()) {
            self.consul.token = Some(token);
        }

        // Monitoring server API
        if let Some(host) = lookup("SENSU_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("SENSU_API_PORT").and_then(|p| p.parse().ok()) {
            self.api.port = port;
        }
        if let Some(user) = lookup("SENSU_API_USER") {
            self.api.user = Some(user);
        }
        if let Some(password) = lookup("SENSU_API_PASSWORD") {
            self.api.password = Some(password);
        }

        // Logging
        if let Some(level) = lookup("NODEKEEPER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(path) = lookup("NODEKEEPER_LOG_FILE") {
            self.logging.file_path = Some(PathBuf::from(path));
        }
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.consul.host.trim().is_empty() {
            return Err(ConfigError::Validation("consul.host cannot be empty".to_string()));
        }
        if self.consul.port == 0 {
            return Err(ConfigError::Validation("consul.port cannot be 0".to_string()));
        }
        if self.api.host.trim().is_empty() {
            return Err(ConfigError::Validation("api.host cannot be empty".to_string()));
        }
        if self.api.port == 0 {
            return Err(ConfigError::Validation("api.port cannot be 0".to_string()));
        }
        if self.consul.timeout_secs == 0
            || self.api.timeout_secs == 0
            || self.aws.timeout_secs == 0
            || self.aws.metadata_timeout_secs == 0
        {
            return Err(ConfigError::Validation("timeouts must be at least one second".to_string()));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Failed to read configuration file
    FileRead(PathBuf, String),
    /// Failed to parse configuration
    Parse(String),
    /// Configuration validation failed
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, err) => {
                write!(f, "Failed to read config file {:?}: {}", path, err)
            }
            ConfigError::Parse(err) => write!(f, "Failed to parse config: {}", err),
            ConfigError::Validation(err) => write!(f, "Config validation failed: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for nodekeeper_common::Error {
    fn from(err: ConfigError) -> Self {
        nodekeeper_common::Error::Config(err.to_string())
    }
}
