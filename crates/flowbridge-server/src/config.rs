//! Configuration for the FlowBridge server
//!
//! Values come from `FLOWBRIDGE_*` environment variables. Anything that does
//! not parse is logged and left at its default.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use flowbridge_core::EndpointSettings;
use flowbridge_state_inmemory::RetentionPolicy;

use crate::error::{ServerError, ServerResult};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ServerError::ConfigError(format!("Unknown log format: {}", other))),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub bind_address: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Scheme of generated endpoints
    #[serde(default = "default_public_protocol")]
    pub public_protocol: String,

    /// Host of generated endpoints
    #[serde(default = "default_public_host")]
    pub public_host: String,

    /// Base directory of `file://` endpoints
    #[serde(default = "default_file_base_path")]
    pub file_base_path: String,

    /// Per adapter call timeout
    #[serde(default = "default_adapter_timeout")]
    pub adapter_timeout_secs: u64,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,

    /// YAML catalog loaded at startup
    #[serde(default)]
    pub catalog_path: Option<String>,

    /// Message log retention age
    #[serde(default = "default_message_retention")]
    pub message_retention_secs: u64,

    /// Message log capacity
    #[serde(default = "default_message_capacity")]
    pub message_log_capacity: usize,

    /// Polling scheduler tick, 0 disables polling
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_public_protocol() -> String {
    "http".to_string()
}

fn default_public_host() -> String {
    "localhost".to_string()
}

fn default_file_base_path() -> String {
    "/opt/integrixflowbridge/flows".to_string()
}

fn default_adapter_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_message_retention() -> u64 {
    3600 // 1 hour
}

fn default_message_capacity() -> usize {
    10_000
}

fn default_poll_interval() -> u64 {
    60
}

// Parse `name` into `target`, keeping the current value when it does not parse
fn parse_var<T: FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = env::var(name) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!("Invalid {} value: {}", name, raw),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn load() -> ServerResult<Self> {
        let mut config = Self::default();

        if let Ok(host) = env::var("FLOWBRIDGE_HOST") {
            config.bind_address = host;
        }
        parse_var("FLOWBRIDGE_PORT", &mut config.port);

        if let Ok(protocol) = env::var("FLOWBRIDGE_PUBLIC_PROTOCOL") {
            config.public_protocol = protocol;
        }
        if let Ok(host) = env::var("FLOWBRIDGE_PUBLIC_HOST") {
            config.public_host = host;
        }
        if let Ok(path) = env::var("FLOWBRIDGE_FILE_BASE_PATH") {
            config.file_base_path = path;
        }

        parse_var("FLOWBRIDGE_ADAPTER_TIMEOUT_SECS", &mut config.adapter_timeout_secs);

        if let Ok(level) = env::var("FLOWBRIDGE_LOG_LEVEL") {
            config.log_level = level;
        }
        parse_var("FLOWBRIDGE_LOG_FORMAT", &mut config.log_format);

        if let Ok(catalog) = env::var("FLOWBRIDGE_CATALOG") {
            if !catalog.trim().is_empty() {
                config.catalog_path = Some(catalog);
            }
        }

        parse_var("FLOWBRIDGE_MESSAGE_RETENTION_SECS", &mut config.message_retention_secs);
        parse_var("FLOWBRIDGE_MESSAGE_LOG_CAPACITY", &mut config.message_log_capacity);
        parse_var("FLOWBRIDGE_POLL_INTERVAL_SECS", &mut config.poll_interval_secs);

        if config.adapter_timeout_secs == 0 {
            warn!("FLOWBRIDGE_ADAPTER_TIMEOUT_SECS must be positive, using the default");
            config.adapter_timeout_secs = default_adapter_timeout();
        }

        info!("Loaded server configuration");
        Ok(config)
    }

    /// Settings used to generate public endpoints
    pub fn endpoint_settings(&self) -> EndpointSettings {
        EndpointSettings {
            protocol: self.public_protocol.clone(),
            host: self.public_host.clone(),
            port: self.port,
            file_base_path: self.file_base_path.clone(),
        }
    }

    /// Per adapter call timeout
    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }

    /// Message log retention
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_age: Duration::from_secs(self.message_retention_secs),
            capacity: self.message_log_capacity,
        }
    }

    /// Polling scheduler tick, `None` when polling is disabled
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_secs > 0).then(|| Duration::from_secs(self.poll_interval_secs))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_host(),
            port: default_port(),
            public_protocol: default_public_protocol(),
            public_host: default_public_host(),
            file_base_path: default_file_base_path(),
            adapter_timeout_secs: default_adapter_timeout(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            catalog_path: None,
            message_retention_secs: default_message_retention(),
            message_log_capacity: default_message_capacity(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}
