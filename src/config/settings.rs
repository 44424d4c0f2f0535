//! Service settings
//!
//! Manages settings stored in ~/.velora/config.toml

use crate::config::ConnectionConfig;
use crate::db::types::{DEFAULT_MAX_ROWS, DEFAULT_QUERY_TIMEOUT, QueryLimits};
use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Client-side query timeout, also sent as the server-side timeout
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Rows kept per result before truncation
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// HTTP listen address for `velora serve`
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_query_timeout_ms() -> u64 {
    DEFAULT_QUERY_TIMEOUT.as_millis() as u64
}

fn default_max_rows() -> usize {
    DEFAULT_MAX_ROWS
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            query_timeout_ms: default_query_timeout_ms(),
            max_rows: default_max_rows(),
            bind: default_bind(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    pub fn limits(&self) -> QueryLimits {
        QueryLimits {
            timeout: Duration::from_millis(self.query_timeout_ms),
            max_rows: self.max_rows,
        }
    }

    pub fn bind_addr(&self) -> ConfigResult<SocketAddr> {
        self.bind
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("Invalid bind address: {}", self.bind)))
    }
}

/// Load settings from the default config file
pub fn load_settings() -> ConfigResult<Settings> {
    load_settings_from(&ConnectionConfig::config_dir()?.join("config.toml"))
}

/// Load settings from `path`; a missing file yields the defaults.
pub fn load_settings_from(path: &Path) -> ConfigResult<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&content)?;
    Ok(settings)
}
