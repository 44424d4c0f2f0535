//! Connection profiles
//!
//! Manages named connection profiles stored in ~/.velora/connections.toml

use crate::db::connection::{Connection, DatabaseType};
use crate::error::{ConfigError, ConfigResult};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A saved connection profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Profile name
    pub name: String,

    #[serde(rename = "type")]
    pub db_type: DatabaseType,

    #[serde(default)]
    pub host: String,

    /// Falls back to the backend's default port
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name, or the file path for SQLite
    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub username: String,

    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    #[serde(default)]
    pub ssl: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConnectionsFile {
    #[serde(default)]
    connections: Vec<ConnectionConfig>,
}

impl ConnectionConfig {
    /// Parse a connection URL.
    ///
    /// Accepts `postgres://`, `postgresql://`, `mysql://`, `mongodb://`,
    /// `redis://` (all `[user[:pass]@]host[:port][/database][?params]`) and
    /// `sqlite:<path>`.
    pub fn from_url(url: &str) -> ConfigResult<Self> {
        let url = url.trim();
        if let Some(path) = url.strip_prefix("sqlite:") {
            let path = path.strip_prefix("//").unwrap_or(path);
            if path.is_empty() {
                return Err(ConfigError::Invalid("SQLite URL must contain a path".into()));
            }
            return Ok(Self {
                name: path.to_string(),
                db_type: DatabaseType::Sqlite,
                host: String::new(),
                port: None,
                database: path.to_string(),
                username: String::new(),
                password: None,
                ssl: false,
            });
        }

        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| ConfigError::Invalid("URL must start with <scheme>://".into()))?;
        let db_type = match scheme {
            "postgres" | "postgresql" => DatabaseType::Postgresql,
            "mysql" => DatabaseType::Mysql,
            "mongodb" => DatabaseType::Mongodb,
            "redis" => DatabaseType::Redis,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "Unsupported URL scheme: {other}"
                )));
            }
        };

        // Credentials are optional for every server backend
        let (creds, host_part) = match rest.rsplit_once('@') {
            Some((creds, host_part)) => (Some(creds), host_part),
            None => (None, rest),
        };
        let (username, password) = match creds {
            Some(creds) => match creds.split_once(':') {
                Some((u, p)) => (decode(u), Some(decode(p))),
                None => (decode(creds), None),
            },
            None => (String::new(), None),
        };

        let (host_part, query) = match host_part.split_once('?') {
            Some((h, q)) => (h, Some(q)),
            None => (host_part, None),
        };
        let (host_port, database) = match host_part.split_once('/') {
            Some((hp, db)) => (hp, db.to_string()),
            None => (host_part, String::new()),
        };

        let (host, port) = match host_port.rsplit_once(':') {
            Some((h, p)) => {
                let port = p
                    .parse::<u16>()
                    .map_err(|_| ConfigError::Invalid(format!("Invalid port: {}", p)))?;
                (h.to_string(), Some(port))
            }
            None => (host_port.to_string(), None),
        };
        if host.is_empty() {
            return Err(ConfigError::Invalid("URL must contain a host".into()));
        }

        let ssl = query.is_some_and(ssl_requested);
        let name = if database.is_empty() {
            host.clone()
        } else {
            format!("{}@{}", database, host)
        };

        Ok(Self {
            name,
            db_type,
            host,
            port,
            database,
            username,
            password,
            ssl,
        })
    }

    /// Effective port
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.db_type.default_port())
    }

    /// Snapshot this profile as a [`Connection`] with a fresh id.
    pub fn to_connection(&self) -> Connection {
        let mut connection =
            Connection::new(self.db_type, &self.name, &self.host, &self.database);
        connection.port = self.port();
        connection.username = self.username.clone();
        connection.password = self.password.clone().unwrap_or_default();
        connection.ssl = self.ssl;
        connection
    }

    /// Get the config directory path (~/.velora/)
    pub fn config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".velora"))
    }

    /// Get the connections file path
    pub fn connections_file() -> ConfigResult<PathBuf> {
        Ok(Self::config_dir()?.join("connections.toml"))
    }
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// `sslmode=require`, `ssl=true` or `tls=true` in a URL query string
fn ssl_requested(query: &str) -> bool {
    query.split('&').any(|param| {
        matches!(
            param,
            "sslmode=require" | "sslmode=verify-ca" | "sslmode=verify-full" | "ssl=true" | "tls=true"
        )
    })
}

/// Load all connection profiles from the default file
pub fn load_connections() -> ConfigResult<Vec<ConnectionConfig>> {
    load_connections_from(&ConnectionConfig::connections_file()?)
}

/// Load connection profiles from `path`; a missing file means no profiles.
pub fn load_connections_from(path: &Path) -> ConfigResult<Vec<ConnectionConfig>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::NotFound(format!("Failed to read connections file: {}", e)))?;
    let file: ConnectionsFile = toml::from_str(&content)?;
    Ok(file.connections)
}

/// Render profiles as a `connections.toml` document (passwords omitted).
pub fn profiles_to_toml(profiles: &[ConnectionConfig]) -> ConfigResult<String> {
    let file = ConnectionsFile {
        connections: profiles.to_vec(),
    };
    toml::to_string(&file).map_err(|e| ConfigError::Invalid(e.to_string()))
}

/// Find a connection by name
pub fn find_connection(name: &str) -> ConfigResult<ConnectionConfig> {
    let connections = load_connections()?;
    connections
        .into_iter()
        .find(|c| c.name == name)
        .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string()))
}
