//! Error types for velora
//!
//! This module defines the error hierarchy used throughout the crate.
//! We use `thiserror` for library-style errors with clear error chains.
//! Adapters and services turn these into data (`QueryResult::error`,
//! `SchemaResponse::error`); only transport request parsing lets them escape.

use std::io;
use std::time::Duration;

/// Main error type for velora
#[derive(Debug, thiserror::Error)]
pub enum VeloraError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed connection or query input
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Bridge or HTTP transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Database operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DbError {
    /// Failed to establish connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// Schema introspection failed
    #[error("Schema loading failed: {0}")]
    SchemaLoadFailed(String),

    /// Connection type outside the five known backends
    #[error("Unsupported database type: {0}")]
    UnsupportedType(String),

    /// Operation timed out
    #[error("Query timed out after {}s", format_seconds(.0))]
    Timeout(Duration),
}

impl DbError {
    /// The one-line message placed in a result's `error` field.
    ///
    /// Driver messages are forwarded verbatim, without the variant prefix;
    /// timeout and unsupported-type errors keep their full wording.
    pub fn message(&self) -> String {
        match self {
            DbError::ConnectionFailed(m) | DbError::QueryFailed(m) | DbError::SchemaLoadFailed(m) => {
                m.clone()
            }
            DbError::UnsupportedType(_) | DbError::Timeout(_) => self.to_string(),
        }
    }
}

/// `60000ms` renders as `60`, `1500ms` as `1.5`.
fn format_seconds(limit: &Duration) -> String {
    let secs = limit.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{}", limit.as_secs())
    } else {
        format!("{secs}")
    }
}

/// Configuration loading/parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Home directory not found
    #[error("Could not determine home directory")]
    NoHomeDir,

    /// Config file not found
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Connection profile not found
    #[error("Connection profile '{0}' not found")]
    ProfileNotFound(String),

    /// IO error while reading a config file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Pre-dispatch validation failures (HTTP 400)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid request body")]
    InvalidBody,

    #[error("Invalid or missing connection type")]
    InvalidType,

    #[error("Connection name is required")]
    MissingName,

    #[error("Host is required")]
    MissingHost,

    #[error("Database is required")]
    MissingDatabase,

    #[error("Query is required")]
    MissingQuery,
}

/// Errors raised while talking to a remote query service
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The service answered but reported a failure
    #[error("{0}")]
    Remote(String),

    /// Malformed payload on the wire
    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// HTTP client failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The bridge peer went away
    #[error("Bridge closed")]
    Closed,

    /// Bridge stream IO
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Specialized Result type for velora operations
pub type Result<T> = std::result::Result<T, VeloraError>;

/// Specialized Result type for database operations
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Specialized Result type for config operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;
