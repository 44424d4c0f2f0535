//! Connection model
//!
//! The normalized description of how to reach one database instance,
//! independent of backend. Every query or schema call receives a full,
//! immutable snapshot of a [`Connection`].

use crate::error::DbError;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The five supported backends.
///
/// Deserializing an unknown type string fails with
/// `Unsupported database type: <t>`, so nothing outside this set can reach an
/// adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum DatabaseType {
    Postgresql,
    Mysql,
    Sqlite,
    Mongodb,
    Redis,
}

impl DatabaseType {
    pub const ALL: [DatabaseType; 5] = [
        DatabaseType::Postgresql,
        DatabaseType::Mysql,
        DatabaseType::Sqlite,
        DatabaseType::Mongodb,
        DatabaseType::Redis,
    ];

    /// Wire name (`postgresql`, `mysql`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Postgresql => "postgresql",
            DatabaseType::Mysql => "mysql",
            DatabaseType::Sqlite => "sqlite",
            DatabaseType::Mongodb => "mongodb",
            DatabaseType::Redis => "redis",
        }
    }

    /// Conventional server port. SQLite has none.
    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseType::Postgresql => 5432,
            DatabaseType::Mysql => 3306,
            DatabaseType::Sqlite => 0,
            DatabaseType::Mongodb => 27017,
            DatabaseType::Redis => 6379,
        }
    }

    /// Backends whose driver enforces the query timeout server-side
    /// (`statement_timeout`, `maxTimeMS`). The others are raced against a
    /// client-side timer by the execution service.
    pub fn has_server_side_timeout(&self) -> bool {
        matches!(self, DatabaseType::Postgresql | DatabaseType::Mongodb)
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatabaseType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DbError::UnsupportedType(s.to_string()))
    }
}

impl TryFrom<String> for DatabaseType {
    type Error = DbError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// How to reach a database instance.
///
/// For `sqlite`, `database` (or `host` when `database` is empty) holds the
/// file path and `port`/`username`/`password` are ignored.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Opaque unique token, assigned once at creation
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub ssl: bool,
}

impl Connection {
    /// A connection with a fresh id and the backend's default port.
    pub fn new(
        db_type: DatabaseType,
        name: impl Into<String>,
        host: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            id: new_connection_id(),
            name: name.into(),
            db_type,
            host: host.into(),
            port: db_type.default_port(),
            database: database.into(),
            username: String::new(),
            password: String::new(),
            ssl: false,
        }
    }

    /// Filesystem path of a SQLite database.
    pub fn sqlite_path(&self) -> &str {
        if self.database.trim().is_empty() {
            self.host.trim()
        } else {
            self.database.trim()
        }
    }

    /// Human-readable target without credentials, safe for logs.
    pub fn target(&self) -> String {
        match self.db_type {
            DatabaseType::Sqlite => format!("sqlite:{}", self.sqlite_path()),
            t => format!("{}://{}:{}/{}", t, self.host, self.port, self.database),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ssl", &self.ssl)
            .finish()
    }
}

/// Generate a connection id that is never reused.
pub fn new_connection_id() -> String {
    format!("conn-{}", uuid::Uuid::new_v4())
}

/// Percent-encode a username or password for use inside a URI.
pub(crate) fn encode_credential(raw: &str) -> String {
    utf8_percent_encode(raw, NON_ALPHANUMERIC).to_string()
}
