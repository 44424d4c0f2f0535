//! Request validation
//!
//! Turns untrusted JSON into a [`Connection`] before anything is dispatched.
//! Failures map to HTTP 400 and never reach a database.

use crate::db::connection::{Connection, DatabaseType, new_connection_id};
use crate::error::ValidationError;
use serde_json::{Map, Value};

/// Port used when the supplied one is missing or not numeric
pub const FALLBACK_PORT: u16 = 5432;

/// A validated `{connection, query}` body
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub connection: Connection,
    /// Trimmed, never empty
    pub query: String,
}

/// Validate and normalize a raw connection object.
pub fn validate_connection(raw: &Value) -> Result<Connection, ValidationError> {
    let object = raw.as_object().ok_or(ValidationError::InvalidBody)?;

    let db_type = object
        .get("type")
        .and_then(Value::as_str)
        .and_then(|t| t.parse::<DatabaseType>().ok())
        .ok_or(ValidationError::InvalidType)?;

    let connection = normalize_connection(object, db_type);
    if connection.name.is_empty() {
        return Err(ValidationError::MissingName);
    }
    if connection.host.is_empty() {
        return Err(ValidationError::MissingHost);
    }
    if connection.database.is_empty() {
        return Err(ValidationError::MissingDatabase);
    }
    Ok(connection)
}

/// Build a [`Connection`] from a raw object without rejecting anything.
///
/// Text fields are trimmed and default to `""`, the port falls back to
/// [`FALLBACK_PORT`] and `ssl` is set only by a literal `true`. The bridge
/// uses this directly; HTTP adds the required-field checks on top.
pub fn normalize_connection(object: &Map<String, Value>, db_type: DatabaseType) -> Connection {
    let id = match object.get("id") {
        Some(Value::String(id)) => id.clone(),
        _ => new_connection_id(),
    };

    Connection {
        id,
        name: trimmed(object.get("name")),
        db_type,
        host: trimmed(object.get("host")),
        port: port(object.get("port")),
        database: trimmed(object.get("database")),
        username: string_or_empty(object.get("username")),
        password: string_or_empty(object.get("password")),
        ssl: matches!(object.get("ssl"), Some(Value::Bool(true))),
    }
}

/// The trimmed query text, `None` when missing, not a string, or blank.
pub fn query_text(body: &Map<String, Value>) -> Option<&str> {
    body.get("query")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
}

/// Validate a `{connection, query}` body.
pub fn validate_query_request(body: &Value) -> Result<QueryRequest, ValidationError> {
    let object = body.as_object().ok_or(ValidationError::InvalidBody)?;
    let connection = validate_connection(object.get("connection").unwrap_or(&Value::Null))?;
    let query = query_text(object).ok_or(ValidationError::MissingQuery)?;

    Ok(QueryRequest {
        connection,
        query: query.to_string(),
    })
}

/// Validate a `{connection}` body.
pub fn validate_schema_request(body: &Value) -> Result<Connection, ValidationError> {
    let object = body.as_object().ok_or(ValidationError::InvalidBody)?;
    validate_connection(object.get("connection").unwrap_or(&Value::Null))
}

fn trimmed(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn string_or_empty(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

/// Numbers and numeric strings are accepted; anything else falls back.
fn port(value: Option<&Value>) -> u16 {
    let parsed = match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|p| u16::try_from(p).ok())
        .unwrap_or(FALLBACK_PORT)
}
