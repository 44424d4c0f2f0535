//! Common test utilities and helpers
//!
//! Shared test infrastructure for the integration tests.

#![allow(dead_code)]

use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use velora::db::types::QueryResult;
use velora::db::{Connection, DatabaseType};
use velora::service::QueryService;

/// A fresh SQLite file inside `dir`.
///
/// The path is also placed in `host` so the connection passes request
/// validation, which requires a host for every backend.
pub fn sqlite_connection(dir: &TempDir) -> Connection {
    let path = dir.path().join("test.db");
    let path = path.to_string_lossy().into_owned();
    Connection::new(DatabaseType::Sqlite, "scratch", path.clone(), path)
}

/// Create and fill `people(id, name, score)`.
pub async fn seed_people(service: &QueryService, connection: &Connection) {
    for statement in [
        "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL)",
        "CREATE VIEW high_scorers AS SELECT name FROM people WHERE score > 50",
        "INSERT INTO people (id, name, score) VALUES (1, 'Ada', 91.5), (2, 'Brian', 42.0), (3, 'Chen', NULL)",
    ] {
        let result = service.execute_query(connection, statement).await;
        assert!(result.error.is_none(), "{statement}: {:?}", result.error);
    }
}

pub fn shared_service() -> Arc<QueryService> {
    Arc::new(QueryService::default())
}

/// Wire JSON of a result without its timing, for comparing transports.
pub fn without_timing(result: &QueryResult) -> Value {
    let mut value = serde_json::to_value(result).expect("result serializes");
    if let Some(object) = value.as_object_mut() {
        object.remove("executionTime");
    }
    value
}

pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_port(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(default)
}
