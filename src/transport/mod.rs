//! Transport boundary
//!
//! The same two operations, execute a query and fetch a schema, reachable
//! three ways: a direct in-process call, a newline-delimited JSON bridge to an
//! isolated process ([`ipc`]), and HTTP ([`http`]). Each path implements
//! [`QueryTransport`] and yields the same JSON for the same inputs.

pub mod http;
pub mod ipc;

use crate::db::connection::{Connection, DatabaseType};
use crate::db::types::{QueryResult, SchemaObject, SchemaResponse};
use crate::error::{DbError, DbResult, TransportError, TransportResult, ValidationError};
use crate::service::QueryService;
use crate::validation;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

pub use http::HttpClient;
pub use ipc::IpcClient;

/// Caller-side view of the query service
#[async_trait]
pub trait QueryTransport: Send + Sync {
    /// Run a query. Query failures are inside the returned result; `Err`
    /// means the transport itself failed.
    async fn execute_query(
        &self,
        connection: &Connection,
        query: &str,
    ) -> TransportResult<QueryResult>;

    /// List schema objects. A failed listing is an `Err`.
    async fn fetch_schema(&self, connection: &Connection) -> TransportResult<Vec<SchemaObject>>;
}

/// Direct call into a [`QueryService`], no serialization
#[derive(Debug, Clone)]
pub struct InProcess {
    service: Arc<QueryService>,
}

impl InProcess {
    pub fn new(service: Arc<QueryService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl QueryTransport for InProcess {
    async fn execute_query(
        &self,
        connection: &Connection,
        query: &str,
    ) -> TransportResult<QueryResult> {
        Ok(self.service.execute_query(connection, query.trim()).await)
    }

    async fn fetch_schema(&self, connection: &Connection) -> TransportResult<Vec<SchemaObject>> {
        self.service
            .fetch_schema(connection)
            .await
            .map_err(|e| TransportError::Remote(e.message()))
    }
}

/// The bridge when one is available, otherwise HTTP against `base_url`.
pub fn select(bridge: Option<IpcClient>, base_url: &str) -> Box<dyn QueryTransport> {
    match bridge {
        Some(bridge) => Box::new(bridge),
        None => Box::new(HttpClient::new(base_url)),
    }
}

/// Serve an `execute-query` payload `{connection, query}`.
///
/// An unknown connection type or a blank query is rejected here, before any
/// adapter runs.
pub async fn handle_execute(service: &QueryService, payload: &Value) -> QueryResult {
    let start = Instant::now();
    let query = payload
        .as_object()
        .and_then(validation::query_text)
        .ok_or_else(|| DbError::QueryFailed(ValidationError::MissingQuery.to_string()));
    match payload_connection(payload).and_then(|c| query.map(|q| (c, q))) {
        Ok((connection, query)) => service.execute_query(&connection, query).await,
        Err(e) => QueryResult::failure(e.message()).with_execution_time(start.elapsed()),
    }
}

/// Serve a `fetch-schema` payload `{connection}`. Never fails; errors travel
/// in [`SchemaResponse::error`].
pub async fn handle_fetch_schema(service: &QueryService, payload: &Value) -> SchemaResponse {
    let connection = match payload_connection(payload) {
        Ok(connection) => connection,
        Err(e) => return SchemaResponse::failure(e.message()),
    };
    match service.fetch_schema(&connection).await {
        Ok(tables) => SchemaResponse::ok(tables),
        Err(e) => SchemaResponse::failure(e.message()),
    }
}

/// Same normalization as HTTP, minus the required-field checks.
fn payload_connection(payload: &Value) -> DbResult<Connection> {
    let raw = payload
        .get("connection")
        .and_then(Value::as_object)
        .ok_or_else(|| DbError::QueryFailed("Connection is required".to_string()))?;

    let db_type = raw
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| DbError::QueryFailed("Invalid connection: missing type".to_string()))?
        .parse::<DatabaseType>()?;

    Ok(validation::normalize_connection(raw, db_type))
}
