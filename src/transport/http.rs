//! HTTP transport
//!
//! Server: an axum router with `POST /api/query` and `POST /api/schema`.
//! Client: [`HttpClient`], a reqwest wrapper speaking the same routes.
//!
//! Malformed input is rejected with 400 `{error, code?}` before any
//! database is touched. Query failures are not HTTP errors; they travel in
//! the `QueryResult` body with status 200.

use crate::db::connection::Connection;
use crate::db::types::{QueryResult, SchemaObject, SchemaResponse};
use crate::error::{TransportError, TransportResult, ValidationError};
use crate::service::QueryService;
use crate::transport::QueryTransport;
use crate::validation::{validate_query_request, validate_schema_request};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const QUERY_PATH: &str = "/api/query";
pub const SCHEMA_PATH: &str = "/api/schema";

/// Error code on 500 responses
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// Error code when the body is not JSON at all
pub const INVALID_JSON: &str = "INVALID_JSON";

/// Error body shared by 400 and 500 responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Handler failure mapped to a status code
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    InvalidJson,
    Internal(String),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(error) => (StatusCode::BAD_REQUEST, ApiErrorBody { error, code: None }),
            ApiError::InvalidJson => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    error: ValidationError::InvalidBody.to_string(),
                    code: Some(INVALID_JSON.to_string()),
                },
            ),
            ApiError::Internal(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody {
                    error,
                    code: Some(INTERNAL_ERROR.to_string()),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// Create the API router
pub fn router(service: Arc<QueryService>) -> Router {
    Router::new()
        .route(QUERY_PATH, post(execute_query))
        .route(SCHEMA_PATH, post(fetch_schema))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(service: Arc<QueryService>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "http server listening");
    axum::serve(listener, router(service)).await
}

fn parse_body(body: &[u8]) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(|_| ApiError::InvalidJson)
}

async fn execute_query(
    State(service): State<Arc<QueryService>>,
    body: Bytes,
) -> Result<Json<QueryResult>, ApiError> {
    let request = validate_query_request(&parse_body(&body)?)?;
    let result = service
        .execute_query(&request.connection, &request.query)
        .await;
    Ok(Json(result))
}

async fn fetch_schema(
    State(service): State<Arc<QueryService>>,
    body: Bytes,
) -> Result<Json<SchemaResponse>, ApiError> {
    let connection = validate_schema_request(&parse_body(&body)?)?;
    match service.fetch_schema(&connection).await {
        Ok(tables) => Ok(Json(SchemaResponse::ok(tables))),
        Err(e) => {
            error!(connection = %connection.name, error = %e, "schema API error");
            Err(ApiError::Internal(e.message()))
        }
    }
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown error".to_string()
    };
    error!(error = %message, "request handler panicked");
    ApiError::Internal(message).into_response()
}

/// Client for a remote query service
#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: &str, body: &Value, fallback: &str) -> TransportResult<Value> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Remote(error_message(
                &text,
                fallback,
                status.as_u16(),
            )));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// The body's `error` field, or `<fallback> (<status>)`.
fn error_message(body: &str, fallback: &str, status: u16) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| format!("{fallback} ({status})"))
}

#[async_trait]
impl QueryTransport for HttpClient {
    async fn execute_query(
        &self,
        connection: &Connection,
        query: &str,
    ) -> TransportResult<QueryResult> {
        let body = json!({"connection": connection, "query": query.trim()});
        let value = self
            .post(QUERY_PATH, &body, "Query execution failed")
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn fetch_schema(&self, connection: &Connection) -> TransportResult<Vec<SchemaObject>> {
        let body = json!({"connection": connection});
        let value = self
            .post(SCHEMA_PATH, &body, "Unable to load schema")
            .await?;
        let response: SchemaResponse = serde_json::from_value(value)?;
        match response.error {
            Some(error) => Err(TransportError::Remote(error)),
            None => Ok(response.tables),
        }
    }
}
