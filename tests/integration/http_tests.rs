//! HTTP router behavior, driven with `tower::ServiceExt::oneshot`

use crate::common::{shared_service, sqlite_connection};
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tempfile::tempdir;
use tower::ServiceExt;
use velora::transport::http::{QUERY_PATH, SCHEMA_PATH, router};

async fn post(path: &str, body: impl Into<Body>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap();
    let response = router(shared_service()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post_json(path: &str, body: Value) -> (StatusCode, Value) {
    post(path, body.to_string()).await
}

fn minimal_connection() -> Value {
    json!({"type": "postgresql", "name": "n", "host": "h", "database": "d"})
}

#[tokio::test]
async fn test_query_ok() {
    let dir = tempdir().unwrap();
    let conn = serde_json::to_value(sqlite_connection(&dir)).unwrap();

    let (status, body) = post_json(QUERY_PATH, json!({"connection": conn, "query": "SELECT 1 AS x"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["columns"], json!(["x"]));
    assert_eq!(body["rows"], json!([[1]]));
    assert_eq!(body["rowCount"], 1);
    assert!(body["executionTime"].is_u64());
}

#[tokio::test]
async fn test_query_failure_is_200_with_error() {
    let dir = tempdir().unwrap();
    let conn = serde_json::to_value(sqlite_connection(&dir)).unwrap();

    let (status, body) = post_json(QUERY_PATH, json!({"connection": conn, "query": "SELEC nonsense"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["columns"], json!([]));
    assert_eq!(body["rows"], json!([]));
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn test_validation_errors_are_400() {
    let cases = [
        (json!({"connection": minimal_connection()}), "Query is required"),
        (json!({"connection": minimal_connection(), "query": "  "}), "Query is required"),
        (json!({"query": "SELECT 1"}), "Invalid request body"),
        (
            json!({"connection": {"type": "oracle", "name": "n", "host": "h", "database": "d"}, "query": "SELECT 1"}),
            "Invalid or missing connection type",
        ),
        (
            json!({"connection": {"type": "mysql", "name": " ", "host": "h", "database": "d"}, "query": "SELECT 1"}),
            "Connection name is required",
        ),
        (
            json!({"connection": {"type": "mysql", "name": "n", "database": "d"}, "query": "SELECT 1"}),
            "Host is required",
        ),
        (
            json!({"connection": {"type": "mysql", "name": "n", "host": "h"}, "query": "SELECT 1"}),
            "Database is required",
        ),
        (json!([1, 2, 3]), "Invalid request body"),
    ];

    for (body, message) in cases {
        let (status, reply) = post_json(QUERY_PATH, body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(reply, json!({"error": message}), "{body}");
    }
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let (status, body) = post(QUERY_PATH, "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid request body", "code": "INVALID_JSON"}));
}

#[tokio::test]
async fn test_schema_ok() {
    let dir = tempdir().unwrap();
    let conn = sqlite_connection(&dir);
    let service = shared_service();
    service
        .execute_query(&conn, "CREATE TABLE things (id INTEGER)")
        .await;

    let conn = serde_json::to_value(&conn).unwrap();
    let (status, body) = post_json(SCHEMA_PATH, json!({"connection": conn})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"tables": [{"name": "things", "type": "table"}]}));
}

#[tokio::test]
async fn test_schema_failure_is_500() {
    let conn = json!({
        "type": "sqlite",
        "name": "broken",
        "host": "/nonexistent-velora-dir/a.db",
        "database": "/nonexistent-velora-dir/a.db"
    });
    let (status, body) = post_json(SCHEMA_PATH, json!({"connection": conn})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "INTERNAL_ERROR");
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn test_schema_validation_is_400() {
    let (status, body) = post_json(SCHEMA_PATH, json!({"connection": {"name": "x"}})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid or missing connection type"}));
}
