//! The three transports against one SQLite file
//!
//! In-process, the bridge over an in-memory duplex, and HTTP against a
//! server bound to an ephemeral port must all produce the same JSON.

use crate::common::{seed_people, shared_service, sqlite_connection, without_timing};
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;
use tokio_test::{assert_err, assert_ok};
use velora::db::types::SchemaObjectKind;
use velora::error::TransportError;
use velora::service::QueryService;
use velora::transport::{self, HttpClient, InProcess, IpcClient, QueryTransport};

/// A bridge client talking to an in-process bridge server.
fn bridge(service: Arc<QueryService>) -> IpcClient {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    tokio::spawn(transport::ipc::serve(service, server_read, server_write));
    let (client_read, client_write) = tokio::io::split(client_io);
    IpcClient::new(client_read, client_write)
}

/// An HTTP client for a router served on 127.0.0.1:<ephemeral>.
async fn http(service: Arc<QueryService>) -> HttpClient {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, transport::http::router(service))
            .await
            .unwrap();
    });
    HttpClient::new(&format!("http://{addr}"))
}

async fn all_transports(service: Arc<QueryService>) -> Vec<(&'static str, Box<dyn QueryTransport>)> {
    let in_process: Box<dyn QueryTransport> = Box::new(InProcess::new(Arc::clone(&service)));
    let bridged = transport::select(Some(bridge(Arc::clone(&service))), "");
    let over_http: Box<dyn QueryTransport> = Box::new(http(service).await);
    vec![("in-process", in_process), ("bridge", bridged), ("http", over_http)]
}

#[tokio::test]
async fn test_transports_agree_on_query_results() {
    let dir = tempdir().unwrap();
    let service = shared_service();
    let conn = sqlite_connection(&dir);
    seed_people(&service, &conn).await;

    let queries = [
        "SELECT id, name, score FROM people ORDER BY id",
        "  SELECT 1 AS x  ",
        "SELECT * FROM people WHERE id > 100",
        "SELECT * FROM nowhere",
    ];

    let transports = all_transports(Arc::clone(&service)).await;
    for query in queries {
        let expected = without_timing(&service.execute_query(&conn, query.trim()).await);
        for (label, transport) in &transports {
            let result = assert_ok!(transport.execute_query(&conn, query).await);
            assert!(result.execution_time.is_some(), "{label}: {query}");
            assert_eq!(without_timing(&result), expected, "{label}: {query}");
        }
    }
}

#[tokio::test]
async fn test_transports_agree_on_schema() {
    let dir = tempdir().unwrap();
    let service = shared_service();
    let conn = sqlite_connection(&dir);
    seed_people(&service, &conn).await;

    for (label, transport) in all_transports(Arc::clone(&service)).await {
        let tables = assert_ok!(transport.fetch_schema(&conn).await);
        let summary: Vec<_> = tables.iter().map(|t| (t.name.clone(), t.kind)).collect();
        assert_eq!(
            summary,
            vec![
                ("high_scorers".to_string(), SchemaObjectKind::View),
                ("people".to_string(), SchemaObjectKind::Table),
            ],
            "{label}"
        );
    }
}

#[tokio::test]
async fn test_schema_failure_is_an_error_everywhere() {
    let service = shared_service();
    let conn = velora::db::Connection::new(
        velora::db::DatabaseType::Sqlite,
        "unreachable",
        "/nonexistent-velora-dir/a.db",
        "/nonexistent-velora-dir/a.db",
    );

    for (label, transport) in all_transports(Arc::clone(&service)).await {
        let err = assert_err!(transport.fetch_schema(&conn).await);
        assert!(matches!(err, TransportError::Remote(_)), "{label}: {err:?}");
    }
}

#[tokio::test]
async fn test_bridge_handles_concurrent_requests() {
    let dir = tempdir().unwrap();
    let service = shared_service();
    let conn = sqlite_connection(&dir);
    seed_people(&service, &conn).await;

    let client = Arc::new(bridge(Arc::clone(&service)));
    let calls = (1..=3).map(|id| {
        let client = Arc::clone(&client);
        let conn = conn.clone();
        async move {
            let query = format!("SELECT name FROM people WHERE id = {id}");
            client.execute_query(&conn, &query).await
        }
    });
    let results = futures::future::join_all(calls).await;

    let names: Vec<_> = results
        .into_iter()
        .map(|r| serde_json::to_value(&r.unwrap().rows).unwrap())
        .collect();
    assert_eq!(names, vec![json!([["Ada"]]), json!([["Brian"]]), json!([["Chen"]])]);
}

#[tokio::test]
async fn test_bridge_rejects_unsupported_type() {
    let service = shared_service();
    let client = bridge(service);

    let payload = json!({"connection": {"type": "oracle", "name": "o"}, "query": "SELECT 1"});
    let result = client
        .invoke(transport::ipc::EXECUTE_QUERY, payload.clone())
        .await
        .unwrap();
    assert_eq!(result["error"], "Unsupported database type: oracle");
    assert_eq!(result["columns"], json!([]));

    let schema = client
        .invoke(transport::ipc::FETCH_SCHEMA, payload)
        .await
        .unwrap();
    assert_eq!(schema, json!({"tables": [], "error": "Unsupported database type: oracle"}));
}

#[tokio::test]
async fn test_bridge_write_file_channel() {
    let dir = tempdir().unwrap();
    let client = bridge(shared_service());
    let path = dir.path().join("export.csv");

    let reply = client
        .invoke(
            transport::ipc::WRITE_FILE,
            json!({"filePath": path.to_string_lossy(), "data": "x\n1"}),
        )
        .await
        .unwrap();
    assert_eq!(reply, json!({"success": true}));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "x\n1");
}

#[tokio::test]
async fn test_bridge_unknown_channel() {
    let client = bridge(shared_service());
    let err = client.invoke("save-file-dialog", json!({})).await.unwrap_err();
    assert_eq!(err.to_string(), "No handler registered for 'save-file-dialog'");
}

#[tokio::test]
async fn test_bridge_and_http_normalize_connections_alike() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    let dir = tempdir().unwrap();
    let service = shared_service();
    let mut conn = serde_json::to_value(sqlite_connection(&dir)).unwrap();
    let client = bridge(Arc::clone(&service));

    for port in [json!(null), json!("5432"), json!("not-a-port")] {
        conn["port"] = port.clone();
        let body = json!({"connection": conn, "query": "SELECT 1 AS x"});

        let bridged = client
            .invoke(transport::ipc::EXECUTE_QUERY, body.clone())
            .await
            .unwrap();

        let request = Request::builder()
            .method("POST")
            .uri(transport::http::QUERY_PATH)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = transport::http::router(Arc::clone(&service))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let mut over_http: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        let mut bridged = bridged;
        bridged.as_object_mut().unwrap().remove("executionTime");
        over_http.as_object_mut().unwrap().remove("executionTime");
        assert_eq!(bridged, over_http, "port {port}");
        assert_eq!(bridged["rows"], json!([[1]]));
    }

    let missing = client
        .invoke(transport::ipc::EXECUTE_QUERY, json!({"connection": conn}))
        .await
        .unwrap();
    assert_eq!(missing["error"], "Query is required");
    assert_eq!(missing["rows"], json!([]));
}

#[tokio::test]
async fn test_spawned_bridge_uses_callers_settings_file() {
    let dir = tempdir().unwrap();
    let service = shared_service();
    let conn = sqlite_connection(&dir);
    seed_people(&service, &conn).await;

    let settings = dir.path().join("settings.toml");
    std::fs::write(&settings, "max_rows = 1\nlog_level = \"warn\"\n").unwrap();

    let program = std::path::Path::new(env!("CARGO_BIN_EXE_velora"));
    let client = assert_ok!(IpcClient::spawn(program, Some(&settings)));
    let result = assert_ok!(
        client
            .execute_query(&conn, "SELECT name FROM people ORDER BY id")
            .await
    );
    assert_eq!(result.rows.len(), 1);
    assert_eq!(
        result.truncated_message.as_deref(),
        Some("Results limited to 1 of 3 rows")
    );
}
