//! Tests against live database servers
//!
//! Each test skips when its server is not reachable. MongoDB's driver waits
//! for server selection, so its tests only run when TEST_MONGO_HOST is set.
//!
//! Environment variables (with defaults):
//! - TEST_DB_HOST / TEST_DB_PORT / TEST_DB_NAME / TEST_DB_USER / TEST_DB_PASSWORD:
//!   localhost / 5433 / test_db / test_user / test_password (PostgreSQL)
//! - TEST_MYSQL_HOST / TEST_MYSQL_PORT / TEST_MYSQL_DB / TEST_MYSQL_USER / TEST_MYSQL_PASSWORD:
//!   localhost / 3307 / test_db / test_user / test_password
//! - TEST_REDIS_HOST / TEST_REDIS_PORT: localhost / 6380
//! - TEST_MONGO_HOST / TEST_MONGO_PORT / TEST_MONGO_DB: unset / 27018 / test_db

use crate::common::{env_or, env_port};
use serde_json::json;
use velora::db::types::{CellValue, SchemaObjectKind};
use velora::db::{Connection, DatabaseType};
use velora::service::QueryService;

fn postgres() -> Connection {
    let mut conn = Connection::new(
        DatabaseType::Postgresql,
        "integration-pg",
        env_or("TEST_DB_HOST", "localhost"),
        env_or("TEST_DB_NAME", "test_db"),
    );
    conn.port = env_port("TEST_DB_PORT", 5433);
    conn.username = env_or("TEST_DB_USER", "test_user");
    conn.password = env_or("TEST_DB_PASSWORD", "test_password");
    conn
}

fn mysql() -> Connection {
    let mut conn = Connection::new(
        DatabaseType::Mysql,
        "integration-mysql",
        env_or("TEST_MYSQL_HOST", "localhost"),
        env_or("TEST_MYSQL_DB", "test_db"),
    );
    conn.port = env_port("TEST_MYSQL_PORT", 3307);
    conn.username = env_or("TEST_MYSQL_USER", "test_user");
    conn.password = env_or("TEST_MYSQL_PASSWORD", "test_password");
    conn
}

fn redis() -> Connection {
    let mut conn = Connection::new(
        DatabaseType::Redis,
        "integration-redis",
        env_or("TEST_REDIS_HOST", "localhost"),
        "0",
    );
    conn.port = env_port("TEST_REDIS_PORT", 6380);
    conn
}

fn mongo() -> Option<Connection> {
    let host = std::env::var("TEST_MONGO_HOST").ok()?;
    let mut conn = Connection::new(
        DatabaseType::Mongodb,
        "integration-mongo",
        host,
        env_or("TEST_MONGO_DB", "test_db"),
    );
    conn.port = env_port("TEST_MONGO_PORT", 27018);
    Some(conn)
}

/// Probe the server with `probe`; `false` means skip.
async fn reachable(service: &QueryService, conn: &Connection, probe: &str) -> bool {
    let result = service.execute_query(conn, probe).await;
    if let Some(error) = result.error {
        eprintln!(
            "Skipping test: {} not available at {} - {}",
            conn.db_type,
            conn.target(),
            error
        );
        return false;
    }
    true
}

#[tokio::test]
async fn test_postgres_select_and_schema() {
    let service = QueryService::default();
    let conn = postgres();
    if !reachable(&service, &conn, "SELECT 1").await {
        return;
    }

    let result = service
        .execute_query(&conn, "SELECT 1 AS num, 'hello' AS msg, NULL::text AS nothing")
        .await;
    assert_eq!(result.error, None);
    assert_eq!(result.columns, vec!["num", "msg", "nothing"]);
    assert_eq!(
        result.rows,
        vec![vec![
            CellValue::Integer(1),
            CellValue::Text("hello".to_string()),
            CellValue::Null
        ]]
    );

    let ddl = [
        "DROP VIEW IF EXISTS velora_it_view",
        "DROP TABLE IF EXISTS velora_it_table",
        "CREATE TABLE velora_it_table (id INT)",
        "CREATE VIEW velora_it_view AS SELECT id FROM velora_it_table",
    ];
    for statement in ddl {
        let result = service.execute_query(&conn, statement).await;
        assert_eq!(result.error, None, "{statement}");
    }

    let inserted = service
        .execute_query(&conn, "INSERT INTO velora_it_table VALUES (1), (2)")
        .await;
    assert!(inserted.columns.is_empty());
    assert_eq!(inserted.row_count, Some(2));

    let tables = service.fetch_schema(&conn).await.unwrap();
    let table = tables.iter().find(|t| t.name == "velora_it_table").unwrap();
    assert_eq!(table.kind, SchemaObjectKind::Table);
    assert_eq!(table.schema.as_deref(), Some("public"));
    let view = tables.iter().find(|t| t.name == "velora_it_view").unwrap();
    assert_eq!(view.kind, SchemaObjectKind::View);
    assert!(tables.iter().all(|t| t.schema.as_deref() != Some("pg_catalog")));
}

#[tokio::test]
async fn test_postgres_error_message_is_forwarded() {
    let service = QueryService::default();
    let conn = postgres();
    if !reachable(&service, &conn, "SELECT 1").await {
        return;
    }

    let result = service
        .execute_query(&conn, "SELECT * FROM velora_missing_relation")
        .await;
    let error = result.error.unwrap();
    assert!(error.contains("velora_missing_relation"), "got {error}");
    assert!(result.rows.is_empty());
}

#[tokio::test]
async fn test_postgres_connection_failure() {
    let service = QueryService::default();
    let mut conn = postgres();
    conn.host = "127.0.0.1".to_string();
    conn.port = 1;

    let result = service.execute_query(&conn, "SELECT 1").await;
    assert!(result.error.is_some());
    assert!(result.columns.is_empty());
}

#[tokio::test]
async fn test_mysql_select_and_schema() {
    let service = QueryService::default();
    let conn = mysql();
    if !reachable(&service, &conn, "SELECT 1").await {
        return;
    }

    let result = service
        .execute_query(&conn, "SELECT 1 AS num, 'hello' AS msg")
        .await;
    assert_eq!(result.error, None);
    assert_eq!(result.columns, vec!["num", "msg"]);
    assert_eq!(result.rows[0][1], CellValue::Text("hello".to_string()));

    for statement in [
        "DROP TABLE IF EXISTS velora_it_table",
        "CREATE TABLE velora_it_table (id INT)",
    ] {
        let result = service.execute_query(&conn, statement).await;
        assert_eq!(result.error, None, "{statement}");
    }
    let inserted = service
        .execute_query(&conn, "INSERT INTO velora_it_table VALUES (1), (2), (3)")
        .await;
    assert_eq!(inserted.row_count, Some(3));

    let tables = service.fetch_schema(&conn).await.unwrap();
    let table = tables.iter().find(|t| t.name == "velora_it_table").unwrap();
    assert_eq!(table.schema.as_deref(), Some(conn.database.as_str()));
    assert_eq!(table.kind, SchemaObjectKind::Table);
}

#[tokio::test]
async fn test_redis_commands() {
    let service = QueryService::default();
    let conn = redis();
    if !reachable(&service, &conn, "PING").await {
        return;
    }

    let set = service
        .execute_query(&conn, "set velora:it:greeting hello")
        .await;
    assert_eq!(set.rows, vec![vec![CellValue::Text("OK".to_string())]]);

    let get = service.execute_query(&conn, "GET velora:it:greeting").await;
    assert_eq!(get.columns, vec!["Result"]);
    assert_eq!(get.rows, vec![vec![CellValue::Text("hello".to_string())]]);
    assert_eq!(get.row_count, Some(1));

    let missing = service.execute_query(&conn, "GET velora:it:absent").await;
    assert_eq!(missing.rows, vec![vec![CellValue::Text("null".to_string())]]);

    let keys = service.fetch_schema(&conn).await.unwrap();
    assert!(keys
        .iter()
        .any(|k| k.name == "velora:it:greeting" && k.kind == SchemaObjectKind::Key));
}

#[tokio::test]
async fn test_mongo_queries() {
    let Some(conn) = mongo() else {
        eprintln!("Skipping test: TEST_MONGO_HOST not set");
        return;
    };
    let service = QueryService::default();

    let setup = json!({"collection": "velora_it_orders", "limit": 1}).to_string();
    if !reachable(&service, &conn, &setup).await {
        return;
    }

    let bare = service.execute_query(&conn, "velora_it_orders").await;
    assert_eq!(bare.error, None);

    let limited = json!({"collection": "velora_it_orders", "limit": 5}).to_string();
    let result = service.execute_query(&conn, &limited).await;
    assert_eq!(result.error, None);
    assert!(result.rows.len() <= 5);

    let no_collection = service.execute_query(&conn, r#"{"filter": {}}"#).await;
    assert_eq!(no_collection.error, None);
    assert!(no_collection.columns.is_empty());
    assert!(no_collection.rows.is_empty());

    assert!(service.fetch_schema(&conn).await.is_ok());
}
