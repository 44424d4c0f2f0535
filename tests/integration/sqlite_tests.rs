//! Integration tests for the SQLite adapter through the execution service
//!
//! Each test works on its own temporary database file.

use crate::common::{seed_people, sqlite_connection};
use tempfile::tempdir;
use velora::db::types::{CellValue, QueryLimits, SchemaObjectKind};
use velora::service::QueryService;

#[tokio::test]
async fn test_select_literal() {
    let dir = tempdir().unwrap();
    let service = QueryService::default();
    let result = service
        .execute_query(&sqlite_connection(&dir), "SELECT 1 AS x")
        .await;

    assert_eq!(result.error, None);
    assert_eq!(result.columns, vec!["x"]);
    assert_eq!(result.rows, vec![vec![CellValue::Integer(1)]]);
    assert_eq!(result.row_count, Some(1));
    assert!(result.execution_time.is_some());
}

#[tokio::test]
async fn test_insert_reports_affected_rows() {
    let dir = tempdir().unwrap();
    let service = QueryService::default();
    let conn = sqlite_connection(&dir);

    let created = service.execute_query(&conn, "CREATE TABLE t (a INTEGER)").await;
    assert_eq!(created.error, None);

    let result = service
        .execute_query(&conn, "INSERT INTO t(a) VALUES (1)")
        .await;
    assert_eq!(result.error, None);
    assert!(result.columns.is_empty());
    assert!(result.rows.is_empty());
    assert_eq!(result.row_count, Some(1));
}

#[tokio::test]
async fn test_typed_cells() {
    let dir = tempdir().unwrap();
    let service = QueryService::default();
    let conn = sqlite_connection(&dir);
    seed_people(&service, &conn).await;

    let result = service
        .execute_query(&conn, "select id, name, score from people order by id")
        .await;
    assert_eq!(result.error, None);
    assert_eq!(result.columns, vec!["id", "name", "score"]);
    assert_eq!(result.rows.len(), 3);
    assert_eq!(
        result.rows[0],
        vec![
            CellValue::Integer(1),
            CellValue::Text("Ada".to_string()),
            CellValue::Float(91.5)
        ]
    );
    assert_eq!(result.rows[2][2], CellValue::Null);
    for row in &result.rows {
        assert_eq!(row.len(), result.columns.len());
    }
}

#[tokio::test]
async fn test_empty_select_has_no_columns() {
    let dir = tempdir().unwrap();
    let service = QueryService::default();
    let conn = sqlite_connection(&dir);
    seed_people(&service, &conn).await;

    let result = service
        .execute_query(&conn, "SELECT * FROM people WHERE id > 100")
        .await;
    assert_eq!(result.error, None);
    assert!(result.columns.is_empty());
    assert!(result.rows.is_empty());
    assert_eq!(result.row_count, Some(0));
}

#[tokio::test]
async fn test_error_result_shape() {
    let dir = tempdir().unwrap();
    let service = QueryService::default();
    let result = service
        .execute_query(&sqlite_connection(&dir), "SELECT * FROM missing_table")
        .await;

    let error = result.error.expect("query should fail");
    assert!(error.contains("missing_table"), "got {error}");
    assert!(result.columns.is_empty());
    assert!(result.rows.is_empty());
    assert!(result.execution_time.is_some());
}

#[tokio::test]
async fn test_row_cap_applied() {
    let dir = tempdir().unwrap();
    let conn = sqlite_connection(&dir);
    let service = QueryService::new(QueryLimits {
        max_rows: 2,
        ..QueryLimits::default()
    });
    seed_people(&service, &conn).await;

    let result = service
        .execute_query(&conn, "SELECT id FROM people ORDER BY id")
        .await;
    assert_eq!(result.rows, vec![vec![CellValue::Integer(1)], vec![CellValue::Integer(2)]]);
    assert_eq!(result.row_count, Some(3));
    assert_eq!(
        result.truncated_message.as_deref(),
        Some("Results limited to 2 of 3 rows")
    );
}

#[tokio::test]
async fn test_schema_lists_tables_and_views() {
    let dir = tempdir().unwrap();
    let service = QueryService::default();
    let conn = sqlite_connection(&dir);
    seed_people(&service, &conn).await;

    let tables = service.fetch_schema(&conn).await.unwrap();
    let names: Vec<(&str, SchemaObjectKind)> =
        tables.iter().map(|t| (t.name.as_str(), t.kind)).collect();
    assert_eq!(
        names,
        vec![
            ("high_scorers", SchemaObjectKind::View),
            ("people", SchemaObjectKind::Table),
        ]
    );
    assert!(tables.iter().all(|t| t.schema.is_none()));
}

#[tokio::test]
async fn test_missing_path_is_an_error() {
    let service = QueryService::default();
    let conn = velora::db::Connection::new(velora::db::DatabaseType::Sqlite, "empty", "", "");

    let result = service.execute_query(&conn, "SELECT 1").await;
    assert_eq!(
        result.error.as_deref(),
        Some("SQLite database path is required")
    );
    assert!(service.fetch_schema(&conn).await.is_err());
}

#[tokio::test]
async fn test_slow_query_times_out() {
    let dir = tempdir().unwrap();
    let service = QueryService::new(QueryLimits {
        timeout: std::time::Duration::from_millis(1),
        ..QueryLimits::default()
    });
    let query = "SELECT count(*) FROM (WITH RECURSIVE n(i) AS \
                 (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 50000000) SELECT i FROM n)";

    let result = service.execute_query(&sqlite_connection(&dir), query).await;
    assert_eq!(result.error.as_deref(), Some("Query timed out after 0.001s"));
    assert!(result.columns.is_empty());
    assert!(result.rows.is_empty());
    assert!(result.execution_time.is_some());
}
