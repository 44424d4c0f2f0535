//! SQLite adapter
//!
//! Opens the database file named by the connection for each call. Queries
//! whose first keyword is `SELECT` return rows; anything else runs as a
//! write and reports the number of rows changed.

use crate::db::connection::Connection;
use crate::db::provider::Adapter;
use crate::db::sqlx_message;
use crate::db::types::{
    CellValue, QueryLimits, QueryResult, Row, SchemaObject, SchemaObjectKind,
};
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Row as _, TypeInfo, ValueRef};
use tracing::warn;

const SCHEMA_QUERY: &str = "SELECT name, type FROM sqlite_master \
     WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
     ORDER BY name";

/// SQLite adapter
pub struct SqliteAdapter;

/// Case-insensitive check for a leading `SELECT` keyword.
pub(crate) fn is_select(query: &str) -> bool {
    query
        .trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
}

async fn open(connection: &Connection) -> DbResult<SqliteConnection> {
    let path = connection.sqlite_path();
    if path.is_empty() {
        return Err(DbError::ConnectionFailed(
            "SQLite database path is required".to_string(),
        ));
    }
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .connect()
        .await
        .map_err(|e| DbError::ConnectionFailed(sqlx_message(&e)))
}

async fn close(conn: SqliteConnection) {
    use sqlx::Connection as _;
    if let Err(e) = conn.close().await {
        warn!(error = %e, "failed to close sqlite connection");
    }
}

#[async_trait]
impl Adapter for SqliteAdapter {
    async fn execute(
        &self,
        connection: &Connection,
        query: &str,
        _limits: &QueryLimits,
    ) -> DbResult<QueryResult> {
        let mut conn = open(connection).await?;
        let result = run_statement(&mut conn, query).await;
        close(conn).await;
        result
    }

    async fn list_schema(&self, connection: &Connection) -> DbResult<Vec<SchemaObject>> {
        let mut conn = open(connection).await?;
        let rows = sqlx::query(SCHEMA_QUERY).fetch_all(&mut conn).await;
        close(conn).await;

        let rows = rows.map_err(|e| DbError::SchemaLoadFailed(sqlx_message(&e)))?;
        rows.iter()
            .map(|row| {
                let name: String = row.try_get(0)?;
                let kind: String = row.try_get(1)?;
                let kind = if kind == "view" {
                    SchemaObjectKind::View
                } else {
                    SchemaObjectKind::Table
                };
                Ok(SchemaObject::new(name, kind))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| DbError::SchemaLoadFailed(sqlx_message(&e)))
    }
}

async fn run_statement(conn: &mut SqliteConnection, sql: &str) -> DbResult<QueryResult> {
    let query_err = |e: sqlx::Error| DbError::QueryFailed(sqlx_message(&e));

    if !is_select(sql) {
        let done = sqlx::query(sql)
            .execute(&mut *conn)
            .await
            .map_err(query_err)?;
        return Ok(QueryResult::affected(done.rows_affected() as usize));
    }

    let lite_rows = sqlx::query(sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(query_err)?;

    // Column names come from the first row; an empty result has none.
    let columns: Vec<String> = lite_rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let row_count = lite_rows.len();
    let rows: Vec<Row> = lite_rows
        .iter()
        .map(|row| (0..columns.len()).map(|i| extract_cell_value(row, i)).collect())
        .collect();

    Ok(QueryResult::new(columns, rows, row_count))
}

/// Decode by the value's storage class, not the declared column type.
fn extract_cell_value(row: &SqliteRow, idx: usize) -> CellValue {
    let storage_class = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return CellValue::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return CellValue::Null,
    };

    let decoded = match storage_class.as_str() {
        "INTEGER" => row.try_get_unchecked::<i64, _>(idx).map(CellValue::Integer),
        "REAL" => row.try_get_unchecked::<f64, _>(idx).map(CellValue::Float),
        "BLOB" => row.try_get_unchecked::<Vec<u8>, _>(idx).map(CellValue::Binary),
        _ => row.try_get_unchecked::<String, _>(idx).map(CellValue::Text),
    };

    decoded.unwrap_or_else(|_| CellValue::Text(format!("<unable to display: {}>", storage_class)))
}
