//! MySQL adapter
//!
//! Uses a single sqlx `MySqlConnection` per call. The statement is prepared
//! first so its column list decides between a row-returning query and a
//! write whose affected-row count becomes `rowCount`.

use crate::db::connection::Connection;
use crate::db::provider::Adapter;
use crate::db::sqlx_message;
use crate::db::types::{
    CellValue, DataType, QueryLimits, QueryResult, Row, SchemaObject, SchemaObjectKind,
};
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlSslMode};
use sqlx::{Column, ConnectOptions, Executor, Row as _, Statement, TypeInfo, ValueRef};
use tracing::warn;

const SCHEMA_QUERY: &str = "SELECT CAST(TABLE_SCHEMA AS CHAR) AS table_schema, \
     CAST(TABLE_NAME AS CHAR) AS name, \
     CAST(TABLE_TYPE AS CHAR) AS type \
     FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = ? \
     ORDER BY TABLE_NAME";

/// MySQL adapter
pub struct MySqlAdapter;

fn connect_options(connection: &Connection) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&connection.host)
        .port(connection.port)
        .username(&connection.username)
        .database(&connection.database)
        .ssl_mode(if connection.ssl {
            MySqlSslMode::Required
        } else {
            MySqlSslMode::Disabled
        });
    if !connection.password.is_empty() {
        options = options.password(&connection.password);
    }
    options
}

async fn open(connection: &Connection) -> DbResult<MySqlConnection> {
    connect_options(connection)
        .connect()
        .await
        .map_err(|e| DbError::ConnectionFailed(sqlx_message(&e)))
}

async fn close(conn: MySqlConnection) {
    use sqlx::Connection as _;
    if let Err(e) = conn.close().await {
        warn!(error = %e, "failed to close mysql connection");
    }
}

#[async_trait]
impl Adapter for MySqlAdapter {
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
        let rows = sqlx::query(SCHEMA_QUERY)
            .bind(&connection.database)
            .fetch_all(&mut conn)
            .await;
        close(conn).await;

        let rows = rows.map_err(|e| DbError::SchemaLoadFailed(sqlx_message(&e)))?;
        rows.iter()
            .map(|row| {
                let schema: String = row.try_get(0)?;
                let name: String = row.try_get(1)?;
                let table_type: String = row.try_get(2)?;
                Ok(
                    SchemaObject::new(name, SchemaObjectKind::from_table_type(&table_type))
                        .in_schema(schema),
                )
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| DbError::SchemaLoadFailed(sqlx_message(&e)))
    }
}

async fn run_statement(conn: &mut MySqlConnection, sql: &str) -> DbResult<QueryResult> {
    let query_err = |e: sqlx::Error| DbError::QueryFailed(sqlx_message(&e));

    let stmt = (&mut *conn).prepare(sql).await.map_err(query_err)?;
    let columns: Vec<String> = stmt
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    if columns.is_empty() {
        let done = stmt.query().execute(&mut *conn).await.map_err(query_err)?;
        return Ok(QueryResult::affected(done.rows_affected() as usize));
    }

    let my_rows = stmt.query().fetch_all(&mut *conn).await.map_err(query_err)?;
    let row_count = my_rows.len();
    let rows: Vec<Row> = my_rows
        .iter()
        .map(|row| (0..columns.len()).map(|i| extract_cell_value(row, i)).collect())
        .collect();

    Ok(QueryResult::new(columns, rows, row_count))
}

/// Map a MySQL type name (as sqlx reports it) to our DataType enum
fn mysql_type_to_datatype(type_name: &str) -> DataType {
    match type_name {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => DataType::BigInt,
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => DataType::UnsignedBigInt,
        "FLOAT" => DataType::Real,
        "DOUBLE" => DataType::Double,
        "DECIMAL" => DataType::Numeric,
        "BOOLEAN" => DataType::Boolean,
        "DATE" => DataType::Date,
        "TIME" => DataType::Time,
        "DATETIME" => DataType::Timestamp,
        "TIMESTAMP" => DataType::TimestampTz,
        "JSON" => DataType::Json,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
            DataType::Bytea
        }
        "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            DataType::Text
        }
        other => DataType::Unknown(other.to_string()),
    }
}

/// Extract a cell value from a MySQL row based on the value's reported type.
fn extract_cell_value(row: &MySqlRow, idx: usize) -> CellValue {
    let type_name = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return CellValue::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return CellValue::Null,
    };

    match mysql_type_to_datatype(&type_name) {
        DataType::BigInt => match row.try_get::<i64, _>(idx) {
            Ok(v) => CellValue::Integer(v),
            Err(_) => try_as_string(row, idx, &type_name),
        },
        DataType::UnsignedBigInt => match row.try_get::<u64, _>(idx) {
            Ok(v) => i64::try_from(v)
                .map(CellValue::Integer)
                .unwrap_or_else(|_| CellValue::Text(v.to_string())),
            Err(_) => try_as_string(row, idx, &type_name),
        },
        DataType::Real => match row.try_get::<f32, _>(idx) {
            Ok(v) => CellValue::Float(v as f64),
            Err(_) => try_as_string(row, idx, &type_name),
        },
        DataType::Double => match row.try_get::<f64, _>(idx) {
            Ok(v) => CellValue::Float(v),
            Err(_) => try_as_string(row, idx, &type_name),
        },
        DataType::Numeric => match row.try_get::<rust_decimal::Decimal, _>(idx) {
            Ok(v) => CellValue::Text(v.to_string()),
            Err(_) => try_as_string(row, idx, &type_name),
        },
        DataType::Boolean => match row.try_get::<bool, _>(idx) {
            Ok(v) => CellValue::Boolean(v),
            Err(_) => try_as_string(row, idx, &type_name),
        },
        DataType::Date => match row.try_get::<chrono::NaiveDate, _>(idx) {
            Ok(v) => CellValue::DateTime(v.to_string()),
            Err(_) => try_as_string(row, idx, &type_name),
        },
        DataType::Time => match row.try_get::<chrono::NaiveTime, _>(idx) {
            Ok(v) => CellValue::DateTime(v.to_string()),
            Err(_) => try_as_string(row, idx, &type_name),
        },
        DataType::Timestamp => match row.try_get::<chrono::NaiveDateTime, _>(idx) {
            Ok(v) => CellValue::DateTime(v.to_string()),
            Err(_) => try_as_string(row, idx, &type_name),
        },
        DataType::TimestampTz => match row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx) {
            Ok(v) => CellValue::DateTime(v.to_rfc3339()),
            Err(_) => try_as_string(row, idx, &type_name),
        },
        DataType::Json => match row.try_get::<serde_json::Value, _>(idx) {
            Ok(v) => CellValue::Json(v),
            Err(_) => try_as_string(row, idx, &type_name),
        },
        DataType::Bytea => match row.try_get_unchecked::<Vec<u8>, _>(idx) {
            Ok(v) => CellValue::Binary(v),
            Err(_) => try_as_string(row, idx, &type_name),
        },
        _ => try_as_string(row, idx, &type_name),
    }
}

/// Fallback: the value's text form, or its raw bytes if they are UTF-8.
fn try_as_string(row: &MySqlRow, idx: usize, type_name: &str) -> CellValue {
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return CellValue::Text(v);
    }
    match row.try_get_unchecked::<Vec<u8>, _>(idx) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(text) => CellValue::Text(text),
            Err(e) => CellValue::Binary(e.into_bytes()),
        },
        Err(_) => CellValue::Text(format!("<unable to display: {}>", type_name)),
    }
}
