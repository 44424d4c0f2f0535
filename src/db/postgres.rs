//! PostgreSQL adapter
//!
//! Concrete implementation using tokio-postgres. The query timeout is
//! enforced by the server through `statement_timeout`, set per session.

use crate::db::connection::Connection;
use crate::db::provider::Adapter;
use crate::db::types::{
    CellValue, DataType, QueryLimits, QueryResult, Row, SchemaObject, SchemaObjectKind,
};
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::config::SslMode;
use tokio_postgres::types::Type;
use tokio_postgres::{Client, Config, NoTls};
use tracing::debug;

const SCHEMA_QUERY: &str = "SELECT table_schema, table_name, table_type \
     FROM information_schema.tables \
     WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
     ORDER BY table_schema, table_name";

/// PostgreSQL adapter
pub struct PostgresAdapter;

/// One open client plus the task driving its socket
struct Session {
    client: Client,
    driver: JoinHandle<()>,
}

impl Session {
    async fn open(connection: &Connection, statement_timeout: Option<Duration>) -> DbResult<Self> {
        let config = session_config(connection, statement_timeout);
        let connect_err = |e: tokio_postgres::Error| DbError::ConnectionFailed(pg_message(&e));

        let (client, driver) = if connection.ssl {
            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_tls_config()?);
            let (client, conn) = config.connect(tls).await.map_err(connect_err)?;
            let driver = tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!(error = %e, "postgres connection ended with error");
                }
            });
            (client, driver)
        } else {
            let (client, conn) = config.connect(NoTls).await.map_err(connect_err)?;
            let driver = tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!(error = %e, "postgres connection ended with error");
                }
            });
            (client, driver)
        };

        Ok(Self { client, driver })
    }

    /// Drop the client and wait for the socket to shut down.
    async fn close(self) {
        drop(self.client);
        let _ = self.driver.await;
    }
}

fn session_config(connection: &Connection, statement_timeout: Option<Duration>) -> Config {
    let mut config = Config::new();
    config
        .host(&connection.host)
        .port(connection.port)
        .dbname(&connection.database)
        .user(&connection.username)
        .application_name("velora")
        .ssl_mode(if connection.ssl {
            SslMode::Require
        } else {
            SslMode::Disable
        });
    if !connection.password.is_empty() {
        config.password(&connection.password);
    }
    if let Some(timeout) = statement_timeout {
        config.options(&format!("-c statement_timeout={}", timeout.as_millis()));
    }
    config
}

/// The server's own message when there is one, otherwise the client error.
fn pg_message(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => db.message().to_string(),
        None => e.to_string(),
    }
}

#[async_trait]
impl Adapter for PostgresAdapter {
    async fn execute(
        &self,
        connection: &Connection,
        query: &str,
        limits: &QueryLimits,
    ) -> DbResult<QueryResult> {
        let session = Session::open(connection, Some(limits.timeout)).await?;
        let result = run_statement(&session.client, query).await;
        session.close().await;
        result
    }

    async fn list_schema(&self, connection: &Connection) -> DbResult<Vec<SchemaObject>> {
        let session = Session::open(connection, None).await?;
        let rows = session.client.query(SCHEMA_QUERY, &[]).await;
        session.close().await;

        let rows = rows.map_err(|e| DbError::SchemaLoadFailed(pg_message(&e)))?;
        Ok(rows
            .iter()
            .map(|row| {
                let schema: String = row.get(0);
                let name: String = row.get(1);
                let table_type: String = row.get(2);
                SchemaObject::new(name, SchemaObjectKind::from_table_type(&table_type))
                    .in_schema(schema)
            })
            .collect())
    }
}

async fn run_statement(client: &Client, sql: &str) -> DbResult<QueryResult> {
    let query_err = |e: tokio_postgres::Error| DbError::QueryFailed(pg_message(&e));

    let stmt = client.prepare(sql).await.map_err(query_err)?;

    if stmt.columns().is_empty() {
        let affected = client.execute(&stmt, &[]).await.map_err(query_err)?;
        return Ok(QueryResult::affected(affected as usize));
    }

    let columns: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
    let types: Vec<DataType> = stmt
        .columns()
        .iter()
        .map(|c| pg_type_to_datatype(c.type_()))
        .collect();

    let pg_rows = client.query(&stmt, &[]).await.map_err(query_err)?;

    let row_count = pg_rows.len();
    let rows: Vec<Row> = pg_rows
        .iter()
        .map(|pg_row| {
            types
                .iter()
                .enumerate()
                .map(|(i, data_type)| extract_cell_value(pg_row, i, data_type))
                .collect()
        })
        .collect();

    Ok(QueryResult::new(columns, rows, row_count))
}

/// Map tokio_postgres Type to our DataType enum
fn pg_type_to_datatype(pg_type: &Type) -> DataType {
    match *pg_type {
        Type::INT2 => DataType::SmallInt,
        Type::INT4 => DataType::Integer,
        Type::INT8 => DataType::BigInt,
        Type::FLOAT4 => DataType::Real,
        Type::FLOAT8 => DataType::Double,
        Type::NUMERIC => DataType::Numeric,
        Type::TEXT | Type::NAME | Type::VARCHAR | Type::CHAR | Type::BPCHAR => DataType::Text,
        Type::BOOL => DataType::Boolean,
        Type::DATE => DataType::Date,
        Type::TIME => DataType::Time,
        Type::TIMESTAMP => DataType::Timestamp,
        Type::TIMESTAMPTZ => DataType::TimestampTz,
        Type::INTERVAL => DataType::Interval,
        Type::JSON => DataType::Json,
        Type::JSONB => DataType::Jsonb,
        Type::BYTEA => DataType::Bytea,
        Type::UUID => DataType::Uuid,
        Type::BOOL_ARRAY => DataType::Array(Box::new(DataType::Boolean)),
        Type::INT2_ARRAY => DataType::Array(Box::new(DataType::SmallInt)),
        Type::INT4_ARRAY => DataType::Array(Box::new(DataType::Integer)),
        Type::INT8_ARRAY => DataType::Array(Box::new(DataType::BigInt)),
        Type::FLOAT4_ARRAY => DataType::Array(Box::new(DataType::Real)),
        Type::FLOAT8_ARRAY => DataType::Array(Box::new(DataType::Double)),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::NAME_ARRAY => {
            DataType::Array(Box::new(DataType::Text))
        }
        Type::UUID_ARRAY => DataType::Array(Box::new(DataType::Uuid)),
        Type::JSONB_ARRAY => DataType::Array(Box::new(DataType::Jsonb)),
        Type::JSON_ARRAY => DataType::Array(Box::new(DataType::Json)),
        Type::NUMERIC_ARRAY => DataType::Array(Box::new(DataType::Numeric)),
        _ => DataType::Unknown(pg_type.name().to_string()),
    }
}

/// Build a rustls ClientConfig that trusts OS certificates (with Mozilla roots as fallback)
fn make_tls_config() -> DbResult<rustls::ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    let mut loaded = 0;
    for cert in native_certs.certs {
        if root_store.add(cert).is_ok() {
            loaded += 1;
        }
    }
    if loaded == 0 {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    let provider = std::sync::Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| DbError::ConnectionFailed(format!("TLS setup failed: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(config)
}

/// Extract a cell value from a tokio_postgres Row based on the column's DataType.
///
/// Tries the expected type first and falls back to a string representation
/// if the type doesn't match. Returns `CellValue::Null` only for real NULLs.
fn extract_cell_value(row: &tokio_postgres::Row, idx: usize, data_type: &DataType) -> CellValue {
    match data_type {
        DataType::SmallInt => match row.try_get::<_, Option<i16>>(idx) {
            Ok(Some(v)) => CellValue::Integer(v as i64),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Integer => match row.try_get::<_, Option<i32>>(idx) {
            Ok(Some(v)) => CellValue::Integer(v as i64),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::BigInt => match row.try_get::<_, Option<i64>>(idx) {
            Ok(Some(v)) => CellValue::Integer(v),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Real => match row.try_get::<_, Option<f32>>(idx) {
            Ok(Some(v)) => CellValue::Float(v as f64),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Double => match row.try_get::<_, Option<f64>>(idx) {
            Ok(Some(v)) => CellValue::Float(v),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Numeric => match row.try_get::<_, Option<Decimal>>(idx) {
            Ok(Some(v)) => CellValue::Text(v.to_string()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Boolean => match row.try_get::<_, Option<bool>>(idx) {
            Ok(Some(v)) => CellValue::Boolean(v),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Json | DataType::Jsonb => {
            match row.try_get::<_, Option<serde_json::Value>>(idx) {
                Ok(Some(v)) => CellValue::Json(v),
                Ok(None) => CellValue::Null,
                Err(_) => try_as_string(row, idx),
            }
        }
        DataType::Bytea => match row.try_get::<_, Option<Vec<u8>>>(idx) {
            Ok(Some(v)) => CellValue::Binary(v),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Uuid => match row.try_get::<_, Option<uuid::Uuid>>(idx) {
            Ok(Some(v)) => CellValue::Uuid(v.to_string()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Timestamp => match row.try_get::<_, Option<chrono::NaiveDateTime>>(idx) {
            Ok(Some(v)) => CellValue::DateTime(v.to_string()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::TimestampTz => {
            match row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx) {
                Ok(Some(v)) => CellValue::DateTime(v.to_rfc3339()),
                Ok(None) => CellValue::Null,
                Err(_) => try_as_string(row, idx),
            }
        }
        DataType::Date => match row.try_get::<_, Option<chrono::NaiveDate>>(idx) {
            Ok(Some(v)) => CellValue::DateTime(v.to_string()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Time => match row.try_get::<_, Option<chrono::NaiveTime>>(idx) {
            Ok(Some(v)) => CellValue::DateTime(v.to_string()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        },
        DataType::Array(inner) => extract_array_value(row, idx, inner),
        // Text types and fallback for unknown types
        _ => try_as_string(row, idx),
    }
}

/// Extract an array value from a tokio_postgres Row.
///
/// Tries typed extraction based on inner element type, falling back to
/// a string for types without a direct Rust mapping.
fn extract_array_value(row: &tokio_postgres::Row, idx: usize, inner: &DataType) -> CellValue {
    fn collect<T>(
        row: &tokio_postgres::Row,
        idx: usize,
        to_cell: impl Fn(T) -> CellValue,
    ) -> CellValue
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>,
    {
        match row.try_get::<_, Option<Vec<T>>>(idx) {
            Ok(Some(v)) => CellValue::Array(v.into_iter().map(to_cell).collect()),
            Ok(None) => CellValue::Null,
            Err(_) => try_as_string(row, idx),
        }
    }

    match inner {
        DataType::Text => collect::<String>(row, idx, CellValue::Text),
        DataType::SmallInt => collect::<i16>(row, idx, |n| CellValue::Integer(n as i64)),
        DataType::Integer => collect::<i32>(row, idx, |n| CellValue::Integer(n as i64)),
        DataType::BigInt => collect::<i64>(row, idx, CellValue::Integer),
        DataType::Real => collect::<f32>(row, idx, |n| CellValue::Float(n as f64)),
        DataType::Double => collect::<f64>(row, idx, CellValue::Float),
        DataType::Boolean => collect::<bool>(row, idx, CellValue::Boolean),
        DataType::Uuid => collect::<uuid::Uuid>(row, idx, |u| CellValue::Uuid(u.to_string())),
        DataType::Json | DataType::Jsonb => collect::<serde_json::Value>(row, idx, CellValue::Json),
        DataType::Numeric => collect::<Decimal>(row, idx, |d| CellValue::Text(d.to_string())),
        _ => try_as_string(row, idx),
    }
}

/// Try to extract a value as a string (fallback for type mismatches).
///
/// When even the string fallback fails, includes the postgres type name
/// in the message so the user knows what type couldn't be displayed.
fn try_as_string(row: &tokio_postgres::Row, idx: usize) -> CellValue {
    match row.try_get::<_, Option<String>>(idx) {
        Ok(Some(v)) => CellValue::Text(v),
        Ok(None) => CellValue::Null,
        Err(_) => {
            let type_name = row
                .columns()
                .get(idx)
                .map_or("unknown", |c| c.type_().name());
            CellValue::Text(format!("<unable to display: {}>", type_name))
        }
    }
}
