//! Redis adapter
//!
//! A query is one whitespace-separated command line. The reply is returned
//! as a single `Result` cell: string replies verbatim, anything else as
//! JSON text.

use crate::db::connection::{Connection, encode_credential};
use crate::db::provider::Adapter;
use crate::db::types::{CellValue, QueryLimits, QueryResult, SchemaObject, SchemaObjectKind};
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use serde_json::Value as Json;

/// Keys fetched per SCAN round trip while listing the keyspace
const SCAN_BATCH: usize = 1000;

/// Redis adapter
pub struct RedisAdapter;

/// `redis://[:password@]host:port`
fn connection_url(connection: &Connection) -> String {
    if connection.password.is_empty() {
        format!("redis://{}:{}", connection.host, connection.port)
    } else {
        format!(
            "redis://:{}@{}:{}",
            encode_credential(&connection.password),
            connection.host,
            connection.port
        )
    }
}

async fn open(connection: &Connection) -> DbResult<MultiplexedConnection> {
    let connect_err = |e: redis::RedisError| DbError::ConnectionFailed(e.to_string());
    let client = redis::Client::open(connection_url(connection)).map_err(connect_err)?;
    client
        .get_multiplexed_async_connection()
        .await
        .map_err(connect_err)
}

/// Split a command line into an upper-cased command and its arguments.
fn parse_command(query: &str) -> DbResult<(String, Vec<&str>)> {
    let mut parts = query.split_whitespace();
    let command = parts
        .next()
        .ok_or_else(|| DbError::QueryFailed("Redis command is required".to_string()))?;
    Ok((command.to_uppercase(), parts.collect()))
}

#[async_trait]
impl Adapter for RedisAdapter {
    async fn execute(
        &self,
        connection: &Connection,
        query: &str,
        _limits: &QueryLimits,
    ) -> DbResult<QueryResult> {
        let (command, args) = parse_command(query)?;
        let mut cmd = redis::cmd(&command);
        for arg in args {
            cmd.arg(arg);
        }

        let mut conn = open(connection).await?;
        let reply: redis::RedisResult<redis::Value> = cmd.query_async(&mut conn).await;
        drop(conn);

        let reply = reply.map_err(|e| DbError::QueryFailed(e.to_string()))?;
        Ok(QueryResult::new(
            vec!["Result".to_string()],
            vec![vec![reply_to_cell(reply)]],
            1,
        ))
    }

    async fn list_schema(&self, connection: &Connection) -> DbResult<Vec<SchemaObject>> {
        let mut conn = open(connection).await?;
        let keys = scan_keys(&mut conn).await;
        drop(conn);

        let mut keys = keys.map_err(|e| DbError::SchemaLoadFailed(e.to_string()))?;
        keys.sort();
        keys.dedup();
        Ok(keys
            .into_iter()
            .map(|key| SchemaObject::new(key, SchemaObjectKind::Key))
            .collect())
    }
}

/// Walk the keyspace with SCAN; it may repeat keys, callers dedup.
async fn scan_keys(conn: &mut MultiplexedConnection) -> redis::RedisResult<Vec<String>> {
    let mut keys = Vec::new();
    let mut cursor: u64 = 0;
    loop {
        let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg("*")
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(conn)
            .await?;
        keys.extend(batch);
        if next == 0 {
            return Ok(keys);
        }
        cursor = next;
    }
}

fn reply_to_cell(reply: redis::Value) -> CellValue {
    match reply_to_json(reply) {
        Json::String(s) => CellValue::Text(s),
        other => CellValue::Text(other.to_string()),
    }
}

fn reply_to_json(reply: redis::Value) -> Json {
    use redis::Value;
    match reply {
        Value::Nil => Json::Null,
        Value::Int(i) => Json::from(i),
        Value::BulkString(bytes) => Json::String(String::from_utf8_lossy(&bytes).into_owned()),
        Value::SimpleString(s) => Json::String(s),
        Value::Okay => Json::String("OK".to_string()),
        Value::Array(items) | Value::Set(items) => {
            Json::Array(items.into_iter().map(reply_to_json).collect())
        }
        Value::Map(pairs) => Json::Object(
            pairs
                .into_iter()
                .map(|(k, v)| (reply_to_key(k), reply_to_json(v)))
                .collect(),
        ),
        Value::Double(f) => serde_json::Number::from_f64(f)
            .map(Json::Number)
            .unwrap_or_else(|| Json::String(f.to_string())),
        Value::Boolean(b) => Json::Bool(b),
        Value::VerbatimString { text, .. } => Json::String(text),
        other => Json::String(format!("{other:?}")),
    }
}

fn reply_to_key(key: redis::Value) -> String {
    match reply_to_json(key) {
        Json::String(s) => s,
        other => other.to_string(),
    }
}
