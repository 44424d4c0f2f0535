//! Database adapter trait
//!
//! Defines the interface every backend implements. An adapter owns nothing
//! between calls: each call opens its own session from the supplied
//! [`Connection`] and closes it on every exit path, success or failure.

use crate::db::connection::{Connection, DatabaseType};
use crate::db::mongodb::MongoAdapter;
use crate::db::mysql::MySqlAdapter;
use crate::db::postgres::PostgresAdapter;
use crate::db::redis::RedisAdapter;
use crate::db::sqlite::SqliteAdapter;
use crate::db::types::{QueryLimits, QueryResult, SchemaObject};
use crate::error::DbResult;
use async_trait::async_trait;

/// Main database adapter trait
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Run one query or command and return its tabular result.
    ///
    /// # Errors
    /// Returns `DbError::ConnectionFailed` if no session can be opened and
    /// `DbError::QueryFailed` with the driver's message if the query fails.
    async fn execute(
        &self,
        connection: &Connection,
        query: &str,
        limits: &QueryLimits,
    ) -> DbResult<QueryResult>;

    /// List the browsable objects of the target database.
    ///
    /// # Errors
    /// Returns `DbError::SchemaLoadFailed` if introspection fails
    async fn list_schema(&self, connection: &Connection) -> DbResult<Vec<SchemaObject>>;
}

/// The adapter for a backend.
pub fn adapter_for(db_type: DatabaseType) -> &'static dyn Adapter {
    match db_type {
        DatabaseType::Postgresql => &PostgresAdapter,
        DatabaseType::Mysql => &MySqlAdapter,
        DatabaseType::Sqlite => &SqliteAdapter,
        DatabaseType::Mongodb => &MongoAdapter,
        DatabaseType::Redis => &RedisAdapter,
    }
}
