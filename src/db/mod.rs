//! Database abstraction layer
//!
//! One [`Adapter`] per backend behind a common trait, plus the shared
//! connection and result model they all speak.

pub mod connection;
pub mod mongodb;
pub mod mysql;
pub mod postgres;
pub mod provider;
pub mod redis;
pub mod sqlite;
pub mod types;

// Re-export main types
pub use connection::{Connection, DatabaseType};
pub use provider::{Adapter, adapter_for};
pub use types::{
    CellValue, DataType, QueryLimits, QueryResult, Row, SchemaObject, SchemaObjectKind,
    SchemaResponse,
};

/// The server's own message when there is one, otherwise the client error.
pub(crate) fn sqlx_message(e: &sqlx::Error) -> String {
    match e {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    }
}
