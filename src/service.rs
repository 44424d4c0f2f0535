//! Query execution and schema introspection
//!
//! [`QueryService`] is the single entry point every transport calls. It picks
//! the adapter for a connection, bounds the query by the configured timeout,
//! caps the returned rows and measures wall-clock time. Query failures come
//! back as data in [`QueryResult::error`], never as a Rust error.

use crate::db::connection::Connection;
use crate::db::provider::adapter_for;
use crate::db::types::{QueryLimits, QueryResult, SchemaObject};
use crate::error::{DbError, DbResult};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs queries and schema listings against any supported backend
#[derive(Debug, Clone, Default)]
pub struct QueryService {
    limits: QueryLimits,
}

impl QueryService {
    pub fn new(limits: QueryLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    /// Execute one query and always return a result.
    pub async fn execute_query(&self, connection: &Connection, query: &str) -> QueryResult {
        let start = Instant::now();
        info!(
            connection = %connection.name,
            db_type = %connection.db_type,
            target = %connection.target(),
            "executing query"
        );

        let result = match self.dispatch(connection, query).await {
            Ok(result) => apply_row_cap(result, self.limits.max_rows),
            Err(e) => {
                warn!(connection = %connection.name, error = %e, "query failed");
                QueryResult::failure(e.message())
            }
        };

        let result = result.with_execution_time(start.elapsed());
        debug!(
            connection = %connection.name,
            rows = result.rows.len(),
            elapsed_ms = result.execution_time,
            "query finished"
        );
        result
    }

    async fn dispatch(&self, connection: &Connection, query: &str) -> DbResult<QueryResult> {
        let adapter = adapter_for(connection.db_type);
        if connection.db_type.has_server_side_timeout() {
            return adapter.execute(connection, query, &self.limits).await;
        }

        let connection = connection.clone();
        let query = query.to_string();
        let limits = self.limits;
        with_timeout(self.limits.timeout, async move {
            adapter.execute(&connection, &query, &limits).await
        })
        .await
    }

    /// List the browsable objects of a database. Not bounded by the
    /// query timeout or row cap.
    pub async fn fetch_schema(&self, connection: &Connection) -> DbResult<Vec<SchemaObject>> {
        info!(
            connection = %connection.name,
            db_type = %connection.db_type,
            target = %connection.target(),
            "loading schema"
        );
        let tables = adapter_for(connection.db_type)
            .list_schema(connection)
            .await
            .inspect_err(|e| warn!(connection = %connection.name, error = %e, "schema load failed"))?;
        debug!(connection = %connection.name, objects = tables.len(), "schema loaded");
        Ok(tables)
    }
}

/// Race `work` against `limit`.
///
/// The work runs as its own task. When the timer wins the caller gets
/// [`DbError::Timeout`] immediately; the task is left to finish in the
/// background so it still closes its own connection.
pub async fn with_timeout<T, F>(limit: Duration, work: F) -> DbResult<T>
where
    F: Future<Output = DbResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::spawn(work);
    match tokio::time::timeout(limit, task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) => Err(DbError::QueryFailed(format!(
            "Query task failed: {join_error}"
        ))),
        Err(_) => {
            warn!(timeout_ms = limit.as_millis() as u64, "query timed out");
            Err(DbError::Timeout(limit))
        }
    }
}

/// Keep at most `max_rows` rows.
///
/// A truncated result keeps its full `row_count` and gains a
/// `truncated_message`; results within the cap are returned unchanged.
pub fn apply_row_cap(mut result: QueryResult, max_rows: usize) -> QueryResult {
    if result.rows.len() <= max_rows {
        return result;
    }

    let full_count = result.row_count.unwrap_or(result.rows.len());
    result.rows.truncate(max_rows);
    result.row_count = Some(full_count);
    result.truncated_message = Some(format!(
        "Results limited to {} of {} rows",
        group_thousands(max_rows),
        group_thousands(full_count)
    ));
    result
}

/// `12345` becomes `12,345`.
fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
