//! Database type definitions
//!
//! The backend-independent shapes every adapter produces: cell values,
//! tabular query results and schema objects. Serialized field names are
//! camelCase so the in-process, bridge and HTTP paths share one wire shape.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default wall-clock limit for one query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Default maximum number of rows returned to a caller.
pub const DEFAULT_MAX_ROWS: usize = 10_000;

/// Documents fetched by a MongoDB query that names no limit.
pub const MONGO_DEFAULT_LIMIT: i64 = 100;

/// Column types adapters decode by
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    // Integer types
    SmallInt,
    Integer,
    BigInt,
    UnsignedBigInt,

    // Floating point
    Real,
    Double,
    Numeric,

    Text,
    Boolean,

    // Date/time types
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,

    // JSON types
    Json,
    Jsonb,

    Bytea,
    Uuid,
    Array(Box<DataType>),

    // Other/unknown types
    Unknown(String),
}

/// A single result row, values in column order
pub type Row = Vec<CellValue>;

/// A cell value (single column value in a row)
///
/// On the wire a cell is plain JSON: `null`, a number, a string, a boolean,
/// an array or an object. Binary data travels as a `\x`-prefixed hex string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "serde_json::Value", from = "serde_json::Value")]
pub enum CellValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),

    /// JSON value (parsed)
    Json(serde_json::Value),

    Binary(Vec<u8>),

    /// Date/time rendered as text
    DateTime(String),

    Uuid(String),
    Array(Vec<CellValue>),
}

impl CellValue {
    /// Get a display string for this cell value (truncated if needed)
    pub fn display_string(&self, max_len: usize) -> String {
        let full = match self {
            CellValue::Null => "NULL".to_string(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Text(s) | CellValue::DateTime(s) | CellValue::Uuid(s) => s.clone(),
            CellValue::Boolean(b) => b.to_string(),
            CellValue::Json(v) => v.to_string(),
            CellValue::Binary(b) => format!("<binary {} bytes>", b.len()),
            CellValue::Array(arr) => {
                let items: Vec<String> = arr.iter().map(|v| v.display_string(max_len)).collect();
                format!("{{{}}}", items.join(","))
            }
        };

        if full.chars().count() > max_len {
            let kept: String = full.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        } else {
            full
        }
    }

    /// Check if this is a NULL value
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl From<CellValue> for serde_json::Value {
    fn from(cell: CellValue) -> Self {
        use serde_json::Value;
        match cell {
            CellValue::Null => Value::Null,
            CellValue::Integer(i) => Value::from(i),
            CellValue::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(f.to_string())),
            CellValue::Text(s) | CellValue::DateTime(s) | CellValue::Uuid(s) => Value::String(s),
            CellValue::Boolean(b) => Value::Bool(b),
            CellValue::Json(v) => v,
            CellValue::Binary(bytes) => Value::String(format!("\\x{}", hex_encode(&bytes))),
            CellValue::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
        }
    }
}

impl From<serde_json::Value> for CellValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => CellValue::Null,
            Value::Bool(b) => CellValue::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => CellValue::Integer(i),
                None => CellValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => CellValue::Text(s),
            Value::Array(items) => CellValue::Array(items.into_iter().map(CellValue::from).collect()),
            object @ Value::Object(_) => CellValue::Json(object),
        }
    }
}

/// Lowercase hex encoding for binary cells
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut hex = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(hex, "{:02x}", b);
    }
    hex
}

/// Outcome of one query.
///
/// A failed query is still a `QueryResult`: `columns` and `rows` are empty and
/// `error` carries the message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Full row count before truncation, or rows affected by a write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    /// Wall-clock milliseconds, measured by the execution service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated_message: Option<String>,
}

impl QueryResult {
    /// Tabular result with an explicit row count.
    pub fn new(columns: Vec<String>, rows: Vec<Row>, row_count: usize) -> Self {
        Self {
            columns,
            rows,
            row_count: Some(row_count),
            ..Default::default()
        }
    }

    /// Result of a statement that returns no rows.
    pub fn affected(row_count: usize) -> Self {
        Self::new(Vec::new(), Vec::new(), row_count)
    }

    /// Failed query carrying its message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_execution_time(mut self, elapsed: Duration) -> Self {
        self.execution_time = Some(elapsed.as_millis() as u64);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Kind of a browsable object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaObjectKind {
    Table,
    View,
    Collection,
    Key,
}

impl SchemaObjectKind {
    /// Classify an `information_schema` `table_type`: `VIEW` is a view,
    /// everything else a table.
    pub fn from_table_type(table_type: &str) -> Self {
        if table_type == "VIEW" {
            SchemaObjectKind::View
        } else {
            SchemaObjectKind::Table
        }
    }
}

/// One browsable object: a table, view, collection or key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaObject {
    pub name: String,
    /// Owning namespace (PostgreSQL schema, MySQL database)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(rename = "type")]
    pub kind: SchemaObjectKind,
}

impl SchemaObject {
    pub fn new(name: impl Into<String>, kind: SchemaObjectKind) -> Self {
        Self {
            name: name.into(),
            schema: None,
            kind,
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

/// Schema listing as returned across a transport boundary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaResponse {
    pub tables: Vec<SchemaObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SchemaResponse {
    pub fn ok(tables: Vec<SchemaObject>) -> Self {
        Self {
            tables,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            tables: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// Bounds applied to every query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub timeout: Duration,
    pub max_rows: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_QUERY_TIMEOUT,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}
