//! MongoDB adapter
//!
//! A query is either a bare collection name or a JSON object
//! `{"collection": ..., "filter": ..., "projection": ..., "limit": ...}`.
//! The query timeout travels to the server as `maxTimeMS`.

use crate::db::connection::{Connection, encode_credential};
use crate::db::provider::Adapter;
use crate::db::types::{
    CellValue, MONGO_DEFAULT_LIMIT, QueryLimits, QueryResult, Row, SchemaObject,
    SchemaObjectKind,
};
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::Client;
use mongodb::bson::{Bson, Document};
use serde_json::Value;

/// MongoDB adapter
pub struct MongoAdapter;

/// What a MongoDB query asks for
#[derive(Debug, Clone, PartialEq)]
enum MongoRequest {
    /// Parsed JSON naming a collection
    Find {
        collection: String,
        filter: Document,
        projection: Option<Document>,
        limit: i64,
    },
    /// Plain text taken as a collection name
    Collection(String),
    /// Valid JSON without a usable `collection`
    Nothing,
}

/// Interpret query text. Text that is not JSON is a collection name.
fn parse_request(query: &str, max_rows: usize) -> DbResult<MongoRequest> {
    let max_rows = i64::try_from(max_rows).unwrap_or(i64::MAX);

    let parsed = match serde_json::from_str::<Value>(query) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Ok(MongoRequest::Nothing),
        Err(_) => {
            let name = query.trim();
            if name.is_empty() {
                return Ok(MongoRequest::Nothing);
            }
            return Ok(MongoRequest::Collection(name.to_string()));
        }
    };

    let collection = match parsed.get("collection") {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        _ => return Ok(MongoRequest::Nothing),
    };

    let filter = to_document(parsed.get("filter"), "filter")?.unwrap_or_default();
    let projection = to_document(parsed.get("projection"), "projection")?;
    let limit = match requested_limit(parsed.get("limit")) {
        Some(requested) => (requested as i64).min(max_rows),
        None => MONGO_DEFAULT_LIMIT.min(max_rows),
    };

    Ok(MongoRequest::Find {
        collection,
        filter,
        projection,
        limit,
    })
}

/// Numbers, or strings holding a number (`"5"`).
fn requested_limit(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Extended JSON object to BSON document; `null` or missing means none.
fn to_document(value: Option<&Value>, field: &str) -> DbResult<Option<Document>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v @ Value::Object(_)) => match Bson::try_from(v.clone()) {
            Ok(Bson::Document(doc)) => Ok(Some(doc)),
            Ok(_) => Err(DbError::QueryFailed(format!("{field} must be an object"))),
            Err(e) => Err(DbError::QueryFailed(format!("Invalid {field}: {e}"))),
        },
        Some(_) => Err(DbError::QueryFailed(format!("{field} must be an object"))),
    }
}

/// `mongodb://[user:pass@]host:port/db[?tls=true]`
fn connection_uri(connection: &Connection) -> String {
    let credentials = if connection.username.is_empty() {
        String::new()
    } else {
        format!(
            "{}:{}@",
            encode_credential(&connection.username),
            encode_credential(&connection.password)
        )
    };
    let mut uri = format!(
        "mongodb://{}{}:{}/{}",
        credentials, connection.host, connection.port, connection.database
    );
    if connection.ssl {
        uri.push_str("?tls=true");
    }
    uri
}

async fn open(connection: &Connection) -> DbResult<Client> {
    Client::with_uri_str(connection_uri(connection))
        .await
        .map_err(|e| DbError::ConnectionFailed(e.to_string()))
}

#[async_trait]
impl Adapter for MongoAdapter {
    async fn execute(
        &self,
        connection: &Connection,
        query: &str,
        limits: &QueryLimits,
    ) -> DbResult<QueryResult> {
        let request = parse_request(query, limits.max_rows)?;
        if request == MongoRequest::Nothing {
            return Ok(QueryResult::new(Vec::new(), Vec::new(), 0));
        }

        let client = open(connection).await?;
        let result = run_find(&client, &connection.database, request, limits).await;
        client.shutdown().await;
        result
    }

    async fn list_schema(&self, connection: &Connection) -> DbResult<Vec<SchemaObject>> {
        let client = open(connection).await?;
        let names = client
            .database(&connection.database)
            .list_collection_names()
            .await;
        client.shutdown().await;

        let names = names.map_err(|e| DbError::SchemaLoadFailed(e.to_string()))?;
        Ok(names
            .into_iter()
            .map(|name| SchemaObject::new(name, SchemaObjectKind::Collection))
            .collect())
    }
}

async fn run_find(
    client: &Client,
    database: &str,
    request: MongoRequest,
    limits: &QueryLimits,
) -> DbResult<QueryResult> {
    let (collection, filter, projection, limit) = match request {
        MongoRequest::Find {
            collection,
            filter,
            projection,
            limit,
        } => (collection, filter, projection, limit),
        MongoRequest::Collection(name) => (
            name,
            Document::new(),
            None,
            i64::try_from(limits.max_rows).unwrap_or(i64::MAX),
        ),
        MongoRequest::Nothing => return Ok(QueryResult::new(Vec::new(), Vec::new(), 0)),
    };

    let query_err = |e: mongodb::error::Error| DbError::QueryFailed(e.to_string());

    let coll = client.database(database).collection::<Document>(&collection);
    let mut find = coll.find(filter).limit(limit).max_time(limits.timeout);
    if let Some(projection) = projection {
        find = find.projection(projection);
    }
    let cursor = find.await.map_err(query_err)?;
    let documents: Vec<Document> = cursor.try_collect().await.map_err(query_err)?;

    Ok(documents_to_result(&documents))
}

/// Columns are the keys of the first document, in its field order.
fn documents_to_result(documents: &[Document]) -> QueryResult {
    let Some(first) = documents.first() else {
        return QueryResult::new(Vec::new(), Vec::new(), 0);
    };
    let columns: Vec<String> = first.keys().cloned().collect();

    let rows: Vec<Row> = documents
        .iter()
        .map(|doc| {
            columns
                .iter()
                .map(|column| doc.get(column).map_or(CellValue::Null, bson_to_cell))
                .collect()
        })
        .collect();

    QueryResult::new(columns, rows, documents.len())
}

/// Scalars map directly; nested documents and arrays become JSON text.
fn bson_to_cell(value: &Bson) -> CellValue {
    match value {
        Bson::Null | Bson::Undefined => CellValue::Null,
        Bson::Boolean(b) => CellValue::Boolean(*b),
        Bson::Int32(i) => CellValue::Integer(*i as i64),
        Bson::Int64(i) => CellValue::Integer(*i),
        Bson::Double(f) => CellValue::Float(*f),
        Bson::String(s) => CellValue::Text(s.clone()),
        Bson::ObjectId(oid) => CellValue::Text(oid.to_hex()),
        Bson::DateTime(dt) => CellValue::DateTime(
            dt.try_to_rfc3339_string()
                .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        ),
        other => CellValue::Text(other.clone().into_relaxed_extjson().to_string()),
    }
}
