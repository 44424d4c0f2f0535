//! Isolated-process bridge
//!
//! Newline-delimited JSON over any async byte stream. In production the
//! stream is a child process's stdio (`velora ipc`); tests use an in-memory
//! duplex.
//!
//! Request:  `{"id": 1, "channel": "execute-query", "payload": {...}}`
//! Response: `{"id": 1, "result": ...}` or `{"id": 1, "error": "..."}`
//!
//! The server handles requests concurrently, so responses may arrive out of
//! order; the client matches them to callers by `id`.

use crate::db::connection::Connection;
use crate::db::types::{QueryResult, SchemaObject, SchemaResponse};
use crate::error::{TransportError, TransportResult};
use crate::service::QueryService;
use crate::transport::{QueryTransport, handle_execute, handle_fetch_schema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const EXECUTE_QUERY: &str = "execute-query";
pub const FETCH_SCHEMA: &str = "fetch-schema";
pub const WRITE_FILE: &str = "write-file";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub id: u64,
    pub channel: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    /// Absent only when the request line could not be parsed
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BridgeResponse {
    fn ok(id: u64, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Option<u64>, error: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Serve bridge requests read from `reader` until it closes.
///
/// Returns once every in-flight request has been answered.
pub async fn serve<R, W>(service: Arc<QueryService>, reader: R, writer: W) -> io::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<BridgeResponse>();

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(response) = rx.recv().await {
            let mut line = serde_json::to_string(&response)?;
            line.push('\n');
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await?;
        }
        Ok::<_, io::Error>(())
    });

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let service = Arc::clone(&service);
        let tx = tx.clone();
        tokio::spawn(async move {
            let response = handle_line(&service, &line).await;
            let _ = tx.send(response);
        });
    }
    drop(tx);
    debug!("bridge input closed, draining responses");

    writer_task.await.map_err(io::Error::other)?
}

async fn handle_line(service: &QueryService, line: &str) -> BridgeResponse {
    let request: BridgeRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "malformed bridge request");
            return BridgeResponse::err(None, format!("Malformed request: {e}"));
        }
    };
    debug!(id = request.id, channel = %request.channel, "bridge request");

    let result = match request.channel.as_str() {
        EXECUTE_QUERY => serde_json::to_value(handle_execute(service, &request.payload).await),
        FETCH_SCHEMA => serde_json::to_value(handle_fetch_schema(service, &request.payload).await),
        WRITE_FILE => Ok(write_file(&request.payload).await),
        other => {
            return BridgeResponse::err(
                Some(request.id),
                format!("No handler registered for '{other}'"),
            );
        }
    };

    match result {
        Ok(value) => BridgeResponse::ok(request.id, value),
        Err(e) => BridgeResponse::err(Some(request.id), e.to_string()),
    }
}

/// `{filePath, data}` to `{success, error?}`
async fn write_file(payload: &Value) -> Value {
    let path = payload.get("filePath").and_then(Value::as_str);
    let data = payload.get("data").and_then(Value::as_str);
    let (Some(path), Some(data)) = (path, data) else {
        return json!({"success": false, "error": "filePath and data are required"});
    };
    match tokio::fs::write(path, data).await {
        Ok(()) => json!({"success": true}),
        Err(e) => json!({"success": false, "error": e.to_string()}),
    }
}

/// Command-line arguments for a `velora ipc` child.
pub fn child_args(settings_file: Option<&Path>) -> Vec<OsString> {
    let mut args = Vec::new();
    if let Some(path) = settings_file {
        args.push(OsString::from("--config"));
        args.push(path.as_os_str().to_owned());
    }
    args.push(OsString::from("ipc"));
    args
}

/// Waiting callers by request id; `None` once the response stream has ended
type Pending = Arc<Mutex<Option<HashMap<u64, oneshot::Sender<BridgeResponse>>>>>;

/// Client end of the bridge
pub struct IpcClient {
    writer: Mutex<Box<dyn AsyncWrite + Unpin + Send>>,
    pending: Pending,
    next_id: AtomicU64,
    /// Also owns the child process, if any; aborting it kills the child
    reader_task: JoinHandle<()>,
}

impl IpcClient {
    /// Speak the bridge protocol over an existing stream pair.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::with_child(reader, writer, None)
    }

    fn with_child<R, W>(reader: R, writer: W, child: Option<Child>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: Pending = Arc::new(Mutex::new(Some(HashMap::new())));
        let waiting = Arc::clone(&pending);
        let reader_task = tokio::spawn(async move {
            let _child = child;
            read_responses(reader, waiting).await;
        });
        Self {
            writer: Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            reader_task,
        }
    }

    /// Launch `program [--config FILE] ipc` and talk to it over its stdio.
    ///
    /// Passing the caller's settings file keeps the child's timeout and row
    /// cap in line with the parent's.
    pub fn spawn(program: &Path, settings_file: Option<&Path>) -> TransportResult<Self> {
        let mut child = Command::new(program)
            .args(child_args(settings_file))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        let stdin = child.stdin.take().ok_or(TransportError::Closed)?;
        let stdout = child.stdout.take().ok_or(TransportError::Closed)?;
        Ok(Self::with_child(stdout, stdin, Some(child)))
    }

    /// Send one request on `channel` and wait for its response.
    pub async fn invoke(&self, channel: &str, payload: Value) -> TransportResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        match self.pending.lock().await.as_mut() {
            Some(waiting) => waiting.insert(id, tx),
            None => return Err(TransportError::Closed),
        };

        let request = BridgeRequest {
            id,
            channel: channel.to_string(),
            payload,
        };
        if let Err(e) = self.send(&request).await {
            if let Some(waiting) = self.pending.lock().await.as_mut() {
                waiting.remove(&id);
            }
            return Err(e);
        }

        let response = rx.await.map_err(|_| TransportError::Closed)?;
        match response {
            BridgeResponse {
                error: Some(error), ..
            } => Err(TransportError::Remote(error)),
            BridgeResponse { result, .. } => Ok(result.unwrap_or(Value::Null)),
        }
    }

    async fn send(&self, request: &BridgeRequest) -> TransportResult<()> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Drop for IpcClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Route each response line to the caller waiting on its id. When the stream
/// ends, every waiting caller sees [`TransportError::Closed`].
async fn read_responses<R>(reader: R, pending: Pending)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "bridge read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let response: BridgeResponse = match serde_json::from_str(&line) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "malformed bridge response");
                continue;
            }
        };
        let Some(id) = response.id else {
            warn!(error = ?response.error, "bridge response without id");
            continue;
        };
        let waiter = pending.lock().await.as_mut().and_then(|w| w.remove(&id));
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(response);
            }
            None => debug!(id, "bridge response for unknown request"),
        }
    }
    pending.lock().await.take();
}

#[async_trait]
impl QueryTransport for IpcClient {
    async fn execute_query(
        &self,
        connection: &Connection,
        query: &str,
    ) -> TransportResult<QueryResult> {
        let payload = json!({"connection": connection, "query": query.trim()});
        let result = self.invoke(EXECUTE_QUERY, payload).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn fetch_schema(&self, connection: &Connection) -> TransportResult<Vec<SchemaObject>> {
        let payload = json!({"connection": connection});
        let result = self.invoke(FETCH_SCHEMA, payload).await?;
        let response: SchemaResponse = serde_json::from_value(result)?;
        match response.error {
            Some(error) => Err(TransportError::Remote(error)),
            None => Ok(response.tables),
        }
    }
}
