//! MCP session over stdio: spawns a child process speaking newline-delimited
//! JSON-RPC on stdin/stdout, performs the initialize handshake, and exposes
//! request/response calls. Grounded on the teacher's
//! `tool_source/mcp/session.rs` (spawn → initialize → send/wait-for-result
//! shape), adapted from its `std::sync::mpsc` reader-thread idiom to
//! `tokio::process` + an async reader task, matching this crate's
//! async-everywhere convention.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{oneshot, Mutex as AsyncMutex};

use super::{JsonRpcResponse, NotificationMessage, RequestMessage, MCP_PROTOCOL_VERSION};
use crate::error::{AgentError, ErrorMeta};

const INITIALIZE_REQUEST_ID: &str = "skein-mcp-initialize";

type PendingMap = Mutex<HashMap<String, oneshot::Sender<JsonRpcResponse>>>;

/// A live MCP session over a spawned child process's stdio.
pub struct StdioSession {
    child: Mutex<Child>,
    stdin: AsyncMutex<ChildStdin>,
    pending: std::sync::Arc<PendingMap>,
    next_id: std::sync::atomic::AtomicU64,
    command: String,
}

impl StdioSession {
    pub async fn connect(
        command: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<Self, AgentError> {
        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args)
            .envs(env.iter().cloned())
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null());

        let mut child = cmd.spawn().map_err(|e| AgentError::McpConnectionError {
            message: format!("spawn {command}: {e}"),
            meta: ErrorMeta::new(command.to_string(), false),
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| conn_err(command, "child stdin not piped".into(), false))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| conn_err(command, "child stdout not piped".into(), false))?;

        let pending: std::sync::Arc<PendingMap> = std::sync::Arc::new(Mutex::new(HashMap::new()));
        spawn_reader(stdout, pending.clone());

        let session = Self {
            child: Mutex::new(child),
            stdin: AsyncMutex::new(stdin),
            pending,
            next_id: std::sync::atomic::AtomicU64::new(1),
            command: command.to_string(),
        };
        session.initialize().await?;
        Ok(session)
    }

    async fn write_line(&self, line: String) -> Result<(), AgentError> {
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| conn_err(&self.command, e.to_string(), true))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| conn_err(&self.command, e.to_string(), true))?;
        stdin
            .flush()
            .await
            .map_err(|e| conn_err(&self.command, e.to_string(), true))
    }

    async fn initialize(&self) -> Result<(), AgentError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": { "name": "skein", "version": env!("CARGO_PKG_VERSION") }
        });
        let resp = self
            .call(INITIALIZE_REQUEST_ID.to_string(), "initialize", params)
            .await?;
        if let Some(err) = resp.error {
            return Err(conn_err(&self.command, err.message, false));
        }
        let notification = NotificationMessage::new("notifications/initialized", Some(json!({})));
        let line = serde_json::to_string(&notification).expect("always serializes");
        self.write_line(line).await
    }

    async fn call(
        &self,
        id: String,
        method: &str,
        params: Value,
    ) -> Result<JsonRpcResponse, AgentError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id.clone(), tx);

        let request = RequestMessage::new(id.clone(), method, params);
        let line = serde_json::to_string(&request).expect("always serializes");
        if let Err(e) = self.write_line(line).await {
            self.pending.lock().unwrap().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(std::time::Duration::from_secs(30), rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(conn_err(&self.command, "reader task dropped".into(), true)),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(AgentError::TimeoutError(std::time::Duration::from_secs(30)))
            }
        }
    }

    /// Issues a JSON-RPC request (`tools/list`, `tools/call`) and returns its
    /// `result`, or an `McpToolError` if the server responded with an error.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, AgentError> {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            .to_string();
        let resp = self.call(id, method, params).await?;
        if let Some(err) = resp.error {
            return Err(AgentError::McpToolError {
                message: err.message,
                meta: ErrorMeta::new(self.command.clone(), false),
            });
        }
        Ok(resp.result.unwrap_or(Value::Null))
    }

    pub fn kill(&self) {
        let mut child = self.child.lock().unwrap();
        let _ = child.start_kill();
    }
}

impl Drop for StdioSession {
    fn drop(&mut self) {
        self.kill();
    }
}

fn spawn_reader(stdout: tokio::process::ChildStdout, pending: std::sync::Arc<PendingMap>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&line) else {
                continue;
            };
            let Some(id) = resp.id.as_ref().and_then(|v| v.as_str().map(str::to_string)) else {
                continue;
            };
            if let Some(tx) = pending.lock().unwrap().remove(&id) {
                let _ = tx.send(resp);
            }
        }
    });
}

fn conn_err(command: &str, message: String, retryable: bool) -> AgentError {
    AgentError::McpConnectionError {
        message,
        meta: ErrorMeta::new(command.to_string(), retryable),
    }
}
