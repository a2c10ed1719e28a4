//! MCP session over Streamable HTTP: POST JSON-RPC to a URL, parse the
//! response, whether it arrives as `application/json` or an SSE
//! `text/event-stream` body. Grounded directly on the teacher's
//! `tool_source/mcp/session_http.rs`.

use std::sync::Mutex;

use reqwest::Client;
use serde_json::{json, Value};

use super::{JsonRpcResponse, NotificationMessage, RequestMessage, MCP_PROTOCOL_VERSION};
use crate::error::{AgentError, ErrorMeta};

const INITIALIZE_REQUEST_ID: &str = "skein-mcp-initialize";

/// Header names the session sets itself after applying caller-supplied
/// headers; stripped from the caller's list first so the session's own
/// values can't be duplicated or shadowed on the wire.
fn is_reserved_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("authorization") || name.eq_ignore_ascii_case("mcp-session-id")
}

fn parse_json_rpc_from_body(
    body: &str,
    content_type: Option<&reqwest::header::HeaderValue>,
) -> Result<JsonRpcResponse, String> {
    let is_sse = content_type
        .and_then(|v| v.to_str().ok())
        .map(|s| s.contains("text/event-stream"))
        .unwrap_or(false);

    if !is_sse {
        return serde_json::from_str(body).map_err(|e| format!("response json: {e}"));
    }

    let mut data_buffer = String::new();
    let mut try_flush = |buf: &mut String| -> Option<JsonRpcResponse> {
        if buf.is_empty() {
            return None;
        }
        let parsed = serde_json::from_str::<JsonRpcResponse>(buf).ok();
        buf.clear();
        parsed.filter(|r| r.result.is_some() || r.error.is_some())
    };

    for line in body.lines() {
        if let Some(data) = line.strip_prefix("data: ") {
            if data == "[DONE]" || data.is_empty() {
                if let Some(r) = try_flush(&mut data_buffer) {
                    return Ok(r);
                }
                continue;
            }
            if data_buffer.is_empty() {
                data_buffer = data.to_string();
            } else {
                data_buffer.push('\n');
                data_buffer.push_str(data);
            }
            if let Ok(r) = serde_json::from_str::<JsonRpcResponse>(&data_buffer) {
                if r.result.is_some() || r.error.is_some() {
                    return Ok(r);
                }
            }
        } else if line.trim().is_empty() {
            if let Some(r) = try_flush(&mut data_buffer) {
                return Ok(r);
            }
        }
    }
    if let Some(r) = try_flush(&mut data_buffer) {
        return Ok(r);
    }
    Err("SSE stream: no JSON-RPC response (result/error) found".into())
}

/// A live MCP session over Streamable HTTP.
pub struct HttpSession {
    client: Client,
    url: String,
    headers: Vec<(String, String)>,
    session_id: Mutex<Option<String>>,
    bearer: Mutex<Option<String>>,
}

impl HttpSession {
    /// Opens a session and completes the `initialize` handshake.
    pub async fn connect(
        url: impl Into<String>,
        headers: Vec<(String, String)>,
        bearer: Option<String>,
        connect_timeout: std::time::Duration,
    ) -> Result<Self, AgentError> {
        let url = url.into();
        let client = Client::builder()
            .timeout(connect_timeout)
            .build()
            .map_err(|e| AgentError::McpConnectionError {
                message: e.to_string(),
                meta: ErrorMeta::new(url.clone(), false),
            })?;
        let session = Self {
            client,
            url,
            headers,
            session_id: Mutex::new(None),
            bearer: Mutex::new(bearer),
        };
        session.initialize().await?;
        Ok(session)
    }

    pub fn set_bearer(&self, token: String) {
        *self.bearer.lock().unwrap() = Some(token);
    }

    fn build_request(&self, body: Vec<u8>) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header("MCP-Protocol-Version", MCP_PROTOCOL_VERSION)
            .body(body);
        for (k, v) in self.headers.iter().filter(|(k, _)| !is_reserved_header(k)) {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(sid) = self.session_id.lock().unwrap().clone() {
            req = req.header("Mcp-Session-Id", sid);
        }
        if let Some(tok) = self.bearer.lock().unwrap().clone() {
            req = req.header("Authorization", format!("Bearer {tok}"));
        }
        req
    }

    async fn initialize(&self) -> Result<(), AgentError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": { "name": "skein", "version": env!("CARGO_PKG_VERSION") }
        });
        let request = RequestMessage::new(INITIALIZE_REQUEST_ID, "initialize", params);
        let body = serde_json::to_vec(&request).expect("RequestMessage always serializes");
        let resp = self
            .build_request(body)
            .send()
            .await
            .map_err(|e| conn_err(&self.url, e.to_string(), true))?;

        let status = resp.status();
        if let Some(sid) = resp
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().unwrap() = Some(sid.to_string());
        }
        if status == reqwest::StatusCode::ACCEPTED {
            return self.send_initialized_notification().await;
        }
        if !status.is_success() {
            let retryable = status.is_server_error() || status.as_u16() == 429;
            let text = resp.text().await.unwrap_or_default();
            return Err(conn_err(
                &self.url,
                format!("initialize HTTP {status}: {text}"),
                retryable,
            ));
        }
        let content_type = resp.headers().get("content-type").cloned();
        let text = resp
            .text()
            .await
            .map_err(|e| conn_err(&self.url, e.to_string(), true))?;
        parse_json_rpc_from_body(&text, content_type.as_ref())
            .map_err(|e| conn_err(&self.url, format!("initialize {e}"), false))?;
        self.send_initialized_notification().await
    }

    async fn send_initialized_notification(&self) -> Result<(), AgentError> {
        let notification = NotificationMessage::new("notifications/initialized", Some(json!({})));
        let body = serde_json::to_vec(&notification).expect("NotificationMessage always serializes");
        let resp = self
            .build_request(body)
            .send()
            .await
            .map_err(|e| conn_err(&self.url, e.to_string(), true))?;
        let status = resp.status();
        if status != reqwest::StatusCode::ACCEPTED && !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(conn_err(
                &self.url,
                format!("notifications/initialized HTTP {status}: {text}"),
                status.is_server_error(),
            ));
        }
        Ok(())
    }

    /// Sends one JSON-RPC request and returns its result, or the server's
    /// status code alongside a tool/connection error so the pool can decide
    /// whether a 401 warrants an OAuth refresh-and-retry.
    pub async fn request(
        &self,
        id: impl Into<Value>,
        method: &str,
        params: Value,
    ) -> Result<Value, HttpRequestError> {
        let request = RequestMessage::new(id, method, params);
        let body = serde_json::to_vec(&request).expect("RequestMessage always serializes");
        let resp = self
            .build_request(body)
            .send()
            .await
            .map_err(|e| HttpRequestError::Transport(e.to_string()))?;
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(HttpRequestError::Unauthorized);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(HttpRequestError::Transport(format!(
                "{method} HTTP {status}: {text}"
            )));
        }
        let content_type = resp.headers().get("content-type").cloned();
        let text = resp
            .text()
            .await
            .map_err(|e| HttpRequestError::Transport(e.to_string()))?;
        let parsed = parse_json_rpc_from_body(&text, content_type.as_ref())
            .map_err(HttpRequestError::Transport)?;
        if let Some(err) = parsed.error {
            return Err(HttpRequestError::RpcError(err.message));
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }
}

#[derive(Debug)]
pub enum HttpRequestError {
    Unauthorized,
    Transport(String),
    RpcError(String),
}

fn conn_err(url: &str, message: String, retryable: bool) -> AgentError {
    AgentError::McpConnectionError {
        message,
        meta: ErrorMeta::new(url.to_string(), retryable),
    }
}
