//! Shared integration-test scaffolding: an in-process TCP JSON-RPC stub HTTP
//! server, in the teacher's own hand-rolled-fake style (grounded on
//! `tool_source/mcp/mod.rs`'s test module — raw `TcpListener`/`TcpStream` and
//! manual HTTP request/response framing, not a mocking framework).

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Reads one HTTP/1.1 request off `stream`: headers (including the request
/// line) and the body, sized by `Content-Length`.
pub async fn read_http_request(stream: &mut TcpStream) -> (String, String) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_terminator(&buf) {
            break pos;
        }
        if n == 0 {
            break buf.len();
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = headers
        .lines()
        .find_map(|l| l.to_ascii_lowercase().starts_with("content-length:").then(|| l.to_string()))
        .and_then(|l| l.split(':').nth(1).map(str::trim).and_then(|v| v.parse::<usize>().ok()))
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buf.len() < body_start + content_length {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[body_start..buf.len().min(body_start + content_length)]).to_string();
    (headers, body)
}

fn find_header_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Writes a complete HTTP/1.1 response with `Connection: close`, so the
/// client opens a fresh connection for its next request (matching how the
/// stub accepts one connection per scripted exchange).
pub async fn write_http_response(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await.unwrap();
}

/// A running stub server plus the raw request bodies it has seen so far, in
/// arrival order, for assertions like "exactly one POST to the token
/// endpoint".
pub struct StubServer {
    pub addr: std::net::SocketAddr,
    pub requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl StubServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests_to(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .count()
    }
}

/// Spawns a stub HTTP server that accepts `total_connections` connections,
/// one request/response per connection, routing each by `(path, parsed
/// JSON-RPC body)` through `handler`, which returns `(status_line, body)`.
pub async fn spawn_stub_server<F>(total_connections: usize, handler: F) -> StubServer
where
    F: Fn(&str, &Value) -> (String, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let requests_clone = requests.clone();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        for _ in 0..total_connections {
            let (mut stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => break,
            };
            let requests = requests_clone.clone();
            let handler = handler.clone();
            // Each connection is handled on its own task so requests that
            // arrive concurrently (e.g. a fanned-out batch of tool calls)
            // are actually serviced concurrently, not queued behind accept().
            tokio::spawn(async move {
                let (headers, body) = read_http_request(&mut stream).await;
                let path = request_path(&headers);
                let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
                requests.lock().unwrap().push((path.clone(), body));
                let (status, resp_body) = handler(&path, &parsed);
                write_http_response(&mut stream, &status, &resp_body).await;
            });
        }
    });

    StubServer { addr, requests }
}

fn request_path(headers: &str) -> String {
    headers
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string()
}

/// Routes the MCP handshake (`initialize` + `notifications/initialized`)
/// that every session opens before issuing its own calls, so a test's
/// `handler` only needs to cover the method(s) it actually cares about.
/// `rpc_id` echoes back whatever `id` the client sent.
pub fn mcp_handshake_response(method: &str, body: &Value) -> Option<(String, String)> {
    match method {
        "initialize" => {
            let id = body.get("id").cloned().unwrap_or(Value::Null);
            Some((
                "200 OK".to_string(),
                serde_json::json!({"jsonrpc": "2.0", "id": id, "result": {"protocolVersion": "2025-06-18"}})
                    .to_string(),
            ))
        }
        "notifications/initialized" => Some(("200 OK".to_string(), "{}".to_string())),
        _ => None,
    }
}

pub fn rpc_method(body: &Value) -> &str {
    body.get("method").and_then(Value::as_str).unwrap_or("")
}

pub fn rpc_id(body: &Value) -> Value {
    body.get("id").cloned().unwrap_or(Value::Null)
}

pub fn ok_result(id: &Value, result: Value) -> String {
    serde_json::json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
}

pub fn text_content_result(id: &Value, text: &str) -> String {
    ok_result(id, serde_json::json!({"content": [{"type": "text", "text": text}]}))
}
