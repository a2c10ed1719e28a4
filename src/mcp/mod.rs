//! MCP client layer: the small JSON-RPC envelope this crate's session layer
//! needs, the HTTP-streamable and stdio session transports, the process-wide
//! transport pool (component C), and OAuth bearer refresh.
//!
//! The MCP wire format itself is out of scope (spec §1) — only the request/
//! response/notification envelope consumed by `initialize`, `tools/list`,
//! and `tools/call` is defined here, grounded on the teacher's
//! `tool_source/mcp/session_http.rs`, rather than pulled from its git-hosted
//! `mcp_core` dependency.

pub mod oauth;
pub mod pool;
pub mod session_http;
pub mod session_stdio;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestMessage {
    pub jsonrpc: &'static str,
    pub id: Value,
    pub method: String,
    pub params: Value,
}

impl RequestMessage {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no `id`, no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct NotificationMessage {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl NotificationMessage {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// A parsed JSON-RPC response body: either `result` or `error` is set.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorObject>,
}

/// Transport kind for an MCP endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Http,
    Stdio,
}

/// Authentication attached to an MCP handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Auth {
    None,
    Bearer(String),
    Basic { username: String, password: String },
    OAuth {
        access_token: String,
        refresh_token: String,
        token_endpoint: String,
        client_id: String,
        client_secret: Option<String>,
    },
}

impl Auth {
    fn identity_key(&self) -> String {
        match self {
            Auth::None => "none".to_string(),
            Auth::Bearer(_) => "bearer".to_string(),
            Auth::Basic { username, .. } => format!("basic:{username}"),
            Auth::OAuth {
                client_id,
                token_endpoint,
                ..
            } => format!("oauth:{client_id}@{token_endpoint}"),
        }
    }
}

/// A stable identity object describing an MCP endpoint (spec §3). Handles
/// are value-identity: two with the same endpoint+auth+headers are
/// equivalent and resolve to the same pooled session.
#[derive(Clone, Debug)]
pub struct McpHandle {
    pub endpoint: String,
    pub transport: TransportKind,
    pub auth: Auth,
    pub headers: Vec<(String, String)>,
}

impl McpHandle {
    pub fn http(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport: TransportKind::Http,
            auth: Auth::None,
            headers: Vec::new(),
        }
    }

    pub fn stdio(command: impl Into<String>) -> Self {
        Self {
            endpoint: command.into(),
            transport: TransportKind::Stdio,
            auth: Auth::None,
            headers: Vec::new(),
        }
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.auth = Auth::Bearer(token.into());
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Derives the endpoint id used as the prefix of fully-qualified tool
    /// names (`<endpointId>.<toolName>`, spec §4.D): the URL's host+port+path
    /// (or the raw command string for stdio), with non-identifier characters
    /// replaced by `_`.
    pub fn endpoint_id(&self) -> String {
        let raw = match self.transport {
            TransportKind::Http => url::Url::parse(&self.endpoint)
                .map(|u| {
                    let host = u.host_str().unwrap_or_default();
                    let port = u.port().map(|p| format!(":{p}")).unwrap_or_default();
                    format!("{host}{port}{}", u.path())
                })
                .unwrap_or_else(|_| self.endpoint.clone()),
            TransportKind::Stdio => self.endpoint.clone(),
        };
        sanitize_identifier(&raw)
    }

    /// The pool's per-endpoint key: normalized URL/command, transport kind,
    /// auth-scheme identity, and a hash of custom headers (spec §4.C).
    pub fn pool_key(&self) -> String {
        let mut headers = self.headers.clone();
        headers.sort();
        let header_sig: String = headers.iter().map(|(k, v)| format!("{k}={v};")).collect();
        format!(
            "{}|{:?}|{}|{}",
            self.endpoint,
            self.transport,
            self.auth.identity_key(),
            header_sig
        )
    }
}

/// Replaces any character outside `[A-Za-z0-9_-]` with `_` (spec §4.D).
pub fn sanitize_identifier(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_id_derives_from_host_port_path() {
        let h = McpHandle::http("https://mcp.example.com:8443/mcp/v1");
        assert_eq!(h.endpoint_id(), "mcp_example_com_8443_mcp_v1");
    }

    #[test]
    fn pool_key_distinguishes_auth_and_headers() {
        let a = McpHandle::http("https://x/mcp").with_bearer("tok");
        let b = McpHandle::http("https://x/mcp");
        assert_ne!(a.pool_key(), b.pool_key());
    }

    #[test]
    fn equivalent_handles_share_a_pool_key() {
        let a = McpHandle::http("https://x/mcp").with_header("k", "v");
        let b = McpHandle::http("https://x/mcp").with_header("k", "v");
        assert_eq!(a.pool_key(), b.pool_key());
    }
}
