//! MCP Transport Pool (component C): a process-wide map from endpoint key to
//! open session. Session acquisition is single-flighted per key (two
//! concurrent acquirers of an unopened endpoint yield exactly one
//! initialized session); `call` retries exactly once after an OAuth refresh
//! on HTTP 401.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::oauth::{OAuthCache, OAuthCreds};
use super::session_http::{HttpRequestError, HttpSession};
use super::session_stdio::StdioSession;
use super::{Auth, McpHandle, TransportKind};
use crate::config::McpOverrides;
use crate::error::{AgentError, ErrorMeta};

/// A live, initialized MCP session for either transport.
pub enum Session {
    Http(HttpSession),
    Stdio(StdioSession),
}

/// Default, process-wide pool. Most callers use this; tests construct their
/// own `McpPool::new()` instance so state doesn't leak between cases (spec
/// §9's open question about explicit, injectable singletons).
pub static DEFAULT_POOL: Lazy<McpPool> = Lazy::new(McpPool::new);

/// Falls back to the transport's own default when `McpOverrides` leaves a
/// timeout unset.
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub struct McpPool {
    sessions: DashMap<String, Arc<OnceCell<Arc<Session>>>>,
    oauth: OAuthCache,
    overrides: McpOverrides,
}

impl McpPool {
    /// Builds a pool with overrides read from the environment (spec §0's
    /// `MCP_CONNECT_TIMEOUT_MS`/`MCP_REQUEST_TIMEOUT_MS`).
    pub fn new() -> Self {
        Self::with_overrides(McpOverrides::from_env())
    }

    pub fn with_overrides(overrides: McpOverrides) -> Self {
        Self {
            sessions: DashMap::new(),
            oauth: OAuthCache::new(),
            overrides,
        }
    }

    /// The per-call request timeout tool execution falls back to when a
    /// step/policy doesn't set its own (component F).
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.overrides.request_timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS))
    }

    /// Returns an open, initialized session for `handle`, opening one if
    /// none exists yet. Concurrent acquirers of the same key share one
    /// `OnceCell`, so exactly one session is ever opened per key.
    pub async fn acquire(&self, handle: &McpHandle) -> Result<Arc<Session>, AgentError> {
        let key = handle.pool_key();
        let cell = self
            .sessions
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell
            .get_or_try_init(|| async { self.open(handle).await.map(Arc::new) })
            .await;

        match result {
            Ok(session) => Ok(session.clone()),
            Err(e) => {
                // Don't poison the slot with a permanent failure: drop it so
                // the next acquire attempt opens a fresh session.
                self.sessions.remove(&key);
                Err(e)
            }
        }
    }

    async fn open(&self, handle: &McpHandle) -> Result<Session, AgentError> {
        match handle.transport {
            TransportKind::Http => {
                let bearer = self.initial_bearer(handle);
                let connect_timeout = std::time::Duration::from_millis(
                    self.overrides.connect_timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
                );
                let session = HttpSession::connect(
                    handle.endpoint.clone(),
                    handle.headers.clone(),
                    bearer,
                    connect_timeout,
                )
                .await?;
                Ok(Session::Http(session))
            }
            TransportKind::Stdio => {
                let session = StdioSession::connect(&handle.endpoint, &[], &[]).await?;
                Ok(Session::Stdio(session))
            }
        }
    }

    fn initial_bearer(&self, handle: &McpHandle) -> Option<String> {
        match &handle.auth {
            Auth::Bearer(tok) => Some(tok.clone()),
            Auth::OAuth {
                access_token,
                client_id,
                ..
            } => {
                if let Some(cached) = self.oauth.cached_access_token(&handle.endpoint, client_id) {
                    Some(cached)
                } else {
                    Some(access_token.clone())
                }
            }
            _ => None,
        }
    }

    fn oauth_creds(handle: &McpHandle) -> Option<OAuthCreds> {
        match &handle.auth {
            Auth::OAuth {
                refresh_token,
                token_endpoint,
                client_id,
                client_secret,
                ..
            } => Some(OAuthCreds {
                refresh_token: refresh_token.clone(),
                token_endpoint: token_endpoint.clone(),
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            }),
            _ => None,
        }
    }

    /// Issues a JSON-RPC request over the handle's session. On HTTP 401 with
    /// OAuth credentials present, refreshes the bearer once and retries the
    /// request exactly once.
    pub async fn call(
        &self,
        handle: &McpHandle,
        method: &str,
        params: Value,
    ) -> Result<Value, AgentError> {
        let session = self.acquire(handle).await?;
        match session.as_ref() {
            Session::Stdio(s) => s.request(method, params).await,
            Session::Http(s) => {
                let id = uuid::Uuid::new_v4().to_string();
                match s.request(id.clone(), method, params.clone()).await {
                    Ok(v) => Ok(v),
                    Err(HttpRequestError::Unauthorized) => {
                        let creds = Self::oauth_creds(handle).ok_or_else(|| {
                            tool_err(&handle.endpoint, "401 with no OAuth credentials".into(), false)
                        })?;
                        let new_token = self.oauth.refresh(&handle.endpoint, &creds).await?;
                        s.set_bearer(new_token);
                        let retry_id = uuid::Uuid::new_v4().to_string();
                        s.request(retry_id, method, params)
                            .await
                            .map_err(|e| http_err_to_agent_err(&handle.endpoint, e))
                    }
                    Err(e) => Err(http_err_to_agent_err(&handle.endpoint, e)),
                }
            }
        }
    }

    pub fn close(&self, handle: &McpHandle) {
        self.sessions.remove(&handle.pool_key());
    }

    pub fn close_all(&self) {
        self.sessions.clear();
    }
}

impl Default for McpPool {
    fn default() -> Self {
        Self::new()
    }
}

fn http_err_to_agent_err(endpoint: &str, e: HttpRequestError) -> AgentError {
    match e {
        HttpRequestError::Unauthorized => tool_err(endpoint, "unauthorized".into(), false),
        HttpRequestError::Transport(msg) => tool_err(endpoint, msg, true),
        HttpRequestError::RpcError(msg) => tool_err(endpoint, msg, false),
    }
}

fn tool_err(endpoint: &str, message: String, retryable: bool) -> AgentError {
    AgentError::McpToolError {
        message,
        meta: ErrorMeta::new(endpoint.to_string(), retryable),
    }
}
