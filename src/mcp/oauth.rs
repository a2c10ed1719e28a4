//! OAuth bearer refresh. Access tokens are cached per `(endpoint, client_id)`
//! with a refresh-on-401 policy; concurrent refreshes for the same key are
//! deduplicated via a per-key single-flight so only one refresh is ever in
//! flight (spec §4.C, §5).

use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{AgentError, ErrorMeta};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// One OAuth credential set, as carried on `Auth::OAuth`.
#[derive(Clone, Debug)]
pub struct OAuthCreds {
    pub refresh_token: String,
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: Option<String>,
}

struct SlotState {
    access_token: String,
    refresh_token: String,
}

/// Process-global (or test-local) OAuth token cache. One entry per
/// `(endpoint, client_id)`; each entry's refresh is guarded by its own
/// `tokio::sync::Mutex` so refreshing token A never blocks a reader of token B.
pub struct OAuthCache {
    slots: DashMap<String, Arc<Mutex<SlotState>>>,
    client: reqwest::Client,
}

impl OAuthCache {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            client: reqwest::Client::new(),
        }
    }

    fn key(endpoint: &str, client_id: &str) -> String {
        format!("{endpoint}#{client_id}")
    }

    /// Seeds the cache with a known-good access token so the first call
    /// doesn't need a refresh.
    pub fn seed(&self, endpoint: &str, creds: &OAuthCreds, access_token: String) {
        let key = Self::key(endpoint, &creds.client_id);
        self.slots.insert(
            key,
            Arc::new(Mutex::new(SlotState {
                access_token,
                refresh_token: creds.refresh_token.clone(),
            })),
        );
    }

    pub fn cached_access_token(&self, endpoint: &str, client_id: &str) -> Option<String> {
        let key = Self::key(endpoint, client_id);
        self.slots
            .get(&key)
            .and_then(|slot| slot.try_lock().ok().map(|s| s.access_token.clone()))
    }

    /// Refreshes the access token for `(endpoint, creds.client_id)` via
    /// `grant_type=refresh_token`, single-flighted per key, and returns the
    /// new token. Only one in-flight refresh per key ever hits the network;
    /// concurrent callers await the same slot's lock and each see the result
    /// of the refresh that actually ran.
    pub async fn refresh(
        &self,
        endpoint: &str,
        creds: &OAuthCreds,
    ) -> Result<String, AgentError> {
        let key = Self::key(endpoint, &creds.client_id);
        let slot = self
            .slots
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Mutex::new(SlotState {
                    access_token: String::new(),
                    refresh_token: creds.refresh_token.clone(),
                }))
            })
            .clone();

        let mut guard = slot.lock().await;

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", guard.refresh_token.as_str()),
            ("client_id", creds.client_id.as_str()),
        ];
        if let Some(secret) = creds.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let resp = self
            .client
            .post(&creds.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| oauth_err(endpoint, e.to_string(), true))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(oauth_err(
                endpoint,
                format!("token refresh HTTP {status}: {text}"),
                status.is_server_error(),
            ));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| oauth_err(endpoint, format!("token response: {e}"), false))?;

        guard.access_token = body.access_token.clone();
        if let Some(rt) = body.refresh_token {
            guard.refresh_token = rt;
        }
        Ok(body.access_token)
    }
}

impl Default for OAuthCache {
    fn default() -> Self {
        Self::new()
    }
}

fn oauth_err(endpoint: &str, message: String, retryable: bool) -> AgentError {
    AgentError::McpConnectionError {
        message,
        meta: ErrorMeta::new(endpoint.to_string(), retryable),
    }
}
