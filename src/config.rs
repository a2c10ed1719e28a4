//! Ambient process configuration: an optional `.env` file plus the handful of
//! environment variables the core reads directly (everything else — provider
//! API keys, MCP server URLs — belongs to the adapters callers bring, not to
//! this crate).
//!
//! Precedence is existing process environment > `.env`, matching the
//! teacher's `config` crate's documented priority order, minus the XDG layer:
//! this crate has no application identity to scope a config directory under,
//! so that layer is left to whatever binary embeds it.

use std::path::Path;

/// Loads a `.env` file (if present) into the process environment without
/// overriding keys that are already set. Safe to call more than once.
///
/// `dir` defaults to the current working directory when `None`.
pub fn load_dotenv(dir: Option<&Path>) -> Result<(), dotenv::Error> {
    match dir {
        Some(d) => match dotenv::from_path(d.join(".env")) {
            Ok(()) => Ok(()),
            Err(dotenv::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        },
        None => match dotenv::dotenv() {
            Ok(_) => Ok(()),
            Err(dotenv::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        },
    }
}

/// The OTLP collector endpoint, if the caller wants the optional `otlp`
/// telemetry emitter active. Read directly rather than cached: this is
/// consulted once at emitter-construction time.
pub fn otlp_endpoint() -> Option<String> {
    std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()
}

/// MCP-wide overrides. Any field left `None` falls back to the transport's
/// own hardcoded default (session connect timeout, request timeout).
#[derive(Debug, Default, Clone)]
pub struct McpOverrides {
    pub connect_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

impl McpOverrides {
    pub fn from_env() -> Self {
        Self {
            connect_timeout_ms: std::env::var("MCP_CONNECT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
            request_timeout_ms: std::env::var("MCP_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }
}
