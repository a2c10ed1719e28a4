//! Tool Executor (component F): validates arguments against a tool's JSON
//! Schema, invokes `tools/call` with a per-call timeout (the pool's
//! `MCP_REQUEST_TIMEOUT_MS` override, or 30s), times it, and normalizes the
//! response into a plain value.

use serde_json::Value;
use std::time::Instant;

use super::{ToolCallRecord, ToolDefinition};
use crate::error::AgentError;
use crate::mcp::pool::McpPool;
use crate::retry::{with_retry, RetryPolicy};
use crate::telemetry::{Attrs, AttrValue, TelemetryEmitter};

/// Validates `arguments` against `def.parameters`. Schema-invalid input is a
/// non-retryable `ValidationError` (spec §4.F step 3).
pub fn validate(def: &ToolDefinition, arguments: &Value) -> Result<(), AgentError> {
    let validator = jsonschema::validator_for(&def.parameters)
        .map_err(|e| AgentError::ValidationError(format!("invalid schema for {}: {e}", def.dotted_name)))?;
    let errors: Vec<String> = validator
        .iter_errors(arguments)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AgentError::ValidationError(format!(
            "{}: {}",
            def.dotted_name,
            errors.join("; ")
        )))
    }
}

/// Unwraps an MCP `tools/call` result's `{content: [{type:"text", text:"…"}]}`
/// shape into a plain value: the text is re-parsed as JSON when possible,
/// otherwise kept as a raw string. Falls back to `structuredContent` or the
/// raw result when the content-array shape isn't present.
pub fn normalize_result(raw: &Value) -> Value {
    if let Some(structured) = raw.get("structuredContent") {
        return structured.clone();
    }
    if let Some(content) = raw.get("content").and_then(Value::as_array) {
        let texts: Vec<String> = content
            .iter()
            .filter(|c| c.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|c| c.get("text").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        if texts.len() == 1 {
            let text = &texts[0];
            return serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()));
        }
        if !texts.is_empty() {
            return Value::Array(texts.into_iter().map(Value::String).collect());
        }
    }
    raw.clone()
}

/// Executes one tool call: validate → `tools/call` (retried per `policy`) →
/// normalize. Always returns a record (spec §4.E: "a failure in one call
/// does not cancel its peers; results are kept per call"); also returns the
/// terminal `AgentError`, if any, so a caller that must abort on a fatal
/// failure (the auto-tool-selection loop, spec §4.G) has something to
/// propagate without having to re-parse `record.result`'s string.
pub async fn execute(
    pool: &McpPool,
    def: &ToolDefinition,
    arguments: Value,
    policy: &RetryPolicy,
    emitter: &dyn TelemetryEmitter,
) -> (ToolCallRecord, Option<AgentError>) {
    let started = Instant::now();
    let endpoint = def.mcp_handle.endpoint.clone();
    let tool_short_name = def
        .dotted_name
        .rsplit_once('.')
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| def.dotted_name.clone());

    let result = match validate(def, &arguments) {
        Err(e) => Err(e),
        Ok(()) => {
            let params = serde_json::json!({ "name": tool_short_name, "arguments": arguments });
            let call_policy = RetryPolicy {
                timeout: policy.timeout.or(Some(pool.request_timeout())),
                ..policy.clone()
            };
            let mut span_attrs = Attrs::new();
            span_attrs.insert("endpoint", AttrValue::Str(endpoint.clone()));
            span_attrs.insert("tool_name", AttrValue::Str(tool_short_name.clone()));
            let span = emitter.start_span("mcp.tools/call", span_attrs);
            let r = with_retry(&call_policy, None, || {
                let pool = pool;
                let handle = &def.mcp_handle;
                let params = params.clone();
                async move { pool.call(handle, "tools/call", params).await }
            })
            .await;
            match &r {
                Ok(_) => span.end_ok(),
                Err(e) => span.end_err(&e.to_string()),
            }
            r
        }
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(v) => (
            ToolCallRecord {
                tool_name: def.dotted_name.clone(),
                arguments,
                endpoint,
                result: Ok(normalize_result(&v)),
                elapsed_ms,
            },
            None,
        ),
        Err(e) => (
            ToolCallRecord {
                tool_name: def.dotted_name.clone(),
                arguments,
                endpoint,
                result: Err(e.to_string()),
                elapsed_ms,
            },
            Some(e),
        ),
    }
}
