//! The uniform LLM handle contract (spec §6) that every provider adapter
//! implements and that the scheduler, auto-tool-selection loop, and
//! multi-agent coordinator drive against. Concrete provider adapters
//! (OpenAI, Anthropic, ...) are out of scope for this crate; only the trait
//! and a couple of test doubles live here.

pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::error::AgentError;

/// A single tool call the LLM proposed during `gen_with_tools`. `name` is the
/// sanitized, provider-safe identifier (§4.D); adapters are responsible for
/// mapping back to the dotted name before the caller sees it again, but the
/// scheduler itself treats this field as opaque and hands it to the tool
/// executor, which knows how to resolve it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Map<String, Value>,
    pub mcp_handle_id: Option<String>,
}

/// Token accounting for a single LLM call.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LlmUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// A tool definition offered to the LLM in `gen_with_tools`. Mirrors the
/// wire shape providers expect for function-calling: name, description, and
/// a JSON-Schema parameters object with non-portable keys already stripped
/// (§4.D).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolOffer {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Response from a non-streaming generation call.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<LlmUsage>,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, AgentError>> + Send>>;

/// The uniform handle every provider adapter implements (spec §6). The
/// scheduler, the auto-tool-selection loop, and the coordinator only ever
/// talk to `dyn LlmHandle`.
#[async_trait]
pub trait LlmHandle: Send + Sync {
    /// Stable identity string for this handle (used in telemetry attributes
    /// and error `provider` tags).
    fn provider(&self) -> &str;

    fn model(&self) -> &str;

    async fn gen(&self, prompt: &str) -> Result<String, AgentError>;

    async fn gen_with_tools(
        &self,
        prompt: &str,
        tools: &[ToolOffer],
    ) -> Result<LlmResponse, AgentError>;

    async fn gen_stream(&self, prompt: &str) -> Result<ChunkStream, AgentError>;

    /// Token usage for the most recently completed call on this handle, if
    /// the adapter tracks it. Default: unsupported.
    fn last_usage(&self) -> Option<LlmUsage> {
        None
    }
}
