//! A scriptable stub `LlmHandle` for tests, in the hand-rolled-fake style the
//! teacher uses instead of a mocking framework (cf. `tool_source/mcp/mod.rs`'s
//! test module, which stands up a literal stub server rather than mocking a
//! trait). `MockLlm` queues a sequence of responses and replays them in
//! order, recording every prompt it was asked to answer so assertions can
//! inspect what the scheduler actually sent it.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{ChunkStream, LlmHandle, LlmResponse, LlmUsage, ToolOffer};
use crate::error::AgentError;

/// One scripted turn: either plain text or a response carrying tool calls.
#[derive(Clone, Debug)]
pub struct ScriptedTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<super::ToolCall>,
}

impl ScriptedTurn {
    pub fn text(s: impl Into<String>) -> Self {
        Self {
            content: Some(s.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<super::ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls: calls,
        }
    }
}

pub struct MockLlm {
    provider: String,
    model: String,
    script: Mutex<Vec<ScriptedTurn>>,
    prompts_seen: Mutex<Vec<String>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockLlm {
    pub fn new(provider: impl Into<String>, script: Vec<ScriptedTurn>) -> Self {
        Self {
            provider: provider.into(),
            model: "mock-model".into(),
            script: Mutex::new(script),
            prompts_seen: Mutex::new(Vec::new()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Returns every prompt this handle was asked to answer, in call order.
    pub fn prompts_seen(&self) -> Vec<String> {
        self.prompts_seen.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn next_turn(&self) -> ScriptedTurn {
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            ScriptedTurn::text("")
        } else {
            script.remove(0)
        }
    }
}

#[async_trait]
impl LlmHandle for MockLlm {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn gen(&self, prompt: &str) -> Result<String, AgentError> {
        self.prompts_seen.lock().unwrap().push(prompt.to_string());
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let turn = self.next_turn();
        Ok(turn.content.unwrap_or_default())
    }

    async fn gen_with_tools(
        &self,
        prompt: &str,
        _tools: &[ToolOffer],
    ) -> Result<LlmResponse, AgentError> {
        self.prompts_seen.lock().unwrap().push(prompt.to_string());
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let turn = self.next_turn();
        Ok(LlmResponse {
            content: turn.content,
            tool_calls: turn.tool_calls,
            usage: Some(LlmUsage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
            }),
        })
    }

    async fn gen_stream(&self, prompt: &str) -> Result<ChunkStream, AgentError> {
        let text = self.gen(prompt).await?;
        let chunks: Vec<Result<String, AgentError>> = text
            .split_whitespace()
            .map(|w| Ok(format!("{w} ")))
            .collect();
        Ok(Box::pin(tokio_stream::iter(chunks)))
    }

    fn last_usage(&self) -> Option<LlmUsage> {
        Some(LlmUsage {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
        })
    }
}
