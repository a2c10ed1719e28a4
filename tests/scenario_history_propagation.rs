//! Two plain `Llm` steps: the second step's prompt must carry the first
//! step's output as prior context.

use std::sync::Arc;

use skein::pipeline::LlmStep;
use skein::{ExecutionContext, Pipeline};

/// An LLM stub that echoes whatever prompt it's handed, so the second call's
/// prompt text can be inspected directly for the first call's answer.
struct EchoLlm;

#[async_trait::async_trait]
impl skein::llm::LlmHandle for EchoLlm {
    fn provider(&self) -> &str {
        "echo"
    }
    fn model(&self) -> &str {
        "echo-model"
    }
    async fn gen(&self, prompt: &str) -> Result<String, skein::AgentError> {
        Ok(prompt.to_string())
    }
    async fn gen_with_tools(
        &self,
        prompt: &str,
        _tools: &[skein::llm::ToolOffer],
    ) -> Result<skein::llm::LlmResponse, skein::AgentError> {
        Ok(skein::llm::LlmResponse {
            content: Some(prompt.to_string()),
            tool_calls: Vec::new(),
            usage: None,
        })
    }
    async fn gen_stream(&self, _prompt: &str) -> Result<skein::llm::ChunkStream, skein::AgentError> {
        unimplemented!("not exercised by this scenario")
    }
}

#[tokio::test]
async fn two_step_history_propagates_into_the_next_prompt() {
    let ctx = ExecutionContext::new(Arc::new(EchoLlm));
    let pipeline = Pipeline::new()
        .llm(LlmStep {
            prompt: Some("one".into()),
            ..Default::default()
        })
        .llm(LlmStep {
            prompt: Some("two".into()),
            ..Default::default()
        });

    let results = pipeline.run(&ctx, None).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].prompt.as_deref(), Some("one"));
    assert_eq!(results[0].final_text.as_deref(), Some("one"));
    assert_eq!(results[1].final_text.as_deref(), Some("two"));

    let second_prompt = results[1].prompt.as_ref().unwrap();
    assert!(second_prompt.contains("[Context from previous steps]"));
    assert!(second_prompt.contains("one"));
}
