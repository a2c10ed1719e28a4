//! Starting a second `run`/`stream` on the same built pipeline value while
//! one is already in flight is rejected before any step executes.

use std::sync::Arc;

use tokio_stream::StreamExt;

use skein::pipeline::LlmStep;
use skein::{AgentError, ExecutionContext, Pipeline};

/// An LLM handle that never resolves on its own; the test drives completion
/// by dropping the stream, not by waiting it out.
struct StallingLlm;

#[async_trait::async_trait]
impl skein::llm::LlmHandle for StallingLlm {
    fn provider(&self) -> &str {
        "stalling"
    }
    fn model(&self) -> &str {
        "stalling-model"
    }
    async fn gen(&self, _prompt: &str) -> Result<String, AgentError> {
        std::future::pending::<()>().await;
        unreachable!()
    }
    async fn gen_with_tools(
        &self,
        _prompt: &str,
        _tools: &[skein::llm::ToolOffer],
    ) -> Result<skein::llm::LlmResponse, AgentError> {
        unimplemented!("not exercised by this scenario")
    }
    async fn gen_stream(&self, _prompt: &str) -> Result<skein::llm::ChunkStream, AgentError> {
        unimplemented!("not exercised by this scenario")
    }
}

#[tokio::test]
async fn a_second_run_while_streaming_is_rejected_without_another_llm_call() {
    let ctx = ExecutionContext::new(Arc::new(StallingLlm));
    let pipeline = Pipeline::new().llm(LlmStep {
        prompt: Some("x".into()),
        ..Default::default()
    });

    let mut stream = pipeline.stream(ctx.clone()).unwrap();

    // The spawned stream task is already holding the concurrency guard; a
    // second terminal call on the same built value must reject immediately,
    // well before the stalled first run could ever complete.
    let err = pipeline.run(&ctx, None).await.unwrap_err();
    assert!(matches!(err, AgentError::AgentConcurrencyError));

    // No step result was ever produced by the stalled stream.
    let next = tokio::time::timeout(std::time::Duration::from_millis(50), stream.next()).await;
    assert!(next.is_err(), "stalled stream should not have produced anything yet");
}
