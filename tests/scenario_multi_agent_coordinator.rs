//! A coordinator step with one registered sub-agent: the coordinator
//! delegates once, then terminates with `DONE:`.

use std::sync::Arc;

use skein::llm::mock::{MockLlm, ScriptedTurn};
use skein::pipeline::{AgentSpec, LlmStep};
use skein::{ExecutionContext, Pipeline};

#[tokio::test]
async fn coordinator_delegates_once_then_terminates_on_done() {
    let researcher_llm = Arc::new(MockLlm::new("mock-researcher", vec![ScriptedTurn::text("found it")]));
    let researcher_pipeline = Pipeline::new().llm(LlmStep {
        prompt: Some("do the research".into()),
        llm_override: Some(researcher_llm.clone()),
        ..Default::default()
    });

    let coordinator_llm = Arc::new(MockLlm::new(
        "mock-coordinator",
        vec![
            ScriptedTurn::text("USE researcher: X"),
            ScriptedTurn::text("DONE: ok"),
        ],
    ));
    let ctx = ExecutionContext::new(coordinator_llm.clone());

    let agents = vec![AgentSpec {
        name: "researcher".into(),
        description: "does research".into(),
        pipeline: researcher_pipeline,
    }];
    let pipeline = Pipeline::new().llm(LlmStep {
        prompt: Some("top-level task".into()),
        agents: Some(agents),
        ..Default::default()
    });

    let results = pipeline.run(&ctx, None).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].final_text.as_deref(), Some("ok"));
    assert_eq!(results[0].agent_calls.len(), 1);
    assert_eq!(results[0].agent_calls[0].name, "researcher");
    assert!(results[0].agent_calls[0].task.contains('X'));

    // The sub-agent's own pipeline ran exactly once, with the delegated task.
    assert_eq!(researcher_llm.call_count(), 1);
    assert_eq!(coordinator_llm.call_count(), 2);
}
