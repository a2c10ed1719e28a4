//! Auto-Tool-Selection Loop (component G): iterates LLM↔tool exchanges
//! until the LLM emits a final answer with no further tool calls, or the
//! iteration bound is hit.

use serde_json::Value;

use crate::error::AgentError;
use crate::llm::{LlmHandle, ToolCall, ToolOffer};
use crate::mcp::pool::McpPool;
use crate::retry::RetryPolicy;
use crate::telemetry::{Attrs, AttrValue, TelemetryEmitter};
use crate::tools::analyzer::{self, ResourceKeyHeuristic};
use crate::tools::discovery;
use crate::tools::executor;
use crate::tools::ToolCallRecord;
use crate::tools::ToolDefinition;

pub const DEFAULT_MAX_ITERATIONS: usize = 4;

/// Result of running the loop to completion (spec §3's Llm step-result
/// shape, the subset this component is responsible for).
pub struct AutoLoopOutcome {
    pub final_text: Option<String>,
    pub tool_calls: Vec<ToolCallRecord>,
}

fn to_offer(def: &ToolDefinition) -> ToolOffer {
    ToolOffer {
        name: def.sanitized_name.clone(),
        description: def.description.clone(),
        parameters: def.parameters.clone(),
    }
}

fn augment(prompt: &str, calls: &[ToolCall], results: &[(ToolCall, ToolCallRecord)]) -> String {
    let mut out = String::new();
    out.push_str(prompt);
    out.push_str("\n\n[Tool results]\n");
    for (call, record) in results {
        let _ = calls; // calls kept for signature symmetry with spec pseudocode
        let rendered = match &record.result {
            Ok(v) => v.to_string(),
            Err(e) => format!("error: {e}"),
        };
        out.push_str(&format!(
            "{}({}) -> {}\n",
            call.name,
            Value::Object(call.arguments.clone()),
            rendered
        ));
    }
    out
}

/// Runs the auto-tool-selection loop (spec §4.G). `catalog` is the flattened
/// set of tools available this step (from discovery and/or explicit tools);
/// `heuristic` drives the parallelization analyzer.
pub async fn run(
    llm: &dyn LlmHandle,
    initial_prompt: &str,
    catalog: &[ToolDefinition],
    pool: &McpPool,
    max_iterations: usize,
    retry_policy: &RetryPolicy,
    heuristic: &dyn ResourceKeyHeuristic,
    emitter: &dyn TelemetryEmitter,
) -> Result<AutoLoopOutcome, AgentError> {
    let offers: Vec<ToolOffer> = catalog.iter().map(to_offer).collect();
    let mut prompt = initial_prompt.to_string();
    let mut acc: Vec<ToolCallRecord> = Vec::new();
    let mut last_content: Option<String> = None;

    for _ in 0..max_iterations.max(1) {
        let mut llm_attrs = Attrs::new();
        llm_attrs.insert("provider", AttrValue::Str(llm.provider().to_string()));
        llm_attrs.insert("model", AttrValue::Str(llm.model().to_string()));
        let llm_span = emitter.start_span("llm.generate", llm_attrs);
        let reply = llm.gen_with_tools(&prompt, &offers).await;
        match &reply {
            Ok(_) => llm_span.end_ok(),
            Err(e) => llm_span.end_err(&e.to_string()),
        }
        let reply = reply?;
        last_content = reply.content.clone();

        if reply.tool_calls.is_empty() {
            return Ok(AutoLoopOutcome {
                final_text: reply.content,
                tool_calls: acc,
            });
        }

        let groups = analyzer::plan(&reply.tool_calls, heuristic);
        let mut turn_results: Vec<(ToolCall, ToolCallRecord)> = Vec::new();

        for group in groups {
            let futures = group.into_iter().map(|call| {
                let def = discovery::resolve(catalog, &call.name).cloned();
                let pool = pool;
                async move {
                    match def {
                        Some(def) => {
                            let (record, fatal) = executor::execute(
                                pool,
                                &def,
                                Value::Object(call.arguments.clone()),
                                retry_policy,
                                emitter,
                            )
                            .await;
                            (call, record, fatal)
                        }
                        None => {
                            let record = ToolCallRecord {
                                tool_name: call.name.clone(),
                                arguments: Value::Object(call.arguments.clone()),
                                endpoint: String::new(),
                                result: Err(format!("unknown tool `{}`", call.name)),
                                elapsed_ms: 0,
                            };
                            (call, record, None)
                        }
                    }
                }
            });

            let outcomes = futures::future::join_all(futures).await;
            for (call, record, fatal) in outcomes {
                if let Some(err) = fatal {
                    if !err.is_retryable() {
                        return Err(err);
                    }
                }
                turn_results.push((call, record.clone()));
                acc.push(record);
            }
        }

        prompt = augment(&prompt, &reply.tool_calls, &turn_results);
    }

    Ok(AutoLoopOutcome {
        final_text: last_content,
        tool_calls: acc,
    })
}
