//! Scheduler/Interpreter (component I): walks a `Pipeline`'s step-node tree,
//! dispatching each node to the right component (the context builder, the
//! retry harness, the auto-tool-selection loop, the multi-agent coordinator,
//! the tool executor) and accumulating `StepResult`s in traversal order
//! (spec §4.I).

use std::sync::Arc;
use std::time::Instant;

use futures::future::{join_all, BoxFuture};
use serde_json::Value;
use tokio::sync::mpsc::Sender;

use crate::autoloop::{self, DEFAULT_MAX_ITERATIONS};
use crate::context::{self, ContextBudget};
use crate::coordinator::{self, SubAgent};
use crate::error::{AgentError, ErrorMeta};
use crate::llm::LlmHandle;
use crate::mcp::pool::McpPool;
use crate::pipeline::{AgentSpec, Hook, Hooks, Pipeline, StepNode};
use crate::retry::{with_retry, RetryPolicy};
use crate::step::{AgentCallRecord, McpCallRecord, StepKind, StepResult};
use crate::telemetry::{Attrs, AttrValue, NoopEmitter, TelemetryEmitter};
use crate::tools::analyzer::{DefaultResourceKeyHeuristic, ResourceKeyHeuristic};
use crate::tools::discovery::ToolCatalog;
use crate::tools::executor;
use crate::tools::ToolDefinition;

/// Everything a walk needs beyond the pipeline definition itself: the
/// fallback LLM handle, the shared MCP pool and tool catalog, and the policy
/// knobs a caller may override for a given run (spec §4.I, §9).
#[derive(Clone)]
pub struct ExecutionContext {
    pub default_llm: Option<Arc<dyn LlmHandle>>,
    pub pool: Arc<McpPool>,
    pub catalog: Arc<ToolCatalog>,
    pub budget: ContextBudget,
    pub retry_policy: RetryPolicy,
    pub heuristic: Arc<dyn ResourceKeyHeuristic>,
    pub emitter: Arc<dyn TelemetryEmitter>,
    pub default_instructions: Option<String>,
    pub default_max_tool_iterations: usize,
}

impl ExecutionContext {
    pub fn new(default_llm: Arc<dyn LlmHandle>) -> Self {
        Self {
            default_llm: Some(default_llm),
            pool: Arc::new(McpPool::new()),
            catalog: Arc::new(ToolCatalog::new()),
            budget: ContextBudget::default(),
            retry_policy: RetryPolicy::default(),
            heuristic: Arc::new(DefaultResourceKeyHeuristic),
            emitter: Arc::new(NoopEmitter),
            default_instructions: None,
            default_max_tool_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Eager entry point: walks `pipeline`'s nodes, seeding the visible history
/// with `seed_history` (a parent's accumulated results, for `RunAgent` and
/// nested control-flow bodies), and returns only the results this pipeline
/// itself contributed.
pub async fn run_with_seed(
    pipeline: &Pipeline,
    ctx: &ExecutionContext,
    seed_history: Vec<StepResult>,
    on_step: Option<Hook>,
) -> Result<Vec<StepResult>, AgentError> {
    let seed_len = seed_history.len();
    let mut history = seed_history;
    walk_nodes(pipeline.nodes(), ctx, &mut history, None, on_step.as_ref()).await?;
    Ok(history.split_off(seed_len))
}

/// Streaming entry point: same walk, but every `StepResult` is sent to `tx`
/// as soon as it's produced instead of being collected into a `Vec`.
pub async fn run_streaming(
    pipeline: &Pipeline,
    ctx: &ExecutionContext,
    seed_history: Vec<StepResult>,
    tx: &Sender<Result<StepResult, AgentError>>,
) -> Result<(), AgentError> {
    let mut history = seed_history;
    walk_nodes(pipeline.nodes(), ctx, &mut history, Some(tx), None).await
}

async fn emit(
    result: StepResult,
    history: &mut Vec<StepResult>,
    tx: Option<&Sender<Result<StepResult, AgentError>>>,
    on_step: Option<&Hook>,
) {
    if let Some(tx) = tx {
        let _ = tx.send(Ok(result.clone())).await;
    }
    history.push(result);
    if let Some(hook) = on_step {
        hook(history);
    }
}

fn call_hook(hook: Option<&Hook>, history: &[StepResult]) -> bool {
    match hook {
        Some(h) => {
            h(history);
            true
        }
        None => false,
    }
}

fn walk_nodes<'a>(
    nodes: &'a [Arc<StepNode>],
    ctx: &'a ExecutionContext,
    history: &'a mut Vec<StepResult>,
    tx: Option<&'a Sender<Result<StepResult, AgentError>>>,
    on_step: Option<&'a Hook>,
) -> BoxFuture<'a, Result<(), AgentError>> {
    Box::pin(async move {
        for node in nodes {
            walk_node(node, ctx, history, tx, on_step).await?;
        }
        Ok(())
    })
}

fn walk_node<'a>(
    node: &'a StepNode,
    ctx: &'a ExecutionContext,
    history: &'a mut Vec<StepResult>,
    tx: Option<&'a Sender<Result<StepResult, AgentError>>>,
    on_step: Option<&'a Hook>,
) -> BoxFuture<'a, Result<(), AgentError>> {
    Box::pin(async move {
        match node {
            StepNode::Llm(step) => run_llm_step(step, ctx, history, tx, on_step).await,
            StepNode::ExplicitTool(step) => run_tool_step(step, ctx, history, tx, on_step).await,
            StepNode::Parallel { children, hooks } => {
                run_parallel(children, hooks, ctx, history, tx, on_step).await
            }
            StepNode::Branch {
                predicate,
                when_true,
                when_false,
                hooks,
            } => {
                call_hook(hooks.pre.as_ref(), history);
                let chosen = if predicate(history) { when_true } else { when_false };
                walk_nodes(chosen.nodes(), ctx, history, tx, on_step).await?;
                call_hook(hooks.post.as_ref(), history);
                Ok(())
            }
            StepNode::Switch {
                key_fn,
                cases,
                default,
                hooks,
            } => {
                call_hook(hooks.pre.as_ref(), history);
                let key = key_fn(history);
                let chosen = cases
                    .iter()
                    .find(|(case_key, _)| *case_key == key)
                    .map(|(_, p)| p)
                    .unwrap_or(default);
                walk_nodes(chosen.nodes(), ctx, history, tx, on_step).await?;
                call_hook(hooks.post.as_ref(), history);
                Ok(())
            }
            StepNode::While {
                predicate,
                body,
                max_iterations,
                hooks,
            } => {
                call_hook(hooks.pre.as_ref(), history);
                for _ in 0..*max_iterations {
                    if !predicate(history) {
                        break;
                    }
                    walk_nodes(body.nodes(), ctx, history, tx, on_step).await?;
                }
                call_hook(hooks.post.as_ref(), history);
                Ok(())
            }
            StepNode::ForEach {
                items,
                factory,
                hooks,
            } => {
                call_hook(hooks.pre.as_ref(), history);
                for item in items {
                    let child = factory(item);
                    walk_nodes(child.nodes(), ctx, history, tx, on_step).await?;
                }
                call_hook(hooks.post.as_ref(), history);
                Ok(())
            }
            StepNode::RetryUntil {
                factory,
                satisfied,
                max_attempts,
                hooks,
            } => {
                call_hook(hooks.pre.as_ref(), history);
                run_retry_until(factory, satisfied, *max_attempts, ctx, history, tx, on_step).await?;
                call_hook(hooks.post.as_ref(), history);
                Ok(())
            }
            StepNode::RunAgent { other, hooks } => {
                call_hook(hooks.pre.as_ref(), history);
                let seed = history.clone();
                let sub_results = run_with_seed(other, ctx, seed, None).await?;
                if let Some(tx) = tx {
                    for r in &sub_results {
                        let _ = tx.send(Ok(r.clone())).await;
                    }
                }
                history.extend(sub_results);
                call_hook(hooks.post.as_ref(), history);
                if let Some(hook) = on_step {
                    hook(history);
                }
                Ok(())
            }
        }
    })
}

/// Runs `body` up to `max_attempts` times via `factory`, accepting the first
/// attempt whose last produced step result satisfies `satisfied`. If no
/// attempt satisfies it, the final attempt's results are kept anyway (the
/// step still completes; it just never got a satisfying answer) — the
/// matching spec §9 open-question decision is documented in DESIGN.md.
async fn run_retry_until<'a>(
    factory: &'a crate::pipeline::RetryFactory,
    satisfied: &'a crate::pipeline::SatisfiedFn,
    max_attempts: usize,
    ctx: &'a ExecutionContext,
    history: &'a mut Vec<StepResult>,
    tx: Option<&'a Sender<Result<StepResult, AgentError>>>,
    on_step: Option<&'a Hook>,
) -> Result<(), AgentError> {
    let base_len = history.len();
    for attempt in 1..=max_attempts.max(1) {
        let mut local = history[..base_len].to_vec();
        let child = factory();
        walk_nodes(child.nodes(), ctx, &mut local, None, None).await?;
        let produced = local.split_off(base_len);

        let accepted = produced.last().map(|last| satisfied(last)).unwrap_or(false);
        if accepted || attempt == max_attempts {
            if let Some(tx) = tx {
                for r in &produced {
                    let _ = tx.send(Ok(r.clone())).await;
                }
            }
            history.extend(produced);
            if let Some(hook) = on_step {
                hook(history);
            }
            return Ok(());
        }
    }
    Ok(())
}

fn effective_retry_policy(step_retry: &Option<RetryPolicy>, ctx: &ExecutionContext, timeout: Option<std::time::Duration>) -> RetryPolicy {
    let mut policy = step_retry.clone().unwrap_or_else(|| ctx.retry_policy.clone());
    if timeout.is_some() {
        policy.timeout = timeout;
    }
    policy
}

async fn run_llm_step<'a>(
    step: &'a crate::pipeline::LlmStep,
    ctx: &'a ExecutionContext,
    history: &'a mut Vec<StepResult>,
    tx: Option<&'a Sender<Result<StepResult, AgentError>>>,
    on_step: Option<&'a Hook>,
) -> Result<(), AgentError> {
    call_hook(step.hooks.pre.as_ref(), history);
    let index = history.len();
    let span = ctx.emitter.start_span("step.execute", span_attrs(index, "llm"));

    let started = Instant::now();
    let effective_instructions = step.instructions.clone().or_else(|| ctx.default_instructions.clone());
    let prompt_text = context::build_prompt(
        effective_instructions.as_deref(),
        history,
        step.prompt.as_deref().unwrap_or(""),
        &ctx.budget,
    );

    let llm = match step.llm_override.clone().or_else(|| ctx.default_llm.clone()) {
        Some(llm) => llm,
        None => {
            span.end_err("no LLM handle available");
            return Err(AgentError::BuildError(
                "LLM step has no llm_override and the execution context has no default_llm".into(),
            ));
        }
    };
    let policy = effective_retry_policy(&step.retry, ctx, step.timeout);

    let mut result = StepResult::new(index, StepKind::Llm);
    result.name = step.name.clone();
    result.prompt = Some(prompt_text.clone());
    result.pre_hook_ran = step.hooks.pre.is_some();

    let outcome: Result<(), AgentError> = async {
        if let Some(agents) = &step.agents {
            if !agents.is_empty() {
                let sub_agents = build_sub_agents(agents, ctx, history);
                let (final_text, agent_calls) =
                    coordinator::run(llm.as_ref(), &prompt_text, &sub_agents, ctx.emitter.as_ref()).await?;
                result.final_text = Some(final_text);
                result.agent_calls = agent_calls;
                return Ok(());
            }
        }

        if !step.mcps.is_empty() || !step.explicit_tools.is_empty() {
            let mut catalog = ctx.catalog.discover(&ctx.pool, &step.mcps).await?;
            catalog.extend(step.explicit_tools.iter().cloned());
            let max_iter = step.max_tool_iterations.unwrap_or(ctx.default_max_tool_iterations);
            let outcome = autoloop::run(
                llm.as_ref(),
                &prompt_text,
                &catalog,
                &ctx.pool,
                max_iter,
                &policy,
                ctx.heuristic.as_ref(),
                ctx.emitter.as_ref(),
            )
            .await?;
            result.final_text = outcome.final_text;
            result.tool_calls = outcome.tool_calls;
            return Ok(());
        }

        let prompt_ref = &prompt_text;
        let llm_ref = llm.as_ref();
        let mut llm_attrs = Attrs::new();
        llm_attrs.insert("provider", AttrValue::Str(llm_ref.provider().to_string()));
        llm_attrs.insert("model", AttrValue::Str(llm_ref.model().to_string()));
        let llm_span = ctx.emitter.start_span("llm.generate", llm_attrs);
        let text = with_retry(&policy, None, || async move { llm_ref.gen(prompt_ref).await }).await;
        match &text {
            Ok(_) => llm_span.end_ok(),
            Err(e) => llm_span.end_err(&e.to_string()),
        }
        result.final_text = Some(text?);
        Ok(())
    }
    .await;

    if let Err(e) = outcome {
        span.end_err(&e.to_string());
        return Err(e.with_step_id(index));
    }

    let duration_ms = started.elapsed().as_millis() as u64;
    result.tool_ms = result.tool_calls.iter().map(|c| c.elapsed_ms).sum();
    result.duration_ms = duration_ms.max(result.tool_ms);
    result.llm_ms = result.duration_ms.saturating_sub(result.tool_ms);
    result.token_usage = llm.last_usage();
    result.post_hook_ran = step.hooks.post.is_some();

    if let Some(usage) = &result.token_usage {
        let mut token_attrs = Attrs::new();
        token_attrs.insert("step_index", AttrValue::Int(index as i64));
        ctx.emitter
            .incr_counter("llm.tokens.input", usage.input_tokens, token_attrs.clone());
        ctx.emitter
            .incr_counter("llm.tokens.output", usage.output_tokens, token_attrs.clone());
        ctx.emitter
            .incr_counter("llm.tokens.total", usage.total_tokens, token_attrs.clone());
        ctx.emitter.incr_counter("agent.tokens", usage.total_tokens, token_attrs);
    }

    span.end_ok();
    emit(result, history, tx, on_step).await;
    call_hook(step.hooks.post.as_ref(), history);
    Ok(())
}

fn build_sub_agents<'a>(
    agents: &'a [AgentSpec],
    ctx: &'a ExecutionContext,
    history: &'a [StepResult],
) -> Vec<SubAgent<'a>> {
    let seed = history.to_vec();
    agents
        .iter()
        .map(|spec| {
            let ctx = ctx.clone();
            let pipeline = spec.pipeline.clone();
            let seed = seed.clone();
            SubAgent {
                name: spec.name.clone(),
                description: spec.description.clone(),
                invoke: Box::new(move |task: &str| {
                    let ctx = ctx.clone();
                    let pipeline = pipeline.clone();
                    let seed = seed.clone();
                    let task = task.to_string();
                    Box::pin(async move {
                        let mut seed = seed;
                        // Seeds the sub-agent's own history with a synthetic
                        // record carrying the delegated task, so its context
                        // builder (component A) surfaces it as prior context
                        // even though the sub-pipeline's own steps don't
                        // reference `task` directly.
                        let mut task_result = StepResult::new(seed.len(), StepKind::Llm);
                        task_result.prompt = Some(task.clone());
                        seed.push(task_result);
                        let results = run_with_seed(&pipeline, &ctx, seed, None).await?;
                        let final_text = results
                            .last()
                            .and_then(|r| r.final_text.clone())
                            .unwrap_or_default();
                        let tokens = results
                            .iter()
                            .filter_map(|r| r.token_usage.as_ref())
                            .map(|u| u.total_tokens)
                            .sum();
                        Ok((final_text, tokens))
                    })
                }),
            }
        })
        .collect()
}

async fn run_tool_step<'a>(
    step: &'a crate::pipeline::ExplicitToolStep,
    ctx: &'a ExecutionContext,
    history: &'a mut Vec<StepResult>,
    tx: Option<&'a Sender<Result<StepResult, AgentError>>>,
    on_step: Option<&'a Hook>,
) -> Result<(), AgentError> {
    call_hook(step.hooks.pre.as_ref(), history);
    let index = history.len();
    let span = ctx.emitter.start_span("step.execute", span_attrs(index, "explicit_tool"));
    let started = Instant::now();

    let def = resolve_explicit_tool_def(ctx, step).await?;
    let policy = effective_retry_policy(&step.retry, ctx, step.timeout);
    let (record, fatal) =
        executor::execute(&ctx.pool, &def, step.arguments.clone(), &policy, ctx.emitter.as_ref()).await;

    if let Some(err) = fatal {
        span.end_err(&err.to_string());
        return Err(AgentError::StepFailed {
            step_id: index,
            source: Box::new(err),
        });
    }

    let duration_ms = started.elapsed().as_millis() as u64;
    let mut result = StepResult::new(index, StepKind::ExplicitTool);
    result.mcp_call = Some(McpCallRecord {
        tool_name: step.tool_name.clone(),
        endpoint: step.mcp.endpoint.clone(),
        arguments: step.arguments.clone(),
        result: record.result,
        elapsed_ms: record.elapsed_ms,
    });
    result.duration_ms = duration_ms.max(record.elapsed_ms);
    result.tool_ms = record.elapsed_ms;
    result.pre_hook_ran = step.hooks.pre.is_some();
    result.post_hook_ran = step.hooks.post.is_some();

    span.end_ok();
    emit(result, history, tx, on_step).await;
    call_hook(step.hooks.post.as_ref(), history);
    Ok(())
}

/// Explicit-tool steps don't carry a JSON-Schema of their own; the schema
/// used for validation (component F) comes from discovering the single
/// handle's catalog and matching by short tool name, falling back to a
/// permissive schema if the tool isn't advertised by `tools/list` (e.g. a
/// server that doesn't support discovery at all).
async fn resolve_explicit_tool_def(
    ctx: &ExecutionContext,
    step: &crate::pipeline::ExplicitToolStep,
) -> Result<ToolDefinition, AgentError> {
    let catalog = ctx.catalog.discover(&ctx.pool, std::slice::from_ref(&step.mcp)).await?;
    if let Some(def) = catalog.iter().find(|d| {
        d.dotted_name
            .rsplit_once('.')
            .map(|(_, name)| name == step.tool_name)
            .unwrap_or(false)
    }) {
        return Ok(def.clone());
    }
    let endpoint_id = step.mcp.endpoint_id();
    Ok(ToolDefinition {
        dotted_name: format!("{endpoint_id}.{}", step.tool_name),
        sanitized_name: crate::mcp::sanitize_identifier(&format!("{endpoint_id}.{}", step.tool_name)),
        description: String::new(),
        parameters: Value::Object(serde_json::Map::new()),
        mcp_handle: step.mcp.clone(),
    })
}

async fn run_parallel<'a>(
    children: &'a [Pipeline],
    hooks: &'a Hooks,
    ctx: &'a ExecutionContext,
    history: &'a mut Vec<StepResult>,
    tx: Option<&'a Sender<Result<StepResult, AgentError>>>,
    on_step: Option<&'a Hook>,
) -> Result<(), AgentError> {
    call_hook(hooks.pre.as_ref(), history);
    let index = history.len();
    let span = ctx.emitter.start_span("step.execute", span_attrs(index, "parallel"));
    let started = Instant::now();

    let seed = history.clone();
    let futures = children.iter().map(|child| {
        let ctx = ctx.clone();
        let seed = seed.clone();
        async move { run_with_seed(child, &ctx, seed, None).await }
    });
    let outcomes = join_all(futures).await;

    // Surface the first child's error, in declaration order, rather than
    // the first one to finish (spec §4.E's sibling-independence rule
    // applied at the pipeline level).
    if let Some(err) = outcomes.iter().find_map(|o| o.as_ref().err()) {
        let err = AgentError::StepFailed {
            step_id: index,
            source: Box::new(clone_agent_error(err)),
        };
        span.end_err(&err.to_string());
        return Err(err);
    }

    let mut child_results = Vec::new();
    for outcome in outcomes {
        child_results.extend(outcome.expect("checked above"));
    }
    if let Some(tx) = tx {
        for r in &child_results {
            let _ = tx.send(Ok(r.clone())).await;
        }
    }
    history.extend(child_results);

    let mut result = StepResult::new(index, StepKind::Parallel);
    result.duration_ms = started.elapsed().as_millis() as u64;
    result.pre_hook_ran = hooks.pre.is_some();
    result.post_hook_ran = hooks.post.is_some();

    span.end_ok();
    emit(result, history, tx, on_step).await;
    call_hook(hooks.post.as_ref(), history);
    Ok(())
}

/// `AgentError` doesn't implement `Clone` (it wraps boxed `dyn Error`-like
/// sources); parallel fan-out only needs the first failure's text to
/// construct a fresh error of the same shape.
fn clone_agent_error(err: &AgentError) -> AgentError {
    match err {
        AgentError::ValidationError(m) => AgentError::ValidationError(m.clone()),
        AgentError::StepFailed { step_id, source } => AgentError::StepFailed {
            step_id: *step_id,
            source: Box::new(clone_agent_error(source)),
        },
        other => AgentError::McpToolError {
            message: other.to_string(),
            meta: ErrorMeta::new("parallel-child", false),
        },
    }
}

fn span_attrs(index: usize, step_kind: &str) -> Attrs {
    let mut attrs = Attrs::new();
    attrs.insert("step_index", AttrValue::Int(index as i64));
    attrs.insert("step_kind", AttrValue::Str(step_kind.to_string()));
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{MockLlm, ScriptedTurn};
    use crate::pipeline::{ExplicitToolStep, LlmStep};
    use std::sync::Arc;

    fn ctx_with(llm: MockLlm) -> ExecutionContext {
        ExecutionContext::new(Arc::new(llm))
    }

    #[tokio::test]
    async fn two_plain_llm_steps_see_prior_history_in_their_prompt() {
        let llm = MockLlm::new(
            "mock",
            vec![
                ScriptedTurn::text("first answer"),
                ScriptedTurn::text("second answer"),
            ],
        );
        let ctx = ctx_with(llm);
        let pipeline = Pipeline::new()
            .llm(LlmStep {
                prompt: Some("step one".into()),
                ..Default::default()
            })
            .llm(LlmStep {
                prompt: Some("step two".into()),
                ..Default::default()
            });

        let results = pipeline.run(&ctx, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].final_text.as_deref(), Some("first answer"));
        assert_eq!(results[1].final_text.as_deref(), Some("second answer"));
        assert!(results[1].prompt.as_ref().unwrap().contains("first answer"));
    }

    #[tokio::test]
    async fn branch_runs_only_the_chosen_side() {
        let llm = MockLlm::new("mock", vec![ScriptedTurn::text("true side")]);
        let ctx = ctx_with(llm);
        let when_true = Pipeline::new().llm(LlmStep {
            prompt: Some("t".into()),
            ..Default::default()
        });
        let when_false = Pipeline::new().llm(LlmStep {
            prompt: Some("f".into()),
            ..Default::default()
        });
        let predicate: crate::pipeline::Predicate = Arc::new(|_history: &[StepResult]| true);
        let pipeline = Pipeline::new().branch(predicate, when_true, when_false, Hooks::default());

        let results = pipeline.run(&ctx, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].final_text.as_deref(), Some("true side"));
    }

    #[tokio::test]
    async fn parallel_children_are_emitted_in_declaration_order() {
        let llm = MockLlm::new(
            "mock",
            vec![ScriptedTurn::text("a-result"), ScriptedTurn::text("b-result")],
        );
        let ctx = ctx_with(llm);
        let a = Pipeline::new().llm(LlmStep {
            prompt: Some("a".into()),
            ..Default::default()
        });
        let b = Pipeline::new().llm(LlmStep {
            prompt: Some("b".into()),
            ..Default::default()
        });
        let pipeline = Pipeline::new().parallel(vec![a, b], Hooks::default());

        let results = pipeline.run(&ctx, None).await.unwrap();
        // 2 child results + 1 synthetic parallel-node result.
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].final_text.as_deref(), Some("a-result"));
        assert_eq!(results[1].final_text.as_deref(), Some("b-result"));
        assert_eq!(results[2].kind, StepKind::Parallel);
    }

    #[tokio::test]
    async fn running_the_same_built_pipeline_concurrently_is_rejected() {
        let llm = MockLlm::new("mock", vec![ScriptedTurn::text("slow")]);
        let ctx = ctx_with(llm);
        let pipeline = Pipeline::new().llm(LlmStep {
            prompt: Some("x".into()),
            ..Default::default()
        });

        pipeline.try_begin().unwrap();
        let err = pipeline.run(&ctx, None).await.unwrap_err();
        assert!(matches!(err, AgentError::AgentConcurrencyError));
        pipeline.end();
    }

    #[tokio::test]
    async fn explicit_tool_step_with_no_discoverable_schema_falls_back_to_permissive() {
        use crate::mcp::McpHandle;
        let llm = MockLlm::new("mock", vec![]);
        let ctx = ctx_with(llm);
        let step = ExplicitToolStep {
            mcp: McpHandle::http("https://unreachable.invalid/mcp"),
            tool_name: "noop".into(),
            arguments: Value::Object(serde_json::Map::new()),
            hooks: Hooks::default(),
            timeout: Some(std::time::Duration::from_millis(10)),
            retry: Some(RetryPolicy::default()),
        };
        let pipeline = Pipeline::new().tool(step);
        // Connection will fail against an unreachable host; we only assert
        // this surfaces as a StepFailed rather than panicking the walk.
        let result = pipeline.run(&ctx, None).await;
        assert!(result.is_err());
    }
}
