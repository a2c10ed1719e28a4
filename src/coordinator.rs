//! Multi-Agent Coordinator (component H): a step's LLM drives sub-agent
//! delegation through a small textual `USE <name>: <task>` / `DONE: <final>`
//! protocol.
//!
//! Per spec §9's open question, the literal-token protocol is parsed by a
//! dedicated, narrowly-scoped parser (`parse_directive`) returning a closed
//! enum rather than ad hoc string matching, so a model that rambles before
//! emitting a directive surfaces as `Unrecognized` (a format-correction
//! nudge, the loop continues) instead of silently hanging.

use crate::error::AgentError;
use crate::llm::LlmHandle;
use crate::step::AgentCallRecord;
use crate::telemetry::{Attrs, AttrValue, TelemetryEmitter};

pub const MAX_COORDINATOR_TURNS: u32 = 10;

/// One sub-agent available to a coordinator step: a name, a description
/// shown in the directory listing, and a closure invoking its pipeline.
pub struct SubAgent<'a> {
    pub name: String,
    pub description: String,
    pub invoke: Box<dyn Fn(&str) -> InvokeFuture<'a> + 'a>,
}

pub type InvokeFuture<'a> =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<(String, u64), AgentError>> + Send + 'a>>;

/// A parsed coordinator directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Use { name: String, task: String },
    Done(String),
    Unrecognized,
}

/// Parses one line of coordinator output per the scoped grammar: a line
/// beginning with `USE <name>: <task>` or `DONE: <final>` (whitespace
/// around the colon is tolerated; matching is on the text's first
/// non-blank line so a model that wraps the directive in other prose is
/// still recognized as long as the directive opens the reply).
pub fn parse_directive(text: &str) -> Directive {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let trimmed = first_line.trim();

    if let Some(rest) = trimmed.strip_prefix("DONE:") {
        return Directive::Done(rest.trim().to_string());
    }
    if let Some(rest) = trimmed.strip_prefix("USE ") {
        if let Some((name, task)) = rest.split_once(':') {
            let name = name.trim();
            let task = task.trim();
            if !name.is_empty() {
                return Directive::Use {
                    name: name.to_string(),
                    task: task.to_string(),
                };
            }
        }
    }
    Directive::Unrecognized
}

fn directory_listing(agents: &[SubAgent]) -> String {
    agents
        .iter()
        .map(|a| format!("- {}: {}", a.name, a.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn coordinator_frame(original_prompt: &str, agents: &[SubAgent], transcript: &str) -> String {
    format!(
        "{original_prompt}\n\nAvailable agents:\n{}\n\nRespond with either:\n\
         USE <name>: <task>\nor\nDONE: <final answer>\n\n{transcript}",
        directory_listing(agents)
    )
}

/// Runs the coordinator loop (spec §4.H). Returns the final text and the
/// sub-agent-call records accumulated along the way. If `agents` is empty
/// the sentinel text is returned immediately, per spec.
pub async fn run(
    coordinator_llm: &dyn LlmHandle,
    original_prompt: &str,
    agents: &[SubAgent<'_>],
    emitter: &dyn TelemetryEmitter,
) -> Result<(String, Vec<AgentCallRecord>), AgentError> {
    if agents.is_empty() || agents.iter().any(|a| a.name.is_empty() || a.description.is_empty()) {
        return Ok((
            "No agents available or agents missing name/description".to_string(),
            Vec::new(),
        ));
    }

    let mut transcript = String::new();
    let mut records = Vec::new();

    for _ in 0..MAX_COORDINATOR_TURNS {
        let prompt = coordinator_frame(original_prompt, agents, &transcript);
        let mut llm_attrs = Attrs::new();
        llm_attrs.insert("provider", AttrValue::Str(coordinator_llm.provider().to_string()));
        llm_attrs.insert("model", AttrValue::Str(coordinator_llm.model().to_string()));
        let llm_span = emitter.start_span("llm.generate", llm_attrs);
        let reply = coordinator_llm.gen(&prompt).await;
        match &reply {
            Ok(_) => llm_span.end_ok(),
            Err(e) => llm_span.end_err(&e.to_string()),
        }
        let reply = reply?;

        match parse_directive(&reply) {
            Directive::Done(final_text) => return Ok((final_text, records)),
            Directive::Use { name, task } => match agents.iter().find(|a| a.name == name) {
                Some(agent) => {
                    let started = std::time::Instant::now();
                    let (result_text, tokens) = (agent.invoke)(&task).await?;
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    transcript.push_str(&format!(
                        "Agent '{name}' completed their task: {result_text}\n"
                    ));
                    let mut call_attrs = Attrs::new();
                    call_attrs.insert("agent_name", AttrValue::Str(name.clone()));
                    emitter.incr_counter("agent.subagent_call", 1, call_attrs);
                    records.push(AgentCallRecord {
                        name,
                        task,
                        result_text,
                        token_count: tokens,
                        elapsed_ms,
                    });
                }
                None => {
                    transcript.push_str(&format!("Error: no agent named '{name}' is registered.\n"));
                }
            },
            Directive::Unrecognized => {
                transcript.push_str(
                    "Error: expected a line starting with `USE <name>: <task>` or `DONE: <final>`.\n",
                );
            }
        }
    }

    Ok(("".to_string(), records))
}
