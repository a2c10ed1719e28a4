//! The data model shared by the pipeline builder (J) and the scheduler (I):
//! step node kinds and the step results they produce (spec §3).

use serde_json::Value;

use crate::context::{self, ContextBudget};
use crate::error::AgentError;
use crate::llm::{LlmHandle, LlmUsage};
use crate::tools::ToolCallRecord;

/// Which kind of node produced a `StepResult`. Carried separately from the
/// builder's node type so results stay a flat, serializable shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    Llm,
    ExplicitTool,
    Parallel,
    Branch,
    Switch,
    While,
    ForEach,
    RetryUntil,
    RunAgent,
}

/// One explicit MCP tool invocation record, as produced by an `ExplicitTool`
/// step (distinct from the auto-selection loop's `ToolCallRecord` list only
/// in that there is exactly one, spec §3).
#[derive(Clone, Debug)]
pub struct McpCallRecord {
    pub tool_name: String,
    pub endpoint: String,
    pub arguments: Value,
    pub result: Result<Value, String>,
    pub elapsed_ms: u64,
}

/// One sub-agent delegation record, as produced inside a multi-agent
/// coordinator step (spec §3, §4.H).
#[derive(Clone, Debug)]
pub struct AgentCallRecord {
    pub name: String,
    pub task: String,
    pub result_text: String,
    pub token_count: u64,
    pub elapsed_ms: u64,
}

/// The outcome of one pipeline node (spec §3). Step-result order always
/// matches pipeline traversal order, even when the node ran concurrently
/// with siblings.
#[derive(Clone, Debug)]
pub struct StepResult {
    pub index: usize,
    pub kind: StepKind,
    pub name: Option<String>,
    pub prompt: Option<String>,
    pub final_text: Option<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub mcp_call: Option<McpCallRecord>,
    pub agent_calls: Vec<AgentCallRecord>,
    pub duration_ms: u64,
    pub llm_ms: u64,
    pub tool_ms: u64,
    pub token_usage: Option<LlmUsage>,
    pub pre_hook_ran: bool,
    pub post_hook_ran: bool,
}

impl StepResult {
    pub fn new(index: usize, kind: StepKind) -> Self {
        Self {
            index,
            kind,
            name: None,
            prompt: None,
            final_text: None,
            tool_calls: Vec::new(),
            mcp_call: None,
            agent_calls: Vec::new(),
            duration_ms: 0,
            llm_ms: 0,
            tool_ms: 0,
            token_usage: None,
            pre_hook_ran: false,
            post_hook_ran: false,
        }
    }

    /// Invariant asserted by spec §3/§8: timings never exceed the step's
    /// overall duration.
    pub fn timings_are_consistent(&self) -> bool {
        self.llm_ms <= self.duration_ms && self.tool_ms <= self.duration_ms
    }
}

/// The terminal return value of `Pipeline::run` (spec §3 Data Model):
/// the ordered step results of one walk, plus the ability to `ask` a
/// one-shot follow-up question over all of them. Derefs transparently to
/// `Vec<StepResult>` so callers can index/iterate it exactly like the
/// underlying vector.
#[derive(Clone, Debug)]
pub struct AgentResults(Vec<StepResult>);

impl AgentResults {
    pub fn new(results: Vec<StepResult>) -> Self {
        Self(results)
    }

    pub fn into_inner(self) -> Vec<StepResult> {
        self.0
    }

    /// Builds a summary prompt from every result in this walk and issues a
    /// one-shot LLM call against it (spec §3: "ask(llm, question)"). Uses
    /// the same context-builder the per-step prompts go through, widened so
    /// the whole walk is in view rather than only the last-N window.
    pub async fn ask(&self, llm: &dyn LlmHandle, question: &str) -> Result<String, AgentError> {
        let budget = ContextBudget {
            last_n_steps: self.0.len().max(1),
            ..ContextBudget::default()
        };
        let prompt = context::build_prompt(None, &self.0, question, &budget);
        llm.gen(&prompt).await
    }
}

impl std::ops::Deref for AgentResults {
    type Target = Vec<StepResult>;
    fn deref(&self) -> &Vec<StepResult> {
        &self.0
    }
}

impl std::ops::DerefMut for AgentResults {
    fn deref_mut(&mut self) -> &mut Vec<StepResult> {
        &mut self.0
    }
}

impl From<Vec<StepResult>> for AgentResults {
    fn from(results: Vec<StepResult>) -> Self {
        Self(results)
    }
}

impl IntoIterator for AgentResults {
    type Item = StepResult;
    type IntoIter = std::vec::IntoIter<StepResult>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<StepResult> for AgentResults {
    fn from_iter<I: IntoIterator<Item = StepResult>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolOffer;

    #[test]
    fn fresh_result_has_consistent_zeroed_timings() {
        let r = StepResult::new(0, StepKind::Llm);
        assert!(r.timings_are_consistent());
    }

    #[test]
    fn overshooting_llm_ms_is_flagged_inconsistent() {
        let mut r = StepResult::new(0, StepKind::Llm);
        r.duration_ms = 5;
        r.llm_ms = 10;
        assert!(!r.timings_are_consistent());
    }

    struct EchoLlm;

    #[async_trait::async_trait]
    impl LlmHandle for EchoLlm {
        fn provider(&self) -> &str {
            "echo"
        }
        fn model(&self) -> &str {
            "echo-model"
        }
        async fn gen(&self, prompt: &str) -> Result<String, AgentError> {
            Ok(prompt.to_string())
        }
        async fn gen_with_tools(
            &self,
            prompt: &str,
            _tools: &[ToolOffer],
        ) -> Result<crate::llm::LlmResponse, AgentError> {
            Ok(crate::llm::LlmResponse {
                content: Some(prompt.to_string()),
                tool_calls: Vec::new(),
                usage: None,
            })
        }
        async fn gen_stream(&self, _prompt: &str) -> Result<crate::llm::ChunkStream, AgentError> {
            unimplemented!("not exercised by this test")
        }
    }

    #[test]
    fn agent_results_derefs_like_the_underlying_vec() {
        let mut first = StepResult::new(0, StepKind::Llm);
        first.final_text = Some("one".into());
        let results = AgentResults::new(vec![first]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].final_text.as_deref(), Some("one"));
    }

    #[tokio::test]
    async fn ask_builds_a_summary_prompt_over_every_result() {
        let mut first = StepResult::new(0, StepKind::Llm);
        first.final_text = Some("step one answer".into());
        let mut second = StepResult::new(1, StepKind::Llm);
        second.final_text = Some("step two answer".into());
        let results = AgentResults::new(vec![first, second]);

        let answer = results.ask(&EchoLlm, "what happened?").await.unwrap();

        assert!(answer.contains("[Context from previous steps]"));
        assert!(answer.contains("step one answer"));
        assert!(answer.contains("step two answer"));
        assert!(answer.ends_with("what happened?"));
    }
}
