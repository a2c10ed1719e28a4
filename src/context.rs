//! History & Context Builder (component A): shapes prior-step artifacts into
//! a bounded prompt prefix.

use crate::step::StepResult;

const ELLIPSIS: &str = "…";

/// Budgets governing how much of the prior-step history the builder emits.
/// A pipeline-level value is the default; a per-step override, when present,
/// wins (spec §9's open question: defaults must be documented and
/// configurable).
#[derive(Clone, Copy, Debug)]
pub struct ContextBudget {
    /// Max characters kept per truncated string (prompt, answer, tool arg/result).
    pub step_chars: usize,
    /// How many of the most recent prior steps are included.
    pub last_n_steps: usize,
    /// Max tool-call summaries retained per step record.
    pub tool_results_per_step: usize,
    /// Hard ceiling on the total rendered context block; oldest step
    /// records are dropped first when exceeded.
    pub total_ceiling_chars: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            step_chars: 2000,
            last_n_steps: 5,
            tool_results_per_step: 3,
            total_ceiling_chars: 12_000,
        }
    }
}

fn truncate(s: &str, budget: usize) -> String {
    if s.chars().count() <= budget {
        return s.to_string();
    }
    let prefix: String = s.chars().take(budget.saturating_sub(ELLIPSIS.chars().count())).collect();
    format!("{prefix}{ELLIPSIS}")
}

fn render_step_record(step: &StepResult, budget: &ContextBudget) -> String {
    let mut out = String::new();
    if let Some(prompt) = &step.prompt {
        out.push_str(&format!("prompt: {}\n", truncate(prompt, budget.step_chars)));
    }
    if let Some(text) = &step.final_text {
        out.push_str(&format!("answer: {}\n", truncate(text, budget.step_chars)));
    }
    for call in step.tool_calls.iter().take(budget.tool_results_per_step) {
        let args = truncate(&call.arguments.to_string(), budget.step_chars);
        let result = match &call.result {
            Ok(v) => truncate(&v.to_string(), budget.step_chars),
            Err(e) => truncate(e, budget.step_chars),
        };
        out.push_str(&format!(
            "tool {}({}) -> {}\n",
            call.tool_name, args, result
        ));
    }
    if let Some(mcp) = &step.mcp_call {
        let args = truncate(&mcp.arguments.to_string(), budget.step_chars);
        let result = match &mcp.result {
            Ok(v) => truncate(&v.to_string(), budget.step_chars),
            Err(e) => truncate(e, budget.step_chars),
        };
        out.push_str(&format!("mcp {}.{}({}) -> {}\n", mcp.endpoint, mcp.tool_name, args, result));
    }
    for call in &step.agent_calls {
        out.push_str(&format!(
            "agent '{}' task \"{}\" -> {}\n",
            call.name,
            truncate(&call.task, budget.step_chars),
            truncate(&call.result_text, budget.step_chars)
        ));
    }
    if let Some(usage) = &step.token_usage {
        out.push_str(&format!("tokens: {}\n", usage.total_tokens));
    }
    out.push('\n');
    out
}

/// Builds the effective prompt for the next LLM call (spec §4.A).
///
/// Order: effective instructions (if any), then a `[Context from previous
/// steps]` block covering the last `budget.last_n_steps` prior results
/// (oldest dropped first if the rendered block would exceed
/// `total_ceiling_chars`), then the raw prompt. When instructions, prior
/// results, and prompt are all empty, the input prompt passes through
/// unchanged (spec §3 invariant).
pub fn build_prompt(
    instructions: Option<&str>,
    prior_results: &[StepResult],
    prompt: &str,
    budget: &ContextBudget,
) -> String {
    if instructions.is_none() && prior_results.is_empty() && prompt.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    if let Some(instr) = instructions {
        if !instr.is_empty() {
            out.push_str(instr);
            out.push_str("\n\n");
        }
    }

    if !prior_results.is_empty() {
        let window_start = prior_results.len().saturating_sub(budget.last_n_steps);
        let mut records: Vec<String> = prior_results[window_start..]
            .iter()
            .map(|s| render_step_record(s, budget))
            .collect();

        // Enforce the total ceiling by dropping the oldest records first
        // (records are currently oldest-first; the front is the oldest).
        while records.iter().map(|r| r.len()).sum::<usize>() > budget.total_ceiling_chars
            && records.len() > 1
        {
            records.remove(0);
        }

        out.push_str("[Context from previous steps]\n");
        for record in records {
            out.push_str(&record);
        }
    }

    out.push_str(prompt);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{StepKind, StepResult};

    fn step_with_prompt_and_answer(prompt: &str, answer: &str) -> StepResult {
        let mut s = StepResult::new(0, StepKind::Llm);
        s.prompt = Some(prompt.to_string());
        s.final_text = Some(answer.to_string());
        s
    }

    #[test]
    fn passthrough_when_everything_is_empty() {
        let budget = ContextBudget::default();
        assert_eq!(build_prompt(None, &[], "", &budget), "");
    }

    #[test]
    fn context_block_carries_prior_prompt_substring() {
        let budget = ContextBudget::default();
        let prior = vec![step_with_prompt_and_answer("one", "one")];
        let built = build_prompt(None, &prior, "two", &budget);
        assert!(built.contains("[Context from previous steps]"));
        assert!(built.contains("one"));
        assert!(built.ends_with("two"));
    }

    #[test]
    fn instructions_come_first_when_present() {
        let budget = ContextBudget::default();
        let built = build_prompt(Some("be terse"), &[], "hello", &budget);
        assert!(built.starts_with("be terse\n\n"));
        assert!(built.ends_with("hello"));
    }

    #[test]
    fn truncation_replaces_overflow_with_ellipsis() {
        let budget = ContextBudget {
            step_chars: 5,
            ..ContextBudget::default()
        };
        let prior = vec![step_with_prompt_and_answer(
            "this is a very long prompt",
            "short",
        )];
        let built = build_prompt(None, &prior, "next", &budget);
        assert!(built.contains(ELLIPSIS));
    }

    #[test]
    fn only_last_n_steps_are_included() {
        let budget = ContextBudget {
            last_n_steps: 1,
            ..ContextBudget::default()
        };
        let prior = vec![
            step_with_prompt_and_answer("old", "old-answer"),
            step_with_prompt_and_answer("recent", "recent-answer"),
        ];
        let built = build_prompt(None, &prior, "next", &budget);
        assert!(!built.contains("old-answer"));
        assert!(built.contains("recent-answer"));
    }

    #[test]
    fn total_ceiling_drops_oldest_records_first() {
        let budget = ContextBudget {
            step_chars: 200,
            last_n_steps: 5,
            tool_results_per_step: 3,
            total_ceiling_chars: 40,
        };
        let prior = vec![
            step_with_prompt_and_answer("aaaaaaaaaaaaaaaaaaaa", "aaaaaaaaaaaaaaaaaaaa"),
            step_with_prompt_and_answer("bbbbbbbbbbbbbbbbbbbb", "bbbbbbbbbbbbbbbbbbbb"),
        ];
        let built = build_prompt(None, &prior, "next", &budget);
        assert!(!built.contains('a'));
        assert!(built.contains('b'));
    }
}
