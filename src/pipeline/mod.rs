//! Pipeline Builder (component J): an immutable, chainable value producing
//! a tree of step nodes. Every chainable method returns a new `Pipeline`
//! with one additional node; the prior value is unchanged, so sub-builders
//! are safe to share across branches (spec §4.J, §9: "favor immutable,
//! persistent builders").

pub mod builder;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::llm::LlmHandle;
use crate::mcp::McpHandle;
use crate::retry::RetryPolicy;
use crate::step::StepResult;
use crate::tools::ToolDefinition;

pub type Predicate = Arc<dyn Fn(&[StepResult]) -> bool + Send + Sync>;
pub type KeyFn = Arc<dyn Fn(&[StepResult]) -> String + Send + Sync>;
pub type Hook = Arc<dyn Fn(&[StepResult]) + Send + Sync>;
pub type ForEachFactory = Arc<dyn Fn(&Value) -> Pipeline + Send + Sync>;
pub type RetryFactory = Arc<dyn Fn() -> Pipeline + Send + Sync>;
pub type SatisfiedFn = Arc<dyn Fn(&StepResult) -> bool + Send + Sync>;

/// A named sub-agent: a pipeline the multi-agent coordinator (component H)
/// may delegate to by name.
#[derive(Clone)]
pub struct AgentSpec {
    pub name: String,
    pub description: String,
    pub pipeline: Pipeline,
}

#[derive(Clone, Default)]
pub struct Hooks {
    pub pre: Option<Hook>,
    pub post: Option<Hook>,
}

/// Fields of an `Llm` step node (spec §3).
#[derive(Clone)]
pub struct LlmStep {
    pub prompt: Option<String>,
    pub llm_override: Option<Arc<dyn LlmHandle>>,
    pub mcps: Vec<McpHandle>,
    pub explicit_tools: Vec<ToolDefinition>,
    pub max_tool_iterations: Option<usize>,
    pub instructions: Option<String>,
    pub agents: Option<Vec<AgentSpec>>,
    pub name: Option<String>,
    pub hooks: Hooks,
    pub timeout: Option<Duration>,
    pub retry: Option<RetryPolicy>,
}

impl Default for LlmStep {
    fn default() -> Self {
        Self {
            prompt: None,
            llm_override: None,
            mcps: Vec::new(),
            explicit_tools: Vec::new(),
            max_tool_iterations: None,
            instructions: None,
            agents: None,
            name: None,
            hooks: Hooks::default(),
            timeout: None,
            retry: None,
        }
    }
}

/// Fields of an `ExplicitTool` step node (spec §3).
#[derive(Clone)]
pub struct ExplicitToolStep {
    pub mcp: McpHandle,
    pub tool_name: String,
    pub arguments: Value,
    pub hooks: Hooks,
    pub timeout: Option<Duration>,
    pub retry: Option<RetryPolicy>,
}

/// One node in the pipeline tree (spec §3's Step Node variant).
pub enum StepNode {
    Llm(LlmStep),
    ExplicitTool(ExplicitToolStep),
    Parallel {
        children: Vec<Pipeline>,
        hooks: Hooks,
    },
    Branch {
        predicate: Predicate,
        when_true: Pipeline,
        when_false: Pipeline,
        hooks: Hooks,
    },
    Switch {
        key_fn: KeyFn,
        cases: Vec<(String, Pipeline)>,
        default: Pipeline,
        hooks: Hooks,
    },
    While {
        predicate: Predicate,
        body: Pipeline,
        max_iterations: usize,
        hooks: Hooks,
    },
    ForEach {
        items: Vec<Value>,
        factory: ForEachFactory,
        hooks: Hooks,
    },
    RetryUntil {
        factory: RetryFactory,
        satisfied: SatisfiedFn,
        max_attempts: usize,
        hooks: Hooks,
    },
    RunAgent {
        other: Pipeline,
        hooks: Hooks,
    },
}

struct PipelineData {
    nodes: Vec<Arc<StepNode>>,
    name: Option<String>,
    description: Option<String>,
    running: AtomicBool,
}

/// An immutable sequence (tree) of steps (spec glossary: Agent / Pipeline).
/// Cloning a `Pipeline` is cheap (an `Arc` clone); each distinct value
/// produced by a chain call owns its own concurrency guard, so running the
/// same built value twice concurrently is rejected, but deriving two
/// different pipelines from a shared prefix is not (spec §3, §5, §9).
#[derive(Clone)]
pub struct Pipeline(Arc<PipelineData>);

impl Pipeline {
    pub fn new() -> Self {
        Self(Arc::new(PipelineData {
            nodes: Vec::new(),
            name: None,
            description: None,
            running: AtomicBool::new(false),
        }))
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }

    pub fn nodes(&self) -> &[Arc<StepNode>] {
        &self.0.nodes
    }

    pub fn with_identity(&self, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self(Arc::new(PipelineData {
            nodes: self.0.nodes.clone(),
            name: Some(name.into()),
            description: Some(description.into()),
            running: AtomicBool::new(false),
        }))
    }

    fn with_node(&self, node: StepNode) -> Self {
        let mut nodes = self.0.nodes.clone();
        nodes.push(Arc::new(node));
        Self(Arc::new(PipelineData {
            nodes,
            name: self.0.name.clone(),
            description: self.0.description.clone(),
            running: AtomicBool::new(false),
        }))
    }

    /// Marks this exact built value as executing; fails if it already is
    /// (spec §3: "run/stream on the same pipeline instance may not be
    /// concurrently active").
    pub(crate) fn try_begin(&self) -> Result<(), crate::error::AgentError> {
        match self
            .0
            .running
            .compare_exchange(
                false,
                true,
                std::sync::atomic::Ordering::SeqCst,
                std::sync::atomic::Ordering::SeqCst,
            ) {
            Ok(_) => Ok(()),
            Err(_) => Err(crate::error::AgentError::AgentConcurrencyError),
        }
    }

    pub(crate) fn end(&self) {
        self.0.running.store(false, std::sync::atomic::Ordering::SeqCst);
    }

    /// The fully expanded step count, recursing into loop bodies and
    /// `RunAgent` (spec §4.I: "progress counting... recurses").
    pub fn total_step_count(&self) -> usize {
        self.0
            .nodes
            .iter()
            .map(|n| Self::node_step_count(n))
            .sum()
    }

    fn node_step_count(node: &StepNode) -> usize {
        match node {
            StepNode::Llm(_) | StepNode::ExplicitTool(_) => 1,
            StepNode::Parallel { children, .. } => {
                children.iter().map(|c| c.total_step_count()).sum::<usize>() + 1
            }
            StepNode::Branch {
                when_true,
                when_false,
                ..
            } => when_true.total_step_count().max(when_false.total_step_count()),
            StepNode::Switch { cases, default, .. } => cases
                .iter()
                .map(|(_, p)| p.total_step_count())
                .chain(std::iter::once(default.total_step_count()))
                .max()
                .unwrap_or(0),
            StepNode::While {
                body,
                max_iterations,
                ..
            } => body.total_step_count() * max_iterations,
            StepNode::ForEach { items, factory, .. } => items
                .iter()
                .map(|i| factory(i).total_step_count())
                .sum(),
            StepNode::RetryUntil {
                max_attempts, factory, ..
            } => factory().total_step_count() * max_attempts,
            StepNode::RunAgent { other, .. } => other.total_step_count(),
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
