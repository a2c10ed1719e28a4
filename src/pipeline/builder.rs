//! Chainable builder methods on `Pipeline`. Each method consumes `&self` by
//! reference and returns a brand-new `Pipeline`; `self` is left untouched.

use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;

use super::{
    ExplicitToolStep, ForEachFactory, Hook, Hooks, KeyFn, LlmStep, Pipeline, Predicate,
    RetryFactory, SatisfiedFn, StepNode,
};
use crate::error::AgentError;
use crate::scheduler::{self, ExecutionContext};
use crate::step::{AgentResults, StepResult};
use crate::telemetry::Attrs;

impl Pipeline {
    /// Appends an `Llm` step.
    pub fn llm(&self, step: LlmStep) -> Pipeline {
        self.with_node(StepNode::Llm(step))
    }

    /// Appends an `ExplicitTool` step.
    pub fn tool(&self, step: ExplicitToolStep) -> Pipeline {
        self.with_node(StepNode::ExplicitTool(step))
    }

    /// Appends an arbitrary pre-built node; the escape hatch the other
    /// chain methods are built on top of.
    pub fn then(&self, node: StepNode) -> Pipeline {
        self.with_node(node)
    }

    pub fn parallel(&self, children: Vec<Pipeline>, hooks: Hooks) -> Pipeline {
        self.with_node(StepNode::Parallel { children, hooks })
    }

    pub fn branch(
        &self,
        predicate: Predicate,
        when_true: Pipeline,
        when_false: Pipeline,
        hooks: Hooks,
    ) -> Pipeline {
        self.with_node(StepNode::Branch {
            predicate,
            when_true,
            when_false,
            hooks,
        })
    }

    pub fn switch(
        &self,
        key_fn: KeyFn,
        cases: Vec<(String, Pipeline)>,
        default: Pipeline,
        hooks: Hooks,
    ) -> Pipeline {
        self.with_node(StepNode::Switch {
            key_fn,
            cases,
            default,
            hooks,
        })
    }

    /// Named `while_loop` since `while` is a reserved word.
    pub fn while_loop(
        &self,
        predicate: Predicate,
        body: Pipeline,
        max_iterations: usize,
        hooks: Hooks,
    ) -> Pipeline {
        self.with_node(StepNode::While {
            predicate,
            body,
            max_iterations,
            hooks,
        })
    }

    pub fn for_each(&self, items: Vec<Value>, factory: ForEachFactory, hooks: Hooks) -> Pipeline {
        self.with_node(StepNode::ForEach {
            items,
            factory,
            hooks,
        })
    }

    pub fn retry_until(
        &self,
        factory: RetryFactory,
        satisfied: SatisfiedFn,
        max_attempts: usize,
        hooks: Hooks,
    ) -> Pipeline {
        self.with_node(StepNode::RetryUntil {
            factory,
            satisfied,
            max_attempts,
            hooks,
        })
    }

    pub fn run_agent(&self, other: Pipeline, hooks: Hooks) -> Pipeline {
        self.with_node(StepNode::RunAgent { other, hooks })
    }

    /// Eager terminal form: walks the pipeline, collecting every step
    /// result into an `AgentResults` (spec §3's Agent Results, with its
    /// `ask` summarization method), optionally invoking
    /// `on_step(result_so_far)` after each emission (spec §4.I).
    pub async fn run(
        &self,
        ctx: &ExecutionContext,
        on_step: Option<Hook>,
    ) -> Result<AgentResults, AgentError> {
        self.try_begin()?;
        let span = ctx.emitter.start_span("agent.run", Attrs::new());
        ctx.emitter.incr_counter("agent.execution", 1, Attrs::new());
        let result = scheduler::run_with_seed(self, ctx, Vec::new(), on_step).await;
        self.end();
        match &result {
            Ok(_) => span.end_ok(),
            Err(e) => span.end_err(&e.to_string()),
        }
        result.map(AgentResults::new)
    }

    /// Streaming terminal form: a restartable, single-consumer sequence
    /// yielding each step result as soon as it's produced (spec §4.I),
    /// grounded on the teacher's `compiled.rs` `mpsc` + `ReceiverStream`
    /// pattern. Yields bare `StepResult`s rather than `AgentResults`: `ask`
    /// needs the full walk in view, which an incremental stream never has
    /// all at once.
    pub fn stream(
        &self,
        ctx: ExecutionContext,
    ) -> Result<ReceiverStream<Result<StepResult, AgentError>>, AgentError> {
        self.try_begin()?;
        let pipeline = self.clone();
        let (tx, rx) = tokio::sync::mpsc::channel(128);
        let span = ctx.emitter.start_span("agent.run", Attrs::new());
        ctx.emitter.incr_counter("agent.execution", 1, Attrs::new());
        tokio::spawn(async move {
            let result = scheduler::run_streaming(&pipeline, &ctx, Vec::new(), &tx).await;
            match &result {
                Ok(_) => span.end_ok(),
                Err(e) => span.end_err(&e.to_string()),
            }
            if let Err(e) = result {
                let _ = tx.send(Err(e)).await;
            }
            pipeline.end();
        });
        Ok(ReceiverStream::new(rx))
    }
}
