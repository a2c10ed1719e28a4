//! Crate-wide error type and the error taxonomy callers match on.
//!
//! Every fallible public operation returns `Result<T, AgentError>`. Subsystem
//! errors (`McpError`, `ToolSourceError`) are narrower `thiserror` enums that
//! convert into `AgentError` at the point they cross into the scheduler.

use thiserror::Error;

/// Metadata attached to transport-ish errors: which step raised it, which
/// provider/endpoint was involved, and whether the retry harness should retry it.
#[derive(Clone, Debug, Default)]
pub struct ErrorMeta {
    pub step_id: Option<usize>,
    pub provider: Option<String>,
    pub retryable: bool,
}

impl ErrorMeta {
    pub fn new(provider: impl Into<String>, retryable: bool) -> Self {
        Self {
            step_id: None,
            provider: Some(provider.into()),
            retryable,
        }
    }

    pub fn with_step(mut self, step_id: usize) -> Self {
        self.step_id = Some(step_id);
        self
    }
}

/// Error taxonomy surfaced to callers. Variant names are bit-stable across bindings.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A second `run`/`stream` was attempted on a pipeline instance already executing.
    #[error("pipeline is already running")]
    AgentConcurrencyError,

    /// LLM transport/protocol error.
    #[error("LLM error (provider={provider:?}, retryable={retryable}): {message}", provider = .meta.provider, retryable = .meta.retryable)]
    LlmError { message: String, meta: ErrorMeta },

    /// MCP session establishment failed.
    #[error("MCP connection error (provider={provider:?}, retryable={retryable}): {message}", provider = .meta.provider, retryable = .meta.retryable)]
    McpConnectionError { message: String, meta: ErrorMeta },

    /// MCP tool invocation failed.
    #[error("MCP tool error (provider={provider:?}, retryable={retryable}): {message}", provider = .meta.provider, retryable = .meta.retryable)]
    McpToolError { message: String, meta: ErrorMeta },

    /// JSON-Schema mismatch on tool arguments. Never retryable.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The retry/timeout harness gave up waiting for one attempt.
    #[error("operation timed out after {0:?}")]
    TimeoutError(std::time::Duration),

    /// The retry/timeout harness exhausted its attempt budget.
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetryExhaustedError {
        attempts: u32,
        #[source]
        source: Box<AgentError>,
    },

    /// A step in the pipeline failed; halts the walk (spec §7).
    #[error("step {step_id} failed: {source}")]
    StepFailed {
        step_id: usize,
        #[source]
        source: Box<AgentError>,
    },

    /// The multi-agent coordinator's sub-agent registry was empty or malformed.
    #[error("no agents available or agents missing name/description")]
    NoAgentsAvailable,

    /// A node in the pipeline builder failed internal invariants (caller bug).
    #[error("pipeline build error: {0}")]
    BuildError(String),
}

impl AgentError {
    /// Whether the harness should retry this error, per its own hint or the
    /// default classification rule (§4.B: 408/425/429/5xx-ish transport errors).
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::LlmError { meta, .. } => meta.retryable,
            AgentError::McpConnectionError { meta, .. } => meta.retryable,
            AgentError::McpToolError { meta, .. } => meta.retryable,
            AgentError::TimeoutError(_) => true,
            AgentError::ValidationError(_) => false,
            _ => false,
        }
    }

    pub fn step_id(&self) -> Option<usize> {
        match self {
            AgentError::LlmError { meta, .. } => meta.step_id,
            AgentError::McpConnectionError { meta, .. } => meta.step_id,
            AgentError::McpToolError { meta, .. } => meta.step_id,
            AgentError::StepFailed { step_id, .. } => Some(*step_id),
            _ => None,
        }
    }

    /// Annotates this error with the index of the step that raised it (spec §7:
    /// "Any unhandled error is annotated with stepId").
    pub fn with_step_id(mut self, step_id: usize) -> Self {
        match &mut self {
            AgentError::LlmError { meta, .. } => meta.step_id = Some(step_id),
            AgentError::McpConnectionError { meta, .. } => meta.step_id = Some(step_id),
            AgentError::McpToolError { meta, .. } => meta.step_id = Some(step_id),
            _ => {}
        }
        self
    }
}
