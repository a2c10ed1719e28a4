//! Skein: a pipeline runtime for multi-step LLM agent workflows over MCP
//! tool servers.
//!
//! A [`pipeline::Pipeline`] is an immutable, chainable description of a tree
//! of steps — plain LLM calls, explicit MCP tool invocations, auto-selection
//! tool loops, multi-agent delegation, and structured control flow (branch,
//! switch, while, for-each, retry-until, parallel, run-agent). The
//! [`scheduler`] walks that tree, producing an ordered list of
//! [`step::StepResult`]s either eagerly (`Pipeline::run`) or as a stream
//! (`Pipeline::stream`).
//!
//! Everything below the pipeline layer — the context builder, the retry
//! harness, the MCP transport pool, tool discovery/analysis/execution, the
//! auto-tool-selection loop, and the multi-agent coordinator — is exposed as
//! its own module so a caller can use just the piece they need (e.g. drive
//! the MCP pool directly without ever building a `Pipeline`).

pub mod autoloop;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod step;
pub mod telemetry;
pub mod tools;

pub use error::AgentError;
pub use llm::LlmHandle;
pub use mcp::McpHandle;
pub use pipeline::Pipeline;
pub use scheduler::ExecutionContext;
pub use step::{AgentResults, StepResult};
