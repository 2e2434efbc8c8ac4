//! The agent loop and multi-agent orchestration for Conductor.
//!
//! An agent follows a **Plan → Act → Observe** cycle:
//!
//! 1. **Seed** the conversation with the system prompt and the task
//! 2. **Call the model** with the conversation and the tool descriptors
//! 3. **If tool calls**: validate and execute them through the wrapper
//!    chain, append results, loop back to step 2
//! 4. **If text only**: that is the final answer
//!
//! The loop stops at the final answer, a fatal error, or when the
//! iteration budget runs out.
//!
//! On top of the loop:
//! - [`Subagent`]: a specialist agent registered as a tool
//! - [`delegate_all`]: run several subagents in parallel
//! - [`StructuredGenerator`]: schema-validated JSON with typed retries

pub mod loop_runner;
pub mod settings;
pub mod structured;
pub mod subagent;

#[cfg(test)]
mod test_helpers;

pub use loop_runner::{
    AgentConfig, AgentLoop, RunError, RunResult, RunStatus, Step, StepCallback, StepToolResult,
};
pub use structured::{StructuredGenerator, StructuredOutput};
pub use subagent::{Subagent, SubagentBuilder, delegate_all};
