//! # Conductor Core
//!
//! Domain types, traits, and error definitions for the Conductor agent
//! orchestration runtime. Nothing in here talks to a network or a disk —
//! it defines the domain model that the other crates build on.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here: [`Provider`] for model invocation, [`Tool`]
//! for capabilities, [`Schema`] for validation, [`Wrapper`] for tool
//! execution decorators and [`AgentObserver`] for progress events. This
//! enables:
//! - Easy testing with scripted providers and stub tools
//! - Instrumenting agents without touching the loop
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod extract;
pub mod message;
pub mod provider;
pub mod schema;
pub mod tool;
pub mod wrapper;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{
    AgentEvent, AgentObserver, Capabilities, ErrorReport, EventBus, Observer, ObserverError,
    Stage, StageChange, Subject, ToolExecution,
};
pub use extract::{ExtractionError, ExtractionResult, extract};
pub use message::{Conversation, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use schema::{JsonSchema, Schema, SchemaIssue, TypedSchema};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
pub use wrapper::{ToolExecutor, Wrapper, WrapperChain};
