//! Error types for the Conductor domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] is what escapes
//! to callers of the agent loop.

use thiserror::Error;

use crate::extract::ExtractionError;

/// The top-level error type for all Conductor operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model boundary ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Model invocation failed at step {step}: {source}")]
    ModelFailed {
        step: usize,
        #[source]
        source: ProviderError,
    },

    // --- Tools ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Tool '{tool_name}' failed at step {step}: {source}")]
    ToolFailed {
        tool_name: String,
        step: usize,
        #[source]
        source: ToolError,
    },

    // --- Structured output ---
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Structured output still invalid after {attempts} attempts: {last}")]
    ExtractionExhausted {
        attempts: usize,
        last: ExtractionError,
    },

    // --- Caller input / configuration ---
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Name of the tool that caused this error, if any.
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Self::ToolFailed { tool_name, .. } => Some(tool_name),
            Self::Tool(e) => e.tool_name(),
            _ => None,
        }
    }

    /// Step index at which a run failed, if known.
    pub fn step(&self) -> Option<usize> {
        match self {
            Self::ToolFailed { step, .. } | Self::ModelFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    /// A plain error raised by a handler, not yet attributed to a tool.
    #[error("{0}")]
    Handler(#[from] anyhow::Error),

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Fatal tool failure: {tool_name} — {reason}")]
    Fatal { tool_name: String, reason: String },

    #[error("Duplicate tool name: {0}")]
    DuplicateName(String),

    #[error("Invalid input schema for {tool_name}: {reason}")]
    InvalidSchema { tool_name: String, reason: String },
}

impl ToolError {
    /// Tool name carried by the error, if the variant has one.
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Self::NotFound(name) | Self::DuplicateName(name) => Some(name),
            Self::InvalidArguments { tool_name, .. }
            | Self::ExecutionFailed { tool_name, .. }
            | Self::Timeout { tool_name, .. }
            | Self::Fatal { tool_name, .. }
            | Self::InvalidSchema { tool_name, .. } => Some(tool_name),
            Self::Handler(_) => None,
        }
    }

    /// Whether the agent loop must abort the run on this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// Whether re-invoking the handler could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExecutionFailed { .. } | Self::Handler(_) | Self::Timeout { .. }
        )
    }
}
