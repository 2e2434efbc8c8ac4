//! Built-in tool implementations for Conductor.
//!
//! Small, dependency-free tools that are useful on their own and double as
//! reference implementations of the [`Tool`](conductor_core::Tool) trait:
//! arithmetic, greetings, and schema self-checks for subagents.

pub mod calculator;
pub mod greeting;
pub mod validation;

use std::sync::Arc;

use conductor_core::error::ToolError;
use conductor_core::tool::{Tool, ToolRegistry};

pub use calculator::CalculatorTool;
pub use greeting::GreetingTool;
pub use validation::{ValidationTool, validation_tool};

/// Create a tool registry with the built-in tools.
pub fn default_registry() -> Result<ToolRegistry, ToolError> {
    ToolRegistry::from_tools([
        Arc::new(CalculatorTool) as Arc<dyn Tool>,
        Arc::new(GreetingTool),
    ])
}
