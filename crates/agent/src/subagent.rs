//! Subagents — specialist agents callable as tools.
//!
//! A [`Subagent`] is a named [`AgentConfig`] with a description. It
//! implements [`Tool`], so a parent agent delegates to it exactly as it
//! would call any other tool:
//!
//! ```text
//! Parent AgentLoop
//!       │  tool call {"task": "..."}
//!       ▼
//! ┌───────────┐
//! │ Subagent  │  ← runs its own AgentLoop with its own tools and budget
//! └───────────┘
//!       │  nested run output
//!       ▼
//! tool result
//! ```
//!
//! [`delegate_all`] runs several subagents concurrently.

use std::sync::Arc;

use async_trait::async_trait;
use conductor_core::error::{Error, Result, ToolError};
use conductor_core::event::EventBus;
use conductor_core::provider::Provider;
use conductor_core::tool::{Tool, ToolRegistry, ToolResult};
use conductor_core::wrapper::WrapperChain;
use futures::future::join_all;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::loop_runner::{AgentConfig, AgentLoop, DEFAULT_MAX_ITERATIONS, RunError, RunResult};

/// A specialist agent exposed as a tool.
#[derive(Debug, Clone)]
pub struct Subagent {
    description: String,
    config: AgentConfig,
}

impl Subagent {
    pub fn builder(name: impl Into<String>) -> SubagentBuilder {
        SubagentBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run the nested loop on `task`.
    pub async fn run(&self, task: &str) -> std::result::Result<RunResult, RunError> {
        debug!(subagent = %self.name(), "Running subagent");
        AgentLoop::new(self.config.clone()).run(task).await
    }
}

#[async_trait]
impl Tool for Subagent {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "minLength": 1,
                    "description": "The task to delegate, in plain language"
                }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, arguments: Value) -> std::result::Result<ToolResult, ToolError> {
        let task = arguments["task"].as_str().unwrap_or_default();
        match self.run(task).await {
            Ok(run) => Ok(ToolResult::success(run.output).with_data(json!({
                "steps": run.steps.len(),
                "status": run.status,
                "total_tokens": run.total_usage.total_tokens,
            }))),
            Err(e) => Err(ToolError::ExecutionFailed {
                tool_name: self.config.name.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Builder for [`Subagent`].
pub struct SubagentBuilder {
    name: String,
    description: String,
    system_prompt: String,
    provider: Option<(Arc<dyn Provider>, String)>,
    temperature: f32,
    max_tokens: Option<u32>,
    registry: Arc<ToolRegistry>,
    tool_names: Option<Vec<String>>,
    max_iterations: usize,
    wrappers: WrapperChain,
    event_bus: Option<Arc<EventBus>>,
}

impl SubagentBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            system_prompt: String::new(),
            provider: None,
            temperature: 0.7,
            max_tokens: None,
            registry: Arc::new(ToolRegistry::new()),
            tool_names: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            wrappers: WrapperChain::standard(),
            event_bus: None,
        }
    }

    /// Start from an existing config: provider, model, tools, wrappers
    /// and event bus are inherited.
    pub fn inherit(mut self, parent: &AgentConfig) -> Self {
        self.provider = Some((parent.provider.clone(), parent.model.clone()));
        self.temperature = parent.temperature;
        self.max_tokens = parent.max_tokens;
        self.registry = parent.tools.clone();
        self.wrappers = parent.wrappers.clone();
        self.event_bus = parent.event_bus.clone();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        self.provider = Some((provider, model.into()));
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// The registry tools are selected from.
    pub fn registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Restrict the subagent to these tools. Without this it gets the
    /// whole registry.
    pub fn tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn wrappers(mut self, wrappers: WrapperChain) -> Self {
        self.wrappers = wrappers;
        self
    }

    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<Subagent> {
        if self.name.trim().is_empty() {
            return Err(Error::Config {
                message: "subagent name must not be empty".into(),
            });
        }
        if self.max_iterations == 0 {
            return Err(Error::Config {
                message: format!("subagent '{}' needs max_iterations >= 1", self.name),
            });
        }
        let Some((provider, model)) = self.provider else {
            return Err(Error::Config {
                message: format!("subagent '{}' has no provider", self.name),
            });
        };

        let tools = match &self.tool_names {
            Some(names) => Arc::new(self.registry.subset(names)?),
            None => self.registry,
        };

        let description = if self.description.is_empty() {
            format!("Delegate a task to the {} agent", self.name)
        } else {
            self.description
        };

        let mut config = AgentConfig::new(provider, model)
            .with_name(self.name)
            .with_temperature(self.temperature)
            .with_system_prompt(self.system_prompt)
            .with_tools(tools)
            .with_max_iterations(self.max_iterations)
            .with_wrappers(self.wrappers);
        config.max_tokens = self.max_tokens;
        config.event_bus = self.event_bus;

        Ok(Subagent {
            description,
            config,
        })
    }
}

/// Run each subagent on its task concurrently.
///
/// Results come back in the same order as `assignments`.
pub async fn delegate_all(
    assignments: &[(&Subagent, String)],
) -> Vec<std::result::Result<RunResult, RunError>> {
    info!(count = assignments.len(), "Delegating tasks in parallel");
    let runs = assignments
        .iter()
        .map(|(agent, task)| agent.run(task));
    join_all(runs).await
}
