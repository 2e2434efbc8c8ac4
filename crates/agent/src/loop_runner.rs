//! The agent reasoning loop implementation.

use std::sync::Arc;

use chrono::Utc;
use conductor_core::error::{Error, Result, ToolError};
use conductor_core::event::{AgentEvent, ErrorReport, EventBus, Stage, ToolExecution};
use conductor_core::message::Conversation;
use conductor_core::provider::{Provider, ProviderRequest, Usage};
use conductor_core::tool::{ToolCall, ToolRegistry, ToolResult};
use conductor_core::wrapper::WrapperChain;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Iteration budget when none is configured.
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Called once per completed step.
pub type StepCallback = Arc<dyn Fn(&Step) + Send + Sync>;

/// Everything one run needs. Cheap to clone: heavy parts are shared.
#[derive(Clone)]
pub struct AgentConfig {
    /// Agent name, used in events and logs
    pub name: String,

    /// The model provider to use
    pub provider: Arc<dyn Provider>,

    pub model: String,

    pub temperature: f32,

    pub max_tokens: Option<u32>,

    pub system_prompt: String,

    /// Tools the model may call (read-only)
    pub tools: Arc<ToolRegistry>,

    /// Maximum model calls per run
    pub max_iterations: usize,

    /// Wrappers applied around every tool call
    pub wrappers: WrapperChain,

    pub event_bus: Option<Arc<EventBus>>,

    pub on_step: Option<StepCallback>,
}

impl AgentConfig {
    /// A config with no tools, no system prompt and the standard wrapper chain.
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            name: "agent".into(),
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            system_prompt: String::new(),
            tools: Arc::new(ToolRegistry::new()),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            wrappers: WrapperChain::standard(),
            event_bus: None,
            on_step: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_wrappers(mut self, wrappers: WrapperChain) -> Self {
        self.wrappers = wrappers;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Observe each step as it completes.
    pub fn on_step(mut self, callback: impl Fn(&Step) + Send + Sync + 'static) -> Self {
        self.on_step = Some(Arc::new(callback));
        self
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("name", &self.name)
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("tools", &self.tools.names())
            .field("max_iterations", &self.max_iterations)
            .field("wrappers", &self.wrappers)
            .field("event_bus", &self.event_bus.is_some())
            .finish()
    }
}

/// Outcome of one tool call within a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepToolResult {
    pub tool_name: String,
    pub call_id: String,
    pub output: String,
    pub is_error: bool,
}

/// One loop iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// 0-based iteration index
    pub index: usize,

    /// Assistant text, if any
    pub content: Option<String>,

    pub tool_calls: Vec<ToolCall>,

    /// One per tool call, same order
    pub tool_results: Vec<StepToolResult>,

    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The model produced a final answer
    Completed,
    /// The iteration budget ran out first
    BudgetExhausted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub output: String,
    pub steps: Vec<Step>,
    pub total_usage: Usage,
    pub status: RunStatus,
}

impl RunResult {
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Tool calls across all steps.
    pub fn tool_call_count(&self) -> usize {
        self.steps.iter().map(|s| s.tool_calls.len()).sum()
    }

    /// Tool results across all steps.
    pub fn tool_result_count(&self) -> usize {
        self.steps.iter().map(|s| s.tool_results.len()).sum()
    }
}

/// A run that stopped on an error.
///
/// Keeps the steps recorded before the failure, including a partial step
/// whose results end at the tool call that failed.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunError {
    pub error: Error,
    pub steps: Vec<Step>,
    pub total_usage: Usage,
}

impl From<Error> for RunError {
    fn from(error: Error) -> Self {
        Self {
            error,
            steps: Vec::new(),
            total_usage: Usage::default(),
        }
    }
}

impl From<RunError> for Error {
    fn from(run: RunError) -> Self {
        run.error
    }
}

/// The core agent loop that orchestrates model calls and tool execution.
///
/// Each iteration calls the model once. A reply without tool calls ends the
/// run; otherwise every requested call is dispatched in order and its result
/// appended before the next iteration.
pub struct AgentLoop {
    config: AgentConfig,
}

impl AgentLoop {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run the loop on `input` until a final answer or the budget runs out.
    pub async fn run(&self, input: &str) -> std::result::Result<RunResult, RunError> {
        let mut steps = Vec::new();
        let mut total_usage = Usage::default();
        let outcome = self.drive(input, &mut steps, &mut total_usage).await;
        outcome.map_err(|error| RunError {
            error,
            steps,
            total_usage,
        })
    }

    async fn drive(
        &self,
        input: &str,
        steps: &mut Vec<Step>,
        total_usage: &mut Usage,
    ) -> Result<RunResult> {
        let config = &self.config;
        if input.trim().is_empty() {
            return Err(Error::InvalidInput("input must not be empty".into()));
        }
        if config.max_iterations == 0 {
            return Err(Error::Config {
                message: "max_iterations must be at least 1".into(),
            });
        }

        info!(
            agent = %config.name,
            model = %config.model,
            tools = config.tools.len(),
            max_iterations = config.max_iterations,
            "Starting agent run"
        );
        self.publish(AgentEvent::stage(&config.name, Stage::Started, None));

        let mut conversation = Conversation::seeded(&config.system_prompt, input);
        let tool_definitions = config.tools.definitions();

        for index in 0..config.max_iterations {
            self.publish(AgentEvent::stage(&config.name, Stage::Step, Some(index)));
            debug!(agent = %config.name, iteration = index, "Agent loop iteration");

            let request = ProviderRequest {
                model: config.model.clone(),
                messages: conversation.messages.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                tools: tool_definitions.clone(),
            };

            let response = match config.provider.complete(request).await {
                Ok(response) => response,
                Err(source) => {
                    return Err(self.fail(Error::ModelFailed {
                        step: index,
                        source,
                    }));
                }
            };

            if let Some(usage) = response.usage {
                *total_usage += usage;
            }

            let message = response.message;
            let content = Some(message.content.clone()).filter(|c| !c.trim().is_empty());
            let tool_calls: Vec<ToolCall> = message.tool_calls.iter().map(ToolCall::from).collect();
            conversation.push(message);

            if tool_calls.is_empty() {
                let output = content.clone().unwrap_or_default();
                self.record(
                    steps,
                    Step {
                        index,
                        content,
                        tool_calls,
                        tool_results: Vec::new(),
                        usage: response.usage,
                    },
                );
                self.publish(AgentEvent::stage(&config.name, Stage::Completed, Some(index)));
                info!(
                    agent = %config.name,
                    steps = steps.len(),
                    total_tokens = total_usage.total_tokens,
                    "Agent run completed"
                );
                return Ok(RunResult {
                    output,
                    steps: std::mem::take(steps),
                    total_usage: *total_usage,
                    status: RunStatus::Completed,
                });
            }

            debug!(tool_count = tool_calls.len(), "Executing tool calls");
            let mut tool_results = Vec::with_capacity(tool_calls.len());
            let mut fatal = None;
            for call in &tool_calls {
                match self.execute_tool(index, call).await {
                    Ok(result) => {
                        conversation.push_tool_result(&call.id, result.output.clone())?;
                        tool_results.push(result);
                    }
                    Err(e) => {
                        tool_results.push(failed_result(call, &e));
                        fatal = Some((call.name.clone(), e));
                        break;
                    }
                }
            }

            self.record(
                steps,
                Step {
                    index,
                    content,
                    tool_calls,
                    tool_results,
                    usage: response.usage,
                },
            );

            if let Some((tool_name, source)) = fatal {
                return Err(self.fail(Error::ToolFailed {
                    tool_name,
                    step: index,
                    source,
                }));
            }
        }

        let last_step = config.max_iterations - 1;
        warn!(
            agent = %config.name,
            iterations = config.max_iterations,
            "Iteration budget exhausted without a final answer"
        );
        self.publish(AgentEvent::stage(
            &config.name,
            Stage::BudgetExhausted,
            Some(last_step),
        ));

        Ok(RunResult {
            output: conversation
                .last_assistant_text()
                .unwrap_or_default()
                .to_string(),
            steps: std::mem::take(steps),
            total_usage: *total_usage,
            status: RunStatus::BudgetExhausted,
        })
    }

    /// Dispatch one call. Only fatal errors escape; everything else becomes
    /// a failed result the model sees next iteration.
    async fn execute_tool(
        &self,
        step: usize,
        call: &ToolCall,
    ) -> std::result::Result<StepToolResult, ToolError> {
        let config = &self.config;
        let outcome = config.tools.dispatch(call, &config.wrappers).await;

        let (result, duration_ms) = match outcome {
            Ok(ToolResult {
                success,
                output,
                data,
                ..
            }) => {
                let duration_ms = data
                    .as_ref()
                    .and_then(|d| d.get("duration_ms"))
                    .and_then(|d| d.as_u64());
                let result = StepToolResult {
                    tool_name: call.name.clone(),
                    call_id: call.id.clone(),
                    output,
                    is_error: !success,
                };
                (result, duration_ms)
            }
            Err(e) if e.is_fatal() => {
                self.publish_tool_execution(step, call, false, None);
                return Err(e);
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool call failed");
                (failed_result(call, &e), None)
            }
        };

        self.publish_tool_execution(step, call, !result.is_error, duration_ms);
        Ok(result)
    }

    fn record(&self, steps: &mut Vec<Step>, step: Step) {
        if let Some(callback) = &self.config.on_step {
            callback(&step);
        }
        steps.push(step);
    }

    fn publish(&self, event: AgentEvent) {
        if let Some(bus) = &self.config.event_bus {
            bus.publish(event);
        }
    }

    fn publish_tool_execution(
        &self,
        step: usize,
        call: &ToolCall,
        success: bool,
        duration_ms: Option<u64>,
    ) {
        self.publish(AgentEvent::ToolExecuted(ToolExecution {
            agent: self.config.name.clone(),
            step,
            tool_name: call.name.clone(),
            call_id: call.id.clone(),
            success,
            duration_ms,
            timestamp: Utc::now(),
        }));
    }

    /// Announce a failed run and hand the error back.
    fn fail(&self, error: Error) -> Error {
        warn!(agent = %self.config.name, error = %error, "Agent run failed");
        self.publish(AgentEvent::ErrorOccurred(ErrorReport {
            agent: self.config.name.clone(),
            step: error.step(),
            tool_name: error.tool_name().map(str::to_string),
            message: error.to_string(),
            timestamp: Utc::now(),
        }));
        self.publish(AgentEvent::stage(
            &self.config.name,
            Stage::Failed,
            error.step(),
        ));
        error
    }
}

fn failed_result(call: &ToolCall, error: &ToolError) -> StepToolResult {
    StepToolResult {
        tool_name: call.name.clone(),
        call_id: call.id.clone(),
        output: format!("Error: {error}"),
        is_error: true,
    }
}
