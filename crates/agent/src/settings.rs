//! Building agents from [`AppConfig`].

use std::sync::Arc;
use std::time::Duration;

use conductor_config::{AppConfig, ExecutionConfig};
use conductor_core::provider::Provider;
use conductor_core::tool::ToolRegistry;
use conductor_core::wrapper::{FailFast, Logging, Retry, Timeout, Timing, TranslateErrors, WrapperChain};

use crate::loop_runner::AgentConfig;
use crate::structured::StructuredGenerator;

/// The wrapper chain described by `[execution]`.
///
/// Order, outermost first: logging, timing, fail-fast, retry, timeout,
/// error translation. Retries and timeouts happen before a failure is
/// escalated; each attempt gets its own timeout.
pub fn wrapper_chain(execution: &ExecutionConfig) -> WrapperChain {
    let mut chain = WrapperChain::empty();
    if execution.log_calls {
        chain = chain.with(Logging);
    }
    if execution.time_calls {
        chain = chain.with(Timing);
    }
    if execution.all_fatal() {
        chain = chain.with(FailFast::all());
    } else if !execution.fatal_tools.is_empty() {
        chain = chain.with(FailFast::only(execution.fatal_tools.iter().cloned()));
    }
    if execution.retry.max_attempts > 1 {
        chain = chain.with(Retry::new(
            execution.retry.max_attempts,
            Duration::from_millis(execution.retry.base_delay_ms),
        ));
    }
    if let Some(ms) = execution.timeout_ms {
        chain = chain.with(Timeout::from_millis(ms));
    }
    chain.with(TranslateErrors)
}

/// An agent config from `[agent]` and `[execution]`.
pub fn agent_config(
    app: &AppConfig,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
) -> AgentConfig {
    AgentConfig::new(provider, app.agent.model.clone())
        .with_temperature(app.agent.temperature)
        .with_max_tokens(app.agent.max_tokens)
        .with_system_prompt(app.agent.system_prompt.clone())
        .with_tools(tools)
        .with_max_iterations(app.agent.max_iterations)
        .with_wrappers(wrapper_chain(&app.execution))
}

/// A structured generator from `[agent]` and `[extraction]`.
pub fn structured_generator(app: &AppConfig, provider: Arc<dyn Provider>) -> StructuredGenerator {
    StructuredGenerator::new(provider, app.agent.model.clone())
        .with_temperature(app.agent.temperature)
        .with_max_tokens(app.agent.max_tokens)
        .with_max_retries(app.extraction.max_retries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loop_runner::AgentLoop;
    use crate::test_helpers::*;
    use conductor_core::tool::Tool;
    use serde_json::json;

    #[test]
    fn default_execution_is_fail_fast() {
        let chain = wrapper_chain(&ExecutionConfig::default());
        assert_eq!(
            chain.labels(),
            vec!["logging", "timing", "fail_fast", "translate_errors"]
        );
    }

    #[test]
    fn full_execution_policy_order() {
        let mut execution = ExecutionConfig::default();
        execution.fatal_tools = vec!["deploy".into()];
        execution.retry.max_attempts = 3;
        execution.timeout_ms = Some(1000);
        execution.log_calls = false;

        assert_eq!(
            wrapper_chain(&execution).labels(),
            vec!["timing", "fail_fast", "retry", "timeout", "translate_errors"]
        );
    }

    #[test]
    fn no_fatal_tools_means_no_fail_fast() {
        let mut execution = ExecutionConfig::default();
        execution.fatal_tools.clear();
        assert!(!wrapper_chain(&execution).labels().contains(&"fail_fast"));
    }

    #[tokio::test]
    async fn config_driven_agent_recovers_when_nothing_is_fatal() {
        let mut app = AppConfig::default();
        app.execution.fatal_tools.clear();
        app.agent.max_iterations = 2;

        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("explode", json!({}))],
            "",
            "That tool is broken.",
        ));
        let tools = ToolRegistry::from_tools([Arc::new(ExplodingTool) as Arc<dyn Tool>]).unwrap();
        let config = agent_config(&app, provider.clone(), Arc::new(tools));
        assert_eq!(config.max_iterations, 2);
        assert_eq!(config.max_tokens, Some(app.agent.max_tokens));

        let result = AgentLoop::new(config).run("Use the tool").await.unwrap();
        assert!(result.is_complete());
        assert!(result.steps[0].tool_results[0].is_error);
        assert_eq!(provider.requests()[0].model, app.agent.model);
    }

    #[tokio::test]
    async fn generator_uses_extraction_retries() {
        let mut app = AppConfig::default();
        app.extraction.max_retries = 0;
        let provider = Arc::new(SequentialMockProvider::single_text("nope"));
        let generator = structured_generator(&app, provider.clone());

        let schema = conductor_core::schema::JsonSchema::new(json!({"type": "object"})).unwrap();
        let err = generator.generate("Give me an object", &schema).await.unwrap_err();
        assert!(matches!(
            err,
            conductor_core::Error::ExtractionExhausted { attempts: 1, .. }
        ));
        assert_eq!(provider.call_count(), 1);
    }
}
