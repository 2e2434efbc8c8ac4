//! Execution wrappers — decorators around tool handlers.
//!
//! A [`WrapperChain`] is an ordered list of [`Wrapper`]s. The first entry is
//! the outermost layer: on the way in wrappers run in list order, on the way
//! out in reverse. An empty chain leaves the handler untouched.
//!
//! ```text
//! chain = [Logging, Timing, FailFast]
//!
//! Logging ─▶ Timing ─▶ FailFast ─▶ handler
//! Logging ◀─ Timing ◀─ FailFast ◀─┘
//! ```

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, info_span, warn};

use crate::error::ToolError;
use crate::tool::{Tool, ToolResult};

/// Something that can run one tool invocation.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Name of the tool this executor ultimately runs.
    fn tool_name(&self) -> &str;

    async fn call(&self, arguments: Value) -> Result<ToolResult, ToolError>;
}

/// The innermost executor: calls the tool's handler.
pub struct BaseExecutor {
    tool: Arc<dyn Tool>,
}

impl BaseExecutor {
    pub fn new(tool: Arc<dyn Tool>) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl ToolExecutor for BaseExecutor {
    fn tool_name(&self) -> &str {
        self.tool.name()
    }

    async fn call(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        self.tool.execute(arguments).await
    }
}

/// Builds a wrapped executor from an inner one.
pub trait Wrapper: Send + Sync {
    /// Short label used by [`WrapperChain::labels`] and in logs.
    fn label(&self) -> &str;

    fn wrap(&self, inner: Arc<dyn ToolExecutor>) -> Arc<dyn ToolExecutor>;
}

/// An ordered, explicit wrapper composition.
#[derive(Clone, Default)]
pub struct WrapperChain {
    wrappers: Vec<Arc<dyn Wrapper>>,
}

impl WrapperChain {
    /// The identity chain.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Logging, timing, fail-fast on every handler error, then error
    /// translation closest to the handler.
    pub fn standard() -> Self {
        Self::empty()
            .with(Logging)
            .with(Timing)
            .with(FailFast::all())
            .with(TranslateErrors)
    }

    /// Append a wrapper as the new innermost layer.
    pub fn with(mut self, wrapper: impl Wrapper + 'static) -> Self {
        self.push(Arc::new(wrapper));
        self
    }

    pub fn push(&mut self, wrapper: Arc<dyn Wrapper>) {
        self.wrappers.push(wrapper);
    }

    /// Compose the chain around `base`, innermost first.
    pub fn apply(&self, base: Arc<dyn ToolExecutor>) -> Arc<dyn ToolExecutor> {
        self.wrappers
            .iter()
            .rev()
            .fold(base, |inner, wrapper| wrapper.wrap(inner))
    }

    /// Wrapper labels, outermost first.
    pub fn labels(&self) -> Vec<&str> {
        self.wrappers.iter().map(|w| w.label()).collect()
    }

    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }
}

impl std::fmt::Debug for WrapperChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.labels()).finish()
    }
}

// --- Built-in wrappers ---

/// Identity wrapper.
pub struct PassThrough;

impl Wrapper for PassThrough {
    fn label(&self) -> &str {
        "pass_through"
    }

    fn wrap(&self, inner: Arc<dyn ToolExecutor>) -> Arc<dyn ToolExecutor> {
        inner
    }
}

/// Runs each call inside a `tool` span and logs the outcome.
pub struct Logging;

struct LoggingExecutor {
    inner: Arc<dyn ToolExecutor>,
}

impl Wrapper for Logging {
    fn label(&self) -> &str {
        "logging"
    }

    fn wrap(&self, inner: Arc<dyn ToolExecutor>) -> Arc<dyn ToolExecutor> {
        Arc::new(LoggingExecutor { inner })
    }
}

#[async_trait]
impl ToolExecutor for LoggingExecutor {
    fn tool_name(&self) -> &str {
        self.inner.tool_name()
    }

    async fn call(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let span = info_span!("tool", name = %self.tool_name());
        async {
            debug!(arguments = %arguments, "Tool invoked");
            let outcome = self.inner.call(arguments).await;
            match &outcome {
                Ok(result) => debug!(success = result.success, "Tool returned"),
                Err(e) => warn!(error = %e, "Tool raised an error"),
            }
            outcome
        }
        .instrument(span)
        .await
    }
}

/// Records `duration_ms` on the result's data.
pub struct Timing;

struct TimingExecutor {
    inner: Arc<dyn ToolExecutor>,
}

impl Wrapper for Timing {
    fn label(&self) -> &str {
        "timing"
    }

    fn wrap(&self, inner: Arc<dyn ToolExecutor>) -> Arc<dyn ToolExecutor> {
        Arc::new(TimingExecutor { inner })
    }
}

#[async_trait]
impl ToolExecutor for TimingExecutor {
    fn tool_name(&self) -> &str {
        self.inner.tool_name()
    }

    async fn call(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let start = Instant::now();
        let outcome = self.inner.call(arguments).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(tool = %self.tool_name(), duration_ms, "Tool timing");

        let mut result = outcome?;
        // Non-object data belongs to the handler and is left alone.
        match &mut result.data {
            None => result.data = Some(json!({ "duration_ms": duration_ms })),
            Some(Value::Object(map)) => {
                map.insert("duration_ms".into(), json!(duration_ms));
            }
            Some(_) => {}
        }
        Ok(result)
    }
}

/// Bounds each call's wall-clock time.
pub struct Timeout {
    limit: Duration,
}

impl Timeout {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }
}

struct TimeoutExecutor {
    inner: Arc<dyn ToolExecutor>,
    limit: Duration,
}

impl Wrapper for Timeout {
    fn label(&self) -> &str {
        "timeout"
    }

    fn wrap(&self, inner: Arc<dyn ToolExecutor>) -> Arc<dyn ToolExecutor> {
        Arc::new(TimeoutExecutor {
            inner,
            limit: self.limit,
        })
    }
}

#[async_trait]
impl ToolExecutor for TimeoutExecutor {
    fn tool_name(&self) -> &str {
        self.inner.tool_name()
    }

    async fn call(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        match tokio::time::timeout(self.limit, self.inner.call(arguments)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ToolError::Timeout {
                tool_name: self.tool_name().to_string(),
                timeout_ms: self.limit.as_millis() as u64,
            }),
        }
    }
}

/// Re-invokes the inner executor on retryable errors.
///
/// Attempt `n` (1-based) waits `base_delay * 2^(n-1)` before the next one.
pub struct Retry {
    max_attempts: u32,
    base_delay: Duration,
}

impl Retry {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }
}

struct RetryExecutor {
    inner: Arc<dyn ToolExecutor>,
    max_attempts: u32,
    base_delay: Duration,
}

impl Wrapper for Retry {
    fn label(&self) -> &str {
        "retry"
    }

    fn wrap(&self, inner: Arc<dyn ToolExecutor>) -> Arc<dyn ToolExecutor> {
        Arc::new(RetryExecutor {
            inner,
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
        })
    }
}

#[async_trait]
impl ToolExecutor for RetryExecutor {
    fn tool_name(&self) -> &str {
        self.inner.tool_name()
    }

    async fn call(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let mut attempt = 1;
        loop {
            match self.inner.call(arguments.clone()).await {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.base_delay.saturating_mul(1u32 << (attempt - 1).min(16));
                    warn!(
                        tool = %self.tool_name(),
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Tool failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

/// Attributes plain handler errors to the tool that raised them.
pub struct TranslateErrors;

struct TranslateExecutor {
    inner: Arc<dyn ToolExecutor>,
}

impl Wrapper for TranslateErrors {
    fn label(&self) -> &str {
        "translate_errors"
    }

    fn wrap(&self, inner: Arc<dyn ToolExecutor>) -> Arc<dyn ToolExecutor> {
        Arc::new(TranslateExecutor { inner })
    }
}

#[async_trait]
impl ToolExecutor for TranslateExecutor {
    fn tool_name(&self) -> &str {
        self.inner.tool_name()
    }

    async fn call(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        self.inner
            .call(arguments)
            .await
            .map_err(|e| match e {
                ToolError::Handler(source) => ToolError::ExecutionFailed {
                    tool_name: self.tool_name().to_string(),
                    reason: format!("{source:#}"),
                },
                other => other,
            })
    }
}

/// Escalates handler errors to [`ToolError::Fatal`], aborting the run.
pub struct FailFast {
    /// `None` = every tool.
    tools: Option<Arc<HashSet<String>>>,
}

impl FailFast {
    pub fn all() -> Self {
        Self { tools: None }
    }

    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tools: Some(Arc::new(names.into_iter().map(Into::into).collect())),
        }
    }

    fn applies_to(&self, tool_name: &str) -> bool {
        self.tools.as_ref().is_none_or(|set| set.contains(tool_name))
    }
}

struct FailFastExecutor {
    inner: Arc<dyn ToolExecutor>,
}

impl Wrapper for FailFast {
    fn label(&self) -> &str {
        "fail_fast"
    }

    fn wrap(&self, inner: Arc<dyn ToolExecutor>) -> Arc<dyn ToolExecutor> {
        if self.applies_to(inner.tool_name()) {
            Arc::new(FailFastExecutor { inner })
        } else {
            inner
        }
    }
}

#[async_trait]
impl ToolExecutor for FailFastExecutor {
    fn tool_name(&self) -> &str {
        self.inner.tool_name()
    }

    async fn call(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        self.inner.call(arguments).await.map_err(|e| {
            if e.is_fatal() {
                e
            } else {
                ToolError::Fatal {
                    tool_name: self.tool_name().to_string(),
                    reason: e.to_string(),
                }
            }
        })
    }
}
