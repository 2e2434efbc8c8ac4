//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what the model can ask the agent to do. Each tool declares a
//! JSON Schema for its input; the [`ToolRegistry`] compiles that schema at
//! registration, validates raw model arguments against it at dispatch, and
//! runs the handler through a [`WrapperChain`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::ToolError;
use crate::extract;
use crate::message::MessageToolCall;
use crate::provider::ToolDefinition;
use crate::schema::JsonSchema;
use crate::wrapper::{BaseExecutor, WrapperChain};

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    pub name: String,

    /// Arguments as raw JSON text, unvalidated
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: &Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.to_string(),
        }
    }
}

impl From<&MessageToolCall> for ToolCall {
    fn from(tc: &MessageToolCall) -> Self {
        Self {
            id: tc.id.clone(),
            name: tc.name.clone(),
            arguments: tc.arguments.clone(),
        }
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    pub success: bool,

    /// Text fed back to the model
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: false,
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn for_call(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }
}

/// The core Tool trait.
///
/// Handlers receive input that already passed [`Tool::parameters_schema`],
/// with declared defaults filled in.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "calculator").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with validated arguments.
    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    schema: JsonSchema,
}

/// A named collection of tools, read-only once handed to an agent.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the model
/// 2. Validate and execute the calls the model requests
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry, failing on the first duplicate name or bad schema.
    pub fn from_tools<I>(tools: I) -> Result<Self, ToolError>
    where
        I: IntoIterator<Item = Arc<dyn Tool>>,
    {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    /// Register a tool. Names must be unique within the registry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ToolError::DuplicateName(name));
        }
        let schema =
            JsonSchema::new(tool.parameters_schema()).map_err(|e| ToolError::InvalidSchema {
                tool_name: name.clone(),
                reason: e.to_string(),
            })?;
        self.index.insert(name, self.tools.len());
        self.tools.push(RegisteredTool { tool, schema });
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&i| &self.tools[i].tool)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tool definitions for the model, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.tool.to_definition()).collect()
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.tool.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// A new registry holding only the named tools.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, ToolError> {
        let mut registry = Self::new();
        for name in names {
            let name = name.as_ref();
            let &i = self
                .index
                .get(name)
                .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
            let entry = &self.tools[i];
            registry.index.insert(name.to_string(), registry.tools.len());
            registry.tools.push(RegisteredTool {
                tool: entry.tool.clone(),
                schema: entry.schema.clone(),
            });
        }
        Ok(registry)
    }

    /// Look up the tool and validate the call's raw arguments.
    ///
    /// Blank arguments are treated as `{}`.
    pub fn prepare(&self, call: &ToolCall) -> Result<(Arc<dyn Tool>, Value), ToolError> {
        let &i = self
            .index
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let entry = &self.tools[i];

        let raw = if call.arguments.trim().is_empty() {
            "{}"
        } else {
            call.arguments.as_str()
        };
        let invalid = |reason: String| ToolError::InvalidArguments {
            tool_name: call.name.clone(),
            reason,
        };
        // Arguments are already JSON; no fence stripping here.
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| invalid(format!("arguments are not valid JSON: {e}")))?;
        let value = extract::validate_value(value, &entry.schema)
            .map_err(|e| invalid(e.to_string()))?;
        Ok((entry.tool.clone(), value))
    }

    /// Validate a call and run it through `chain`.
    pub async fn dispatch(
        &self,
        call: &ToolCall,
        chain: &WrapperChain,
    ) -> Result<ToolResult, ToolError> {
        let (tool, arguments) = self.prepare(call)?;
        debug!(tool = %call.name, call_id = %call.id, "Dispatching tool call");
        let executor = chain.apply(Arc::new(BaseExecutor::new(tool)));
        let result = executor.call(arguments).await?;
        Ok(result.for_call(&call.id))
    }

    /// Validate a call and run the bare handler.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        self.dispatch(call, &WrapperChain::empty()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "shout": { "type": "boolean", "default": false }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            let text = if arguments["shout"] == json!(true) {
                text.to_uppercase()
            } else {
                text
            };
            Ok(ToolResult::success(text))
        }
    }

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "no-op"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _arguments: Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::success(self.0))
        }
    }

    fn echo_call(args: &str) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: args.into(),
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let registry = ToolRegistry::from_tools([Arc::new(EchoTool) as Arc<dyn Tool>]).unwrap();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[test]
    fn duplicate_names_fail_at_registration() {
        let err = ToolRegistry::from_tools([
            Arc::new(NamedTool("a")) as Arc<dyn Tool>,
            Arc::new(NamedTool("b")),
            Arc::new(NamedTool("a")),
        ])
        .err()
        .unwrap();
        assert!(matches!(err, ToolError::DuplicateName(ref n) if n == "a"));
    }

    #[test]
    fn definitions_keep_registration_order() {
        let registry = ToolRegistry::from_tools([
            Arc::new(NamedTool("zeta")) as Arc<dyn Tool>,
            Arc::new(NamedTool("alpha")),
        ])
        .unwrap();
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn subset_selects_named_tools() {
        let registry = ToolRegistry::from_tools([
            Arc::new(NamedTool("a")) as Arc<dyn Tool>,
            Arc::new(NamedTool("b")),
            Arc::new(NamedTool("c")),
        ])
        .unwrap();
        let sub = registry.subset(&["c", "a"]).unwrap();
        assert_eq!(sub.names(), vec!["c", "a"]);
        assert!(matches!(
            registry.subset(&["missing"]),
            Err(ToolError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn registry_execute_tool_applies_defaults() {
        let registry = ToolRegistry::from_tools([Arc::new(EchoTool) as Arc<dyn Tool>]).unwrap();
        let result = registry
            .execute(&echo_call(r#"{"text": "hello world"}"#))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hello world");
        assert_eq!(result.call_id, "call_1");
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let call = ToolCall::new("call_1", "nonexistent", &json!({}));
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn invalid_arguments_are_classified() {
        let registry = ToolRegistry::from_tools([Arc::new(EchoTool) as Arc<dyn Tool>]).unwrap();

        let err = registry.execute(&echo_call(r#"{"text": 5}"#)).await.unwrap_err();
        match err {
            ToolError::InvalidArguments { tool_name, reason } => {
                assert_eq!(tool_name, "echo");
                assert!(reason.contains("/text"));
            }
            other => panic!("expected InvalidArguments, got {other:?}"),
        }

        let err = registry.execute(&echo_call("{not json")).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn backticks_in_arguments_are_passed_through() {
        let registry = ToolRegistry::from_tools([Arc::new(EchoTool) as Arc<dyn Tool>]).unwrap();
        let text = "run ```rust\nfn main() {}\n``` for me";
        let call = ToolCall::new("call_1", "echo", &json!({ "text": text }));

        let result = registry.execute(&call).await.unwrap();
        assert_eq!(result.output, text);

        // A fenced argument string is not JSON
        let fenced = echo_call("```json\n{\"text\": \"hi\"}\n```");
        assert!(matches!(
            registry.execute(&fenced).await,
            Err(ToolError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn blank_arguments_are_an_empty_object() {
        let registry =
            ToolRegistry::from_tools([Arc::new(NamedTool("noop")) as Arc<dyn Tool>]).unwrap();
        let call = ToolCall {
            id: "c".into(),
            name: "noop".into(),
            arguments: "  ".into(),
        };
        let (_, value) = registry.prepare(&call).unwrap();
        assert_eq!(value, json!({}));
    }
}
