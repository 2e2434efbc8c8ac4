//! Validation tools — let an agent check its own JSON against a schema.
//!
//! [`validation_tool`] builds a tool from a schema alone. It takes
//! `{ "json": "<text>" }` and reports `{ "valid": true }` or
//! `{ "valid": false, "errors": [...] }`. Invalid JSON is a reported result,
//! not a tool error, so the model can fix it and try again.

use async_trait::async_trait;
use conductor_core::error::ToolError;
use conductor_core::extract::{self, ExtractionError};
use conductor_core::schema::{JsonSchema, SchemaError};
use conductor_core::tool::{Tool, ToolResult};
use serde_json::{Value, json};
use tracing::debug;

pub struct ValidationTool {
    name: String,
    description: String,
    schema: JsonSchema,
}

/// Build a validation tool for `schema`.
pub fn validation_tool(
    name: impl Into<String>,
    description: impl Into<String>,
    schema: Value,
) -> Result<ValidationTool, SchemaError> {
    Ok(ValidationTool {
        name: name.into(),
        description: description.into(),
        schema: JsonSchema::new(schema)?,
    })
}

impl ValidationTool {
    /// The schema candidates are checked against.
    pub fn schema(&self) -> &JsonSchema {
        &self.schema
    }

    fn check(&self, text: &str) -> Value {
        match extract::extract(text, &self.schema) {
            Ok(_) => json!({ "valid": true }),
            Err(ExtractionError::Syntax { message, .. }) => json!({
                "valid": false,
                "errors": [format!("invalid JSON: {message}")]
            }),
            Err(ExtractionError::Schema { issues }) => json!({
                "valid": false,
                "errors": issues.iter().map(ToString::to_string).collect::<Vec<_>>()
            }),
        }
    }
}

#[async_trait]
impl Tool for ValidationTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "json": {
                    "type": "string",
                    "description": "The JSON document to validate, as text"
                }
            },
            "required": ["json"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let text = arguments["json"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments {
                tool_name: self.name.clone(),
                reason: "'json' must be a string".into(),
            })?;

        let report = self.check(text);
        debug!(tool = %self.name, valid = %report["valid"], "Validated candidate");
        Ok(ToolResult::success(report.to_string()).with_data(report))
    }
}
