//! Greeting tool — greets one person by name.

use async_trait::async_trait;
use conductor_core::error::ToolError;
use conductor_core::tool::{Tool, ToolResult};
use serde_json::{Value, json};

pub struct GreetingTool;

#[async_trait]
impl Tool for GreetingTool {
    fn name(&self) -> &str {
        "greet"
    }

    fn description(&self) -> &str {
        "Greet a single person by name. Call once per person."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Name of the person to greet"
                },
                "style": {
                    "type": "string",
                    "enum": ["casual", "formal"],
                    "default": "casual"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let name = arguments["name"].as_str().unwrap_or_default().trim();
        let greeting = match arguments["style"].as_str() {
            Some("formal") => format!("Good day, {name}. It is a pleasure to meet you."),
            _ => format!("Hello, {name}!"),
        };
        Ok(ToolResult::success(greeting).with_data(json!({ "name": name })))
    }
}
