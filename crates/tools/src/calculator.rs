//! Calculator tool — binary arithmetic on two numbers.
//!
//! Models are bad at arithmetic and good at picking an operation, so the
//! input is an operation name plus two operands rather than a free-form
//! expression. Numeric strings are accepted for the operands.

use async_trait::async_trait;
use conductor_core::error::ToolError;
use conductor_core::schema::coerce;
use conductor_core::tool::{Tool, ToolResult};
use serde::Deserialize;
use serde_json::{Value, json};

pub struct CalculatorTool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

#[derive(Debug, Deserialize)]
struct CalculatorInput {
    operation: Operation,
    #[serde(deserialize_with = "coerce::lenient_f64")]
    a: f64,
    #[serde(deserialize_with = "coerce::lenient_f64")]
    b: f64,
}

/// Apply `op` to the operands.
pub fn apply(op: Operation, a: f64, b: f64) -> Result<f64, String> {
    let value = match op {
        Operation::Add => a + b,
        Operation::Subtract => a - b,
        Operation::Multiply => a * b,
        Operation::Divide => {
            if b == 0.0 {
                return Err("Division by zero".into());
            }
            a / b
        }
        Operation::Power => a.powf(b),
    };
    if value.is_finite() {
        Ok(value)
    } else {
        Err("Result is not a finite number".into())
    }
}

/// Render without a trailing `.0` for whole numbers.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform arithmetic on two numbers. Operations: add, subtract, multiply, divide, power."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide", "power"],
                    "description": "The operation to perform"
                },
                "a": {
                    "type": ["number", "string"],
                    "description": "First operand"
                },
                "b": {
                    "type": ["number", "string"],
                    "description": "Second operand"
                }
            },
            "required": ["operation", "a", "b"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let input: CalculatorInput =
            serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
                tool_name: self.name().to_string(),
                reason: e.to_string(),
            })?;

        match apply(input.operation, input.a, input.b) {
            Ok(value) => Ok(ToolResult::success(format_number(value)).with_data(json!({
                "result": value
            }))),
            Err(e) => Ok(ToolResult::failure(format!("Error: {e}"))),
        }
    }
}
