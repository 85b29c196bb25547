//! Integer multiplication.

use async_trait::async_trait;
use slothtop_core::error::ToolError;
use slothtop_core::tool::{ParamType, Tool, ToolParam, ToolResult};

pub struct MultiplyTool;

#[async_trait]
impl Tool for MultiplyTool {
    fn name(&self) -> &str {
        "multiply"
    }

    fn description(&self) -> &str {
        "Multiply two integers and return the product."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::required("a", ParamType::Integer, "First factor"),
            ToolParam::required("b", ParamType::Integer, "Second factor"),
        ]
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let factor = |key: &str| {
            arguments[key]
                .as_i64()
                .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' must be an integer")))
        };
        let (a, b) = (factor("a")?, factor("b")?);
        let product = a
            .checked_mul(b)
            .ok_or_else(|| ToolError::failed("multiply", format!("{a} * {b} overflows")))?;
        Ok(ToolResult::ok(product.to_string()).with_data(serde_json::json!({ "product": product })))
    }
}
