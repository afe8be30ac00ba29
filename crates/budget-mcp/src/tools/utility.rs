//! Utility tools: echo.

use serde_json::json;

use super::{CallContext, McpTool, ToolContext};
use crate::error::ToolResult;
use crate::models::EchoInput;

/// Connectivity check tool; the one tool callable without a bearer token
/// besides discovery itself.
pub struct EchoTool;

#[async_trait::async_trait]
impl McpTool for EchoTool {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn description(&self) -> &'static str {
        "Echo the provided message back to the caller. Useful for connectivity checks."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "Message to echo back"
                }
            }
        })
    }

    fn requires_auth(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        _ctx: &ToolContext,
        _call: &CallContext<'_>,
        input: serde_json::Value,
    ) -> ToolResult<String> {
        let params: EchoInput = serde_json::from_value(input)?;
        Ok(params.message)
    }
}
