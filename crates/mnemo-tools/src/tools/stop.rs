//! Stop tool - end the current reflection cycle

use crate::registry::{Tool, ToolContext, ToolResult};
use mnemo_core::ReflectionMode;
use serde_json::{json, Value};
use tracing::debug;

pub const NAME: &str = "stop_reasoning";

pub struct StopReasoningTool;

#[async_trait::async_trait]
impl Tool for StopReasoningTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Stop reasoning. Use when nothing further needs to be done in this reflection cycle."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    fn available_in(&self, _mode: ReflectionMode) -> bool {
        true
    }

    fn halts_cycle(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &ToolContext, _args: Value) -> ToolResult {
        debug!("stop_reasoning requested in {} mode", ctx.mode);
        ToolResult::text("Reasoning stopped")
    }
}
