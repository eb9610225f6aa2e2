//! Memory update tool - revise content, priority or scope of a stored memory

use super::{memory_id, optional_str, priority, scope, PRIORITY_VALUES, SCOPE_VALUES};
use crate::registry::{Tool, ToolContext, ToolResult};
use mnemo_core::MetadataPatch;
use serde_json::{json, Value};
use tracing::debug;

pub const NAME: &str = "memory_update";

pub struct MemoryUpdateTool;

#[async_trait::async_trait]
impl Tool for MemoryUpdateTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Update an existing memory. Only the fields given are changed."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "memory_id": {
                    "type": "string",
                    "description": "Id of the memory to update"
                },
                "content": {
                    "type": "string",
                    "description": "Replacement content"
                },
                "priority_level": {
                    "type": "string",
                    "enum": PRIORITY_VALUES
                },
                "temporal_scope": {
                    "type": "string",
                    "enum": SCOPE_VALUES
                }
            },
            "required": ["memory_id"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ToolResult {
        let id = match memory_id(&args) {
            Ok(id) => id,
            Err(e) => return e,
        };
        let mut patch = MetadataPatch::new().reasoning_mode(ctx.mode.as_str());
        match priority(&args) {
            Ok(Some(p)) => patch = patch.priority(p),
            Ok(None) => {}
            Err(e) => return e,
        }
        match scope(&args) {
            Ok(Some(s)) => patch = patch.scope(s),
            Ok(None) => {}
            Err(e) => return e,
        }
        let content = optional_str(&args, "content").map(str::to_string);

        match ctx.store.update(&id, patch.clone(), content.clone()).await {
            Ok(true) => {}
            Ok(false) => return ToolResult::error(format!("Memory not found: {}", id)),
            Err(e) => return ToolResult::error(format!("Failed to update memory: {}", e)),
        }

        let in_working = ctx
            .working
            .replace(&id, |m| {
                m.metadata.merge(patch);
                if let Some(content) = content {
                    m.content = content;
                }
            })
            .await
            .is_some();

        debug!("memory_update: {} (working copy updated: {})", id, in_working);
        ToolResult::text(format!("Updated memory {}", id))
    }
}
