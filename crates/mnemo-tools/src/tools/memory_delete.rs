//! Memory delete tool - purge a memory from both tiers

use super::memory_id;
use crate::registry::{Tool, ToolContext, ToolResult};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const NAME: &str = "memory_delete";

pub struct MemoryDeleteTool;

#[async_trait::async_trait]
impl Tool for MemoryDeleteTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Delete a memory that is currently in working memory. \
         The memory is removed permanently."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "memory_id": {
                    "type": "string",
                    "description": "Id of the memory to delete"
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

        if !ctx.working.contains(&id).await {
            return ToolResult::error(format!("Memory {} is not in working memory", id));
        }

        // Store first: a failed delete leaves both tiers as they were.
        let persisted = match ctx.store.remove(&id).await {
            Ok(persisted) => persisted,
            Err(e) => return ToolResult::error(format!("Failed to delete memory: {}", e)),
        };
        ctx.working.remove(&id).await;

        if persisted {
            debug!("memory_delete: {}", id);
            ToolResult::text(format!("Deleted memory {}", id))
        } else {
            warn!("memory_delete: {} was only in working memory", id);
            ToolResult::text(format!("Deleted memory {} from working memory", id))
        }
    }
}
