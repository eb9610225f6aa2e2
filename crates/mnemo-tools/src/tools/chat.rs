//! Chat tool - say something to the user

use super::{optional_str, required_str};
use crate::registry::{Tool, ToolContext, ToolResult};
use mnemo_core::{InteractionRole, MetadataPatch};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const NAME: &str = "chat";

pub struct ChatTool;

#[async_trait::async_trait]
impl Tool for ChatTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Send a message to the user. The message is recorded in working memory \
         and persisted to long-term memory."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Message text"
                },
                "parse_mode": {
                    "type": "string",
                    "enum": ["markdown", "plaintext"],
                    "description": "How the front-end should render the message (default: plaintext)"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ToolResult {
        let content = match required_str(&args, "content") {
            Ok(c) => c,
            Err(e) => return e,
        };
        let parse_mode = optional_str(&args, "parse_mode").unwrap_or("plaintext");
        if parse_mode != "markdown" && parse_mode != "plaintext" {
            return ToolResult::error(format!("Invalid parse_mode: {}", parse_mode));
        }

        let memory = ctx
            .working
            .add_interaction(
                InteractionRole::Agent,
                content,
                MetadataPatch::new()
                    .reasoning_mode(ctx.mode.as_str())
                    .extra("parse_mode", parse_mode),
            )
            .await;

        let id = memory.id.clone();
        match ctx.store.insert(memory).await {
            Ok(true) => {}
            Ok(false) => warn!("chat: memory {} already persisted", id),
            Err(e) => return ToolResult::error(format!("Failed to persist message: {}", e)),
        }

        debug!("chat: {} ({} chars)", id, content.len());
        ToolResult::Json(json!({ "memory_id": id, "parse_mode": parse_mode }))
    }
}
