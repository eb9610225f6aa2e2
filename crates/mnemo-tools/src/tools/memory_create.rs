//! Memory create tool - record a reflection or piece of knowledge

use super::{optional_str, required_str, PRIORITY_VALUES, SCOPE_VALUES};
use crate::registry::{Tool, ToolContext, ToolResult};
use mnemo_core::{Memory, MemoryKind, MetadataPatch, PriorityLevel, TemporalScope, DEFAULT_ROLE};
use serde_json::{json, Value};
use tracing::debug;

pub const NAME: &str = "memory_create";

const ROLES: [&str; 4] = ["reflection", "episodic", "semantic", "procedural"];

pub struct MemoryCreateTool;

#[async_trait::async_trait]
impl Tool for MemoryCreateTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Create a memory. Reflections stay in working memory until they age out; \
         episodic, semantic and procedural memories may be forgotten once no longer used."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The memory text"
                },
                "unit_name": {
                    "type": "string",
                    "description": "Name of the unit creating the memory"
                },
                "role": {
                    "type": "string",
                    "enum": ROLES,
                    "description": "Memory role (default: reflection)"
                },
                "priority_level": {
                    "type": "string",
                    "enum": PRIORITY_VALUES,
                    "description": "Recall priority (default: BACKGROUND)"
                },
                "temporal_scope": {
                    "type": "string",
                    "enum": SCOPE_VALUES,
                    "description": "Retention horizon (default: short_term)"
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
        // Unrecognized enum values fall back to the defaults rather than failing.
        let role = optional_str(&args, "role")
            .map(|r| r.trim().to_ascii_lowercase())
            .filter(|r| ROLES.contains(&r.as_str()))
            .unwrap_or_else(|| DEFAULT_ROLE.to_string());
        let priority_level = PriorityLevel::parse_or_background(optional_str(&args, "priority_level"));
        let temporal_scope = TemporalScope::parse_or_short(optional_str(&args, "temporal_scope"));

        let mut patch = MetadataPatch::new()
            .role(role.as_str())
            .priority(priority_level)
            .scope(temporal_scope)
            .reasoning_mode(ctx.mode.as_str());
        if let Some(unit) = optional_str(&args, "unit_name") {
            patch = patch.unit_name(unit);
        }

        let memory = Memory::new(MemoryKind::Internal, content, patch);
        match ctx.store.insert(memory.clone()).await {
            Ok(true) => {}
            Ok(false) => return ToolResult::error(format!("Memory id {} already in use", memory.id)),
            Err(e) => return ToolResult::error(format!("Failed to persist memory: {}", e)),
        }

        let mut working_copy = memory;
        if role != DEFAULT_ROLE {
            working_copy.metadata.recalled = Some(true);
        }
        let id = working_copy.id.clone();
        ctx.working.append(working_copy).await;

        debug!(
            "memory_create: {} role={}, priority={}, scope={}",
            id,
            role,
            priority_level.as_str(),
            temporal_scope.as_str()
        );
        ToolResult::Json(json!({ "memory_id": id }))
    }
}
