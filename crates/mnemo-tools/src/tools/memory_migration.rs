//! Memory migration tool - export a distilled summary of all memories

use super::{optional_str, required_str};
use crate::registry::{Tool, ToolContext, ToolResult};
use mnemo_core::{InteractionRole, MemoryKind, MetadataPatch, PriorityLevel, ReflectionMode, TemporalScope};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

pub const NAME: &str = "memory_migration";

const UNIT_NAME: &str = "MemoryMigrationTool";
const DEFAULT_FILENAME: &str = "migration_summary";

pub struct MemoryMigrationTool {
    export_dir: PathBuf,
}

impl MemoryMigrationTool {
    pub fn new(export_dir: impl AsRef<Path>) -> Self {
        Self {
            export_dir: export_dir.as_ref().to_path_buf(),
        }
    }
}

/// Keep the base name a single path component.
fn sanitize(filename: &str) -> String {
    filename
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait::async_trait]
impl Tool for MemoryMigrationTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Save a distilled summary of all memories for migration. Keep core objectives, \
         key learnings, essential memories and system state; omit transient conversation."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The structured summary"
                },
                "filename": {
                    "type": "string",
                    "description": "Base filename; a timestamp is appended (default: migration_summary)"
                }
            },
            "required": ["content"]
        })
    }

    fn available_in(&self, mode: ReflectionMode) -> bool {
        mode == ReflectionMode::Migration
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ToolResult {
        let content = match required_str(&args, "content") {
            Ok(c) => c,
            Err(e) => return e,
        };
        let base = sanitize(optional_str(&args, "filename").unwrap_or(DEFAULT_FILENAME));
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let path = self.export_dir.join(format!("{}_{}.md", base, stamp));

        if let Err(e) = fs::create_dir_all(&self.export_dir).await {
            return ToolResult::error(format!("Failed to create directories: {}", e));
        }
        if let Err(e) = fs::write(&path, content).await {
            return ToolResult::error(format!("Failed to write summary: {}", e));
        }
        info!("Migration summary saved to {} ({} bytes)", path.display(), content.len());

        let mode = ctx.mode.as_str();
        ctx.working
            .add_memory(
                MemoryKind::Internal,
                format!("System migration summary generated: {}", path.display()),
                MetadataPatch::new()
                    .role("system_operation")
                    .unit_name(UNIT_NAME)
                    .reasoning_mode(mode)
                    .priority(PriorityLevel::Background)
                    .scope(TemporalScope::ShortTerm),
                [],
            )
            .await;
        ctx.working
            .add_interaction(
                InteractionRole::Agent,
                content,
                MetadataPatch::new()
                    .unit_name(UNIT_NAME)
                    .reasoning_mode(mode)
                    .extra("parse_mode", "markdown"),
            )
            .await;
        ctx.working
            .add_interaction(
                InteractionRole::Agent,
                format!("Summary generated and saved to {}", path.display()),
                MetadataPatch::new()
                    .unit_name(UNIT_NAME)
                    .reasoning_mode(mode)
                    .extra("parse_mode", "plaintext"),
            )
            .await;

        ToolResult::Json(json!({ "path": path.display().to_string() }))
    }
}
