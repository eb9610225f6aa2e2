//! Builtin memory tools.
//!
//! To add a tool: create a file here, implement the Tool trait,
//! add `pub mod <name>;` below and register it in create_default_registry().

pub mod chat;
pub mod memory_create;
pub mod memory_delete;
pub mod memory_migration;
pub mod memory_update;
pub mod stop;

use crate::registry::ToolResult;
use mnemo_core::{MemoryId, PriorityLevel, TemporalScope};
use serde_json::Value;

/// Required non-empty string parameter.
pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolResult> {
    match args.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(ToolResult::error(format!("Missing required parameter: {}", key))),
    }
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

pub(crate) fn memory_id(args: &Value) -> Result<MemoryId, ToolResult> {
    required_str(args, "memory_id").map(MemoryId::new)
}

/// Strictly parsed priority; `None` when absent.
pub(crate) fn priority(args: &Value) -> Result<Option<PriorityLevel>, ToolResult> {
    optional_str(args, "priority_level")
        .map(|s| s.parse().map_err(ToolResult::Error))
        .transpose()
}

/// Strictly parsed temporal scope; `None` when absent.
pub(crate) fn scope(args: &Value) -> Result<Option<TemporalScope>, ToolResult> {
    optional_str(args, "temporal_scope")
        .map(|s| s.parse().map_err(ToolResult::Error))
        .transpose()
}

pub(crate) const PRIORITY_VALUES: [&str; 5] = ["CORE", "HIGH", "MEDIUM", "LOW", "BACKGROUND"];
pub(crate) const SCOPE_VALUES: [&str; 2] = ["short_term", "long_term"];
