use chrono::{Local, TimeZone};
use mnemo_core::{Memory, AGENT_UNIT, DEFAULT_UNIT_NAME, USER_UNIT};
use mnemo_memory::StoreStats;
use serde_json::Value;
use std::str::FromStr;

/// Store size above which the world state flags the overflow.
pub const STORE_SOFT_LIMIT: usize = 200;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MemoryFormat {
    /// One line per memory with id, kind and every metadata field.
    #[default]
    Default,
    /// Speaker-prefixed transcript.
    Conversation,
}

impl FromStr for MemoryFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(MemoryFormat::Default),
            "conversation" => Ok(MemoryFormat::Conversation),
            other => Err(format!("unknown memory format: {}", other)),
        }
    }
}

pub fn format_memories(memories: &[Memory], format: MemoryFormat) -> String {
    let mut out = String::new();

    for memory in memories {
        match format {
            MemoryFormat::Default => {
                out.push_str(&format!(
                    "[{}] [ID: {}] - {} - ({}): {}\n",
                    format_timestamp(memory.timestamp),
                    memory.id,
                    memory.kind,
                    metadata_line(memory),
                    memory.content
                ));
            }
            MemoryFormat::Conversation => {
                out.push_str(&format!(
                    "{}: \"{}\"\n",
                    speaker(&memory.metadata.unit_name),
                    memory.content
                ));
            }
        }
    }

    out.trim_end().to_string()
}

/// Short block describing the store, for embedding in reasoner prompts.
pub fn world_state(stats: &StoreStats) -> String {
    let overflow = if stats.total_memories > STORE_SOFT_LIMIT {
        format!(
            " ({} over the limit of {})",
            stats.total_memories - STORE_SOFT_LIMIT,
            STORE_SOFT_LIMIT
        )
    } else {
        String::new()
    };

    let mut out = String::new();
    out.push_str(&format!("  - Total Memories: {}{}\n", stats.total_memories, overflow));
    out.push_str(&format!("  - Total Connections: {}\n", stats.total_connections));
    out.push_str(&format!("  - Memory Types: {}\n", distribution(&stats.by_kind)));
    out.push_str(&format!("  - Roles: {}\n", distribution(&stats.by_role)));
    out
}

fn distribution(counts: &std::collections::BTreeMap<String, usize>) -> String {
    counts
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn speaker(unit_name: &str) -> &str {
    match unit_name {
        AGENT_UNIT => "Assistant",
        USER_UNIT => "User",
        "" | DEFAULT_UNIT_NAME => "System",
        other => other,
    }
}

fn metadata_line(memory: &Memory) -> String {
    let meta = &memory.metadata;
    let mut keys = vec!["role", "unit_name"];
    if meta.priority_level.is_some() {
        keys.push("priority_level");
    }
    keys.push("temporal_scope");
    if meta.recalled.is_some() {
        keys.push("recalled");
    }
    keys.push("reasoning_mode");

    keys.into_iter()
        .map(|k| (k.to_string(), meta.field(k)))
        .chain(meta.extra.iter().map(|(k, v)| (k.clone(), v.clone())))
        .map(|(k, v)| format!("{}={}", k, plain(&v)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn format_timestamp(ts: f64) -> String {
    let secs = ts.trunc() as i64;
    let nanos = (ts.fract() * 1e9) as u32;
    Local
        .timestamp_opt(secs, nanos)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}
