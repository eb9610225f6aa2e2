//! Tool registry and trait definitions
//!
//! Each tool is a self-contained module implementing the Tool trait.
//! The reflection mode decides which registered tools a cycle may see.

use mnemo_core::{ReflectionMode, ToolDefinition};
use mnemo_memory::{StoreTarget, WorkingMemory};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum ToolResult {
    Text(String),
    Json(Value),
    Error(String),
}

impl ToolResult {
    pub fn text(s: impl Into<String>) -> Self { Self::Text(s.into()) }
    pub fn error(s: impl Into<String>) -> Self { Self::Error(s.into()) }

    pub fn to_content_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Json(v) => serde_json::to_string_pretty(v).unwrap_or_default(),
            Self::Error(e) => format!("Error: {}", e),
        }
    }

    pub fn is_error(&self) -> bool { matches!(self, Self::Error(_)) }
}

/// What a tool may touch during one cycle.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub working: Arc<WorkingMemory>,
    pub store: StoreTarget,
    pub mode: ReflectionMode,
}

impl ToolContext {
    pub fn new(working: Arc<WorkingMemory>, store: StoreTarget, mode: ReflectionMode) -> Self {
        Self { working, store, mode }
    }
}

/// The Tool trait. Implement this to give the reasoner a new action.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name, matched against `Action::name`.
    fn name(&self) -> &str;

    /// Human-readable description sent to the reasoner.
    fn description(&self) -> &str;

    /// JSON Schema for input parameters.
    fn input_schema(&self) -> Value;

    /// Whether a cycle in `mode` may run this tool. Default: every mode but migration.
    fn available_in(&self, mode: ReflectionMode) -> bool {
        mode != ReflectionMode::Migration
    }

    /// A successful run ends the current cycle.
    fn halts_cycle(&self) -> bool { false }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ToolResult;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self { Self::new() }
}

impl ToolRegistry {
    pub fn new() -> Self { Self { tools: HashMap::new() } }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Look up a tool the given mode is allowed to run.
    pub fn resolve(&self, mode: ReflectionMode, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .filter(|t| t.available_in(mode))
            .cloned()
    }

    /// Definitions visible in `mode`, sorted by name.
    pub fn definitions(&self, mode: ReflectionMode) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values()
            .filter(|t| t.available_in(mode))
            .map(|t| t.definition())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize { self.tools.len() }

    pub fn is_empty(&self) -> bool { self.tools.is_empty() }
}
