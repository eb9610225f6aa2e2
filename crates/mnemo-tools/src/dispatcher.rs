//! Action dispatch with fault isolation
//!
//! A tool failure (error result or panic) becomes a failed `ToolOutcome`.
//! Nothing a tool does can unwind into the reflection cycle.

use crate::registry::{Tool, ToolContext, ToolRegistry, ToolResult};
use futures::FutureExt;
use mnemo_core::{Action, ReflectionMode, ToolDefinition};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolOutcome {
    pub name: String,
    pub success: bool,
    /// The tool asked to end the cycle.
    pub halt: bool,
    pub message: String,
}

impl ToolOutcome {
    fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            halt: false,
            message: message.into(),
        }
    }
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry: Arc::new(registry) }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn resolve(&self, mode: ReflectionMode, name: &str) -> Option<Arc<dyn Tool>> {
        self.registry.resolve(mode, name)
    }

    pub fn definitions(&self, mode: ReflectionMode) -> Vec<ToolDefinition> {
        self.registry.definitions(mode)
    }

    /// Run one tool. Errors and panics are reported, never propagated.
    pub async fn execute(&self, tool: Arc<dyn Tool>, ctx: &ToolContext, params: Value) -> ToolOutcome {
        let name = tool.name().to_string();
        debug!("Executing tool {} in {} mode", name, ctx.mode);

        match AssertUnwindSafe(tool.execute(ctx, params)).catch_unwind().await {
            Ok(ToolResult::Error(e)) => {
                warn!("Tool {} failed: {}", name, e);
                ToolOutcome::failed(name, e)
            }
            Ok(result) => {
                let halt = tool.halts_cycle();
                info!("Tool {} succeeded{}", name, if halt { " (halting cycle)" } else { "" });
                ToolOutcome {
                    name,
                    success: true,
                    halt,
                    message: result.to_content_string(),
                }
            }
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                error!("Tool {} panicked: {}", name, msg);
                ToolOutcome::failed(name, format!("panicked: {}", msg))
            }
        }
    }

    /// Resolve an action against the context's mode, then run it.
    pub async fn dispatch(&self, ctx: &ToolContext, action: &Action) -> ToolOutcome {
        match self.resolve(ctx.mode, &action.name) {
            Some(tool) => self.execute(tool, ctx, action.params.clone()).await,
            None if self.registry.get(&action.name).is_some() => {
                warn!("Tool {} is not available in {} mode", action.name, ctx.mode);
                ToolOutcome::failed(
                    &action.name,
                    format!("Tool '{}' is not available in {} mode", action.name, ctx.mode),
                )
            }
            None => {
                warn!("Tool not found: {}", action.name);
                ToolOutcome::failed(&action.name, format!("Tool not found: {}", action.name))
            }
        }
    }
}
