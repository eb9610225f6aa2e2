//! External collaborators consulted by a reflection cycle
//!
//! The engine only sees these traits. Implementations may call a language
//! model, a rules engine, or anything else; errors are treated as degraded
//! results, never as cycle failures.

use mnemo_core::{Action, Memory, MemoryId, ReflectionMode, Result, ToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Per-request knobs carried from enqueue to execution.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleOptions {
    #[serde(default)]
    pub skip_recall: bool,
    #[serde(default)]
    pub skip_forget: bool,
    /// Opaque parameters passed through to the reasoner.
    #[serde(default)]
    pub params: Value,
}

impl CycleOptions {
    pub fn with_params(params: Value) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }
}

/// Everything the reasoner is shown at one step.
#[derive(Clone, Debug, Serialize)]
pub struct ReasonerInput {
    pub working_memory: Vec<Memory>,
    pub mode: ReflectionMode,
    pub options: CycleOptions,
    pub tools: Vec<ToolDefinition>,
}

/// Decides what to do next. `None` or an empty list ends the reasoning loop.
#[async_trait::async_trait]
pub trait Reasoner: Send + Sync {
    async fn decide(&self, input: &ReasonerInput) -> Result<Option<Vec<Action>>>;
}

/// Picks the stored memories relevant to a cue.
#[async_trait::async_trait]
pub trait RelevanceJudge: Send + Sync {
    async fn select(&self, cue: &str, candidates: &[Memory]) -> Result<Vec<MemoryId>>;
}

/// Picks the recalled memories an output actually made use of.
#[async_trait::async_trait]
pub trait UsageJudge: Send + Sync {
    async fn select_used(&self, text: &str, candidates: &[Memory]) -> Result<Vec<MemoryId>>;
}

/// The three collaborators an engine needs.
#[derive(Clone)]
pub struct Collaborators {
    pub reasoner: Arc<dyn Reasoner>,
    pub relevance: Arc<dyn RelevanceJudge>,
    pub usage: Arc<dyn UsageJudge>,
}

impl Collaborators {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        relevance: Arc<dyn RelevanceJudge>,
        usage: Arc<dyn UsageJudge>,
    ) -> Self {
        Self {
            reasoner,
            relevance,
            usage,
        }
    }
}
