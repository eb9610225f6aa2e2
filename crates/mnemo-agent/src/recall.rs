//! Recall gate: move relevant stored memories into working memory

use crate::collaborators::RelevanceJudge;
use mnemo_core::{
    Memory, MemoryId, MemoryKind, MetadataPatch, Query, ReflectionMode, Result, TemporalScope,
};
use mnemo_memory::{StoreTarget, WorkingMemory};
use mnemo_tools::{Tool, ToolContext, ToolResult};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info};

pub const DEFAULT_RECALL_WINDOW: usize = 1000;

/// Cue used by deep and migration recalls when nobody has said anything yet.
pub const GENERIC_CUE: &str =
    "Review stored memories relevant to current goals, open tasks and recent activity.";

pub struct RecallGate {
    store: StoreTarget,
    judge: Arc<dyn RelevanceJudge>,
    window: usize,
}

impl RecallGate {
    pub fn new(store: StoreTarget, judge: Arc<dyn RelevanceJudge>) -> Self {
        Self {
            store,
            judge,
            window: DEFAULT_RECALL_WINDOW,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    async fn candidates(
        &self,
        mode: ReflectionMode,
        exclude: &HashSet<MemoryId>,
    ) -> Result<Vec<Memory>> {
        let query = match mode {
            ReflectionMode::Quick => Query::new().last(self.window),
            ReflectionMode::Deep | ReflectionMode::Migration => Query::new(),
        };
        let mut candidates = self.store.query(&query).await?;
        candidates.retain(|m| !exclude.contains(&m.id));
        Ok(candidates)
    }

    /// Ask the judge which stored memories matter for `focus`.
    /// Returned memories are flagged as recalled.
    pub async fn recall(
        &self,
        mode: ReflectionMode,
        focus: &str,
        exclude: &HashSet<MemoryId>,
    ) -> Result<Vec<Memory>> {
        let candidates = self.candidates(mode, exclude).await?;
        if candidates.is_empty() {
            debug!("No recall candidates ({} mode)", mode);
            return Ok(Vec::new());
        }

        let selected = match self.judge.select(focus, &candidates).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Relevance judge failed: {}", e);
                return Ok(Vec::new());
            }
        };

        let by_id: HashMap<&MemoryId, &Memory> = candidates.iter().map(|m| (&m.id, m)).collect();
        let mut seen = HashSet::new();
        let recalled: Vec<Memory> = selected
            .iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| by_id.get(id))
            .map(|m| {
                let mut m = (*m).clone();
                m.metadata.recalled = Some(true);
                m
            })
            .collect();

        debug!(
            "Judge picked {} of {} candidates ({} usable)",
            selected.len(),
            candidates.len(),
            recalled.len()
        );
        Ok(recalled)
    }

    /// Recall against the latest user input and merge the result into `working`.
    /// Returns the ids added.
    pub async fn recall_into(
        &self,
        mode: ReflectionMode,
        working: &WorkingMemory,
    ) -> Result<Vec<MemoryId>> {
        let focus = match working.last_user_input().await {
            Some(text) => text,
            None if mode == ReflectionMode::Quick => {
                debug!("Quick recall skipped: no user input in working memory");
                return Ok(Vec::new());
            }
            None => GENERIC_CUE.to_string(),
        };

        let exclude: HashSet<MemoryId> = working.ids().await.into_iter().collect();
        let recalled = self.recall(mode, &focus, &exclude).await?;
        if recalled.is_empty() {
            return Ok(Vec::new());
        }

        let added = working.merge_recalled(recalled).await;
        info!("Recalled {} memories ({} mode)", added.len(), mode);
        Ok(added)
    }
}

// ============================================================
// Recall tool
// ============================================================

pub const RECALL_TOOL: &str = "recall";

const RECALL_UNIT: &str = "RecallTool";
const TOOL_USE_ROLE: &str = "tool_use";

/// Lets the reasoner pull memories mid-cycle, optionally with its own cue.
pub struct RecallTool {
    judge: Arc<dyn RelevanceJudge>,
    window: usize,
}

impl RecallTool {
    pub fn new(judge: Arc<dyn RelevanceJudge>, window: usize) -> Self {
        Self { judge, window }
    }
}

/// Cue text: explicit filter, else the last user input, plus the size hint.
fn recall_cue(filter: Option<&str>, last_input: Option<String>, number: Option<String>) -> String {
    let task = match (filter, last_input) {
        (Some(filter), _) => format!("The system provided this recall filter: {}", filter),
        (None, Some(input)) => format!("The user asked: {}", input),
        (None, None) => "Recall anything relevant".to_string(),
    };
    let hint = number.unwrap_or_else(|| "any number of".to_string());
    format!("{}\n(the requester mentioned a preference for {} recalled memories)", task, hint)
}

#[async_trait::async_trait]
impl Tool for RecallTool {
    fn name(&self) -> &str {
        RECALL_TOOL
    }

    fn description(&self) -> &str {
        "Recall relevant memories from long-term storage into working memory, \
         based on a filter or on the last user message."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filter": {
                    "type": "string",
                    "description": "What to recall. Defaults to the last user message"
                },
                "number": {
                    "type": ["string", "integer"],
                    "description": "Preferred number of memories (a hint only)"
                }
            }
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ToolResult {
        let filter = args
            .get("filter")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let number = match args.get("number") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let cue = recall_cue(filter, ctx.working.last_user_input().await, number);

        let exclude: HashSet<MemoryId> = ctx.working.ids().await.into_iter().collect();
        let gate = RecallGate::new(ctx.store.clone(), self.judge.clone()).with_window(self.window);
        let recalled = match gate.recall(ctx.mode, &cue, &exclude).await {
            Ok(recalled) => recalled,
            Err(e) => return ToolResult::error(format!("Recall failed: {}", e)),
        };
        let added = if recalled.is_empty() {
            Vec::new()
        } else {
            ctx.working.merge_recalled(recalled).await
        };

        let summary = format!("RecallTool result: found and added ({}) relevant memories.", added.len());
        ctx.working
            .add_memory(
                MemoryKind::Internal,
                summary.clone(),
                MetadataPatch::new()
                    .role(TOOL_USE_ROLE)
                    .unit_name(RECALL_UNIT)
                    .scope(TemporalScope::ShortTerm)
                    .reasoning_mode(ctx.mode.as_str()),
                [],
            )
            .await;
        info!("Recall tool added {} memories ({} mode)", added.len(), ctx.mode);

        ToolResult::Json(json!({ "recalled": added, "summary": summary }))
    }
}
