//! Forget gate: drop recalled memories from working memory once they are spent
//!
//! Only entries flagged `recalled` are ever candidates. Eviction never
//! touches the store.

use crate::collaborators::UsageJudge;
use mnemo_core::{MemoryId, MetadataFilter, Query, ReflectionMode, Result};
use mnemo_memory::{StoreTarget, WorkingMemory};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct ForgetGate {
    store: StoreTarget,
    judge: Arc<dyn UsageJudge>,
}

impl ForgetGate {
    pub fn new(store: StoreTarget, judge: Arc<dyn UsageJudge>) -> Self {
        Self { store, judge }
    }

    pub async fn forget(
        &self,
        mode: ReflectionMode,
        working: &WorkingMemory,
    ) -> Result<Vec<MemoryId>> {
        let eligible = working
            .query(&Query::new().metadata(MetadataFilter::new().eq("recalled", true)))
            .await?;
        if eligible.is_empty() {
            return Ok(Vec::new());
        }

        let targets: Vec<MemoryId> = match mode {
            ReflectionMode::Quick => {
                let Some(text) = working.last_agent_output().await else {
                    debug!("Quick forget skipped: no agent output in working memory");
                    return Ok(Vec::new());
                };
                let used = match self.judge.select_used(&text, &eligible).await {
                    Ok(ids) => ids,
                    Err(e) => {
                        error!("Usage judge failed: {}", e);
                        return Ok(Vec::new());
                    }
                };
                let eligible_ids: HashSet<&MemoryId> = eligible.iter().map(|m| &m.id).collect();
                used.into_iter().filter(|id| eligible_ids.contains(id)).collect()
            }
            ReflectionMode::Deep | ReflectionMode::Migration => {
                let existing = self.store.existing_ids().await;
                eligible
                    .into_iter()
                    .map(|m| m.id)
                    .filter(|id| !existing.contains(id))
                    .collect()
            }
        };

        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let evicted = working.evict(&targets).await;
        info!("Forgot {} recalled memories ({} mode)", evicted.len(), mode);
        Ok(evicted)
    }
}
