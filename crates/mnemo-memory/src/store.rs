//! Persistent memory store with whole-snapshot JSON persistence
//!
//! One `MemoryStore` owns the per-target locks; `StoreTarget` addresses one
//! snapshot file. Every mutation runs load → mutate → save under the target's
//! mutex. Saves go through a temp file and a rename, so lock-free readers never
//! see a torn snapshot.

use dashmap::DashMap;
use mnemo_core::{
    now_timestamp, Memory, MemoryId, MemoryKind, Metadata, MetadataPatch, Query, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Snapshot layout version. Any other version loads as an empty store.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Relation label carried by every parent → child edge.
pub const MEMORY_FLOW: &str = "memory_flow";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    schema_version: u32,
    #[serde(default)]
    memories: Vec<Memory>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            schema_version: SNAPSHOT_VERSION,
            memories: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: MemoryId,
    pub to: MemoryId,
    pub relation: &'static str,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_memories: usize,
    pub total_connections: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub by_role: BTreeMap<String, usize>,
}

/// Registry of snapshot targets and their locks.
#[derive(Clone, Default)]
pub struct MemoryStore {
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for the snapshot at `path`. Handles for the same path share a lock.
    pub fn target(&self, path: impl AsRef<Path>) -> StoreTarget {
        let path = path.as_ref().to_path_buf();
        let lock = self
            .locks
            .entry(path.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        StoreTarget { path, lock }
    }

    pub fn targets(&self) -> Vec<PathBuf> {
        self.locks.iter().map(|e| e.key().clone()).collect()
    }
}

/// One snapshot file, addressed explicitly.
#[derive(Clone)]
pub struct StoreTarget {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for StoreTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreTarget").field("path", &self.path).finish()
    }
}

impl StoreTarget {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot. Missing or unreadable snapshots are an empty store.
    async fn load(&self) -> Snapshot {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No snapshot at {}; starting empty", self.path.display());
                return Snapshot::empty();
            }
            Err(e) => {
                warn!("Failed to read snapshot {}: {}; starting empty", self.path.display(), e);
                return Snapshot::empty();
            }
        };

        match serde_json::from_slice::<Snapshot>(&raw) {
            Ok(snapshot) if snapshot.schema_version == SNAPSHOT_VERSION => snapshot,
            Ok(snapshot) => {
                warn!(
                    "Snapshot {} has schema version {} (expected {}); starting empty",
                    self.path.display(),
                    snapshot.schema_version,
                    SNAPSHOT_VERSION
                );
                Snapshot::empty()
            }
            Err(e) => {
                warn!("Failed to parse snapshot {}: {}; starting empty", self.path.display(), e);
                Snapshot::empty()
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_vec(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(
            "Saved snapshot {} ({} memories)",
            self.path.display(),
            snapshot.memories.len()
        );
        Ok(())
    }

    /// Serialized load → mutate → save. `f` reports whether anything changed.
    async fn mutate<T>(&self, f: impl FnOnce(&mut Vec<Memory>) -> (T, bool)) -> Result<T> {
        let _guard = self.lock.lock().await;
        let mut snapshot = self.load().await;
        let (out, dirty) = f(&mut snapshot.memories);
        if dirty {
            for memory in snapshot.memories.iter_mut() {
                memory.metadata.normalize();
            }
            snapshot.schema_version = SNAPSHOT_VERSION;
            self.save(&snapshot).await?;
        }
        Ok(out)
    }

    pub async fn add(
        &self,
        kind: MemoryKind,
        content: impl Into<String>,
        metadata: MetadataPatch,
        parent_ids: impl IntoIterator<Item = MemoryId>,
    ) -> Result<MemoryId> {
        self.add_with_timestamp(kind, content, metadata, parent_ids, now_timestamp())
            .await
    }

    pub async fn add_with_timestamp(
        &self,
        kind: MemoryKind,
        content: impl Into<String>,
        metadata: MetadataPatch,
        parent_ids: impl IntoIterator<Item = MemoryId>,
        timestamp: f64,
    ) -> Result<MemoryId> {
        let content = content.into();
        let parent_ids: BTreeSet<MemoryId> = parent_ids.into_iter().collect();
        let path = self.path.clone();

        self.mutate(move |memories| {
            let mut id = MemoryId::generate();
            while memories.iter().any(|m| m.id == id) {
                id = MemoryId::generate();
            }

            for parent in &parent_ids {
                if !memories.iter().any(|m| &m.id == parent) {
                    debug!("Edge {} → {} references a memory not in the store", parent, id);
                }
                debug!("Created edge from {} to {}", parent, id);
            }

            let memory = Memory {
                id: id.clone(),
                kind,
                content,
                metadata: Metadata::from_patch(metadata),
                timestamp,
                parent_ids,
            };
            info!(
                "Added memory {} to {}: kind={}, role={}, unit={}",
                id,
                path.display(),
                memory.kind,
                memory.metadata.role,
                memory.metadata.unit_name
            );
            memories.push(memory);
            (id, true)
        })
        .await
    }

    /// Persist an already-built memory under its own id.
    /// Returns `false` if the id is taken.
    pub async fn insert(&self, memory: Memory) -> Result<bool> {
        self.mutate(|memories| {
            if memories.iter().any(|m| m.id == memory.id) {
                warn!("Memory {} already exists in {}", memory.id, self.path.display());
                return (false, false);
            }
            info!(
                "Inserted memory {}: kind={}, role={}, unit={}",
                memory.id, memory.kind, memory.metadata.role, memory.metadata.unit_name
            );
            memories.push(memory);
            (true, true)
        })
        .await
    }

    /// Merge `patch` into the memory's metadata and optionally replace content.
    /// Returns `false` when the id is absent.
    pub async fn update(
        &self,
        id: &MemoryId,
        patch: MetadataPatch,
        content: Option<String>,
    ) -> Result<bool> {
        self.mutate(|memories| match memories.iter_mut().find(|m| &m.id == id) {
            Some(memory) => {
                memory.metadata.merge(patch);
                if let Some(content) = content {
                    memory.content = content;
                }
                info!("Updated memory {}", id);
                (true, true)
            }
            None => {
                warn!("Attempted to update non-existent memory: {}", id);
                (false, false)
            }
        })
        .await
    }

    /// Delete a memory and every edge touching it. Returns `false` when absent.
    pub async fn remove(&self, id: &MemoryId) -> Result<bool> {
        self.mutate(|memories| {
            let before = memories.len();
            memories.retain(|m| &m.id != id);
            if memories.len() == before {
                warn!("Attempted to remove non-existent memory: {}", id);
                return (false, false);
            }
            for memory in memories.iter_mut() {
                memory.parent_ids.remove(id);
            }
            info!("Removed memory {}", id);
            (true, true)
        })
        .await
    }

    pub async fn get(&self, id: &MemoryId) -> Option<Memory> {
        self.load()
            .await
            .memories
            .into_iter()
            .find(|m| &m.id == id)
    }

    pub async fn all(&self) -> Vec<Memory> {
        self.load().await.memories
    }

    pub async fn len(&self) -> usize {
        self.load().await.memories.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn existing_ids(&self) -> HashSet<MemoryId> {
        self.load()
            .await
            .memories
            .into_iter()
            .map(|m| m.id)
            .collect()
    }

    pub async fn query(&self, query: &Query) -> Result<Vec<Memory>> {
        query.validate()?;
        let snapshot = self.load().await;
        let result = query.apply(&snapshot.memories)?;
        debug!(
            "Store query on {} matched {} of {} memories",
            self.path.display(),
            result.len(),
            snapshot.memories.len()
        );
        Ok(result)
    }

    /// Parent → child edges derived from `parent_ids`.
    pub async fn edges(&self) -> Vec<Edge> {
        self.load()
            .await
            .memories
            .into_iter()
            .flat_map(|m| {
                let to = m.id;
                m.parent_ids.into_iter().map(move |from| Edge {
                    from,
                    to: to.clone(),
                    relation: MEMORY_FLOW,
                })
            })
            .collect()
    }

    pub async fn stats(&self) -> StoreStats {
        let snapshot = self.load().await;
        let mut stats = StoreStats {
            total_memories: snapshot.memories.len(),
            ..Default::default()
        };
        for memory in &snapshot.memories {
            stats.total_connections += memory.parent_ids.len();
            *stats
                .by_kind
                .entry(memory.kind.as_str().to_string())
                .or_insert(0) += 1;
            *stats
                .by_role
                .entry(memory.metadata.role.clone())
                .or_insert(0) += 1;
        }
        stats
    }
}
