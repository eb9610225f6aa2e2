//! Working memory: a bounded, ordered buffer with append notifications
//!
//! Appends evict from the front once capacity is exceeded. Observers hear
//! about every append (never about removals, evictions, or in-place edits).
//! Notification happens while the buffer lock is held, so observers see
//! appends in buffer order even with concurrent producers.

use mnemo_core::{
    InteractionRole, Memory, MemoryId, MemoryKind, MetadataFilter, MetadataPatch, PriorityLevel,
    Query, Result, TemporalScope, DEFAULT_REASONING_MODE, MESSAGE_ROLE,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

pub const DEFAULT_CAPACITY: usize = 50;

/// Append callback. Runs under the buffer lock; must not block.
pub type Observer = Arc<dyn Fn(&Memory) + Send + Sync>;

type ObserverList = Arc<StdRwLock<Vec<Observer>>>;

/// How append notifications reach observers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// Observers run inline before `append` returns.
    Synchronous,
    /// Observers run on a consumer task fed by a FIFO channel.
    #[default]
    Queued,
}

trait Notifier: Send + Sync {
    fn notify(&self, memory: &Memory);
}

fn fan_out(observers: &ObserverList, memory: &Memory) {
    let list: Vec<Observer> = observers
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    for observer in list {
        if catch_unwind(AssertUnwindSafe(|| observer(memory))).is_err() {
            error!("Observer panicked on memory {}", memory.id);
        }
    }
}

struct PushSynchronous {
    observers: ObserverList,
}

impl Notifier for PushSynchronous {
    fn notify(&self, memory: &Memory) {
        fan_out(&self.observers, memory);
    }
}

struct PushQueued {
    tx: mpsc::UnboundedSender<Memory>,
}

impl PushQueued {
    /// Spawns the consumer task. Requires a Tokio runtime.
    fn spawn(observers: ObserverList) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Memory>();
        tokio::spawn(async move {
            while let Some(memory) = rx.recv().await {
                fan_out(&observers, &memory);
            }
            debug!("Working memory notification consumer exiting");
        });
        Self { tx }
    }
}

impl Notifier for PushQueued {
    fn notify(&self, memory: &Memory) {
        if self.tx.send(memory.clone()).is_err() {
            warn!("Notification consumer gone; dropping notification for {}", memory.id);
        }
    }
}

pub struct WorkingMemory {
    id: String,
    capacity: usize,
    delivery: Delivery,
    memories: RwLock<VecDeque<Memory>>,
    observers: ObserverList,
    notifier: Box<dyn Notifier>,
}

impl std::fmt::Debug for WorkingMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingMemory")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("delivery", &self.delivery)
            .finish()
    }
}

impl Default for WorkingMemory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, Delivery::Synchronous)
    }
}

impl WorkingMemory {
    /// `Delivery::Queued` spawns a task and must be called inside a Tokio runtime.
    pub fn new(capacity: usize, delivery: Delivery) -> Self {
        let capacity = capacity.max(1);
        let observers: ObserverList = Arc::new(StdRwLock::new(Vec::new()));
        let notifier: Box<dyn Notifier> = match delivery {
            Delivery::Synchronous => Box::new(PushSynchronous {
                observers: observers.clone(),
            }),
            Delivery::Queued => Box::new(PushQueued::spawn(observers.clone())),
        };
        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        info!(
            "Created WorkingMemory {} (capacity {}, {:?} delivery)",
            id, capacity, delivery
        );
        Self {
            id,
            capacity,
            delivery,
            memories: RwLock::new(VecDeque::with_capacity(capacity)),
            observers,
            notifier,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    /// Append an existing memory, evict from the front, then notify.
    pub async fn append(&self, memory: Memory) -> Memory {
        let mut memories = self.memories.write().await;
        memories.push_back(memory.clone());
        while memories.len() > self.capacity {
            if let Some(evicted) = memories.pop_front() {
                debug!("WorkingMemory {} evicted {} (capacity)", self.id, evicted.id);
            }
        }
        debug!(
            "Added memory {} to WorkingMemory {} ({}/{})",
            memory.id,
            self.id,
            memories.len(),
            self.capacity
        );
        self.notifier.notify(&memory);
        memory
    }

    pub async fn add_memory(
        &self,
        kind: MemoryKind,
        content: impl Into<String>,
        metadata: MetadataPatch,
        parent_ids: impl IntoIterator<Item = MemoryId>,
    ) -> Memory {
        let memory = Memory::new(kind, content, metadata).with_parents(parent_ids);
        self.append(memory).await
    }

    /// Append a user or agent message with interaction stamping.
    /// Caller metadata wins except for `role`, which is always "message".
    pub async fn add_interaction(
        &self,
        role: InteractionRole,
        content: impl Into<String>,
        metadata: MetadataPatch,
    ) -> Memory {
        let mut patch = metadata;
        patch.role = Some(MESSAGE_ROLE.to_string());
        patch
            .unit_name
            .get_or_insert_with(|| role.unit_name().to_string());
        patch.temporal_scope.get_or_insert(TemporalScope::ShortTerm);
        patch.priority_level.get_or_insert(PriorityLevel::Core);
        patch
            .reasoning_mode
            .get_or_insert_with(|| DEFAULT_REASONING_MODE.to_string());
        self.add_memory(MemoryKind::External, content, patch, [])
            .await
    }

    /// Remove one memory. Returns `false` if absent.
    pub async fn remove(&self, id: &MemoryId) -> bool {
        let mut memories = self.memories.write().await;
        match memories.iter().position(|m| &m.id == id) {
            Some(pos) => {
                memories.remove(pos);
                info!("Removed memory {} from WorkingMemory {}", id, self.id);
                true
            }
            None => {
                debug!("Memory {} not in WorkingMemory {}", id, self.id);
                false
            }
        }
    }

    /// Remove every listed id that is present. Returns the ids actually removed.
    pub async fn evict(&self, ids: &[MemoryId]) -> Vec<MemoryId> {
        let targets: HashSet<&MemoryId> = ids.iter().collect();
        let mut memories = self.memories.write().await;
        let mut removed = Vec::new();
        memories.retain(|m| {
            if targets.contains(&m.id) {
                removed.push(m.id.clone());
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            info!("Evicted {} memories from WorkingMemory {}", removed.len(), self.id);
        }
        removed
    }

    /// Edit a memory in place. No notification.
    pub async fn replace(&self, id: &MemoryId, f: impl FnOnce(&mut Memory)) -> Option<Memory> {
        let mut memories = self.memories.write().await;
        let memory = memories.iter_mut().find(|m| &m.id == id)?;
        f(memory);
        Some(memory.clone())
    }

    /// Bulk-insert recalled memories ahead of native ones.
    ///
    /// Resulting order: previously recalled, newly recalled, native. Natives are
    /// trimmed oldest-first to fit capacity. Ids already present are skipped.
    /// No notification. Returns the ids that were added.
    pub async fn merge_recalled(&self, recalled: Vec<Memory>) -> Vec<MemoryId> {
        let mut memories = self.memories.write().await;
        let mut seen: HashSet<MemoryId> = memories.iter().map(|m| m.id.clone()).collect();

        let incoming: Vec<Memory> = recalled
            .into_iter()
            .filter(|m| seen.insert(m.id.clone()))
            .map(|mut m| {
                m.metadata.recalled = Some(true);
                m
            })
            .collect();
        if incoming.is_empty() {
            return Vec::new();
        }

        let (mut front, mut native): (Vec<Memory>, Vec<Memory>) =
            memories.drain(..).partition(|m| m.is_recalled());
        front.extend(incoming.iter().cloned());

        if front.len() > self.capacity {
            let excess = front.len() - self.capacity;
            front.drain(..excess);
        }
        let room = self.capacity - front.len();
        let excess = native.len().saturating_sub(room);
        native.drain(..excess);

        memories.extend(front);
        memories.extend(native);

        let added: Vec<MemoryId> = incoming
            .into_iter()
            .map(|m| m.id)
            .filter(|id| memories.iter().any(|m| &m.id == id))
            .collect();
        info!(
            "Merged {} recalled memories into WorkingMemory {}",
            added.len(),
            self.id
        );
        added
    }

    pub async fn query(&self, query: &Query) -> Result<Vec<Memory>> {
        let memories = self.memories.read().await;
        query.apply(memories.iter())
    }

    pub async fn get(&self, id: &MemoryId) -> Option<Memory> {
        self.memories.read().await.iter().find(|m| &m.id == id).cloned()
    }

    pub async fn contains(&self, id: &MemoryId) -> bool {
        self.memories.read().await.iter().any(|m| &m.id == id)
    }

    /// Buffer contents in order.
    pub async fn snapshot(&self) -> Vec<Memory> {
        self.memories.read().await.iter().cloned().collect()
    }

    pub async fn ids(&self) -> Vec<MemoryId> {
        self.memories.read().await.iter().map(|m| m.id.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.memories.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.memories.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.memories.write().await.clear();
        info!("Cleared WorkingMemory {}", self.id);
    }

    async fn last_message_from(&self, unit: &str) -> Option<String> {
        let query = Query::new()
            .metadata(
                MetadataFilter::new()
                    .eq("role", MESSAGE_ROLE)
                    .eq("unit_name", unit),
            )
            .last(1);
        self.query(&query)
            .await
            .ok()
            .and_then(|mut v| v.pop())
            .map(|m| m.content)
    }

    pub async fn last_user_input(&self) -> Option<String> {
        self.last_message_from(InteractionRole::User.unit_name())
            .await
    }

    pub async fn last_agent_output(&self) -> Option<String> {
        self.last_message_from(InteractionRole::Agent.unit_name())
            .await
    }

    pub fn register_observer(&self, observer: impl Fn(&Memory) + Send + Sync + 'static) {
        let mut list = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        list.push(Arc::new(observer));
        debug!("WorkingMemory {} now has {} observers", self.id, list.len());
    }

    pub fn clear_observers(&self) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
