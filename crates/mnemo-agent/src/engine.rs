//! Reflection engine: schedules and runs single-flight reflection cycles
//!
//! Requests come from three places: user input landing in working memory
//! (quick), the deep timer (deep) and explicit calls (`request`, `migrate`).
//! Two loops drive the engine once started:
//!
//! - timer loop: fires due deep requests and republishes the next-deep status
//! - drain loop: when the cycle lock is free, pops the queue head and runs it
//!
//! A cycle is recall → up to `max_steps` reason/act steps → forget. At most
//! one cycle runs at a time; the lock guard travels with the cycle task.

use crate::collaborators::{
    Collaborators, CycleOptions, Reasoner, ReasonerInput, RelevanceJudge,
};
use crate::config::{EngineConfig, EngineSettings};
use crate::forget::ForgetGate;
use crate::queue::{ReflectionQueue, ReflectionRequest};
use crate::recall::{RecallGate, RecallTool};
use chrono::{DateTime, Local};
use mnemo_core::{
    Error, MemoryId, MemoryKind, MetadataPatch, PriorityLevel, ReflectionMode, Result,
};
use futures::FutureExt;
use mnemo_memory::{MemoryStore, StoreTarget, WorkingMemory};
use mnemo_tools::{
    create_default_registry, panic_message, ToolContext, ToolDispatcher, ToolOutcome, ToolRegistry,
};
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, Weak};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const NO_DEEP_STATUS: &str = "No scheduled deep reflections";
pub const STATUS_ROLE: &str = "system_status";
pub const STATUS_UNIT: &str = "Scheduler";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "mode", rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Scheduled(ReflectionMode),
    Running(ReflectionMode),
    Stopped,
}

/// Summary of one reflection cycle.
#[derive(Clone, Debug, Serialize)]
pub struct CycleReport {
    pub mode: ReflectionMode,
    pub correlation_id: String,
    pub recalled: Vec<MemoryId>,
    pub tool_runs: Vec<ToolOutcome>,
    pub forgotten: Vec<MemoryId>,
    /// Reasoner consultations.
    pub steps: usize,
    /// A halting tool ended the reasoning loop.
    pub stopped_early: bool,
}

struct DeepTimer {
    due: Instant,
    wall: DateTime<Local>,
}

#[derive(Default)]
struct Lifecycle {
    cancel: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

struct Inner {
    settings: EngineSettings,
    working: Arc<WorkingMemory>,
    store: StoreTarget,
    dispatcher: ToolDispatcher,
    reasoner: Arc<dyn Reasoner>,
    recall: RecallGate,
    forget: ForgetGate,
    queue: StdMutex<ReflectionQueue>,
    cycle_lock: Arc<Mutex<()>>,
    state_tx: watch::Sender<EngineState>,
    status_tx: watch::Sender<String>,
    deep_timer: StdMutex<Option<DeepTimer>>,
    status_memory: Mutex<Option<MemoryId>>,
    lifecycle: StdMutex<Lifecycle>,
}

fn lock<T>(m: &StdMutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Await a collaborator-bound step; a panic becomes `Error::Collaborator`.
async fn guarded<T>(who: &str, step: impl Future<Output = Result<T>>) -> Result<T> {
    match AssertUnwindSafe(step).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(Error::collaborator(
            who,
            format!("panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

/// The builtin tools plus the recall tool bound to `relevance`.
pub fn engine_registry(
    export_dir: impl AsRef<Path>,
    relevance: Arc<dyn RelevanceJudge>,
    recall_window: usize,
) -> ToolRegistry {
    let mut registry = create_default_registry(export_dir);
    registry.register(RecallTool::new(relevance, recall_window));
    registry
}

fn correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[derive(Clone)]
pub struct ReflectionEngine {
    inner: Arc<Inner>,
}

impl ReflectionEngine {
    pub fn new(
        settings: EngineSettings,
        working: Arc<WorkingMemory>,
        store: StoreTarget,
        dispatcher: ToolDispatcher,
        collaborators: Collaborators,
    ) -> Self {
        let recall = RecallGate::new(store.clone(), collaborators.relevance)
            .with_window(settings.recall_window);
        let forget = ForgetGate::new(store.clone(), collaborators.usage);
        let (state_tx, _) = watch::channel(EngineState::Idle);
        let (status_tx, _) = watch::channel(NO_DEEP_STATUS.to_string());
        let queue = ReflectionQueue::new(settings.queue_capacity);

        Self {
            inner: Arc::new(Inner {
                settings,
                working,
                store,
                dispatcher,
                reasoner: collaborators.reasoner,
                recall,
                forget,
                queue: StdMutex::new(queue),
                cycle_lock: Arc::new(Mutex::new(())),
                state_tx,
                status_tx,
                deep_timer: StdMutex::new(None),
                status_memory: Mutex::new(None),
                lifecycle: StdMutex::new(Lifecycle::default()),
            }),
        }
    }

    /// Wire up working memory, store target and the builtin tools from config.
    /// Queued delivery needs a Tokio runtime.
    pub fn from_config(
        config: &EngineConfig,
        store: &MemoryStore,
        collaborators: Collaborators,
    ) -> Self {
        let working = Arc::new(WorkingMemory::new(
            config.memory.working_capacity,
            config.memory.delivery,
        ));
        let dispatcher = ToolDispatcher::new(engine_registry(
            &config.store.export_dir,
            collaborators.relevance.clone(),
            config.memory.recall_window,
        ));
        Self::new(
            config.settings(),
            working,
            store.target(&config.store.path),
            dispatcher,
            collaborators,
        )
    }

    pub fn working(&self) -> &Arc<WorkingMemory> {
        &self.inner.working
    }

    pub fn store(&self) -> &StoreTarget {
        &self.inner.store
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.inner.dispatcher
    }

    pub fn state(&self) -> EngineState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.inner.state_tx.subscribe()
    }

    pub fn next_deep_status(&self) -> String {
        self.inner.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<String> {
        self.inner.status_tx.subscribe()
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.lifecycle).cancel.is_some()
    }

    /// Arm the deep timer, subscribe to working memory and spawn the driver loops.
    pub fn start(&self) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Scheduler(format!("no Tokio runtime: {}", e)))?;

        let mut lifecycle = lock(&self.inner.lifecycle);
        if self.state() == EngineState::Stopped {
            return Err(Error::Scheduler("engine has been stopped".to_string()));
        }
        if lifecycle.cancel.is_some() {
            return Err(Error::Scheduler("engine is already running".to_string()));
        }

        self.inner.arm_deep_timer();

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.working.register_observer(move |memory| {
            if !memory.is_user_input() {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                debug!("User input {} arrived; requesting quick reflection", memory.id);
                inner.enqueue(ReflectionRequest::quick());
            }
        });

        let cancel = CancellationToken::new();
        lifecycle.tasks.push(handle.spawn(timer_loop(self.inner.clone(), cancel.clone())));
        lifecycle.tasks.push(handle.spawn(drain_loop(self.inner.clone(), cancel.clone())));
        lifecycle.cancel = Some(cancel);

        info!(
            "Reflection engine started (poll {:?}, deep interval {:?})",
            self.inner.settings.poll_interval, self.inner.settings.deep_interval
        );
        Ok(())
    }

    /// Stop the driver loops. Idempotent; in-flight cycles finish on their own.
    pub fn stop(&self) {
        let mut lifecycle = lock(&self.inner.lifecycle);
        if let Some(cancel) = lifecycle.cancel.take() {
            cancel.cancel();
        }
        for task in lifecycle.tasks.drain(..) {
            task.abort();
        }
        drop(lifecycle);

        self.inner.working.clear_observers();
        *lock(&self.inner.deep_timer) = None;
        self.inner.status_tx.send_if_modified(|s| {
            if s == NO_DEEP_STATUS {
                return false;
            }
            *s = NO_DEEP_STATUS.to_string();
            true
        });

        let was_stopped = self.inner.state_tx.send_replace(EngineState::Stopped) == EngineState::Stopped;
        if !was_stopped {
            info!("Reflection engine stopped");
        }
    }

    /// Queue a reflection with the mode's default priority.
    pub fn request(&self, mode: ReflectionMode, options: CycleOptions) -> bool {
        self.inner.enqueue(ReflectionRequest::new(mode, options))
    }

    /// Queue a request with an explicit priority.
    pub fn enqueue(&self, request: ReflectionRequest) -> bool {
        self.inner.enqueue(request)
    }

    pub fn migrate(&self) -> bool {
        self.inner.enqueue(ReflectionRequest::migration())
    }

    /// Empty working memory.
    pub async fn purge(&self) {
        self.inner.working.clear().await;
        *self.inner.status_memory.lock().await = None;
        info!("Working memory purged");
    }

    /// Run one cycle now, waiting for any in-flight cycle to finish first.
    pub async fn execute(&self, mode: ReflectionMode, options: CycleOptions) -> CycleReport {
        let _guard = self.inner.cycle_lock.lock().await;
        self.inner.run_cycle(mode, options).await
    }
}

impl Inner {
    fn enqueue(&self, request: ReflectionRequest) -> bool {
        if *self.state_tx.borrow() == EngineState::Stopped {
            warn!("Engine stopped; ignoring {} request", request.mode);
            return false;
        }
        let mode = request.mode;
        let queued = lock(&self.queue).enqueue(request);
        if queued {
            self.state_tx.send_if_modified(|s| {
                if *s != EngineState::Idle {
                    return false;
                }
                *s = EngineState::Scheduled(mode);
                true
            });
        }
        queued
    }

    /// Move to `next` unless stopped.
    fn set_state(&self, next: EngineState) {
        self.state_tx.send_if_modified(|s| {
            if *s == EngineState::Stopped || *s == next {
                return false;
            }
            *s = next;
            true
        });
    }

    fn settle_state(&self) {
        let next = match lock(&self.queue).peek() {
            Some(head) => EngineState::Scheduled(head.mode),
            None => EngineState::Idle,
        };
        self.set_state(next);
    }

    fn arm_deep_timer(&self) {
        let mut timer = lock(&self.deep_timer);
        *timer = self.settings.deep_interval.map(|interval| DeepTimer {
            due: Instant::now() + interval,
            wall: Local::now() + chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::zero()),
        });
    }

    fn fire_due_deep(&self) {
        let due = matches!(&*lock(&self.deep_timer), Some(t) if Instant::now() >= t.due);
        if due {
            info!("Deep reflection due");
            self.enqueue(ReflectionRequest::deep());
            self.arm_deep_timer();
        }
    }

    fn deep_status(&self) -> String {
        match &*lock(&self.deep_timer) {
            Some(t) => format!("Next deep reflection: {}", t.wall.format("%Y-%m-%d %H:%M:%S")),
            None => NO_DEEP_STATUS.to_string(),
        }
    }

    /// Republish the next-deep status and mirror it into working memory on change.
    async fn publish_status(&self) {
        let status = self.deep_status();
        let changed = self.status_tx.send_if_modified(|s| {
            if *s == status {
                return false;
            }
            *s = status.clone();
            true
        });

        let mut entry = self.status_memory.lock().await;
        if !changed {
            if let Some(id) = entry.as_ref() {
                if self.working.contains(id).await {
                    return;
                }
            }
        }

        if let Some(id) = entry.as_ref() {
            let updated = self
                .working
                .replace(id, |m| m.content = status.clone())
                .await;
            if updated.is_some() {
                debug!("Scheduler status updated: {}", status);
                return;
            }
        }

        let memory = self
            .working
            .add_memory(
                MemoryKind::Internal,
                status.clone(),
                MetadataPatch::new()
                    .role(STATUS_ROLE)
                    .unit_name(STATUS_UNIT)
                    .priority(PriorityLevel::Medium),
                [],
            )
            .await;
        debug!("Scheduler status recorded as {}: {}", memory.id, status);
        *entry = Some(memory.id);
    }

    /// Start the queue head if no cycle is in flight. Returns whether a cycle started.
    fn drain_once(self: &Arc<Self>) -> bool {
        if lock(&self.queue).is_empty() {
            return false;
        }
        let guard = match self.cycle_lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Cycle in flight; {} request(s) waiting", lock(&self.queue).len());
                return false;
            }
        };
        let Some(request) = lock(&self.queue).pop() else {
            return false;
        };

        let inner = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            inner.run_cycle(request.mode, request.options).await;
        });
        true
    }

    async fn run_cycle(&self, mode: ReflectionMode, options: CycleOptions) -> CycleReport {
        let cid = correlation_id();
        self.set_state(EngineState::Running(mode));
        info!("[{}] Starting {} reflection", cid, mode);

        let mut report = CycleReport {
            mode,
            correlation_id: cid.clone(),
            recalled: Vec::new(),
            tool_runs: Vec::new(),
            forgotten: Vec::new(),
            steps: 0,
            stopped_early: false,
        };

        if !options.skip_recall {
            match guarded("relevance judge", self.recall.recall_into(mode, &self.working)).await {
                Ok(ids) => report.recalled = ids,
                Err(e) => error!("[{}] Recall failed: {}", cid, e),
            }
        }

        let ctx = ToolContext::new(self.working.clone(), self.store.clone(), mode);
        let tools = self.dispatcher.definitions(mode);

        while report.steps < self.settings.max_steps && !report.stopped_early {
            report.steps += 1;
            let input = ReasonerInput {
                working_memory: self.working.snapshot().await,
                mode,
                options: options.clone(),
                tools: tools.clone(),
            };

            let actions = match guarded("reasoner", self.reasoner.decide(&input)).await {
                Ok(Some(actions)) if !actions.is_empty() => actions,
                Ok(_) => {
                    debug!("[{}] Step {}: no actions; ending reasoning", cid, report.steps);
                    break;
                }
                Err(e) => {
                    error!("[{}] Reasoner failed at step {}: {}", cid, report.steps, e);
                    break;
                }
            };

            for action in &actions {
                let outcome = self.dispatcher.dispatch(&ctx, action).await;
                debug!(
                    "[{}] {} -> {}",
                    cid,
                    outcome.name,
                    if outcome.success { "ok" } else { "failed" }
                );
                let halt = outcome.halt;
                report.tool_runs.push(outcome);
                if halt {
                    report.stopped_early = true;
                    break;
                }
            }
        }

        if !options.skip_forget {
            match guarded("usage judge", self.forget.forget(mode, &self.working)).await {
                Ok(ids) => report.forgotten = ids,
                Err(e) => error!("[{}] Forget failed: {}", cid, e),
            }
        }

        info!(
            "[{}] {} reflection finished: {} step(s), {} tool run(s), recalled {}, forgot {}",
            cid,
            mode,
            report.steps,
            report.tool_runs.len(),
            report.recalled.len(),
            report.forgotten.len()
        );
        self.settle_state();
        report
    }
}

async fn timer_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(inner.settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        inner.fire_due_deep();
        inner.publish_status().await;
    }
    debug!("Timer loop exiting");
}

async fn drain_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(inner.settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        inner.drain_once();
    }
    debug!("Drain loop exiting");
}
