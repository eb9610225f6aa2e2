//! Tests for the reflection engine: single-flight, priority order, lifecycle, tool loop, status

use mnemo_agent::*;
use mnemo_core::*;
use mnemo_memory::{Delivery, MemoryStore, WorkingMemory};
use mnemo_tools::{create_default_registry, ToolDispatcher};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Records every call; optionally blocks the first one until released.
#[derive(Default)]
struct ScriptedReasoner {
    modes: Mutex<Vec<ReflectionMode>>,
    tool_names: Mutex<Vec<Vec<String>>>,
    script: Mutex<Vec<Vec<Action>>>,
    repeat: Option<Vec<Action>>,
    fail: bool,
    block_first: bool,
    blocked: AtomicBool,
    entered: Notify,
    release: Notify,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedReasoner {
    fn calls(&self) -> usize {
        self.modes.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Reasoner for ScriptedReasoner {
    async fn decide(&self, input: &ReasonerInput) -> Result<Option<Vec<Action>>> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.modes.lock().unwrap().push(input.mode);
        self.tool_names
            .lock()
            .unwrap()
            .push(input.tools.iter().map(|t| t.name.clone()).collect());

        if self.block_first && !self.blocked.swap(true, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        } else {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(Error::collaborator("reasoner", "model unavailable"));
        }
        if let Some(actions) = &self.repeat {
            return Ok(Some(actions.clone()));
        }
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            Ok(None)
        } else {
            Ok(Some(script.remove(0)))
        }
    }
}

struct Nobody;

#[async_trait::async_trait]
impl RelevanceJudge for Nobody {
    async fn select(&self, _cue: &str, _candidates: &[Memory]) -> Result<Vec<MemoryId>> {
        Ok(Vec::new())
    }
}

#[async_trait::async_trait]
impl UsageJudge for Nobody {
    async fn select_used(&self, _text: &str, _candidates: &[Memory]) -> Result<Vec<MemoryId>> {
        Ok(Vec::new())
    }
}

fn settings() -> EngineSettings {
    EngineSettings {
        deep_interval: None,
        poll_interval: Duration::from_millis(10),
        queue_capacity: 3,
        max_steps: 5,
        recall_window: 1000,
    }
}

fn engine_with(
    dir: &tempfile::TempDir,
    settings: EngineSettings,
    reasoner: Arc<ScriptedReasoner>,
) -> ReflectionEngine {
    let store = MemoryStore::new().target(dir.path().join("memory_graph.json"));
    let working = Arc::new(WorkingMemory::new(50, Delivery::Synchronous));
    let dispatcher = ToolDispatcher::new(create_default_registry(dir.path().join("exports")));
    let nobody = Arc::new(Nobody);
    ReflectionEngine::new(
        settings,
        working,
        store,
        dispatcher,
        Collaborators::new(reasoner, nobody.clone(), nobody),
    )
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

// ===========================================================================
// Scheduling
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queued_requests_wait_for_lock_then_head_runs_next() {
    let dir = tempfile::tempdir().unwrap();
    let reasoner = Arc::new(ScriptedReasoner {
        block_first: true,
        ..Default::default()
    });
    let engine = engine_with(&dir, settings(), reasoner.clone());
    engine.start().unwrap();

    assert!(engine.migrate());
    reasoner.entered.notified().await;
    assert_eq!(engine.state(), EngineState::Running(ReflectionMode::Migration));

    // Deep (priority 2) first, then quick (priority 1), both while mid-flight
    assert!(engine.request(ReflectionMode::Deep, CycleOptions::default()));
    assert!(engine.request(ReflectionMode::Quick, CycleOptions::default()));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(reasoner.calls(), 1);
    assert_eq!(engine.queue_len(), 2);

    reasoner.release.notify_one();
    wait_until(|| reasoner.calls() == 3).await;
    wait_until(|| engine.state() == EngineState::Idle).await;

    assert_eq!(
        *reasoner.modes.lock().unwrap(),
        vec![ReflectionMode::Migration, ReflectionMode::Quick, ReflectionMode::Deep]
    );
    assert_eq!(reasoner.max_active.load(Ordering::SeqCst), 1);
    engine.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn direct_executions_never_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let reasoner = Arc::new(ScriptedReasoner::default());
    let engine = engine_with(&dir, settings(), reasoner.clone());
    engine.start().unwrap();

    let mut handles = Vec::new();
    for mode in [ReflectionMode::Quick, ReflectionMode::Deep, ReflectionMode::Quick, ReflectionMode::Deep] {
        let e = engine.clone();
        handles.push(tokio::spawn(async move { e.execute(mode, CycleOptions::default()).await }));
    }
    engine.request(ReflectionMode::Deep, CycleOptions::default());
    for h in handles {
        h.await.unwrap();
    }
    wait_until(|| reasoner.calls() == 5).await;

    assert_eq!(reasoner.max_active.load(Ordering::SeqCst), 1);
    engine.stop();
}

#[tokio::test]
async fn full_queue_drops_excess_requests() {
    let dir = tempfile::tempdir().unwrap();
    let reasoner = Arc::new(ScriptedReasoner::default());
    let engine = engine_with(&dir, settings(), reasoner);

    // Not started: nothing drains the queue
    assert!(engine.request(ReflectionMode::Deep, CycleOptions::default()));
    assert_eq!(engine.state(), EngineState::Scheduled(ReflectionMode::Deep));
    assert!(engine.request(ReflectionMode::Deep, CycleOptions::default()));
    assert!(engine.migrate());
    assert!(!engine.request(ReflectionMode::Quick, CycleOptions::default()));
    assert_eq!(engine.queue_len(), 3);
}

#[tokio::test]
async fn user_input_triggers_quick_reflection() {
    let dir = tempfile::tempdir().unwrap();
    let reasoner = Arc::new(ScriptedReasoner::default());
    let engine = engine_with(&dir, settings(), reasoner.clone());
    engine.start().unwrap();

    engine
        .working()
        .add_memory(MemoryKind::Internal, "not a trigger", MetadataPatch::new(), [])
        .await;
    engine
        .working()
        .add_interaction(InteractionRole::Agent, "nor this", MetadataPatch::new())
        .await;
    engine
        .working()
        .add_interaction(InteractionRole::User, "hello", MetadataPatch::new())
        .await;

    wait_until(|| reasoner.calls() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*reasoner.modes.lock().unwrap(), vec![ReflectionMode::Quick]);
    engine.stop();
}

#[tokio::test]
async fn deep_timer_fires_and_status_is_mirrored() {
    let dir = tempfile::tempdir().unwrap();
    let reasoner = Arc::new(ScriptedReasoner::default());
    let engine = engine_with(
        &dir,
        EngineSettings {
            deep_interval: Some(Duration::from_millis(40)),
            ..settings()
        },
        reasoner.clone(),
    );
    assert_eq!(engine.next_deep_status(), "No scheduled deep reflections");
    engine.start().unwrap();

    wait_until(|| reasoner.calls() >= 1).await;
    assert_eq!(reasoner.modes.lock().unwrap()[0], ReflectionMode::Deep);
    assert!(engine.next_deep_status().starts_with("Next deep reflection: "));

    let statuses = engine
        .working()
        .query(&Query::new().metadata(MetadataFilter::new().eq("role", "system_status")))
        .await
        .unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].metadata.unit_name, "Scheduler");
    assert_eq!(statuses[0].metadata.priority_level, Some(PriorityLevel::Medium));
    assert!(statuses[0].content.starts_with("Next deep reflection: "));

    engine.stop();
    assert_eq!(engine.next_deep_status(), "No scheduled deep reflections");
}

async fn status_entries(engine: &ReflectionEngine) -> Vec<Memory> {
    engine
        .working()
        .query(&Query::new().metadata(MetadataFilter::new().eq("role", "system_status")))
        .await
        .unwrap()
}

#[tokio::test]
async fn status_entry_comes_back_after_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let nobody = Arc::new(Nobody);
    let engine = ReflectionEngine::new(
        settings(),
        Arc::new(WorkingMemory::new(3, Delivery::Synchronous)),
        MemoryStore::new().target(dir.path().join("g.json")),
        ToolDispatcher::new(create_default_registry(dir.path())),
        Collaborators::new(Arc::new(ScriptedReasoner::default()), nobody.clone(), nobody),
    );

    engine.start().unwrap();
    for _ in 0..300 {
        if status_entries(&engine).await.len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status_entries(&engine).await.len(), 1);

    // Same status text, but FIFO eviction pushes the entry out
    for i in 0..3 {
        engine
            .working()
            .add_memory(MemoryKind::Internal, format!("filler {}", i), MetadataPatch::new(), [])
            .await;
    }
    tokio::time::sleep(Duration::from_millis(60)).await;

    let statuses = status_entries(&engine).await;
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].content, "No scheduled deep reflections");
    engine.stop();
}

// ===========================================================================
// Lifecycle
// ===========================================================================

#[tokio::test]
async fn start_twice_fails_and_stop_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(&dir, settings(), Arc::new(ScriptedReasoner::default()));

    engine.start().unwrap();
    assert!(engine.is_running());
    assert_eq!(engine.working().observer_count(), 1);
    assert!(matches!(engine.start(), Err(Error::Scheduler(_))));

    engine.stop();
    engine.stop();
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(!engine.is_running());
    assert_eq!(engine.working().observer_count(), 0);

    assert!(matches!(engine.start(), Err(Error::Scheduler(_))));
    assert!(!engine.request(ReflectionMode::Quick, CycleOptions::default()));
}

#[tokio::test]
async fn stopped_engine_ignores_user_input() {
    let dir = tempfile::tempdir().unwrap();
    let reasoner = Arc::new(ScriptedReasoner::default());
    let engine = engine_with(&dir, settings(), reasoner.clone());
    engine.start().unwrap();
    engine.stop();

    engine
        .working()
        .add_interaction(InteractionRole::User, "anyone?", MetadataPatch::new())
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(reasoner.calls(), 0);
    assert_eq!(engine.queue_len(), 0);
}

#[test]
fn start_outside_runtime_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(&dir, settings(), Arc::new(ScriptedReasoner::default()));
    assert!(matches!(engine.start(), Err(Error::Scheduler(_))));
}

#[tokio::test]
async fn purge_clears_working_memory() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(&dir, settings(), Arc::new(ScriptedReasoner::default()));
    engine
        .working()
        .add_memory(MemoryKind::Internal, "scratch", MetadataPatch::new(), [])
        .await;
    engine.purge().await;
    assert!(engine.working().is_empty().await);
}

// ===========================================================================
// Cycle body
// ===========================================================================

#[tokio::test]
async fn stop_tool_ends_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let reasoner = Arc::new(ScriptedReasoner {
        script: Mutex::new(vec![vec![
            Action::new("chat", json!({"content": "first"})),
            Action::new("stop_reasoning", json!({})),
            Action::new("chat", json!({"content": "never sent"})),
        ]]),
        ..Default::default()
    });
    let engine = engine_with(&dir, settings(), reasoner.clone());

    let report = engine.execute(ReflectionMode::Quick, CycleOptions::default()).await;

    assert_eq!(report.mode, ReflectionMode::Quick);
    assert_eq!(report.correlation_id.len(), 8);
    assert_eq!(report.steps, 1);
    assert!(report.stopped_early);
    assert_eq!(report.tool_runs.len(), 2);
    assert!(report.tool_runs.iter().all(|o| o.success));
    assert_eq!(engine.working().last_agent_output().await.as_deref(), Some("first"));
    assert_eq!(reasoner.calls(), 1);
}

#[tokio::test]
async fn loop_is_bounded_by_max_steps() {
    let dir = tempfile::tempdir().unwrap();
    let reasoner = Arc::new(ScriptedReasoner {
        repeat: Some(vec![Action::new("memory_create", json!({"content": "again"}))]),
        ..Default::default()
    });
    let engine = engine_with(
        &dir,
        EngineSettings {
            max_steps: 3,
            ..settings()
        },
        reasoner,
    );

    let report = engine.execute(ReflectionMode::Deep, CycleOptions::default()).await;
    assert_eq!(report.steps, 3);
    assert_eq!(report.tool_runs.len(), 3);
    assert!(!report.stopped_early);
    assert_eq!(engine.store().len().await, 3);
}

#[tokio::test]
async fn empty_decision_ends_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let reasoner = Arc::new(ScriptedReasoner {
        script: Mutex::new(vec![
            vec![Action::new("memory_create", json!({"content": "one"}))],
            Vec::new(),
            vec![Action::new("memory_create", json!({"content": "unreached"}))],
        ]),
        ..Default::default()
    });
    let engine = engine_with(&dir, settings(), reasoner);

    let report = engine.execute(ReflectionMode::Deep, CycleOptions::default()).await;
    assert_eq!(report.steps, 2);
    assert_eq!(report.tool_runs.len(), 1);
}

#[tokio::test]
async fn migration_mode_restricts_tools() {
    let dir = tempfile::tempdir().unwrap();
    let reasoner = Arc::new(ScriptedReasoner {
        script: Mutex::new(vec![vec![
            Action::new("chat", json!({"content": "not allowed"})),
            Action::new("memory_migration", json!({"content": "# Summary"})),
        ]]),
        ..Default::default()
    });
    let engine = engine_with(&dir, settings(), reasoner.clone());

    let report = engine.execute(ReflectionMode::Migration, CycleOptions::default()).await;

    assert_eq!(
        reasoner.tool_names.lock().unwrap()[0],
        vec!["memory_migration".to_string(), "stop_reasoning".to_string()]
    );
    assert!(!report.tool_runs[0].success);
    assert!(report.tool_runs[1].success);
    assert!(engine.store().is_empty().await);
    assert_eq!(std::fs::read_dir(dir.path().join("exports")).unwrap().count(), 1);
}

#[tokio::test]
async fn reasoner_failure_is_contained() {
    let dir = tempfile::tempdir().unwrap();
    let reasoner = Arc::new(ScriptedReasoner {
        fail: true,
        ..Default::default()
    });
    let engine = engine_with(&dir, settings(), reasoner.clone());

    let report = engine.execute(ReflectionMode::Deep, CycleOptions::default()).await;
    assert_eq!(report.steps, 1);
    assert!(report.tool_runs.is_empty());

    // The engine is still usable
    engine.execute(ReflectionMode::Quick, CycleOptions::default()).await;
    assert_eq!(reasoner.calls(), 2);
    assert_eq!(engine.state(), EngineState::Idle);
}

/// Panics inside the collaborator call.
struct Exploding(AtomicUsize);

#[async_trait::async_trait]
impl Reasoner for Exploding {
    async fn decide(&self, _input: &ReasonerInput) -> Result<Option<Vec<Action>>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        panic!("reasoner blew up");
    }
}

#[async_trait::async_trait]
impl RelevanceJudge for Exploding {
    async fn select(&self, _cue: &str, _candidates: &[Memory]) -> Result<Vec<MemoryId>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        panic!("judge blew up");
    }
}

#[tokio::test]
async fn reasoner_panic_is_contained_and_engine_returns_to_idle() {
    let dir = tempfile::tempdir().unwrap();
    let exploding = Arc::new(Exploding(AtomicUsize::new(0)));
    let nobody = Arc::new(Nobody);
    let engine = ReflectionEngine::new(
        settings(),
        Arc::new(WorkingMemory::new(10, Delivery::Synchronous)),
        MemoryStore::new().target(dir.path().join("g.json")),
        ToolDispatcher::new(create_default_registry(dir.path())),
        Collaborators::new(exploding.clone(), nobody.clone(), nobody),
    );

    let report = engine.execute(ReflectionMode::Deep, CycleOptions::default()).await;
    assert_eq!(report.steps, 1);
    assert!(report.tool_runs.is_empty());
    assert_eq!(engine.state(), EngineState::Idle);

    // Scheduled cycles drain too; the lock is released after each panic
    engine.start().unwrap();
    assert!(engine.request(ReflectionMode::Deep, CycleOptions::default()));
    assert!(engine.request(ReflectionMode::Quick, CycleOptions::default()));
    wait_until(|| exploding.0.load(Ordering::SeqCst) == 3).await;
    wait_until(|| engine.state() == EngineState::Idle && engine.queue_len() == 0).await;
    engine.stop();
}

#[tokio::test]
async fn relevance_judge_panic_skips_recall_but_not_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::new().target(dir.path().join("g.json"));
    store
        .add(MemoryKind::Internal, "stored", MetadataPatch::new(), [])
        .await
        .unwrap();
    let reasoner = Arc::new(ScriptedReasoner::default());
    let exploding = Arc::new(Exploding(AtomicUsize::new(0)));
    let engine = ReflectionEngine::new(
        settings(),
        Arc::new(WorkingMemory::new(10, Delivery::Synchronous)),
        store,
        ToolDispatcher::new(create_default_registry(dir.path())),
        Collaborators::new(reasoner.clone(), exploding.clone(), Arc::new(Nobody)),
    );

    let report = engine.execute(ReflectionMode::Deep, CycleOptions::default()).await;
    assert_eq!(exploding.0.load(Ordering::SeqCst), 1);
    assert!(report.recalled.is_empty());
    assert_eq!(reasoner.calls(), 1);
    assert_eq!(engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn cycle_options_reach_the_reasoner_and_skip_gates() {
    struct Echo(Mutex<Option<CycleOptions>>);

    #[async_trait::async_trait]
    impl Reasoner for Echo {
        async fn decide(&self, input: &ReasonerInput) -> Result<Option<Vec<Action>>> {
            *self.0.lock().unwrap() = Some(input.options.clone());
            Ok(None)
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let echo = Arc::new(Echo(Mutex::new(None)));
    let nobody = Arc::new(Nobody);
    let engine = ReflectionEngine::new(
        settings(),
        Arc::new(WorkingMemory::new(10, Delivery::Synchronous)),
        MemoryStore::new().target(dir.path().join("g.json")),
        ToolDispatcher::new(create_default_registry(dir.path())),
        Collaborators::new(echo.clone(), nobody.clone(), nobody),
    );

    let options = CycleOptions {
        skip_recall: true,
        skip_forget: true,
        params: json!({"reason": "manual"}),
    };
    let report = engine.execute(ReflectionMode::Deep, options.clone()).await;

    assert!(report.recalled.is_empty());
    assert!(report.forgotten.is_empty());
    assert_eq!(echo.0.lock().unwrap().clone(), Some(options));
}

#[tokio::test]
async fn from_config_wires_store_and_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.memory.working_capacity = 7;
    config.memory.delivery = Delivery::Queued;
    config.store.path = dir.path().join("graph.json");
    config.store.export_dir = dir.path().join("exports");

    let nobody = Arc::new(Nobody);
    let engine = ReflectionEngine::from_config(
        &config,
        &MemoryStore::new(),
        Collaborators::new(Arc::new(ScriptedReasoner::default()), nobody.clone(), nobody),
    );
    assert_eq!(engine.working().capacity(), 7);
    assert_eq!(engine.store().path(), dir.path().join("graph.json"));
    assert_eq!(engine.dispatcher().registry().len(), 7);
    assert!(engine.dispatcher().registry().get("recall").is_some());
}
