//! Tests for mnemo-tools: ToolResult, mode-filtered registry, dispatcher fault isolation, builtin tools

use mnemo_core::*;
use mnemo_memory::{Delivery, MemoryStore, WorkingMemory};
use mnemo_tools::*;
use serde_json::{json, Value};
use std::sync::Arc;

struct Fixture {
    dir: tempfile::TempDir,
    ctx: ToolContext,
    dispatcher: ToolDispatcher,
}

fn fixture(mode: ReflectionMode) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::new().target(dir.path().join("memory_graph.json"));
    let working = Arc::new(WorkingMemory::new(20, Delivery::Synchronous));
    let dispatcher = ToolDispatcher::new(create_default_registry(dir.path().join("exports")));
    Fixture {
        ctx: ToolContext::new(working, store, mode),
        dispatcher,
        dir,
    }
}

async fn run(f: &Fixture, name: &str, params: Value) -> ToolOutcome {
    f.dispatcher.dispatch(&f.ctx, &Action::new(name, params)).await
}

fn memory_id_of(outcome: &ToolOutcome) -> MemoryId {
    let v: Value = serde_json::from_str(&outcome.message).unwrap();
    MemoryId::new(v["memory_id"].as_str().unwrap())
}

struct PanickingTool;

#[async_trait::async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str { "explode" }
    fn description(&self) -> &str { "always panics" }
    fn input_schema(&self) -> Value { json!({"type": "object"}) }
    async fn execute(&self, _ctx: &ToolContext, _args: Value) -> ToolResult {
        panic!("tool blew up");
    }
}

// ===========================================================================
// ToolResult
// ===========================================================================

#[test]
fn tool_result_text() {
    let r = ToolResult::text("hello");
    assert!(!r.is_error());
    assert_eq!(r.to_content_string(), "hello");
}

#[test]
fn tool_result_error() {
    let r = ToolResult::error("boom");
    assert!(r.is_error());
    assert_eq!(r.to_content_string(), "Error: boom");
}

// ===========================================================================
// ToolRegistry
// ===========================================================================

#[test]
fn registry_default_is_empty() {
    let reg = ToolRegistry::new();
    assert!(reg.is_empty());
    assert!(reg.definitions(ReflectionMode::Quick).is_empty());
}

#[test]
fn default_registry_has_all_tools() {
    let reg = create_default_registry("unused");
    assert_eq!(
        reg.list(),
        vec![
            "chat",
            "memory_create",
            "memory_delete",
            "memory_migration",
            "memory_update",
            "stop_reasoning"
        ]
    );
}

#[test]
fn migration_mode_sees_only_export_and_stop() {
    let reg = create_default_registry("unused");
    let names: Vec<String> = reg
        .definitions(ReflectionMode::Migration)
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec!["memory_migration", "stop_reasoning"]);
    assert!(reg.resolve(ReflectionMode::Migration, "chat").is_none());
}

#[test]
fn quick_and_deep_exclude_export() {
    let reg = create_default_registry("unused");
    for mode in [ReflectionMode::Quick, ReflectionMode::Deep] {
        let defs = reg.definitions(mode);
        assert_eq!(defs.len(), 5);
        assert!(defs.iter().all(|d| d.name != "memory_migration"));
        assert!(reg.resolve(mode, "memory_migration").is_none());
        assert!(reg.resolve(mode, "stop_reasoning").is_some());
    }
}

#[test]
fn registry_remove() {
    let mut reg = create_default_registry("unused");
    assert!(reg.remove("chat"));
    assert!(!reg.remove("chat"));
    assert!(reg.get("chat").is_none());
}

// ===========================================================================
// ToolDispatcher
// ===========================================================================

#[tokio::test]
async fn dispatch_unknown_tool_fails_softly() {
    let f = fixture(ReflectionMode::Quick);
    let out = run(&f, "nonexistent", json!({})).await;
    assert!(!out.success);
    assert!(!out.halt);
    assert!(out.message.contains("not found"));
}

#[tokio::test]
async fn dispatch_mode_excluded_tool_fails_softly() {
    let f = fixture(ReflectionMode::Quick);
    let out = run(&f, "memory_migration", json!({"content": "x"})).await;
    assert!(!out.success);
    assert!(out.message.contains("not available"));
    assert!(!f.dir.path().join("exports").exists());
}

#[tokio::test]
async fn panicking_tool_is_isolated() {
    let mut reg = ToolRegistry::new();
    reg.register(PanickingTool);
    let f = fixture(ReflectionMode::Deep);
    let dispatcher = ToolDispatcher::new(reg);

    let out = dispatcher.dispatch(&f.ctx, &Action::new("explode", json!({}))).await;
    assert!(!out.success);
    assert!(out.message.contains("tool blew up"));
}

#[tokio::test]
async fn stop_tool_halts_in_every_mode() {
    for mode in [ReflectionMode::Quick, ReflectionMode::Deep, ReflectionMode::Migration] {
        let f = fixture(mode);
        let out = run(&f, "stop_reasoning", json!({})).await;
        assert!(out.success);
        assert!(out.halt);
    }
}

// ===========================================================================
// chat
// ===========================================================================

#[tokio::test]
async fn chat_appends_agent_message_and_persists() {
    let f = fixture(ReflectionMode::Quick);
    let out = run(&f, "chat", json!({"content": "Hello!", "parse_mode": "markdown"})).await;
    assert!(out.success, "{}", out.message);
    let id = memory_id_of(&out);

    assert_eq!(f.ctx.working.last_agent_output().await.as_deref(), Some("Hello!"));
    let stored = f.ctx.store.get(&id).await.unwrap();
    assert_eq!(stored.content, "Hello!");
    assert_eq!(stored.metadata.unit_name, AGENT_UNIT);
    assert_eq!(stored.metadata.extra["parse_mode"], "markdown");
}

#[tokio::test]
async fn chat_requires_content() {
    let f = fixture(ReflectionMode::Quick);
    let out = run(&f, "chat", json!({})).await;
    assert!(!out.success);
    assert!(out.message.contains("content"));
    assert!(f.ctx.working.is_empty().await);
}

#[tokio::test]
async fn chat_rejects_unknown_parse_mode() {
    let f = fixture(ReflectionMode::Quick);
    let out = run(&f, "chat", json!({"content": "hi", "parse_mode": "html"})).await;
    assert!(!out.success);
}

// ===========================================================================
// memory_create / memory_update / memory_delete
// ===========================================================================

#[tokio::test]
async fn memory_create_writes_both_tiers_with_same_id() {
    let f = fixture(ReflectionMode::Deep);
    let out = run(
        &f,
        "memory_create",
        json!({"content": "user prefers tea", "role": "semantic", "unit_name": "Reflector"}),
    )
    .await;
    assert!(out.success, "{}", out.message);
    let id = memory_id_of(&out);

    let stored = f.ctx.store.get(&id).await.unwrap();
    assert_eq!(stored.metadata.role, "semantic");
    assert_eq!(stored.metadata.unit_name, "Reflector");
    assert_eq!(stored.metadata.priority_level, Some(PriorityLevel::Background));
    assert_eq!(stored.metadata.reasoning_mode, "deep");

    let working = f.ctx.working.get(&id).await.unwrap();
    assert!(working.is_recalled());
}

#[tokio::test]
async fn memory_create_reflection_is_native() {
    let f = fixture(ReflectionMode::Quick);
    let out = run(&f, "memory_create", json!({"content": "thinking..."})).await;
    let id = memory_id_of(&out);
    let working = f.ctx.working.get(&id).await.unwrap();
    assert!(!working.is_recalled());
    assert_eq!(working.metadata.role, "reflection");
}

#[tokio::test]
async fn memory_create_falls_back_on_unknown_enums() {
    let f = fixture(ReflectionMode::Quick);
    let id = memory_id_of(
        &run(
            &f,
            "memory_create",
            json!({"content": "x", "role": "dream", "priority_level": "URGENT", "temporal_scope": "forever"}),
        )
        .await,
    );

    let stored = f.ctx.store.get(&id).await.unwrap();
    assert_eq!(stored.metadata.role, "reflection");
    assert_eq!(stored.metadata.priority_level, Some(PriorityLevel::Background));
    assert_eq!(stored.metadata.temporal_scope, TemporalScope::ShortTerm);
    // Falls back to a reflection, so the working copy stays native
    assert_eq!(f.ctx.working.get(&id).await.unwrap().metadata.recalled, None);
}

#[tokio::test]
async fn memory_create_normalizes_case() {
    let f = fixture(ReflectionMode::Quick);
    let id = memory_id_of(
        &run(
            &f,
            "memory_create",
            json!({"content": "x", "role": "Semantic", "priority_level": "high", "temporal_scope": "LONG_TERM"}),
        )
        .await,
    );

    let stored = f.ctx.store.get(&id).await.unwrap();
    assert_eq!(stored.metadata.role, "semantic");
    assert_eq!(stored.metadata.priority_level, Some(PriorityLevel::High));
    assert_eq!(stored.metadata.temporal_scope, TemporalScope::LongTerm);
}

#[tokio::test]
async fn memory_update_merges_store_and_working_copy() {
    let f = fixture(ReflectionMode::Quick);
    let id = memory_id_of(&run(&f, "memory_create", json!({"content": "v1", "role": "episodic"})).await);

    let out = run(
        &f,
        "memory_update",
        json!({"memory_id": id.as_str(), "content": "v2", "priority_level": "HIGH"}),
    )
    .await;
    assert!(out.success, "{}", out.message);

    let stored = f.ctx.store.get(&id).await.unwrap();
    assert_eq!(stored.content, "v2");
    assert_eq!(stored.metadata.priority_level, Some(PriorityLevel::High));
    assert_eq!(stored.metadata.role, "episodic");

    let working = f.ctx.working.get(&id).await.unwrap();
    assert_eq!(working.content, "v2");
    assert!(working.is_recalled());
}

#[tokio::test]
async fn memory_update_missing_fails() {
    let f = fixture(ReflectionMode::Quick);
    let out = run(&f, "memory_update", json!({"memory_id": "mem-00000000", "content": "x"})).await;
    assert!(!out.success);
    assert!(out.message.contains("not found"));
}

#[tokio::test]
async fn memory_delete_removes_from_both_tiers() {
    let f = fixture(ReflectionMode::Quick);
    let id = memory_id_of(&run(&f, "memory_create", json!({"content": "obsolete"})).await);

    let out = run(&f, "memory_delete", json!({"memory_id": id.as_str()})).await;
    assert!(out.success, "{}", out.message);
    assert!(!f.ctx.working.contains(&id).await);
    assert!(f.ctx.store.get(&id).await.is_none());
}

#[tokio::test]
async fn memory_delete_requires_working_presence() {
    let f = fixture(ReflectionMode::Quick);
    let id = f
        .ctx
        .store
        .add(MemoryKind::Internal, "only stored", MetadataPatch::new(), [])
        .await
        .unwrap();

    let out = run(&f, "memory_delete", json!({"memory_id": id.as_str()})).await;
    assert!(!out.success);
    assert!(f.ctx.store.get(&id).await.is_some());
}

#[tokio::test]
async fn memory_delete_keeps_working_copy_when_store_write_fails() {
    let f = fixture(ReflectionMode::Quick);
    let id = memory_id_of(&run(&f, "memory_create", json!({"content": "keep me", "role": "semantic"})).await);

    // A directory where the temp snapshot goes makes the save fail
    std::fs::create_dir(f.dir.path().join("memory_graph.json.tmp")).unwrap();

    let out = run(&f, "memory_delete", json!({"memory_id": id.as_str()})).await;
    assert!(!out.success);
    assert!(out.message.contains("Failed to delete memory"));
    assert!(f.ctx.working.contains(&id).await);
    assert!(f.ctx.store.get(&id).await.is_some());
}

// ===========================================================================
// memory_migration
// ===========================================================================

#[tokio::test]
async fn migration_writes_timestamped_summary() {
    let f = fixture(ReflectionMode::Migration);
    let out = run(
        &f,
        "memory_migration",
        json!({"content": "# Core Objectives\n- help", "filename": "handoff"}),
    )
    .await;
    assert!(out.success, "{}", out.message);

    let v: Value = serde_json::from_str(&out.message).unwrap();
    let path = std::path::PathBuf::from(v["path"].as_str().unwrap());
    let name = path.file_name().unwrap().to_str().unwrap().to_string();
    assert!(name.starts_with("handoff_"));
    assert!(name.ends_with(".md"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Core Objectives\n- help");

    let snap = f.ctx.working.snapshot().await;
    assert_eq!(snap.len(), 3);
    assert_eq!(snap[0].metadata.role, "system_operation");
    assert_eq!(snap[1].content, "# Core Objectives\n- help");
    assert!(snap[2].content.starts_with("Summary generated and saved to"));
}
