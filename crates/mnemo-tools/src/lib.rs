//! Mnemo Tools - actions a reflection cycle can take
//!
//! Each tool is a self-contained file in src/tools/.
//! To add a tool: create the file, implement Tool trait, register below.

pub mod dispatcher;
pub mod registry;
pub mod tools;

pub use dispatcher::{panic_message, ToolDispatcher, ToolOutcome};
pub use registry::{Tool, ToolContext, ToolRegistry, ToolResult};

use std::path::Path;

/// Create the default tool registry with all builtin tools.
///
/// `export_dir` is where migration summaries are written.
pub fn create_default_registry(export_dir: impl AsRef<Path>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    // --- Conversation ---
    registry.register(tools::chat::ChatTool);

    // --- Memory management ---
    registry.register(tools::memory_create::MemoryCreateTool);
    registry.register(tools::memory_update::MemoryUpdateTool);
    registry.register(tools::memory_delete::MemoryDeleteTool);

    // --- Migration mode only ---
    registry.register(tools::memory_migration::MemoryMigrationTool::new(export_dir));

    // --- Control ---
    registry.register(tools::stop::StopReasoningTool);

    registry
}
