//! Engine configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use mnemo_core::{Error, Result};
use mnemo_memory::Delivery;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Working memory sizing and recall window.
    pub memory: MemoryConfig,
    /// Scheduler timing and loop bounds.
    pub reflection: ReflectionConfig,
    /// Snapshot and export locations.
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Working memory capacity (entries).
    pub working_capacity: usize,
    /// "queued" or "synchronous" observer delivery.
    pub delivery: Delivery,
    /// Number of most recent store memories a quick recall considers.
    pub recall_window: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionConfig {
    /// Period of scheduled deep reflections. 0 disables the timer.
    pub deep_interval_secs: u64,
    /// Poll period of the timer and drain loops.
    pub poll_interval_ms: u64,
    /// Pending request bound, clamped to 1..=3.
    pub queue_capacity: usize,
    /// Reason→act iterations per cycle.
    pub max_steps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Snapshot file.
    pub path: PathBuf,
    /// Where migration summaries are written.
    pub export_dir: PathBuf,
}

// ============================================================
// Defaults
// ============================================================

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            working_capacity: mnemo_memory::DEFAULT_CAPACITY,
            delivery: Delivery::Queued,
            recall_window: crate::recall::DEFAULT_RECALL_WINDOW,
        }
    }
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            deep_interval_secs: 600,
            poll_interval_ms: 1000,
            queue_capacity: crate::queue::MAX_QUEUE_CAPACITY,
            max_steps: 5,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("user_data/memory_graph.json"),
            export_dir: PathBuf::from("migration_summaries"),
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl EngineConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist
    /// or fails to parse.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("{} in {}; using defaults", e, path.display());
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Strict parse.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Runtime settings for the reflection engine.
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            deep_interval: match self.reflection.deep_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            poll_interval: Duration::from_millis(self.reflection.poll_interval_ms.max(1)),
            queue_capacity: self.reflection.queue_capacity,
            max_steps: self.reflection.max_steps.max(1),
            recall_window: self.memory.recall_window,
        }
    }
}

/// Resolved engine timing and bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub deep_interval: Option<Duration>,
    pub poll_interval: Duration,
    pub queue_capacity: usize,
    pub max_steps: usize,
    pub recall_window: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineConfig::default().settings()
    }
}
