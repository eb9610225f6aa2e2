//! Mnemo Agent - recall/forget gates and the reflection scheduler

pub mod collaborators;
pub mod config;
pub mod engine;
pub mod forget;
pub mod queue;
pub mod recall;

pub use collaborators::{
    Collaborators, CycleOptions, Reasoner, ReasonerInput, RelevanceJudge, UsageJudge,
};
pub use config::{EngineConfig, EngineSettings};
pub use engine::{engine_registry, CycleReport, EngineState, ReflectionEngine};
pub use forget::ForgetGate;
pub use queue::{ReflectionQueue, ReflectionRequest};
pub use recall::{RecallGate, RecallTool};
