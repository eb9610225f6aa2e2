//! Error types for Mnemo

use crate::types::MemoryId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("memory not found: {0}")]
    NotFound(MemoryId),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid parameters for {tool}: {message}")]
    InvalidParams { tool: String, message: String },

    #[error("collaborator error: {name} - {message}")]
    Collaborator { name: String, message: String },

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_params(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParams {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn collaborator(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            name: name.into(),
            message: message.into(),
        }
    }
}
