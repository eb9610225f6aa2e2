//! Mnemo Core - Memory data model, query engine, and error handling

pub mod error;
pub mod query;
pub mod types;

pub use error::{Error, Result};
pub use query::{FilterValue, MetadataFilter, Query, SortKey};
pub use types::*;
