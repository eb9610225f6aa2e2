//! Mnemo Memory - persistent graph store and bounded working memory

pub mod store;
pub mod working;

pub use store::{Edge, MemoryStore, StoreStats, StoreTarget, MEMORY_FLOW, SNAPSHOT_VERSION};
pub use working::{Delivery, Observer, WorkingMemory, DEFAULT_CAPACITY};
