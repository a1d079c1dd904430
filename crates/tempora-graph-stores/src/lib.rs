//! tempora-graph-stores - Graph store implementations for tempora.
//!
//! # Supported Backends
//!
//! - **Memory** - petgraph `DiGraph` with optional JSON snapshot files
//!
//! # Example
//!
//! ```ignore
//! use tempora_graph_stores::InMemoryGraphStore;
//!
//! let store = InMemoryGraphStore::open("graph.json").await?;
//! // ... ingest ...
//! store.save().await?;
//! ```

mod factory;
pub mod memory;

pub use factory::GraphStoreFactory;
pub use memory::{InMemoryGraphStore, StoreStats, SNAPSHOT_VERSION};

// Re-export core types
pub use tempora_core::traits::{GraphStore, GraphStoreConfig, GraphStoreProvider};
