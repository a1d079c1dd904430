//! Factory for creating graph store providers.

use std::sync::Arc;

use tempora_core::error::TemporaResult;
use tempora_core::traits::{GraphStore, GraphStoreConfig, GraphStoreProvider};

use crate::memory::InMemoryGraphStore;

/// Factory for creating graph store providers.
pub struct GraphStoreFactory;

impl GraphStoreFactory {
    /// Create a graph store from the given configuration.
    pub async fn create(config: &GraphStoreConfig) -> TemporaResult<Arc<dyn GraphStore>> {
        match config.provider {
            GraphStoreProvider::Memory => {
                let store: Arc<dyn GraphStore> = Self::memory(config).await?;
                Ok(store)
            }
        }
    }

    /// Create the in-memory store, keeping its concrete type for `save`.
    pub async fn memory(config: &GraphStoreConfig) -> TemporaResult<Arc<InMemoryGraphStore>> {
        Ok(Arc::new(InMemoryGraphStore::from_config(config).await?))
    }
}
