//! In-memory graph store on petgraph with optional JSON snapshots.
//!
//! Entities and relationships live in a `DiGraph` indexed by canonical key.
//! Chunks, temporal sequences and content keywords sit beside the graph.
//! A store opened with a snapshot path reloads that file and writes it back
//! on [`InMemoryGraphStore::save`].

pub mod graph;
mod persist;
mod retrieval;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use tempora_core::error::{TemporaError, TemporaResult};
use tempora_core::traits::{GraphStore, GraphStoreConfig};
use tempora_core::types::{
    ContentKeywordSet, Entity, GraphSnapshot, QueryKeywords, QueryParams, Relationship,
    RetrievedContext, StoredChunk, TemporalSequence,
};

use graph::KnowledgeGraph;
use persist::PersistedGraph;

pub use persist::SNAPSHOT_VERSION;

/// Everything the store holds.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub graph: KnowledgeGraph,
    pub sequences: Vec<TemporalSequence>,
    /// Keyed by source id.
    pub keywords: BTreeMap<String, ContentKeywordSet>,
    /// In insertion order.
    pub chunks: Vec<StoredChunk>,
    chunk_index: HashMap<String, usize>,
}

impl StoreState {
    /// Store a chunk unless one with the same id is already held.
    pub fn insert_chunk(&mut self, chunk: StoredChunk) -> bool {
        if self.chunk_index.contains_key(&chunk.chunk_id) {
            return false;
        }
        self.chunk_index
            .insert(chunk.chunk_id.clone(), self.chunks.len());
        self.chunks.push(chunk);
        true
    }

    pub fn chunk(&self, chunk_id: &str) -> Option<&StoredChunk> {
        self.chunk_index
            .get(chunk_id)
            .and_then(|&i| self.chunks.get(i))
    }
}

/// Counts of what a store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub entities: usize,
    pub relationships: usize,
    pub chunks: usize,
    pub temporal_sequences: usize,
}

/// In-memory [`GraphStore`].
///
/// Safe to share across tasks; readers proceed in parallel and writers are
/// serialized by an async `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: RwLock<StoreState>,
    snapshot_path: Option<PathBuf>,
}

impl InMemoryGraphStore {
    /// Create an empty store with no snapshot file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by a snapshot file. A missing file starts empty.
    pub async fn open(path: impl AsRef<Path>) -> TemporaResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if tokio::fs::try_exists(&path).await? {
            persist::read(&path).await?
        } else {
            debug!("No snapshot at {}, starting empty", path.display());
            StoreState::default()
        };
        let store = Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
        };
        let stats = store.stats().await;
        info!(
            "Opened graph store with {} entities and {} relationships",
            stats.entities, stats.relationships
        );
        Ok(store)
    }

    /// Create from a GraphStoreConfig.
    pub async fn from_config(config: &GraphStoreConfig) -> TemporaResult<Self> {
        match &config.snapshot_path {
            Some(path) => Self::open(path).await,
            None => Ok(Self::new()),
        }
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Write the snapshot file this store was opened with.
    pub async fn save(&self) -> TemporaResult<()> {
        let path = self.snapshot_path.as_deref().ok_or_else(|| {
            TemporaError::graph_store("Store has no snapshot path; use save_to")
        })?;
        self.save_to(path).await
    }

    /// Write a snapshot file to `path`.
    pub async fn save_to(&self, path: impl AsRef<Path>) -> TemporaResult<()> {
        let path = path.as_ref();
        let persisted = {
            let state = self.state.read().await;
            PersistedGraph::capture(&state)
        };
        persist::write(path, &persisted).await?;
        info!(
            "Saved graph snapshot to {} ({} entities)",
            path.display(),
            persisted.entities.len()
        );
        Ok(())
    }

    pub async fn stats(&self) -> StoreStats {
        let state = self.state.read().await;
        StoreStats {
            entities: state.graph.node_count(),
            relationships: state.graph.edge_count(),
            chunks: state.chunks.len(),
            temporal_sequences: state.sequences.len(),
        }
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_entity(&self, key: &str, entity: Entity) -> TemporaResult<()> {
        if key.trim().is_empty() {
            return Err(TemporaError::validation("Entity key must not be empty"));
        }
        self.state.write().await.graph.upsert_entity(key, entity);
        Ok(())
    }

    async fn upsert_relationship(
        &self,
        source_key: &str,
        target_key: &str,
        relationship: Relationship,
    ) -> TemporaResult<()> {
        let mut state = self.state.write().await;
        state
            .graph
            .upsert_relationship(source_key, target_key, relationship)
            .map(|_| ())
            .ok_or_else(|| {
                TemporaError::graph_store(format!(
                    "Cannot relate {} -> {}: endpoint not stored",
                    source_key, target_key
                ))
            })
    }

    async fn get_entity(&self, key: &str) -> TemporaResult<Option<Entity>> {
        Ok(self.state.read().await.graph.entity(key).cloned())
    }

    async fn relationships_between(
        &self,
        source_key: &str,
        target_key: &str,
    ) -> TemporaResult<Vec<Relationship>> {
        let state = self.state.read().await;
        Ok(state
            .graph
            .relationships_between(source_key, target_key)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn upsert_temporal_sequence(&self, sequence: TemporalSequence) -> TemporaResult<()> {
        let mut state = self.state.write().await;
        match state.sequences.iter_mut().find(|s| s.name == sequence.name) {
            Some(existing) => *existing = sequence,
            None => state.sequences.push(sequence),
        }
        Ok(())
    }

    async fn upsert_content_keywords(&self, keywords: ContentKeywordSet) -> TemporaResult<()> {
        let mut state = self.state.write().await;
        state
            .keywords
            .entry(keywords.source_id.clone())
            .or_insert_with(|| ContentKeywordSet {
                source_id: keywords.source_id.clone(),
                ..Default::default()
            })
            .keywords
            .extend(keywords.keywords);
        Ok(())
    }

    async fn insert_chunk(&self, chunk: StoredChunk) -> TemporaResult<()> {
        let chunk_id = chunk.chunk_id.clone();
        if !self.state.write().await.insert_chunk(chunk) {
            debug!("Chunk {} already stored", chunk_id);
        }
        Ok(())
    }

    async fn retrieve(
        &self,
        keywords: &QueryKeywords,
        params: &QueryParams,
    ) -> TemporaResult<RetrievedContext> {
        let state = self.state.read().await;
        let context = retrieval::retrieve(&state, keywords, params);
        debug!(
            "Retrieved {} items for {} keywords in {} mode",
            context.len(),
            keywords.all().len(),
            params.mode
        );
        Ok(context)
    }

    async fn snapshot(&self) -> TemporaResult<GraphSnapshot> {
        let state = self.state.read().await;
        Ok(GraphSnapshot {
            entities: state
                .graph
                .entities_by_key()
                .into_iter()
                .map(|n| n.entity.clone())
                .collect(),
            relationships: state.graph.edges().map(|(_, _, _, r)| r.clone()).collect(),
            temporal_sequences: state.sequences.clone(),
            content_keywords: state.keywords.values().cloned().collect(),
        })
    }
}
