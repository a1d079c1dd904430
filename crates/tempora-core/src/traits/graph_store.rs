//! Graph store trait and related types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::TemporaResult;
use crate::types::{
    ContentKeywordSet, Entity, GraphSnapshot, QueryKeywords, QueryParams, Relationship,
    RetrievedContext, StoredChunk, TemporalSequence,
};

/// Core GraphStore trait - all graph store backends implement this.
///
/// Entities are addressed by their canonical key, the normalized form of the
/// name produced by the resolver's name policy. `Entity::name` keeps the
/// display spelling. The store owns everything it persists; callers work on
/// clones.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Insert or replace the entity stored under `key`.
    async fn upsert_entity(&self, key: &str, entity: Entity) -> TemporaResult<()>;

    /// Insert a relationship between two existing entities.
    ///
    /// A relationship with the same endpoints and description replaces the
    /// stored one; any other relationship between the pair is kept alongside.
    async fn upsert_relationship(
        &self,
        source_key: &str,
        target_key: &str,
        relationship: Relationship,
    ) -> TemporaResult<()>;

    /// Get the entity stored under `key`.
    async fn get_entity(&self, key: &str) -> TemporaResult<Option<Entity>>;

    /// Relationships directed from `source_key` to `target_key`.
    async fn relationships_between(
        &self,
        source_key: &str,
        target_key: &str,
    ) -> TemporaResult<Vec<Relationship>>;

    /// Store or replace a temporal sequence by name.
    async fn upsert_temporal_sequence(&self, sequence: TemporalSequence) -> TemporaResult<()>;

    /// Merge content keywords for a source document.
    async fn upsert_content_keywords(&self, keywords: ContentKeywordSet) -> TemporaResult<()>;

    /// Store a document chunk for naive retrieval and citation.
    async fn insert_chunk(&self, chunk: StoredChunk) -> TemporaResult<()>;

    /// Retrieve evidence for the given keywords, each list in rank order.
    async fn retrieve(
        &self,
        keywords: &QueryKeywords,
        params: &QueryParams,
    ) -> TemporaResult<RetrievedContext>;

    /// Full copy of the stored graph.
    async fn snapshot(&self) -> TemporaResult<GraphSnapshot>;
}

/// Graph store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStoreConfig {
    /// Provider type.
    #[serde(default)]
    pub provider: GraphStoreProvider,
    /// JSON snapshot file loaded on open and written on save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

/// Graph store provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GraphStoreProvider {
    #[default]
    Memory,
}
