//! JSON snapshot file for the in-memory store.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tempora_core::error::{TemporaError, TemporaResult};
use tempora_core::types::{ContentKeywordSet, Entity, Relationship, StoredChunk, TemporalSequence};

use super::StoreState;

/// Current snapshot file format.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct KeyedEntity {
    pub key: String,
    pub entity: Entity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct KeyedRelationship {
    pub source_key: String,
    pub target_key: String,
    pub relationship: Relationship,
}

/// Everything the store holds, keyed so it can be reloaded exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PersistedGraph {
    pub version: u32,
    pub entities: Vec<KeyedEntity>,
    /// In insertion order.
    pub relationships: Vec<KeyedRelationship>,
    #[serde(default)]
    pub temporal_sequences: Vec<TemporalSequence>,
    #[serde(default)]
    pub content_keywords: Vec<ContentKeywordSet>,
    #[serde(default)]
    pub chunks: Vec<StoredChunk>,
}

impl PersistedGraph {
    pub fn capture(state: &StoreState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            entities: state
                .graph
                .entities_by_key()
                .into_iter()
                .map(|n| KeyedEntity {
                    key: n.key.clone(),
                    entity: n.entity.clone(),
                })
                .collect(),
            relationships: state
                .graph
                .edges()
                .map(|(_, source, target, rel)| KeyedRelationship {
                    source_key: source.to_string(),
                    target_key: target.to_string(),
                    relationship: rel.clone(),
                })
                .collect(),
            temporal_sequences: state.sequences.clone(),
            content_keywords: state.keywords.values().cloned().collect(),
            chunks: state.chunks.clone(),
        }
    }

    /// Rebuild store state. Fails on a dangling relationship endpoint.
    pub fn restore(self) -> TemporaResult<StoreState> {
        if self.version != SNAPSHOT_VERSION {
            return Err(TemporaError::graph_store(format!(
                "Unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            )));
        }
        let mut state = StoreState::default();
        for KeyedEntity { key, entity } in self.entities {
            state.graph.upsert_entity(&key, entity);
        }
        for rel in self.relationships {
            if state
                .graph
                .upsert_relationship(&rel.source_key, &rel.target_key, rel.relationship)
                .is_none()
            {
                return Err(TemporaError::graph_store(format!(
                    "Snapshot relationship {} -> {} references a missing entity",
                    rel.source_key, rel.target_key
                )));
            }
        }
        state.sequences = self.temporal_sequences;
        for set in self.content_keywords {
            state.keywords.insert(set.source_id.clone(), set);
        }
        for chunk in self.chunks {
            state.insert_chunk(chunk);
        }
        Ok(state)
    }
}

pub(crate) async fn read(path: &Path) -> TemporaResult<StoreState> {
    let bytes = tokio::fs::read(path).await?;
    let persisted: PersistedGraph = serde_json::from_slice(&bytes)?;
    debug!(
        "Loaded snapshot {} with {} entities and {} relationships",
        path.display(),
        persisted.entities.len(),
        persisted.relationships.len()
    );
    persisted.restore()
}

/// Written to a temporary sibling, then renamed into place.
pub(crate) async fn write(path: &Path, persisted: &PersistedGraph) -> TemporaResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(persisted)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
