//! Entity resolution: folds one chunk's drafts into the canonical graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::locks::{KeyedLocks, MonotonicClock};
use super::name::NamePolicy;
use super::summarize::{degraded_merge, join_descriptions, ordered_texts, Summarizer};
use crate::config::ResolverConfig;
use crate::error::TemporaResult;
use crate::extraction::{ChunkExtraction, EntityDraft, RelationshipDraft};
use crate::retry::with_retry;
use crate::traits::GraphStore;
use crate::types::{
    ContentKeywordSet, DescriptionEntry, Entity, Relationship, TemporalSequence,
};

/// Entity type given to endpoints created from a relationship alone.
pub const UNKNOWN_ENTITY_TYPE: &str = "unknown";

/// An entity whose descriptions could not be summarized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeFailure {
    /// Display name of the entity.
    pub entity: String,
    pub reason: String,
}

/// What resolving one chunk changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub entities_created: usize,
    pub entities_updated: usize,
    pub entities_unchanged: usize,
    pub relationships_added: usize,
    /// Relationships already present with the same fingerprint.
    pub relationships_unchanged: usize,
    /// Endpoint entities created because only a relationship named them.
    pub endpoints_created: usize,
    pub sequences_stored: usize,
    pub merge_failures: Vec<MergeFailure>,
}

impl ResolutionReport {
    /// Whether the resolution wrote nothing new.
    pub fn is_noop(&self) -> bool {
        self.entities_created == 0
            && self.entities_updated == 0
            && self.relationships_added == 0
            && self.endpoints_created == 0
    }

    /// Accumulate another report into this one.
    pub fn absorb(&mut self, other: ResolutionReport) {
        self.entities_created += other.entities_created;
        self.entities_updated += other.entities_updated;
        self.entities_unchanged += other.entities_unchanged;
        self.relationships_added += other.relationships_added;
        self.relationships_unchanged += other.relationships_unchanged;
        self.endpoints_created += other.endpoints_created;
        self.sequences_stored += other.sequences_stored;
        self.merge_failures.extend(other.merge_failures);
    }
}

/// Identity of a relationship fact: normalized endpoints plus description.
pub fn relationship_fingerprint(source_key: &str, target_key: &str, description: &str) -> String {
    let description = description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let digest = md5::compute(format!("{}\u{1f}{}\u{1f}{}", source_key, target_key, description));
    format!("rel-{:x}", digest)
}

/// Merges drafts into canonical entities and relationships.
///
/// Writes to one canonical name are serialized; the resolver can be shared
/// across concurrent ingestion tasks.
pub struct EntityResolver {
    store: Arc<dyn GraphStore>,
    summarizer: Option<Arc<dyn Summarizer>>,
    config: ResolverConfig,
    locks: KeyedLocks,
    clock: MonotonicClock,
}

impl EntityResolver {
    /// Create a resolver without a summarizer. Merged descriptions are
    /// deterministic joins.
    pub fn new(store: Arc<dyn GraphStore>, config: ResolverConfig) -> Self {
        Self {
            store,
            summarizer: None,
            config,
            locks: KeyedLocks::new(),
            clock: MonotonicClock::new(),
        }
    }

    /// Attach a summarizer.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn name_policy(&self) -> &NamePolicy {
        &self.config.name_policy
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Resolve everything extracted from one chunk.
    ///
    /// Entities are resolved before relationships so that endpoint creation
    /// only fills names the chunk did not describe. Re-resolving the same
    /// extraction changes nothing.
    pub async fn resolve(&self, extraction: &ChunkExtraction) -> TemporaResult<ResolutionReport> {
        let mut report = ResolutionReport::default();
        let stamp = self.clock.stamp(extraction.ingested_at);

        for (key, drafts) in self.group_entities(extraction) {
            self.resolve_entity(&key, &drafts, extraction, stamp, &mut report)
                .await?;
        }

        for draft in extraction.outcome.relationships() {
            self.resolve_relationship(draft, extraction, stamp, &mut report)
                .await?;
        }

        for draft in extraction.outcome.temporal_sequences() {
            let entities = draft
                .entities
                .iter()
                .map(|e| self.config.name_policy.display(e))
                .filter(|e| !e.is_empty())
                .collect();
            self.store
                .upsert_temporal_sequence(TemporalSequence {
                    name: self.config.name_policy.display(&draft.name),
                    entities,
                    description: draft.description.trim().to_string(),
                    source_id: extraction.source_id.clone(),
                })
                .await?;
            report.sequences_stored += 1;
        }

        let keywords: Vec<String> = extraction
            .outcome
            .content_keywords()
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if !keywords.is_empty() {
            self.store
                .upsert_content_keywords(ContentKeywordSet::new(&extraction.source_id, keywords))
                .await?;
        }

        debug!(
            "Resolved chunk {}: {} created, {} updated, {} relationships added",
            extraction.source_id,
            report.entities_created,
            report.entities_updated,
            report.relationships_added
        );
        Ok(report)
    }

    /// Entity drafts grouped by canonical key, in first-appearance order.
    fn group_entities<'a>(
        &self,
        extraction: &'a ChunkExtraction,
    ) -> Vec<(String, Vec<&'a EntityDraft>)> {
        let mut groups: Vec<(String, Vec<&EntityDraft>)> = Vec::new();
        for draft in extraction.outcome.entities() {
            let key = self.config.name_policy.key(&draft.name);
            if key.is_empty() {
                debug!("Skipping entity draft with blank name");
                continue;
            }
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, drafts)) => drafts.push(draft),
                None => groups.push((key, vec![draft])),
            }
        }
        groups
    }

    async fn resolve_entity(
        &self,
        key: &str,
        drafts: &[&EntityDraft],
        extraction: &ChunkExtraction,
        stamp: DateTime<Utc>,
        report: &mut ResolutionReport,
    ) -> TemporaResult<()> {
        let _guard = self.locks.lock(key).await;
        let source_id = extraction.source_id.as_str();

        let existing = self.store.get_entity(key).await?;
        let created = existing.is_none();
        let mut entity = existing.unwrap_or_else(|| Entity {
            name: self.config.name_policy.display(&drafts[0].name),
            entity_type: UNKNOWN_ENTITY_TYPE.to_string(),
            description: String::new(),
            temporal_context: None,
            descriptions: Vec::new(),
            source_ids: Vec::new(),
            merge_degraded: false,
            created_at: stamp,
            updated_at: stamp,
        });

        let mut appended = false;
        let mut changed = false;
        for draft in drafts {
            let text = draft.description.trim();
            if !text.is_empty() && !entity.has_description(text, source_id) {
                entity.descriptions.push(DescriptionEntry::new(
                    text,
                    source_id,
                    extraction.acquired_at,
                ));
                appended = true;
            }
            let entity_type = draft.entity_type.trim();
            if entity.entity_type == UNKNOWN_ENTITY_TYPE
                && !entity_type.is_empty()
                && entity_type != UNKNOWN_ENTITY_TYPE
            {
                entity.entity_type = entity_type.to_string();
                changed = true;
            }
            if entity.temporal_context.is_none() {
                if let Some(context) = draft
                    .temporal_context
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                {
                    entity.temporal_context = Some(context.to_string());
                    changed = true;
                }
            }
        }
        if !entity.source_ids.iter().any(|s| s == source_id) && (appended || changed || created) {
            entity.source_ids.push(source_id.to_string());
        }

        if !created && !appended && !changed {
            report.entities_unchanged += 1;
            return Ok(());
        }

        if appended || created {
            self.merge_descriptions(&mut entity, report).await;
        }
        entity.updated_at = stamp;
        self.store.upsert_entity(key, entity).await?;

        if created {
            report.entities_created += 1;
        } else {
            report.entities_updated += 1;
        }
        Ok(())
    }

    /// Recompute the merged description from the accumulated list.
    async fn merge_descriptions(&self, entity: &mut Entity, report: &mut ResolutionReport) {
        let texts = ordered_texts(&entity.descriptions);
        entity.merge_degraded = false;
        entity.description = match texts.len() {
            0 => String::new(),
            1 => texts[0].clone(),
            n => match &self.summarizer {
                Some(summarizer) if n >= self.config.summarize_threshold => {
                    let name = entity.name.clone();
                    let result = with_retry(&self.config.retry, "summarize", || {
                        summarizer.summarize(&name, &texts)
                    })
                    .await;
                    match result {
                        Ok(summary) => summary,
                        Err(e) => {
                            warn!("Summarizing '{}' failed, using plain merge: {}", name, e);
                            entity.merge_degraded = true;
                            report.merge_failures.push(MergeFailure {
                                entity: name,
                                reason: e.to_string(),
                            });
                            degraded_merge(&texts)
                        }
                    }
                }
                _ => join_descriptions(&texts),
            },
        };
    }

    async fn resolve_relationship(
        &self,
        draft: &RelationshipDraft,
        extraction: &ChunkExtraction,
        stamp: DateTime<Utc>,
        report: &mut ResolutionReport,
    ) -> TemporaResult<()> {
        let policy = &self.config.name_policy;
        let source_key = policy.key(&draft.source);
        let target_key = policy.key(&draft.target);
        let description = draft.description.trim();
        if source_key.is_empty() || target_key.is_empty() {
            debug!("Skipping relationship draft with blank endpoint");
            return Ok(());
        }

        let _guards = self
            .locks
            .lock_all(&[source_key.as_str(), target_key.as_str()])
            .await;

        let source = self
            .ensure_endpoint(&source_key, &draft.source, description, extraction, stamp, report)
            .await?;
        let target = if target_key == source_key {
            source.clone()
        } else {
            self.ensure_endpoint(&target_key, &draft.target, description, extraction, stamp, report)
                .await?
        };

        let fingerprint = relationship_fingerprint(&source_key, &target_key, description);
        let known = self
            .store
            .relationships_between(&source_key, &target_key)
            .await?
            .iter()
            .any(|r| relationship_fingerprint(&source_key, &target_key, &r.description) == fingerprint);
        if known {
            report.relationships_unchanged += 1;
            return Ok(());
        }

        let keywords = draft
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let relationship = Relationship {
            source,
            target,
            description: description.to_string(),
            relationship_type: draft.relationship_type.clone(),
            temporal_relation: draft.temporal_relation.clone(),
            strength: draft.strength,
            keywords,
            created_at: stamp,
            source_id: extraction.source_id.clone(),
            file_path: extraction.file_path.clone(),
        };
        self.store
            .upsert_relationship(&source_key, &target_key, relationship)
            .await?;
        report.relationships_added += 1;
        Ok(())
    }

    /// Display name of the entity under `key`, creating it when absent.
    /// Caller holds the key lock.
    async fn ensure_endpoint(
        &self,
        key: &str,
        raw_name: &str,
        description: &str,
        extraction: &ChunkExtraction,
        stamp: DateTime<Utc>,
        report: &mut ResolutionReport,
    ) -> TemporaResult<String> {
        if let Some(entity) = self.store.get_entity(key).await? {
            return Ok(entity.name);
        }
        let name = self.config.name_policy.display(raw_name);
        let mut entity = Entity::new(
            name.clone(),
            UNKNOWN_ENTITY_TYPE,
            DescriptionEntry::new(description, &extraction.source_id, extraction.acquired_at),
        );
        if description.is_empty() {
            entity.descriptions.clear();
        }
        entity.created_at = stamp;
        entity.updated_at = stamp;
        self.store.upsert_entity(key, entity).await?;
        report.endpoints_created += 1;
        Ok(name)
    }
}
