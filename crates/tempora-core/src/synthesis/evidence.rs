//! Retrieved context flattened into ranked evidence items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::resolution::NamePolicy;
use crate::temporal::{earliest_marker, TemporalMarker};
use crate::types::{Entity, QueryMode, Relationship, RetrievedContext, StoredChunk, TemporalRelation};

/// Heading used for undated chunks.
pub const DOCUMENTS_THEME: &str = "Documents";

const CHUNK_TEXT_PREFIX: &str = "Chunk Text:";

/// Which store a cited item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CitationSource {
    /// Knowledge graph: entities and relationships.
    Kg,
    /// Document chunks.
    Dc,
}

/// One reference line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub source: CitationSource,
    /// File path, URL or identifier.
    pub id: String,
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.source {
            CitationSource::Kg => "KG",
            CitationSource::Dc => "DC",
        };
        write!(f, "[{}] {}", tag, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceKind {
    Entity,
    Relationship,
    Chunk,
}

/// What a relationship claims, for spotting disagreements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationFacets {
    /// Unordered endpoint keys under the resolver's name policy.
    pub pair: (String, String),
    /// Lower-cased relationship type.
    pub relationship_type: Option<String>,
    /// Lower-cased keywords.
    pub keywords: Vec<String>,
    pub temporal_relation: Option<String>,
}

/// A retrieved item with everything composition needs.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceItem {
    pub kind: EvidenceKind,
    /// Relevance rank across all lists, 0 is most relevant.
    pub rank: usize,
    /// Short label: entity name, `source -> target` or document title.
    pub label: String,
    /// Evidence text the answer may quote.
    pub text: String,
    /// Grouping for undated items.
    pub theme: String,
    /// Earliest explicit date or period, when anchored.
    pub marker: Option<TemporalMarker>,
    pub created_at: DateTime<Utc>,
    pub citation: Citation,
    /// Set for relationships.
    pub relation: Option<RelationFacets>,
}

impl EvidenceItem {
    pub fn is_anchored(&self) -> bool {
        self.marker.is_some()
    }

    fn from_entity(entity: &Entity) -> Self {
        let marker = entity
            .temporal_context
            .as_deref()
            .and_then(earliest_marker)
            .or_else(|| earliest_marker(&entity.description));
        Self {
            kind: EvidenceKind::Entity,
            rank: 0,
            label: entity.name.clone(),
            text: entity.description.trim().to_string(),
            theme: title_case(&entity.entity_type),
            marker,
            created_at: entity.created_at,
            citation: Citation {
                source: CitationSource::Kg,
                id: entity.name.clone(),
            },
            relation: None,
        }
    }

    fn from_relationship(relationship: &Relationship, names: &NamePolicy) -> Self {
        let theme = relationship
            .relationship_type
            .as_deref()
            .or(relationship.keywords.first().map(String::as_str))
            .map(title_case)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Relationships".to_string());
        let id = relationship
            .file_path
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| relationship.identity());
        let mut pair = (names.key(&relationship.source), names.key(&relationship.target));
        if pair.1 < pair.0 {
            pair = (pair.1, pair.0);
        }
        let lowered = |s: &str| {
            let s = s.trim().to_lowercase();
            (!s.is_empty()).then_some(s)
        };
        Self {
            kind: EvidenceKind::Relationship,
            rank: 0,
            label: relationship.identity(),
            text: relationship.description.trim().to_string(),
            theme,
            marker: earliest_marker(&relationship.description),
            created_at: relationship.created_at,
            citation: Citation {
                source: CitationSource::Kg,
                id,
            },
            relation: Some(RelationFacets {
                pair,
                relationship_type: relationship.relationship_type.as_deref().and_then(lowered),
                keywords: relationship.keywords.iter().filter_map(|k| lowered(k.as_str())).collect(),
                temporal_relation: relationship.temporal_relation.as_ref().map(TemporalRelation::as_str).and_then(lowered),
            }),
        }
    }

    fn from_chunk(chunk: &StoredChunk) -> Self {
        let body = chunk_body(&chunk.content);
        let label = chunk
            .content
            .lines()
            .find_map(|l| l.strip_prefix("Title:"))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(chunk.chunk_id.as_str())
            .to_string();
        Self {
            kind: EvidenceKind::Chunk,
            rank: 0,
            label,
            marker: earliest_marker(body).or_else(|| earliest_marker(&chunk.content)),
            text: body.to_string(),
            theme: DOCUMENTS_THEME.to_string(),
            created_at: chunk.acquired_at,
            citation: Citation {
                source: CitationSource::Dc,
                id: chunk.citation_id().to_string(),
            },
            relation: None,
        }
    }

    /// Endpoint keys, for relationships.
    pub fn pair(&self) -> Option<&(String, String)> {
        self.relation.as_ref().map(|r| &r.pair)
    }
}

/// The quotable text of a rendered chunk.
pub fn chunk_body(content: &str) -> &str {
    match content.find(CHUNK_TEXT_PREFIX) {
        Some(i) => content[i + CHUNK_TEXT_PREFIX.len()..].trim(),
        None => content.trim(),
    }
}

fn title_case(s: &str) -> String {
    let s = s.trim();
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Flatten retrieved lists into evidence, interleaving them by rank.
///
/// In naive mode only chunks are used. Items with blank text are skipped.
/// Relationship endpoints are keyed with `names`.
pub fn collect_evidence(
    context: &RetrievedContext,
    mode: QueryMode,
    names: &NamePolicy,
) -> Vec<EvidenceItem> {
    let mut lists: Vec<Vec<EvidenceItem>> = Vec::with_capacity(3);
    if mode.uses_graph() {
        lists.push(context.entities.iter().map(EvidenceItem::from_entity).collect());
        lists.push(
            context
                .relationships
                .iter()
                .map(|r| EvidenceItem::from_relationship(r, names))
                .collect(),
        );
    }
    lists.push(context.chunks.iter().map(EvidenceItem::from_chunk).collect());

    let longest = lists.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = Vec::new();
    for i in 0..longest {
        for list in &lists {
            if let Some(item) = list.get(i) {
                if !item.text.is_empty() {
                    let mut item = item.clone();
                    item.rank = out.len();
                    out.push(item);
                }
            }
        }
    }
    out
}
