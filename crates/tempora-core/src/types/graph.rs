//! Canonical graph elements as persisted by a graph store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One raw description contributed to an entity by one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionEntry {
    /// Description text as extracted.
    pub text: String,
    /// Chunk or document the description came from.
    pub source_id: String,
    /// When the description was acquired.
    pub acquired_at: DateTime<Utc>,
}

impl DescriptionEntry {
    /// Create a new description entry.
    pub fn new(
        text: impl Into<String>,
        source_id: impl Into<String>,
        acquired_at: DateTime<Utc>,
    ) -> Self {
        Self {
            text: text.into(),
            source_id: source_id.into(),
            acquired_at,
        }
    }
}

/// Canonical entity node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Display name (first-seen spelling).
    pub name: String,
    /// Entity type as extracted. Open set, stored as free text.
    pub entity_type: String,
    /// Merged description.
    pub description: String,
    /// Timeframe for date entities or time-bound events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_context: Option<String>,
    /// Every raw description accumulated for this entity.
    #[serde(default)]
    pub descriptions: Vec<DescriptionEntry>,
    /// Sources that mentioned this entity.
    #[serde(default)]
    pub source_ids: Vec<String>,
    /// Set when the last merge fell back to concatenation.
    #[serde(default)]
    pub merge_degraded: bool,
    /// First acquisition time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Create an entity from its first mention.
    pub fn new(
        name: impl Into<String>,
        entity_type: impl Into<String>,
        first: DescriptionEntry,
    ) -> Self {
        let created_at = first.acquired_at;
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            description: first.text.clone(),
            temporal_context: None,
            source_ids: vec![first.source_id.clone()],
            descriptions: vec![first],
            merge_degraded: false,
            created_at,
            updated_at: created_at,
        }
    }

    /// Set the temporal context.
    pub fn with_temporal_context(mut self, context: impl Into<String>) -> Self {
        self.temporal_context = Some(context.into());
        self
    }

    /// Whether this entity already holds the given description from the given source.
    pub fn has_description(&self, text: &str, source_id: &str) -> bool {
        self.descriptions
            .iter()
            .any(|d| d.text == text && d.source_id == source_id)
    }
}

/// Temporal relation between the endpoints of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalRelation {
    Before,
    After,
    During,
    Simultaneous,
    /// Anything else the extraction model produced, kept verbatim.
    Other(String),
}

impl TemporalRelation {
    /// Parse with flexible matching. Blank or "n/a" style values yield `None`.
    pub fn from_str_flexible(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "" | "n/a" | "na" | "none" | "null" | "unknown" => None,
            "before" | "prior to" | "preceded" | "precedes" | "earlier than" => Some(Self::Before),
            "after" | "following" | "followed" | "follows" | "later than" | "subsequent to" => {
                Some(Self::After)
            }
            "during" | "within" | "while" | "throughout" => Some(Self::During),
            "simultaneous" | "simultaneous with" | "simultaneously" | "concurrent"
            | "concurrent with" | "at the same time" => Some(Self::Simultaneous),
            _ => Some(Self::Other(s.trim().to_string())),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Before => "before",
            Self::After => "after",
            Self::During => "during",
            Self::Simultaneous => "simultaneous",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for TemporalRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Directed relationship between two canonical entities.
///
/// Several relationships may exist between the same pair; each is a distinct
/// fact acquired at `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source entity display name.
    pub source: String,
    /// Target entity display name.
    pub target: String,
    /// Why the entities are related.
    pub description: String,
    /// Free-form category (causal, temporal, spatial, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_relation: Option<TemporalRelation>,
    /// Association strength, higher is stronger.
    pub strength: f64,
    /// Theme tokens in extraction order.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// When this fact was acquired (not when the event happened).
    pub created_at: DateTime<Utc>,
    /// Chunk the fact came from.
    pub source_id: String,
    /// Originating file path or URL, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl Relationship {
    /// Identifier used in citations when no file path is known.
    pub fn identity(&self) -> String {
        format!("{} -> {}", self.source, self.target)
    }
}

/// Ordered group of entities forming a temporal sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalSequence {
    pub name: String,
    /// Entity names in temporal order.
    pub entities: Vec<String>,
    pub description: String,
    pub source_id: String,
}

/// High-level thematic tokens for one source document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentKeywordSet {
    pub source_id: String,
    /// Unordered; kept sorted for stable comparison.
    pub keywords: std::collections::BTreeSet<String>,
}

impl ContentKeywordSet {
    /// Create from keyword tokens.
    pub fn new(source_id: impl Into<String>, keywords: impl IntoIterator<Item = String>) -> Self {
        Self {
            source_id: source_id.into(),
            keywords: keywords.into_iter().collect(),
        }
    }
}

/// Full snapshot of a graph, used for persistence and equality checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Entities ordered by canonical key.
    pub entities: Vec<Entity>,
    /// Relationships in insertion order.
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub temporal_sequences: Vec<TemporalSequence>,
    #[serde(default)]
    pub content_keywords: Vec<ContentKeywordSet>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporal_relation_from_str_flexible() {
        assert_eq!(
            TemporalRelation::from_str_flexible("Before"),
            Some(TemporalRelation::Before)
        );
        assert_eq!(
            TemporalRelation::from_str_flexible("simultaneous with"),
            Some(TemporalRelation::Simultaneous)
        );
        assert_eq!(
            TemporalRelation::from_str_flexible("prior-to"),
            Some(TemporalRelation::Before)
        );
        assert_eq!(TemporalRelation::from_str_flexible("  "), None);
        assert_eq!(TemporalRelation::from_str_flexible("N/A"), None);
        assert_eq!(
            TemporalRelation::from_str_flexible("three months before"),
            Some(TemporalRelation::Other("three months before".to_string()))
        );
    }

    #[test]
    fn test_entity_has_description() {
        let now = Utc::now();
        let entity = Entity::new(
            "Tokyo",
            "geo",
            DescriptionEntry::new("Host city.", "chunk-1", now),
        );
        assert!(entity.has_description("Host city.", "chunk-1"));
        assert!(!entity.has_description("Host city.", "chunk-2"));
        assert_eq!(entity.created_at, entity.updated_at);
    }
}
