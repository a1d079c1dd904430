//! Candidate records recovered from one extraction pass.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::TemporalRelation;

/// Entity mention as extracted, before resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDraft {
    pub name: String,
    pub entity_type: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_context: Option<String>,
}

/// Relationship mention as extracted, before resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDraft {
    pub source: String,
    pub target: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_relation: Option<TemporalRelation>,
    pub keywords: Vec<String>,
    pub strength: f64,
    /// The strength field did not parse and was replaced by `0.0`.
    #[serde(default)]
    pub strength_defaulted: bool,
}

/// Ordered group of entities forming a temporal sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalSequenceDraft {
    pub name: String,
    pub entities: Vec<String>,
    pub description: String,
}

/// One record of the extraction grammar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateRecord {
    Entity(EntityDraft),
    Relationship(RelationshipDraft),
    TemporalSequence(TemporalSequenceDraft),
    ContentKeywords { keywords: Vec<String> },
}

/// Why a record was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyKind {
    /// First field is not a known record tag.
    UnrecognizedTag { tag: String },
    /// Fewer fields than the record layout requires.
    TooFewFields {
        tag: String,
        expected: usize,
        found: usize,
    },
    /// A relationship with a field count matching neither layout.
    AmbiguousLayout { found: usize },
    /// A required field is present but blank.
    EmptyField { tag: String, field: String },
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedTag { tag } => write!(f, "unrecognized tag '{}'", tag),
            Self::TooFewFields {
                tag,
                expected,
                found,
            } => write!(
                f,
                "{} record has {} fields, needs {}",
                tag, found, expected
            ),
            Self::AmbiguousLayout { found } => {
                write!(f, "relationship record has {} fields", found)
            }
            Self::EmptyField { tag, field } => write!(f, "{} record has empty {}", tag, field),
        }
    }
}

/// A dropped record and the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseAnomaly {
    /// Raw record text after trimming.
    pub raw: String,
    pub kind: AnomalyKind,
}

/// Result of parsing one or more extraction blobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseOutcome {
    /// Well-formed records in blob order.
    pub records: Vec<CandidateRecord>,
    /// One entry per dropped record.
    pub anomalies: Vec<ParseAnomaly>,
    /// Relationships kept with a defaulted strength.
    pub strength_defaulted: usize,
}

impl ParseOutcome {
    /// Entity drafts in order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityDraft> {
        self.records.iter().filter_map(|r| match r {
            CandidateRecord::Entity(e) => Some(e),
            _ => None,
        })
    }

    /// Relationship drafts in order.
    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipDraft> {
        self.records.iter().filter_map(|r| match r {
            CandidateRecord::Relationship(rel) => Some(rel),
            _ => None,
        })
    }

    /// Temporal sequence drafts in order.
    pub fn temporal_sequences(&self) -> impl Iterator<Item = &TemporalSequenceDraft> {
        self.records.iter().filter_map(|r| match r {
            CandidateRecord::TemporalSequence(s) => Some(s),
            _ => None,
        })
    }

    /// All content keywords, in order of first appearance.
    pub fn content_keywords(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for record in &self.records {
            if let CandidateRecord::ContentKeywords { keywords } = record {
                for k in keywords {
                    if !out.contains(k) {
                        out.push(k.clone());
                    }
                }
            }
        }
        out
    }

    /// Append another outcome (a later gleaning pass).
    pub fn extend(&mut self, other: ParseOutcome) {
        self.records.extend(other.records);
        self.anomalies.extend(other.anomalies);
        self.strength_defaulted += other.strength_defaulted;
    }

    /// Whether no record was recovered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
