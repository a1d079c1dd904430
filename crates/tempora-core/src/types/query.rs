//! Query-side types: keyword tiers, modes, response shapes and retrieved evidence.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use super::chunk::StoredChunk;
use super::graph::{Entity, Relationship, TemporalSequence};

/// Keywords derived from a query, split into three tiers.
///
/// All three tiers are always present; any may be empty. The same term may
/// appear in more than one tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryKeywords {
    /// Overarching concepts or themes.
    pub high_level: Vec<String>,
    /// Specific entities, details or concrete terms.
    pub low_level: Vec<String>,
    /// Time periods, dates or temporal concepts.
    pub temporal: Vec<String>,
}

impl QueryKeywords {
    /// Whether every tier is empty.
    pub fn is_empty(&self) -> bool {
        self.high_level.is_empty() && self.low_level.is_empty() && self.temporal.is_empty()
    }

    /// All keywords, high level first, without duplicates.
    pub fn all(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.high_level
            .iter()
            .chain(&self.low_level)
            .chain(&self.temporal)
            .map(String::as_str)
            .filter(|k| seen.insert(k.to_lowercase()))
            .collect()
    }
}

/// Which part of the graph a query is answered from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Low-level keywords matched against entities.
    Local,
    /// High-level keywords matched against relationships.
    Global,
    /// Local and global combined.
    #[default]
    Hybrid,
    /// Document chunks only.
    Naive,
}

impl QueryMode {
    /// All mode names.
    pub fn all_names() -> Vec<&'static str> {
        Self::iter().map(|m| m.into()).collect()
    }

    /// Whether graph elements are retrieved in this mode.
    pub fn uses_graph(&self) -> bool {
        !matches!(self, Self::Naive)
    }
}

/// Requested format and length of the final answer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    #[strum(serialize = "Single Line")]
    SingleLine,
    #[strum(serialize = "Single Paragraph")]
    SingleParagraph,
    #[default]
    #[strum(serialize = "Multiple Paragraphs")]
    MultipleParagraphs,
    #[strum(serialize = "Bullet Points")]
    Bullets,
}

impl ResponseType {
    /// Parse free text such as "single line" or "Bullet Points".
    pub fn from_str_flexible(s: &str) -> Option<Self> {
        let normalized: String = s
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match normalized.as_str() {
            "singleline" | "oneline" | "line" => Some(Self::SingleLine),
            "singleparagraph" | "oneparagraph" | "paragraph" => Some(Self::SingleParagraph),
            "multipleparagraphs" | "multiparagraph" | "paragraphs" => {
                Some(Self::MultipleParagraphs)
            }
            "bullets" | "bulletpoints" | "bulletlist" | "list" => Some(Self::Bullets),
            _ => None,
        }
    }
}

/// Retrieval parameters handed to the graph store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    pub mode: QueryMode,
    /// Upper bound on each retrieved list.
    pub top_k: usize,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            mode: QueryMode::Hybrid,
            top_k: 5,
        }
    }
}

/// Evidence returned by retrieval, each list in rank order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub chunks: Vec<StoredChunk>,
    /// Timeline context for retrieved entities.
    #[serde(default)]
    pub temporal_sequences: Vec<TemporalSequence>,
}

impl RetrievedContext {
    /// No entity, relationship or chunk was retrieved.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty() && self.chunks.is_empty()
    }

    /// Total number of evidence items.
    pub fn len(&self) -> usize {
        self.entities.len() + self.relationships.len() + self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_query_mode_parse() {
        assert_eq!(QueryMode::from_str("hybrid").unwrap(), QueryMode::Hybrid);
        assert_eq!(QueryMode::from_str("Naive").unwrap(), QueryMode::Naive);
        assert!(QueryMode::from_str("mix").is_err());
        assert_eq!(QueryMode::default().to_string(), "hybrid");
        assert_eq!(QueryMode::all_names().len(), 4);
    }

    #[test]
    fn test_response_type_flexible() {
        assert_eq!(
            ResponseType::from_str_flexible("single line"),
            Some(ResponseType::SingleLine)
        );
        assert_eq!(
            ResponseType::from_str_flexible("Multiple Paragraphs"),
            Some(ResponseType::MultipleParagraphs)
        );
        assert_eq!(
            ResponseType::from_str_flexible("Bullet Points"),
            Some(ResponseType::Bullets)
        );
        assert_eq!(ResponseType::from_str_flexible("haiku"), None);
        assert_eq!(ResponseType::Bullets.to_string(), "Bullet Points");
    }

    #[test]
    fn test_keywords_all_dedups_across_tiers() {
        let keywords = QueryKeywords {
            high_level: vec!["Athletics".into()],
            low_level: vec!["Noah Carter".into(), "athletics".into()],
            temporal: vec!["2024".into()],
        };
        assert_eq!(keywords.all(), vec!["Athletics", "Noah Carter", "2024"]);
        assert!(!keywords.is_empty());
        assert!(QueryKeywords::default().is_empty());
    }

    #[test]
    fn test_empty_context() {
        assert!(RetrievedContext::default().is_empty());
        assert_eq!(RetrievedContext::default().len(), 0);
    }
}
