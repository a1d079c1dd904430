//! Delimited record grammar emitted by the extraction model.
//!
//! A blob is a list of records separated by the record delimiter and ended by
//! the completion marker. Each record is a tuple of fields separated by the
//! tuple delimiter, optionally wrapped in parentheses, with each field
//! optionally wrapped in double quotes:
//!
//! ```text
//! ("entity"<|>"Tokyo"<|>"geo"<|>"Host city of the championship.")##
//! ("relationship"<|>"Noah Carter"<|>"Tokyo"<|>"Raced in Tokyo."<|>"competition"<|>8)##
//! <|COMPLETE|>
//! ```

use tracing::debug;

use super::records::{
    AnomalyKind, CandidateRecord, EntityDraft, ParseAnomaly, ParseOutcome, RelationshipDraft,
    TemporalSequenceDraft,
};
use crate::config::ExtractionConfig;
use crate::types::TemporalRelation;

const ENTITY_FIELDS: usize = 4;
const RELATIONSHIP_SHORT_FIELDS: usize = 6;
const RELATIONSHIP_FULL_FIELDS: usize = 8;
const SEQUENCE_FIELDS: usize = 4;
const KEYWORDS_FIELDS: usize = 2;

/// Value used when a relationship strength does not parse.
pub const DEFAULT_STRENGTH: f64 = 0.0;

/// Parser for one delimiter configuration.
#[derive(Debug, Clone)]
pub struct RecordParser {
    tuple_delimiter: String,
    record_delimiter: String,
    completion_delimiter: String,
}

impl RecordParser {
    /// Create a parser using the delimiters of `config`.
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            tuple_delimiter: config.tuple_delimiter.clone(),
            record_delimiter: config.record_delimiter.clone(),
            completion_delimiter: config.completion_delimiter.clone(),
        }
    }

    /// Parse one blob. Never fails; dropped records are reported as anomalies.
    pub fn parse(&self, blob: &str) -> ParseOutcome {
        let body = blob
            .split(self.completion_delimiter.as_str())
            .next()
            .unwrap_or_default();

        let mut outcome = ParseOutcome::default();
        for segment in body.split(self.record_delimiter.as_str()) {
            let raw = segment.trim();
            if raw.is_empty() {
                continue;
            }
            match self.parse_record(raw) {
                Ok(record) => {
                    if let CandidateRecord::Relationship(rel) = &record {
                        if rel.strength_defaulted {
                            outcome.strength_defaulted += 1;
                        }
                    }
                    outcome.records.push(record);
                }
                Err(kind) => {
                    debug!("Dropping extraction record ({}): {}", kind, raw);
                    outcome.anomalies.push(ParseAnomaly {
                        raw: raw.to_string(),
                        kind,
                    });
                }
            }
        }
        outcome
    }

    fn parse_record(&self, raw: &str) -> Result<CandidateRecord, AnomalyKind> {
        let inner = strip_parens(raw);
        let fields: Vec<String> = inner
            .split(self.tuple_delimiter.as_str())
            .map(clean_field)
            .collect();

        let tag = fields[0].to_lowercase();
        match tag.as_str() {
            "entity" => parse_entity(&fields),
            "relationship" => parse_relationship(&fields),
            "temporal_sequence" => parse_sequence(&fields),
            "content_keywords" => parse_content_keywords(&fields),
            _ => Err(AnomalyKind::UnrecognizedTag { tag }),
        }
    }
}

impl Default for RecordParser {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

fn strip_parens(raw: &str) -> &str {
    let s = raw.trim();
    match (s.strip_prefix('('), s.strip_suffix(')')) {
        (Some(_), Some(_)) if s.len() >= 2 => &s[1..s.len() - 1],
        _ => s,
    }
}

fn clean_field(field: &str) -> String {
    let s = field.trim();
    let s = s
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(s);
    s.trim().to_string()
}

fn require(fields: &[String], tag: &str, expected: usize) -> Result<(), AnomalyKind> {
    if fields.len() < expected {
        return Err(AnomalyKind::TooFewFields {
            tag: tag.to_string(),
            expected,
            found: fields.len(),
        });
    }
    Ok(())
}

fn non_empty(value: &str, tag: &str, field: &str) -> Result<String, AnomalyKind> {
    if value.is_empty() {
        return Err(AnomalyKind::EmptyField {
            tag: tag.to_string(),
            field: field.to_string(),
        });
    }
    Ok(value.to_string())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn optional(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_strength(value: &str) -> (f64, bool) {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => (v, false),
        _ => (DEFAULT_STRENGTH, true),
    }
}

fn parse_entity(fields: &[String]) -> Result<CandidateRecord, AnomalyKind> {
    require(fields, "entity", ENTITY_FIELDS)?;
    let name = non_empty(&fields[1], "entity", "name")?;
    let entity_type = if fields[2].is_empty() {
        "unknown".to_string()
    } else {
        fields[2].to_lowercase()
    };
    Ok(CandidateRecord::Entity(EntityDraft {
        name,
        entity_type,
        description: fields[3].clone(),
        temporal_context: optional(fields.get(4)),
    }))
}

fn parse_relationship(fields: &[String]) -> Result<CandidateRecord, AnomalyKind> {
    require(fields, "relationship", RELATIONSHIP_SHORT_FIELDS)?;

    // Field positions after source, target and description.
    let (relationship_type, temporal_relation, keywords, strength) = match fields.len() {
        RELATIONSHIP_SHORT_FIELDS => (None, None, &fields[4], &fields[5]),
        n if n >= RELATIONSHIP_FULL_FIELDS => (
            optional(fields.get(4)),
            TemporalRelation::from_str_flexible(&fields[5]),
            &fields[6],
            &fields[7],
        ),
        n => return Err(AnomalyKind::AmbiguousLayout { found: n }),
    };

    let source = non_empty(&fields[1], "relationship", "source")?;
    let target = non_empty(&fields[2], "relationship", "target")?;
    let (strength, strength_defaulted) = parse_strength(strength);

    Ok(CandidateRecord::Relationship(RelationshipDraft {
        source,
        target,
        description: fields[3].clone(),
        relationship_type,
        temporal_relation,
        keywords: split_list(keywords),
        strength,
        strength_defaulted,
    }))
}

fn parse_sequence(fields: &[String]) -> Result<CandidateRecord, AnomalyKind> {
    require(fields, "temporal_sequence", SEQUENCE_FIELDS)?;
    let name = non_empty(&fields[1], "temporal_sequence", "name")?;
    let entities = split_list(&fields[2]);
    if entities.is_empty() {
        return Err(AnomalyKind::EmptyField {
            tag: "temporal_sequence".to_string(),
            field: "entities".to_string(),
        });
    }
    Ok(CandidateRecord::TemporalSequence(TemporalSequenceDraft {
        name,
        entities,
        description: fields[3].clone(),
    }))
}

fn parse_content_keywords(fields: &[String]) -> Result<CandidateRecord, AnomalyKind> {
    require(fields, "content_keywords", KEYWORDS_FIELDS)?;
    let keywords = split_list(&fields[1]);
    if keywords.is_empty() {
        return Err(AnomalyKind::EmptyField {
            tag: "content_keywords".to_string(),
            field: "keywords".to_string(),
        });
    }
    Ok(CandidateRecord::ContentKeywords { keywords })
}
