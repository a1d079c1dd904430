//! Settling disagreeing relationships between the same pair of entities.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strum::Display;

use super::evidence::{Citation, EvidenceItem};
use crate::temporal::{extract_markers, TemporalMarker};

/// When two relationships on the same endpoints disagree, and which
/// signals settle a contradiction.
///
/// Differently worded relationships only compete when they make the same
/// kind of claim: one negates the other, or they share a relationship type
/// and either enough keywords or a differing temporal relation. Anything
/// else is a separate fact and both are kept. Competing facts dated to
/// different start days are a change over time and both are kept.
/// Otherwise one is dropped: the one farther from the query timeframe, then
/// the less specific one, then the one acquired earlier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictPolicy {
    /// Prefer the fact closest to the dates in the query.
    pub use_query_timeframe: bool,
    /// Prefer the more precisely dated fact.
    pub prefer_specific: bool,
    /// Prefer the fact acquired last.
    pub prefer_recent: bool,
    /// Share of keywords (intersection over union) from which two
    /// relationships of one type make the same claim.
    pub min_keyword_overlap: f64,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self {
            use_query_timeframe: true,
            prefer_specific: true,
            prefer_recent: true,
            min_keyword_overlap: 0.5,
        }
    }
}

/// How a disagreement was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disagreement {
    /// Both facts hold at different times.
    Transition,
    /// Only one fact can be kept.
    Contradiction,
}

/// Why a contradicting fact lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SupersededReason {
    QueryTimeframe,
    Specificity,
    Recency,
    /// No signal applied; the better-ranked fact was kept.
    Rank,
}

/// A fact dropped from an answer in favour of another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Superseded {
    /// Text of the dropped fact.
    pub dropped: String,
    pub dropped_citation: Citation,
    /// Text of the fact that was kept.
    pub kept: String,
    pub reason: SupersededReason,
}

/// Periods named by the query's temporal keywords.
pub fn query_timeframe<S: AsRef<str>>(temporal_keywords: &[S]) -> Vec<TemporalMarker> {
    temporal_keywords
        .iter()
        .flat_map(|k| extract_markers(k.as_ref()))
        .collect()
}

const NEGATIONS: &[&str] = &["not", "never", "no", "former", "formerly", "ex"];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "in", "on", "at", "for", "to", "by", "with", "as", "and", "is",
    "are", "was", "were", "be", "been", "has", "have", "had", "its", "his", "her", "their",
    "longer",
];

fn normalized(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace("n't", " not")
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn negated(text: &str) -> bool {
    words(text).iter().any(|w| NEGATIONS.contains(&w.as_str()))
}

/// Words carrying the claim: no stopwords, negations, numbers or endpoint names.
fn claim_words(text: &str, pair: &(String, String)) -> Vec<String> {
    let mut names = words(&pair.0);
    names.extend(words(&pair.1));
    let mut out: Vec<String> = words(text)
        .into_iter()
        .filter(|w| {
            !STOPWORDS.contains(&w.as_str())
                && !NEGATIONS.contains(&w.as_str())
                && !w.chars().all(|c| c.is_ascii_digit())
                && !names.contains(w)
        })
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Intersection over union; zero when either side is empty.
fn overlap(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.iter().filter(|x| b.contains(x)).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

impl ConflictPolicy {
    /// Whether two relationships on one pair make the same claim.
    fn competing(&self, a: &EvidenceItem, b: &EvidenceItem) -> bool {
        let (Some(x), Some(y)) = (a.relation.as_ref(), b.relation.as_ref()) else {
            return false;
        };
        if x.pair != y.pair {
            return false;
        }
        if negated(&a.text) != negated(&b.text) {
            let shared = overlap(&claim_words(&a.text, &x.pair), &claim_words(&b.text, &y.pair));
            if shared >= self.min_keyword_overlap {
                return true;
            }
        }
        if x.relationship_type != y.relationship_type {
            return false;
        }
        match (&x.temporal_relation, &y.temporal_relation) {
            (Some(p), Some(q)) if p != q => true,
            _ => overlap(&x.keywords, &y.keywords) >= self.min_keyword_overlap,
        }
    }

    /// Classify two items, or `None` when they do not disagree.
    pub fn classify(&self, a: &EvidenceItem, b: &EvidenceItem) -> Option<Disagreement> {
        if normalized(&a.text) == normalized(&b.text) || !self.competing(a, b) {
            return None;
        }
        match (&a.marker, &b.marker) {
            (Some(m), Some(n)) if m.start != n.start => Some(Disagreement::Transition),
            _ => Some(Disagreement::Contradiction),
        }
    }

    /// Ordering of two contradicting facts: `Greater` means `a` wins.
    fn judge(
        &self,
        a: &EvidenceItem,
        b: &EvidenceItem,
        timeframe: &[TemporalMarker],
    ) -> (Ordering, SupersededReason) {
        if self.use_query_timeframe && !timeframe.is_empty() {
            let distance = |item: &EvidenceItem| {
                item.marker
                    .as_ref()
                    .map(|m| timeframe.iter().map(|q| m.distance_days(q)).min().unwrap_or(i64::MAX))
                    .unwrap_or(i64::MAX)
            };
            // Closer is better, so compare reversed.
            let ord = distance(b).cmp(&distance(a));
            if ord != Ordering::Equal {
                return (ord, SupersededReason::QueryTimeframe);
            }
        }
        if self.prefer_specific {
            let precision = |item: &EvidenceItem| item.marker.as_ref().map(|m| m.precision);
            let ord = precision(a).cmp(&precision(b));
            if ord != Ordering::Equal {
                return (ord, SupersededReason::Specificity);
            }
        }
        if self.prefer_recent {
            let ord = a.created_at.cmp(&b.created_at);
            if ord != Ordering::Equal {
                return (ord, SupersededReason::Recency);
            }
        }
        // Lower rank is more relevant.
        (b.rank.cmp(&a.rank), SupersededReason::Rank)
    }

    /// Drop the losing side of every contradiction.
    ///
    /// `items` must be in rank order. Items without an endpoint pair are
    /// never affected. Returns the kept items, still in rank order, and the
    /// dropped ones.
    pub fn resolve(
        &self,
        items: Vec<EvidenceItem>,
        timeframe: &[TemporalMarker],
    ) -> (Vec<EvidenceItem>, Vec<Superseded>) {
        let mut kept: Vec<EvidenceItem> = Vec::with_capacity(items.len());
        let mut superseded = Vec::new();

        for item in items {
            let Some(pair) = item.pair().cloned() else {
                kept.push(item);
                continue;
            };
            let mut beaten: Vec<(usize, Superseded)> = Vec::new();
            let mut lost: Option<Superseded> = None;
            for (i, other) in kept.iter().enumerate() {
                if other.pair() != Some(&pair)
                    || self.classify(&item, other) != Some(Disagreement::Contradiction)
                {
                    continue;
                }
                let (ord, reason) = self.judge(&item, other, timeframe);
                if ord == Ordering::Greater {
                    beaten.push((
                        i,
                        Superseded {
                            dropped: other.text.clone(),
                            dropped_citation: other.citation.clone(),
                            kept: item.text.clone(),
                            reason,
                        },
                    ));
                } else {
                    lost = Some(Superseded {
                        dropped: item.text.clone(),
                        dropped_citation: item.citation.clone(),
                        kept: other.text.clone(),
                        reason,
                    });
                    break;
                }
            }
            // A challenger that loses once changes nothing else.
            if let Some(loss) = lost {
                superseded.push(loss);
                continue;
            }
            for (i, loss) in beaten.into_iter().rev() {
                kept.remove(i);
                superseded.push(loss);
            }
            kept.push(item);
        }

        (kept, superseded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::evidence::{CitationSource, EvidenceKind, RelationFacets};
    use crate::temporal::earliest_marker;
    use chrono::{Duration, Utc};

    fn fact(text: &str, rank: usize, acquired_offset_secs: i64) -> EvidenceItem {
        EvidenceItem {
            kind: EvidenceKind::Relationship,
            rank,
            label: "Acme -> Jane Doe".into(),
            text: text.into(),
            theme: "Employment".into(),
            marker: earliest_marker(text),
            created_at: Utc::now() + Duration::seconds(acquired_offset_secs),
            citation: Citation {
                source: CitationSource::Kg,
                id: format!("doc-{}", rank),
            },
            relation: Some(RelationFacets {
                pair: ("acme".into(), "jane doe".into()),
                relationship_type: Some("employment".into()),
                keywords: vec!["leadership".into()],
                temporal_relation: None,
            }),
        }
    }

    fn with_facets(mut item: EvidenceItem, kind: &str, keywords: &[&str]) -> EvidenceItem {
        if let Some(facets) = item.relation.as_mut() {
            facets.relationship_type = Some(kind.into());
            facets.keywords = keywords.iter().map(|k| k.to_string()).collect();
        }
        item
    }

    #[test]
    fn test_dated_disagreement_is_transition() {
        let a = fact("Jane Doe became CEO of Acme in 2019.", 0, 0);
        let b = fact("Jane Doe left Acme in 2023.", 1, 0);
        assert_eq!(ConflictPolicy::default().classify(&a, &b), Some(Disagreement::Transition));

        let (kept, superseded) = ConflictPolicy::default().resolve(vec![a, b], &[]);
        assert_eq!(kept.len(), 2);
        assert!(superseded.is_empty());
    }

    #[test]
    fn test_identical_descriptions_do_not_disagree() {
        let a = fact("Jane Doe leads Acme.", 0, 0);
        let b = fact("jane doe  leads acme.", 1, 0);
        assert_eq!(ConflictPolicy::default().classify(&a, &b), None);
    }

    #[test]
    fn test_complementary_facts_are_both_kept() {
        let raced = with_facets(fact("Jane Doe raced for Acme in Tokyo.", 0, 0), "competition", &["racing"]);
        let coached = with_facets(fact("Jane Doe met her Acme coach in Tokyo.", 1, 60), "competition", &["coaching"]);
        assert_eq!(ConflictPolicy::default().classify(&raced, &coached), None);

        let (kept, superseded) = ConflictPolicy::default().resolve(vec![raced, coached], &[]);
        assert_eq!(kept.len(), 2);
        assert!(superseded.is_empty());
    }

    #[test]
    fn test_relationships_without_keywords_do_not_compete() {
        let a = with_facets(fact("Jane Doe raced in Tokyo for Acme.", 0, 0), "employment", &[]);
        let b = with_facets(fact("Jane Doe met her coach at Acme.", 1, 60), "employment", &[]);
        assert_eq!(ConflictPolicy::default().classify(&a, &b), None);
    }

    #[test]
    fn test_negation_contradicts_across_types() {
        let affirmed = with_facets(fact("Jane Doe is the CEO of Acme.", 0, 0), "employment", &["leadership"]);
        let denied = with_facets(fact("Jane Doe is not the CEO of Acme.", 1, 60), "statement", &["denial"]);
        assert_eq!(
            ConflictPolicy::default().classify(&affirmed, &denied),
            Some(Disagreement::Contradiction)
        );
    }

    #[test]
    fn test_differing_temporal_relation_competes() {
        let mut before = with_facets(fact("Jane Doe advised Acme.", 0, 0), "advisory", &["consulting"]);
        let mut after = with_facets(fact("Jane Doe audited Acme.", 1, 60), "advisory", &["audit"]);
        before.relation.as_mut().unwrap().temporal_relation = Some("before".into());
        after.relation.as_mut().unwrap().temporal_relation = Some("after".into());
        assert_eq!(
            ConflictPolicy::default().classify(&before, &after),
            Some(Disagreement::Contradiction)
        );
    }

    #[test]
    fn test_specific_fact_wins_contradiction() {
        let vague = fact("Jane Doe joined Acme in 2019.", 0, 100);
        let exact = fact("Jane Doe joined Acme on 2019-01-01 as CTO.", 1, 0);
        let (kept, superseded) = ConflictPolicy::default().resolve(vec![vague, exact], &[]);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].text.contains("CTO"));
        assert_eq!(superseded[0].reason, SupersededReason::Specificity);
    }

    #[test]
    fn test_later_acquisition_breaks_tie() {
        let old = fact("Jane Doe is the CEO of Acme.", 0, 0);
        let new = fact("Jane Doe is the chair of Acme.", 1, 60);
        let (kept, superseded) = ConflictPolicy::default().resolve(vec![old, new], &[]);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].text.contains("chair"));
        assert_eq!(superseded[0].reason, SupersededReason::Recency);
        assert!(superseded[0].dropped.contains("CEO"));
    }

    #[test]
    fn test_query_timeframe_outranks_specificity() {
        let near = fact("Jane Doe ran Acme in 2023.", 0, 0);
        let far = fact("Jane Doe ran Acme on 2023-01-01.", 1, 0);
        let timeframe = query_timeframe(&["October 2023"]);
        let (kept, superseded) = ConflictPolicy::default().resolve(vec![far, near], &timeframe);
        // The year overlaps October; the exact day is months away.
        assert_eq!(kept.len(), 1);
        assert!(kept[0].text.ends_with("in 2023."));
        assert_eq!(superseded[0].reason, SupersededReason::QueryTimeframe);
    }

    #[test]
    fn test_disabled_signals_fall_back_to_rank() {
        let policy = ConflictPolicy {
            use_query_timeframe: false,
            prefer_specific: false,
            prefer_recent: false,
            ..Default::default()
        };
        let first = fact("Jane Doe is the CEO of Acme.", 0, 0);
        let second = fact("Jane Doe is the chair of Acme.", 1, 60);
        let (kept, superseded) = policy.resolve(vec![first, second], &[]);
        assert!(kept[0].text.contains("CEO"));
        assert_eq!(superseded[0].reason, SupersededReason::Rank);
    }

    #[test]
    fn test_undated_items_without_pair_are_untouched() {
        let mut chunk = fact("Jane Doe is the CEO of Acme.", 0, 0);
        chunk.relation = None;
        let rel = fact("Jane Doe is the chair of Acme.", 1, 0);
        let (kept, superseded) = ConflictPolicy::default().resolve(vec![chunk, rel], &[]);
        assert_eq!(kept.len(), 2);
        assert!(superseded.is_empty());
    }
}
