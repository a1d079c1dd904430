//! Keyword scoring over the in-memory graph.
//!
//! Matching is case-insensitive substring containment. Temporal keywords
//! only boost items that already matched their own tier.

use std::collections::{HashMap, HashSet};

use ordered_float::OrderedFloat;
use petgraph::graph::{EdgeIndex, NodeIndex};

use tempora_core::types::{
    Entity, QueryKeywords, QueryMode, QueryParams, Relationship, RetrievedContext, StoredChunk,
};

use super::graph::KnowledgeGraph;
use super::StoreState;

const EXACT_NAME: f64 = 3.0;
const PARTIAL_NAME: f64 = 2.0;
const EXACT_KEYWORD: f64 = 3.0;
const PARTIAL_KEYWORD: f64 = 2.0;
const IN_TEXT: f64 = 1.0;
const TEMPORAL_BOOST: f64 = 0.5;

/// Lowercased, trimmed, deduplicated terms.
fn terms(keywords: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty() && seen.insert(k.clone()))
        .collect()
}

fn count_in(text: &str, terms: &[String]) -> usize {
    let text = text.to_lowercase();
    terms.iter().filter(|t| text.contains(t.as_str())).count()
}

/// Relevance of an entity to low-level terms.
pub(crate) fn entity_score(entity: &Entity, low: &[String], temporal: &[String]) -> f64 {
    let name = entity.name.to_lowercase();
    let description = entity.description.to_lowercase();
    let base: f64 = low
        .iter()
        .map(|term| {
            if name == *term {
                EXACT_NAME
            } else if name.contains(term.as_str()) {
                PARTIAL_NAME
            } else if description.contains(term.as_str()) {
                IN_TEXT
            } else {
                0.0
            }
        })
        .sum();
    if base == 0.0 {
        return 0.0;
    }
    let context = entity.temporal_context.as_deref().unwrap_or("");
    let dated = temporal
        .iter()
        .filter(|t| description.contains(t.as_str()) || context.to_lowercase().contains(t.as_str()))
        .count();
    base + dated as f64 * TEMPORAL_BOOST
}

/// Relevance of a relationship to high-level terms.
pub(crate) fn relationship_score(rel: &Relationship, high: &[String], temporal: &[String]) -> f64 {
    let keywords: Vec<String> = rel.keywords.iter().map(|k| k.to_lowercase()).collect();
    let description = rel.description.to_lowercase();
    let kind = rel.relationship_type.as_deref().unwrap_or("").to_lowercase();
    let base: f64 = high
        .iter()
        .map(|term| {
            if keywords.iter().any(|k| k == term) {
                EXACT_KEYWORD
            } else if keywords.iter().any(|k| k.contains(term.as_str())) {
                PARTIAL_KEYWORD
            } else if description.contains(term.as_str()) || kind.contains(term.as_str()) {
                IN_TEXT
            } else {
                0.0
            }
        })
        .sum();
    if base == 0.0 {
        return 0.0;
    }
    base + count_in(&rel.description, temporal) as f64 * TEMPORAL_BOOST
}

/// Entities matching the low-level terms, best first. Ties go to the
/// better-connected entity, then the smaller key.
fn rank_entities(graph: &KnowledgeGraph, low: &[String], temporal: &[String]) -> Vec<NodeIndex> {
    let mut scored: Vec<(OrderedFloat<f64>, usize, &str, NodeIndex)> = graph
        .nodes()
        .filter_map(|(idx, node)| {
            let score = entity_score(&node.entity, low, temporal);
            (score > 0.0).then(|| (OrderedFloat(score), graph.degree(idx), node.key.as_str(), idx))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)).then(a.2.cmp(b.2)));
    scored.into_iter().map(|(_, _, _, idx)| idx).collect()
}

/// Relationships matching the high-level terms, best first. Ties go to
/// the stronger relationship, then the older edge.
fn rank_relationships(
    graph: &KnowledgeGraph,
    high: &[String],
    temporal: &[String],
) -> Vec<EdgeIndex> {
    let mut scored: Vec<(OrderedFloat<f64>, OrderedFloat<f64>, EdgeIndex)> = graph
        .edges()
        .filter_map(|(edge, _, _, rel)| {
            let score = relationship_score(rel, high, temporal);
            (score > 0.0).then_some((OrderedFloat(score), OrderedFloat(rel.strength), edge))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));
    scored.into_iter().map(|(_, _, edge)| edge).collect()
}

/// Relationships touching the given entities, strongest first per entity.
fn neighbor_edges(graph: &KnowledgeGraph, nodes: &[NodeIndex]) -> Vec<EdgeIndex> {
    nodes
        .iter()
        .flat_map(|&idx| {
            let mut edges = graph.incident_edges(idx);
            edges.sort_by_key(|&e| {
                std::cmp::Reverse(OrderedFloat(graph.relationship(e).map_or(0.0, |r| r.strength)))
            });
            edges
        })
        .collect()
}

/// Endpoints of the given relationships, source before target.
fn endpoint_nodes(graph: &KnowledgeGraph, edges: &[EdgeIndex]) -> Vec<NodeIndex> {
    edges
        .iter()
        .filter_map(|&e| graph.endpoints(e))
        .flat_map(|(source, target)| [source, target])
        .collect()
}

/// Alternate between two ranked lists, dropping repeats.
fn interleave_unique<T: Copy + Eq + std::hash::Hash>(first: &[T], second: &[T], limit: usize) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let longest = first.len().max(second.len());
    for i in 0..longest {
        for list in [first, second] {
            if let Some(&item) = list.get(i) {
                if out.len() < limit && seen.insert(item) {
                    out.push(item);
                }
            }
        }
    }
    out
}

fn unique<T: Copy + Eq + std::hash::Hash>(items: &[T], limit: usize) -> Vec<T> {
    interleave_unique(items, &[], limit)
}

/// Chunks cited by the retrieved elements, most cited first.
fn source_chunks(
    state: &StoreState,
    entities: &[&Entity],
    relationships: &[&Relationship],
    limit: usize,
) -> Vec<StoredChunk> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    let sources = entities
        .iter()
        .flat_map(|e| e.source_ids.iter().map(String::as_str))
        .chain(relationships.iter().map(|r| r.source_id.as_str()));
    for (order, source) in sources.enumerate() {
        counts.entry(source).or_insert((0, order)).0 += 1;
    }
    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(id, (count, first))| (id, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .filter_map(|(id, _, _)| state.chunk(id).cloned())
        .take(limit)
        .collect()
}

/// Chunks whose text mentions any keyword, most matches first.
fn matching_chunks(state: &StoreState, keywords: &QueryKeywords, limit: usize) -> Vec<StoredChunk> {
    let all: Vec<String> = keywords.all().into_iter().map(str::to_string).collect();
    let all = terms(&all);
    let mut scored: Vec<(usize, usize, &StoredChunk)> = state
        .chunks
        .iter()
        .enumerate()
        .filter_map(|(i, chunk)| {
            let hits = count_in(&chunk.content, &all);
            (hits > 0).then_some((hits, i, chunk))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, _, chunk)| chunk.clone())
        .collect()
}

/// Retrieve ranked evidence for the keywords in the requested mode.
pub(crate) fn retrieve(
    state: &StoreState,
    keywords: &QueryKeywords,
    params: &QueryParams,
) -> RetrievedContext {
    let limit = params.top_k.max(1);
    if params.mode == QueryMode::Naive {
        return RetrievedContext {
            chunks: matching_chunks(state, keywords, limit),
            ..Default::default()
        };
    }

    let graph = &state.graph;
    let low = terms(&keywords.low_level);
    let high = terms(&keywords.high_level);
    let temporal = terms(&keywords.temporal);

    let (nodes, edges) = match params.mode {
        QueryMode::Local => {
            let nodes = unique(&rank_entities(graph, &low, &temporal), limit);
            let edges = unique(&neighbor_edges(graph, &nodes), limit);
            (nodes, edges)
        }
        QueryMode::Global => {
            let edges = unique(&rank_relationships(graph, &high, &temporal), limit);
            let nodes = unique(&endpoint_nodes(graph, &edges), limit);
            (nodes, edges)
        }
        _ => {
            let local_nodes = unique(&rank_entities(graph, &low, &temporal), limit);
            let global_edges = unique(&rank_relationships(graph, &high, &temporal), limit);
            let nodes =
                interleave_unique(&local_nodes, &endpoint_nodes(graph, &global_edges), limit);
            let edges =
                interleave_unique(&global_edges, &neighbor_edges(graph, &local_nodes), limit);
            (nodes, edges)
        }
    };

    let entities: Vec<&Entity> = nodes
        .iter()
        .filter_map(|&idx| graph.node(idx).map(|n| &n.entity))
        .collect();
    let relationships: Vec<&Relationship> =
        edges.iter().filter_map(|&e| graph.relationship(e)).collect();

    let names: HashSet<String> = entities.iter().map(|e| e.name.to_lowercase()).collect();
    let temporal_sequences = state
        .sequences
        .iter()
        .filter(|s| s.entities.iter().any(|n| names.contains(&n.to_lowercase())))
        .cloned()
        .collect();

    RetrievedContext {
        chunks: source_chunks(state, &entities, &relationships, limit),
        entities: entities.into_iter().cloned().collect(),
        relationships: relationships.into_iter().cloned().collect(),
        temporal_sequences,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempora_core::types::DescriptionEntry;

    fn entity(name: &str, description: &str) -> Entity {
        Entity::new(name, "person", DescriptionEntry::new(description, "c1", Utc::now()))
    }

    #[test]
    fn test_exact_name_beats_description_mention() {
        let low = terms(&["Noah Carter".to_string()]);
        let exact = entity("Noah Carter", "Sprinter.");
        let mention = entity("World Athletics", "Ratified Noah Carter's record.");
        assert!(entity_score(&exact, &low, &[]) > entity_score(&mention, &low, &[]));
        assert_eq!(entity_score(&entity("Tokyo", "City."), &low, &[]), 0.0);
    }

    #[test]
    fn test_temporal_terms_only_boost_matches() {
        let low = terms(&["noah".to_string()]);
        let temporal = terms(&["2024".to_string()]);
        let dated = entity("Noah Carter", "Set the record in 2024.");
        let undated = entity("Noah Carter", "Set the record.");
        assert!(entity_score(&dated, &low, &temporal) > entity_score(&undated, &low, &temporal));
        assert_eq!(entity_score(&entity("Paris", "Host city in 2024."), &low, &temporal), 0.0);
    }

    #[test]
    fn test_interleave_alternates_and_dedups() {
        assert_eq!(interleave_unique(&[1, 2, 3], &[2, 4], 10), vec![1, 2, 4, 3]);
        assert_eq!(interleave_unique(&[1, 2, 3], &[4, 5], 3), vec![1, 4, 2]);
    }
}
