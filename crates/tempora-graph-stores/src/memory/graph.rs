//! Knowledge graph held in a petgraph `DiGraph`.
//!
//! Nodes are canonical entities addressed by their key; edges are the
//! relationships between them. Several edges may join the same pair.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use tempora_core::resolution::relationship_fingerprint;
use tempora_core::types::{Entity, Relationship};

/// Node data: the canonical key and the stored entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub key: String,
    pub entity: Entity,
}

/// The entity graph.
pub type EntityGraph = DiGraph<EntityNode, Relationship>;

/// Entity graph with an index from canonical key to node.
#[derive(Debug, Default)]
pub struct KnowledgeGraph {
    graph: EntityGraph,
    key_index: HashMap<String, NodeIndex>,
}

impl KnowledgeGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entity under `key`.
    pub fn upsert_entity(&mut self, key: &str, entity: Entity) -> NodeIndex {
        if let Some(&idx) = self.key_index.get(key) {
            if let Some(node) = self.graph.node_weight_mut(idx) {
                node.entity = entity;
            }
            return idx;
        }
        let idx = self.graph.add_node(EntityNode {
            key: key.to_string(),
            entity,
        });
        self.key_index.insert(key.to_string(), idx);
        idx
    }

    /// Add a relationship, replacing one with the same endpoints and
    /// normalized description.
    ///
    /// Returns `None` when an endpoint is not in the graph.
    pub fn upsert_relationship(
        &mut self,
        source_key: &str,
        target_key: &str,
        relationship: Relationship,
    ) -> Option<EdgeIndex> {
        let source = self.find(source_key)?;
        let target = self.find(target_key)?;
        let fingerprint = relationship_fingerprint(source_key, target_key, &relationship.description);

        let existing = self
            .graph
            .edges_connecting(source, target)
            .find(|e| {
                relationship_fingerprint(source_key, target_key, &e.weight().description)
                    == fingerprint
            })
            .map(|e| e.id());

        match existing {
            Some(edge) => {
                if let Some(weight) = self.graph.edge_weight_mut(edge) {
                    *weight = relationship;
                }
                Some(edge)
            }
            None => Some(self.graph.add_edge(source, target, relationship)),
        }
    }

    /// Find a node by canonical key.
    pub fn find(&self, key: &str) -> Option<NodeIndex> {
        self.key_index.get(key).copied()
    }

    /// The entity stored under `key`.
    pub fn entity(&self, key: &str) -> Option<&Entity> {
        self.find(key)
            .and_then(|idx| self.graph.node_weight(idx))
            .map(|node| &node.entity)
    }

    /// Relationships directed from `source_key` to `target_key`, oldest edge first.
    pub fn relationships_between(&self, source_key: &str, target_key: &str) -> Vec<&Relationship> {
        let (Some(source), Some(target)) = (self.find(source_key), self.find(target_key)) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self.graph.edges_connecting(source, target).collect();
        edges.sort_by_key(|e| e.id());
        edges.into_iter().map(|e| e.weight()).collect()
    }

    /// Edges touching the node in either direction, oldest first.
    pub fn incident_edges(&self, idx: NodeIndex) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .chain(self.graph.edges_directed(idx, Direction::Incoming))
            .map(|e| e.id())
            .collect();
        edges.sort();
        edges.dedup();
        edges
    }

    /// Endpoints of an edge.
    pub fn endpoints(&self, edge: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(edge)
    }

    /// Number of relationships touching the node.
    pub fn degree(&self, idx: NodeIndex) -> usize {
        self.graph.edges_directed(idx, Direction::Outgoing).count()
            + self.graph.edges_directed(idx, Direction::Incoming).count()
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&EntityNode> {
        self.graph.node_weight(idx)
    }

    pub fn relationship(&self, edge: EdgeIndex) -> Option<&Relationship> {
        self.graph.edge_weight(edge)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &EntityNode)> {
        self.graph
            .node_indices()
            .filter_map(move |idx| self.graph.node_weight(idx).map(|n| (idx, n)))
    }

    /// All edges in insertion order with their endpoint keys.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeIndex, &str, &str, &Relationship)> {
        self.graph.edge_references().filter_map(move |e| {
            let source = self.graph.node_weight(e.source())?;
            let target = self.graph.node_weight(e.target())?;
            Some((e.id(), source.key.as_str(), target.key.as_str(), e.weight()))
        })
    }

    /// Entities ordered by canonical key.
    pub fn entities_by_key(&self) -> Vec<&EntityNode> {
        let mut nodes: Vec<&EntityNode> = self.graph.node_weights().collect();
        nodes.sort_by(|a, b| a.key.cmp(&b.key));
        nodes
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempora_core::types::DescriptionEntry;

    fn entity(name: &str) -> Entity {
        Entity::new(name, "person", DescriptionEntry::new("desc", "c1", Utc::now()))
    }

    fn relationship(source: &str, target: &str, description: &str) -> Relationship {
        Relationship {
            source: source.into(),
            target: target.into(),
            description: description.into(),
            relationship_type: None,
            temporal_relation: None,
            strength: 1.0,
            keywords: vec![],
            created_at: Utc::now(),
            source_id: "c1".into(),
            file_path: None,
        }
    }

    #[test]
    fn test_upsert_entity_reuses_node() {
        let mut graph = KnowledgeGraph::new();
        let first = graph.upsert_entity("alice", entity("Alice"));
        let second = graph.upsert_entity("alice", entity("ALICE"));
        assert_eq!(first, second);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.entity("alice").unwrap().name, "ALICE");
    }

    #[test]
    fn test_relationship_needs_both_endpoints() {
        let mut graph = KnowledgeGraph::new();
        graph.upsert_entity("alice", entity("Alice"));
        assert!(graph
            .upsert_relationship("alice", "bob", relationship("Alice", "Bob", "knows"))
            .is_none());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_same_description_replaces_edge() {
        let mut graph = KnowledgeGraph::new();
        graph.upsert_entity("alice", entity("Alice"));
        graph.upsert_entity("bob", entity("Bob"));
        graph.upsert_relationship("alice", "bob", relationship("Alice", "Bob", "Alice knows Bob."));
        graph.upsert_relationship("alice", "bob", relationship("Alice", "Bob", "alice  knows bob."));
        graph.upsert_relationship("alice", "bob", relationship("Alice", "Bob", "Alice hired Bob."));

        let between = graph.relationships_between("alice", "bob");
        assert_eq!(between.len(), 2);
        assert_eq!(between[0].description, "alice  knows bob.");
        assert!(graph.relationships_between("bob", "alice").is_empty());
    }

    #[test]
    fn test_incident_edges_cover_both_directions() {
        let mut graph = KnowledgeGraph::new();
        let alice = graph.upsert_entity("alice", entity("Alice"));
        graph.upsert_entity("bob", entity("Bob"));
        graph.upsert_entity("carol", entity("Carol"));
        graph.upsert_relationship("alice", "bob", relationship("Alice", "Bob", "knows"));
        graph.upsert_relationship("carol", "alice", relationship("Carol", "Alice", "mentors"));

        assert_eq!(graph.incident_edges(alice).len(), 2);
        assert_eq!(graph.degree(alice), 2);
        let keys: Vec<_> = graph.entities_by_key().iter().map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["alice", "bob", "carol"]);
    }
}
