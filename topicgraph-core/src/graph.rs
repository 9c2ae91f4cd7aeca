//! In-memory store for the knowledge graph.
//!
//! The store owns the canonical node set, link set, and per-node metadata.
//! All mutation funnels through the handful of operations here; every batch
//! operation validates fully before touching state, so a failed call leaves
//! the store exactly as it was.

use crate::id::{IdMint, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Display size of seed and manually added nodes.
pub const SEED_NODE_SIZE: f32 = 5.0;

/// Display size of generated and voice-derived child nodes.
pub const CHILD_NODE_SIZE: f32 = 3.0;

/// Curated starting topics offered to a new user.
pub const STARTER_INTERESTS: [&str; 15] = [
    "Artificial Intelligence",
    "Biochemistry",
    "Astronomy",
    "Climate Science",
    "Psychology",
    "Quantum Physics",
    "Philosophy",
    "History",
    "Music Theory",
    "Computer Science",
    "Biology",
    "Economics",
    "Art History",
    "Literature",
    "Mathematics",
];

/// How a node came to exist in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeColor {
    /// Chosen by the user, either at seeding time or added manually.
    Seed,
    /// Created by subtopic expansion.
    Generated,
    /// Suggested by conversation analysis.
    VoiceDerived,
}

impl NodeColor {
    /// The hex color used on the persistence wire format.
    pub fn as_hex(&self) -> &'static str {
        match self {
            NodeColor::Seed => "#8b5cf6",
            NodeColor::Generated => "#3b82f6",
            NodeColor::VoiceDerived => "#10b981",
        }
    }

    /// Parse a wire hex color back into a color tag.
    pub fn from_hex(hex: &str) -> Option<Self> {
        match hex {
            "#8b5cf6" => Some(NodeColor::Seed),
            "#3b82f6" => Some(NodeColor::Generated),
            "#10b981" => Some(NodeColor::VoiceDerived),
            _ => None,
        }
    }
}

/// A topic vertex in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub name: String,
    pub color: NodeColor,
    pub size: f32,
}

impl GraphNode {
    /// A full-size seed node.
    pub fn seed(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: NodeColor::Seed,
            size: SEED_NODE_SIZE,
        }
    }

    /// A smaller child node with the given provenance color.
    pub fn child(id: NodeId, name: impl Into<String>, color: NodeColor) -> Self {
        Self {
            id,
            name: name.into(),
            color,
            size: CHILD_NODE_SIZE,
        }
    }
}

/// A directed parent -> subtopic relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source: NodeId,
    pub target: NodeId,
}

impl Link {
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self { source, target }
    }
}

/// Mutable per-node state, keyed 1:1 with the node set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Whether the node's subtopics have been populated.
    pub expanded: bool,

    /// Markdown notes attached to the node.
    pub notes: String,
}

/// A shallow metadata update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    pub expanded: Option<bool>,
    pub notes: Option<String>,
}

impl MetadataPatch {
    pub fn expanded(value: bool) -> Self {
        Self {
            expanded: Some(value),
            ..Self::default()
        }
    }

    pub fn notes(value: impl Into<String>) -> Self {
        Self {
            notes: Some(value.into()),
            ..Self::default()
        }
    }
}

/// Errors from graph mutation.
///
/// These indicate misuse by a pipeline rather than recoverable runtime
/// conditions, so callers are expected to surface them loudly.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Duplicate node id: {0}")]
    DuplicateId(NodeId),

    #[error("Link endpoint references a missing node: {0}")]
    DanglingReference(NodeId),

    #[error("Node not found: {0}")]
    NotFound(NodeId),
}

/// A consistent point-in-time copy of the whole graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<Link>,
    pub metadata: HashMap<NodeId, NodeMetadata>,
}

/// The canonical, in-memory knowledge graph.
#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: Vec<GraphNode>,
    links: Vec<Link>,
    metadata: HashMap<NodeId, NodeMetadata>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store seeded with one node per interest.
    pub fn seed<S: AsRef<str>>(interests: &[S]) -> Self {
        let mut store = Self::new();
        for (index, interest) in interests.iter().enumerate() {
            let node = GraphNode::seed(NodeId::seed(index), interest.as_ref());
            store.metadata.insert(node.id.clone(), NodeMetadata::default());
            store.nodes.push(node);
        }
        store
    }

    /// Rebuild a store from a snapshot, revalidating every invariant.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self, GraphError> {
        let mut store = Self::new();
        store.add_nodes(snapshot.nodes)?;
        store.add_links(snapshot.links)?;
        for (id, metadata) in snapshot.metadata {
            if !store.metadata.contains_key(&id) {
                return Err(GraphError::NotFound(id));
            }
            store.metadata.insert(id, metadata);
        }
        Ok(store)
    }

    /// Append nodes, each with fresh default metadata.
    ///
    /// Fails without mutating if any id is already present (or repeated
    /// within the batch).
    pub fn add_nodes(&mut self, nodes: Vec<GraphNode>) -> Result<(), GraphError> {
        let mut incoming = HashSet::new();
        for node in &nodes {
            if self.metadata.contains_key(&node.id) || !incoming.insert(node.id.clone()) {
                return Err(GraphError::DuplicateId(node.id.clone()));
            }
        }

        for node in nodes {
            self.metadata.insert(node.id.clone(), NodeMetadata::default());
            self.nodes.push(node);
        }
        Ok(())
    }

    /// Append links. Fails without mutating if any endpoint is unknown.
    pub fn add_links(&mut self, links: Vec<Link>) -> Result<(), GraphError> {
        for link in &links {
            for endpoint in [&link.source, &link.target] {
                if !self.metadata.contains_key(endpoint) {
                    return Err(GraphError::DanglingReference(endpoint.clone()));
                }
            }
        }

        self.links.extend(links);
        Ok(())
    }

    /// Remove a node, every link where it is source or target, and its
    /// metadata entry.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<(), GraphError> {
        if self.metadata.remove(id).is_none() {
            return Err(GraphError::NotFound(id.clone()));
        }
        self.nodes.retain(|node| &node.id != id);
        self.links
            .retain(|link| &link.source != id && &link.target != id);
        Ok(())
    }

    /// Shallow-merge a patch into a node's metadata.
    pub fn merge_metadata(&mut self, id: &NodeId, patch: MetadataPatch) -> Result<(), GraphError> {
        let metadata = self
            .metadata
            .get_mut(id)
            .ok_or_else(|| GraphError::NotFound(id.clone()))?;
        if let Some(expanded) = patch.expanded {
            metadata.expanded = expanded;
        }
        if let Some(notes) = patch.notes {
            metadata.notes = notes;
        }
        Ok(())
    }

    /// Atomically attach a batch of children to `parent` and patch the
    /// parent's metadata.
    ///
    /// Adds every child node (with default metadata), one `parent -> child`
    /// link per child in order, and then applies `patch` to the parent.
    /// Either the whole batch becomes visible or nothing does; no reader
    /// ever observes children without the parent update.
    pub fn commit_enrichment(
        &mut self,
        parent: &NodeId,
        children: Vec<GraphNode>,
        patch: MetadataPatch,
    ) -> Result<(), GraphError> {
        if !self.metadata.contains_key(parent) {
            return Err(GraphError::NotFound(parent.clone()));
        }
        let mut incoming = HashSet::new();
        for child in &children {
            if self.metadata.contains_key(&child.id) || !incoming.insert(child.id.clone()) {
                return Err(GraphError::DuplicateId(child.id.clone()));
            }
        }

        for child in children {
            self.links.push(Link::new(parent.clone(), child.id.clone()));
            self.metadata.insert(child.id.clone(), NodeMetadata::default());
            self.nodes.push(child);
        }
        self.merge_metadata(parent, patch)
    }

    /// Add manually chosen topics as unlinked seed-colored nodes.
    ///
    /// Returns the new node ids in input order.
    pub fn add_topics<S: AsRef<str>>(
        &mut self,
        names: &[S],
        mint: &IdMint,
    ) -> Result<Vec<NodeId>, GraphError> {
        let token = mint.next_token();
        let nodes: Vec<GraphNode> = names
            .iter()
            .enumerate()
            .map(|(index, name)| GraphNode::seed(NodeId::manual(token, index), name.as_ref()))
            .collect();
        let ids = nodes.iter().map(|node| node.id.clone()).collect();
        self.add_nodes(nodes)?;
        Ok(ids)
    }

    /// A consistent copy of the graph for persistence.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.clone(),
            links: self.links.clone(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| &node.id == id)
    }

    pub fn metadata(&self, id: &NodeId) -> Option<&NodeMetadata> {
        self.metadata.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.metadata.contains_key(id)
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Topic names in insertion order, the seed input for a news digest.
    pub fn topic_names(&self) -> Vec<String> {
        self.nodes.iter().map(|node| node.name.clone()).collect()
    }

    /// Links where `id` is the source, in insertion order.
    pub fn links_from(&self, id: &NodeId) -> Vec<&Link> {
        self.links.iter().filter(|link| &link.source == id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_seeds() -> GraphStore {
        GraphStore::seed(&["Quantum Physics", "Philosophy"])
    }

    #[test]
    fn test_seed_creates_nodes_and_metadata() {
        let store = two_seeds();
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.link_count(), 0);

        let id = NodeId::seed(0);
        let node = store.node(&id).unwrap();
        assert_eq!(node.name, "Quantum Physics");
        assert_eq!(node.color, NodeColor::Seed);
        assert_eq!(node.size, SEED_NODE_SIZE);
        assert_eq!(store.metadata(&id), Some(&NodeMetadata::default()));
    }

    #[test]
    fn test_add_nodes_rejects_duplicates_without_mutation() {
        let mut store = two_seeds();
        let batch = vec![
            GraphNode::child(NodeId::from("fresh"), "Fresh", NodeColor::Generated),
            GraphNode::child(NodeId::seed(0), "Clash", NodeColor::Generated),
        ];

        let err = store.add_nodes(batch).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateId(_)));
        assert_eq!(store.node_count(), 2);
        assert!(!store.contains(&NodeId::from("fresh")));
    }

    #[test]
    fn test_add_links_rejects_dangling_reference() {
        let mut store = two_seeds();
        let err = store
            .add_links(vec![Link::new(NodeId::seed(0), NodeId::from("ghost"))])
            .unwrap_err();
        assert!(matches!(err, GraphError::DanglingReference(_)));
        assert_eq!(store.link_count(), 0);
    }

    #[test]
    fn test_remove_node_cascades() {
        let mut store = two_seeds();
        store
            .add_links(vec![
                Link::new(NodeId::seed(0), NodeId::seed(1)),
                Link::new(NodeId::seed(1), NodeId::seed(0)),
            ])
            .unwrap();

        store.remove_node(&NodeId::seed(0)).unwrap();

        assert_eq!(store.node_count(), 1);
        assert_eq!(store.link_count(), 0);
        assert!(store.metadata(&NodeId::seed(0)).is_none());
    }

    #[test]
    fn test_remove_missing_node_is_not_found() {
        let mut store = two_seeds();
        let err = store.remove_node(&NodeId::from("ghost")).unwrap_err();
        assert!(matches!(err, GraphError::NotFound(_)));
    }

    #[test]
    fn test_merge_metadata_is_shallow() {
        let mut store = two_seeds();
        let id = NodeId::seed(0);

        store
            .merge_metadata(&id, MetadataPatch::notes("## Summary\n- light"))
            .unwrap();
        store.merge_metadata(&id, MetadataPatch::expanded(true)).unwrap();

        let metadata = store.metadata(&id).unwrap();
        assert!(metadata.expanded);
        assert_eq!(metadata.notes, "## Summary\n- light");
    }

    #[test]
    fn test_commit_enrichment_is_atomic() {
        let mut store = two_seeds();
        let parent = NodeId::seed(0);
        let children = vec![
            GraphNode::child(NodeId::from("a"), "A", NodeColor::Generated),
            GraphNode::child(NodeId::seed(1), "Clash", NodeColor::Generated),
        ];

        let err = store
            .commit_enrichment(&parent, children, MetadataPatch::expanded(true))
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateId(_)));

        // Nothing became visible: no node, no link, parent still unexpanded.
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.link_count(), 0);
        assert!(!store.metadata(&parent).unwrap().expanded);
    }

    #[test]
    fn test_commit_enrichment_links_children_in_order() {
        let mut store = two_seeds();
        let parent = NodeId::seed(0);
        let children = vec![
            GraphNode::child(NodeId::from("a"), "A", NodeColor::Generated),
            GraphNode::child(NodeId::from("b"), "B", NodeColor::Generated),
        ];

        store
            .commit_enrichment(&parent, children, MetadataPatch::expanded(true))
            .unwrap();

        assert_eq!(store.node_count(), 4);
        let outgoing = store.links_from(&parent);
        assert_eq!(outgoing.len(), 2);
        assert_eq!(outgoing[0].target, NodeId::from("a"));
        assert_eq!(outgoing[1].target, NodeId::from("b"));
        assert!(store.metadata(&parent).unwrap().expanded);
    }

    #[test]
    fn test_add_topics_mints_distinct_ids() {
        let mut store = two_seeds();
        let mint = IdMint::starting_at(100);

        let first = store.add_topics(&["Geology"], &mint).unwrap();
        let second = store.add_topics(&["Geology"], &mint).unwrap();

        assert_ne!(first[0], second[0]);
        assert_eq!(store.node_count(), 4);
        assert_eq!(store.node(&first[0]).unwrap().size, SEED_NODE_SIZE);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut store = two_seeds();
        store
            .commit_enrichment(
                &NodeId::seed(0),
                vec![GraphNode::child(NodeId::from("a"), "A", NodeColor::VoiceDerived)],
                MetadataPatch::notes("notes"),
            )
            .unwrap();

        let snapshot = store.snapshot();
        let restored = GraphStore::from_snapshot(snapshot.clone()).unwrap();
        assert_eq!(restored.snapshot(), snapshot);
    }

    #[test]
    fn test_color_hex_round_trip() {
        for color in [NodeColor::Seed, NodeColor::Generated, NodeColor::VoiceDerived] {
            assert_eq!(NodeColor::from_hex(color.as_hex()), Some(color));
        }
        assert_eq!(NodeColor::from_hex("#ffffff"), None);
    }
}
