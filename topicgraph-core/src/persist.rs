//! Saving and loading the graph through the backend persistence endpoints.
//!
//! The backend owns durability; this module only maps a [`GraphSnapshot`]
//! to and from the wire format. Topics travel flattened (node + metadata in
//! one record, color as a hex string); relationships are keyed
//! `source`/`target` on save and `source_topic_id`/`target_topic_id` on
//! load.

use crate::graph::{GraphError, GraphNode, GraphSnapshot, GraphStore, NodeColor, NodeMetadata};
use crate::id::NodeId;
use thiserror::Error;
use topicgraph_api::{
    Client, CredentialProvider, RelationshipRecord, StoredTopics, TopicRecord, TopicsPayload,
};
use tracing::debug;

/// Errors from saving or loading the graph.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Persistence request failed: {0}")]
    Remote(#[from] topicgraph_api::Error),

    #[error("Loaded graph is inconsistent: {0}")]
    Graph(#[from] GraphError),
}

/// Serialize a snapshot into the save payload.
pub fn to_payload(snapshot: &GraphSnapshot) -> TopicsPayload {
    let topics = snapshot
        .nodes
        .iter()
        .map(|node| {
            let metadata = snapshot.metadata.get(&node.id).cloned().unwrap_or_default();
            TopicRecord {
                id: node.id.to_string(),
                name: node.name.clone(),
                color: node.color.as_hex().to_string(),
                size: node.size,
                expanded: metadata.expanded,
                notes: metadata.notes,
            }
        })
        .collect();

    let relationships = snapshot
        .links
        .iter()
        .map(|link| RelationshipRecord {
            source: link.source.to_string(),
            target: link.target.to_string(),
        })
        .collect();

    TopicsPayload {
        topics,
        relationships,
    }
}

/// Rebuild a snapshot from loaded wire records.
///
/// Unrecognized hex colors fall back to the seed color rather than failing
/// the whole load.
pub fn to_snapshot(stored: StoredTopics) -> GraphSnapshot {
    let mut nodes = Vec::with_capacity(stored.topics.len());
    let mut metadata = std::collections::HashMap::with_capacity(stored.topics.len());
    for topic in stored.topics {
        let id = NodeId::from(topic.id);
        nodes.push(GraphNode {
            id: id.clone(),
            name: topic.name,
            color: NodeColor::from_hex(&topic.color).unwrap_or(NodeColor::Seed),
            size: topic.size,
        });
        metadata.insert(
            id,
            NodeMetadata {
                expanded: topic.expanded,
                notes: topic.notes,
            },
        );
    }

    let links = stored
        .relationships
        .into_iter()
        .map(|relationship| crate::graph::Link {
            source: NodeId::from(relationship.source_topic_id),
            target: NodeId::from(relationship.target_topic_id),
        })
        .collect();

    GraphSnapshot {
        nodes,
        links,
        metadata,
    }
}

/// Save the store's current snapshot for the authenticated user.
pub async fn save_graph(
    client: &Client,
    credentials: &dyn CredentialProvider,
    store: &GraphStore,
) -> Result<(), PersistError> {
    let token = credentials.current_token().await?;
    let payload = to_payload(&store.snapshot());
    client.save_topics(&payload, &token).await?;
    debug!(
        topics = payload.topics.len(),
        relationships = payload.relationships.len(),
        "saved graph"
    );
    Ok(())
}

/// Load the authenticated user's graph into a fresh store.
///
/// The loaded data is revalidated against every store invariant, so a
/// corrupt payload fails loudly instead of producing a half-consistent
/// graph.
pub async fn load_graph(
    client: &Client,
    credentials: &dyn CredentialProvider,
) -> Result<GraphStore, PersistError> {
    let token = credentials.current_token().await?;
    let stored = client.load_topics(&token).await?;
    let store = GraphStore::from_snapshot(to_snapshot(stored))?;
    debug!(topics = store.node_count(), "loaded graph");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{MetadataPatch, NodeColor};
    use topicgraph_api::StoredRelationship;

    fn enriched_store() -> GraphStore {
        let mut store = GraphStore::seed(&["Quantum Physics", "Philosophy"]);
        store
            .commit_enrichment(
                &NodeId::seed(0),
                vec![
                    GraphNode::child(NodeId::from("c-1"), "Entanglement", NodeColor::Generated),
                    GraphNode::child(NodeId::from("c-2"), "Decoherence", NodeColor::VoiceDerived),
                ],
                MetadataPatch::expanded(true),
            )
            .unwrap();
        store
            .merge_metadata(&NodeId::seed(1), MetadataPatch::notes("## Summary\n- stoicism"))
            .unwrap();
        store
    }

    #[test]
    fn test_payload_flattens_nodes_and_metadata() {
        let store = enriched_store();
        let payload = to_payload(&store.snapshot());

        assert_eq!(payload.topics.len(), 4);
        assert_eq!(payload.relationships.len(), 2);

        let seed = payload
            .topics
            .iter()
            .find(|topic| topic.id == "interest-0")
            .unwrap();
        assert!(seed.expanded);
        assert_eq!(seed.color, "#8b5cf6");

        let child = payload.topics.iter().find(|topic| topic.id == "c-2").unwrap();
        assert_eq!(child.color, "#10b981");
        assert!(!child.expanded);
    }

    #[test]
    fn test_wire_round_trip_reproduces_snapshot() {
        let store = enriched_store();
        let snapshot = store.snapshot();
        let payload = to_payload(&snapshot);

        // Mimic the backend echoing the payload back in load format.
        let stored = StoredTopics {
            topics: payload.topics.clone(),
            relationships: payload
                .relationships
                .iter()
                .map(|relationship| StoredRelationship {
                    source_topic_id: relationship.source.clone(),
                    target_topic_id: relationship.target.clone(),
                })
                .collect(),
        };

        let restored = GraphStore::from_snapshot(to_snapshot(stored)).unwrap();
        assert_eq!(restored.snapshot(), snapshot);
    }

    #[test]
    fn test_unknown_color_defaults_to_seed() {
        let stored = StoredTopics {
            topics: vec![TopicRecord {
                id: "t-1".to_string(),
                name: "Mystery".to_string(),
                color: "#123456".to_string(),
                size: 5.0,
                expanded: false,
                notes: String::new(),
            }],
            relationships: vec![],
        };

        let snapshot = to_snapshot(stored);
        assert_eq!(snapshot.nodes[0].color, NodeColor::Seed);
    }

    #[test]
    fn test_dangling_relationship_fails_load() {
        let stored = StoredTopics {
            topics: vec![TopicRecord {
                id: "t-1".to_string(),
                name: "Alone".to_string(),
                color: "#8b5cf6".to_string(),
                size: 5.0,
                expanded: false,
                notes: String::new(),
            }],
            relationships: vec![StoredRelationship {
                source_topic_id: "t-1".to_string(),
                target_topic_id: "ghost".to_string(),
            }],
        };

        let err = GraphStore::from_snapshot(to_snapshot(stored)).unwrap_err();
        assert!(matches!(err, GraphError::DanglingReference(_)));
    }
}
