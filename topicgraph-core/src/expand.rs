//! One-shot subtopic expansion of a graph node.

use crate::graph::{GraphError, GraphNode, GraphStore, MetadataPatch, NodeColor};
use crate::id::{IdMint, NodeId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Produces child topics for a parent topic name.
#[async_trait]
pub trait SubtopicSource: Send + Sync {
    async fn subtopics(&self, parent_topic: &str) -> Result<Vec<String>, topicgraph_api::Error>;
}

#[async_trait]
impl SubtopicSource for topicgraph_api::Client {
    async fn subtopics(&self, parent_topic: &str) -> Result<Vec<String>, topicgraph_api::Error> {
        self.generate_subtopics(parent_topic).await
    }
}

/// Errors from expanding a node.
#[derive(Debug, Error)]
pub enum ExpansionError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Subtopic generation failed: {0}")]
    Remote(#[from] topicgraph_api::Error),

    #[error("Generator returned no subtopics for \"{0}\"")]
    EmptyExpansion(String),
}

/// Result of an expansion request.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpansionOutcome {
    /// The node was already expanded; no remote call, no mutation.
    AlreadyExpanded,

    /// Ids of the newly created children, in generator order.
    Expanded(Vec<NodeId>),
}

/// Expands nodes by fetching child topics and merging them into the store
/// exactly once per node.
pub struct ExpansionPipeline {
    source: Arc<dyn SubtopicSource>,
    mint: Arc<IdMint>,
}

impl ExpansionPipeline {
    pub fn new(source: Arc<dyn SubtopicSource>, mint: Arc<IdMint>) -> Self {
        Self { source, mint }
    }

    /// Populate `node_id`'s subtopics.
    ///
    /// A no-op once the node is expanded. On failure (network error,
    /// malformed or empty generator response) the store is left untouched
    /// and the node stays unexpanded, so the call is idempotent under
    /// retry: the `expanded` flag is committed in the same mutation step as
    /// the children, never before.
    pub async fn expand(
        &self,
        node_id: &NodeId,
        store: &mut GraphStore,
    ) -> Result<ExpansionOutcome, ExpansionError> {
        let node = store
            .node(node_id)
            .ok_or_else(|| GraphError::NotFound(node_id.clone()))?;
        let topic = node.name.clone();

        if store
            .metadata(node_id)
            .is_some_and(|metadata| metadata.expanded)
        {
            debug!(%node_id, "node already expanded, skipping");
            return Ok(ExpansionOutcome::AlreadyExpanded);
        }

        let subtopics = self.source.subtopics(&topic).await?;
        if subtopics.is_empty() {
            return Err(ExpansionError::EmptyExpansion(topic));
        }

        let token = self.mint.next_token();
        let children: Vec<GraphNode> = subtopics
            .iter()
            .enumerate()
            .map(|(index, name)| {
                GraphNode::child(
                    NodeId::generated_child(node_id, token, index),
                    name,
                    NodeColor::Generated,
                )
            })
            .collect();
        let ids: Vec<NodeId> = children.iter().map(|child| child.id.clone()).collect();

        store.commit_enrichment(node_id, children, MetadataPatch::expanded(true))?;

        debug!(%node_id, topic = %topic, count = ids.len(), "expanded node");
        Ok(ExpansionOutcome::Expanded(ids))
    }
}
