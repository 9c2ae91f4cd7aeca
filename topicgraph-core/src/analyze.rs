//! Turning a finished conversation transcript into notes and subtopics.

use crate::graph::{GraphError, GraphNode, GraphStore, MetadataPatch, NodeColor};
use crate::id::{IdMint, NodeId};
use async_trait::async_trait;
use std::sync::Arc;
use topicgraph_api::Analysis;
use tracing::{debug, warn};

/// Summarizes a transcript about a topic into structured analysis.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        transcript: &str,
        parent_topic: &str,
    ) -> Result<Analysis, topicgraph_api::Error>;
}

#[async_trait]
impl Summarizer for topicgraph_api::Client {
    async fn summarize(
        &self,
        transcript: &str,
        parent_topic: &str,
    ) -> Result<Analysis, topicgraph_api::Error> {
        self.summarize_conversation(transcript, parent_topic).await
    }
}

/// What an analysis added to the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    /// The notes document merged into the node's metadata.
    pub notes: String,

    /// Ids of the voice-derived children created, in suggestion order.
    pub children: Vec<NodeId>,
}

/// Converts voice-session transcripts into node notes and suggested
/// subtopic children.
pub struct ConversationAnalyzer {
    summarizer: Arc<dyn Summarizer>,
    mint: Arc<IdMint>,
}

impl ConversationAnalyzer {
    pub fn new(summarizer: Arc<dyn Summarizer>, mint: Arc<IdMint>) -> Self {
        Self { summarizer, mint }
    }

    /// Analyze `transcript` and merge the results into `node_id`.
    ///
    /// Analysis is best-effort enrichment after a session the user already
    /// completed: a failed summarization call is logged and reported as
    /// `None` without touching the graph. Graph invariant violations are
    /// returned as errors since they indicate pipeline misuse.
    pub async fn analyze(
        &self,
        node_id: &NodeId,
        topic: &str,
        transcript: &str,
        store: &mut GraphStore,
    ) -> Result<Option<AnalysisOutcome>, GraphError> {
        if !store.contains(node_id) {
            return Err(GraphError::NotFound(node_id.clone()));
        }

        let analysis = match self.summarizer.summarize(transcript, topic).await {
            Ok(analysis) => analysis,
            Err(error) => {
                warn!(%node_id, topic, %error, "conversation analysis failed, skipping notes");
                return Ok(None);
            }
        };

        let notes = format_notes(&analysis.summary, &analysis.key_points);
        let token = self.mint.next_token();
        let children: Vec<GraphNode> = analysis
            .suggested_subtopics
            .iter()
            .enumerate()
            .map(|(index, name)| {
                GraphNode::child(
                    NodeId::voice_child(node_id, token, index),
                    name,
                    NodeColor::VoiceDerived,
                )
            })
            .collect();
        let ids: Vec<NodeId> = children.iter().map(|child| child.id.clone()).collect();

        store.commit_enrichment(node_id, children, MetadataPatch::notes(notes.clone()))?;

        debug!(%node_id, topic, children = ids.len(), "merged conversation notes");
        Ok(Some(AnalysisOutcome { notes, children: ids }))
    }
}

/// Render the fixed two-section notes document.
fn format_notes(summary: &[String], key_points: &[String]) -> String {
    let bullets = |items: &[String]| {
        items
            .iter()
            .map(|item| format!("- {item}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "## Summary\n{}\n\n## Key Points\n{}",
        bullets(summary),
        bullets(key_points)
    )
}
