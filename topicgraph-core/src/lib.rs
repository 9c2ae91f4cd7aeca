//! Incremental knowledge-graph engine with asynchronous enrichment
//! pipelines.
//!
//! This crate provides:
//! - An in-memory [`GraphStore`] of topic nodes, links, and per-node
//!   metadata, with atomic mutation operations
//! - One-shot subtopic expansion of a node through a remote generator
//! - A real-time voice-session state machine whose transcript feeds a
//!   conversation analyzer that writes notes and subtopics back into the
//!   graph
//! - A manager for background "recent news" digest jobs with a cancellable
//!   poll loop
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use topicgraph_core::{ExpansionPipeline, GraphStore, IdMint, NodeId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(topicgraph_api::Client::from_env());
//!     let mint = Arc::new(IdMint::new());
//!
//!     let mut store = GraphStore::seed(&["Quantum Physics"]);
//!     let expansion = ExpansionPipeline::new(client.clone(), mint.clone());
//!
//!     expansion.expand(&NodeId::seed(0), &mut store).await?;
//!     println!("{} topics", store.node_count());
//!     Ok(())
//! }
//! ```
//!
//! All pipelines run on one cooperative event loop and mutate the store
//! through `&mut` passed into each call, so every batch lands as a single
//! visible step; see the module docs for the per-pipeline contracts.

pub mod analyze;
pub mod expand;
pub mod graph;
pub mod id;
pub mod news;
pub mod persist;
pub mod testing;
pub mod voice;

// Primary public API
pub use analyze::{AnalysisOutcome, ConversationAnalyzer, Summarizer};
pub use expand::{ExpansionError, ExpansionOutcome, ExpansionPipeline, SubtopicSource};
pub use graph::{
    GraphError, GraphNode, GraphSnapshot, GraphStore, Link, MetadataPatch, NodeColor,
    NodeMetadata, CHILD_NODE_SIZE, SEED_NODE_SIZE, STARTER_INTERESTS,
};
pub use id::{ExpansionToken, IdMint, NodeId};
pub use news::{NewsError, NewsFeed, NewsJobManager, NEWS_POLL_INTERVAL};
pub use persist::{load_graph, save_graph, PersistError};
pub use voice::{
    SdpExchange, SessionError, SessionState, SignalingTransport, TokenIssuer, TransportEvent,
    VoiceSession, VoiceSessionId,
};

// Re-exported so callers can hold the client and its wire types without a
// direct dependency on the api crate.
pub use topicgraph_api::{
    Analysis, Client, CredentialProvider, JobStatus, NewsJob, StaticCredentials,
};
