//! Node identity and the collision-free child-id scheme.
//!
//! Child ids are derived from `(parent id, expansion token, child index)`.
//! The token is unique per expansion call, so repeated expansions (including
//! retries after a failure) and expansions of different parents can never
//! produce colliding ids.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Id of the `index`-th seed node created from the initial interests.
    pub fn seed(index: usize) -> Self {
        Self(format!("interest-{index}"))
    }

    /// Id of a manually added topic node.
    pub fn manual(token: ExpansionToken, index: usize) -> Self {
        Self(format!("manual-{token}-{index}"))
    }

    /// Id of a child created by subtopic expansion.
    pub fn generated_child(parent: &NodeId, token: ExpansionToken, index: usize) -> Self {
        Self(format!("{parent}-sub-{token}-{index}"))
    }

    /// Id of a child suggested by conversation analysis.
    pub fn voice_child(parent: &NodeId, token: ExpansionToken, index: usize) -> Self {
        Self(format!("{parent}-voice-{token}-{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An opaque token distinguishing one expansion call from every other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExpansionToken(u64);

impl ExpansionToken {
    /// Construct a token with a known value. Used by tests.
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ExpansionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mints expansion tokens that are strictly increasing for the life of the
/// process.
///
/// The counter starts at the current Unix-epoch milliseconds so tokens from
/// a fresh process do not collide with ids persisted by an earlier run, and
/// increments on every mint so concurrent expansions within one run cannot
/// collide regardless of clock resolution.
#[derive(Debug)]
pub struct IdMint {
    next: AtomicU64,
}

impl IdMint {
    pub fn new() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self::starting_at(millis)
    }

    /// Start the token counter at a known value. Used by tests.
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Mint a token no other call on this mint has returned.
    pub fn next_token(&self) -> ExpansionToken {
        ExpansionToken(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdMint {
    fn default() -> Self {
        Self::new()
    }
}
