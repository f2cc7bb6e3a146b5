//! Core domain types for dagbench.
//!
//! Version nodes, parent edges, topology kinds, and the traversal query
//! shape shared by every storage backend.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// VersionId
// ---------------------------------------------------------------------------

/// Opaque, totally ordered node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(pub u64);

impl VersionId {
    pub fn get(self) -> u64 {
        self.0
    }

    /// The id as a SQLite integer key. Ids above `i64::MAX` are rejected at
    /// generation time, so the cast is lossless for generated graphs.
    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }
}

impl From<u64> for VersionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// VersionNode / ParentEdge
// ---------------------------------------------------------------------------

/// A single version in the DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionNode {
    pub id: VersionId,
    pub title: String,
    pub content: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

impl VersionNode {
    /// Sort key for latest-common-ancestor selection: newest first, larger id
    /// wins ties.
    pub fn recency_key(&self) -> (DateTime<Utc>, VersionId) {
        (self.created_at, self.id)
    }
}

/// Directed `parent -> child` relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParentEdge {
    pub parent: VersionId,
    pub child: VersionId,
}

impl ParentEdge {
    pub fn new(parent: impl Into<VersionId>, child: impl Into<VersionId>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

/// Shape of a synthetic DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topology {
    /// Single path: every node's parent is its predecessor.
    Chain,
    /// Heap-indexed tree: parent of `i` is `root + (i - root) / 2`.
    BinaryTree,
    /// 1-3 random lower-indexed parents per node.
    ComplexRandom,
}

impl Topology {
    pub const ALL: [Topology; 3] = [Self::Chain, Self::BinaryTree, Self::ComplexRandom];

    /// Parse from a loose string (case-insensitive, common aliases accepted).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "chain" => Some(Self::Chain),
            "binary-tree" | "binary" | "tree" | "binarytree" => Some(Self::BinaryTree),
            "complex-random" | "complex" | "random" | "complexrandom" => {
                Some(Self::ComplexRandom)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chain => "chain",
            Self::BinaryTree => "binary-tree",
            Self::ComplexRandom => "complex-random",
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_loose(s).ok_or_else(|| {
            format!("unknown topology '{s}' (expected chain, binary-tree or complex-random)")
        })
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which way a closure walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Follow child -> parent edges.
    Ancestors,
    /// Follow parent -> child edges.
    Descendants,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ancestors => "ancestors",
            Self::Descendants => "descendants",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// NodePredicate / TraversalQuery
// ---------------------------------------------------------------------------

/// Attribute filter applied to closure results. Empty fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePredicate {
    /// Exact author match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Case-sensitive substring of the title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_contains: Option<String>,

    /// Inclusive lower bound on `created_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_since: Option<DateTime<Utc>>,
}

impl NodePredicate {
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn title_contains(mut self, part: impl Into<String>) -> Self {
        self.title_contains = Some(part.into());
        self
    }

    pub fn created_since(mut self, threshold: DateTime<Utc>) -> Self {
        self.created_since = Some(threshold);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.author.is_none() && self.title_contains.is_none() && self.created_since.is_none()
    }

    pub fn matches(&self, node: &VersionNode) -> bool {
        if let Some(ref author) = self.author {
            if node.author != *author {
                return false;
            }
        }
        if let Some(ref part) = self.title_contains {
            if !node.title.contains(part.as_str()) {
                return false;
            }
        }
        if let Some(threshold) = self.created_since {
            if node.created_at < threshold {
                return false;
            }
        }
        true
    }
}

/// Shape of an ancestor or descendant query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalQuery {
    /// Return the start node itself (at depth 0) when it matches.
    #[serde(default)]
    pub include_self: bool,

    /// Maximum hop count; `None` walks the full closure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u32>,

    #[serde(default)]
    pub predicate: NodePredicate,
}

impl TraversalQuery {
    /// Full closure, start node excluded, no filter.
    pub fn all() -> Self {
        Self::default()
    }

    /// Closure bounded to `max_depth` hops.
    pub fn within(max_depth: u32) -> Self {
        Self {
            max_depth: Some(max_depth),
            ..Self::default()
        }
    }

    pub fn including_self(mut self) -> Self {
        self.include_self = true;
        self
    }

    pub fn filtered(mut self, predicate: NodePredicate) -> Self {
        self.predicate = predicate;
        self
    }
}
