//! Benchmark scenarios and their workloads.
//!
//! A scenario is planned once per topology: its targets are drawn up front so
//! every backend answers exactly the same sequence of queries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::backend::{ExplainRequest, QueryOperation, StorageBackend};
use crate::config::ScenarioConfig;
use crate::error::{DagBenchError, Result};
use crate::graph::{traversal, VersionGraph};
use crate::types::{NodePredicate, TraversalQuery, VersionId, VersionNode};

// ---------------------------------------------------------------------------
// ScenarioKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// Full ancestor closure of the newest node.
    AncestorsOfLast,
    /// Full descendant closure of the root.
    DescendantsOfRoot,
    /// Unfiltered ancestors of a fresh random node each repetition.
    RandomAncestors,
    /// Ancestors of a random node filtered by author and title.
    AncestorsByAuthorTitle,
    /// Descendants of a random node created at or after a threshold.
    DescendantsSince,
    /// LCA of the middle and the last node.
    LcaMidLast,
    /// LCA of a random pair.
    LcaRandomPair,
    /// Ancestors within a hop limit, filtered by author and title.
    BoundedAncestorsByAuthorTitle,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 8] = [
        Self::AncestorsOfLast,
        Self::DescendantsOfRoot,
        Self::RandomAncestors,
        Self::AncestorsByAuthorTitle,
        Self::DescendantsSince,
        Self::LcaMidLast,
        Self::LcaRandomPair,
        Self::BoundedAncestorsByAuthorTitle,
    ];

    pub fn from_str_loose(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL.into_iter().find(|k| k.as_str() == normalized)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AncestorsOfLast => "ancestors-of-last",
            Self::DescendantsOfRoot => "descendants-of-root",
            Self::RandomAncestors => "random-ancestors",
            Self::AncestorsByAuthorTitle => "ancestors-by-author-title",
            Self::DescendantsSince => "descendants-since",
            Self::LcaMidLast => "lca-mid-last",
            Self::LcaRandomPair => "lca-random-pair",
            Self::BoundedAncestorsByAuthorTitle => "bounded-ancestors-by-author-title",
        }
    }

    pub fn operation(&self) -> QueryOperation {
        match self {
            Self::AncestorsOfLast
            | Self::RandomAncestors
            | Self::AncestorsByAuthorTitle
            | Self::BoundedAncestorsByAuthorTitle => QueryOperation::Ancestors,
            Self::DescendantsOfRoot | Self::DescendantsSince => QueryOperation::Descendants,
            Self::LcaMidLast | Self::LcaRandomPair => QueryOperation::LatestCommonAncestor,
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_str_loose(s).ok_or_else(|| format!("unknown scenario '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Target / Query / QueryResult
// ---------------------------------------------------------------------------

/// The node (or pair) a single query was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Target {
    Single { id: VersionId },
    Pair { a: VersionId, b: VersionId },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single { id } => write!(f, "{id}"),
            Self::Pair { a, b } => write!(f, "({a}, {b})"),
        }
    }
}

/// One concrete backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Ancestors { id: VersionId, query: TraversalQuery },
    Descendants { id: VersionId, query: TraversalQuery },
    LatestCommonAncestor { a: VersionId, b: VersionId },
}

impl Query {
    pub fn target(&self) -> Target {
        match *self {
            Self::Ancestors { id, .. } | Self::Descendants { id, .. } => Target::Single { id },
            Self::LatestCommonAncestor { a, b } => Target::Pair { a, b },
        }
    }

    pub fn explain_request(&self) -> ExplainRequest {
        match self {
            Self::Ancestors { id, query } => ExplainRequest::ancestors(*id, query.clone()),
            Self::Descendants { id, query } => ExplainRequest::descendants(*id, query.clone()),
            Self::LatestCommonAncestor { a, b } => ExplainRequest::latest_common_ancestor(*a, *b),
        }
    }
}

/// What a backend (or the oracle) answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    Nodes(Vec<VersionNode>),
    Ancestor(Option<VersionNode>),
}

impl QueryResult {
    /// Result size: node count for closures, 0 or 1 for LCA.
    pub fn cardinality(&self) -> usize {
        match self {
            Self::Nodes(nodes) => nodes.len(),
            Self::Ancestor(found) => usize::from(found.is_some()),
        }
    }

    pub fn ids(&self) -> Vec<VersionId> {
        match self {
            Self::Nodes(nodes) => nodes.iter().map(|n| n.id).collect(),
            Self::Ancestor(found) => found.iter().map(|n| n.id).collect(),
        }
    }
}

/// Issue `query` against `backend`.
pub fn execute(backend: &dyn StorageBackend, query: &Query) -> Result<QueryResult> {
    match query {
        Query::Ancestors { id, query } => backend.find_ancestors(*id, query).map(QueryResult::Nodes),
        Query::Descendants { id, query } => {
            backend.find_descendants(*id, query).map(QueryResult::Nodes)
        }
        Query::LatestCommonAncestor { a, b } => backend
            .find_latest_common_ancestor(*a, *b)
            .map(QueryResult::Ancestor),
    }
}

/// Answer `query` with the in-memory reference traversal.
pub fn evaluate(graph: &VersionGraph, query: &Query) -> QueryResult {
    match query {
        Query::Ancestors { id, query } => QueryResult::Nodes(traversal::ancestors(graph, *id, query)),
        Query::Descendants { id, query } => {
            QueryResult::Nodes(traversal::descendants(graph, *id, query))
        }
        Query::LatestCommonAncestor { a, b } => {
            QueryResult::Ancestor(traversal::latest_common_ancestor(graph, *a, *b).cloned())
        }
    }
}

// ---------------------------------------------------------------------------
// Scenario planning
// ---------------------------------------------------------------------------

/// A scenario bound to one graph: a warmup query plus one query per
/// repetition.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub kind: ScenarioKind,
    pub warmup: Query,
    pub queries: Vec<Query>,
}

/// The timestamp halfway between the oldest and newest node.
pub fn timestamp_midpoint(graph: &VersionGraph) -> Option<DateTime<Utc>> {
    let first = graph.nodes().first()?.created_at;
    let last = graph.nodes().last()?.created_at;
    Some(first + (last - first) / 2)
}

fn random_id<R: Rng>(graph: &VersionGraph, rng: &mut R) -> VersionId {
    graph.nodes()[rng.gen_range(0..graph.len())].id
}

/// Draw the workload for `kind` on `graph`.
pub fn plan_scenario<R: Rng>(
    kind: ScenarioKind,
    graph: &VersionGraph,
    params: &ScenarioConfig,
    repetitions: usize,
    rng: &mut R,
) -> Result<Scenario> {
    let (Some(root), Some(middle), Some(last)) = (graph.first_id(), graph.middle_id(), graph.last_id())
    else {
        return Err(DagBenchError::Other(format!("cannot plan {kind} on an empty graph")));
    };

    let by_author_title = NodePredicate::default()
        .author(params.author_title.author.clone())
        .title_contains(params.author_title.title.clone());

    let draw = |rng: &mut R| -> Query {
        match kind {
            ScenarioKind::AncestorsOfLast => Query::Ancestors {
                id: last,
                query: TraversalQuery::all(),
            },
            ScenarioKind::DescendantsOfRoot => Query::Descendants {
                id: root,
                query: TraversalQuery::all(),
            },
            ScenarioKind::RandomAncestors => Query::Ancestors {
                id: random_id(graph, rng),
                query: TraversalQuery::all(),
            },
            ScenarioKind::AncestorsByAuthorTitle => Query::Ancestors {
                id: random_id(graph, rng),
                query: TraversalQuery::all().filtered(by_author_title.clone()),
            },
            ScenarioKind::DescendantsSince => {
                let threshold = params
                    .created_since
                    .or_else(|| timestamp_midpoint(graph))
                    .unwrap_or_default();
                Query::Descendants {
                    id: random_id(graph, rng),
                    query: TraversalQuery::all()
                        .filtered(NodePredicate::default().created_since(threshold)),
                }
            }
            ScenarioKind::LcaMidLast => Query::LatestCommonAncestor { a: middle, b: last },
            ScenarioKind::LcaRandomPair => Query::LatestCommonAncestor {
                a: random_id(graph, rng),
                b: random_id(graph, rng),
            },
            ScenarioKind::BoundedAncestorsByAuthorTitle => {
                let bounded = &params.bounded;
                let query = TraversalQuery {
                    include_self: bounded.include_self,
                    max_depth: Some(bounded.max_hops),
                    predicate: NodePredicate::default()
                        .author(bounded.author.clone())
                        .title_contains(bounded.title.clone()),
                };
                Query::Ancestors {
                    id: random_id(graph, rng),
                    query,
                }
            }
        }
    };

    let warmup = draw(rng);
    let queries = (0..repetitions).map(|_| draw(rng)).collect();
    Ok(Scenario {
        kind,
        warmup,
        queries,
    })
}
