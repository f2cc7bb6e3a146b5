//! The in-memory traversal exposed through the backend interface.
//!
//! Useful as a baseline row in reports; its timings show the cost of the
//! algorithm without any storage engine in the way.

use crate::backend::{BackendKind, ExplainRequest, QueryOperation, QueryPlan, StorageBackend};
use crate::error::{DagBenchError, Result};
use crate::graph::{traversal, VersionGraph};
use crate::types::{Direction, ParentEdge, TraversalQuery, VersionId, VersionNode};

#[derive(Debug, Default)]
pub struct ReferenceBackend {
    graph: VersionGraph,
}

impl ReferenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &VersionGraph {
        &self.graph
    }
}

impl StorageBackend for ReferenceBackend {
    fn name(&self) -> &str {
        BackendKind::Reference.as_str()
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Reference
    }

    fn insert_batch(&mut self, nodes: &[VersionNode], edges: &[ParentEdge]) -> Result<usize> {
        self.graph = VersionGraph::from_parts(nodes, edges)
            .map_err(|e| DagBenchError::storage(self.name(), e.to_string()))?;
        Ok(self.graph.len())
    }

    fn find_ancestors(&self, id: VersionId, query: &TraversalQuery) -> Result<Vec<VersionNode>> {
        Ok(traversal::ancestors(&self.graph, id, query))
    }

    fn find_descendants(
        &self,
        id: VersionId,
        query: &TraversalQuery,
    ) -> Result<Vec<VersionNode>> {
        Ok(traversal::descendants(&self.graph, id, query))
    }

    fn find_latest_common_ancestor(
        &self,
        a: VersionId,
        b: VersionId,
    ) -> Result<Option<VersionNode>> {
        Ok(traversal::latest_common_ancestor(&self.graph, a, b).cloned())
    }

    fn explain(&self, request: &ExplainRequest) -> Result<QueryPlan> {
        let walk = match request.operation {
            QueryOperation::Ancestors => format!("bfs {} from {}", Direction::Ancestors, request.target),
            QueryOperation::Descendants => {
                format!("bfs {} from {}", Direction::Descendants, request.target)
            }
            QueryOperation::LatestCommonAncestor => format!(
                "intersect ancestor sets of {} and {}",
                request.target,
                request.other.unwrap_or(request.target)
            ),
        };
        Ok(QueryPlan {
            backend: self.name().to_string(),
            operation: request.operation,
            steps: vec![walk, format!("graph {}", self.graph.fingerprint())],
        })
    }
}
