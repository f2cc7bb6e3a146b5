//! Graph-native backend: an adjacency arena walked directly.
//!
//! Nodes live in a dense slot vector; each slot keeps the slot numbers of
//! its parents and children, so a hop is an index lookup rather than a join.
//! Walks mark visited slots in a bit-vector sized to the arena.

use std::collections::{HashMap, VecDeque};

use crate::backend::{BackendKind, ExplainRequest, QueryOperation, QueryPlan, StorageBackend};
use crate::error::{DagBenchError, Result};
use crate::types::{Direction, ParentEdge, TraversalQuery, VersionId, VersionNode};

type Slot = u32;

#[derive(Debug, Clone)]
struct NodeRecord {
    node: VersionNode,
    parents: Vec<Slot>,
    children: Vec<Slot>,
}

/// In-memory property graph keyed by dense slots.
#[derive(Debug, Default)]
pub struct NativeGraphStore {
    records: Vec<NodeRecord>,
    lookup: HashMap<VersionId, Slot>,
    edge_count: usize,
}

impl NativeGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.records.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    fn fail(message: impl Into<String>) -> DagBenchError {
        DagBenchError::storage(BackendKind::Native.as_str(), message)
    }

    fn slot_of(&self, id: VersionId) -> Option<Slot> {
        self.lookup.get(&id).copied()
    }

    fn neighbors(&self, slot: Slot, direction: Direction) -> &[Slot] {
        let record = &self.records[slot as usize];
        match direction {
            Direction::Ancestors => &record.parents,
            Direction::Descendants => &record.children,
        }
    }

    /// Breadth-first expansion from `start`. Returns every reached slot
    /// (start included at depth 0) with its shortest hop count.
    fn expand(&self, start: Slot, direction: Direction, max_depth: Option<u32>) -> Vec<(Slot, u32)> {
        let mut visited = vec![false; self.records.len()];
        let mut reached = Vec::new();
        let mut frontier: VecDeque<(Slot, u32)> = VecDeque::new();

        visited[start as usize] = true;
        frontier.push_back((start, 0));

        while let Some((slot, depth)) = frontier.pop_front() {
            reached.push((slot, depth));
            if max_depth.is_some_and(|k| depth >= k) {
                continue;
            }
            for &next in self.neighbors(slot, direction) {
                if !visited[next as usize] {
                    visited[next as usize] = true;
                    frontier.push_back((next, depth + 1));
                }
            }
        }
        reached
    }

    fn closure(&self, id: VersionId, direction: Direction, query: &TraversalQuery) -> Vec<VersionNode> {
        let Some(start) = self.slot_of(id) else {
            return Vec::new();
        };
        let mut out: Vec<VersionNode> = self
            .expand(start, direction, query.max_depth)
            .into_iter()
            .filter(|&(slot, _)| query.include_self || slot != start)
            .map(|(slot, _)| &self.records[slot as usize].node)
            .filter(|node| query.predicate.matches(node))
            .cloned()
            .collect();
        out.sort_by_key(|n| n.id);
        out
    }

    fn ancestor_mask(&self, start: Slot) -> Vec<bool> {
        let mut mask = vec![false; self.records.len()];
        for (slot, _) in self.expand(start, Direction::Ancestors, None) {
            mask[slot as usize] = true;
        }
        mask
    }

    fn pipeline(&self, request: &ExplainRequest) -> Vec<String> {
        let mut steps = Vec::new();
        match request.operation {
            QueryOperation::Ancestors | QueryOperation::Descendants => {
                let arrow = if request.operation == QueryOperation::Ancestors {
                    "<-[:PARENT_OF]-"
                } else {
                    "-[:PARENT_OF]->"
                };
                let hops = match request.query.max_depth {
                    Some(k) => format!("1..{k}"),
                    None => "1..".to_string(),
                };
                steps.push(format!("NodeByIdSeek(id = {})", request.target));
                steps.push(format!("VarLengthExpand(All) {arrow} *{hops}"));

                let predicate = &request.query.predicate;
                let mut filters = Vec::new();
                if let Some(ref author) = predicate.author {
                    filters.push(format!("author = '{author}'"));
                }
                if let Some(ref part) = predicate.title_contains {
                    filters.push(format!("title CONTAINS '{part}'"));
                }
                if let Some(since) = predicate.created_since {
                    filters.push(format!("created_at >= {}", since.to_rfc3339()));
                }
                if !filters.is_empty() {
                    steps.push(format!("Filter({})", filters.join(" AND ")));
                }
                if !request.query.include_self {
                    steps.push("Filter(node <> start)".to_string());
                }
                steps.push("Distinct".to_string());
                steps.push("Sort(id ASC)".to_string());
            }
            QueryOperation::LatestCommonAncestor => {
                let other = request.other.unwrap_or(request.target);
                steps.push(format!("NodeByIdSeek(id = {})", request.target));
                steps.push("VarLengthExpand(All) <-[:PARENT_OF]- *0.. -> MarkVisited".to_string());
                steps.push(format!("NodeByIdSeek(id = {other})"));
                steps.push("VarLengthExpand(All) <-[:PARENT_OF]- *0..".to_string());
                steps.push("Filter(visited)".to_string());
                steps.push("Top(1, created_at DESC, id DESC)".to_string());
            }
        }
        steps.push(format!(
            "-- arena: {} nodes, {} edges",
            self.records.len(),
            self.edge_count
        ));
        steps
    }
}

impl StorageBackend for NativeGraphStore {
    fn name(&self) -> &str {
        BackendKind::Native.as_str()
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn insert_batch(&mut self, nodes: &[VersionNode], edges: &[ParentEdge]) -> Result<usize> {
        let mut records: Vec<NodeRecord> = Vec::with_capacity(nodes.len());
        let mut lookup: HashMap<VersionId, Slot> = HashMap::with_capacity(nodes.len());

        for node in nodes {
            let slot = Slot::try_from(records.len())
                .map_err(|_| Self::fail("arena slot space exhausted"))?;
            if lookup.insert(node.id, slot).is_some() {
                return Err(Self::fail(format!("duplicate node {}", node.id)));
            }
            records.push(NodeRecord {
                node: node.clone(),
                parents: Vec::new(),
                children: Vec::new(),
            });
        }

        for edge in edges {
            if edge.parent == edge.child {
                return Err(Self::fail(format!("self-loop on node {}", edge.child)));
            }
            let (Some(&parent), Some(&child)) = (lookup.get(&edge.parent), lookup.get(&edge.child))
            else {
                return Err(Self::fail(format!(
                    "edge {} -> {} references an unknown node",
                    edge.parent, edge.child
                )));
            };
            records[child as usize].parents.push(parent);
            records[parent as usize].children.push(child);
        }

        let mut edge_count = 0;
        for record in &mut records {
            record.parents.sort_unstable();
            record.parents.dedup();
            record.children.sort_unstable();
            record.children.dedup();
            edge_count += record.parents.len();
        }

        // Only swap in once the whole batch is valid.
        self.records = records;
        self.lookup = lookup;
        self.edge_count = edge_count;
        Ok(self.records.len())
    }

    fn find_ancestors(&self, id: VersionId, query: &TraversalQuery) -> Result<Vec<VersionNode>> {
        Ok(self.closure(id, Direction::Ancestors, query))
    }

    fn find_descendants(
        &self,
        id: VersionId,
        query: &TraversalQuery,
    ) -> Result<Vec<VersionNode>> {
        Ok(self.closure(id, Direction::Descendants, query))
    }

    fn find_latest_common_ancestor(
        &self,
        a: VersionId,
        b: VersionId,
    ) -> Result<Option<VersionNode>> {
        let (Some(left), Some(right)) = (self.slot_of(a), self.slot_of(b)) else {
            return Ok(None);
        };
        let mask = self.ancestor_mask(left);
        let best = self
            .expand(right, Direction::Ancestors, None)
            .into_iter()
            .filter(|&(slot, _)| mask[slot as usize])
            .map(|(slot, _)| &self.records[slot as usize].node)
            .max_by_key(|node| node.recency_key());
        Ok(best.cloned())
    }

    fn explain(&self, request: &ExplainRequest) -> Result<QueryPlan> {
        Ok(QueryPlan {
            backend: self.name().to_string(),
            operation: request.operation,
            steps: self.pipeline(request),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::generator::DagGenerator;
    use crate::graph::traversal;
    use crate::types::{NodePredicate, Topology};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn v(id: u64, secs: i64, author: &str) -> VersionNode {
        VersionNode {
            id: VersionId(id),
            title: format!("title {id}"),
            content: String::new(),
            author: author.to_string(),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    /// 1 -> {2, 3} -> 4
    fn diamond() -> NativeGraphStore {
        let nodes = vec![v(1, 1, "kanguk"), v(2, 2, "chulsu"), v(3, 3, "kanguk"), v(4, 4, "kanguk")];
        let edges = vec![
            ParentEdge::new(1, 2),
            ParentEdge::new(1, 3),
            ParentEdge::new(2, 4),
            ParentEdge::new(3, 4),
        ];
        let mut store = NativeGraphStore::new();
        store.insert_batch(&nodes, &edges).unwrap();
        store
    }

    fn ids(nodes: &[VersionNode]) -> Vec<u64> {
        nodes.iter().map(|n| n.id.get()).collect()
    }

    #[test]
    fn diamond_closures_are_deduplicated() {
        let store = diamond();
        let up = store.find_ancestors(VersionId(4), &TraversalQuery::all()).unwrap();
        assert_eq!(ids(&up), vec![1, 2, 3]);
        let down = store.find_descendants(VersionId(1), &TraversalQuery::all()).unwrap();
        assert_eq!(ids(&down), vec![2, 3, 4]);
    }

    #[test]
    fn predicate_and_depth_apply() {
        let store = diamond();
        let query = TraversalQuery::within(1)
            .including_self()
            .filtered(NodePredicate::default().author("kanguk"));
        let result = store.find_ancestors(VersionId(4), &query).unwrap();
        assert_eq!(ids(&result), vec![3, 4]);
    }

    #[test]
    fn lca_and_unknown_ids() {
        let store = diamond();
        let lca = store
            .find_latest_common_ancestor(VersionId(2), VersionId(3))
            .unwrap();
        assert_eq!(lca.map(|n| n.id), Some(VersionId(1)));
        assert_eq!(
            store
                .find_latest_common_ancestor(VersionId(2), VersionId(77))
                .unwrap(),
            None
        );
        assert!(store
            .find_descendants(VersionId(77), &TraversalQuery::all())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn rejected_batch_leaves_store_untouched() {
        let mut store = diamond();
        let err = store
            .insert_batch(&[v(9, 0, "x")], &[ParentEdge::new(8, 9)])
            .unwrap_err();
        assert!(err.to_string().contains("unknown node"));
        assert_eq!(store.node_count(), 4);
        assert_eq!(store.edge_count(), 4);
    }

    #[test]
    fn duplicate_nodes_are_rejected() {
        let mut store = NativeGraphStore::new();
        let err = store.insert_batch(&[v(1, 0, "a"), v(1, 0, "a")], &[]).unwrap_err();
        assert!(err.to_string().contains("duplicate node 1"));
    }

    #[test]
    fn matches_reference_on_generated_topologies() {
        for topology in Topology::ALL {
            let graph = DagGenerator::seeded(5).generate(topology, 150).unwrap();
            let mut store = NativeGraphStore::new();
            store.insert_batch(graph.nodes(), &graph.edges()).unwrap();
            assert_eq!(store.edge_count(), graph.edge_count());

            for raw in [1u64, 2, 75, 150] {
                let id = VersionId(raw);
                let query = TraversalQuery::within(4);
                assert_eq!(
                    store.find_ancestors(id, &TraversalQuery::all()).unwrap(),
                    traversal::ancestors(&graph, id, &TraversalQuery::all())
                );
                assert_eq!(
                    store.find_descendants(id, &query).unwrap(),
                    traversal::descendants(&graph, id, &query)
                );
            }
        }
    }

    #[test]
    fn explain_describes_pipeline() {
        let store = diamond();
        let query = TraversalQuery::within(3).filtered(NodePredicate::default().author("chulsu"));
        let plan = store
            .explain(&ExplainRequest::ancestors(VersionId(4), query))
            .unwrap();
        assert_eq!(plan.steps[0], "NodeByIdSeek(id = 4)");
        assert!(plan.steps.iter().any(|s| s.contains("*1..3")));
        assert!(plan.steps.iter().any(|s| s == "Filter(author = 'chulsu')"));
    }
}
