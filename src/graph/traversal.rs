//! Reference traversal algorithms over the in-memory [`VersionGraph`].
//!
//! These are the correctness oracle for every storage backend: breadth-first
//! closures with a visited set keyed by id (diamonds yield each node once),
//! a depth-bounded variant, and latest-common-ancestor selection.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::graph::model::VersionGraph;
use crate::types::{Direction, TraversalQuery, VersionId, VersionNode};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// A node annotated with its shortest hop count from the starting point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeWithDepth {
    pub node: VersionNode,
    pub depth: u32,
}

// ---------------------------------------------------------------------------
// Closures
// ---------------------------------------------------------------------------

/// Shortest hop distance from `start` to every node reachable in
/// `direction`, bounded by `max_depth` when set. The start node maps to 0.
///
/// Unknown start ids yield an empty map.
pub fn hop_distances(
    graph: &VersionGraph,
    start: VersionId,
    direction: Direction,
    max_depth: Option<u32>,
) -> HashMap<VersionId, u32> {
    let mut dist: HashMap<VersionId, u32> = HashMap::new();
    if !graph.contains(start) {
        return dist;
    }

    let mut queue: VecDeque<(VersionId, u32)> = VecDeque::new();
    dist.insert(start, 0);
    queue.push_back((start, 0));

    while let Some((current, depth)) = queue.pop_front() {
        if max_depth.is_some_and(|k| depth >= k) {
            continue;
        }
        let next = match direction {
            Direction::Ancestors => graph.parents_of(current),
            Direction::Descendants => graph.children_of(current),
        };
        for &neighbor in next {
            // BFS discovers each node first along a shortest path.
            if !dist.contains_key(&neighbor) {
                dist.insert(neighbor, depth + 1);
                queue.push_back((neighbor, depth + 1));
            }
        }
    }
    dist
}

/// Closure in `direction`, filtered by `query`, with hop counts, sorted by
/// id.
pub fn closure_with_depth(
    graph: &VersionGraph,
    start: VersionId,
    direction: Direction,
    query: &TraversalQuery,
) -> Vec<NodeWithDepth> {
    let dist = hop_distances(graph, start, direction, query.max_depth);
    let mut out: Vec<NodeWithDepth> = dist
        .into_iter()
        .filter(|&(id, _)| query.include_self || id != start)
        .filter_map(|(id, depth)| graph.node(id).map(|node| (node, depth)))
        .filter(|(node, _)| query.predicate.matches(node))
        .map(|(node, depth)| NodeWithDepth {
            node: node.clone(),
            depth,
        })
        .collect();
    out.sort_by_key(|n| n.node.id);
    out
}

/// Closure in `direction`, filtered by `query`, sorted by id.
pub fn closure(
    graph: &VersionGraph,
    start: VersionId,
    direction: Direction,
    query: &TraversalQuery,
) -> Vec<VersionNode> {
    closure_with_depth(graph, start, direction, query)
        .into_iter()
        .map(|n| n.node)
        .collect()
}

/// All ancestors of `id` matching `query`.
pub fn ancestors(graph: &VersionGraph, id: VersionId, query: &TraversalQuery) -> Vec<VersionNode> {
    closure(graph, id, Direction::Ancestors, query)
}

/// All descendants of `id` matching `query`.
pub fn descendants(
    graph: &VersionGraph,
    id: VersionId,
    query: &TraversalQuery,
) -> Vec<VersionNode> {
    closure(graph, id, Direction::Descendants, query)
}

/// Ids of every ancestor of `id`, plus `id` itself if `include_self`.
pub fn ancestor_ids(graph: &VersionGraph, id: VersionId, include_self: bool) -> HashSet<VersionId> {
    let mut ids: HashSet<VersionId> = hop_distances(graph, id, Direction::Ancestors, None)
        .into_keys()
        .collect();
    if !include_self {
        ids.remove(&id);
    }
    ids
}

// ---------------------------------------------------------------------------
// Latest common ancestor
// ---------------------------------------------------------------------------

/// The common ancestor (each side including itself) with the newest
/// `created_at`, larger id winning ties. `None` if the ancestor sets are
/// disjoint or either id is unknown.
pub fn latest_common_ancestor(
    graph: &VersionGraph,
    a: VersionId,
    b: VersionId,
) -> Option<&VersionNode> {
    let left = ancestor_ids(graph, a, true);
    if left.is_empty() {
        return None;
    }
    let right = ancestor_ids(graph, b, true);

    left.intersection(&right)
        .filter_map(|&id| graph.node(id))
        .max_by_key(|node| node.recency_key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::generator::DagGenerator;
    use crate::types::{NodePredicate, Topology};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn v(id: u64, secs: i64, author: &str) -> VersionNode {
        VersionNode {
            id: VersionId(id),
            title: format!("t{id}"),
            content: String::new(),
            author: author.to_string(),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    fn id_list(nodes: &[VersionNode]) -> Vec<u64> {
        nodes.iter().map(|n| n.id.get()).collect()
    }

    fn chain5() -> VersionGraph {
        DagGenerator::seeded(0).generate(Topology::Chain, 5).unwrap()
    }

    /// 1 -> {2, 3}, {2, 3} -> 4, 4 -> 5, 1 -> 6
    fn diamond() -> VersionGraph {
        let mut g = VersionGraph::new();
        g.insert_node(v(1, 10, "a"), &[]).unwrap();
        g.insert_node(v(2, 20, "b"), &[VersionId(1)]).unwrap();
        g.insert_node(v(3, 20, "a"), &[VersionId(1)]).unwrap();
        g.insert_node(v(4, 40, "b"), &[VersionId(2), VersionId(3)])
            .unwrap();
        g.insert_node(v(5, 50, "a"), &[VersionId(4)]).unwrap();
        g.insert_node(v(6, 60, "a"), &[VersionId(1)]).unwrap();
        g
    }

    // -- chain ----------------------------------------------------------------

    #[test]
    fn chain_ancestors_of_last() {
        let g = chain5();
        let got = ancestors(&g, VersionId(5), &TraversalQuery::all());
        assert_eq!(id_list(&got), vec![1, 2, 3, 4]);
    }

    #[test]
    fn chain_descendants_of_root() {
        let g = chain5();
        let got = descendants(&g, VersionId(1), &TraversalQuery::all());
        assert_eq!(id_list(&got), vec![2, 3, 4, 5]);
    }

    #[test]
    fn chain_lca_of_ancestor_and_descendant_is_the_ancestor() {
        let g = chain5();
        let lca = latest_common_ancestor(&g, VersionId(3), VersionId(5)).unwrap();
        assert_eq!(lca.id, VersionId(3));
    }

    #[test]
    fn root_has_no_ancestors() {
        let g = chain5();
        assert!(ancestors(&g, VersionId(1), &TraversalQuery::all()).is_empty());
    }

    #[test]
    fn include_self_adds_start_node() {
        let g = chain5();
        let got = ancestors(&g, VersionId(3), &TraversalQuery::all().including_self());
        assert_eq!(id_list(&got), vec![1, 2, 3]);
    }

    #[test]
    fn unknown_node_yields_empty_results() {
        let g = chain5();
        assert!(ancestors(&g, VersionId(99), &TraversalQuery::all().including_self()).is_empty());
        assert!(descendants(&g, VersionId(99), &TraversalQuery::all()).is_empty());
        assert!(latest_common_ancestor(&g, VersionId(99), VersionId(1)).is_none());
        assert!(latest_common_ancestor(&g, VersionId(1), VersionId(99)).is_none());
    }

    // -- diamond --------------------------------------------------------------

    #[test]
    fn diamond_paths_are_deduplicated() {
        let g = diamond();
        let got = ancestors(&g, VersionId(5), &TraversalQuery::all());
        assert_eq!(id_list(&got), vec![1, 2, 3, 4]);
        let got = descendants(&g, VersionId(1), &TraversalQuery::all());
        assert_eq!(id_list(&got), vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn siblings_share_their_parent_as_lca() {
        let g = diamond();
        let lca = latest_common_ancestor(&g, VersionId(2), VersionId(3)).unwrap();
        assert_eq!(lca.id, VersionId(1));
    }

    #[test]
    fn lca_prefers_newest_timestamp() {
        let g = diamond();
        // Common ancestors of 5 and 4: {1, 2, 3, 4}; 4 is newest.
        let lca = latest_common_ancestor(&g, VersionId(5), VersionId(4)).unwrap();
        assert_eq!(lca.id, VersionId(4));
        // Common ancestors of 5 and 6: {1}.
        let lca = latest_common_ancestor(&g, VersionId(5), VersionId(6)).unwrap();
        assert_eq!(lca.id, VersionId(1));
    }

    #[test]
    fn lca_ties_break_on_larger_id() {
        // 2 and 3 share timestamp 20 and are both ancestors of 4 and 5.
        let mut g = diamond();
        g.insert_node(v(7, 70, "a"), &[VersionId(2), VersionId(3)])
            .unwrap();
        g.insert_node(v(8, 80, "a"), &[VersionId(2), VersionId(3)])
            .unwrap();
        let lca = latest_common_ancestor(&g, VersionId(7), VersionId(8)).unwrap();
        assert_eq!(lca.id, VersionId(3));
    }

    #[test]
    fn lca_is_none_for_disjoint_roots() {
        let mut g = VersionGraph::new();
        g.insert_node(v(1, 1, "a"), &[]).unwrap();
        g.insert_node(v(2, 2, "a"), &[]).unwrap();
        assert!(latest_common_ancestor(&g, VersionId(1), VersionId(2)).is_none());
    }

    #[test]
    fn lca_of_node_with_itself_is_itself() {
        let g = diamond();
        for id in g.ids() {
            assert_eq!(latest_common_ancestor(&g, id, id).map(|n| n.id), Some(id));
        }
    }

    // -- depth bound ----------------------------------------------------------

    #[test]
    fn depth_bound_limits_hops() {
        let g = chain5();
        let got = ancestors(&g, VersionId(5), &TraversalQuery::within(2));
        assert_eq!(id_list(&got), vec![3, 4]);
        let got = ancestors(&g, VersionId(5), &TraversalQuery::within(0));
        assert!(got.is_empty());
        let got = ancestors(&g, VersionId(5), &TraversalQuery::within(0).including_self());
        assert_eq!(id_list(&got), vec![5]);
    }

    #[test]
    fn depth_bound_uses_shortest_path() {
        // 1 -> 2 -> 3 -> 4 and 1 -> 4: node 1 is one hop from 4.
        let mut g = VersionGraph::new();
        g.insert_node(v(1, 1, "a"), &[]).unwrap();
        g.insert_node(v(2, 2, "a"), &[VersionId(1)]).unwrap();
        g.insert_node(v(3, 3, "a"), &[VersionId(2)]).unwrap();
        g.insert_node(v(4, 4, "a"), &[VersionId(3), VersionId(1)])
            .unwrap();

        let got = closure_with_depth(
            &g,
            VersionId(4),
            Direction::Ancestors,
            &TraversalQuery::within(1),
        );
        let pairs: Vec<(u64, u32)> = got.iter().map(|n| (n.node.id.get(), n.depth)).collect();
        assert_eq!(pairs, vec![(1, 1), (3, 1)]);
    }

    #[test]
    fn predicate_filters_without_pruning_the_walk() {
        let g = diamond();
        // Node 4 (author b) is skipped but its ancestors are still reached.
        let query = TraversalQuery::all().filtered(NodePredicate::default().author("a"));
        let got = ancestors(&g, VersionId(5), &query);
        assert_eq!(id_list(&got), vec![1, 3]);
    }

    #[test]
    fn hop_distances_include_start_at_zero() {
        let g = chain5();
        let dist = hop_distances(&g, VersionId(1), Direction::Descendants, None);
        assert_eq!(dist.len(), 5);
        assert_eq!(dist[&VersionId(1)], 0);
        assert_eq!(dist[&VersionId(5)], 4);
    }

    #[test]
    fn ancestor_ids_respects_include_self() {
        let g = diamond();
        let with = ancestor_ids(&g, VersionId(4), true);
        let without = ancestor_ids(&g, VersionId(4), false);
        assert!(with.contains(&VersionId(4)));
        assert!(!without.contains(&VersionId(4)));
        assert_eq!(with.len(), without.len() + 1);
    }
}
