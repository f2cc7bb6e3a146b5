//! In-memory version DAG with adjacency in both directions.
//!
//! Nodes are appended in creation order and can only name parents that are
//! already present, which keeps the edge relation acyclic by construction.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::types::{ParentEdge, VersionId, VersionNode};

// ---------------------------------------------------------------------------
// GraphError
// ---------------------------------------------------------------------------

/// Violations of the append-only construction rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("node {0} already exists")]
    DuplicateNode(VersionId),

    #[error("node {0} lists itself as a parent")]
    SelfLoop(VersionId),

    #[error("node {child} references parent {parent}, which was not created earlier")]
    UnknownParent { child: VersionId, parent: VersionId },

    #[error("node {child} lists parent {parent}, which is created after it")]
    NotEarlier { child: VersionId, parent: VersionId },

    #[error("edge {parent} -> {child} references an unknown child")]
    UnknownChild { parent: VersionId, child: VersionId },
}

// ---------------------------------------------------------------------------
// VersionGraph
// ---------------------------------------------------------------------------

/// Owner of every node and edge of one generated DAG.
#[derive(Debug, Clone, Default)]
pub struct VersionGraph {
    nodes: Vec<VersionNode>,
    index: HashMap<VersionId, usize>,
    parents: Vec<Vec<VersionId>>,
    children: Vec<Vec<VersionId>>,
    edge_count: usize,
}

impl VersionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            parents: Vec::with_capacity(capacity),
            children: Vec::with_capacity(capacity),
            edge_count: 0,
        }
    }

    /// Rebuild a graph from a node list (creation order) and an edge list.
    ///
    /// Used by backends that materialise their own copy during
    /// `insert_batch`. Edges whose parent appears later than the child in
    /// `nodes` are rejected with [`GraphError::NotEarlier`].
    pub fn from_parts(nodes: &[VersionNode], edges: &[ParentEdge]) -> Result<Self, GraphError> {
        let mut by_child: HashMap<VersionId, Vec<VersionId>> = HashMap::new();
        for edge in edges {
            by_child.entry(edge.child).or_default().push(edge.parent);
        }

        let positions: HashMap<VersionId, usize> =
            nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();

        let mut graph = Self::with_capacity(nodes.len());
        for (pos, node) in nodes.iter().enumerate() {
            let parents = by_child.remove(&node.id).unwrap_or_default();
            if let Some(&parent) = parents
                .iter()
                .find(|p| positions.get(p).is_some_and(|&ppos| ppos > pos))
            {
                return Err(GraphError::NotEarlier {
                    child: node.id,
                    parent,
                });
            }
            graph.insert_node(node.clone(), &parents)?;
        }

        // Anything left over points at a child that was never inserted.
        if let Some((child, parents)) = by_child.into_iter().next() {
            let parent = parents.first().copied().unwrap_or(child);
            return Err(GraphError::UnknownChild { parent, child });
        }
        Ok(graph)
    }

    /// Append a node. Duplicate entries in `parents` collapse to one edge.
    pub fn insert_node(
        &mut self,
        node: VersionNode,
        parents: &[VersionId],
    ) -> Result<(), GraphError> {
        let id = node.id;
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }

        let mut unique: Vec<VersionId> = parents.to_vec();
        unique.sort_unstable();
        unique.dedup();

        for &parent in &unique {
            if parent == id {
                return Err(GraphError::SelfLoop(id));
            }
            if !self.index.contains_key(&parent) {
                return Err(GraphError::UnknownParent { child: id, parent });
            }
        }

        let pos = self.nodes.len();
        for &parent in &unique {
            let parent_pos = self.index[&parent];
            self.children[parent_pos].push(id);
        }
        self.edge_count += unique.len();
        self.index.insert(id, pos);
        self.nodes.push(node);
        self.parents.push(unique);
        self.children.push(Vec::new());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn contains(&self, id: VersionId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn node(&self, id: VersionId) -> Option<&VersionNode> {
        self.index.get(&id).map(|&pos| &self.nodes[pos])
    }

    /// Direct parents of `id`, sorted ascending. Empty for unknown ids.
    pub fn parents_of(&self, id: VersionId) -> &[VersionId] {
        self.index
            .get(&id)
            .map(|&pos| self.parents[pos].as_slice())
            .unwrap_or(&[])
    }

    /// Direct children of `id`, in creation order. Empty for unknown ids.
    pub fn children_of(&self, id: VersionId) -> &[VersionId] {
        self.index
            .get(&id)
            .map(|&pos| self.children[pos].as_slice())
            .unwrap_or(&[])
    }

    /// All nodes in creation order.
    pub fn nodes(&self) -> &[VersionNode] {
        &self.nodes
    }

    pub fn ids(&self) -> impl Iterator<Item = VersionId> + '_ {
        self.nodes.iter().map(|n| n.id)
    }

    /// All edges, grouped by child in creation order.
    pub fn edges(&self) -> Vec<ParentEdge> {
        let mut out = Vec::with_capacity(self.edge_count);
        for (node, parents) in self.nodes.iter().zip(&self.parents) {
            for &parent in parents {
                out.push(ParentEdge {
                    parent,
                    child: node.id,
                });
            }
        }
        out
    }

    pub fn first_id(&self) -> Option<VersionId> {
        self.nodes.first().map(|n| n.id)
    }

    pub fn last_id(&self) -> Option<VersionId> {
        self.nodes.last().map(|n| n.id)
    }

    /// The node halfway through creation order.
    pub fn middle_id(&self) -> Option<VersionId> {
        self.nodes.get(self.nodes.len() / 2).map(|n| n.id)
    }

    /// Stable digest of ids, timestamps and edges.
    ///
    /// Two graphs with the same fingerprint load identical data into every
    /// backend; attributes other than the timestamp are not hashed.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.nodes.len() as u64).to_le_bytes());
        for (node, parents) in self.nodes.iter().zip(&self.parents) {
            hasher.update(node.id.get().to_le_bytes());
            hasher.update(node.created_at.timestamp().to_le_bytes());
            hasher.update((parents.len() as u64).to_le_bytes());
            for parent in parents {
                hasher.update(parent.get().to_le_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}
