//! Synthetic DAG generation: chain, binary tree, and random multi-parent.
//!
//! Every node draws its parents from ids created strictly earlier, so the
//! result is acyclic without any cycle check.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{DagBenchError, Result};
use crate::graph::model::VersionGraph;
use crate::types::{Topology, VersionId, VersionNode};

/// Author pool for generated versions.
pub const AUTHORS: &[&str] = &["kanguk", "youngjin", "chulsu", "younghee"];

/// Title pool for generated versions.
pub const SAMPLE_TITLES: &[&str] = &[
    "hwp file edit",
    "pdf file edit",
    "document work",
    "plan revision",
    "ppt slide change",
];

/// Upper bound on parents per node in the complex topology.
pub const MAX_RANDOM_PARENTS: usize = 3;

// ---------------------------------------------------------------------------
// GeneratorOptions
// ---------------------------------------------------------------------------

/// Knobs for id layout and timestamps.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Id of the root; nodes are keyed `first_id ..= first_id + scale - 1`.
    pub first_id: u64,
    /// Timestamp of the root.
    pub epoch: DateTime<Utc>,
    /// Each node is `0..=max_time_step_secs` seconds after its predecessor.
    pub max_time_step_secs: u32,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            first_id: 1,
            epoch: default_epoch(),
            max_time_step_secs: 600,
        }
    }
}

/// 2025-02-01T00:00:00Z.
pub fn default_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// DagGenerator
// ---------------------------------------------------------------------------

/// Graph generator over a single injectable random source.
pub struct DagGenerator<R: Rng> {
    rng: R,
    options: GeneratorOptions,
}

impl DagGenerator<StdRng> {
    /// Reproducible generator.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed), GeneratorOptions::default())
    }

    /// Generator seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy(), GeneratorOptions::default())
    }

    /// Seeded when `seed` is set, entropy otherwise.
    pub fn from_seed_option(seed: Option<u64>, options: GeneratorOptions) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(rng, options)
    }
}

impl<R: Rng> DagGenerator<R> {
    pub fn new(rng: R, options: GeneratorOptions) -> Self {
        Self { rng, options }
    }

    pub fn with_options(mut self, options: GeneratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    /// Produce exactly `scale` nodes of the given topology.
    pub fn generate(&mut self, topology: Topology, scale: usize) -> Result<VersionGraph> {
        let root = self.validate(scale)?;
        let last = root + scale as u64 - 1;

        let mut graph = VersionGraph::with_capacity(scale);
        let mut created_at = self.options.epoch;
        let mut parents: Vec<VersionId> = Vec::with_capacity(MAX_RANDOM_PARENTS);

        for i in root..=last {
            parents.clear();
            match topology {
                Topology::Chain => {
                    if i > root {
                        parents.push(VersionId(i - 1));
                    }
                }
                Topology::BinaryTree => {
                    parents.extend(binary_tree_parent(root, i).map(VersionId));
                }
                Topology::ComplexRandom => {
                    // Candidate range is root..=i-1; empty for the root.
                    if i > root {
                        let count = self.rng.gen_range(1..=MAX_RANDOM_PARENTS);
                        for _ in 0..count {
                            parents.push(VersionId(self.rng.gen_range(root..i)));
                        }
                    }
                }
            }

            if i > root && self.options.max_time_step_secs > 0 {
                let step = self.rng.gen_range(0..=self.options.max_time_step_secs);
                created_at += Duration::seconds(i64::from(step));
            }

            let node = self.make_node(VersionId(i), created_at);
            graph
                .insert_node(node, &parents)
                .map_err(|e| DagBenchError::Generation(e.to_string()))?;
        }

        tracing::debug!(
            topology = %topology,
            nodes = graph.len(),
            edges = graph.edge_count(),
            "generated graph"
        );
        Ok(graph)
    }

    fn validate(&self, scale: usize) -> Result<u64> {
        if scale < 1 {
            return Err(DagBenchError::Generation(format!(
                "scale must be at least 1, got {scale}"
            )));
        }
        let root = self.options.first_id;
        if root == 0 {
            return Err(DagBenchError::Generation(
                "first_id must be at least 1".into(),
            ));
        }
        let fits = (scale as u64)
            .checked_sub(1)
            .and_then(|span| root.checked_add(span))
            .is_some_and(|last| last <= i64::MAX as u64);
        if !fits {
            return Err(DagBenchError::Generation(format!(
                "ids {root}.. with scale {scale} exceed the 63-bit key range"
            )));
        }
        Ok(root)
    }

    fn make_node(&mut self, id: VersionId, created_at: DateTime<Utc>) -> VersionNode {
        let author = AUTHORS[self.rng.gen_range(0..AUTHORS.len())];
        let title = SAMPLE_TITLES[self.rng.gen_range(0..SAMPLE_TITLES.len())];
        VersionNode {
            id,
            title: title.to_string(),
            content: format!("content of version {id}"),
            author: author.to_string(),
            created_at,
        }
    }
}

/// Parent of `i` in the binary-tree topology rooted at `root`.
pub fn binary_tree_parent(root: u64, i: u64) -> Option<u64> {
    (i > root).then(|| root + (i - root) / 2)
}
