//! Storage backend interface and its adapters.
//!
//! Every engine under test implements [`StorageBackend`]. The runner only
//! ever calls these operations; dialect-specific query construction stays
//! inside each adapter.

pub mod native;
pub mod reference;
pub mod sqlite;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ParentEdge, TraversalQuery, VersionId, VersionNode};

pub use native::NativeGraphStore;
pub use reference::ReferenceBackend;
pub use sqlite::SqliteBackend;

// ---------------------------------------------------------------------------
// BackendKind
// ---------------------------------------------------------------------------

/// The engines dagbench knows how to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Relational store answering with recursive CTEs.
    Sqlite,
    /// Adjacency-arena store answering with native traversal.
    Native,
    /// The in-memory oracle exposed as a backend.
    Reference,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::Sqlite, Self::Native, Self::Reference];

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "relational" | "sql" => Some(Self::Sqlite),
            "native" | "graph" | "graph-native" => Some(Self::Native),
            "reference" | "memory" | "in-memory" | "oracle" => Some(Self::Reference),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Native => "native",
            Self::Reference => "reference",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_str_loose(s)
            .ok_or_else(|| format!("unknown backend '{s}' (expected sqlite, native or reference)"))
    }
}

// ---------------------------------------------------------------------------
// Explain
// ---------------------------------------------------------------------------

/// Which interface operation a plan describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryOperation {
    Ancestors,
    Descendants,
    LatestCommonAncestor,
}

impl QueryOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ancestors => "ancestors",
            Self::Descendants => "descendants",
            Self::LatestCommonAncestor => "latest-common-ancestor",
        }
    }
}

impl fmt::Display for QueryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to [`StorageBackend::explain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainRequest {
    pub operation: QueryOperation,
    pub target: VersionId,
    /// Second node for latest-common-ancestor plans.
    pub other: Option<VersionId>,
    pub query: TraversalQuery,
}

impl ExplainRequest {
    pub fn ancestors(target: VersionId, query: TraversalQuery) -> Self {
        Self {
            operation: QueryOperation::Ancestors,
            target,
            other: None,
            query,
        }
    }

    pub fn descendants(target: VersionId, query: TraversalQuery) -> Self {
        Self {
            operation: QueryOperation::Descendants,
            target,
            other: None,
            query,
        }
    }

    pub fn latest_common_ancestor(a: VersionId, b: VersionId) -> Self {
        Self {
            operation: QueryOperation::LatestCommonAncestor,
            target: a,
            other: Some(b),
            query: TraversalQuery::all(),
        }
    }
}

/// Implementation-defined plan description. Diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryPlan {
    pub backend: String,
    pub operation: QueryOperation,
    pub steps: Vec<String>,
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}] {}", self.backend, self.operation)?;
        for step in &self.steps {
            writeln!(f, "  {step}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StorageBackend
// ---------------------------------------------------------------------------

/// The interface every persistence engine must satisfy.
///
/// Closure results are de-duplicated and sorted by id. Unknown ids yield
/// empty results, never errors; errors are reserved for engine faults.
pub trait StorageBackend: Send + Sync {
    /// Label used in logs and reports.
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Bulk-load a full graph. Returns the number of nodes inserted.
    fn insert_batch(&mut self, nodes: &[VersionNode], edges: &[ParentEdge]) -> Result<usize>;

    fn find_ancestors(&self, id: VersionId, query: &TraversalQuery) -> Result<Vec<VersionNode>>;

    fn find_descendants(&self, id: VersionId, query: &TraversalQuery)
        -> Result<Vec<VersionNode>>;

    /// Newest common ancestor of `a` and `b` (each counted as its own
    /// ancestor), larger id breaking timestamp ties.
    fn find_latest_common_ancestor(&self, a: VersionId, b: VersionId)
        -> Result<Option<VersionNode>>;

    fn explain(&self, request: &ExplainRequest) -> Result<QueryPlan>;
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Settings needed to open any backend.
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    /// Directory for SQLite database files; in-memory when `None`.
    pub sqlite_dir: Option<PathBuf>,
    /// Create the parent -> child index in SQLite.
    pub reverse_index: bool,
}

/// Open an empty backend of the given kind.
///
/// `label` names the workload (e.g. `chain-1000`); a file-backed SQLite
/// store lives at `{sqlite_dir}/{label}.db`.
pub fn open_backend(
    kind: BackendKind,
    options: &BackendOptions,
    label: &str,
) -> Result<Box<dyn StorageBackend>> {
    let backend: Box<dyn StorageBackend> = match kind {
        BackendKind::Sqlite => {
            let path = match options.sqlite_dir {
                Some(ref dir) => {
                    std::fs::create_dir_all(dir)?;
                    Some(dir.join(format!("{label}.db")))
                }
                None => None,
            };
            let sqlite_options = sqlite::SqliteOptions {
                path,
                reverse_index: options.reverse_index,
            };
            Box::new(SqliteBackend::open(&sqlite_options)?)
        }
        BackendKind::Native => Box::new(NativeGraphStore::new()),
        BackendKind::Reference => Box::new(ReferenceBackend::new()),
    };
    tracing::debug!(backend = backend.name(), label, "opened backend");
    Ok(backend)
}
