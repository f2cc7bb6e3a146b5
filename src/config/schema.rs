//! Configuration data structures for dagbench.
//!
//! Defines the YAML config format: which graphs to generate, which backends
//! to compare, how many repetitions to measure, and the predicate parameters
//! of the filtered scenarios. Every field has a default so partial files
//! load cleanly.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{BackendKind, BackendOptions};
use crate::bench::scenario::ScenarioKind;
use crate::error::{DagBenchError, Result};
use crate::types::Topology;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for a benchmark run.
///
/// Loaded from YAML files, environment variables, and CLI flags.
/// Multiple sources are merged with well-defined priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Graphs to generate, measured in order.
    #[serde(default = "default_topologies")]
    pub topologies: Vec<TopologySpec>,

    /// Measured repetitions per scenario and backend.
    #[serde(default = "default_repetitions")]
    pub repetitions: usize,

    /// Backends to compare.
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendKind>,

    /// Seed for graph generation and target selection; entropy when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Check every result against the in-memory reference traversal.
    #[serde(default = "default_true")]
    pub verify: bool,

    /// Run each scenario once per backend before measuring.
    #[serde(default = "default_true")]
    pub warmup: bool,

    /// Measure backends concurrently, one task per backend.
    #[serde(default)]
    pub parallel_backends: bool,

    /// Client threads for the concurrent pass; 1 disables it.
    #[serde(default = "default_clients")]
    pub concurrent_clients: usize,

    #[serde(default)]
    pub scenarios: ScenarioConfig,

    #[serde(default)]
    pub sqlite: SqliteConfig,

    #[serde(default)]
    pub output: OutputFormat,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            topologies: default_topologies(),
            repetitions: default_repetitions(),
            backends: default_backends(),
            seed: None,
            verify: true,
            warmup: true,
            parallel_backends: false,
            concurrent_clients: default_clients(),
            scenarios: ScenarioConfig::default(),
            sqlite: SqliteConfig::default(),
            output: OutputFormat::default(),
        }
    }
}

impl BenchConfig {
    /// Reject configurations the runner cannot execute.
    pub fn validate(&self) -> Result<()> {
        if self.topologies.is_empty() {
            return Err(DagBenchError::Config("no topologies configured".into()));
        }
        if self.backends.is_empty() {
            return Err(DagBenchError::Config("no backends configured".into()));
        }
        for (i, kind) in self.backends.iter().enumerate() {
            if self.backends[..i].contains(kind) {
                return Err(DagBenchError::Config(format!("backend {kind} listed twice")));
            }
        }
        if self.concurrent_clients == 0 {
            return Err(DagBenchError::Config(
                "concurrent_clients must be at least 1".into(),
            ));
        }
        if self.scenarios.enabled.is_empty() {
            return Err(DagBenchError::Config("no scenarios enabled".into()));
        }
        Ok(())
    }

    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            sqlite_dir: self.sqlite.path.clone(),
            reverse_index: self.sqlite.reverse_index,
        }
    }
}

// ---------------------------------------------------------------------------
// TopologySpec
// ---------------------------------------------------------------------------

/// One graph to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySpec {
    pub kind: Topology,
    pub scale: usize,
}

impl TopologySpec {
    pub fn new(kind: Topology, scale: usize) -> Self {
        Self { kind, scale }
    }

    /// `{kind}-{scale}`, used for database file names and log fields.
    pub fn label(&self) -> String {
        format!("{}-{}", self.kind, self.scale)
    }

    /// Parse `kind:scale`, e.g. `complex:5000`.
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, scale) = s.split_once(':')?;
        Some(Self {
            kind: Topology::from_str_loose(kind)?,
            scale: scale.trim().replace('_', "").parse().ok()?,
        })
    }
}

impl fmt::Display for TopologySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} nodes)", self.kind, self.scale)
    }
}

// ---------------------------------------------------------------------------
// ScenarioConfig
// ---------------------------------------------------------------------------

/// Which scenarios run, and the parameters of the filtered ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default = "default_scenarios")]
    pub enabled: Vec<ScenarioKind>,

    /// Filter for `ancestors-by-author-title`.
    #[serde(default = "default_author_title")]
    pub author_title: AuthorTitle,

    /// Filter and hop limit for `bounded-ancestors-by-author-title`.
    #[serde(default)]
    pub bounded: BoundedScenario,

    /// Threshold for `descendants-since`; the graph's timestamp midpoint
    /// when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_since: Option<DateTime<Utc>>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            enabled: default_scenarios(),
            author_title: default_author_title(),
            bounded: BoundedScenario::default(),
            created_since: None,
        }
    }
}

impl ScenarioConfig {
    pub fn is_enabled(&self, kind: ScenarioKind) -> bool {
        self.enabled.contains(&kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorTitle {
    pub author: String,
    /// Case-sensitive title substring.
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundedScenario {
    #[serde(default = "default_bounded_author")]
    pub author: String,
    #[serde(default = "default_bounded_title")]
    pub title: String,
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
    #[serde(default = "default_true")]
    pub include_self: bool,
}

impl Default for BoundedScenario {
    fn default() -> Self {
        Self {
            author: default_bounded_author(),
            title: default_bounded_title(),
            max_hops: default_max_hops(),
            include_self: true,
        }
    }
}

// ---------------------------------------------------------------------------
// SqliteConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Directory for `{topology}-{scale}.db` files; in-memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Create the `(parent_id, child_id)` index.
    #[serde(default = "default_true")]
    pub reverse_index: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: None,
            reverse_index: true,
        }
    }
}

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl OutputFormat {
    /// Parse from a loose string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "table" | "text" => Some(Self::Table),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_topologies() -> Vec<TopologySpec> {
    Topology::ALL
        .into_iter()
        .map(|kind| TopologySpec::new(kind, 1_000))
        .collect()
}

fn default_repetitions() -> usize {
    10
}

fn default_backends() -> Vec<BackendKind> {
    vec![BackendKind::Sqlite, BackendKind::Native]
}

fn default_true() -> bool {
    true
}

fn default_clients() -> usize {
    1
}

fn default_scenarios() -> Vec<ScenarioKind> {
    ScenarioKind::ALL.to_vec()
}

fn default_author_title() -> AuthorTitle {
    AuthorTitle {
        author: "kanguk".to_string(),
        title: "pdf".to_string(),
    }
}

fn default_bounded_author() -> String {
    "chulsu".to_string()
}

fn default_bounded_title() -> String {
    "ppt".to_string()
}

fn default_max_hops() -> u32 {
    3
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
