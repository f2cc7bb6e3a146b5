//! Comparison of backend answers against the reference traversal.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::backend::BackendKind;
use crate::bench::scenario::{QueryResult, ScenarioKind, Target};
use crate::bench::SampleMode;
use crate::error::DagBenchError;
use crate::types::{Topology, VersionId};

/// A backend result that disagrees with the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inconsistency {
    pub topology: Topology,
    pub scale: usize,
    pub scenario: ScenarioKind,
    pub backend: BackendKind,
    pub mode: SampleMode,
    pub iteration: usize,
    pub target: Target,
    /// Ids the oracle returned and the backend did not.
    pub missing: Vec<VersionId>,
    /// Ids the backend returned and the oracle did not.
    pub unexpected: Vec<VersionId>,
    pub detail: String,
}

impl Inconsistency {
    pub fn to_error(&self) -> DagBenchError {
        DagBenchError::Inconsistency {
            backend: self.backend.to_string(),
            scenario: self.scenario.to_string(),
            target: self.target.to_string(),
            detail: self.detail.clone(),
        }
    }
}

/// Set difference between expected and actual ids, each side sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdDiff {
    pub missing: Vec<VersionId>,
    pub unexpected: Vec<VersionId>,
}

impl IdDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

pub fn diff_ids(expected: &[VersionId], actual: &[VersionId]) -> IdDiff {
    let expected: BTreeSet<VersionId> = expected.iter().copied().collect();
    let actual: BTreeSet<VersionId> = actual.iter().copied().collect();
    IdDiff {
        missing: expected.difference(&actual).copied().collect(),
        unexpected: actual.difference(&expected).copied().collect(),
    }
}

/// Describe how `actual` differs from `expected`, or `None` when they agree.
///
/// Closures must match the oracle exactly: same ids, no duplicates, sorted
/// by id, and identical node attributes.
pub fn compare(expected: &QueryResult, actual: &QueryResult) -> Option<(IdDiff, String)> {
    match (expected, actual) {
        (QueryResult::Nodes(want), QueryResult::Nodes(got)) => {
            let diff = diff_ids(&expected.ids(), &actual.ids());
            if !diff.is_empty() {
                let detail = format!(
                    "expected {} nodes, got {}; missing {:?}, unexpected {:?}",
                    want.len(),
                    got.len(),
                    raw(&diff.missing),
                    raw(&diff.unexpected)
                );
                return Some((diff, detail));
            }
            if got.len() != want.len() {
                return Some((diff, format!("{} duplicate nodes", got.len().abs_diff(want.len()))));
            }
            if got.windows(2).any(|w| w[0].id >= w[1].id) {
                return Some((diff, "results not sorted by id".to_string()));
            }
            if let Some((w, _)) = want.iter().zip(got).find(|(w, g)| w != g) {
                return Some((diff, format!("attributes differ for node {}", w.id)));
            }
            None
        }
        (QueryResult::Ancestor(want), QueryResult::Ancestor(got)) => {
            let want_id = want.as_ref().map(|n| n.id);
            let got_id = got.as_ref().map(|n| n.id);
            if want_id != got_id {
                let diff = diff_ids(&expected.ids(), &actual.ids());
                return Some((diff, format!("expected {}, got {}", show(want_id), show(got_id))));
            }
            if want != got {
                return Some((
                    IdDiff::default(),
                    format!("attributes differ for node {}", show(want_id)),
                ));
            }
            None
        }
        _ => Some((
            diff_ids(&expected.ids(), &actual.ids()),
            "result shape mismatch".to_string(),
        )),
    }
}

fn raw(ids: &[VersionId]) -> Vec<u64> {
    ids.iter().map(|id| id.get()).collect()
}

fn show(id: Option<VersionId>) -> String {
    id.map_or_else(|| "none".to_string(), |id| id.to_string())
}
