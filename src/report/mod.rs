//! Aggregation and rendering of benchmark results.
//!
//! [`RunReport`] wraps a finished [`RunRecord`] with per-group latency
//! statistics and an overall [`RunOutcome`], and renders them as aligned
//! text tables or JSON.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::backend::BackendKind;
use crate::bench::runner::{LoadStatus, Phase, RunRecord, Sample, SampleMode};
use crate::bench::scenario::ScenarioKind;
use crate::config::BenchConfig;
use crate::error::Result;
use crate::types::Topology;

// ---------------------------------------------------------------------------
// LatencyStats
// ---------------------------------------------------------------------------

fn serialize_opt_micros<S: Serializer>(
    d: &Option<Duration>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&(d.as_secs_f64() * 1_000_000.0)),
        None => s.serialize_none(),
    }
}

/// Latency summary for one `(topology, scenario, backend, mode)` group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub run: usize,
    pub topology: Topology,
    pub scale: usize,
    pub scenario: ScenarioKind,
    pub backend: BackendKind,
    pub mode: SampleMode,
    /// Successful samples.
    pub samples: usize,
    pub failed: usize,
    #[serde(rename = "min_us", serialize_with = "serialize_opt_micros")]
    pub min: Option<Duration>,
    #[serde(rename = "max_us", serialize_with = "serialize_opt_micros")]
    pub max: Option<Duration>,
    #[serde(rename = "avg_us", serialize_with = "serialize_opt_micros")]
    pub avg: Option<Duration>,
    pub avg_cardinality: Option<f64>,
}

impl LatencyStats {
    fn empty(sample: &Sample) -> Self {
        Self {
            run: sample.run,
            topology: sample.topology,
            scale: sample.scale,
            scenario: sample.scenario,
            backend: sample.backend,
            mode: sample.mode,
            samples: 0,
            failed: 0,
            min: None,
            max: None,
            avg: None,
            avg_cardinality: None,
        }
    }

    pub fn has_samples(&self) -> bool {
        self.samples > 0
    }
}

type GroupKey = (usize, ScenarioKind, BackendKind, SampleMode);

/// Group samples and compute count/min/max/avg per group, ordered by
/// topology, scenario, backend and mode.
pub fn aggregate(samples: &[Sample]) -> Vec<LatencyStats> {
    struct Acc {
        stats: LatencyStats,
        total: Duration,
        cardinality: usize,
    }

    let mut groups: BTreeMap<GroupKey, Acc> = BTreeMap::new();
    for sample in samples {
        let key = (sample.run, sample.scenario, sample.backend, sample.mode);
        let acc = groups.entry(key).or_insert_with(|| Acc {
            stats: LatencyStats::empty(sample),
            total: Duration::ZERO,
            cardinality: 0,
        });
        match (sample.latency(), sample.cardinality()) {
            (Some(latency), Some(cardinality)) => {
                let stats = &mut acc.stats;
                stats.samples += 1;
                stats.min = Some(stats.min.map_or(latency, |m| m.min(latency)));
                stats.max = Some(stats.max.map_or(latency, |m| m.max(latency)));
                acc.total += latency;
                acc.cardinality += cardinality;
            }
            _ => acc.stats.failed += 1,
        }
    }

    groups
        .into_values()
        .map(|mut acc| {
            let n = acc.stats.samples;
            if n > 0 {
                acc.stats.avg = Some(acc.total / n as u32);
                acc.stats.avg_cardinality = Some(acc.cardinality as f64 / n as f64);
            }
            acc.stats
        })
        .collect()
}

// ---------------------------------------------------------------------------
// RunOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RunOutcome {
    Clean,
    CompletedWithFailures {
        failed_samples: usize,
        failed_loads: usize,
        inconsistencies: usize,
    },
    Aborted {
        phase: Phase,
        reason: String,
    },
}

impl RunOutcome {
    pub fn classify(record: &RunRecord) -> Self {
        if let Some(ref abort) = record.abort {
            return Self::Aborted {
                phase: abort.phase,
                reason: abort.reason.clone(),
            };
        }
        let failed_samples = record.samples.iter().filter(|s| s.is_failed()).count();
        let failed_loads = record.loads.iter().filter(|l| l.is_failed()).count();
        let inconsistencies = record.inconsistencies.len();
        if failed_samples + failed_loads + inconsistencies == 0 {
            Self::Clean
        } else {
            Self::CompletedWithFailures {
                failed_samples,
                failed_loads,
                inconsistencies,
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => f.write_str("completed cleanly"),
            Self::CompletedWithFailures {
                failed_samples,
                failed_loads,
                inconsistencies,
            } => {
                write!(f, "completed with {failed_samples} failed samples")?;
                if *failed_loads > 0 {
                    write!(f, ", {failed_loads} failed loads")?;
                }
                if *inconsistencies > 0 {
                    write!(f, ", {inconsistencies} inconsistencies")?;
                }
                Ok(())
            }
            Self::Aborted { phase, reason } => {
                let during = match phase {
                    Phase::Generating => "generation",
                    Phase::Loading => "loading",
                    other => other.as_str(),
                };
                write!(f, "aborted during {during}: {reason}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RunReport {
    settings: BenchConfig,
    record: RunRecord,
    stats: Vec<LatencyStats>,
    outcome: RunOutcome,
}

impl RunReport {
    pub fn new(settings: &BenchConfig, record: RunRecord) -> Self {
        let stats = aggregate(&record.samples);
        let outcome = RunOutcome::classify(&record);
        Self {
            settings: settings.clone(),
            record,
            stats,
            outcome,
        }
    }

    pub fn settings(&self) -> &BenchConfig {
        &self.settings
    }

    pub fn record(&self) -> &RunRecord {
        &self.record
    }

    pub fn stats(&self) -> &[LatencyStats] {
        &self.stats
    }

    pub fn outcome(&self) -> &RunOutcome {
        &self.outcome
    }

    pub fn summary_line(&self) -> String {
        self.outcome.to_string()
    }

    /// One row per group: count, failures, min/avg/max latency, mean size.
    pub fn render_summary_table(&self) -> String {
        let mut out = String::new();
        if !self.stats.iter().any(LatencyStats::has_samples) {
            out.push_str("no samples\n");
            if self.stats.is_empty() {
                return out;
            }
        }
        let _ = writeln!(
            out,
            "{:<24} {:<34} {:<10} {:<10} {:>5} {:>5} {:>12} {:>12} {:>12} {:>9}",
            "topology", "scenario", "backend", "mode", "n", "fail", "min", "avg", "max", "rows"
        );
        for s in &self.stats {
            let topology = format!("{}-{}", s.topology, s.scale);
            if !s.has_samples() {
                let _ = writeln!(
                    out,
                    "{:<24} {:<34} {:<10} {:<10} {:>5} {:>5} no samples",
                    topology, s.scenario, s.backend, s.mode, 0, s.failed
                );
                continue;
            }
            let _ = writeln!(
                out,
                "{:<24} {:<34} {:<10} {:<10} {:>5} {:>5} {:>12} {:>12} {:>12} {:>9.1}",
                topology,
                s.scenario,
                s.backend,
                s.mode,
                s.samples,
                s.failed,
                fmt_duration(s.min),
                fmt_duration(s.avg),
                fmt_duration(s.max),
                s.avg_cardinality.unwrap_or(0.0)
            );
        }
        out
    }

    /// Sequential samples side by side: one row per scenario iteration,
    /// one `latency / rows` column per backend.
    pub fn render_iteration_table(&self) -> String {
        let mut out = String::new();
        for topo in &self.record.topologies {
            let backends: Vec<BackendKind> = self
                .record
                .loads
                .iter()
                .filter(|l| l.run == topo.run && !l.is_failed())
                .map(|l| l.backend)
                .collect();
            let mut rows: BTreeMap<(ScenarioKind, usize), (String, BTreeMap<BackendKind, String>)> =
                BTreeMap::new();
            for s in self
                .record
                .samples
                .iter()
                .filter(|s| s.run == topo.run && s.mode == SampleMode::Sequential)
            {
                let cell = match (s.latency(), s.cardinality()) {
                    (Some(latency), Some(count)) => format!("{} / {count}", fmt_duration(Some(latency))),
                    _ => "failed".to_string(),
                };
                rows.entry((s.scenario, s.iteration))
                    .or_insert_with(|| (s.target.to_string(), BTreeMap::new()))
                    .1
                    .insert(s.backend, cell);
            }
            if rows.is_empty() {
                continue;
            }

            let _ = writeln!(out, "== {}-{} ==", topo.topology, topo.scale);
            let _ = write!(out, "{:<34} {:>4} {:<16}", "scenario", "iter", "target");
            for backend in &backends {
                let _ = write!(out, " {:>22}", backend.as_str());
            }
            out.push('\n');
            for ((scenario, iteration), (target, cells)) in &rows {
                let _ = write!(out, "{:<34} {:>4} {:<16}", scenario.as_str(), iteration, target);
                for backend in &backends {
                    let cell = cells.get(backend).map_or("-", String::as_str);
                    let _ = write!(out, " {:>22}", cell);
                }
                out.push('\n');
            }
        }
        out
    }

    pub fn render_load_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<24} {:<10} {:>10} {:>12}  status", "topology", "backend", "nodes", "elapsed");
        for load in &self.record.loads {
            let topology = format!("{}-{}", load.topology, load.scale);
            match load.status {
                LoadStatus::Loaded { nodes, elapsed } => {
                    let _ = writeln!(
                        out,
                        "{:<24} {:<10} {:>10} {:>12}  loaded",
                        topology,
                        load.backend,
                        nodes,
                        fmt_duration(Some(elapsed))
                    );
                }
                LoadStatus::Failed { ref error } => {
                    let _ = writeln!(
                        out,
                        "{:<24} {:<10} {:>10} {:>12}  failed: {error}",
                        topology, load.backend, "-", "-"
                    );
                }
            }
        }
        out
    }

    fn render_inconsistencies(&self) -> String {
        let mut out = String::new();
        for i in &self.record.inconsistencies {
            let _ = writeln!(
                out,
                "  [{}] {} {}-{} #{} target {}: {}",
                i.backend, i.scenario, i.topology, i.scale, i.iteration, i.target, i.detail
            );
        }
        out
    }

    /// Full plain-text report. `per_iteration` adds the side-by-side table.
    /// Full plain-text report, ending with the summary line.
    pub fn render_text(&self, per_iteration: bool) -> String {
        let mut out = self.render_body(per_iteration);
        let _ = writeln!(out, "\n{}", self.summary_line());
        out
    }

    /// Graph, load, latency and inconsistency sections without the summary
    /// line, for callers that print the outcome themselves.
    pub fn render_body(&self, per_iteration: bool) -> String {
        let mut out = String::new();
        for topo in &self.record.topologies {
            let _ = writeln!(
                out,
                "graph {}-{}: {} nodes, {} edges, fingerprint {}",
                topo.topology,
                topo.scale,
                topo.nodes,
                topo.edges,
                &topo.fingerprint[..topo.fingerprint.len().min(12)]
            );
        }
        out.push('\n');
        out.push_str(&self.render_load_table());
        out.push('\n');
        out.push_str(&self.render_summary_table());
        if per_iteration {
            out.push('\n');
            out.push_str(&self.render_iteration_table());
        }
        if !self.record.inconsistencies.is_empty() {
            let _ = writeln!(out, "\ninconsistencies:");
            out.push_str(&self.render_inconsistencies());
        }
        out
    }

    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        let record = &self.record;
        Ok(serde_json::json!({
            "started_at": record.started_at,
            "finished_at": record.finished_at,
            "settings": serde_json::to_value(&self.settings)?,
            "outcome": serde_json::to_value(&self.outcome)?,
            "summary": self.summary_line(),
            "topologies": serde_json::to_value(&record.topologies)?,
            "loads": serde_json::to_value(&record.loads)?,
            "stats": serde_json::to_value(&self.stats)?,
            "samples": serde_json::to_value(&record.samples)?,
            "inconsistencies": serde_json::to_value(&record.inconsistencies)?,
            "phases": serde_json::to_value(&record.phases)?,
            "metrics": record.metrics.to_json(),
        }))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json_value()?)?)
    }
}

fn fmt_duration(d: Option<Duration>) -> String {
    match d {
        Some(d) if d < Duration::from_millis(1) => format!("{:.1}us", d.as_secs_f64() * 1e6),
        Some(d) => format!("{:.3}ms", d.as_secs_f64() * 1e3),
        None => "-".to_string(),
    }
}
