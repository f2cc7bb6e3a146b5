//! Benchmark runner: phase state machine and measurement loops.
//!
//! One run walks `Idle -> Generating -> Loading -> Warmup -> Measuring`
//! per configured topology, then `Reporting -> Idle`. Generation or a
//! topology where no backend could be loaded aborts straight to
//! `Reporting`; everything measured so far is still reported. A backend
//! that fails to load is excluded for the rest of the run.

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Serialize, Serializer};

use crate::backend::{open_backend, BackendKind, BackendOptions, StorageBackend};
use crate::bench::scenario::{self, plan_scenario, Query, QueryResult, Scenario, ScenarioKind, Target};
use crate::bench::verify::{self, Inconsistency};
use crate::config::{BenchConfig, TopologySpec};
use crate::error::{DagBenchError, ErrorClass, Result};
use crate::graph::generator::{DagGenerator, GeneratorOptions};
use crate::graph::VersionGraph;
use crate::observability::Metrics;
use crate::report::RunReport;
use crate::types::Topology;

/// Mixed into the run seed so target selection does not replay the
/// generator's random stream.
const WORKLOAD_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

// ---------------------------------------------------------------------------
// Phase state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    Generating,
    Loading,
    Warmup,
    Measuring,
    Reporting,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
            Self::Loading => "loading",
            Self::Warmup => "warmup",
            Self::Measuring => "measuring",
            Self::Reporting => "reporting",
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle, Generating)
                | (Generating, Loading)
                | (Loading, Warmup)
                | (Warmup, Measuring)
                | (Measuring, Reporting)
                | (Reporting, Idle)
                // next topology
                | (Measuring, Generating)
                // aborts
                | (Generating, Reporting)
                | (Loading, Reporting)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current phase plus every phase visited so far.
#[derive(Debug, Clone)]
pub struct RunnerState {
    phase: Phase,
    history: Vec<Phase>,
}

impl Default for RunnerState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            history: vec![Phase::Idle],
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    pub fn advance(&mut self, next: Phase) -> Result<()> {
        if !self.phase.can_advance_to(next) {
            return Err(DagBenchError::Other(format!(
                "illegal phase transition {} -> {next}",
                self.phase
            )));
        }
        tracing::debug!(from = %self.phase, to = %next, "phase transition");
        self.phase = next;
        self.history.push(next);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SampleMode {
    /// One caller, repetitions in order.
    Sequential,
    /// Several client threads against the same backend.
    Concurrent,
}

impl SampleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Concurrent => "concurrent",
        }
    }
}

impl fmt::Display for SampleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn serialize_micros<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1_000_000.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum SampleOutcome {
    Ok {
        #[serde(rename = "latency_us", serialize_with = "serialize_micros")]
        latency: Duration,
        cardinality: usize,
    },
    Failed {
        class: ErrorClass,
        error: String,
    },
}

/// One timed backend call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    /// Index of the topology in the run.
    pub run: usize,
    pub topology: Topology,
    pub scale: usize,
    pub scenario: ScenarioKind,
    pub backend: BackendKind,
    pub mode: SampleMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<usize>,
    pub iteration: usize,
    pub target: Target,
    #[serde(flatten)]
    pub outcome: SampleOutcome,
}

impl Sample {
    pub fn latency(&self) -> Option<Duration> {
        match self.outcome {
            SampleOutcome::Ok { latency, .. } => Some(latency),
            SampleOutcome::Failed { .. } => None,
        }
    }

    pub fn cardinality(&self) -> Option<usize> {
        match self.outcome {
            SampleOutcome::Ok { cardinality, .. } => Some(cardinality),
            SampleOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, SampleOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum LoadStatus {
    Loaded {
        nodes: usize,
        #[serde(rename = "elapsed_us", serialize_with = "serialize_micros")]
        elapsed: Duration,
    },
    Failed {
        error: String,
    },
}

/// Outcome of bulk-loading one backend for one topology.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadRecord {
    pub run: usize,
    pub topology: Topology,
    pub scale: usize,
    pub backend: BackendKind,
    #[serde(flatten)]
    pub status: LoadStatus,
}

impl LoadRecord {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, LoadStatus::Failed { .. })
    }
}

/// A generated graph as seen by the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyRun {
    pub run: usize,
    pub topology: Topology,
    pub scale: usize,
    pub nodes: usize,
    pub edges: usize,
    pub fingerprint: String,
}

/// Why a run stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Abort {
    pub phase: Phase,
    pub reason: String,
}

/// Everything a run produced, handed to the reporter.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub topologies: Vec<TopologyRun>,
    pub loads: Vec<LoadRecord>,
    pub samples: Vec<Sample>,
    pub inconsistencies: Vec<Inconsistency>,
    pub phases: Vec<Phase>,
    pub abort: Option<Abort>,
    pub metrics: Metrics,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Opens a backend of `kind` for the workload labelled by the third argument.
pub type BackendFactory =
    dyn Fn(BackendKind, &BackendOptions, &str) -> Result<Box<dyn StorageBackend>> + Send + Sync;

/// Called with the number of completed measured queries.
pub type ProgressHook = dyn Fn(u64) + Send + Sync;

/// A scenario plus the oracle's answers, one per repetition.
struct PlannedScenario {
    scenario: Scenario,
    expected: Option<Vec<QueryResult>>,
}

/// Read-only state shared by every measurement task of one topology.
struct MeasureContext<'a> {
    run: usize,
    spec: TopologySpec,
    graph: &'a VersionGraph,
    scenarios: &'a [PlannedScenario],
}

#[derive(Default)]
struct Measurement {
    samples: Vec<Sample>,
    inconsistencies: Vec<Inconsistency>,
}

impl Measurement {
    fn absorb(&mut self, other: Measurement) {
        self.samples.extend(other.samples);
        self.inconsistencies.extend(other.inconsistencies);
    }
}

pub struct BenchmarkRunner {
    config: BenchConfig,
    factory: Box<BackendFactory>,
    progress: Option<Box<ProgressHook>>,
}

impl BenchmarkRunner {
    pub fn new(config: BenchConfig) -> Self {
        Self {
            config,
            factory: Box::new(open_backend),
            progress: None,
        }
    }

    /// Replace how backends are opened (tests inject faulty backends here).
    pub fn with_backend_factory(
        mut self,
        factory: impl Fn(BackendKind, &BackendOptions, &str) -> Result<Box<dyn StorageBackend>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.factory = Box::new(factory);
        self
    }

    pub fn with_progress(mut self, hook: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(hook));
        self
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Upper bound on measured queries, for sizing a progress bar.
    pub fn planned_queries(&self) -> u64 {
        let per_topology =
            self.config.backends.len() * self.enabled_scenarios().len() * self.config.repetitions;
        let passes = if self.config.concurrent_clients > 1 {
            1 + self.config.concurrent_clients
        } else {
            1
        };
        (self.config.topologies.len() * per_topology * passes) as u64
    }

    /// Enabled scenarios in canonical order, each at most once.
    pub fn enabled_scenarios(&self) -> Vec<ScenarioKind> {
        ScenarioKind::ALL
            .into_iter()
            .filter(|&kind| self.config.scenarios.is_enabled(kind))
            .collect()
    }

    /// Execute the whole run.
    ///
    /// # Errors
    ///
    /// Only configuration errors are returned. Generation failures (such as
    /// a zero scale) and topologies with no loadable backend end the run
    /// early with an aborted report; query failures become failed samples.
    pub fn run(&self) -> Result<RunReport> {
        self.config.validate()?;

        let started_at = Utc::now();
        let mut state = RunnerState::new();
        let mut metrics = Metrics::new();
        let mut topologies = Vec::new();
        let mut loads = Vec::new();
        let mut measured = Measurement::default();
        let mut abort: Option<Abort> = None;
        let mut excluded: BTreeSet<BackendKind> = BTreeSet::new();

        tracing::info!(
            topologies = self.config.topologies.len(),
            backends = ?self.config.backends,
            repetitions = self.config.repetitions,
            seed = ?self.config.seed,
            "starting benchmark run"
        );

        for (run, &spec) in self.config.topologies.iter().enumerate() {
            state.advance(Phase::Generating)?;
            let started = Instant::now();
            let seed = self.config.seed.map(|s| s.wrapping_add(run as u64));
            let generated = DagGenerator::from_seed_option(seed, GeneratorOptions::default())
                .generate(spec.kind, spec.scale);
            metrics.generation_time += started.elapsed();
            let graph = match generated {
                Ok(graph) => graph,
                Err(e) => {
                    tracing::error!(topology = %spec.kind, scale = spec.scale, error = %e, "generation failed");
                    state.advance(Phase::Reporting)?;
                    abort = Some(Abort {
                        phase: Phase::Generating,
                        reason: e.to_string(),
                    });
                    break;
                }
            };
            metrics.graphs_generated += 1;
            metrics.nodes_generated += graph.len();
            metrics.edges_generated += graph.edge_count();
            tracing::info!(
                topology = %spec.kind,
                nodes = graph.len(),
                edges = graph.edge_count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "graph generated"
            );
            topologies.push(TopologyRun {
                run,
                topology: spec.kind,
                scale: spec.scale,
                nodes: graph.len(),
                edges: graph.edge_count(),
                fingerprint: graph.fingerprint(),
            });

            state.advance(Phase::Loading)?;
            let started = Instant::now();
            let backends =
                self.load_backends(run, spec, &graph, &mut excluded, &mut loads, &mut metrics);
            metrics.load_time += started.elapsed();
            if backends.is_empty() {
                let reason = format!("no backend could be loaded for {}", spec.label());
                tracing::error!(topology = %spec.kind, scale = spec.scale, "{reason}");
                state.advance(Phase::Reporting)?;
                abort = Some(Abort {
                    phase: Phase::Loading,
                    reason,
                });
                break;
            }

            state.advance(Phase::Warmup)?;
            let scenarios = self.plan(run, &graph)?;
            let ctx = MeasureContext {
                run,
                spec,
                graph: &graph,
                scenarios: &scenarios,
            };
            let started = Instant::now();
            if self.config.warmup {
                warm_up(&ctx, &backends);
            }
            metrics.warmup_time += started.elapsed();

            state.advance(Phase::Measuring)?;
            let started = Instant::now();
            measured.absorb(self.measure(&ctx, &backends));
            metrics.measure_time += started.elapsed();
        }

        if abort.is_none() {
            state.advance(Phase::Reporting)?;
        }

        metrics.queries_issued = measured.samples.len() as u64;
        metrics.queries_failed = measured.samples.iter().filter(|s| s.is_failed()).count() as u64;
        metrics.inconsistencies = measured.inconsistencies.len() as u64;

        state.advance(Phase::Idle)?;
        let record = RunRecord {
            started_at,
            finished_at: Utc::now(),
            topologies,
            loads,
            samples: measured.samples,
            inconsistencies: measured.inconsistencies,
            phases: state.history().to_vec(),
            abort,
            metrics,
        };
        let failure_rate = record.metrics.failure_rate();
        let report = RunReport::new(&self.config, record);
        tracing::info!(
            outcome = %report.summary_line(),
            failure_rate,
            "benchmark run finished"
        );
        Ok(report)
    }

    fn load_backends(
        &self,
        run: usize,
        spec: TopologySpec,
        graph: &VersionGraph,
        excluded: &mut BTreeSet<BackendKind>,
        loads: &mut Vec<LoadRecord>,
        metrics: &mut Metrics,
    ) -> Vec<Box<dyn StorageBackend>> {
        let options = self.config.backend_options();
        let label = spec.label();
        let edges = graph.edges();
        let mut loaded = Vec::with_capacity(self.config.backends.len());

        for &kind in &self.config.backends {
            if excluded.contains(&kind) {
                tracing::debug!(
                    backend = %kind,
                    topology = %spec.kind,
                    "backend excluded after an earlier load failure"
                );
                continue;
            }
            let started = Instant::now();
            let result = (self.factory)(kind, &options, &label).and_then(|mut backend| {
                let nodes = backend.insert_batch(graph.nodes(), &edges)?;
                Ok((backend, nodes))
            });
            let elapsed = started.elapsed();

            let status = match result {
                Ok((backend, nodes)) => {
                    tracing::info!(
                        backend = %kind,
                        topology = %spec.kind,
                        nodes,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "backend loaded"
                    );
                    metrics.backends_loaded += 1;
                    loaded.push(backend);
                    LoadStatus::Loaded { nodes, elapsed }
                }
                Err(e) => {
                    tracing::error!(
                        backend = %kind,
                        topology = %spec.kind,
                        error = %e,
                        "load failed; backend excluded for the rest of the run"
                    );
                    excluded.insert(kind);
                    metrics.load_failures += 1;
                    LoadStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            loads.push(LoadRecord {
                run,
                topology: spec.kind,
                scale: spec.scale,
                backend: kind,
                status,
            });
        }
        loaded
    }

    /// Draw every enabled scenario's targets and, when verifying, the
    /// oracle's answers for them.
    fn plan(&self, run: usize, graph: &VersionGraph) -> Result<Vec<PlannedScenario>> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64((seed ^ WORKLOAD_SALT).wrapping_add(run as u64)),
            None => StdRng::from_entropy(),
        };
        let kinds = self.enabled_scenarios();
        let mut planned = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let scenario = plan_scenario(
                kind,
                graph,
                &self.config.scenarios,
                self.config.repetitions,
                &mut rng,
            )?;
            let expected = self.config.verify.then(|| {
                scenario
                    .queries
                    .iter()
                    .map(|q| scenario::evaluate(graph, q))
                    .collect()
            });
            planned.push(PlannedScenario { scenario, expected });
        }
        Ok(planned)
    }

    fn measure(&self, ctx: &MeasureContext<'_>, backends: &[Box<dyn StorageBackend>]) -> Measurement {
        let mut out = Measurement::default();

        let sequential: Vec<Measurement> = if self.config.parallel_backends {
            backends
                .par_iter()
                .map(|backend| self.measure_sequential(ctx, backend.as_ref()))
                .collect()
        } else {
            backends
                .iter()
                .map(|backend| self.measure_sequential(ctx, backend.as_ref()))
                .collect()
        };
        for part in sequential {
            out.absorb(part);
        }

        if self.config.concurrent_clients > 1 {
            for backend in backends {
                out.absorb(self.measure_concurrent(ctx, backend.as_ref()));
            }
        }
        out
    }

    fn measure_sequential(&self, ctx: &MeasureContext<'_>, backend: &dyn StorageBackend) -> Measurement {
        let mut out = Measurement::default();
        for planned in ctx.scenarios {
            for (iteration, query) in planned.scenario.queries.iter().enumerate() {
                let call = Call {
                    iteration,
                    query,
                    mode: SampleMode::Sequential,
                    client: None,
                };
                if !self.measure_one(ctx, backend, planned, call, &mut out) {
                    self.skip_remaining(planned, iteration);
                    break;
                }
            }
        }
        out
    }

    fn measure_concurrent(&self, ctx: &MeasureContext<'_>, backend: &dyn StorageBackend) -> Measurement {
        let clients = self.config.concurrent_clients;
        let mut out = Measurement::default();
        for planned in ctx.scenarios {
            let parts: Vec<Measurement> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..clients)
                    .map(|client| {
                        scope.spawn(move || {
                            let mut part = Measurement::default();
                            for (iteration, query) in planned.scenario.queries.iter().enumerate() {
                                let call = Call {
                                    iteration,
                                    query,
                                    mode: SampleMode::Concurrent,
                                    client: Some(client),
                                };
                                if !self.measure_one(ctx, backend, planned, call, &mut part) {
                                    self.skip_remaining(planned, iteration);
                                    break;
                                }
                            }
                            part
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .filter_map(|handle| match handle.join() {
                        Ok(part) => Some(part),
                        Err(_) => {
                            tracing::error!(backend = backend.name(), "client thread panicked");
                            None
                        }
                    })
                    .collect()
            });
            for part in parts {
                out.absorb(part);
            }
        }
        out
    }

    /// Time one call and record its sample. Returns `false` when the error
    /// is not recoverable and the scenario's remaining repetitions should be
    /// skipped for this backend.
    fn measure_one(
        &self,
        ctx: &MeasureContext<'_>,
        backend: &dyn StorageBackend,
        planned: &PlannedScenario,
        call: Call<'_>,
        out: &mut Measurement,
    ) -> bool {
        let kind = planned.scenario.kind;
        let mut keep_going = true;
        let target = call.query.target();

        let started = Instant::now();
        let result = scenario::execute(backend, call.query);
        let latency = started.elapsed();

        let outcome = match result {
            Ok(answer) => {
                let expected = planned
                    .expected
                    .as_ref()
                    .and_then(|all| all.get(call.iteration));
                if let Some(expected) = expected {
                    if let Some((diff, detail)) = verify::compare(expected, &answer) {
                        let inconsistency = Inconsistency {
                            topology: ctx.spec.kind,
                            scale: ctx.spec.scale,
                            scenario: kind,
                            backend: backend.kind(),
                            mode: call.mode,
                            iteration: call.iteration,
                            target,
                            missing: diff.missing,
                            unexpected: diff.unexpected,
                            detail,
                        };
                        tracing::warn!(
                            iteration = call.iteration,
                            mode = %call.mode,
                            error = %inconsistency.to_error(),
                            "result disagrees with reference"
                        );
                        out.inconsistencies.push(inconsistency);
                    }
                }
                SampleOutcome::Ok {
                    latency,
                    cardinality: answer.cardinality(),
                }
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!(
                    backend = backend.name(),
                    scenario = %kind,
                    target = %target,
                    iteration = call.iteration,
                    error = %e,
                    "query failed"
                );
                SampleOutcome::Failed {
                    class: e.class(),
                    error: e.to_string(),
                }
            }
            Err(e) => {
                tracing::error!(
                    backend = backend.name(),
                    scenario = %kind,
                    target = %target,
                    iteration = call.iteration,
                    error = %e,
                    "query failed; remaining repetitions skipped"
                );
                keep_going = false;
                SampleOutcome::Failed {
                    class: e.class(),
                    error: e.to_string(),
                }
            }
        };

        out.samples.push(Sample {
            run: ctx.run,
            topology: ctx.spec.kind,
            scale: ctx.spec.scale,
            scenario: kind,
            backend: backend.kind(),
            mode: call.mode,
            client: call.client,
            iteration: call.iteration,
            target,
            outcome,
        });
        if let Some(ref hook) = self.progress {
            hook(1);
        }
        keep_going
    }

    /// Account for the repetitions after `iteration` that will not run.
    fn skip_remaining(&self, planned: &PlannedScenario, iteration: usize) {
        let remaining = planned.scenario.queries.len().saturating_sub(iteration + 1);
        if remaining > 0 {
            if let Some(ref hook) = self.progress {
                hook(remaining as u64);
            }
        }
    }
}

/// Per-call coordinates within a scenario.
struct Call<'q> {
    iteration: usize,
    query: &'q Query,
    mode: SampleMode,
    client: Option<usize>,
}

/// Run each scenario's warmup query once per backend; results are dropped.
fn warm_up(ctx: &MeasureContext<'_>, backends: &[Box<dyn StorageBackend>]) {
    for backend in backends {
        for planned in ctx.scenarios {
            if let Err(e) = scenario::execute(backend.as_ref(), &planned.scenario.warmup) {
                tracing::debug!(
                    backend = backend.name(),
                    scenario = %planned.scenario.kind,
                    error = %e,
                    "warmup query failed"
                );
            }
        }
    }
    tracing::debug!(
        topology = %ctx.spec.kind,
        graph_nodes = ctx.graph.len(),
        "warmup complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeGraphStore;
    use crate::types::{ParentEdge, TraversalQuery, VersionId, VersionNode};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn small_config() -> BenchConfig {
        BenchConfig {
            topologies: vec![TopologySpec::new(Topology::ComplexRandom, 60)],
            repetitions: 3,
            backends: vec![BackendKind::Sqlite, BackendKind::Native, BackendKind::Reference],
            seed: Some(17),
            ..BenchConfig::default()
        }
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    #[test]
    fn happy_path_transitions_are_legal() {
        let mut state = RunnerState::new();
        for phase in [
            Phase::Generating,
            Phase::Loading,
            Phase::Warmup,
            Phase::Measuring,
            Phase::Generating,
            Phase::Loading,
            Phase::Warmup,
            Phase::Measuring,
            Phase::Reporting,
            Phase::Idle,
        ] {
            state.advance(phase).unwrap();
        }
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(state.history().len(), 11);
    }

    #[test]
    fn abort_edges_are_legal() {
        let mut state = RunnerState::new();
        state.advance(Phase::Generating).unwrap();
        state.advance(Phase::Reporting).unwrap();

        let mut state = RunnerState::new();
        state.advance(Phase::Generating).unwrap();
        state.advance(Phase::Loading).unwrap();
        state.advance(Phase::Reporting).unwrap();
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut state = RunnerState::new();
        let err = state.advance(Phase::Measuring).unwrap_err();
        assert!(err.to_string().contains("idle -> measuring"));
        assert_eq!(state.phase(), Phase::Idle);

        state.advance(Phase::Generating).unwrap();
        assert!(state.advance(Phase::Warmup).is_err());
        assert!(!Phase::Warmup.can_advance_to(Phase::Reporting));
        assert!(!Phase::Reporting.can_advance_to(Phase::Generating));
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    #[test]
    fn clean_run_records_every_sample() {
        let report = BenchmarkRunner::new(small_config()).run().unwrap();
        let record = report.record();
        assert_eq!(record.samples.len(), 3 * ScenarioKind::ALL.len() * 3);
        assert!(record.samples.iter().all(|s| !s.is_failed()));
        assert!(record.inconsistencies.is_empty());
        assert_eq!(
            record.phases,
            vec![
                Phase::Idle,
                Phase::Generating,
                Phase::Loading,
                Phase::Warmup,
                Phase::Measuring,
                Phase::Reporting,
                Phase::Idle
            ]
        );
        assert_eq!(record.metrics.backends_loaded, 3);
        assert!(report.outcome().is_clean());
    }

    #[test]
    fn every_backend_sees_the_same_targets() {
        let report = BenchmarkRunner::new(small_config()).run().unwrap();
        let targets = |kind: BackendKind| -> Vec<Target> {
            report
                .record()
                .samples
                .iter()
                .filter(|s| s.backend == kind)
                .map(|s| s.target)
                .collect()
        };
        assert_eq!(targets(BackendKind::Sqlite), targets(BackendKind::Native));
        assert_eq!(targets(BackendKind::Native), targets(BackendKind::Reference));
    }

    #[test]
    fn seeded_runs_repeat_fingerprints() {
        let a = BenchmarkRunner::new(small_config()).run().unwrap();
        let b = BenchmarkRunner::new(small_config()).run().unwrap();
        assert_eq!(
            a.record().topologies[0].fingerprint,
            b.record().topologies[0].fingerprint
        );
    }

    #[test]
    fn parallel_and_concurrent_modes_are_recorded_separately() {
        let config = BenchConfig {
            parallel_backends: true,
            concurrent_clients: 3,
            backends: vec![BackendKind::Sqlite, BackendKind::Native],
            ..small_config()
        };
        let counter = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&counter);
        let runner = BenchmarkRunner::new(config).with_progress(move |n| {
            seen.fetch_add(n, Ordering::Relaxed);
        });
        let planned = runner.planned_queries();
        let report = runner.run().unwrap();
        let samples = &report.record().samples;

        let sequential = samples.iter().filter(|s| s.mode == SampleMode::Sequential).count();
        let concurrent = samples.iter().filter(|s| s.mode == SampleMode::Concurrent).count();
        assert_eq!(sequential, 2 * ScenarioKind::ALL.len() * 3);
        assert_eq!(concurrent, 3 * sequential);
        assert!(samples
            .iter()
            .filter(|s| s.mode == SampleMode::Concurrent)
            .all(|s| s.client.is_some()));
        assert_eq!(counter.load(Ordering::Relaxed), planned);
        assert!(report.record().inconsistencies.is_empty());
    }

    #[test]
    fn zero_repetitions_complete_cleanly() {
        let config = BenchConfig {
            repetitions: 0,
            ..small_config()
        };
        let report = BenchmarkRunner::new(config).run().unwrap();
        assert!(report.record().samples.is_empty());
        assert!(report.outcome().is_clean());
        assert_eq!(report.record().phases.last(), Some(&Phase::Idle));
        assert!(report.render_summary_table().contains("no samples"));
    }

    #[test]
    fn unloadable_topology_aborts_after_earlier_topologies() {
        let config = BenchConfig {
            topologies: vec![
                TopologySpec::new(Topology::Chain, 10),
                TopologySpec::new(Topology::BinaryTree, 10),
            ],
            backends: vec![BackendKind::Native],
            ..small_config()
        };
        // The second topology gets no loadable backend.
        let report = BenchmarkRunner::new(config)
            .with_backend_factory(|kind, options, label| {
                if label.starts_with("binary-tree") {
                    return Err(DagBenchError::storage(kind.as_str(), "disk full"));
                }
                open_backend(kind, options, label)
            })
            .run()
            .unwrap();
        let record = report.record();
        assert_eq!(record.topologies.len(), 2);
        assert!(record.samples.iter().all(|s| s.topology == Topology::Chain));
        assert_eq!(
            record.abort.as_ref().map(|a| a.phase),
            Some(Phase::Loading)
        );
        assert!(report.summary_line().contains("aborted during loading"));
    }

    #[test]
    fn load_failure_drops_only_that_backend() {
        let report = BenchmarkRunner::new(small_config())
            .with_backend_factory(|kind, options, label| {
                if kind == BackendKind::Sqlite {
                    return Err(DagBenchError::storage("sqlite", "cannot open database"));
                }
                open_backend(kind, options, label)
            })
            .run()
            .unwrap();
        let record = report.record();
        assert_eq!(record.loads.iter().filter(|l| l.is_failed()).count(), 1);
        assert!(record.samples.iter().all(|s| s.backend != BackendKind::Sqlite));
        assert_eq!(record.samples.len(), 2 * ScenarioKind::ALL.len() * 3);
        assert!(!report.outcome().is_clean());
    }

    #[test]
    fn zero_scale_aborts_during_generation() {
        let config = BenchConfig {
            topologies: vec![TopologySpec::new(Topology::Chain, 0)],
            ..small_config()
        };
        let report = BenchmarkRunner::new(config).run().unwrap();
        let record = report.record();
        assert!(record.topologies.is_empty());
        assert!(record.samples.is_empty());
        assert_eq!(
            record.abort.as_ref().map(|a| a.phase),
            Some(Phase::Generating)
        );
        assert_eq!(
            record.phases,
            vec![Phase::Idle, Phase::Generating, Phase::Reporting, Phase::Idle]
        );
        assert!(report.summary_line().starts_with("aborted during generation"));
    }

    #[test]
    fn failed_backend_stays_excluded_for_later_topologies() {
        let config = BenchConfig {
            topologies: vec![
                TopologySpec::new(Topology::Chain, 10),
                TopologySpec::new(Topology::BinaryTree, 10),
                TopologySpec::new(Topology::ComplexRandom, 10),
            ],
            backends: vec![BackendKind::Sqlite, BackendKind::Native],
            ..small_config()
        };
        let attempts = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&attempts);
        let report = BenchmarkRunner::new(config)
            .with_backend_factory(move |kind, options, label| {
                if kind == BackendKind::Sqlite {
                    seen.fetch_add(1, Ordering::Relaxed);
                    if label.starts_with("chain") {
                        return Err(DagBenchError::storage("sqlite", "cannot open database"));
                    }
                }
                open_backend(kind, options, label)
            })
            .run()
            .unwrap();
        let record = report.record();

        // Only the first attempt was made; later topologies skip sqlite.
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
        assert_eq!(record.loads.len(), 1 + 3);
        assert_eq!(record.loads.iter().filter(|l| l.is_failed()).count(), 1);
        assert!(record.samples.iter().all(|s| s.backend == BackendKind::Native));
        assert_eq!(record.topologies.len(), 3);
        assert!(record.abort.is_none());
    }

    /// Answers everything but descendants, which fail with a non-storage
    /// error.
    struct BrokenDescendants(NativeGraphStore);

    impl StorageBackend for BrokenDescendants {
        fn name(&self) -> &str {
            "native"
        }
        fn kind(&self) -> BackendKind {
            BackendKind::Native
        }
        fn insert_batch(&mut self, nodes: &[VersionNode], edges: &[ParentEdge]) -> Result<usize> {
            self.0.insert_batch(nodes, edges)
        }
        fn find_ancestors(&self, id: VersionId, q: &TraversalQuery) -> Result<Vec<VersionNode>> {
            self.0.find_ancestors(id, q)
        }
        fn find_descendants(&self, _: VersionId, _: &TraversalQuery) -> Result<Vec<VersionNode>> {
            Err(DagBenchError::Other("protocol violation".into()))
        }
        fn find_latest_common_ancestor(&self, a: VersionId, b: VersionId) -> Result<Option<VersionNode>> {
            self.0.find_latest_common_ancestor(a, b)
        }
        fn explain(&self, request: &crate::backend::ExplainRequest) -> Result<crate::backend::QueryPlan> {
            self.0.explain(request)
        }
    }

    #[test]
    fn unrecoverable_errors_skip_remaining_repetitions() {
        let config = BenchConfig {
            backends: vec![BackendKind::Native],
            concurrent_clients: 2,
            ..small_config()
        };
        let counter = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&counter);
        let runner = BenchmarkRunner::new(config)
            .with_backend_factory(|_, _, _| Ok(Box::new(BrokenDescendants(NativeGraphStore::new()))))
            .with_progress(move |n| {
                seen.fetch_add(n, Ordering::Relaxed);
            });
        let planned = runner.planned_queries();
        let report = runner.run().unwrap();
        let samples = &report.record().samples;

        let failed: Vec<_> = samples.iter().filter(|s| s.is_failed()).collect();
        // Two descendant scenarios; one sequential call plus one per client
        // each, instead of every repetition.
        assert_eq!(failed.len(), 2 * (1 + 2));
        assert!(failed.iter().all(|s| s.iteration == 0
            && s.scenario.operation() == crate::backend::QueryOperation::Descendants));
        assert!(failed
            .iter()
            .all(|s| matches!(s.outcome, SampleOutcome::Failed { class: ErrorClass::Other, .. })));
        // Other scenarios still run every repetition.
        let ok = samples.iter().filter(|s| !s.is_failed()).count();
        assert_eq!(ok, (ScenarioKind::ALL.len() - 2) * 3 * (1 + 2));
        // Skipped repetitions still advance the progress counter.
        assert_eq!(counter.load(Ordering::Relaxed), planned);
    }

    #[test]
    fn duplicate_scenarios_are_planned_once() {
        let mut config = BenchConfig {
            backends: vec![BackendKind::Native],
            ..small_config()
        };
        config.scenarios.enabled = vec![
            ScenarioKind::LcaMidLast,
            ScenarioKind::AncestorsOfLast,
            ScenarioKind::LcaMidLast,
        ];
        let runner = BenchmarkRunner::new(config);
        assert_eq!(
            runner.enabled_scenarios(),
            vec![ScenarioKind::AncestorsOfLast, ScenarioKind::LcaMidLast]
        );
        assert_eq!(runner.planned_queries(), 2 * 3);
        let report = runner.run().unwrap();
        assert_eq!(report.record().samples.len(), 2 * 3);
        assert_eq!(report.record().samples[0].scenario, ScenarioKind::AncestorsOfLast);
    }

    /// Answers closures correctly but always claims there is no LCA.
    struct NoLca(NativeGraphStore);

    impl StorageBackend for NoLca {
        fn name(&self) -> &str {
            "native"
        }
        fn kind(&self) -> BackendKind {
            BackendKind::Native
        }
        fn insert_batch(&mut self, nodes: &[VersionNode], edges: &[ParentEdge]) -> Result<usize> {
            self.0.insert_batch(nodes, edges)
        }
        fn find_ancestors(&self, id: VersionId, q: &TraversalQuery) -> Result<Vec<VersionNode>> {
            self.0.find_ancestors(id, q)
        }
        fn find_descendants(&self, id: VersionId, q: &TraversalQuery) -> Result<Vec<VersionNode>> {
            self.0.find_descendants(id, q)
        }
        fn find_latest_common_ancestor(&self, _: VersionId, _: VersionId) -> Result<Option<VersionNode>> {
            Ok(None)
        }
        fn explain(&self, request: &crate::backend::ExplainRequest) -> Result<crate::backend::QueryPlan> {
            self.0.explain(request)
        }
    }

    #[test]
    fn wrong_answers_are_inconsistencies_not_failures() {
        let config = BenchConfig {
            backends: vec![BackendKind::Native, BackendKind::Reference],
            ..small_config()
        };
        let report = BenchmarkRunner::new(config)
            .with_backend_factory(|kind, options, label| {
                if kind == BackendKind::Native {
                    return Ok(Box::new(NoLca(NativeGraphStore::new())));
                }
                open_backend(kind, options, label)
            })
            .run()
            .unwrap();
        let record = report.record();
        assert!(record.samples.iter().all(|s| !s.is_failed()));
        // Every generated graph is connected through the root, so each LCA
        // query has an answer the faulty backend misses.
        assert_eq!(record.inconsistencies.len(), 2 * 3);
        assert!(record
            .inconsistencies
            .iter()
            .all(|i| i.backend == BackendKind::Native && i.scenario.operation()
                == crate::backend::QueryOperation::LatestCommonAncestor));
    }

    #[test]
    fn verification_can_be_disabled() {
        let config = BenchConfig {
            backends: vec![BackendKind::Native],
            verify: false,
            ..small_config()
        };
        let report = BenchmarkRunner::new(config)
            .with_backend_factory(|_, _, _| Ok(Box::new(NoLca(NativeGraphStore::new()))))
            .run()
            .unwrap();
        assert!(report.record().inconsistencies.is_empty());
    }

    #[test]
    fn invalid_config_is_an_error() {
        let config = BenchConfig {
            backends: Vec::new(),
            ..BenchConfig::default()
        };
        let err = BenchmarkRunner::new(config).run().unwrap_err();
        assert_eq!(err.class(), ErrorClass::Config);
    }
}
