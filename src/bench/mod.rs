//! Benchmark orchestration: scenario planning, the phase state machine that
//! drives a run, and verification of backend answers.

pub mod runner;
pub mod scenario;
pub mod verify;

pub use runner::{
    Abort, BenchmarkRunner, LoadRecord, LoadStatus, Phase, RunRecord, RunnerState, Sample,
    SampleMode, SampleOutcome, TopologyRun,
};
pub use scenario::{Query, QueryResult, Scenario, ScenarioKind, Target};
pub use verify::Inconsistency;
