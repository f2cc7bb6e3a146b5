//! Graph layer: the in-memory version DAG, its generator, and the reference
//! traversal algorithms used as the correctness oracle.

pub mod generator;
pub mod model;
pub mod traversal;

pub use generator::{DagGenerator, GeneratorOptions};
pub use model::{GraphError, VersionGraph};
