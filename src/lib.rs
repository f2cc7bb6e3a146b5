//! dagbench: ancestor, descendant and latest-common-ancestor benchmarks for
//! multi-parent version DAGs.
//!
//! Generates synthetic topologies, loads them into a relational store
//! (SQLite with recursive CTEs) and a graph-native adjacency store, and
//! times the same queries against both, checking every answer against an
//! in-memory reference traversal.

pub mod backend;
pub mod bench;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod observability;
pub mod report;
pub mod types;
