//! Command-line interface.
//!
//! `run` executes a full benchmark; `generate`, `query` and `explain` work on
//! a single generated graph for inspection.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::backend::{open_backend, BackendKind};
use crate::bench::runner::BenchmarkRunner;
use crate::bench::scenario::{self, Query, QueryResult};
use crate::config::{self, BenchConfig, OutputFormat, TopologySpec};
use crate::error::Result;
use crate::graph::generator::{DagGenerator, GeneratorOptions};
use crate::graph::VersionGraph;
use crate::report::RunOutcome;
use crate::types::{NodePredicate, TraversalQuery, VersionId};

/// Exit status when a run aborted before measuring every topology.
pub const EXIT_ABORTED: i32 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "dagbench",
    version,
    about = "Benchmark ancestor, descendant and LCA queries on version DAGs"
)]
pub struct Cli {
    /// Config file (default: ./dagbench.yaml, then the user config dir)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the benchmark suite
    Run(RunArgs),
    /// Generate one graph and print it
    Generate(GraphArgs),
    /// Generate, load and query one graph
    Query {
        #[command(flatten)]
        graph: GraphArgs,
        /// Backend to query
        #[arg(long, short, default_value = "native")]
        backend: BackendKind,
        #[command(subcommand)]
        query: QueryCommand,
    },
    /// Print each backend's plan for a query
    Explain {
        #[command(flatten)]
        graph: GraphArgs,
        /// Backends to explain (comma-separated)
        #[arg(long, short, value_delimiter = ',', default_value = "sqlite,native")]
        backends: Vec<BackendKind>,
        #[command(subcommand)]
        query: QueryCommand,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Topology to generate as kind:scale; repeatable
    #[arg(long, short, value_parser = parse_topology)]
    pub topology: Vec<TopologySpec>,

    /// Measured repetitions per scenario
    #[arg(long, short)]
    pub repetitions: Option<usize>,

    #[arg(long, short)]
    pub seed: Option<u64>,

    /// Backends to compare (comma-separated)
    #[arg(long, short, value_delimiter = ',')]
    pub backends: Vec<BackendKind>,

    /// table or json
    #[arg(long, short, value_parser = parse_output)]
    pub output: Option<OutputFormat>,

    /// Measure backends in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Client threads for the concurrent pass
    #[arg(long)]
    pub clients: Option<usize>,

    /// Skip checking results against the reference traversal
    #[arg(long)]
    pub no_verify: bool,

    /// Skip the warmup pass
    #[arg(long)]
    pub no_warmup: bool,

    /// Directory for SQLite database files
    #[arg(long)]
    pub sqlite_dir: Option<PathBuf>,

    /// Print the per-iteration comparison table
    #[arg(long)]
    pub per_iteration: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Graph to generate as kind:scale
    #[arg(long, short, value_parser = parse_topology, default_value = "complex:1000")]
    pub topology: TopologySpec,

    #[arg(long, short)]
    pub seed: Option<u64>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum QueryCommand {
    /// Ancestors of a node
    Ancestors(ClosureArgs),
    /// Descendants of a node
    Descendants(ClosureArgs),
    /// Latest common ancestor of two nodes
    Lca { a: u64, b: u64 },
}

#[derive(Args, Debug)]
pub struct ClosureArgs {
    pub id: u64,

    /// Maximum hop count
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Include the node itself
    #[arg(long)]
    pub include_self: bool,

    #[arg(long)]
    pub author: Option<String>,

    /// Case-sensitive title substring
    #[arg(long)]
    pub title: Option<String>,

    /// Only nodes created at or after this RFC 3339 timestamp
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,
}

impl ClosureArgs {
    fn traversal(&self) -> TraversalQuery {
        let mut predicate = NodePredicate::default();
        predicate.author.clone_from(&self.author);
        predicate.title_contains.clone_from(&self.title);
        predicate.created_since = self.since;
        TraversalQuery {
            include_self: self.include_self,
            max_depth: self.max_depth,
            predicate,
        }
    }
}

impl QueryCommand {
    pub fn to_query(&self) -> Query {
        match self {
            Self::Ancestors(args) => Query::Ancestors {
                id: VersionId(args.id),
                query: args.traversal(),
            },
            Self::Descendants(args) => Query::Descendants {
                id: VersionId(args.id),
                query: args.traversal(),
            },
            Self::Lca { a, b } => Query::LatestCommonAncestor {
                a: VersionId(*a),
                b: VersionId(*b),
            },
        }
    }
}

fn parse_topology(s: &str) -> std::result::Result<TopologySpec, String> {
    TopologySpec::parse(s).ok_or_else(|| {
        format!("invalid topology '{s}' (expected kind:scale, e.g. chain:1000 or complex:5000)")
    })
}

fn parse_output(s: &str) -> std::result::Result<OutputFormat, String> {
    OutputFormat::from_str_loose(s).ok_or_else(|| format!("unknown output format '{s}'"))
}

/// Layer CLI flags over a loaded config.
pub fn apply_run_args(config: &mut BenchConfig, args: &RunArgs) {
    if !args.topology.is_empty() {
        config.topologies.clone_from(&args.topology);
    }
    if let Some(repetitions) = args.repetitions {
        config.repetitions = repetitions;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if !args.backends.is_empty() {
        config.backends.clone_from(&args.backends);
    }
    if let Some(output) = args.output {
        config.output = output;
    }
    if args.parallel {
        config.parallel_backends = true;
    }
    if let Some(clients) = args.clients {
        config.concurrent_clients = clients;
    }
    if args.no_verify {
        config.verify = false;
    }
    if args.no_warmup {
        config.warmup = false;
    }
    if args.sqlite_dir.is_some() {
        config.sqlite.path.clone_from(&args.sqlite_dir);
    }
}

/// Execute a parsed command line and return the process exit code.
pub fn execute(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run(ref args) => run_benchmark(cli.config.as_deref(), args),
        Commands::Generate(ref args) => {
            let graph = generate(args)?;
            if args.json {
                let json = serde_json::json!({
                    "topology": args.topology.kind,
                    "scale": args.topology.scale,
                    "fingerprint": graph.fingerprint(),
                    "nodes": graph.nodes(),
                    "edges": graph.edges(),
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            } else {
                print_graph_summary(args.topology, &graph);
            }
            Ok(0)
        }
        Commands::Query {
            ref graph,
            backend,
            ref query,
        } => {
            let dag = generate(graph)?;
            let config = config::load_config(cli.config.as_deref())?;
            let mut store = open_backend(backend, &config.backend_options(), &graph.topology.label())?;
            store.insert_batch(dag.nodes(), &dag.edges())?;
            let result = scenario::execute(store.as_ref(), &query.to_query())?;
            print_result(&result, graph.json)?;
            Ok(0)
        }
        Commands::Explain {
            ref graph,
            ref backends,
            ref query,
        } => {
            let dag = generate(graph)?;
            let config = config::load_config(cli.config.as_deref())?;
            let request = query.to_query().explain_request();
            let mut plans = Vec::with_capacity(backends.len());
            for &kind in backends {
                let mut store = open_backend(kind, &config.backend_options(), &graph.topology.label())?;
                store.insert_batch(dag.nodes(), &dag.edges())?;
                plans.push(store.explain(&request)?);
            }
            if graph.json {
                println!("{}", serde_json::to_string_pretty(&plans)?);
            } else {
                for plan in &plans {
                    println!("{plan}");
                }
            }
            Ok(0)
        }
    }
}

fn run_benchmark(config_path: Option<&std::path::Path>, args: &RunArgs) -> Result<i32> {
    let mut config = config::load_config(config_path)?;
    apply_run_args(&mut config, args);
    config.validate()?;

    let mut runner = BenchmarkRunner::new(config);
    let progress = if args.quiet || runner.config().output == OutputFormat::Json {
        None
    } else {
        let bar = ProgressBar::new(runner.planned_queries());
        let template = "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} queries";
        if let Ok(bar_style) = ProgressStyle::with_template(template) {
            bar.set_style(bar_style);
        }
        Some(bar)
    };
    if let Some(ref bar) = progress {
        let bar = bar.clone();
        runner = runner.with_progress(move |n| bar.inc(n));
    }

    let report = runner.run()?;
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    match report.settings().output {
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Table => {
            print!("{}", report.render_body(args.per_iteration));
            let line = report.summary_line();
            let styled = match report.outcome() {
                RunOutcome::Clean => style(line).green().bold(),
                RunOutcome::CompletedWithFailures { .. } => style(line).yellow().bold(),
                RunOutcome::Aborted { .. } => style(line).red().bold(),
            };
            println!("\n{styled}");
        }
    }

    Ok(if report.outcome().is_aborted() {
        EXIT_ABORTED
    } else {
        0
    })
}

fn generate(args: &GraphArgs) -> Result<VersionGraph> {
    let spec = args.topology;
    DagGenerator::from_seed_option(args.seed, GeneratorOptions::default()).generate(spec.kind, spec.scale)
}

fn print_graph_summary(spec: TopologySpec, graph: &VersionGraph) {
    println!("{}", style(spec).bold());
    println!("  nodes:       {}", graph.len());
    println!("  edges:       {}", graph.edge_count());
    println!("  fingerprint: {}", graph.fingerprint());
    if let (Some(first), Some(last)) = (graph.nodes().first(), graph.nodes().last()) {
        println!("  created:     {} .. {}", first.created_at, last.created_at);
    }
}

fn print_result(result: &QueryResult, json: bool) -> Result<()> {
    match result {
        QueryResult::Nodes(nodes) if json => println!("{}", serde_json::to_string_pretty(nodes)?),
        QueryResult::Ancestor(found) if json => println!("{}", serde_json::to_string_pretty(found)?),
        QueryResult::Nodes(nodes) => {
            for node in nodes {
                println!(
                    "{:>8}  {:<10} {:<18} {}",
                    node.id,
                    node.author,
                    node.title,
                    node.created_at.to_rfc3339()
                );
            }
            println!("{} node(s)", nodes.len());
        }
        QueryResult::Ancestor(Some(node)) => {
            println!("{} ({}, {}, {})", node.id, node.author, node.title, node.created_at.to_rfc3339());
        }
        QueryResult::Ancestor(None) => println!("(no common ancestor)"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Topology;
    use pretty_assertions::assert_eq;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_override_config() {
        let cli = Cli::parse_from([
            "dagbench",
            "run",
            "--topology",
            "chain:50",
            "-t",
            "tree:31",
            "--repetitions",
            "4",
            "--seed",
            "9",
            "--backends",
            "sqlite,reference",
            "--output",
            "json",
            "--parallel",
            "--clients",
            "3",
            "--no-verify",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut config = BenchConfig::default();
        apply_run_args(&mut config, &args);
        assert_eq!(
            config.topologies,
            vec![
                TopologySpec::new(Topology::Chain, 50),
                TopologySpec::new(Topology::BinaryTree, 31)
            ]
        );
        assert_eq!(config.repetitions, 4);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.backends, vec![BackendKind::Sqlite, BackendKind::Reference]);
        assert_eq!(config.output, OutputFormat::Json);
        assert!(config.parallel_backends);
        assert_eq!(config.concurrent_clients, 3);
        assert!(!config.verify);
        assert!(config.warmup);
    }

    #[test]
    fn absent_flags_leave_config_alone() {
        let mut config = BenchConfig::default();
        apply_run_args(&mut config, &RunArgs::default());
        assert_eq!(config, BenchConfig::default());
    }

    #[test]
    fn bad_topology_is_rejected() {
        let err = Cli::try_parse_from(["dagbench", "run", "--topology", "star:10"]).unwrap_err();
        assert!(err.to_string().contains("invalid topology"));
    }

    #[test]
    fn query_subcommand_builds_query() {
        let cli = Cli::parse_from([
            "dagbench",
            "query",
            "--topology",
            "chain:10",
            "--backend",
            "sqlite",
            "ancestors",
            "7",
            "--max-depth",
            "2",
            "--author",
            "chulsu",
        ]);
        let Commands::Query { backend, query, .. } = cli.command else {
            panic!("expected query");
        };
        assert_eq!(backend, BackendKind::Sqlite);
        let Query::Ancestors { id, query } = query.to_query() else {
            panic!("expected ancestors");
        };
        assert_eq!(id, VersionId(7));
        assert_eq!(query.max_depth, Some(2));
        assert_eq!(query.predicate.author.as_deref(), Some("chulsu"));
        assert!(!query.include_self);
    }

    #[test]
    fn lca_subcommand_takes_two_ids() {
        let cli = Cli::parse_from(["dagbench", "explain", "lca", "3", "9"]);
        let Commands::Explain { backends, query, graph } = cli.command else {
            panic!("expected explain");
        };
        assert_eq!(backends, vec![BackendKind::Sqlite, BackendKind::Native]);
        assert_eq!(graph.topology, TopologySpec::new(Topology::ComplexRandom, 1000));
        assert_eq!(
            query.to_query(),
            Query::LatestCommonAncestor {
                a: VersionId(3),
                b: VersionId(9)
            }
        );
    }

    #[test]
    fn generate_rejects_scale_zero() {
        let args = GraphArgs {
            topology: TopologySpec::new(Topology::Chain, 0),
            seed: None,
            json: false,
        };
        let err = generate(&args).unwrap_err();
        assert_eq!(err.class(), crate::error::ErrorClass::Generation);
    }
}
