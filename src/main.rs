use clap::Parser;

use dagbench::cli::{self, Cli};
use dagbench::observability;

fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        observability::init_logging_with_default("dagbench=debug");
    } else {
        observability::init_logging();
    }

    match cli::execute(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!(error = %e, class = ?e.class(), "dagbench failed");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
