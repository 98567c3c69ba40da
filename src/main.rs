mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::RegisterIndex(args) => commands::register_index::run(args),
        Commands::ImportLabels(args) => commands::import::run_labels(args),
        Commands::ImportRun(args) => commands::import::run_queries(args),
        Commands::Reconcile(args) => commands::reconcile::run(args),
        Commands::Metrics(args) => commands::metrics::run(args),
        Commands::RankCurve(args) => commands::rank_curve::run(args),
        Commands::Feedback(args) => commands::feedback::run(args),
        Commands::Status(args) => commands::status::run(args),
        Commands::Purge(args) => commands::purge::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
