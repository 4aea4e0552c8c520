mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { spool } => commands::run::run(spool),
        Commands::Analyze { image } => commands::analyze::run(&image),
        Commands::RebuildIndex => commands::rebuild_index::run(),
        Commands::Search {
            query,
            top_k,
            threshold,
        } => commands::search::run(&query, top_k, threshold),
        Commands::Stats => commands::stats::run(),
        Commands::Cases { limit } => commands::cases::run_list(limit),
        Commands::Case { case_id } => commands::cases::run_show(&case_id),
        Commands::Review { case_id, result } => commands::cases::run_review(&case_id, &result),
        Commands::Repair { file, model } => commands::repair::run(file.as_deref(), &model),
        Commands::Version => commands::version::run(),
    }
}
