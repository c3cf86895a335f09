//! datamodel_sync CLI: bring a MySQL database in line with a data model

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use datamodel_sync::config::{self, DEFAULT_CONFIG_PATH};
use datamodel_sync::utils::init_logging;
use datamodel_sync::{sync_database, SyncOptions};

#[derive(Parser)]
#[command(name = "datamodel_sync")]
#[command(about = "Synchronize a MySQL database with a declarative data model")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Skip all prompts. Unknown tables are kept.
    #[arg(short = 'y', long)]
    yes: bool,

    /// Plan and log every statement without changing the database
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::load_from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    init_logging(&config.logging).context("setting up logging")?;

    let mut options = SyncOptions::from_config(config, &cli.config).context("loading the data model")?;
    if cli.dry_run {
        options.dx_config.dry_run = true;
    }

    let report = sync_database(&options, cli.yes).await?;

    for phase in report.phases.iter().filter(|p| p.total() > 0) {
        tracing::info!(
            phase = %phase.phase,
            added = phase.added,
            removed = phase.removed,
            modified = phase.modified,
            "Summary"
        );
    }

    let elapsed = report.finished_at - report.started_at;
    tracing::info!(
        statements = report.statement_count(),
        dry_run = report.dry_run,
        elapsed_ms = elapsed.num_milliseconds(),
        "Done"
    );

    Ok(())
}
