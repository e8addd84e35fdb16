mod adapter;
mod cli;
mod error;
mod layout;
mod model;
mod orchestrator;
mod rollup;
mod store;

use std::collections::HashSet;

use anyhow::{Context, Result};
use clap::Parser;

use cli::Cli;
use model::ToolOutcome;
use orchestrator::{Orchestrator, RunOptions};
use store::Database;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let db_path = cli
        .db_path
        .to_str()
        .context("Invalid database path encoding")?;
    let db = Database::new(db_path).await?;
    db.init_schema().await?;

    let opts = RunOptions {
        repo_path: cli.repo_path,
        repo_id: cli.repo_id,
        run_id: cli
            .run_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        branch: cli.branch,
        commit_sha: cli.commit,
        exclude: cli.skip_tools.into_iter().collect::<HashSet<_>>(),
        replace: cli.replace,
        output_root: cli.output_root,
    };

    let orchestrator = Orchestrator::new(db);
    let summary = orchestrator
        .start_run(&opts)
        .await
        .context("collection run failed")?;

    for outcome in &summary.outcomes {
        match outcome {
            ToolOutcome::Ingested { tool, .. } => eprintln!("  {}: ingested", tool),
            ToolOutcome::Failed { tool, reason } => eprintln!("  {}: failed ({})", tool, reason),
            ToolOutcome::Skipped { tool } => eprintln!("  {}: skipped", tool),
        }
    }

    println!("{}", summary.collection_run_id);
    Ok(())
}
