//! Command-line surface.

use std::path::PathBuf;

use clap::Parser;

/// Collect static-analysis output for one repository snapshot and roll it
/// up into per-directory metrics.
#[derive(Parser, Debug)]
#[command(name = "repolens", version, about)]
pub struct Cli {
    /// Path to the repository checkout to analyze
    #[arg(long)]
    pub repo_path: PathBuf,

    /// Stable identifier of the repository
    #[arg(long)]
    pub repo_id: String,

    /// Identifier for this run (generated when omitted)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Branch the checkout is on
    #[arg(long, default_value = "main")]
    pub branch: String,

    /// Commit SHA of the checkout
    #[arg(long)]
    pub commit: String,

    /// SQLite database file
    #[arg(long, default_value = "repolens.db")]
    pub db_path: PathBuf,

    /// Comma-separated tool names to skip
    #[arg(long, value_delimiter = ',')]
    pub skip_tools: Vec<String>,

    /// Supersede an existing run for the same repository and commit
    #[arg(long)]
    pub replace: bool,

    /// Directory where tool processes write their output documents
    #[arg(long, default_value = "tool-output")]
    pub output_root: PathBuf,
}
