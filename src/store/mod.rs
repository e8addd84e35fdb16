//! Landing zone store
//!
//! Append-only SQLite store holding one row set per (run, tool).
//!
//! - **database**: connection handling, schema lifecycle, run bookkeeping
//! - **landing**: typed per-tool row sets and their batched, transactional
//!   inserts

mod database;
mod landing;

pub use database::Database;
pub use landing::{
    ComplexityFileRow, ComplexityFunctionRow, FindingRow, LayoutDirectoryRow, LayoutFileRow,
    LocFileRow, MetricRow, RollupRow, RollupScope,
};

/// Bumped whenever any landing zone table changes shape; a mismatch drops
/// and recreates every table.
pub const SCHEMA_VERSION: &str = "1";

/// Every table keyed by run_pk. Replace and per-tool cleanup walk this list.
pub(crate) const PER_RUN_TABLES: &[&str] = &[
    "layout_files",
    "layout_directories",
    "loc_file_metrics",
    "complexity_file_metrics",
    "complexity_functions",
    "lint_findings",
    "tool_summaries",
    "directory_rollups",
];
