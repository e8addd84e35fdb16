//! Error taxonomy for the ingestion pipeline.
//!
//! Tool-scoped errors (validation, execution, malformed output) fail one
//! tool; everything else fails the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A non-superseded run already exists for this (repo_id, commit).
    #[error("collection run already exists for repo '{repo_id}' at commit '{commit_sha}'")]
    DuplicateRun { repo_id: String, commit_sha: String },

    /// A tool's output document violated its contract.
    #[error("{tool} output failed validation: {}", errors.join("; "))]
    AdapterValidation { tool: String, errors: Vec<String> },

    /// A tool process could not be run to completion.
    #[error("tool '{tool}' execution failed: {reason}")]
    ToolExecution { tool: String, reason: String },

    /// The transform phase could not derive rollups.
    #[error("transform failed: {0}")]
    Transform(String),

    /// Stored data contradicts a structural invariant.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this failure is isolated to one tool. Tool-scoped failures
    /// are recorded in the run summary and never abort sibling tools.
    pub fn is_tool_scoped(&self) -> bool {
        matches!(
            self,
            Error::AdapterValidation { .. } | Error::ToolExecution { .. } | Error::Json(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
