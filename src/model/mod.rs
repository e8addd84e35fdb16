//! Shared entities persisted in the landing zone.

/// Lifecycle status of a collection run as stored in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// One analysis session for a (repository, commit) pair.
///
/// At most one live CollectionRun exists per (repo_id, commit_sha); the
/// store enforces this with a uniqueness constraint. Only the orchestrator
/// mutates these rows.
#[derive(Debug, Clone)]
pub struct CollectionRun {
    pub collection_run_id: String,
    pub repo_id: String,
    pub run_id: String,
    pub branch: String,
    pub commit_sha: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: RunStatus,
}

/// One tool's execution within a CollectionRun.
///
/// `run_pk` values are independent per tool; `collection_run_id` is the only
/// bridge key correlating two tools' data within one session.
#[derive(Debug, Clone)]
pub struct ToolRun {
    pub run_pk: i64,
    pub collection_run_id: String,
    pub tool_name: String,
    pub tool_version: String,
    pub schema_version: String,
    pub recorded_at: String,
}

/// Outcome of one requested tool within a run.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    Ingested { tool: String, run_pk: i64 },
    Failed { tool: String, reason: String },
    Skipped { tool: String },
}

impl ToolOutcome {
    pub fn tool(&self) -> &str {
        match self {
            ToolOutcome::Ingested { tool, .. }
            | ToolOutcome::Failed { tool, .. }
            | ToolOutcome::Skipped { tool } => tool,
        }
    }
}

/// Result of a completed collection run, one entry per requested tool.
#[derive(Debug)]
pub struct RunSummary {
    pub collection_run_id: String,
    pub outcomes: Vec<ToolOutcome>,
}

impl RunSummary {
    pub fn ingested(&self) -> impl Iterator<Item = (&str, i64)> {
        self.outcomes.iter().filter_map(|o| match o {
            ToolOutcome::Ingested { tool, run_pk } => Some((tool.as_str(), *run_pk)),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|o| match o {
            ToolOutcome::Failed { tool, reason } => Some((tool.as_str(), reason.as_str())),
            _ => None,
        })
    }
}
