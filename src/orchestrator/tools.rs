//! External tool invocation.
//!
//! Tools are black-box processes over a shared read-only checkout. Each is
//! spawned with the env-var contract (REPO_PATH, REPO_ID, RUN_ID, BRANCH,
//! COMMIT, OUTPUT_DIR) and must write `$OUTPUT_DIR/output.json`. Each
//! invocation has an independent timeout; a timeout is treated like any
//! other per-tool failure.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::adapter::Envelope;
use crate::error::{Error, Result};

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(600);

/// One runnable analysis tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    pub timeout: Duration,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Default specs for the shipped adapters: tool `t` is the executable `t`
/// on PATH.
pub fn default_tool_specs() -> Vec<ToolSpec> {
    ["loc", "complexity", "findings"]
        .into_iter()
        .map(|name| ToolSpec::new(name, vec![name.to_string()]))
        .collect()
}

/// Everything a tool process needs to address one collection run.
pub(crate) struct ToolContext<'a> {
    pub repo_path: &'a Path,
    pub repo_id: &'a str,
    pub run_id: &'a str,
    pub branch: &'a str,
    pub commit_sha: &'a str,
    pub output_root: &'a Path,
}

impl ToolContext<'_> {
    fn output_dir(&self, tool: &str) -> PathBuf {
        self.output_root.join(tool).join(self.run_id)
    }
}

fn execution_error(tool: &str, reason: impl Into<String>) -> Error {
    Error::ToolExecution {
        tool: tool.to_string(),
        reason: reason.into(),
    }
}

/// Run one tool to completion and load its output envelope.
pub(crate) async fn execute(spec: &ToolSpec, ctx: &ToolContext<'_>) -> Result<Envelope> {
    let output_dir = ctx.output_dir(&spec.name);
    tokio::fs::create_dir_all(&output_dir).await?;

    let (program, args) = spec
        .command
        .split_first()
        .ok_or_else(|| execution_error(&spec.name, "empty command"))?;

    let mut child = Command::new(program)
        .args(args)
        .env("REPO_PATH", ctx.repo_path)
        .env("REPO_ID", ctx.repo_id)
        .env("RUN_ID", ctx.run_id)
        .env("BRANCH", ctx.branch)
        .env("COMMIT", ctx.commit_sha)
        .env("OUTPUT_DIR", &output_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| execution_error(&spec.name, format!("failed to spawn '{}': {}", program, e)))?;

    let status = match tokio::time::timeout(spec.timeout, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            let _ = child.kill().await;
            return Err(execution_error(
                &spec.name,
                format!("timed out after {:?}", spec.timeout),
            ));
        }
    };

    if !status.success() {
        return Err(execution_error(&spec.name, format!("exited with {}", status)));
    }

    let output_path = output_dir.join("output.json");
    let raw = tokio::fs::read(&output_path).await.map_err(|e| {
        execution_error(
            &spec.name,
            format!("missing output at {}: {}", output_path.display(), e),
        )
    })?;

    Ok(serde_json::from_slice(&raw)?)
}
