// Shared test fixtures for integration tests
// Functions here are used across different test files
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use repolens::adapter::{Envelope, Metadata};
use repolens::orchestrator::RunOptions;
use repolens::store::Database;
use tempfile::TempDir;

pub const TEST_TIMESTAMP: &str = "2026-01-01T00:00:00Z";

/// Create an in-memory test database
pub async fn create_test_db() -> Database {
    Database::new(":memory:").await.unwrap()
}

/// In-memory database with initialized schema
pub async fn setup_db() -> Database {
    let db = create_test_db().await;
    db.init_schema().await.unwrap();
    db
}

pub fn metadata(tool: &str, run_id: &str) -> Metadata {
    Metadata {
        tool_name: tool.to_string(),
        tool_version: "1.0.0".to_string(),
        schema_version: "1".to_string(),
        repo_id: "repo-1".to_string(),
        run_id: run_id.to_string(),
        branch: "main".to_string(),
        commit_sha: "abc123".to_string(),
        timestamp: TEST_TIMESTAMP.to_string(),
    }
}

pub fn envelope(
    tool: &str,
    run_id: &str,
    data: serde_json::Value,
    summary: Option<serde_json::Value>,
) -> Envelope {
    Envelope {
        metadata: metadata(tool, run_id),
        data,
        summary,
    }
}

/// A two-file checkout: a.py at the root and sub/b.py.
pub fn create_fixture_repo() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_path_buf();
    std::fs::write(path.join("a.py"), "print(1)\n".repeat(10)).unwrap();
    std::fs::create_dir(path.join("sub")).unwrap();
    std::fs::write(path.join("sub/b.py"), "print(2)\n".repeat(5)).unwrap();
    (dir, path)
}

pub fn run_options(repo_path: &Path, output_root: &Path, run_id: &str) -> RunOptions {
    RunOptions {
        repo_path: repo_path.to_path_buf(),
        repo_id: "repo-1".to_string(),
        run_id: run_id.to_string(),
        branch: "main".to_string(),
        commit_sha: "abc123".to_string(),
        exclude: HashSet::new(),
        replace: false,
        output_root: output_root.to_path_buf(),
    }
}

/// Write a shell script the orchestrator can run as a tool via `sh <path>`.
pub fn write_tool_script(dir: &Path, name: &str, body: &str) -> Vec<String> {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    vec![
        "/bin/sh".to_string(),
        path.to_str().unwrap().to_string(),
    ]
}

/// A fake loc tool emitting metrics for the fixture repo's two files.
pub fn loc_script() -> &'static str {
    r#"#!/bin/sh
cat > "$OUTPUT_DIR/output.json" <<EOF
{
  "metadata": {
    "tool_name": "loc",
    "tool_version": "1.0.0",
    "schema_version": "1",
    "repo_id": "$REPO_ID",
    "run_id": "$RUN_ID",
    "branch": "$BRANCH",
    "commit": "$COMMIT",
    "timestamp": "2026-01-01T00:00:00Z"
  },
  "data": {
    "files": [
      {"path": "a.py", "language": "Python", "lines_total": 10, "code_lines": 10, "comment_lines": 0, "blank_lines": 0, "size_bytes": 90},
      {"path": "sub/b.py", "language": "Python", "lines_total": 5, "code_lines": 5, "comment_lines": 0, "blank_lines": 0, "size_bytes": 45}
    ]
  },
  "summary": {"file_count": 2, "lines_total": 15}
}
EOF
"#
}

/// A fake findings tool whose output violates the severity contract.
pub fn bad_findings_script() -> &'static str {
    r#"#!/bin/sh
cat > "$OUTPUT_DIR/output.json" <<EOF
{
  "metadata": {
    "tool_name": "findings",
    "tool_version": "1.0.0",
    "schema_version": "1",
    "repo_id": "$REPO_ID",
    "run_id": "$RUN_ID",
    "branch": "$BRANCH",
    "commit": "$COMMIT",
    "timestamp": "2026-01-01T00:00:00Z"
  },
  "data": {
    "findings": [
      {"path": "a.py", "rule_id": "R1", "severity": "catastrophic", "message": "bad"}
    ]
  }
}
EOF
"#
}

/// A fake loc tool reporting the same file twice.
pub fn duplicate_loc_script() -> &'static str {
    r#"#!/bin/sh
cat > "$OUTPUT_DIR/output.json" <<EOF
{
  "metadata": {
    "tool_name": "loc",
    "tool_version": "1.0.0",
    "schema_version": "1",
    "repo_id": "$REPO_ID",
    "run_id": "$RUN_ID",
    "branch": "$BRANCH",
    "commit": "$COMMIT",
    "timestamp": "2026-01-01T00:00:00Z"
  },
  "data": {
    "files": [
      {"path": "a.py", "lines_total": 10, "code_lines": 10, "comment_lines": 0, "blank_lines": 0, "size_bytes": 90},
      {"path": "a.py", "lines_total": 4, "code_lines": 4, "comment_lines": 0, "blank_lines": 0, "size_bytes": 36}
    ]
  }
}
EOF
"#
}

pub fn crashing_script() -> &'static str {
    "#!/bin/sh\nexit 3\n"
}

pub fn sleeping_script() -> &'static str {
    "#!/bin/sh\nsleep 30\n"
}
