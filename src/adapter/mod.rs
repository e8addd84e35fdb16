//! Tool adapter protocol
//!
//! One adapter per tool, all exposing the same surface: `tool_name`,
//! `validate`, `to_records`, `persist`. Normalizing here means the
//! transform layer only ever sees typed, validated rows; onboarding a new
//! tool adds one adapter and one table and touches neither orchestration
//! nor rollups.

mod complexity;
mod findings;
mod layout;
mod loc;
pub mod paths;

pub use complexity::ComplexityAdapter;
pub use findings::FindingsAdapter;
pub use layout::LayoutAdapter;
pub use loc::LocAdapter;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::store::{
    ComplexityFileRow, ComplexityFunctionRow, Database, FindingRow, LayoutDirectoryRow,
    LayoutFileRow, LocFileRow,
};

/// Metadata section every tool output document carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub tool_name: String,
    pub tool_version: String,
    pub schema_version: String,
    pub repo_id: String,
    pub run_id: String,
    pub branch: String,
    #[serde(rename = "commit")]
    pub commit_sha: String,
    /// RFC 3339.
    pub timestamp: String,
}

/// The documented per-tool output contract: a metadata section, a data
/// section of per-file/per-finding records, and an optional summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub metadata: Metadata,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<serde_json::Value>,
}

/// Path -> file_id index over one collection run's layout tree, built once
/// after layout ingestion and shared by every adapter's `to_records`.
#[derive(Debug, Default)]
pub struct LayoutLookup {
    file_ids: FxHashMap<String, String>,
}

impl LayoutLookup {
    pub fn new(files: &[LayoutFileRow]) -> Self {
        Self {
            file_ids: files
                .iter()
                .map(|f| (f.relative_path.clone(), f.file_id.clone()))
                .collect(),
        }
    }

    pub fn file_id(&self, relative_path: &str) -> Option<&str> {
        self.file_ids.get(relative_path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.file_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_ids.is_empty()
    }
}

/// Typed records plus the run_pk that owns them.
#[derive(Debug)]
pub struct RecordBatch {
    pub run_pk: i64,
    pub records: ToolRecords,
}

/// Typed record batch for one tool run. One concrete variant per tool; every
/// adapter produces exactly its own variant.
#[derive(Debug)]
pub enum ToolRecords {
    Layout {
        files: Vec<LayoutFileRow>,
        directories: Vec<LayoutDirectoryRow>,
        summary: Option<serde_json::Value>,
    },
    Loc {
        rows: Vec<LocFileRow>,
        summary: Option<serde_json::Value>,
    },
    Complexity {
        files: Vec<ComplexityFileRow>,
        functions: Vec<ComplexityFunctionRow>,
        summary: Option<serde_json::Value>,
    },
    Findings {
        rows: Vec<FindingRow>,
        summary: Option<serde_json::Value>,
    },
}

/// Per-tool translation of raw output into landing zone rows.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    fn tool_name(&self) -> &'static str;

    /// Structural contract check. Fails closed: a malformed document is
    /// rejected wholesale, never partially ingested.
    fn validate(&self, envelope: &Envelope) -> Result<()>;

    /// Pure transformation from a validated envelope into typed rows owned
    /// by `run_pk`. No I/O.
    fn to_records(
        &self,
        envelope: &Envelope,
        run_pk: i64,
        layout: &LayoutLookup,
    ) -> Result<RecordBatch>;

    /// One atomic batch insert scoped to the owning run_pk. Insert-only.
    async fn persist(&self, db: &Database, batch: RecordBatch) -> Result<()>;
}

/// Adapters for the shipped metric/finding tools. The layout adapter is not
/// listed here: the orchestrator runs it first and unconditionally.
pub fn builtin_adapters() -> Vec<Box<dyn ToolAdapter>> {
    vec![
        Box::new(LocAdapter),
        Box::new(ComplexityAdapter),
        Box::new(FindingsAdapter),
    ]
}

pub(crate) fn validation_error(tool: &str, errors: Vec<String>) -> Error {
    Error::AdapterValidation {
        tool: tool.to_string(),
        errors,
    }
}

pub(crate) fn wrong_records(tool: &str) -> Error {
    Error::Integrity(format!("{} adapter received another tool's records", tool))
}

/// Structural checks shared by every adapter's `validate`.
pub(crate) fn metadata_errors(metadata: &Metadata, expected_tool: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let required = [
        ("tool_name", &metadata.tool_name),
        ("tool_version", &metadata.tool_version),
        ("schema_version", &metadata.schema_version),
        ("repo_id", &metadata.repo_id),
        ("run_id", &metadata.run_id),
        ("branch", &metadata.branch),
        ("commit", &metadata.commit_sha),
    ];
    for (field, value) in required {
        if value.is_empty() {
            errors.push(format!("metadata.{} must be non-empty", field));
        }
    }
    if !metadata.tool_name.is_empty() && metadata.tool_name != expected_tool {
        errors.push(format!(
            "metadata.tool_name is '{}', expected '{}'",
            metadata.tool_name, expected_tool
        ));
    }
    if OffsetDateTime::parse(&metadata.timestamp, &Rfc3339).is_err() {
        errors.push(format!(
            "metadata.timestamp '{}' is not RFC 3339",
            metadata.timestamp
        ));
    }
    errors
}

pub(crate) fn check_non_negative(value: i64, field: &str, errors: &mut Vec<String>) {
    if value < 0 {
        errors.push(format!("{} must be >= 0", field));
    }
}

pub(crate) fn check_line_range(
    line_start: Option<i64>,
    line_end: Option<i64>,
    field_prefix: &str,
    errors: &mut Vec<String>,
) {
    if let Some(start) = line_start {
        if start < 1 {
            errors.push(format!("{}.line_start must be >= 1", field_prefix));
        }
    }
    if let Some(end) = line_end {
        if end < 1 {
            errors.push(format!("{}.line_end must be >= 1", field_prefix));
        }
    }
    if let (Some(start), Some(end)) = (line_start, line_end) {
        if end < start {
            errors.push(format!("{}.line_end must be >= line_start", field_prefix));
        }
    }
}

/// Normalize a record path, collecting an error when it violates the
/// contract (absolute, traversal, non-POSIX).
pub(crate) fn check_file_path(raw: &str, field: &str, errors: &mut Vec<String>) -> Option<String> {
    match paths::normalize_file_path(raw) {
        Some(normalized) => Some(normalized),
        None => {
            errors.push(format!("{} path invalid: '{}'", field, raw));
            None
        }
    }
}
