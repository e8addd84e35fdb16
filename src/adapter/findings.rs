//! Adapter for the static-analysis findings tool: one row per finding.

use async_trait::async_trait;
use rustc_hash::FxHashSet;
use serde::Deserialize;

use crate::error::Result;
use crate::store::{Database, FindingRow};

use super::{
    check_file_path, check_line_range, metadata_errors, validation_error, wrong_records,
    Envelope, LayoutLookup, RecordBatch, ToolAdapter, ToolRecords,
};

pub const FINDINGS_TOOL_NAME: &str = "findings";

const SEVERITIES: &[&str] = &["info", "low", "medium", "high", "critical"];

#[derive(Debug, Deserialize)]
struct FindingsData {
    #[serde(default)]
    findings: Vec<FindingEntry>,
}

#[derive(Debug, Deserialize)]
struct FindingEntry {
    #[serde(default)]
    id: Option<String>,
    path: String,
    rule_id: String,
    severity: String,
    message: String,
    #[serde(default)]
    line_start: Option<i64>,
    #[serde(default)]
    line_end: Option<i64>,
}

fn parse_data(envelope: &Envelope) -> Result<FindingsData> {
    Ok(serde_json::from_value(envelope.data.clone())?)
}

/// Natural key for findings the tool did not key itself.
fn synthesize_id(entry: &FindingEntry, idx: usize) -> String {
    format!(
        "{}:{}:{}:{}",
        entry.rule_id,
        entry.path,
        entry.line_start.unwrap_or(0),
        idx
    )
}

pub struct FindingsAdapter;

#[async_trait]
impl ToolAdapter for FindingsAdapter {
    fn tool_name(&self) -> &'static str {
        FINDINGS_TOOL_NAME
    }

    fn validate(&self, envelope: &Envelope) -> Result<()> {
        let mut errors = metadata_errors(&envelope.metadata, FINDINGS_TOOL_NAME);
        let data = match parse_data(envelope) {
            Ok(data) => data,
            Err(e) => {
                errors.push(format!("data section malformed: {}", e));
                return Err(validation_error(FINDINGS_TOOL_NAME, errors));
            }
        };

        let mut seen_ids: FxHashSet<&str> = FxHashSet::default();
        for (idx, entry) in data.findings.iter().enumerate() {
            let prefix = format!("finding[{}]", idx);
            check_file_path(&entry.path, &prefix, &mut errors);
            if let Some(id) = &entry.id {
                if id.is_empty() {
                    errors.push(format!("{}.id must be non-empty when present", prefix));
                } else if !seen_ids.insert(id.as_str()) {
                    errors.push(format!("{}.id '{}' duplicated", prefix, id));
                }
            }
            if entry.rule_id.is_empty() {
                errors.push(format!("{}.rule_id must be non-empty", prefix));
            }
            if !SEVERITIES.contains(&entry.severity.as_str()) {
                errors.push(format!(
                    "{}.severity '{}' not one of {:?}",
                    prefix, entry.severity, SEVERITIES
                ));
            }
            check_line_range(entry.line_start, entry.line_end, &prefix, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(validation_error(FINDINGS_TOOL_NAME, errors))
        }
    }

    fn to_records(
        &self,
        envelope: &Envelope,
        run_pk: i64,
        layout: &LayoutLookup,
    ) -> Result<RecordBatch> {
        let data = parse_data(envelope)?;

        let rows = data
            .findings
            .into_iter()
            .enumerate()
            .filter_map(|(idx, entry)| {
                let relative_path = super::paths::normalize_file_path(&entry.path)?;
                let Some(file_id) = layout.file_id(&relative_path) else {
                    tracing::warn!(path = %relative_path, "finding has no layout file, dropping");
                    return None;
                };
                let finding_id = entry
                    .id
                    .clone()
                    .unwrap_or_else(|| synthesize_id(&entry, idx));
                Some(FindingRow {
                    finding_id,
                    file_id: file_id.to_string(),
                    relative_path,
                    rule_id: entry.rule_id,
                    severity: entry.severity,
                    message: entry.message,
                    line_start: entry.line_start,
                    line_end: entry.line_end,
                })
            })
            .collect();

        Ok(RecordBatch {
            run_pk,
            records: ToolRecords::Findings {
                rows,
                summary: envelope.summary.clone(),
            },
        })
    }

    async fn persist(&self, db: &Database, batch: RecordBatch) -> Result<()> {
        match batch.records {
            ToolRecords::Findings { rows, summary } => {
                db.persist_findings(batch.run_pk, &rows, summary.as_ref()).await
            }
            _ => Err(wrong_records(FINDINGS_TOOL_NAME)),
        }
    }
}
