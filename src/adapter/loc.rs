//! Adapter for the line-count tool ("loc"): per-file line and size metrics.

use async_trait::async_trait;
use rustc_hash::FxHashSet;
use serde::Deserialize;

use crate::error::Result;
use crate::store::{Database, LocFileRow};

use super::{
    check_file_path, check_non_negative, metadata_errors, validation_error, wrong_records,
    Envelope, LayoutLookup, RecordBatch, ToolAdapter, ToolRecords,
};

pub const LOC_TOOL_NAME: &str = "loc";

#[derive(Debug, Deserialize)]
struct LocData {
    #[serde(default)]
    files: Vec<LocFileEntry>,
}

#[derive(Debug, Deserialize)]
struct LocFileEntry {
    path: String,
    #[serde(default)]
    language: Option<String>,
    lines_total: i64,
    code_lines: i64,
    comment_lines: i64,
    blank_lines: i64,
    #[serde(default)]
    size_bytes: i64,
}

fn parse_data(envelope: &Envelope) -> Result<LocData> {
    Ok(serde_json::from_value(envelope.data.clone())?)
}

pub struct LocAdapter;

#[async_trait]
impl ToolAdapter for LocAdapter {
    fn tool_name(&self) -> &'static str {
        LOC_TOOL_NAME
    }

    fn validate(&self, envelope: &Envelope) -> Result<()> {
        let mut errors = metadata_errors(&envelope.metadata, LOC_TOOL_NAME);
        let data = match parse_data(envelope) {
            Ok(data) => data,
            Err(e) => {
                errors.push(format!("data section malformed: {}", e));
                return Err(validation_error(LOC_TOOL_NAME, errors));
            }
        };

        let mut seen_paths: FxHashSet<String> = FxHashSet::default();
        for (idx, entry) in data.files.iter().enumerate() {
            let prefix = format!("file[{}]", idx);
            if let Some(path) = check_file_path(&entry.path, &prefix, &mut errors) {
                // Paths are the natural key: a repeat would collide in the store
                if !seen_paths.insert(path) {
                    errors.push(format!("{} path '{}' duplicated", prefix, entry.path));
                }
            }
            check_non_negative(entry.lines_total, &format!("{}.lines_total", prefix), &mut errors);
            check_non_negative(entry.code_lines, &format!("{}.code_lines", prefix), &mut errors);
            check_non_negative(
                entry.comment_lines,
                &format!("{}.comment_lines", prefix),
                &mut errors,
            );
            check_non_negative(entry.blank_lines, &format!("{}.blank_lines", prefix), &mut errors);
            check_non_negative(entry.size_bytes, &format!("{}.size_bytes", prefix), &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(validation_error(LOC_TOOL_NAME, errors))
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
            .files
            .into_iter()
            .filter_map(|entry| {
                let relative_path = super::paths::normalize_file_path(&entry.path)?;
                let Some(file_id) = layout.file_id(&relative_path) else {
                    tracing::warn!(path = %relative_path, "loc row has no layout file, dropping");
                    return None;
                };
                Some(LocFileRow {
                    file_id: file_id.to_string(),
                    relative_path,
                    language: entry.language,
                    lines_total: entry.lines_total,
                    code_lines: entry.code_lines,
                    comment_lines: entry.comment_lines,
                    blank_lines: entry.blank_lines,
                    size_bytes: entry.size_bytes,
                })
            })
            .collect();

        Ok(RecordBatch {
            run_pk,
            records: ToolRecords::Loc {
                rows,
                summary: envelope.summary.clone(),
            },
        })
    }

    async fn persist(&self, db: &Database, batch: RecordBatch) -> Result<()> {
        match batch.records {
            ToolRecords::Loc { rows, summary } => {
                db.persist_loc(batch.run_pk, &rows, summary.as_ref()).await
            }
            _ => Err(wrong_records(LOC_TOOL_NAME)),
        }
    }
}
