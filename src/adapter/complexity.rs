//! Adapter for the cyclomatic-complexity tool: per-file aggregates plus
//! per-function detail rows.

use async_trait::async_trait;
use rustc_hash::FxHashSet;
use serde::Deserialize;

use crate::error::Result;
use crate::store::{ComplexityFileRow, ComplexityFunctionRow, Database};

use super::{
    check_file_path, check_line_range, check_non_negative, metadata_errors, validation_error,
    wrong_records, Envelope, LayoutLookup, RecordBatch, ToolAdapter, ToolRecords,
};

pub const COMPLEXITY_TOOL_NAME: &str = "complexity";

#[derive(Debug, Deserialize)]
struct ComplexityData {
    #[serde(default)]
    files: Vec<ComplexityFileEntry>,
}

#[derive(Debug, Deserialize)]
struct ComplexityFileEntry {
    path: String,
    #[serde(default)]
    language: Option<String>,
    nloc: i64,
    function_count: i64,
    total_ccn: i64,
    max_ccn: i64,
    #[serde(default)]
    functions: Vec<FunctionEntry>,
}

#[derive(Debug, Deserialize)]
struct FunctionEntry {
    name: String,
    ccn: i64,
    nloc: i64,
    line_start: i64,
    line_end: i64,
}

fn parse_data(envelope: &Envelope) -> Result<ComplexityData> {
    Ok(serde_json::from_value(envelope.data.clone())?)
}

pub struct ComplexityAdapter;

#[async_trait]
impl ToolAdapter for ComplexityAdapter {
    fn tool_name(&self) -> &'static str {
        COMPLEXITY_TOOL_NAME
    }

    fn validate(&self, envelope: &Envelope) -> Result<()> {
        let mut errors = metadata_errors(&envelope.metadata, COMPLEXITY_TOOL_NAME);
        let data = match parse_data(envelope) {
            Ok(data) => data,
            Err(e) => {
                errors.push(format!("data section malformed: {}", e));
                return Err(validation_error(COMPLEXITY_TOOL_NAME, errors));
            }
        };

        let mut seen_paths: FxHashSet<String> = FxHashSet::default();
        for (idx, entry) in data.files.iter().enumerate() {
            let prefix = format!("file[{}]", idx);
            if let Some(path) = check_file_path(&entry.path, &prefix, &mut errors) {
                if !seen_paths.insert(path) {
                    errors.push(format!("{} path '{}' duplicated", prefix, entry.path));
                }
            }
            check_non_negative(entry.nloc, &format!("{}.nloc", prefix), &mut errors);
            check_non_negative(
                entry.function_count,
                &format!("{}.function_count", prefix),
                &mut errors,
            );
            check_non_negative(entry.total_ccn, &format!("{}.total_ccn", prefix), &mut errors);
            check_non_negative(entry.max_ccn, &format!("{}.max_ccn", prefix), &mut errors);

            // Functions are keyed by (name, line_start) within their file
            let mut seen_funcs: FxHashSet<(&str, i64)> = FxHashSet::default();
            for (fidx, func) in entry.functions.iter().enumerate() {
                let fprefix = format!("{}.functions[{}]", prefix, fidx);
                if func.name.is_empty() {
                    errors.push(format!("{}.name must be non-empty", fprefix));
                }
                if !seen_funcs.insert((func.name.as_str(), func.line_start)) {
                    errors.push(format!(
                        "{} '{}' at line {} duplicated",
                        fprefix, func.name, func.line_start
                    ));
                }
                check_non_negative(func.ccn, &format!("{}.ccn", fprefix), &mut errors);
                check_non_negative(func.nloc, &format!("{}.nloc", fprefix), &mut errors);
                check_line_range(Some(func.line_start), Some(func.line_end), &fprefix, &mut errors);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(validation_error(COMPLEXITY_TOOL_NAME, errors))
        }
    }

    fn to_records(
        &self,
        envelope: &Envelope,
        run_pk: i64,
        layout: &LayoutLookup,
    ) -> Result<RecordBatch> {
        let data = parse_data(envelope)?;

        let mut files = Vec::new();
        let mut functions = Vec::new();
        for entry in data.files {
            let Some(relative_path) = super::paths::normalize_file_path(&entry.path) else {
                continue;
            };
            let Some(file_id) = layout.file_id(&relative_path) else {
                tracing::warn!(path = %relative_path, "complexity row has no layout file, dropping");
                continue;
            };
            let file_id = file_id.to_string();

            for func in entry.functions {
                functions.push(ComplexityFunctionRow {
                    file_id: file_id.clone(),
                    function_name: func.name,
                    ccn: func.ccn,
                    nloc: func.nloc,
                    line_start: func.line_start,
                    line_end: func.line_end,
                });
            }

            files.push(ComplexityFileRow {
                file_id,
                relative_path,
                language: entry.language,
                nloc: entry.nloc,
                function_count: entry.function_count,
                total_ccn: entry.total_ccn,
                max_ccn: entry.max_ccn,
            });
        }

        Ok(RecordBatch {
            run_pk,
            records: ToolRecords::Complexity {
                files,
                functions,
                summary: envelope.summary.clone(),
            },
        })
    }

    async fn persist(&self, db: &Database, batch: RecordBatch) -> Result<()> {
        match batch.records {
            ToolRecords::Complexity {
                files,
                functions,
                summary,
            } => {
                db.persist_complexity(batch.run_pk, &files, &functions, summary.as_ref())
                    .await
            }
            _ => Err(wrong_records(COMPLEXITY_TOOL_NAME)),
        }
    }
}
