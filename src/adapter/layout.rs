//! Adapter for the layout index output.
//!
//! Unlike the metric adapters, this one writes the tree everything else
//! joins against, so it never consults the `LayoutLookup`.

use async_trait::async_trait;
use rustc_hash::FxHashSet;
use serde::Deserialize;

use crate::error::Result;
use crate::store::{Database, LayoutDirectoryRow, LayoutFileRow};

use super::{
    check_non_negative, metadata_errors, paths, validation_error, wrong_records, Envelope,
    LayoutLookup, RecordBatch, ToolAdapter, ToolRecords,
};

pub const LAYOUT_TOOL_NAME: &str = "layout";

#[derive(Debug, Deserialize)]
struct LayoutData {
    #[serde(default)]
    files: Vec<LayoutFileEntry>,
    #[serde(default)]
    directories: Vec<LayoutDirectoryEntry>,
}

#[derive(Debug, Deserialize)]
struct LayoutFileEntry {
    id: String,
    path: String,
    name: String,
    #[serde(default)]
    extension: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    size_bytes: i64,
    #[serde(default)]
    line_count: Option<i64>,
    directory_id: String,
}

#[derive(Debug, Deserialize)]
struct LayoutDirectoryEntry {
    id: String,
    path: String,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    depth: i64,
}

fn parse_data(envelope: &Envelope) -> Result<LayoutData> {
    Ok(serde_json::from_value(envelope.data.clone())?)
}

pub struct LayoutAdapter;

#[async_trait]
impl ToolAdapter for LayoutAdapter {
    fn tool_name(&self) -> &'static str {
        LAYOUT_TOOL_NAME
    }

    fn validate(&self, envelope: &Envelope) -> Result<()> {
        let mut errors = metadata_errors(&envelope.metadata, LAYOUT_TOOL_NAME);
        let data = match parse_data(envelope) {
            Ok(data) => data,
            Err(e) => {
                errors.push(format!("data section malformed: {}", e));
                return Err(validation_error(LAYOUT_TOOL_NAME, errors));
            }
        };

        let mut dir_ids: FxHashSet<&str> = FxHashSet::default();
        let mut roots = 0usize;
        for (idx, dir) in data.directories.iter().enumerate() {
            if dir.id.is_empty() {
                errors.push(format!("dir[{}].id must be non-empty", idx));
            }
            if !dir_ids.insert(&dir.id) {
                errors.push(format!("dir[{}].id '{}' duplicated", idx, dir.id));
            }
            if paths::normalize_dir_path(&dir.path).is_none() {
                errors.push(format!("dir[{}] path invalid: '{}'", idx, dir.path));
            }
            check_non_negative(dir.depth, &format!("dir[{}].depth", idx), &mut errors);
            if dir.parent_id.is_none() {
                roots += 1;
            }
        }
        if !data.directories.is_empty() && roots != 1 {
            errors.push(format!("expected exactly one root directory, found {}", roots));
        }
        for (idx, dir) in data.directories.iter().enumerate() {
            if let Some(parent) = &dir.parent_id {
                if !dir_ids.contains(parent.as_str()) {
                    errors.push(format!("dir[{}].parent_id '{}' unknown", idx, parent));
                }
            }
        }

        let mut file_ids: FxHashSet<&str> = FxHashSet::default();
        let mut file_paths: FxHashSet<String> = FxHashSet::default();
        for (idx, file) in data.files.iter().enumerate() {
            if file.id.is_empty() {
                errors.push(format!("file[{}].id must be non-empty", idx));
            } else if !file_ids.insert(&file.id) {
                errors.push(format!("file[{}].id '{}' duplicated", idx, file.id));
            }
            match paths::normalize_file_path(&file.path) {
                None => errors.push(format!("file[{}] path invalid: '{}'", idx, file.path)),
                Some(path) => {
                    if !file_paths.insert(path) {
                        errors.push(format!("file[{}] path '{}' duplicated", idx, file.path));
                    }
                }
            }
            if !dir_ids.contains(file.directory_id.as_str()) {
                errors.push(format!(
                    "file[{}].directory_id '{}' unknown",
                    idx, file.directory_id
                ));
            }
            check_non_negative(file.size_bytes, &format!("file[{}].size_bytes", idx), &mut errors);
            if let Some(line_count) = file.line_count {
                check_non_negative(line_count, &format!("file[{}].line_count", idx), &mut errors);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(validation_error(LAYOUT_TOOL_NAME, errors))
        }
    }

    fn to_records(
        &self,
        envelope: &Envelope,
        run_pk: i64,
        _layout: &LayoutLookup,
    ) -> Result<RecordBatch> {
        let data = parse_data(envelope)?;

        let files = data
            .files
            .into_iter()
            .filter_map(|f| {
                let relative_path = paths::normalize_file_path(&f.path)?;
                Some(LayoutFileRow {
                    file_id: f.id,
                    relative_path,
                    directory_id: f.directory_id,
                    filename: f.name,
                    extension: f.extension,
                    language: f.language,
                    size_bytes: f.size_bytes,
                    line_count: f.line_count,
                })
            })
            .collect();

        let directories = data
            .directories
            .into_iter()
            .filter_map(|d| {
                let relative_path = paths::normalize_dir_path(&d.path)?;
                Some(LayoutDirectoryRow {
                    directory_id: d.id,
                    relative_path,
                    parent_id: d.parent_id,
                    depth: d.depth,
                })
            })
            .collect();

        Ok(RecordBatch {
            run_pk,
            records: ToolRecords::Layout {
                files,
                directories,
                summary: envelope.summary.clone(),
            },
        })
    }

    async fn persist(&self, db: &Database, batch: RecordBatch) -> Result<()> {
        match batch.records {
            ToolRecords::Layout {
                files,
                directories,
                summary,
            } => {
                db.persist_layout(batch.run_pk, &files, &directories, summary.as_ref())
                    .await
            }
            _ => Err(wrong_records(LAYOUT_TOOL_NAME)),
        }
    }
}
