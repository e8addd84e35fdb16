//! Directory rollup engine
//!
//! Aggregates any per-file metric, from any tool, to directory level without
//! tool-specific aggregation code. The layout run is resolved through the
//! collection-level bridge key, since run_pk values are independent per
//! tool. The directory tree's ancestor closure is built once per layout run
//! (worklist over parent_id edges) and reused across every metric pass.

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::model::ToolRun;
use crate::store::{Database, LayoutDirectoryRow, MetricRow, RollupRow, RollupScope};

/// Declarative description of one tool's per-file metric table. Adding a
/// metric column here is the only change rollups need.
#[derive(Debug)]
pub struct MetricSource {
    pub tool_name: &'static str,
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

pub const METRIC_SOURCES: &[MetricSource] = &[
    MetricSource {
        tool_name: "loc",
        table: "loc_file_metrics",
        columns: &["lines_total", "code_lines", "comment_lines", "blank_lines"],
    },
    MetricSource {
        tool_name: "complexity",
        table: "complexity_file_metrics",
        columns: &["nloc", "total_ccn"],
    },
];

pub fn metric_source_for(tool_name: &str) -> Option<&'static MetricSource> {
    METRIC_SOURCES.iter().find(|s| s.tool_name == tool_name)
}

/// Per-directory ancestor chains (each directory's list includes itself),
/// plus the file -> directory mapping for the same layout run.
#[derive(Debug)]
pub struct LayoutClosure {
    ancestors: FxHashMap<String, Vec<String>>,
    file_dirs: FxHashMap<String, String>,
}

impl LayoutClosure {
    pub fn directory_count(&self) -> usize {
        self.ancestors.len()
    }
}

/// Build the ancestor closure via BFS from the root outward. A directory
/// set that is not a single-rooted tree is an integrity defect.
pub fn build_closure(
    directories: &[LayoutDirectoryRow],
    files: impl IntoIterator<Item = (String, String)>,
) -> Result<LayoutClosure> {
    let mut children: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
    let mut roots = Vec::new();

    for dir in directories {
        match &dir.parent_id {
            None => roots.push(dir.directory_id.as_str()),
            Some(parent) => children
                .entry(parent.as_str())
                .or_default()
                .push(dir.directory_id.as_str()),
        }
    }

    if directories.is_empty() {
        return Ok(LayoutClosure {
            ancestors: FxHashMap::default(),
            file_dirs: files.into_iter().collect(),
        });
    }
    if roots.len() != 1 {
        return Err(Error::Integrity(format!(
            "layout tree must have exactly one root, found {}",
            roots.len()
        )));
    }

    let mut ancestors: FxHashMap<String, Vec<String>> = FxHashMap::default();
    let mut worklist = vec![roots[0]];
    ancestors.insert(roots[0].to_string(), vec![roots[0].to_string()]);

    while let Some(dir_id) = worklist.pop() {
        let chain = ancestors
            .get(dir_id)
            .cloned()
            .unwrap_or_default();
        if let Some(kids) = children.get(dir_id) {
            for child in kids {
                let mut child_chain = chain.clone();
                child_chain.push((*child).to_string());
                if ancestors.insert((*child).to_string(), child_chain).is_some() {
                    return Err(Error::Integrity(format!(
                        "directory '{}' reached twice: parent edges contain a cycle or duplicate",
                        child
                    )));
                }
                worklist.push(child);
            }
        }
    }

    if ancestors.len() != directories.len() {
        return Err(Error::Integrity(format!(
            "{} of {} directories unreachable from the root",
            directories.len() - ancestors.len(),
            directories.len()
        )));
    }

    Ok(LayoutClosure {
        ancestors,
        file_dirs: files.into_iter().collect(),
    })
}

#[derive(Default)]
struct Agg {
    file_count: i64,
    nonzero: Vec<i64>,
    totals: Vec<i64>,
}

impl Agg {
    fn add(&mut self, values: &[i64]) {
        if self.totals.is_empty() {
            self.totals = vec![0; values.len()];
            self.nonzero = vec![0; values.len()];
        }
        self.file_count += 1;
        for (idx, value) in values.iter().enumerate() {
            self.totals[idx] += value;
            if *value != 0 {
                self.nonzero[idx] += 1;
            }
        }
    }
}

/// Aggregate metric rows into one rollup row per (directory, scope, column).
/// Directories with no matching files produce no row: absence means zero.
pub fn aggregate(
    closure: &LayoutClosure,
    rows: &[MetricRow],
    columns: &[&str],
    run_pk: i64,
) -> Result<Vec<RollupRow>> {
    let mut aggs: FxHashMap<(String, RollupScope), Agg> = FxHashMap::default();

    for row in rows {
        let dir_id = closure.file_dirs.get(&row.file_id).ok_or_else(|| {
            Error::Integrity(format!(
                "metric row references file '{}' absent from the layout run",
                row.file_id
            ))
        })?;
        let chain = closure.ancestors.get(dir_id).ok_or_else(|| {
            Error::Integrity(format!(
                "file '{}' sits in directory '{}' absent from the layout run",
                row.file_id, dir_id
            ))
        })?;

        aggs.entry((dir_id.clone(), RollupScope::Direct))
            .or_default()
            .add(&row.values);
        for ancestor in chain {
            aggs.entry((ancestor.clone(), RollupScope::Recursive))
                .or_default()
                .add(&row.values);
        }
    }

    let mut out = Vec::with_capacity(aggs.len() * columns.len());
    for ((directory_id, scope), agg) in aggs {
        for (idx, column) in columns.iter().enumerate() {
            out.push(RollupRow {
                run_pk,
                directory_id: directory_id.clone(),
                scope,
                metric: (*column).to_string(),
                file_count: agg.file_count,
                nonzero_file_count: agg.nonzero[idx],
                total: agg.totals[idx],
            });
        }
    }
    Ok(out)
}

/// Rollup engine with a per-layout-run closure cache.
#[derive(Default)]
pub struct RollupEngine {
    closures: FxHashMap<i64, LayoutClosure>,
}

impl RollupEngine {
    pub fn new() -> Self {
        Self::default()
    }

    async fn closure_for(&mut self, db: &Database, layout_pk: i64) -> Result<&LayoutClosure> {
        if !self.closures.contains_key(&layout_pk) {
            let directories = db.load_layout_directories(layout_pk).await?;
            let files = db
                .load_layout_files(layout_pk)
                .await?
                .into_iter()
                .map(|f| (f.file_id, f.directory_id));
            let closure = build_closure(&directories, files)?;
            self.closures.insert(layout_pk, closure);
        }
        Ok(&self.closures[&layout_pk])
    }

    /// Compute rollup rows for one tool run against its collection's layout
    /// tree. Does not persist; the caller owns the write.
    pub async fn rollup(
        &mut self,
        db: &Database,
        tool_run: &ToolRun,
        source: &MetricSource,
    ) -> Result<Vec<RollupRow>> {
        let layout_pk = db
            .layout_run_pk(&tool_run.collection_run_id)
            .await?
            .ok_or_else(|| {
                Error::Transform(format!(
                    "no layout run in collection {}",
                    tool_run.collection_run_id
                ))
            })?;

        let rows = db
            .fetch_metric_rows(source.table, source.columns, tool_run.run_pk)
            .await?;
        let closure = self.closure_for(db, layout_pk).await?;
        aggregate(closure, &rows, source.columns, tool_run.run_pk)
    }
}
