//! Typed per-tool row sets and their batched inserts.
//!
//! Every insert here is a single transaction scoped to one run_pk: a tool's
//! batch lands in full or not at all. Rows are never updated after insert.

use sqlx::{QueryBuilder, Row, Sqlite, Transaction};

use crate::error::{Error, Result};

use super::database::Database;
use super::PER_RUN_TABLES;

const BATCH_SIZE: usize = 400;

/// One file in the canonical layout tree.
#[derive(Debug, Clone)]
pub struct LayoutFileRow {
    pub file_id: String,
    pub relative_path: String,
    pub directory_id: String,
    pub filename: String,
    pub extension: Option<String>,
    pub language: Option<String>,
    pub size_bytes: i64,
    pub line_count: Option<i64>,
}

/// One directory in the canonical layout tree. `parent_id` is None at the
/// root; the edges must form a tree.
#[derive(Debug, Clone)]
pub struct LayoutDirectoryRow {
    pub directory_id: String,
    pub relative_path: String,
    pub parent_id: Option<String>,
    pub depth: i64,
}

#[derive(Debug, Clone)]
pub struct LocFileRow {
    pub file_id: String,
    pub relative_path: String,
    pub language: Option<String>,
    pub lines_total: i64,
    pub code_lines: i64,
    pub comment_lines: i64,
    pub blank_lines: i64,
    pub size_bytes: i64,
}

#[derive(Debug, Clone)]
pub struct ComplexityFileRow {
    pub file_id: String,
    pub relative_path: String,
    pub language: Option<String>,
    pub nloc: i64,
    pub function_count: i64,
    pub total_ccn: i64,
    pub max_ccn: i64,
}

#[derive(Debug, Clone)]
pub struct ComplexityFunctionRow {
    pub file_id: String,
    pub function_name: String,
    pub ccn: i64,
    pub nloc: i64,
    pub line_start: i64,
    pub line_end: i64,
}

#[derive(Debug, Clone)]
pub struct FindingRow {
    pub finding_id: String,
    pub file_id: String,
    pub relative_path: String,
    pub rule_id: String,
    pub severity: String,
    pub message: String,
    pub line_start: Option<i64>,
    pub line_end: Option<i64>,
}

/// Aggregation scope of a rollup row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RollupScope {
    /// Every file anywhere under the directory.
    Recursive,
    /// Only immediate children.
    Direct,
}

impl RollupScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollupScope::Recursive => "recursive",
            RollupScope::Direct => "direct",
        }
    }
}

/// A derived directory aggregate. Fully recomputable from metric rows plus
/// the layout tree.
#[derive(Debug, Clone)]
pub struct RollupRow {
    pub run_pk: i64,
    pub directory_id: String,
    pub scope: RollupScope,
    pub metric: String,
    pub file_count: i64,
    pub nonzero_file_count: i64,
    pub total: i64,
}

/// One per-file metric row as seen by the rollup engine: a file_id and the
/// values of the requested columns, in declaration order.
#[derive(Debug, Clone)]
pub struct MetricRow {
    pub file_id: String,
    pub values: Vec<i64>,
}

async fn insert_summary(
    tx: &mut Transaction<'_, Sqlite>,
    run_pk: i64,
    summary: Option<&serde_json::Value>,
) -> Result<()> {
    if let Some(summary) = summary {
        sqlx::query("INSERT INTO tool_summaries (run_pk, summary_json) VALUES (?, ?)")
            .bind(run_pk)
            .bind(summary.to_string())
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

impl Database {
    /// Persist the layout tree in one transaction.
    pub async fn persist_layout(
        &self,
        run_pk: i64,
        files: &[LayoutFileRow],
        directories: &[LayoutDirectoryRow],
        summary: Option<&serde_json::Value>,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        for chunk in files.chunks(BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO layout_files (run_pk, file_id, relative_path, directory_id, \
                 filename, extension, language, size_bytes, line_count) ",
            );
            qb.push_values(chunk, |mut row, f| {
                row.push_bind(run_pk)
                    .push_bind(&f.file_id)
                    .push_bind(&f.relative_path)
                    .push_bind(&f.directory_id)
                    .push_bind(&f.filename)
                    .push_bind(&f.extension)
                    .push_bind(&f.language)
                    .push_bind(f.size_bytes)
                    .push_bind(f.line_count);
            });
            qb.build().execute(&mut *tx).await?;
        }

        for chunk in directories.chunks(BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO layout_directories (run_pk, directory_id, relative_path, \
                 parent_id, depth) ",
            );
            qb.push_values(chunk, |mut row, d| {
                row.push_bind(run_pk)
                    .push_bind(&d.directory_id)
                    .push_bind(&d.relative_path)
                    .push_bind(&d.parent_id)
                    .push_bind(d.depth);
            });
            qb.build().execute(&mut *tx).await?;
        }

        insert_summary(&mut tx, run_pk, summary).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn persist_loc(
        &self,
        run_pk: i64,
        rows: &[LocFileRow],
        summary: Option<&serde_json::Value>,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        for chunk in rows.chunks(BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO loc_file_metrics (run_pk, file_id, relative_path, language, \
                 lines_total, code_lines, comment_lines, blank_lines, size_bytes) ",
            );
            qb.push_values(chunk, |mut row, r| {
                row.push_bind(run_pk)
                    .push_bind(&r.file_id)
                    .push_bind(&r.relative_path)
                    .push_bind(&r.language)
                    .push_bind(r.lines_total)
                    .push_bind(r.code_lines)
                    .push_bind(r.comment_lines)
                    .push_bind(r.blank_lines)
                    .push_bind(r.size_bytes);
            });
            qb.build().execute(&mut *tx).await?;
        }

        insert_summary(&mut tx, run_pk, summary).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn persist_complexity(
        &self,
        run_pk: i64,
        files: &[ComplexityFileRow],
        functions: &[ComplexityFunctionRow],
        summary: Option<&serde_json::Value>,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        for chunk in files.chunks(BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO complexity_file_metrics (run_pk, file_id, relative_path, \
                 language, nloc, function_count, total_ccn, max_ccn) ",
            );
            qb.push_values(chunk, |mut row, r| {
                row.push_bind(run_pk)
                    .push_bind(&r.file_id)
                    .push_bind(&r.relative_path)
                    .push_bind(&r.language)
                    .push_bind(r.nloc)
                    .push_bind(r.function_count)
                    .push_bind(r.total_ccn)
                    .push_bind(r.max_ccn);
            });
            qb.build().execute(&mut *tx).await?;
        }

        for chunk in functions.chunks(BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO complexity_functions (run_pk, file_id, function_name, ccn, \
                 nloc, line_start, line_end) ",
            );
            qb.push_values(chunk, |mut row, r| {
                row.push_bind(run_pk)
                    .push_bind(&r.file_id)
                    .push_bind(&r.function_name)
                    .push_bind(r.ccn)
                    .push_bind(r.nloc)
                    .push_bind(r.line_start)
                    .push_bind(r.line_end);
            });
            qb.build().execute(&mut *tx).await?;
        }

        insert_summary(&mut tx, run_pk, summary).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn persist_findings(
        &self,
        run_pk: i64,
        rows: &[FindingRow],
        summary: Option<&serde_json::Value>,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        for chunk in rows.chunks(BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO lint_findings (run_pk, finding_id, file_id, relative_path, \
                 rule_id, severity, message, line_start, line_end) ",
            );
            qb.push_values(chunk, |mut row, r| {
                row.push_bind(run_pk)
                    .push_bind(&r.finding_id)
                    .push_bind(&r.file_id)
                    .push_bind(&r.relative_path)
                    .push_bind(&r.rule_id)
                    .push_bind(&r.severity)
                    .push_bind(&r.message)
                    .push_bind(r.line_start)
                    .push_bind(r.line_end);
            });
            qb.build().execute(&mut *tx).await?;
        }

        insert_summary(&mut tx, run_pk, summary).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn load_layout_files(&self, run_pk: i64) -> Result<Vec<LayoutFileRow>> {
        let rows = sqlx::query(
            "SELECT file_id, relative_path, directory_id, filename, extension, language, \
             size_bytes, line_count
             FROM layout_files WHERE run_pk = ?",
        )
        .bind(run_pk)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| LayoutFileRow {
                file_id: row.get("file_id"),
                relative_path: row.get("relative_path"),
                directory_id: row.get("directory_id"),
                filename: row.get("filename"),
                extension: row.get("extension"),
                language: row.get("language"),
                size_bytes: row.get("size_bytes"),
                line_count: row.get("line_count"),
            })
            .collect())
    }

    pub async fn load_layout_directories(&self, run_pk: i64) -> Result<Vec<LayoutDirectoryRow>> {
        let rows = sqlx::query(
            "SELECT directory_id, relative_path, parent_id, depth
             FROM layout_directories WHERE run_pk = ?",
        )
        .bind(run_pk)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| LayoutDirectoryRow {
                directory_id: row.get("directory_id"),
                relative_path: row.get("relative_path"),
                parent_id: row.get("parent_id"),
                depth: row.get("depth"),
            })
            .collect())
    }

    /// Fetch per-file metric values for one tool run.
    ///
    /// `table` and `columns` come from a static metric source declaration,
    /// never from external input.
    pub async fn fetch_metric_rows(
        &self,
        table: &str,
        columns: &[&str],
        run_pk: i64,
    ) -> Result<Vec<MetricRow>> {
        if !PER_RUN_TABLES.contains(&table) {
            return Err(Error::Integrity(format!("unknown metric table '{}'", table)));
        }
        let sql = format!(
            "SELECT file_id, {} FROM {} WHERE run_pk = ?",
            columns.join(", "),
            table
        );
        let rows = sqlx::query(&sql).bind(run_pk).fetch_all(self.pool()).await?;

        Ok(rows
            .into_iter()
            .map(|row| MetricRow {
                file_id: row.get("file_id"),
                values: columns.iter().map(|c| row.get::<i64, _>(*c)).collect(),
            })
            .collect())
    }

    /// Replace the rollup rows for one tool run. Rollups are derived state:
    /// dropping and regenerating them is always safe.
    pub async fn replace_rollups(&self, run_pk: i64, rows: &[RollupRow]) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM directory_rollups WHERE run_pk = ?")
            .bind(run_pk)
            .execute(&mut *tx)
            .await?;

        for chunk in rows.chunks(BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO directory_rollups (run_pk, directory_id, scope, metric, \
                 file_count, nonzero_file_count, total) ",
            );
            qb.push_values(chunk, |mut row, r| {
                row.push_bind(r.run_pk)
                    .push_bind(&r.directory_id)
                    .push_bind(r.scope.as_str())
                    .push_bind(&r.metric)
                    .push_bind(r.file_count)
                    .push_bind(r.nonzero_file_count)
                    .push_bind(r.total);
            });
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Load rollup rows for one tool run (used by reporting and tests).
    pub async fn load_rollups(&self, run_pk: i64) -> Result<Vec<RollupRow>> {
        let rows = sqlx::query(
            "SELECT directory_id, scope, metric, file_count, nonzero_file_count, total
             FROM directory_rollups WHERE run_pk = ?",
        )
        .bind(run_pk)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                let scope_str: String = row.get("scope");
                let scope = match scope_str.as_str() {
                    "recursive" => RollupScope::Recursive,
                    "direct" => RollupScope::Direct,
                    other => {
                        return Err(Error::Integrity(format!("unknown rollup scope '{}'", other)))
                    }
                };
                Ok(RollupRow {
                    run_pk,
                    directory_id: row.get("directory_id"),
                    scope,
                    metric: row.get("metric"),
                    file_count: row.get("file_count"),
                    nonzero_file_count: row.get("nonzero_file_count"),
                    total: row.get("total"),
                })
            })
            .collect()
    }
}
