//! Run orchestrator
//!
//! Drives the fixed two-phase pipeline: collect (layout index, then each
//! requested tool through its adapter into the landing zone), then
//! transform (directory rollups). Owns the run lifecycle and the per-tool
//! failure isolation policy: one tool's failure never aborts its siblings,
//! while transform failures leave the run FAILED.

mod tools;

pub use tools::{default_tool_specs, ToolSpec, DEFAULT_TOOL_TIMEOUT};

use std::collections::HashSet;
use std::path::PathBuf;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::adapter::{
    builtin_adapters, Envelope, LayoutAdapter, LayoutLookup, Metadata, ToolAdapter,
};
use crate::error::{Error, Result};
use crate::layout::LayoutScanner;
use crate::model::{CollectionRun, RunStatus, RunSummary, ToolOutcome};
use crate::rollup::{metric_source_for, RollupEngine};
use crate::store::Database;

use tools::ToolContext;

/// Caller-supplied parameters for one collection run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub repo_path: PathBuf,
    pub repo_id: String,
    pub run_id: String,
    pub branch: String,
    pub commit_sha: String,
    /// Tools named here are skipped outright: no ToolRun row, no error.
    pub exclude: HashSet<String>,
    /// Supersede an existing run for the same (repo_id, commit).
    pub replace: bool,
    /// Where tool processes drop their output documents.
    pub output_root: PathBuf,
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| Error::Integrity(format!("clock formatting failed: {}", e)))
}

/// Drives collection and transformation for one store handle.
///
/// Holds the explicit session state a run needs: the database handle, the
/// tool specs, and one adapter per tool. Nothing here is process-global.
pub struct Orchestrator {
    db: Database,
    tools: Vec<ToolSpec>,
    adapters: Vec<Box<dyn ToolAdapter>>,
}

impl Orchestrator {
    /// Orchestrator over the built-in tool set.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            tools: default_tool_specs(),
            adapters: builtin_adapters(),
        }
    }

    /// Orchestrator with explicit tool commands (used by tests and callers
    /// that relocate tool binaries). Every spec needs a matching adapter.
    pub fn with_tools(
        db: Database,
        tools: Vec<ToolSpec>,
        adapters: Vec<Box<dyn ToolAdapter>>,
    ) -> Self {
        Self { db, tools, adapters }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Execute one full collection run: create or supersede the
    /// CollectionRun, collect, transform, publish.
    ///
    /// Fails with `DuplicateRun` when a non-superseded run already exists
    /// for (repo_id, commit) and `replace` is false. Per-tool failures are
    /// recorded in the returned summary; only orchestration-level and
    /// transform-level failures produce an `Err`.
    pub async fn start_run(&self, opts: &RunOptions) -> Result<RunSummary> {
        let started_at = now_rfc3339()?;

        let collection_run_id = match self
            .db
            .find_collection_run(&opts.repo_id, &opts.commit_sha)
            .await?
        {
            Some(_) if !opts.replace => {
                return Err(Error::DuplicateRun {
                    repo_id: opts.repo_id.clone(),
                    commit_sha: opts.commit_sha.clone(),
                });
            }
            Some(existing) => {
                tracing::info!(
                    collection_run_id = %existing.collection_run_id,
                    "superseding existing run"
                );
                self.db
                    .replace_collection_run(&existing.collection_run_id, &started_at)
                    .await?;
                existing.collection_run_id
            }
            None => {
                let run = CollectionRun {
                    collection_run_id: opts.run_id.clone(),
                    repo_id: opts.repo_id.clone(),
                    run_id: opts.run_id.clone(),
                    branch: opts.branch.clone(),
                    commit_sha: opts.commit_sha.clone(),
                    started_at: started_at.clone(),
                    completed_at: None,
                    status: RunStatus::Pending,
                };
                self.db.insert_collection_run(&run).await?;
                run.collection_run_id
            }
        };

        self.db
            .mark_run_status(&collection_run_id, RunStatus::Running, None)
            .await?;

        match self.collect_and_transform(&collection_run_id, opts).await {
            Ok(outcomes) => {
                let completed_at = now_rfc3339()?;
                self.db
                    .mark_run_status(&collection_run_id, RunStatus::Completed, Some(&completed_at))
                    .await?;
                tracing::info!(%collection_run_id, "run completed");
                Ok(RunSummary {
                    collection_run_id,
                    outcomes,
                })
            }
            Err(e) => {
                let failed_at = now_rfc3339().unwrap_or_else(|_| started_at.clone());
                if let Err(mark_err) = self
                    .db
                    .mark_run_status(&collection_run_id, RunStatus::Failed, Some(&failed_at))
                    .await
                {
                    tracing::error!(%collection_run_id, error = %mark_err, "failed to mark run failed");
                }
                Err(e)
            }
        }
    }

    async fn collect_and_transform(
        &self,
        collection_run_id: &str,
        opts: &RunOptions,
    ) -> Result<Vec<ToolOutcome>> {
        // Layout first: every adapter and every rollup joins against it,
        // so its failure is fatal to the run.
        let scanner = LayoutScanner::new(&opts.repo_path);
        let envelope = scanner.scan(
            &opts.repo_id,
            collection_run_id,
            &opts.branch,
            &opts.commit_sha,
        )?;
        let layout_adapter = LayoutAdapter;
        let layout_pk = self
            .ingest(collection_run_id, &layout_adapter, envelope, &LayoutLookup::default())
            .await?;

        let layout_files = self.db.load_layout_files(layout_pk).await?;
        let lookup = LayoutLookup::new(&layout_files);
        tracing::debug!(files = lookup.len(), "layout ingested");

        let mut outcomes = Vec::with_capacity(self.tools.len());
        for spec in &self.tools {
            if opts.exclude.contains(&spec.name) {
                tracing::debug!(tool = %spec.name, "excluded, skipping");
                outcomes.push(ToolOutcome::Skipped {
                    tool: spec.name.clone(),
                });
                continue;
            }

            match self.run_one_tool(collection_run_id, opts, spec, &lookup).await {
                Ok(run_pk) => outcomes.push(ToolOutcome::Ingested {
                    tool: spec.name.clone(),
                    run_pk,
                }),
                Err(e) if e.is_tool_scoped() => {
                    tracing::warn!(tool = %spec.name, error = %e, "tool failed, continuing");
                    outcomes.push(ToolOutcome::Failed {
                        tool: spec.name.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        self.transform(collection_run_id, &outcomes).await?;
        Ok(outcomes)
    }

    /// One tool's full unit of work: execute, validate, ingest. Any error
    /// after the ToolRun insert removes that row again, so a failed tool
    /// leaves no trace beyond its summary entry.
    async fn run_one_tool(
        &self,
        collection_run_id: &str,
        opts: &RunOptions,
        spec: &ToolSpec,
        lookup: &LayoutLookup,
    ) -> Result<i64> {
        let adapter = self
            .adapters
            .iter()
            .find(|a| a.tool_name() == spec.name)
            .ok_or_else(|| Error::ToolExecution {
                tool: spec.name.clone(),
                reason: "no adapter registered".to_string(),
            })?;

        let ctx = ToolContext {
            repo_path: &opts.repo_path,
            repo_id: &opts.repo_id,
            run_id: collection_run_id,
            branch: &opts.branch,
            commit_sha: &opts.commit_sha,
            output_root: &opts.output_root,
        };
        let envelope = tools::execute(spec, &ctx).await?;

        check_congruence(&envelope.metadata, &opts.repo_id, collection_run_id, &spec.name)?;
        self.ingest(collection_run_id, adapter.as_ref(), envelope, lookup).await
    }

    /// Validate an envelope and land it: ToolRun row first (yielding the
    /// run_pk the records are keyed by), then one atomic row batch.
    async fn ingest(
        &self,
        collection_run_id: &str,
        adapter: &dyn ToolAdapter,
        envelope: Envelope,
        lookup: &LayoutLookup,
    ) -> Result<i64> {
        adapter.validate(&envelope)?;

        let run_pk = self
            .db
            .insert_tool_run(
                collection_run_id,
                adapter.tool_name(),
                &envelope.metadata.tool_version,
                &envelope.metadata.schema_version,
                &envelope.metadata.timestamp,
            )
            .await?;

        let landed = async {
            let batch = adapter.to_records(&envelope, run_pk, lookup)?;
            adapter.persist(&self.db, batch).await
        }
        .await;

        if let Err(e) = landed {
            // The batch insert is all-or-nothing, so backing out the run row
            // restores the pre-tool state exactly.
            self.db.delete_tool_run(run_pk).await?;
            return Err(e);
        }

        Ok(run_pk)
    }

    /// Transform phase: directory rollups for every ingested metric tool.
    /// Failures here are fatal and leave the run FAILED; nothing partial is
    /// published because status gates downstream readability.
    async fn transform(
        &self,
        collection_run_id: &str,
        outcomes: &[ToolOutcome],
    ) -> Result<()> {
        let mut engine = RollupEngine::new();

        for outcome in outcomes {
            let ToolOutcome::Ingested { tool, run_pk } = outcome else {
                continue;
            };
            let Some(source) = metric_source_for(tool) else {
                continue;
            };

            let tool_run = self
                .db
                .get_tool_run(collection_run_id, tool)
                .await?
                .ok_or_else(|| {
                    Error::Transform(format!("ingested tool run '{}' disappeared", tool))
                })?;

            let rows = match engine.rollup(&self.db, &tool_run, source).await {
                Ok(rows) => rows,
                Err(e @ Error::Integrity(_)) => return Err(e),
                Err(e) => return Err(Error::Transform(e.to_string())),
            };
            self.db.replace_rollups(*run_pk, &rows).await?;
            tracing::debug!(tool = %tool, rollups = rows.len(), "rollups written");
        }

        Ok(())
    }
}

/// Reject documents produced for a different repository or session.
fn check_congruence(
    metadata: &Metadata,
    repo_id: &str,
    run_id: &str,
    tool: &str,
) -> Result<()> {
    let mut errors = Vec::new();
    if metadata.repo_id != repo_id {
        errors.push(format!(
            "metadata.repo_id '{}' does not match run repo '{}'",
            metadata.repo_id, repo_id
        ));
    }
    if metadata.run_id != run_id {
        errors.push(format!(
            "metadata.run_id '{}' does not match collection run '{}'",
            metadata.run_id, run_id
        ));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::AdapterValidation {
            tool: tool.to_string(),
            errors,
        })
    }
}
