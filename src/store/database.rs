use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::model::{CollectionRun, RunStatus, ToolRun};

use super::{PER_RUN_TABLES, SCHEMA_VERSION};

/// Database abstraction for SQLite operations.
///
/// Single-connection pool: collection and transformation each have exactly
/// one writer and run strictly sequentially within a collection run.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .pragma("temp_store", "MEMORY")
            .pragma("cache_size", "-64000");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Initialize database schema, returns true if schema was rebuilt
    pub async fn init_schema(&self) -> Result<bool> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let stored_version: Option<String> =
            sqlx::query("SELECT value FROM metadata WHERE key = 'schema_version'")
                .fetch_optional(&self.pool)
                .await?
                .map(|row| row.get("value"));

        let needs_rebuild = stored_version.as_deref() != Some(SCHEMA_VERSION);

        if needs_rebuild {
            if let Some(old) = &stored_version {
                tracing::warn!(old, new = SCHEMA_VERSION, "schema version changed, rebuilding");
            }
            for table in PER_RUN_TABLES {
                sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                    .execute(&self.pool)
                    .await?;
            }
            sqlx::query("DROP TABLE IF EXISTS tool_runs").execute(&self.pool).await?;
            sqlx::query("DROP TABLE IF EXISTS collection_runs").execute(&self.pool).await?;
            sqlx::query("DELETE FROM metadata").execute(&self.pool).await?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS collection_runs (
                collection_run_id TEXT PRIMARY KEY,
                repo_id TEXT NOT NULL,
                run_id TEXT NOT NULL,
                branch TEXT NOT NULL,
                commit_sha TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                status TEXT NOT NULL,
                UNIQUE (repo_id, commit_sha)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tool_runs (
                run_pk INTEGER PRIMARY KEY AUTOINCREMENT,
                collection_run_id TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                tool_version TEXT NOT NULL,
                schema_version TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                UNIQUE (collection_run_id, tool_name)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS layout_files (
                run_pk INTEGER NOT NULL,
                file_id TEXT NOT NULL,
                relative_path TEXT NOT NULL,
                directory_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                extension TEXT,
                language TEXT,
                size_bytes INTEGER NOT NULL,
                line_count INTEGER,
                PRIMARY KEY (run_pk, file_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS layout_directories (
                run_pk INTEGER NOT NULL,
                directory_id TEXT NOT NULL,
                relative_path TEXT NOT NULL,
                parent_id TEXT,
                depth INTEGER NOT NULL,
                PRIMARY KEY (run_pk, directory_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS loc_file_metrics (
                run_pk INTEGER NOT NULL,
                file_id TEXT NOT NULL,
                relative_path TEXT NOT NULL,
                language TEXT,
                lines_total INTEGER NOT NULL,
                code_lines INTEGER NOT NULL,
                comment_lines INTEGER NOT NULL,
                blank_lines INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL,
                PRIMARY KEY (run_pk, file_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS complexity_file_metrics (
                run_pk INTEGER NOT NULL,
                file_id TEXT NOT NULL,
                relative_path TEXT NOT NULL,
                language TEXT,
                nloc INTEGER NOT NULL,
                function_count INTEGER NOT NULL,
                total_ccn INTEGER NOT NULL,
                max_ccn INTEGER NOT NULL,
                PRIMARY KEY (run_pk, file_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS complexity_functions (
                run_pk INTEGER NOT NULL,
                file_id TEXT NOT NULL,
                function_name TEXT NOT NULL,
                ccn INTEGER NOT NULL,
                nloc INTEGER NOT NULL,
                line_start INTEGER NOT NULL,
                line_end INTEGER NOT NULL,
                PRIMARY KEY (run_pk, file_id, function_name, line_start)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS lint_findings (
                run_pk INTEGER NOT NULL,
                finding_id TEXT NOT NULL,
                file_id TEXT NOT NULL,
                relative_path TEXT NOT NULL,
                rule_id TEXT NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                line_start INTEGER,
                line_end INTEGER,
                PRIMARY KEY (run_pk, finding_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tool_summaries (
                run_pk INTEGER PRIMARY KEY,
                summary_json TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS directory_rollups (
                run_pk INTEGER NOT NULL,
                directory_id TEXT NOT NULL,
                scope TEXT NOT NULL,
                metric TEXT NOT NULL,
                file_count INTEGER NOT NULL,
                nonzero_file_count INTEGER NOT NULL,
                total INTEGER NOT NULL,
                PRIMARY KEY (run_pk, directory_id, scope, metric)
            )",
        )
        .execute(&self.pool)
        .await?;

        if needs_rebuild {
            sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?)")
                .bind(SCHEMA_VERSION)
                .execute(&self.pool)
                .await?;
        }

        Ok(needs_rebuild)
    }

    /// Get metadata value by key
    pub async fn get_metadata(&self, key: &str) -> Option<String> {
        sqlx::query("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .map(|row| row.get("value"))
    }

    /// Find the collection run for a (repo_id, commit_sha) pair, if any
    pub async fn find_collection_run(
        &self,
        repo_id: &str,
        commit_sha: &str,
    ) -> Result<Option<CollectionRun>> {
        let row = sqlx::query(
            "SELECT collection_run_id, repo_id, run_id, branch, commit_sha,
                    started_at, completed_at, status
             FROM collection_runs
             WHERE repo_id = ? AND commit_sha = ?",
        )
        .bind(repo_id)
        .bind(commit_sha)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| Self::collection_run_from_row(&row)).transpose()
    }

    fn collection_run_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CollectionRun> {
        let status_str: String = row.get("status");
        let status = RunStatus::parse(&status_str)
            .ok_or_else(|| Error::Integrity(format!("unknown run status '{}'", status_str)))?;
        Ok(CollectionRun {
            collection_run_id: row.get("collection_run_id"),
            repo_id: row.get("repo_id"),
            run_id: row.get("run_id"),
            branch: row.get("branch"),
            commit_sha: row.get("commit_sha"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            status,
        })
    }

    pub async fn insert_collection_run(&self, run: &CollectionRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO collection_runs (
                collection_run_id, repo_id, run_id, branch, commit_sha,
                started_at, completed_at, status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.collection_run_id)
        .bind(&run.repo_id)
        .bind(&run.run_id)
        .bind(&run.branch)
        .bind(&run.commit_sha)
        .bind(&run.started_at)
        .bind(&run.completed_at)
        .bind(run.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            // Loser of a find-then-insert race against the same (repo, commit)
            sqlx::Error::Database(ref db) if db.is_unique_violation() => Error::DuplicateRun {
                repo_id: run.repo_id.clone(),
                commit_sha: run.commit_sha.clone(),
            },
            other => Error::Store(other),
        })?;
        Ok(())
    }

    pub async fn mark_run_status(
        &self,
        collection_run_id: &str,
        status: RunStatus,
        completed_at: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE collection_runs SET status = ?, completed_at = ?
             WHERE collection_run_id = ?",
        )
        .bind(status.as_str())
        .bind(completed_at)
        .bind(collection_run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete every row tied to a superseded collection run and reset the
    /// run row for re-collection. One transaction: a partially applied
    /// replace is never observable.
    pub async fn replace_collection_run(
        &self,
        collection_run_id: &str,
        started_at: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let run_pks: Vec<i64> =
            sqlx::query_scalar("SELECT run_pk FROM tool_runs WHERE collection_run_id = ?")
                .bind(collection_run_id)
                .fetch_all(&mut *tx)
                .await?;

        for run_pk in &run_pks {
            for table in PER_RUN_TABLES {
                sqlx::query(&format!("DELETE FROM {} WHERE run_pk = ?", table))
                    .bind(run_pk)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        sqlx::query("DELETE FROM tool_runs WHERE collection_run_id = ?")
            .bind(collection_run_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE collection_runs
             SET started_at = ?, completed_at = NULL, status = 'running'
             WHERE collection_run_id = ?",
        )
        .bind(started_at)
        .bind(collection_run_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Insert a tool run and return its surrogate key
    pub async fn insert_tool_run(
        &self,
        collection_run_id: &str,
        tool_name: &str,
        tool_version: &str,
        schema_version: &str,
        recorded_at: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO tool_runs (
                collection_run_id, tool_name, tool_version, schema_version, recorded_at
            ) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(collection_run_id)
        .bind(tool_name)
        .bind(tool_version)
        .bind(schema_version)
        .bind(recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => Error::Integrity(
                format!("duplicate tool run for {} in {}", tool_name, collection_run_id),
            ),
            other => Error::Store(other),
        })?;
        Ok(result.last_insert_rowid())
    }

    /// Remove a tool run and any rows it owns. Used to back out a tool whose
    /// ingestion failed after the run row was created.
    pub async fn delete_tool_run(&self, run_pk: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in PER_RUN_TABLES {
            sqlx::query(&format!("DELETE FROM {} WHERE run_pk = ?", table))
                .bind(run_pk)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM tool_runs WHERE run_pk = ?")
            .bind(run_pk)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_tool_run(
        &self,
        collection_run_id: &str,
        tool_name: &str,
    ) -> Result<Option<ToolRun>> {
        let row = sqlx::query(
            "SELECT run_pk, collection_run_id, tool_name, tool_version, schema_version, recorded_at
             FROM tool_runs
             WHERE collection_run_id = ? AND tool_name = ?",
        )
        .bind(collection_run_id)
        .bind(tool_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ToolRun {
            run_pk: row.get("run_pk"),
            collection_run_id: row.get("collection_run_id"),
            tool_name: row.get("tool_name"),
            tool_version: row.get("tool_version"),
            schema_version: row.get("schema_version"),
            recorded_at: row.get("recorded_at"),
        }))
    }

    pub async fn list_tool_runs(&self, collection_run_id: &str) -> Result<Vec<ToolRun>> {
        let rows = sqlx::query(
            "SELECT run_pk, collection_run_id, tool_name, tool_version, schema_version, recorded_at
             FROM tool_runs
             WHERE collection_run_id = ?
             ORDER BY run_pk",
        )
        .bind(collection_run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ToolRun {
                run_pk: row.get("run_pk"),
                collection_run_id: row.get("collection_run_id"),
                tool_name: row.get("tool_name"),
                tool_version: row.get("tool_version"),
                schema_version: row.get("schema_version"),
                recorded_at: row.get("recorded_at"),
            })
            .collect())
    }

    /// Resolve the layout tool run for a collection via the bridge key
    pub async fn layout_run_pk(&self, collection_run_id: &str) -> Result<Option<i64>> {
        let pk = sqlx::query_scalar(
            "SELECT run_pk FROM tool_runs
             WHERE collection_run_id = ? AND tool_name = 'layout'",
        )
        .bind(collection_run_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(pk)
    }

    /// Total row count in one landing zone table (used by tests)
    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        if !PER_RUN_TABLES.contains(&table) && table != "tool_runs" && table != "collection_runs" {
            return Err(Error::Integrity(format!("unknown table '{}'", table)));
        }
        let n = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}
