// Landing zone store tests against an in-memory database

mod common;

use repolens::error::Error;
use repolens::model::{CollectionRun, RunStatus};
use repolens::store::{Database, LocFileRow, RollupRow, RollupScope, SCHEMA_VERSION};

async fn setup_db() -> Database {
    common::setup_db().await
}

fn sample_run(id: &str, commit_sha: &str) -> CollectionRun {
    CollectionRun {
        collection_run_id: id.to_string(),
        repo_id: "repo-1".to_string(),
        run_id: id.to_string(),
        branch: "main".to_string(),
        commit_sha: commit_sha.to_string(),
        started_at: common::TEST_TIMESTAMP.to_string(),
        completed_at: None,
        status: RunStatus::Pending,
    }
}

fn loc_row(file_id: &str, path: &str, lines: i64) -> LocFileRow {
    LocFileRow {
        file_id: file_id.to_string(),
        relative_path: path.to_string(),
        language: Some("Python".to_string()),
        lines_total: lines,
        code_lines: lines,
        comment_lines: 0,
        blank_lines: 0,
        size_bytes: lines * 10,
    }
}

#[tokio::test]
async fn test_schema_init() {
    let db = common::create_test_db().await;

    let rebuilt = db.init_schema().await.unwrap();
    assert!(rebuilt, "First init_schema should return true");

    let rebuilt = db.init_schema().await.unwrap();
    assert!(!rebuilt, "Second init_schema should return false");

    let version = db.get_metadata("schema_version").await;
    assert_eq!(version.as_deref(), Some(SCHEMA_VERSION));
}

#[tokio::test]
async fn test_collection_run_roundtrip() {
    let db = setup_db().await;

    let run = sample_run("run-1", "abc123");
    db.insert_collection_run(&run).await.unwrap();

    let found = db
        .find_collection_run("repo-1", "abc123")
        .await
        .unwrap()
        .expect("run should be findable by (repo_id, commit)");
    assert_eq!(found.collection_run_id, "run-1");
    assert_eq!(found.status, RunStatus::Pending);
    assert!(found.completed_at.is_none());

    let missing = db.find_collection_run("repo-1", "other").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_mark_run_status() {
    let db = setup_db().await;
    db.insert_collection_run(&sample_run("run-1", "abc123"))
        .await
        .unwrap();

    db.mark_run_status("run-1", RunStatus::Completed, Some("2026-01-01T01:00:00Z"))
        .await
        .unwrap();

    let found = db
        .find_collection_run("repo-1", "abc123")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.status, RunStatus::Completed);
    assert_eq!(found.completed_at.as_deref(), Some("2026-01-01T01:00:00Z"));
}

#[tokio::test]
async fn test_racing_collection_run_insert_is_duplicate_run() {
    let db = setup_db().await;
    db.insert_collection_run(&sample_run("run-1", "abc123"))
        .await
        .unwrap();

    // A second run for the same (repo_id, commit) loses on the constraint
    let err = db
        .insert_collection_run(&sample_run("run-2", "abc123"))
        .await
        .unwrap_err();
    match err {
        Error::DuplicateRun { repo_id, commit_sha } => {
            assert_eq!(repo_id, "repo-1");
            assert_eq!(commit_sha, "abc123");
        }
        other => panic!("expected DuplicateRun, got {other}"),
    }

    // The first run is untouched
    let run = db
        .find_collection_run("repo-1", "abc123")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.collection_run_id, "run-1");
}

#[tokio::test]
async fn test_duplicate_tool_run_rejected() {
    let db = setup_db().await;

    let pk1 = db
        .insert_tool_run("run-1", "loc", "1.0.0", "1", common::TEST_TIMESTAMP)
        .await
        .unwrap();
    assert!(pk1 > 0);

    let err = db
        .insert_tool_run("run-1", "loc", "1.0.0", "1", common::TEST_TIMESTAMP)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));

    // Same tool under a different collection run is fine
    let pk2 = db
        .insert_tool_run("run-2", "loc", "1.0.0", "1", common::TEST_TIMESTAMP)
        .await
        .unwrap();
    assert_ne!(pk1, pk2);
}

#[tokio::test]
async fn test_delete_tool_run_removes_rows() {
    let db = setup_db().await;

    let pk = db
        .insert_tool_run("run-1", "loc", "1.0.0", "1", common::TEST_TIMESTAMP)
        .await
        .unwrap();
    db.persist_loc(pk, &[loc_row("f1", "a.py", 10)], None)
        .await
        .unwrap();
    assert_eq!(db.count_rows("loc_file_metrics").await.unwrap(), 1);

    db.delete_tool_run(pk).await.unwrap();

    assert_eq!(db.count_rows("loc_file_metrics").await.unwrap(), 0);
    assert_eq!(db.count_rows("tool_runs").await.unwrap(), 0);
    assert!(db.get_tool_run("run-1", "loc").await.unwrap().is_none());
}

#[tokio::test]
async fn test_replace_collection_run_wipes_data() {
    let db = setup_db().await;
    db.insert_collection_run(&sample_run("run-1", "abc123"))
        .await
        .unwrap();
    db.mark_run_status("run-1", RunStatus::Completed, Some(common::TEST_TIMESTAMP))
        .await
        .unwrap();

    let loc_pk = db
        .insert_tool_run("run-1", "loc", "1.0.0", "1", common::TEST_TIMESTAMP)
        .await
        .unwrap();
    db.persist_loc(
        loc_pk,
        &[loc_row("f1", "a.py", 10), loc_row("f2", "b.py", 5)],
        Some(&serde_json::json!({"file_count": 2})),
    )
    .await
    .unwrap();

    db.replace_collection_run("run-1", "2026-01-02T00:00:00Z")
        .await
        .unwrap();

    assert_eq!(db.count_rows("tool_runs").await.unwrap(), 0);
    assert_eq!(db.count_rows("loc_file_metrics").await.unwrap(), 0);
    assert_eq!(db.count_rows("tool_summaries").await.unwrap(), 0);

    // Run row survives with identity intact, reset for re-collection
    let run = db
        .find_collection_run("repo-1", "abc123")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.collection_run_id, "run-1");
    assert_eq!(run.status, RunStatus::Running);
    assert!(run.completed_at.is_none());
    assert_eq!(run.started_at, "2026-01-02T00:00:00Z");
}

#[tokio::test]
async fn test_fetch_metric_rows() {
    let db = setup_db().await;
    let pk = db
        .insert_tool_run("run-1", "loc", "1.0.0", "1", common::TEST_TIMESTAMP)
        .await
        .unwrap();
    db.persist_loc(
        pk,
        &[loc_row("f1", "a.py", 10), loc_row("f2", "b.py", 5)],
        None,
    )
    .await
    .unwrap();

    let rows = db
        .fetch_metric_rows("loc_file_metrics", &["lines_total", "code_lines"], pk)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    let f1 = rows.iter().find(|r| r.file_id == "f1").unwrap();
    assert_eq!(f1.values, vec![10, 10]);

    // Other run_pks are invisible
    let empty = db
        .fetch_metric_rows("loc_file_metrics", &["lines_total"], pk + 1)
        .await
        .unwrap();
    assert!(empty.is_empty());

    let err = db
        .fetch_metric_rows("collection_runs", &["repo_id"], pk)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));
}

#[tokio::test]
async fn test_replace_rollups_is_idempotent() {
    let db = setup_db().await;

    let row = RollupRow {
        run_pk: 1,
        directory_id: "dir:.".to_string(),
        scope: RollupScope::Recursive,
        metric: "lines_total".to_string(),
        file_count: 2,
        nonzero_file_count: 2,
        total: 15,
    };
    db.replace_rollups(1, &[row.clone()]).await.unwrap();
    db.replace_rollups(1, &[row]).await.unwrap();

    let rollups = db.load_rollups(1).await.unwrap();
    assert_eq!(rollups.len(), 1);
    assert_eq!(rollups[0].total, 15);
    assert_eq!(rollups[0].scope, RollupScope::Recursive);
}
