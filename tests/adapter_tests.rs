// Adapter protocol tests: validation fails closed, record mapping joins
// through the layout lookup, persist is variant-exact.

mod common;

use repolens::adapter::{
    ComplexityAdapter, FindingsAdapter, LayoutAdapter, LayoutLookup, LocAdapter, ToolAdapter,
    ToolRecords,
};
use repolens::error::Error;
use repolens::store::LayoutFileRow;
use serde_json::json;

fn layout_file(file_id: &str, path: &str) -> LayoutFileRow {
    LayoutFileRow {
        file_id: file_id.to_string(),
        relative_path: path.to_string(),
        directory_id: "dir:.".to_string(),
        filename: path.rsplit('/').next().unwrap().to_string(),
        extension: Some("py".to_string()),
        language: Some("Python".to_string()),
        size_bytes: 100,
        line_count: Some(10),
    }
}

fn fixture_lookup() -> LayoutLookup {
    LayoutLookup::new(&[
        layout_file("file:a.py", "a.py"),
        layout_file("file:sub/b.py", "sub/b.py"),
    ])
}

fn loc_data() -> serde_json::Value {
    json!({
        "files": [
            {"path": "a.py", "lines_total": 10, "code_lines": 8, "comment_lines": 1, "blank_lines": 1, "size_bytes": 100}
        ]
    })
}

#[test]
fn test_loc_validate_accepts_wellformed() {
    let envelope = common::envelope("loc", "run-1", loc_data(), None);
    LocAdapter.validate(&envelope).unwrap();
}

#[test]
fn test_loc_validate_rejects_negative_counts() {
    let data = json!({
        "files": [
            {"path": "a.py", "lines_total": -1, "code_lines": 0, "comment_lines": 0, "blank_lines": 0}
        ]
    });
    let envelope = common::envelope("loc", "run-1", data, None);
    let err = LocAdapter.validate(&envelope).unwrap_err();
    match err {
        Error::AdapterValidation { tool, errors } => {
            assert_eq!(tool, "loc");
            assert!(errors.iter().any(|e| e.contains("lines_total")));
        }
        other => panic!("expected AdapterValidation, got {other}"),
    }
}

#[test]
fn test_loc_validate_rejects_duplicate_paths() {
    // The same file twice would collide on the store's natural key
    let data = json!({
        "files": [
            {"path": "a.py", "lines_total": 10, "code_lines": 8, "comment_lines": 1, "blank_lines": 1},
            {"path": "./a.py", "lines_total": 3, "code_lines": 3, "comment_lines": 0, "blank_lines": 0}
        ]
    });
    let envelope = common::envelope("loc", "run-1", data, None);
    let err = LocAdapter.validate(&envelope).unwrap_err();
    match err {
        Error::AdapterValidation { errors, .. } => {
            assert!(errors.iter().any(|e| e.contains("duplicated")));
        }
        other => panic!("expected AdapterValidation, got {other}"),
    }
}

#[test]
fn test_loc_validate_rejects_absolute_path() {
    let data = json!({
        "files": [
            {"path": "/etc/passwd", "lines_total": 1, "code_lines": 1, "comment_lines": 0, "blank_lines": 0}
        ]
    });
    let envelope = common::envelope("loc", "run-1", data, None);
    assert!(LocAdapter.validate(&envelope).is_err());
}

#[test]
fn test_loc_validate_rejects_wrong_tool_name() {
    let envelope = common::envelope("complexity", "run-1", loc_data(), None);
    let err = LocAdapter.validate(&envelope).unwrap_err();
    match err {
        Error::AdapterValidation { errors, .. } => {
            assert!(errors.iter().any(|e| e.contains("tool_name")));
        }
        other => panic!("expected AdapterValidation, got {other}"),
    }
}

#[test]
fn test_loc_validate_rejects_bad_timestamp() {
    let mut envelope = common::envelope("loc", "run-1", loc_data(), None);
    envelope.metadata.timestamp = "yesterday".to_string();
    assert!(LocAdapter.validate(&envelope).is_err());
}

#[test]
fn test_loc_to_records_joins_layout() {
    let data = json!({
        "files": [
            {"path": "./a.py", "lines_total": 10, "code_lines": 8, "comment_lines": 1, "blank_lines": 1, "size_bytes": 100},
            {"path": "ghost.py", "lines_total": 3, "code_lines": 3, "comment_lines": 0, "blank_lines": 0, "size_bytes": 30}
        ]
    });
    let envelope = common::envelope("loc", "run-1", data, None);
    let batch = LocAdapter
        .to_records(&envelope, 7, &fixture_lookup())
        .unwrap();

    assert_eq!(batch.run_pk, 7);
    let ToolRecords::Loc { rows, .. } = batch.records else {
        panic!("expected loc records");
    };
    // ghost.py is absent from the layout and gets dropped
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].file_id, "file:a.py");
    assert_eq!(rows[0].relative_path, "a.py");
}

#[test]
fn test_findings_synthesizes_missing_id() {
    let data = json!({
        "findings": [
            {"path": "a.py", "rule_id": "R1", "severity": "high", "message": "m", "line_start": 3},
            {"id": "given", "path": "sub/b.py", "rule_id": "R2", "severity": "low", "message": "m"}
        ]
    });
    let envelope = common::envelope("findings", "run-1", data, None);
    FindingsAdapter.validate(&envelope).unwrap();

    let batch = FindingsAdapter
        .to_records(&envelope, 1, &fixture_lookup())
        .unwrap();
    let ToolRecords::Findings { rows, .. } = batch.records else {
        panic!("expected findings records");
    };
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].finding_id, "R1:a.py:3:0");
    assert_eq!(rows[1].finding_id, "given");
}

#[test]
fn test_findings_rejects_unknown_severity() {
    let data = json!({
        "findings": [
            {"path": "a.py", "rule_id": "R1", "severity": "catastrophic", "message": "m"}
        ]
    });
    let envelope = common::envelope("findings", "run-1", data, None);
    assert!(FindingsAdapter.validate(&envelope).is_err());
}

#[test]
fn test_findings_rejects_duplicate_ids() {
    let data = json!({
        "findings": [
            {"id": "F-1", "path": "a.py", "rule_id": "R1", "severity": "high", "message": "m"},
            {"id": "F-1", "path": "sub/b.py", "rule_id": "R2", "severity": "low", "message": "m"}
        ]
    });
    let envelope = common::envelope("findings", "run-1", data, None);
    assert!(FindingsAdapter.validate(&envelope).is_err());
}

#[test]
fn test_findings_rejects_inverted_line_range() {
    let data = json!({
        "findings": [
            {"path": "a.py", "rule_id": "R1", "severity": "high", "message": "m", "line_start": 9, "line_end": 3}
        ]
    });
    let envelope = common::envelope("findings", "run-1", data, None);
    assert!(FindingsAdapter.validate(&envelope).is_err());
}

#[test]
fn test_complexity_to_records_emits_function_rows() {
    let data = json!({
        "files": [
            {
                "path": "a.py",
                "nloc": 20, "function_count": 2, "total_ccn": 7, "max_ccn": 5,
                "functions": [
                    {"name": "f", "ccn": 5, "nloc": 12, "line_start": 1, "line_end": 12},
                    {"name": "g", "ccn": 2, "nloc": 6, "line_start": 14, "line_end": 19}
                ]
            }
        ]
    });
    let envelope = common::envelope("complexity", "run-1", data, None);
    ComplexityAdapter.validate(&envelope).unwrap();

    let batch = ComplexityAdapter
        .to_records(&envelope, 2, &fixture_lookup())
        .unwrap();
    let ToolRecords::Complexity { files, functions, .. } = batch.records else {
        panic!("expected complexity records");
    };
    assert_eq!(files.len(), 1);
    assert_eq!(functions.len(), 2);
    assert!(functions.iter().all(|f| f.file_id == "file:a.py"));
}

#[test]
fn test_complexity_rejects_duplicate_function_key() {
    // Two functions with the same (name, line_start) in one file
    let data = json!({
        "files": [
            {
                "path": "a.py",
                "nloc": 20, "function_count": 2, "total_ccn": 7, "max_ccn": 5,
                "functions": [
                    {"name": "f", "ccn": 5, "nloc": 12, "line_start": 1, "line_end": 12},
                    {"name": "f", "ccn": 2, "nloc": 6, "line_start": 1, "line_end": 7}
                ]
            }
        ]
    });
    let envelope = common::envelope("complexity", "run-1", data, None);
    assert!(ComplexityAdapter.validate(&envelope).is_err());
}

#[test]
fn test_layout_validate_rejects_duplicate_file_ids() {
    let file = |id: &str, path: &str| {
        json!({"id": id, "path": path, "name": path, "extension": "py",
               "language": "Python", "size_bytes": 10, "line_count": 1, "directory_id": "dir:."})
    };
    let data = json!({
        "files": [file("file:a.py", "a.py"), file("file:a.py", "c.py")],
        "directories": [
            {"id": "dir:.", "path": ".", "parent_id": null, "depth": 0}
        ]
    });
    let envelope = common::envelope("layout", "run-1", data, None);
    assert!(LayoutAdapter.validate(&envelope).is_err());
}

#[test]
fn test_layout_validate_rejects_multiple_roots() {
    let data = json!({
        "files": [],
        "directories": [
            {"id": "dir:.", "path": ".", "parent_id": null, "depth": 0},
            {"id": "dir:other", "path": "other", "parent_id": null, "depth": 0}
        ]
    });
    let envelope = common::envelope("layout", "run-1", data, None);
    assert!(LayoutAdapter.validate(&envelope).is_err());
}

#[test]
fn test_layout_validate_rejects_unknown_directory_ref() {
    let data = json!({
        "files": [
            {"id": "file:a.py", "path": "a.py", "name": "a.py", "extension": "py",
             "language": "Python", "size_bytes": 10, "line_count": 1, "directory_id": "dir:nowhere"}
        ],
        "directories": [
            {"id": "dir:.", "path": ".", "parent_id": null, "depth": 0}
        ]
    });
    let envelope = common::envelope("layout", "run-1", data, None);
    assert!(LayoutAdapter.validate(&envelope).is_err());
}

#[tokio::test]
async fn test_persist_rejects_foreign_records() {
    let db = common::setup_db().await;
    let envelope = common::envelope("loc", "run-1", loc_data(), None);
    let batch = LocAdapter
        .to_records(&envelope, 1, &fixture_lookup())
        .unwrap();

    let err = LayoutAdapter.persist(&db, batch).await.unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));
}

#[tokio::test]
async fn test_persist_is_all_or_nothing() {
    let db = common::setup_db().await;
    let envelope = common::envelope("loc", "run-1", loc_data(), None);
    let batch = LocAdapter
        .to_records(&envelope, 1, &fixture_lookup())
        .unwrap();
    LocAdapter.persist(&db, batch).await.unwrap();

    assert_eq!(db.count_rows("loc_file_metrics").await.unwrap(), 1);
}
