//! Layout index
//!
//! One filesystem traversal of the repository checkout per run, producing
//! the file list and directory tree everything else joins against. The
//! scanner emits the same envelope document external tools emit, so its
//! output flows through the regular adapter pipeline.
//!
//! File classification here is deliberately thin: extension to language
//! mapping, a binary sniff, and a line count for text files.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use walkdir::WalkDir;

use crate::adapter::{Envelope, Metadata};
use crate::error::{Error, Result};

pub const LAYOUT_SCHEMA_VERSION: &str = "1";

/// Files larger than this are never opened for line counting.
const LINE_COUNT_MAX_BYTES: u64 = 4 * 1024 * 1024;

/// Map an extension to a language label. Unknown extensions yield None.
fn language_for_extension(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "rs" => "Rust",
        "py" => "Python",
        "js" | "mjs" | "cjs" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "go" => "Go",
        "java" => "Java",
        "c" | "h" => "C",
        "cpp" | "cc" | "hpp" => "C++",
        "cs" => "C#",
        "rb" => "Ruby",
        "php" => "PHP",
        "sh" => "Shell",
        "md" => "Markdown",
        "json" => "JSON",
        "yaml" | "yml" => "YAML",
        "toml" => "TOML",
        "sql" => "SQL",
        "html" => "HTML",
        "css" => "CSS",
        _ => return None,
    })
}

/// Sniff the first block for NUL bytes.
fn looks_binary(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return true;
    };
    let mut buf = [0u8; 8192];
    match file.read(&mut buf) {
        Ok(n) => buf[..n].contains(&0),
        Err(_) => true,
    }
}

fn count_lines(path: &Path) -> Option<i64> {
    let content = fs::read(path).ok()?;
    if content.is_empty() {
        return Some(0);
    }
    let mut lines = content.iter().filter(|b| **b == b'\n').count() as i64;
    if *content.last()? != b'\n' {
        lines += 1;
    }
    Some(lines)
}

fn dir_id(relative: &str) -> String {
    format!("dir:{}", relative)
}

fn file_id(relative: &str) -> String {
    format!("file:{}", relative)
}

/// Repository traversal producing a layout envelope.
pub struct LayoutScanner {
    repo_path: PathBuf,
}

impl LayoutScanner {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    /// Walk the checkout once and build the layout document.
    pub fn scan(
        &self,
        repo_id: &str,
        run_id: &str,
        branch: &str,
        commit_sha: &str,
    ) -> Result<Envelope> {
        if !self.repo_path.is_dir() {
            return Err(Error::ToolExecution {
                tool: "layout".to_string(),
                reason: format!("repository path {} is not a directory", self.repo_path.display()),
            });
        }

        let mut directories = Vec::new();
        let mut files = Vec::new();
        let mut file_count = 0u64;
        let mut total_size = 0u64;

        let walker = WalkDir::new(&self.repo_path)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");

        for entry in walker {
            let entry = entry.map_err(|e| Error::ToolExecution {
                tool: "layout".to_string(),
                reason: format!("traversal failed: {}", e),
            })?;

            let relative = entry
                .path()
                .strip_prefix(&self.repo_path)
                .unwrap_or(entry.path());
            let relative_str = if relative.as_os_str().is_empty() {
                ".".to_string()
            } else {
                relative.to_string_lossy().replace('\\', "/")
            };

            if entry.file_type().is_dir() {
                let parent_id = if relative_str == "." {
                    None
                } else {
                    Some(dir_id(&parent_path(&relative_str)))
                };
                directories.push(json!({
                    "id": dir_id(&relative_str),
                    "path": relative_str,
                    "parent_id": parent_id,
                    "depth": entry.depth() as i64,
                }));
            } else if entry.file_type().is_file() {
                let meta = entry.metadata().map_err(|e| Error::ToolExecution {
                    tool: "layout".to_string(),
                    reason: format!("stat failed for {}: {}", entry.path().display(), e),
                })?;
                let size = meta.len();
                let name = entry.file_name().to_string_lossy().to_string();
                let extension = name
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_ascii_lowercase())
                    .filter(|ext| !ext.is_empty() && ext.len() <= 10);
                let language = extension.as_deref().and_then(language_for_extension);

                let line_count = if size <= LINE_COUNT_MAX_BYTES && !looks_binary(entry.path()) {
                    count_lines(entry.path())
                } else {
                    None
                };

                file_count += 1;
                total_size += size;

                files.push(json!({
                    "id": file_id(&relative_str),
                    "path": relative_str,
                    "name": name,
                    "extension": extension,
                    "language": language,
                    "size_bytes": size as i64,
                    "line_count": line_count,
                    "directory_id": dir_id(&parent_path(&relative_str)),
                }));
            }
        }

        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| Error::ToolExecution {
                tool: "layout".to_string(),
                reason: format!("timestamp formatting failed: {}", e),
            })?;

        Ok(Envelope {
            metadata: Metadata {
                tool_name: "layout".to_string(),
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
                schema_version: LAYOUT_SCHEMA_VERSION.to_string(),
                repo_id: repo_id.to_string(),
                run_id: run_id.to_string(),
                branch: branch.to_string(),
                commit_sha: commit_sha.to_string(),
                timestamp,
            },
            data: json!({
                "files": files,
                "directories": directories,
            }),
            summary: Some(json!({
                "file_count": file_count,
                "total_size_bytes": total_size,
                "directory_count": directories.len(),
            })),
        })
    }
}

/// Parent of a repo-relative path; "." for top-level entries.
fn parent_path(relative: &str) -> String {
    match relative.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => ".".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("src/main.rs"), "src");
        assert_eq!(parent_path("README.md"), ".");
        assert_eq!(parent_path("a/b/c.txt"), "a/b");
    }

    #[test]
    fn test_language_mapping() {
        assert_eq!(language_for_extension("rs"), Some("Rust"));
        assert_eq!(language_for_extension("py"), Some("Python"));
        assert_eq!(language_for_extension("xyz"), None);
    }

    #[test]
    fn test_scan_builds_tree() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "# hi\n").unwrap();

        let envelope = LayoutScanner::new(dir.path())
            .scan("repo", "run-1", "main", "abc123")
            .unwrap();

        let files = envelope.data["files"].as_array().unwrap();
        let dirs = envelope.data["directories"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(dirs.len(), 2); // root and src

        let main = files
            .iter()
            .find(|f| f["path"] == "src/main.rs")
            .unwrap();
        assert_eq!(main["language"], "Rust");
        assert_eq!(main["line_count"], 1);
        assert_eq!(main["directory_id"], "dir:src");

        let root = dirs.iter().find(|d| d["path"] == ".").unwrap();
        assert!(root["parent_id"].is_null());
        let src = dirs.iter().find(|d| d["path"] == "src").unwrap();
        assert_eq!(src["parent_id"], "dir:.");
    }

    #[test]
    fn test_tree_edges_rebuild_from_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        std::fs::write(dir.path().join("a/b/c/deep.txt"), "x\n").unwrap();

        let envelope = LayoutScanner::new(dir.path())
            .scan("repo", "run-1", "main", "abc123")
            .unwrap();

        // Every non-root directory's parent edge is derivable from its path
        let dirs = envelope.data["directories"].as_array().unwrap();
        for d in dirs {
            let path = d["path"].as_str().unwrap();
            if path == "." {
                assert!(d["parent_id"].is_null());
            } else {
                assert_eq!(
                    d["parent_id"].as_str().unwrap(),
                    dir_id(&parent_path(path))
                );
            }
        }
        // And every file's directory edge likewise
        let files = envelope.data["files"].as_array().unwrap();
        for f in files {
            let path = f["path"].as_str().unwrap();
            assert_eq!(
                f["directory_id"].as_str().unwrap(),
                dir_id(&parent_path(path))
            );
        }
    }

    #[test]
    fn test_scan_skips_git_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::write(dir.path().join("a.py"), "print(1)\n").unwrap();

        let envelope = LayoutScanner::new(dir.path())
            .scan("repo", "run-1", "main", "abc123")
            .unwrap();

        let files = envelope.data["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["path"], "a.py");
    }
}
