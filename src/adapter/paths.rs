//! Path normalization rules for the tool output contract.
//!
//! Accepted paths are repository-relative, POSIX-separated, free of ".."
//! and leading "/". Backslashes and leading "./" are normalized away;
//! anything else that violates the contract is rejected.

/// Normalize a file path to repo-relative POSIX form, or None if the path
/// violates the contract.
pub fn normalize_file_path(raw: &str) -> Option<String> {
    let candidate = raw.replace('\\', "/");
    let candidate = candidate.strip_prefix("./").unwrap_or(&candidate);

    if candidate.is_empty() || candidate.starts_with('/') {
        return None;
    }
    // Windows drive prefixes are not repository-relative
    if candidate.len() >= 2 && candidate.as_bytes()[1] == b':' {
        return None;
    }

    let mut parts = Vec::new();
    for segment in candidate.split('/') {
        match segment {
            "" | "." => return None,
            ".." => return None,
            s => parts.push(s),
        }
    }
    Some(parts.join("/"))
}

/// Normalize a directory path. The repository root is represented as ".".
pub fn normalize_dir_path(raw: &str) -> Option<String> {
    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        return Some(".".to_string());
    }
    normalize_file_path(trimmed)
}

/// Whether a path already satisfies the contract.
pub fn is_repo_relative(path: &str) -> bool {
    normalize_file_path(path).as_deref() == Some(path)
}
