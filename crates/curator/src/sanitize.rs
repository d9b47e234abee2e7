//! Keeps filesystem and storage locations out of log lines and span fields.
//!
//! Transfer folders and storage paths can reveal producer names or
//! donor information, so traces only carry the last path segment or a
//! short hash.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Last component of a filesystem path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Last segment of a `/`-separated storage path.
pub fn redact_storage_path(storage_path: &str) -> &str {
    storage_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("<unknown>")
}

/// Short stable hash of a path, for correlating log lines about the same
/// location.
pub fn hash_path(path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
