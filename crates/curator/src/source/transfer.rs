use std::path::{Path, PathBuf};

use log::{debug, info};
use walkdir::WalkDir;

use crate::error::SourceError;
use crate::model::TransferredResource;

/// Lists the contents of a transfer folder (material not yet ingested).
pub struct TransferFolder {
    root: PathBuf,
}

impl TransferFolder {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks the folder recursively in file-name order. Each entry's id is
    /// its `/`-separated path relative to the root.
    pub fn scan(&self) -> Result<Vec<TransferredResource>, SourceError> {
        if !self.root.is_dir() {
            return Err(SourceError::MissingTransferFolder(self.root.clone()));
        }

        let mut resources = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .follow_links(false)
        {
            let entry = entry.map_err(|e| SourceError::ScanFailed {
                path: self.root.clone(),
                source: e,
            })?;

            let relative = match entry.path().strip_prefix(&self.root) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            let id = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");

            let metadata = entry.metadata().map_err(|e| SourceError::ScanFailed {
                path: entry.path().to_path_buf(),
                source: e,
            })?;

            debug!("Found transferred resource: {}", id);
            resources.push(TransferredResource {
                id,
                name: entry.file_name().to_string_lossy().into_owned(),
                full_path: entry.path().to_path_buf(),
                size: if metadata.is_file() { metadata.len() } else { 0 },
                is_file: metadata.is_file(),
            });
        }

        info!(
            "Scanned {} transferred resources in {} ({})",
            resources.len(),
            crate::sanitize::redact_path(&self.root),
            crate::sanitize::hash_path(&self.root)
        );
        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_lists_nested_entries_in_order() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("sip/data")).unwrap();
        std::fs::write(temp_dir.path().join("sip/data/b.txt"), b"bb").unwrap();
        std::fs::write(temp_dir.path().join("sip/data/a.txt"), b"a").unwrap();
        std::fs::write(temp_dir.path().join("readme.md"), b"hello").unwrap();

        let resources = TransferFolder::new(temp_dir.path()).scan().unwrap();
        let ids: Vec<_> = resources.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["readme.md", "sip", "sip/data", "sip/data/a.txt", "sip/data/b.txt"]
        );

        let readme = &resources[0];
        assert!(readme.is_file);
        assert_eq!(readme.size, 5);
        assert_eq!(readme.name, "readme.md");
        assert!(!resources[1].is_file);
    }

    #[test]
    fn test_missing_folder() {
        let temp_dir = TempDir::new().unwrap();
        let result = TransferFolder::new(temp_dir.path().join("nope")).scan();
        assert!(matches!(result, Err(SourceError::MissingTransferFolder(_))));
    }

    #[test]
    fn test_empty_folder() {
        let temp_dir = TempDir::new().unwrap();
        assert!(TransferFolder::new(temp_dir.path()).scan().unwrap().is_empty());
    }
}
