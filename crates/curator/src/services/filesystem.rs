use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::error::StorageError;

use super::{Binary, StorageService};

/// Storage service rooted at a directory on the local filesystem.
///
/// Storage paths are `/`-separated and relative to the root. Writes never
/// replace an existing binary.
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a storage path to a location under the root, rejecting
    /// absolute paths and parent-directory components.
    fn resolve(&self, storage_path: &str) -> Result<PathBuf, StorageError> {
        if storage_path.is_empty() {
            return Err(StorageError::InvalidPath {
                path: storage_path.to_string(),
                reason: "path is empty".to_string(),
            });
        }

        let relative = Path::new(storage_path);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(StorageError::InvalidPath {
                        path: storage_path.to_string(),
                        reason: "path must stay inside the storage root".to_string(),
                    })
                }
            }
        }

        Ok(self.root.join(relative))
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

impl StorageService for FilesystemStorage {
    fn get_binary(&self, path: &str) -> Result<Binary, StorageError> {
        let full_path = self.resolve(path)?;
        if !full_path.is_file() {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let content = std::fs::read(&full_path).map_err(|e| StorageError::ReadFile {
            path: full_path.clone(),
            source: e,
        })?;
        Ok(Binary::new(content))
    }

    fn put_binary(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        let full_path = self.resolve(path)?;
        if let Some(parent) = full_path.parent() {
            self.ensure_directory(parent)?;
        }

        // create_new gives an atomic check-and-create (O_CREAT | O_EXCL)
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)
        {
            Ok(mut file) => file
                .write_all(content)
                .map_err(|e| StorageError::WriteFile {
                    path: full_path,
                    source: e,
                }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(path.to_string()))
            }
            Err(e) => Err(StorageError::WriteFile {
                path: full_path,
                source: e,
            }),
        }
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.resolve(path)?.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_and_get_binary() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(temp_dir.path());

        storage
            .put_binary("aip/aip-1/metadata/preservation/event-1.xml", b"<event/>")
            .unwrap();

        let binary = storage
            .get_binary("aip/aip-1/metadata/preservation/event-1.xml")
            .unwrap();
        assert_eq!(binary.content, b"<event/>");
        assert_eq!(binary.size, 8);
        assert!(binary.digests.is_empty());
    }

    #[test]
    fn test_put_binary_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(temp_dir.path());

        storage.put_binary("doc.xml", b"first").unwrap();
        let err = storage.put_binary("doc.xml", b"second").unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));

        let content = std::fs::read(temp_dir.path().join("doc.xml")).unwrap();
        assert_eq!(content, b"first");
    }

    #[test]
    fn test_rejects_paths_outside_root() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(temp_dir.path());

        for path in ["../escape.txt", "/etc/passwd", "a/../../b", ""] {
            assert!(
                matches!(storage.exists(path), Err(StorageError::InvalidPath { .. })),
                "expected {} to be rejected",
                path
            );
        }
    }

    #[test]
    fn test_get_missing_binary() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(temp_dir.path());

        assert!(matches!(
            storage.get_binary("missing.bin"),
            Err(StorageError::NotFound(_))
        ));
        assert!(!storage.exists("missing.bin").unwrap());
    }

    #[test]
    fn test_store_empty_content() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(temp_dir.path());

        storage.put_binary("empty/file.bin", &[]).unwrap();
        assert!(storage.exists("empty/file.bin").unwrap());
        assert_eq!(storage.get_binary("empty/file.bin").unwrap().size, 0);
    }

    #[test]
    fn test_root_accessor() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::new(temp_dir.path());
        assert_eq!(storage.root(), temp_dir.path());
    }
}
