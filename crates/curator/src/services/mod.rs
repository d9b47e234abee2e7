//! Narrow interfaces to the repository's index, model and storage layers.
//!
//! The engine never talks to a concrete backend. Plugins and object sources
//! receive a [`Services`] bundle and go through these traits only.

pub mod filesystem;
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ServiceError, StorageError};
use crate::model::{
    Aip, ArchivalObject, DescriptiveMetadata, File, ObjectKind, PreservationMetadata,
    PreservationMetadataKind, PreservationOwner, Representation,
};

pub use filesystem::FilesystemStorage;
pub use memory::InMemoryRepository;

/// Conjunction of simple `field = value` terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub terms: Vec<(String, String)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.terms.push((field.into(), value.into()));
        self
    }

    pub fn matches(&self, object: &ArchivalObject) -> bool {
        self.terms
            .iter()
            .all(|(field, value)| object.field(field).as_deref() == Some(value.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

/// One page of index hits.
#[derive(Debug, Clone, Default)]
pub struct IndexResult {
    pub ids: Vec<String>,
    pub offset: usize,
    pub total: u64,
}

pub trait IndexService: Send + Sync {
    fn find(
        &self,
        kind: ObjectKind,
        filter: &Filter,
        sort: Option<&Sort>,
        page: Page,
    ) -> Result<IndexResult, ServiceError>;

    fn count(&self, kind: ObjectKind, filter: &Filter) -> Result<u64, ServiceError>;

    fn retrieve(&self, kind: ObjectKind, id: &str) -> Result<ArchivalObject, ServiceError>;
}

type CloseHook = Box<dyn FnOnce() + Send>;

/// Iterator over a model listing that must be closed after use.
///
/// Dropping the listing closes it as well; `close` exists so callers can
/// release the underlying resources before the end of a scope.
pub struct Listing<T> {
    items: std::vec::IntoIter<T>,
    on_close: Option<CloseHook>,
}

impl<T> Listing<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into_iter(),
            on_close: None,
        }
    }

    pub fn with_close_hook(items: Vec<T>, hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            items: items.into_iter(),
            on_close: Some(Box::new(hook)),
        }
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }
}

impl<T> Iterator for Listing<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.items.next()
    }
}

impl<T> Drop for Listing<T> {
    fn drop(&mut self) {
        self.release();
    }
}

pub trait ModelService: Send + Sync {
    fn retrieve_aip(&self, aip_id: &str) -> Result<Aip, ServiceError>;

    fn retrieve_representation(
        &self,
        aip_id: &str,
        representation_id: &str,
    ) -> Result<Representation, ServiceError>;

    fn retrieve_file(
        &self,
        aip_id: &str,
        representation_id: &str,
        path: &[String],
        file_id: &str,
    ) -> Result<File, ServiceError>;

    fn list_descriptive_metadata(
        &self,
        aip_id: &str,
    ) -> Result<Vec<DescriptiveMetadata>, ServiceError>;

    fn list_files(
        &self,
        aip_id: &str,
        representation_id: &str,
    ) -> Result<Listing<File>, ServiceError>;

    /// Preservation metadata attached to one AIP, or every record when
    /// `aip_id` is `None`.
    fn list_preservation_metadata(
        &self,
        aip_id: Option<&str>,
    ) -> Result<Listing<PreservationMetadata>, ServiceError>;

    /// Stores a new preservation metadata binary. Fails with
    /// [`ServiceError::AlreadyExists`] when the same kind and id is already
    /// stored for `owner`.
    fn create_preservation_metadata(
        &self,
        kind: PreservationMetadataKind,
        id: &str,
        owner: &PreservationOwner,
        payload: Vec<u8>,
        notify: bool,
    ) -> Result<PreservationMetadata, ServiceError>;

    fn retrieve_preservation_metadata(
        &self,
        kind: PreservationMetadataKind,
        id: &str,
        owner: &PreservationOwner,
    ) -> Result<PreservationMetadata, ServiceError>;

    fn preservation_metadata_exists(
        &self,
        kind: PreservationMetadataKind,
        id: &str,
        owner: &PreservationOwner,
    ) -> Result<bool, ServiceError>;
}

/// Binary content plus what the storage layer already knows about it.
#[derive(Debug, Clone, Default)]
pub struct Binary {
    pub content: Vec<u8>,
    pub size: u64,
    /// Digests keyed by algorithm name (`SHA-256`), lowercase hex.
    pub digests: HashMap<String, String>,
}

impl Binary {
    pub fn new(content: Vec<u8>) -> Self {
        let size = content.len() as u64;
        Self {
            content,
            size,
            digests: HashMap::new(),
        }
    }
}

pub trait StorageService: Send + Sync {
    fn get_binary(&self, path: &str) -> Result<Binary, StorageError>;

    fn put_binary(&self, path: &str, content: &[u8]) -> Result<(), StorageError>;

    fn exists(&self, path: &str) -> Result<bool, StorageError>;
}

/// The three collaborators handed to object sources and plugins.
#[derive(Clone)]
pub struct Services {
    pub index: Arc<dyn IndexService>,
    pub model: Arc<dyn ModelService>,
    pub storage: Arc<dyn StorageService>,
}

impl Services {
    pub fn new(
        index: Arc<dyn IndexService>,
        model: Arc<dyn ModelService>,
        storage: Arc<dyn StorageService>,
    ) -> Self {
        Self {
            index,
            model,
            storage,
        }
    }

    /// Index, model and storage all served by one in-memory repository.
    pub fn in_memory(repository: Arc<InMemoryRepository>) -> Self {
        Self {
            index: repository.clone(),
            model: repository.clone(),
            storage: repository,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_listing_close_runs_hook_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = closed.clone();
        let listing = Listing::with_close_hook(vec![1, 2, 3], move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let items: Vec<_> = listing.collect();
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let counter = closed.clone();
        let listing = Listing::with_close_hook(vec![1], move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        listing.close();
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_filter_matches_all_terms() {
        let object = ArchivalObject::Aip(Aip {
            id: "aip-1".to_string(),
            producer: Some("alice".to_string()),
            ..Aip::default()
        });
        assert!(Filter::all().matches(&object));
        assert!(Filter::all().with("producer", "alice").matches(&object));
        assert!(!Filter::all()
            .with("producer", "alice")
            .with("id", "aip-2")
            .matches(&object));
    }
}
