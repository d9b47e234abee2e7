//! Service wrappers that misbehave in controlled ways.

#![allow(dead_code)]

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use curator::model::{
    Aip, ArchivalObject, DescriptiveMetadata, File, ObjectKind, PreservationMetadata,
    PreservationMetadataKind, PreservationOwner, Representation,
};
use curator::services::{Filter, IndexResult, IndexService, Listing, ModelService, Page, Sort};
use curator::{InMemoryRepository, ServiceError, StorageError};

/// Model service whose event writes fail for one AIP.
pub struct FailingEventWrites {
    inner: Arc<InMemoryRepository>,
    aip_id: String,
}

impl FailingEventWrites {
    pub fn new(inner: Arc<InMemoryRepository>, aip_id: &str) -> Self {
        Self {
            inner,
            aip_id: aip_id.to_string(),
        }
    }
}

impl ModelService for FailingEventWrites {
    fn retrieve_aip(&self, aip_id: &str) -> Result<Aip, ServiceError> {
        self.inner.retrieve_aip(aip_id)
    }

    fn retrieve_representation(
        &self,
        aip_id: &str,
        representation_id: &str,
    ) -> Result<Representation, ServiceError> {
        self.inner.retrieve_representation(aip_id, representation_id)
    }

    fn retrieve_file(
        &self,
        aip_id: &str,
        representation_id: &str,
        path: &[String],
        file_id: &str,
    ) -> Result<File, ServiceError> {
        self.inner
            .retrieve_file(aip_id, representation_id, path, file_id)
    }

    fn list_descriptive_metadata(
        &self,
        aip_id: &str,
    ) -> Result<Vec<DescriptiveMetadata>, ServiceError> {
        self.inner.list_descriptive_metadata(aip_id)
    }

    fn list_files(
        &self,
        aip_id: &str,
        representation_id: &str,
    ) -> Result<Listing<File>, ServiceError> {
        self.inner.list_files(aip_id, representation_id)
    }

    fn list_preservation_metadata(
        &self,
        aip_id: Option<&str>,
    ) -> Result<Listing<PreservationMetadata>, ServiceError> {
        self.inner.list_preservation_metadata(aip_id)
    }

    fn create_preservation_metadata(
        &self,
        kind: PreservationMetadataKind,
        id: &str,
        owner: &PreservationOwner,
        payload: Vec<u8>,
        notify: bool,
    ) -> Result<PreservationMetadata, ServiceError> {
        if kind == PreservationMetadataKind::Event
            && owner.aip_id.as_deref() == Some(self.aip_id.as_str())
        {
            return Err(ServiceError::Storage(StorageError::WriteFile {
                path: PathBuf::from(id),
                source: io::Error::new(io::ErrorKind::Other, "transient write failure"),
            }));
        }
        self.inner
            .create_preservation_metadata(kind, id, owner, payload, notify)
    }

    fn retrieve_preservation_metadata(
        &self,
        kind: PreservationMetadataKind,
        id: &str,
        owner: &PreservationOwner,
    ) -> Result<PreservationMetadata, ServiceError> {
        self.inner.retrieve_preservation_metadata(kind, id, owner)
    }

    fn preservation_metadata_exists(
        &self,
        kind: PreservationMetadataKind,
        id: &str,
        owner: &PreservationOwner,
    ) -> Result<bool, ServiceError> {
        self.inner.preservation_metadata_exists(kind, id, owner)
    }
}

/// Index that counts more objects than its pages return, like an index
/// losing documents between the count and the listing.
pub struct ShrinkingIndex {
    inner: Arc<InMemoryRepository>,
    extra: u64,
}

impl ShrinkingIndex {
    pub fn new(inner: Arc<InMemoryRepository>, extra: u64) -> Self {
        Self { inner, extra }
    }
}

impl IndexService for ShrinkingIndex {
    fn find(
        &self,
        kind: ObjectKind,
        filter: &Filter,
        sort: Option<&Sort>,
        page: Page,
    ) -> Result<IndexResult, ServiceError> {
        self.inner.find(kind, filter, sort, page)
    }

    fn count(&self, kind: ObjectKind, filter: &Filter) -> Result<u64, ServiceError> {
        Ok(self.inner.count(kind, filter)? + self.extra)
    }

    fn retrieve(&self, kind: ObjectKind, id: &str) -> Result<ArchivalObject, ServiceError> {
        self.inner.retrieve(kind, id)
    }
}
