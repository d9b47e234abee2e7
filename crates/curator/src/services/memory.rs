//! In-memory repository implementing the index, model and storage traits.
//!
//! Used by the test suite and by embedders that feed objects in directly
//! (the CLI loads a transfer folder into it).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{ServiceError, StorageError};
use crate::model::{
    Aip, ArchivalObject, DescriptiveMetadata, File, ObjectKind, PreservationMetadata,
    PreservationMetadataKind, PreservationOwner, Representation, TransferredResource,
};

use super::{
    Binary, Filter, IndexResult, IndexService, Listing, ModelService, Page, Sort, SortDirection,
    StorageService,
};

#[derive(Default)]
struct State {
    objects: Vec<ArchivalObject>,
    positions: HashMap<(ObjectKind, String), usize>,
    descriptive: HashMap<String, Vec<DescriptiveMetadata>>,
    preservation: Vec<PreservationMetadata>,
    binaries: HashMap<String, Binary>,
}

#[derive(Default)]
pub struct InMemoryRepository {
    state: RwLock<State>,
    open_listings: Arc<AtomicUsize>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|poisoned| {
            log::warn!("Repository read lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|poisoned| {
            log::warn!("Repository write lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn insert(&self, object: ArchivalObject) {
        let mut state = self.write();
        let key = (object.kind(), object.id().to_string());
        match state.positions.get(&key).copied() {
            Some(position) => state.objects[position] = object,
            None => {
                let position = state.objects.len();
                state.objects.push(object);
                state.positions.insert(key, position);
            }
        }
    }

    pub fn add_aip(&self, aip: Aip) {
        self.insert(ArchivalObject::Aip(aip));
    }

    pub fn add_representation(&self, representation: Representation) {
        self.insert(ArchivalObject::Representation(representation));
    }

    /// Adds a file and stores its content at the file's storage path.
    pub fn add_file(&self, file: File, content: &[u8]) {
        self.write()
            .binaries
            .insert(file.storage_path(), Binary::new(content.to_vec()));
        self.insert(ArchivalObject::File(file));
    }

    pub fn add_transferred_resource(&self, resource: TransferredResource) {
        self.insert(ArchivalObject::TransferredResource(resource));
    }

    /// Attaches a descriptive metadata document and stores its content.
    pub fn add_descriptive_metadata(&self, metadata: DescriptiveMetadata, content: &[u8]) {
        let mut state = self.write();
        state
            .binaries
            .insert(metadata.storage_path(), Binary::new(content.to_vec()));
        state
            .descriptive
            .entry(metadata.aip_id.clone())
            .or_default()
            .push(metadata);
    }

    /// Records a digest the storage layer already knows for `path`.
    pub fn set_known_digest(&self, path: &str, algorithm: &str, digest: &str) {
        if let Some(binary) = self.write().binaries.get_mut(path) {
            binary
                .digests
                .insert(algorithm.to_string(), digest.to_string());
        }
    }

    /// Every stored preservation metadata record of one kind, in creation
    /// order.
    pub fn preservation_metadata(&self, kind: PreservationMetadataKind) -> Vec<PreservationMetadata> {
        self.read()
            .preservation
            .iter()
            .filter(|pm| pm.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of listings handed out and not yet closed.
    pub fn open_listings(&self) -> usize {
        self.open_listings.load(AtomicOrdering::SeqCst)
    }

    fn listing<T>(&self, items: Vec<T>) -> Listing<T> {
        let open = self.open_listings.clone();
        open.fetch_add(1, AtomicOrdering::SeqCst);
        Listing::with_close_hook(items, move || {
            open.fetch_sub(1, AtomicOrdering::SeqCst);
        })
    }

    fn object(&self, kind: ObjectKind, id: &str) -> Option<ArchivalObject> {
        let state = self.read();
        state
            .positions
            .get(&(kind, id.to_string()))
            .map(|position| state.objects[*position].clone())
    }
}

fn not_found(kind: &str, id: &str) -> ServiceError {
    ServiceError::NotFound {
        kind: kind.to_string(),
        id: id.to_string(),
    }
}

impl IndexService for InMemoryRepository {
    fn find(
        &self,
        kind: ObjectKind,
        filter: &Filter,
        sort: Option<&Sort>,
        page: Page,
    ) -> Result<IndexResult, ServiceError> {
        let state = self.read();
        let mut hits: Vec<&ArchivalObject> = state
            .objects
            .iter()
            .filter(|object| object.kind() == kind && filter.matches(object))
            .collect();

        if let Some(sort) = sort {
            hits.sort_by(|a, b| {
                let ordering = a.field(&sort.field).cmp(&b.field(&sort.field));
                match sort.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }

        let total = hits.len() as u64;
        let ids = hits
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .map(|object| object.id().to_string())
            .collect();

        Ok(IndexResult {
            ids,
            offset: page.offset,
            total,
        })
    }

    fn count(&self, kind: ObjectKind, filter: &Filter) -> Result<u64, ServiceError> {
        let state = self.read();
        Ok(state
            .objects
            .iter()
            .filter(|object| object.kind() == kind && filter.matches(object))
            .count() as u64)
    }

    fn retrieve(&self, kind: ObjectKind, id: &str) -> Result<ArchivalObject, ServiceError> {
        self.object(kind, id)
            .ok_or_else(|| not_found(kind.as_str(), id))
    }
}

impl ModelService for InMemoryRepository {
    fn retrieve_aip(&self, aip_id: &str) -> Result<Aip, ServiceError> {
        match self.object(ObjectKind::Aip, aip_id) {
            Some(ArchivalObject::Aip(aip)) => Ok(aip),
            _ => Err(not_found("aip", aip_id)),
        }
    }

    fn retrieve_representation(
        &self,
        aip_id: &str,
        representation_id: &str,
    ) -> Result<Representation, ServiceError> {
        match self.object(ObjectKind::Representation, representation_id) {
            Some(ArchivalObject::Representation(rep)) if rep.aip_id == aip_id => Ok(rep),
            _ => Err(not_found("representation", representation_id)),
        }
    }

    fn retrieve_file(
        &self,
        aip_id: &str,
        representation_id: &str,
        path: &[String],
        file_id: &str,
    ) -> Result<File, ServiceError> {
        match self.object(ObjectKind::File, file_id) {
            Some(ArchivalObject::File(file))
                if file.aip_id == aip_id
                    && file.representation_id == representation_id
                    && file.path == path =>
            {
                Ok(file)
            }
            _ => Err(not_found("file", file_id)),
        }
    }

    fn list_descriptive_metadata(
        &self,
        aip_id: &str,
    ) -> Result<Vec<DescriptiveMetadata>, ServiceError> {
        self.retrieve_aip(aip_id)?;
        Ok(self
            .read()
            .descriptive
            .get(aip_id)
            .cloned()
            .unwrap_or_default())
    }

    fn list_files(
        &self,
        aip_id: &str,
        representation_id: &str,
    ) -> Result<Listing<File>, ServiceError> {
        self.retrieve_representation(aip_id, representation_id)?;
        let files = self
            .read()
            .objects
            .iter()
            .filter_map(|object| match object {
                ArchivalObject::File(file)
                    if file.aip_id == aip_id && file.representation_id == representation_id =>
                {
                    Some(file.clone())
                }
                _ => None,
            })
            .collect();
        Ok(self.listing(files))
    }

    fn list_preservation_metadata(
        &self,
        aip_id: Option<&str>,
    ) -> Result<Listing<PreservationMetadata>, ServiceError> {
        let records = self
            .read()
            .preservation
            .iter()
            .filter(|pm| aip_id.is_none() || pm.owner.aip_id.as_deref() == aip_id)
            .cloned()
            .collect();
        Ok(self.listing(records))
    }

    fn create_preservation_metadata(
        &self,
        kind: PreservationMetadataKind,
        id: &str,
        owner: &PreservationOwner,
        payload: Vec<u8>,
        notify: bool,
    ) -> Result<PreservationMetadata, ServiceError> {
        let mut state = self.write();
        let exists = state
            .preservation
            .iter()
            .any(|pm| pm.kind == kind && pm.id == id && &pm.owner == owner);
        if exists {
            return Err(ServiceError::AlreadyExists {
                kind: kind.to_string(),
                id: id.to_string(),
            });
        }

        let record = PreservationMetadata {
            id: id.to_string(),
            kind,
            owner: owner.clone(),
            payload,
        };
        state.preservation.push(record.clone());

        if notify {
            log::debug!("Preservation metadata created: {} {}", kind, id);
        }
        Ok(record)
    }

    fn retrieve_preservation_metadata(
        &self,
        kind: PreservationMetadataKind,
        id: &str,
        owner: &PreservationOwner,
    ) -> Result<PreservationMetadata, ServiceError> {
        self.read()
            .preservation
            .iter()
            .find(|pm| pm.kind == kind && pm.id == id && &pm.owner == owner)
            .cloned()
            .ok_or_else(|| not_found(kind.as_str(), id))
    }

    fn preservation_metadata_exists(
        &self,
        kind: PreservationMetadataKind,
        id: &str,
        owner: &PreservationOwner,
    ) -> Result<bool, ServiceError> {
        Ok(self
            .read()
            .preservation
            .iter()
            .any(|pm| pm.kind == kind && pm.id == id && &pm.owner == owner))
    }
}

impl StorageService for InMemoryRepository {
    fn get_binary(&self, path: &str) -> Result<Binary, StorageError> {
        self.read()
            .binaries
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn put_binary(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        let mut state = self.write();
        if state.binaries.contains_key(path) {
            return Err(StorageError::AlreadyExists(path.to_string()));
        }
        state
            .binaries
            .insert(path.to_string(), Binary::new(content.to_vec()));
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.read().binaries.contains_key(path))
    }
}
