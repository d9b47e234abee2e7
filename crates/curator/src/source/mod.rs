//! Object-source adapters.
//!
//! A job names its objects as a filter, an id list, "everything of a kind"
//! or a transfer folder. Resolution fixes the total up front; the objects
//! themselves are pulled lazily, one block at a time, and the stream can be
//! iterated again from the start.

pub mod transfer;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, SourceError};
use crate::model::{ArchivalObject, ObjectKind, TransferredResource};
use crate::plugin::PluginDescriptor;
use crate::services::{Filter, Page, Services, Sort};

pub use transfer::TransferFolder;

/// Description of the objects a job runs over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectSource {
    /// Objects of `kind` whose indexed fields match every term.
    Filter {
        kind: ObjectKind,
        terms: Vec<(String, String)>,
    },
    Ids {
        kind: ObjectKind,
        ids: Vec<String>,
    },
    All {
        kind: ObjectKind,
    },
    /// Every entry of a transfer folder.
    TransferFolder {
        path: PathBuf,
    },
}

impl ObjectSource {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectSource::Filter { kind, .. }
            | ObjectSource::Ids { kind, .. }
            | ObjectSource::All { kind } => *kind,
            ObjectSource::TransferFolder { .. } => ObjectKind::TransferredResource,
        }
    }

    /// Rejects sources whose object kind the plugin does not act on.
    pub fn check_kind(&self, descriptor: &PluginDescriptor) -> Result<(), SourceError> {
        let kind = self.kind();
        if descriptor.accepts(kind) {
            return Ok(());
        }
        Err(SourceError::KindMismatch {
            plugin: descriptor.id.to_string(),
            source_kind: kind,
            expected: descriptor
                .object_kinds
                .iter()
                .map(ObjectKind::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    pub fn resolve(&self, services: &Services) -> Result<ResolvedSource, SourceError> {
        let (kind, origin, total) = match self {
            ObjectSource::Filter { kind, terms } => {
                let filter = Filter {
                    terms: terms.clone(),
                };
                let total = services.index.count(*kind, &filter)?;
                (*kind, Origin::Index(filter), total)
            }
            ObjectSource::All { kind } => {
                let filter = Filter::all();
                let total = services.index.count(*kind, &filter)?;
                (*kind, Origin::Index(filter), total)
            }
            ObjectSource::Ids { kind, ids } => (*kind, Origin::Ids(ids.clone()), ids.len() as u64),
            ObjectSource::TransferFolder { path } => {
                let resources = TransferFolder::new(path).scan()?;
                let total = resources.len() as u64;
                (
                    ObjectKind::TransferredResource,
                    Origin::Resources(resources),
                    total,
                )
            }
        };

        Ok(ResolvedSource {
            kind,
            total,
            origin,
            services: services.clone(),
        })
    }
}

enum Origin {
    Index(Filter),
    Ids(Vec<String>),
    Resources(Vec<TransferredResource>),
}

/// One object position in a block. Ids that no longer resolve stay in the
/// block so they are reported (as failures) in input order.
#[derive(Debug, Clone)]
pub enum BlockEntry {
    Object(ArchivalObject),
    Missing {
        id: String,
        kind: ObjectKind,
        reason: String,
    },
}

impl BlockEntry {
    pub fn id(&self) -> &str {
        match self {
            BlockEntry::Object(object) => object.id(),
            BlockEntry::Missing { id, .. } => id,
        }
    }
}

/// A contiguous slice of the object stream processed by one worker.
#[derive(Debug, Clone)]
pub struct Block {
    /// 1-based position of the block in the stream.
    pub id: u64,
    pub entries: Vec<BlockEntry>,
}

impl Block {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The objects that resolved, in block order.
    pub fn objects(&self) -> Vec<ArchivalObject> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                BlockEntry::Object(object) => Some(object.clone()),
                BlockEntry::Missing { .. } => None,
            })
            .collect()
    }
}

/// A source whose size is known. Iterate it with [`ResolvedSource::blocks`].
pub struct ResolvedSource {
    kind: ObjectKind,
    total: u64,
    origin: Origin,
    services: Services,
}

impl ResolvedSource {
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Starts a new pass over the objects in blocks of `block_size`.
    pub fn blocks(&self, block_size: usize) -> BlockStream<'_> {
        BlockStream {
            source: self,
            block_size: block_size.max(1),
            position: 0,
            next_block_id: 1,
            failed: false,
        }
    }

    fn retrieve(&self, id: &str) -> BlockEntry {
        match self.services.index.retrieve(self.kind, id) {
            Ok(object) => BlockEntry::Object(object),
            Err(e) => BlockEntry::Missing {
                id: id.to_string(),
                kind: self.kind,
                reason: e.to_string(),
            },
        }
    }

    fn page(&self, position: u64, size: usize) -> Result<Vec<BlockEntry>, ServiceError> {
        let start = position as usize;
        match &self.origin {
            Origin::Index(filter) => {
                let page = self.services.index.find(
                    self.kind,
                    filter,
                    Some(&Sort::ascending("id")),
                    Page::new(start, size),
                )?;
                Ok(page.ids.iter().map(|id| self.retrieve(id)).collect())
            }
            Origin::Ids(ids) => Ok(ids
                .iter()
                .skip(start)
                .take(size)
                .map(|id| self.retrieve(id))
                .collect()),
            Origin::Resources(resources) => Ok(resources
                .iter()
                .skip(start)
                .take(size)
                .cloned()
                .map(|resource| BlockEntry::Object(ArchivalObject::TransferredResource(resource)))
                .collect()),
        }
    }
}

/// Lazy iterator over the blocks of a resolved source.
///
/// Never yields more than `total` entries, so job statistics stay
/// consistent even if the index grows during the run.
pub struct BlockStream<'a> {
    source: &'a ResolvedSource,
    block_size: usize,
    position: u64,
    next_block_id: u64,
    failed: bool,
}

impl Iterator for BlockStream<'_> {
    type Item = Result<Block, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.position >= self.source.total {
            return None;
        }

        let remaining = (self.source.total - self.position) as usize;
        let size = self.block_size.min(remaining);
        let entries = match self.source.page(self.position, size) {
            Ok(entries) => entries,
            Err(e) => {
                self.failed = true;
                return Some(Err(e.into()));
            }
        };

        if entries.is_empty() {
            self.failed = true;
            return Some(Err(SourceError::Truncated {
                yielded: self.position,
                expected: self.source.total,
            }));
        }

        self.position += entries.len() as u64;
        let block = Block {
            id: self.next_block_id,
            entries,
        };
        self.next_block_id += 1;
        Some(Ok(block))
    }
}
