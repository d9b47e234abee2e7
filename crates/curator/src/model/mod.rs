//! Archival objects the engine acts on.
//!
//! Every plugin consumes one or more [`ObjectKind`]s. The orchestrator never
//! looks inside an object: it moves [`ArchivalObject`] values from the
//! object source to the plugin worker and reads back only `id()`/`kind()`.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PremisError;

/// Kind of archival object a plugin acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Aip,
    Representation,
    File,
    TransferredResource,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Aip => "aip",
            ObjectKind::Representation => "representation",
            ObjectKind::File => "file",
            ObjectKind::TransferredResource => "transferred_resource",
        }
    }

    pub fn parse(value: &str) -> Result<Self, PremisError> {
        match value {
            "aip" => Ok(ObjectKind::Aip),
            "representation" => Ok(ObjectKind::Representation),
            "file" => Ok(ObjectKind::File),
            "transferred_resource" => Ok(ObjectKind::TransferredResource),
            other => Err(PremisError::InvalidValue {
                field: "object kind",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Archival Information Package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Aip {
    pub id: String,
    pub parent_id: Option<String>,
    /// Username of the producer that submitted the SIP.
    pub producer: Option<String>,
    /// Users allowed to ingest into this package.
    #[serde(default)]
    pub ingest_permissions: Vec<String>,
    #[serde(default)]
    pub representation_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Representation {
    pub id: String,
    pub aip_id: String,
    pub original: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct File {
    pub id: String,
    pub aip_id: String,
    pub representation_id: String,
    /// Directory components between the representation root and the file.
    #[serde(default)]
    pub path: Vec<String>,
    pub is_directory: bool,
}

impl File {
    /// Storage path of the file's content.
    pub fn storage_path(&self) -> String {
        let mut parts = vec![
            "aip".to_string(),
            self.aip_id.clone(),
            "representations".to_string(),
            self.representation_id.clone(),
            "data".to_string(),
        ];
        parts.extend(self.path.iter().cloned());
        parts.push(self.id.clone());
        parts.join("/")
    }
}

/// Entry of a transfer folder listing, not yet ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferredResource {
    /// Relative path inside the transfer folder, used as id.
    pub id: String,
    pub name: String,
    pub full_path: PathBuf,
    pub size: u64,
    pub is_file: bool,
}

impl TransferredResource {
    pub fn storage_path(&self) -> String {
        self.id.clone()
    }
}

/// One object of any kind, as handed to plugin workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArchivalObject {
    Aip(Aip),
    Representation(Representation),
    File(File),
    TransferredResource(TransferredResource),
}

impl ArchivalObject {
    pub fn id(&self) -> &str {
        match self {
            ArchivalObject::Aip(aip) => &aip.id,
            ArchivalObject::Representation(rep) => &rep.id,
            ArchivalObject::File(file) => &file.id,
            ArchivalObject::TransferredResource(res) => &res.id,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            ArchivalObject::Aip(_) => ObjectKind::Aip,
            ArchivalObject::Representation(_) => ObjectKind::Representation,
            ArchivalObject::File(_) => ObjectKind::File,
            ArchivalObject::TransferredResource(_) => ObjectKind::TransferredResource,
        }
    }

    /// Id of the AIP this object belongs to, when it has been ingested.
    pub fn aip_id(&self) -> Option<&str> {
        match self {
            ArchivalObject::Aip(aip) => Some(&aip.id),
            ArchivalObject::Representation(rep) => Some(&rep.aip_id),
            ArchivalObject::File(file) => Some(&file.aip_id),
            ArchivalObject::TransferredResource(_) => None,
        }
    }

    /// Value of an indexed field, used by the in-memory index for filtering
    /// and sorting.
    pub fn field(&self, name: &str) -> Option<String> {
        match (self, name) {
            (_, "id") => Some(self.id().to_string()),
            (ArchivalObject::Aip(aip), "parent_id") => aip.parent_id.clone(),
            (ArchivalObject::Aip(aip), "producer") => aip.producer.clone(),
            (ArchivalObject::Representation(rep), "aip_id") => Some(rep.aip_id.clone()),
            (ArchivalObject::Representation(rep), "original") => Some(rep.original.to_string()),
            (ArchivalObject::File(file), "aip_id") => Some(file.aip_id.clone()),
            (ArchivalObject::File(file), "representation_id") => {
                Some(file.representation_id.clone())
            }
            (ArchivalObject::File(file), "is_directory") => Some(file.is_directory.to_string()),
            (ArchivalObject::TransferredResource(res), "name") => Some(res.name.clone()),
            _ => None,
        }
    }
}

/// Descriptive metadata document attached to an AIP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptiveMetadata {
    pub id: String,
    pub aip_id: String,
    /// Declared metadata type (e.g. `dc`, `ead`), if any.
    pub metadata_type: Option<String>,
}

impl DescriptiveMetadata {
    pub fn storage_path(&self) -> String {
        format!("aip/{}/metadata/descriptive/{}", self.aip_id, self.id)
    }
}

/// Kind of preservation metadata binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreservationMetadataKind {
    Event,
    Agent,
    ObjectFile,
    ObjectRepresentation,
}

impl PreservationMetadataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreservationMetadataKind::Event => "event",
            PreservationMetadataKind::Agent => "agent",
            PreservationMetadataKind::ObjectFile => "object_file",
            PreservationMetadataKind::ObjectRepresentation => "object_representation",
        }
    }
}

impl fmt::Display for PreservationMetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which archival object a preservation metadata binary is stored next to.
/// Agents are repository-wide and carry no owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreservationOwner {
    pub aip_id: Option<String>,
    pub representation_id: Option<String>,
    pub file_path: Vec<String>,
    pub file_id: Option<String>,
}

impl PreservationOwner {
    pub fn repository() -> Self {
        Self::default()
    }

    pub fn of_object(object: &ArchivalObject) -> Self {
        match object {
            ArchivalObject::Aip(aip) => Self {
                aip_id: Some(aip.id.clone()),
                ..Self::default()
            },
            ArchivalObject::Representation(rep) => Self {
                aip_id: Some(rep.aip_id.clone()),
                representation_id: Some(rep.id.clone()),
                ..Self::default()
            },
            ArchivalObject::File(file) => Self {
                aip_id: Some(file.aip_id.clone()),
                representation_id: Some(file.representation_id.clone()),
                file_path: file.path.clone(),
                file_id: Some(file.id.clone()),
            },
            ArchivalObject::TransferredResource(_) => Self::default(),
        }
    }
}

/// A stored preservation metadata binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreservationMetadata {
    pub id: String,
    pub kind: PreservationMetadataKind,
    pub owner: PreservationOwner,
    pub payload: Vec<u8>,
}
