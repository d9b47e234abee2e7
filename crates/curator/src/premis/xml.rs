//! PREMIS v3 XML documents for events, agents and objects.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::error::PremisError;

use super::types::{
    AgentType, EventOutcome, EventType, FileObject, Fixity, LinkingIdentifier, PreservationAgent,
    PreservationEvent, RepresentationObject, ROLE_OUTCOME, ROLE_SOURCE,
};

pub const PREMIS_NAMESPACE: &str = "http://www.loc.gov/premis/v3";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const PREMIS_VERSION: &str = "3.0";
const LOCAL_ID_TYPE: &str = "local";

const RELATIONSHIP_STRUCTURAL: &str = "structural";
const RELATIONSHIP_HAS_PART: &str = "hasPart";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "event")]
struct EventDocument {
    #[serde(rename = "@xmlns", default)]
    xmlns: String,
    #[serde(rename = "@version", default)]
    version: String,
    #[serde(rename = "eventIdentifier")]
    identifier: EventIdentifier,
    #[serde(rename = "eventType")]
    event_type: String,
    #[serde(rename = "eventDateTime")]
    date_time: String,
    #[serde(rename = "eventDetailInformation")]
    detail: EventDetailInformation,
    #[serde(rename = "eventOutcomeInformation")]
    outcome: EventOutcomeInformation,
    #[serde(rename = "linkingAgentIdentifier", default)]
    agents: Vec<LinkingAgentIdentifier>,
    #[serde(rename = "linkingObjectIdentifier", default)]
    objects: Vec<LinkingObjectIdentifier>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EventIdentifier {
    #[serde(rename = "eventIdentifierType")]
    id_type: String,
    #[serde(rename = "eventIdentifierValue")]
    value: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct EventDetailInformation {
    #[serde(rename = "eventDetail", default)]
    detail: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct EventOutcomeInformation {
    #[serde(rename = "eventOutcome")]
    outcome: String,
    #[serde(rename = "eventOutcomeDetail")]
    detail: EventOutcomeDetail,
}

#[derive(Debug, Serialize, Deserialize)]
struct EventOutcomeDetail {
    #[serde(rename = "eventOutcomeDetailNote", default)]
    note: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LinkingAgentIdentifier {
    #[serde(rename = "linkingAgentIdentifierType")]
    id_type: String,
    #[serde(rename = "linkingAgentIdentifierValue")]
    value: String,
    #[serde(rename = "linkingAgentRole", default)]
    roles: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LinkingObjectIdentifier {
    #[serde(rename = "linkingObjectIdentifierType")]
    id_type: String,
    #[serde(rename = "linkingObjectIdentifierValue")]
    value: String,
    #[serde(rename = "linkingObjectRole", default)]
    roles: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "agent")]
struct AgentDocument {
    #[serde(rename = "@xmlns", default)]
    xmlns: String,
    #[serde(rename = "@version", default)]
    version: String,
    #[serde(rename = "agentIdentifier")]
    identifier: AgentIdentifier,
    #[serde(rename = "agentName")]
    name: String,
    #[serde(rename = "agentType")]
    agent_type: String,
    #[serde(rename = "agentVersion", default, skip_serializing_if = "Option::is_none")]
    agent_version: Option<String>,
    #[serde(rename = "agentNote", default, skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AgentIdentifier {
    #[serde(rename = "agentIdentifierType")]
    id_type: String,
    #[serde(rename = "agentIdentifierValue")]
    value: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "object")]
struct FileDocument {
    #[serde(rename = "@xmlns", default)]
    xmlns: String,
    #[serde(rename = "@xmlns:xsi", default)]
    xmlns_xsi: String,
    #[serde(rename = "@xsi:type", default)]
    xsi_type: String,
    #[serde(rename = "objectIdentifier")]
    identifier: ObjectIdentifier,
    #[serde(rename = "objectCharacteristics")]
    characteristics: ObjectCharacteristics,
    #[serde(rename = "originalName", default, skip_serializing_if = "Option::is_none")]
    original_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectIdentifier {
    #[serde(rename = "objectIdentifierType")]
    id_type: String,
    #[serde(rename = "objectIdentifierValue")]
    value: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectCharacteristics {
    #[serde(rename = "compositionLevel")]
    composition_level: u32,
    #[serde(rename = "fixity", default)]
    fixities: Vec<FixityElement>,
    #[serde(rename = "size")]
    size: u64,
    #[serde(rename = "format", default, skip_serializing_if = "Option::is_none")]
    format: Option<FormatElement>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FixityElement {
    #[serde(rename = "messageDigestAlgorithm")]
    algorithm: String,
    #[serde(rename = "messageDigest")]
    digest: String,
    #[serde(rename = "messageDigestOriginator", default)]
    originator: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FormatElement {
    #[serde(rename = "formatDesignation")]
    designation: FormatDesignation,
}

#[derive(Debug, Serialize, Deserialize)]
struct FormatDesignation {
    #[serde(rename = "formatName")]
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "object")]
struct RepresentationDocument {
    #[serde(rename = "@xmlns", default)]
    xmlns: String,
    #[serde(rename = "@xmlns:xsi", default)]
    xmlns_xsi: String,
    #[serde(rename = "@xsi:type", default)]
    xsi_type: String,
    #[serde(rename = "objectIdentifier")]
    identifier: ObjectIdentifier,
    #[serde(rename = "relationship", default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Relationship {
    #[serde(rename = "relationshipType")]
    relationship_type: String,
    #[serde(rename = "relationshipSubType")]
    sub_type: String,
    #[serde(rename = "relatedObjectIdentifier")]
    related: RelatedObjectIdentifier,
}

#[derive(Debug, Serialize, Deserialize)]
struct RelatedObjectIdentifier {
    #[serde(rename = "relatedObjectIdentifierType")]
    id_type: String,
    #[serde(rename = "relatedObjectIdentifierValue")]
    value: String,
}

fn serialize<T: Serialize>(document: &T) -> Result<Vec<u8>, PremisError> {
    quick_xml::se::to_string(document)
        .map(String::into_bytes)
        .map_err(|e| PremisError::Serialize(e.to_string()))
}

fn deserialize<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T, PremisError> {
    let text = std::str::from_utf8(bytes).map_err(|e| PremisError::Parse(e.to_string()))?;
    quick_xml::de::from_str(text).map_err(|e| PremisError::Parse(e.to_string()))
}

pub fn event_to_xml(event: &PreservationEvent) -> Result<Vec<u8>, PremisError> {
    let mut objects = Vec::with_capacity(event.sources.len() + event.outcomes.len());
    for link in event.sources.iter().chain(event.outcomes.iter()) {
        objects.push(LinkingObjectIdentifier {
            id_type: link.id_type.clone(),
            value: link.value.clone(),
            roles: link.roles.clone(),
        });
    }

    let document = EventDocument {
        xmlns: PREMIS_NAMESPACE.to_string(),
        version: PREMIS_VERSION.to_string(),
        identifier: EventIdentifier {
            id_type: LOCAL_ID_TYPE.to_string(),
            value: event.id.clone(),
        },
        event_type: event.event_type.as_str().to_string(),
        date_time: event.date_time.to_rfc3339(),
        detail: EventDetailInformation {
            detail: event.detail.clone(),
        },
        outcome: EventOutcomeInformation {
            outcome: event.outcome.as_str().to_string(),
            detail: EventOutcomeDetail {
                note: event.outcome_detail.clone(),
            },
        },
        agents: event
            .agents
            .iter()
            .map(|link| LinkingAgentIdentifier {
                id_type: link.id_type.clone(),
                value: link.value.clone(),
                roles: link.roles.clone(),
            })
            .collect(),
        objects,
    };
    serialize(&document)
}

/// Parses an event document. Object links are split into sources and
/// outcomes by role; a link carrying both roles appears in both lists.
pub fn event_from_xml(bytes: &[u8]) -> Result<PreservationEvent, PremisError> {
    let document: EventDocument = deserialize(bytes)?;

    let date_time = DateTime::parse_from_rfc3339(&document.date_time)
        .map_err(|e| PremisError::Parse(format!("eventDateTime: {}", e)))?
        .with_timezone(&Utc);

    let mut sources = Vec::new();
    let mut outcomes = Vec::new();
    for object in document.objects {
        let link = LinkingIdentifier {
            id_type: object.id_type,
            value: object.value,
            roles: object.roles,
        };
        if link.has_role(ROLE_OUTCOME) {
            outcomes.push(link.clone());
        }
        if link.has_role(ROLE_SOURCE) {
            sources.push(link);
        }
    }

    Ok(PreservationEvent {
        id: document.identifier.value,
        event_type: EventType::parse(&document.event_type)?,
        date_time,
        detail: document.detail.detail,
        outcome: EventOutcome::parse(&document.outcome.outcome)?,
        outcome_detail: document.outcome.detail.note,
        sources,
        outcomes,
        agents: document
            .agents
            .into_iter()
            .map(|agent| LinkingIdentifier {
                id_type: agent.id_type,
                value: agent.value,
                roles: agent.roles,
            })
            .collect(),
    })
}

pub fn agent_to_xml(agent: &PreservationAgent) -> Result<Vec<u8>, PremisError> {
    serialize(&AgentDocument {
        xmlns: PREMIS_NAMESPACE.to_string(),
        version: PREMIS_VERSION.to_string(),
        identifier: AgentIdentifier {
            id_type: LOCAL_ID_TYPE.to_string(),
            value: agent.id.clone(),
        },
        name: agent.name.clone(),
        agent_type: agent.agent_type.as_str().to_string(),
        agent_version: agent.version.clone(),
        note: agent.note.clone(),
    })
}

pub fn agent_from_xml(bytes: &[u8]) -> Result<PreservationAgent, PremisError> {
    let document: AgentDocument = deserialize(bytes)?;
    Ok(PreservationAgent {
        id: document.identifier.value,
        name: document.name,
        agent_type: AgentType::parse(&document.agent_type)?,
        version: document.agent_version,
        note: document.note,
    })
}

pub fn file_to_xml(file: &FileObject) -> Result<Vec<u8>, PremisError> {
    serialize(&FileDocument {
        xmlns: PREMIS_NAMESPACE.to_string(),
        xmlns_xsi: XSI_NAMESPACE.to_string(),
        xsi_type: "file".to_string(),
        identifier: ObjectIdentifier {
            id_type: LOCAL_ID_TYPE.to_string(),
            value: file.id.clone(),
        },
        characteristics: ObjectCharacteristics {
            composition_level: 0,
            fixities: file
                .fixities
                .iter()
                .map(|fixity| FixityElement {
                    algorithm: fixity.algorithm.clone(),
                    digest: fixity.digest.clone(),
                    originator: fixity.originator.clone(),
                })
                .collect(),
            size: file.size,
            format: file.format.as_ref().map(|name| FormatElement {
                designation: FormatDesignation { name: name.clone() },
            }),
        },
        original_name: file.original_name.clone(),
    })
}

pub fn file_from_xml(bytes: &[u8]) -> Result<FileObject, PremisError> {
    let document: FileDocument = deserialize(bytes)?;
    Ok(FileObject {
        id: document.identifier.value,
        original_name: document.original_name,
        size: document.characteristics.size,
        format: document
            .characteristics
            .format
            .map(|format| format.designation.name),
        fixities: document
            .characteristics
            .fixities
            .into_iter()
            .map(|fixity| Fixity {
                algorithm: fixity.algorithm,
                digest: fixity.digest,
                originator: fixity.originator,
            })
            .collect(),
    })
}

pub fn representation_to_xml(
    representation: &RepresentationObject,
) -> Result<Vec<u8>, PremisError> {
    serialize(&RepresentationDocument {
        xmlns: PREMIS_NAMESPACE.to_string(),
        xmlns_xsi: XSI_NAMESPACE.to_string(),
        xsi_type: "representation".to_string(),
        identifier: ObjectIdentifier {
            id_type: LOCAL_ID_TYPE.to_string(),
            value: representation.id.clone(),
        },
        relationships: representation
            .parts
            .iter()
            .map(|part| Relationship {
                relationship_type: RELATIONSHIP_STRUCTURAL.to_string(),
                sub_type: RELATIONSHIP_HAS_PART.to_string(),
                related: RelatedObjectIdentifier {
                    id_type: part.id_type.clone(),
                    value: part.value.clone(),
                },
            })
            .collect(),
    })
}

pub fn representation_from_xml(bytes: &[u8]) -> Result<RepresentationObject, PremisError> {
    let document: RepresentationDocument = deserialize(bytes)?;
    Ok(RepresentationObject {
        id: document.identifier.value,
        parts: document
            .relationships
            .into_iter()
            .filter(|r| {
                r.relationship_type == RELATIONSHIP_STRUCTURAL && r.sub_type == RELATIONSHIP_HAS_PART
            })
            .map(|r| LinkingIdentifier {
                id_type: r.related.id_type,
                value: r.related.value,
                roles: Vec::new(),
            })
            .collect(),
    })
}

/// Checks that a document is well-formed XML with a single root element.
pub fn check_well_formed(bytes: &[u8]) -> Result<(), PremisError> {
    let xml = std::str::from_utf8(bytes).map_err(|e| PremisError::Parse(e.to_string()))?;
    let mut reader = Reader::from_str(xml);

    let mut depth = 0usize;
    let mut roots = 0usize;
    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => {
                if depth == 0 {
                    roots += 1;
                }
                depth += 1;
            }
            Ok(Event::End(_)) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| PremisError::Parse("unexpected closing tag".to_string()))?;
            }
            Ok(Event::Empty(_)) => {
                if depth == 0 {
                    roots += 1;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(PremisError::Parse(e.to_string())),
            _ => {}
        }
    }

    if depth != 0 {
        return Err(PremisError::Parse("unclosed element at end of document".to_string()));
    }
    match roots {
        1 => Ok(()),
        0 => Err(PremisError::Parse("document has no root element".to_string())),
        _ => Err(PremisError::Parse("document has more than one root element".to_string())),
    }
}
