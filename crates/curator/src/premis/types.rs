use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::PremisError;
use crate::model::ObjectKind;

pub const ROLE_SOURCE: &str = "source";
pub const ROLE_OUTCOME: &str = "outcome";
pub const ROLE_EXECUTING_PROGRAM: &str = "executing program";
pub const ROLE_IMPLEMENTER: &str = "implementer";

/// Identifier type used for agent links.
pub const AGENT_LINK_TYPE: &str = "local";

macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident, $field:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(value: &str) -> Result<Self, PremisError> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(PremisError::InvalidValue {
                        field: $field,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

vocabulary!(
    /// Preservation event type vocabulary.
    EventType, "event type" {
        Capture => "capture",
        Compression => "compression",
        Creation => "creation",
        Deaccession => "deaccession",
        Decompression => "decompression",
        Decryption => "decryption",
        Deletion => "deletion",
        DigitalSignatureValidation => "digital signature validation",
        FixityCheck => "fixity check",
        Ingestion => "ingestion",
        MessageDigestCalculation => "message digest calculation",
        Migration => "migration",
        Normalization => "normalization",
        Replication => "replication",
        Validation => "validation",
        VirusCheck => "virus check",
        FormatIdentification => "format identification",
        WellformednessCheck => "wellformedness check",
        AuthorizationCheck => "authorization check",
    }
);

vocabulary!(
    EventOutcome, "event outcome" {
        Success => "success",
        Failure => "failure",
        PartialSuccess => "partial success",
    }
);

vocabulary!(
    AgentType, "agent type" {
        Software => "software",
        Person => "person",
        Organization => "organization",
    }
);

/// Back-reference from an event or object to another entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkingIdentifier {
    pub id_type: String,
    pub value: String,
    pub roles: Vec<String>,
}

impl LinkingIdentifier {
    pub fn object(kind: ObjectKind, id: &str, role: &str) -> Self {
        Self {
            id_type: kind.as_str().to_string(),
            value: id.to_string(),
            roles: vec![role.to_string()],
        }
    }

    pub fn agent(agent_id: &str, role: &str) -> Self {
        Self {
            id_type: AGENT_LINK_TYPE.to_string(),
            value: agent_id.to_string(),
            roles: vec![role.to_string()],
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixity {
    pub algorithm: String,
    pub digest: String,
    pub originator: String,
}

/// An action performed on one or more objects. Never mutated once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PreservationEvent {
    pub id: String,
    pub event_type: EventType,
    pub date_time: DateTime<Utc>,
    pub detail: String,
    pub outcome: EventOutcome,
    pub outcome_detail: String,
    pub sources: Vec<LinkingIdentifier>,
    pub outcomes: Vec<LinkingIdentifier>,
    pub agents: Vec<LinkingIdentifier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreservationAgent {
    pub id: String,
    pub name: String,
    pub agent_type: AgentType,
    pub version: Option<String>,
    pub note: Option<String>,
}

/// PREMIS object describing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileObject {
    pub id: String,
    pub original_name: Option<String>,
    pub size: u64,
    pub format: Option<String>,
    pub fixities: Vec<Fixity>,
}

/// PREMIS object describing a representation and the files it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepresentationObject {
    pub id: String,
    /// Files linked through `structural/hasPart` relationships.
    pub parts: Vec<LinkingIdentifier>,
}
