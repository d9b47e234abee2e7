//! PREMIS provenance model: events, agents, objects and fixity.

pub mod ids;
pub mod recorder;
pub mod types;
pub mod xml;

pub use ids::{plugin_agent_id, user_agent_id};
pub use recorder::ProvenanceRecorder;
pub use types::{
    AgentType, EventOutcome, EventType, FileObject, Fixity, LinkingIdentifier, PreservationAgent,
    PreservationEvent, RepresentationObject, ROLE_EXECUTING_PROGRAM, ROLE_IMPLEMENTER,
    ROLE_OUTCOME, ROLE_SOURCE,
};
pub use xml::{
    agent_from_xml, agent_to_xml, check_well_formed, event_from_xml, event_to_xml, file_from_xml,
    file_to_xml, representation_from_xml, representation_to_xml,
};
