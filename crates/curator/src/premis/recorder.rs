use std::sync::Arc;

use chrono::Utc;

use crate::error::{PluginError, ServiceError};
use crate::fixity::{self, DigestAlgorithm};
use crate::model::{ArchivalObject, PreservationMetadataKind, PreservationOwner};
use crate::plugin::PluginDescriptor;
use crate::report::PluginState;
use crate::services::{Binary, ModelService, StorageService};

use super::ids::{new_event_id, plugin_agent_id, user_agent_id};
use super::types::{
    AgentType, EventOutcome, Fixity, LinkingIdentifier, PreservationAgent, PreservationEvent,
    ROLE_EXECUTING_PROGRAM, ROLE_IMPLEMENTER, ROLE_OUTCOME, ROLE_SOURCE,
};
use super::xml::{agent_to_xml, event_to_xml};

/// Writes provenance for one plugin acting on behalf of one job owner.
///
/// Agents are created lazily and at most once per id; events are always
/// appended.
pub struct ProvenanceRecorder {
    descriptor: PluginDescriptor,
    owner: Option<String>,
    model: Arc<dyn ModelService>,
}

impl ProvenanceRecorder {
    pub fn new(
        descriptor: PluginDescriptor,
        owner: Option<&str>,
        model: Arc<dyn ModelService>,
    ) -> Self {
        Self {
            descriptor,
            owner: owner.map(str::to_string),
            model,
        }
    }

    pub fn plugin_agent_id(&self) -> String {
        plugin_agent_id(self.descriptor.id, self.descriptor.version)
    }

    pub fn ensure_plugin_agent(&self) -> Result<String, ServiceError> {
        let agent = PreservationAgent {
            id: self.plugin_agent_id(),
            name: self.descriptor.name.to_string(),
            agent_type: self.descriptor.agent_type,
            version: Some(self.descriptor.version.to_string()),
            note: Some(self.descriptor.description.to_string()),
        };
        self.ensure_agent(agent)
    }

    pub fn ensure_user_agent(&self, username: &str) -> Result<String, ServiceError> {
        let agent = PreservationAgent {
            id: user_agent_id(username),
            name: username.to_string(),
            agent_type: AgentType::Person,
            version: None,
            note: None,
        };
        self.ensure_agent(agent)
    }

    fn ensure_agent(&self, agent: PreservationAgent) -> Result<String, ServiceError> {
        let owner = PreservationOwner::repository();
        if self
            .model
            .preservation_metadata_exists(PreservationMetadataKind::Agent, &agent.id, &owner)?
        {
            return Ok(agent.id);
        }

        let payload = agent_to_xml(&agent).map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;
        match self.model.create_preservation_metadata(
            PreservationMetadataKind::Agent,
            &agent.id,
            &owner,
            payload,
            true,
        ) {
            Ok(_) => {
                log::debug!("Created preservation agent {}", agent.id);
                Ok(agent.id)
            }
            // Another worker created it between the check and the write
            Err(ServiceError::AlreadyExists { .. }) => Ok(agent.id),
            Err(e) => Err(e),
        }
    }

    /// Records an event with `object` as its source.
    pub fn record_event(
        &self,
        object: &ArchivalObject,
        state: PluginState,
        details: &str,
    ) -> Result<PreservationEvent, PluginError> {
        self.record_event_with_outcomes(object, Vec::new(), state, details)
    }

    /// Records an event with `object` as its source and the given outcome
    /// links (objects the action created or changed).
    pub fn record_event_with_outcomes(
        &self,
        object: &ArchivalObject,
        outcomes: Vec<LinkingIdentifier>,
        state: PluginState,
        details: &str,
    ) -> Result<PreservationEvent, PluginError> {
        let mut agents = vec![LinkingIdentifier::agent(
            &self.ensure_plugin_agent()?,
            ROLE_EXECUTING_PROGRAM,
        )];
        if let Some(owner) = &self.owner {
            agents.push(LinkingIdentifier::agent(
                &self.ensure_user_agent(owner)?,
                ROLE_IMPLEMENTER,
            ));
        }

        let (outcome, message) = match state {
            PluginState::Success => (EventOutcome::Success, self.descriptor.success_message),
            PluginState::Failure => (EventOutcome::Failure, self.descriptor.failure_message),
            PluginState::Skipped => (EventOutcome::Success, "Skipped"),
            PluginState::Running => (EventOutcome::PartialSuccess, "Not finished"),
        };
        let outcome_detail = if details.is_empty() {
            message.to_string()
        } else {
            format!("{}: {}", message, details)
        };

        let event = PreservationEvent {
            id: new_event_id(),
            event_type: self.descriptor.event_type,
            date_time: Utc::now(),
            detail: self.descriptor.event_description.to_string(),
            outcome,
            outcome_detail,
            sources: vec![LinkingIdentifier::object(
                object.kind(),
                object.id(),
                ROLE_SOURCE,
            )],
            outcomes: outcomes
                .into_iter()
                .map(|mut link| {
                    if !link.has_role(ROLE_OUTCOME) {
                        link.roles.push(ROLE_OUTCOME.to_string());
                    }
                    link
                })
                .collect(),
            agents,
        };

        self.model.create_preservation_metadata(
            PreservationMetadataKind::Event,
            &event.id,
            &PreservationOwner::of_object(object),
            event_to_xml(&event)?,
            true,
        )?;
        Ok(event)
    }

    /// Loads a binary and computes (or reuses) its fixity.
    pub fn file_fixity(
        &self,
        storage: &dyn StorageService,
        path: &str,
        algorithms: &[DigestAlgorithm],
        originator: &str,
    ) -> Result<(Binary, Vec<Fixity>), PluginError> {
        log::debug!(
            "Computing {} digest(s) of {}",
            algorithms.len(),
            crate::sanitize::redact_storage_path(path)
        );
        let binary = storage.get_binary(path)?;
        let fixities = fixity::fixity_of_binary(&binary, algorithms, originator)?;
        Ok((binary, fixities))
    }
}
