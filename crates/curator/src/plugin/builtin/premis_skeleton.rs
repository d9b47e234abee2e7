use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{PluginError, ServiceError};
use crate::model::{
    ArchivalObject, File, ObjectKind, PreservationMetadataKind, PreservationOwner, Representation,
};
use crate::premis::{
    file_to_xml, representation_to_xml, AgentType, EventType, FileObject, LinkingIdentifier,
    RepresentationObject,
};
use crate::report::{PluginState, Report, ReportItem};

use crate::plugin::{
    BlockHook, BoundParameters, ExecutionContext, JobHook, ParameterSet, Plugin,
    PluginDescriptor, PluginWorker,
};

/// Creates the PREMIS object skeleton of each representation: one file
/// object with fixity per file plus a representation object linking them.
pub struct PremisSkeletonPlugin {
    written: Arc<AtomicUsize>,
}

impl PremisSkeletonPlugin {
    pub fn new() -> Self {
        Self {
            written: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// PREMIS objects written by all workers of the current job.
    pub fn objects_written(&self) -> usize {
        self.written.load(Ordering::SeqCst)
    }
}

impl Default for PremisSkeletonPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for PremisSkeletonPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            id: "premis-skeleton",
            name: "PREMIS skeleton",
            version: "1.0",
            description: "Creates PREMIS objects with fixity for every file of a representation",
            agent_type: AgentType::Software,
            event_type: EventType::Creation,
            event_description: "Created the base PREMIS objects with file original name and \
                                file fixity information",
            success_message: "PREMIS objects were successfully created",
            failure_message: "Failed to create PREMIS objects",
            categories: &["characterization"],
            object_kinds: &[ObjectKind::Representation],
        }
    }

    fn parameters(&self) -> ParameterSet {
        ParameterSet::default()
    }

    fn transition(&self, hook: JobHook, ctx: &ExecutionContext) -> Result<(), PluginError> {
        match hook {
            JobHook::BeforeAll => {
                self.written.store(0, Ordering::SeqCst);
                Ok(())
            }
            JobHook::AfterAll => {
                log::info!(
                    "Job {}: PREMIS skeleton wrote {} objects",
                    ctx.job_id,
                    self.objects_written()
                );
                Ok(())
            }
        }
    }

    fn create_worker(&self, _params: &BoundParameters) -> Result<Box<dyn PluginWorker>, PluginError> {
        Ok(Box::new(PremisSkeletonWorker {
            written: self.written.clone(),
        }))
    }
}

struct PremisSkeletonWorker {
    written: Arc<AtomicUsize>,
}

impl PremisSkeletonWorker {
    /// Stores a PREMIS object unless one is already there. Returns whether it
    /// was written.
    fn store(
        &self,
        ctx: &ExecutionContext,
        kind: PreservationMetadataKind,
        id: &str,
        owner: &PreservationOwner,
        payload: Vec<u8>,
    ) -> Result<bool, ServiceError> {
        match ctx
            .services
            .model
            .create_preservation_metadata(kind, id, owner, payload, false)
        {
            Ok(_) => {
                self.written.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            Err(ServiceError::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn file_object(&self, ctx: &ExecutionContext, file: &File) -> Result<(), PluginError> {
        let (binary, fixities) = ctx.recorder().file_fixity(
            ctx.services.storage.as_ref(),
            &file.storage_path(),
            &ctx.fixity.algorithms,
            &ctx.fixity.originator,
        )?;
        let premis = FileObject {
            id: file.id.clone(),
            original_name: Some(file.id.clone()),
            size: binary.size,
            format: Some(
                mime_guess::from_path(&file.id)
                    .first_or_octet_stream()
                    .to_string(),
            ),
            fixities,
        };
        let owner = PreservationOwner::of_object(&ArchivalObject::File(file.clone()));
        self.store(
            ctx,
            PreservationMetadataKind::ObjectFile,
            &file.id,
            &owner,
            file_to_xml(&premis)?,
        )?;
        Ok(())
    }

    /// Builds the skeleton of one representation, returning the verdict and
    /// the links to record as event outcomes.
    fn skeleton(
        &self,
        ctx: &ExecutionContext,
        representation: &Representation,
    ) -> Result<(PluginState, String, Vec<LinkingIdentifier>), PluginError> {
        let mut listing = ctx
            .services
            .model
            .list_files(&representation.aip_id, &representation.id)?;

        let mut parts = Vec::new();
        let mut problems = Vec::new();
        for file in listing.by_ref() {
            if file.is_directory {
                continue;
            }
            match self.file_object(ctx, &file) {
                Ok(()) => parts.push(LinkingIdentifier {
                    id_type: ObjectKind::File.as_str().to_string(),
                    value: file.id.clone(),
                    roles: Vec::new(),
                }),
                Err(e) => problems.push(format!("{}: {}", file.id, e)),
            }
        }
        listing.close();

        if !problems.is_empty() {
            return Ok((PluginState::Failure, problems.join("; "), Vec::new()));
        }

        let premis = RepresentationObject {
            id: representation.id.clone(),
            parts: parts.clone(),
        };
        let owner =
            PreservationOwner::of_object(&ArchivalObject::Representation(representation.clone()));
        self.store(
            ctx,
            PreservationMetadataKind::ObjectRepresentation,
            &representation.id,
            &owner,
            representation_to_xml(&premis)?,
        )?;

        let mut outcomes = vec![LinkingIdentifier {
            id_type: ObjectKind::Representation.as_str().to_string(),
            value: representation.id.clone(),
            roles: Vec::new(),
        }];
        outcomes.extend(parts.iter().cloned());
        Ok((
            PluginState::Success,
            format!("{} file object(s) linked", parts.len()),
            outcomes,
        ))
    }
}

impl PluginWorker for PremisSkeletonWorker {
    fn transition(&mut self, hook: BlockHook, _ctx: &ExecutionContext) -> Result<(), PluginError> {
        match hook {
            BlockHook::BeforeBlock => Ok(()),
            BlockHook::AfterBlock => Ok(()),
        }
    }

    fn execute(
        &mut self,
        ctx: &ExecutionContext,
        objects: &[ArchivalObject],
    ) -> Result<Report, PluginError> {
        let recorder = ctx.recorder();
        let mut report = Report::new();
        for object in objects {
            let (state, details, outcomes) = match object {
                ArchivalObject::Representation(representation) => {
                    match self.skeleton(ctx, representation) {
                        Ok(result) => result,
                        Err(e) => (PluginState::Failure, e.to_string(), Vec::new()),
                    }
                }
                other => (
                    PluginState::Failure,
                    format!("{} is not a representation", other.kind()),
                    Vec::new(),
                ),
            };
            let recorded = recorder.record_event_with_outcomes(object, outcomes, state, &details);
            let item = match recorded {
                Ok(_) => ReportItem::new(object, state, details),
                Err(e) => {
                    log::warn!("Event for representation '{}' not recorded: {}", object.id(), e);
                    ReportItem::new(
                        object,
                        PluginState::Failure,
                        format!("{}; event not recorded: {}", details, e),
                    )
                }
            };
            report.push(item);
        }
        Ok(report)
    }
}
