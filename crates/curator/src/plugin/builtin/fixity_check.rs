use crate::error::{PluginError, ServiceError};
use crate::fixity::{parse_algorithms, DigestAlgorithm};
use crate::model::{ArchivalObject, ObjectKind, PreservationMetadataKind, PreservationOwner};
use crate::premis::{file_from_xml, file_to_xml, AgentType, EventType, FileObject, Fixity};
use crate::report::Report;

use super::{process_each, Verdict};
use crate::plugin::{
    BlockHook, BoundParameters, ExecutionContext, JobHook, ParameterSet, Plugin,
    PluginDescriptor, PluginParameter, PluginWorker,
};

const PARAM_ALGORITHMS: &str = "algorithms";
const PARAM_ORIGINATOR: &str = "originator";

/// Computes file digests and compares them with the fixity already recorded
/// in each file's PREMIS object, recording it when there is none yet.
pub struct FixityCheckPlugin;

impl FixityCheckPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FixityCheckPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for FixityCheckPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            id: "fixity-check",
            name: "Fixity check",
            version: "1.0",
            description: "Computes message digests and checks them against recorded fixity",
            agent_type: AgentType::Software,
            event_type: EventType::FixityCheck,
            event_description: "Computed the message digests of the file and compared them \
                                with the recorded fixity information",
            success_message: "Fixity checked successfully",
            failure_message: "Fixity check failed",
            categories: &["fixity", "integrity"],
            object_kinds: &[ObjectKind::File, ObjectKind::TransferredResource],
        }
    }

    fn parameters(&self) -> ParameterSet {
        ParameterSet::new(vec![
            PluginParameter::string(PARAM_ALGORITHMS, "Digest algorithms", Some("SHA-256"))
                .describe("Comma-separated list; SHA-256 is always included"),
            PluginParameter::string(PARAM_ORIGINATOR, "Digest originator", Some("curator"))
                .describe("Label recorded as the originator of new digests"),
        ])
    }

    fn init(&self, params: &BoundParameters) -> Result<(), PluginError> {
        parse_algorithms(params.require_str(PARAM_ALGORITHMS)?).map_err(|e| {
            PluginError::InvalidParameter {
                id: PARAM_ALGORITHMS.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(())
    }

    fn transition(&self, hook: JobHook, _ctx: &ExecutionContext) -> Result<(), PluginError> {
        match hook {
            JobHook::BeforeAll => Ok(()),
            JobHook::AfterAll => Ok(()),
        }
    }

    fn create_worker(&self, params: &BoundParameters) -> Result<Box<dyn PluginWorker>, PluginError> {
        Ok(Box::new(FixityCheckWorker {
            algorithms: parse_algorithms(params.require_str(PARAM_ALGORITHMS)?)?,
            originator: params.require_str(PARAM_ORIGINATOR)?.to_string(),
        }))
    }
}

struct FixityCheckWorker {
    algorithms: Vec<DigestAlgorithm>,
    originator: String,
}

/// Where a checked object's content and PREMIS object live.
struct Target {
    storage_path: String,
    owner: PreservationOwner,
    name: String,
}

impl FixityCheckWorker {
    fn target(object: &ArchivalObject) -> Result<Target, Verdict> {
        match object {
            ArchivalObject::File(file) if file.is_directory => {
                Err(Verdict::skipped("directories have no fixity"))
            }
            ArchivalObject::File(file) => Ok(Target {
                storage_path: file.storage_path(),
                owner: PreservationOwner::of_object(object),
                name: file.id.clone(),
            }),
            ArchivalObject::TransferredResource(resource) if !resource.is_file => {
                Err(Verdict::skipped("directories have no fixity"))
            }
            ArchivalObject::TransferredResource(resource) => Ok(Target {
                storage_path: resource.storage_path(),
                owner: PreservationOwner::of_object(object),
                name: resource.name.clone(),
            }),
            other => Err(Verdict::failure(format!(
                "{} objects have no content to check",
                other.kind()
            ))),
        }
    }

    fn check(&self, ctx: &ExecutionContext, object: &ArchivalObject) -> Result<Verdict, PluginError> {
        let target = match Self::target(object) {
            Ok(target) => target,
            Err(verdict) => return Ok(verdict),
        };

        let mut algorithms = self.algorithms.clone();
        for algorithm in &ctx.fixity.algorithms {
            if !algorithms.contains(algorithm) {
                algorithms.push(*algorithm);
            }
        }

        let recorder = ctx.recorder();
        let (binary, computed) = match recorder.file_fixity(
            ctx.services.storage.as_ref(),
            &target.storage_path,
            &algorithms,
            &self.originator,
        ) {
            Ok(result) => result,
            Err(e) => return Ok(Verdict::failure(e.to_string())),
        };

        let model = &ctx.services.model;
        let premis_id = object.id();
        match model.retrieve_preservation_metadata(
            PreservationMetadataKind::ObjectFile,
            premis_id,
            &target.owner,
        ) {
            Ok(record) => {
                let recorded = match file_from_xml(&record.payload) {
                    Ok(file) => file.fixities,
                    Err(e) => return Ok(Verdict::failure(format!("recorded PREMIS object: {}", e))),
                };
                Ok(compare(&recorded, &computed))
            }
            Err(ServiceError::NotFound { .. }) => {
                let premis = FileObject {
                    id: premis_id.to_string(),
                    original_name: Some(target.name.clone()),
                    size: binary.size,
                    format: Some(
                        mime_guess::from_path(&target.name)
                            .first_or_octet_stream()
                            .to_string(),
                    ),
                    fixities: computed,
                };
                model.create_preservation_metadata(
                    PreservationMetadataKind::ObjectFile,
                    premis_id,
                    &target.owner,
                    file_to_xml(&premis)?,
                    true,
                )?;
                Ok(Verdict::success("no recorded fixity, digests recorded"))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Compares computed digests with recorded ones of the same algorithm.
fn compare(recorded: &[Fixity], computed: &[Fixity]) -> Verdict {
    let mut compared = 0;
    let mut mismatches = Vec::new();
    for fixity in computed {
        if let Some(expected) = recorded
            .iter()
            .find(|r| r.algorithm.eq_ignore_ascii_case(&fixity.algorithm))
        {
            compared += 1;
            if !expected.digest.eq_ignore_ascii_case(&fixity.digest) {
                mismatches.push(format!(
                    "{} mismatch: expected {}, computed {}",
                    fixity.algorithm, expected.digest, fixity.digest
                ));
            }
        }
    }

    if !mismatches.is_empty() {
        Verdict::failure(mismatches.join("; "))
    } else if compared == 0 {
        Verdict::failure("recorded PREMIS object has no fixity for the requested algorithms")
    } else {
        Verdict::success(format!("{} digest(s) match", compared))
    }
}

impl PluginWorker for FixityCheckWorker {
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
        process_each(ctx, objects, |object| self.check(ctx, object))
    }
}
