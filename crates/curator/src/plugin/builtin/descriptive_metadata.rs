use std::collections::BTreeMap;

use crate::error::PluginError;
use crate::model::{Aip, ArchivalObject, ObjectKind, PreservationMetadataKind};
use crate::premis::{
    agent_from_xml, check_well_formed, event_from_xml, file_from_xml, representation_from_xml,
    AgentType, EventType,
};
use crate::report::Report;
use crate::services::Services;

use super::{process_each, Verdict};
use crate::plugin::{
    BlockHook, BoundParameters, ExecutionContext, JobHook, ParameterKind, ParameterSet, Plugin,
    PluginDescriptor, PluginParameter, PluginWorker,
};

const PARAM_VALIDATE_DESCRIPTIVE: &str = "validate_descriptive_metadata";
const PARAM_METADATA_TYPE: &str = "metadata_type";
const PARAM_FORCE_TYPE: &str = "force_type";
const PARAM_VALIDATE_PREMIS: &str = "validate_premis";

/// Checks that every AIP carries well-formed descriptive metadata and
/// parseable PREMIS documents.
pub struct DescriptiveMetadataValidationPlugin;

impl DescriptiveMetadataValidationPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DescriptiveMetadataValidationPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for DescriptiveMetadataValidationPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            id: "descriptive-metadata-validation",
            name: "AIP descriptive metadata validation",
            version: "1.0",
            description: "Checks that the descriptive metadata and PREMIS documents of each AIP \
                          are well-formed",
            agent_type: AgentType::Software,
            event_type: EventType::WellformednessCheck,
            event_description: "Checked whether the descriptive metadata is included in the \
                                package and is well-formed",
            success_message: "Descriptive metadata is well formed",
            failure_message: "Descriptive metadata was not well formed or failed to validate",
            categories: &["validation"],
            object_kinds: &[ObjectKind::Aip],
        }
    }

    fn parameters(&self) -> ParameterSet {
        ParameterSet::new(vec![
            PluginParameter::boolean(
                PARAM_VALIDATE_DESCRIPTIVE,
                "Validate descriptive metadata",
                true,
            )
            .describe("Require descriptive metadata and check that it is well-formed"),
            PluginParameter::string(PARAM_METADATA_TYPE, "Descriptive metadata type", None)
                .with_kind(ParameterKind::MetadataType)
                .describe("Type used when a document declares none, or always when forced"),
            PluginParameter::boolean(PARAM_FORCE_TYPE, "Force metadata type", false)
                .describe("Validate every document as the given metadata type"),
            PluginParameter::boolean(PARAM_VALIDATE_PREMIS, "Validate PREMIS", true)
                .describe("Check that the package's PREMIS documents parse"),
        ])
    }

    /// A forced type needs a type to force, so the pair is checked here and
    /// a bad combination never reaches a job.
    fn bind(&self, values: &BTreeMap<String, String>) -> Result<BoundParameters, PluginError> {
        let params = self.parameters().bind(values)?;
        if params.get_bool(PARAM_FORCE_TYPE)? && params.get_str(PARAM_METADATA_TYPE).is_none() {
            return Err(PluginError::InvalidParameter {
                id: PARAM_FORCE_TYPE.to_string(),
                reason: "forcing a type requires metadata_type".to_string(),
            });
        }
        Ok(params)
    }

    fn transition(&self, hook: JobHook, _ctx: &ExecutionContext) -> Result<(), PluginError> {
        match hook {
            JobHook::BeforeAll => Ok(()),
            JobHook::AfterAll => Ok(()),
        }
    }

    fn create_worker(&self, params: &BoundParameters) -> Result<Box<dyn PluginWorker>, PluginError> {
        Ok(Box::new(DescriptiveMetadataWorker {
            validate_descriptive: params.get_bool(PARAM_VALIDATE_DESCRIPTIVE)?,
            metadata_type: params.get_str(PARAM_METADATA_TYPE).map(str::to_string),
            force_type: params.get_bool(PARAM_FORCE_TYPE)?,
            validate_premis: params.get_bool(PARAM_VALIDATE_PREMIS)?,
        }))
    }
}

struct DescriptiveMetadataWorker {
    validate_descriptive: bool,
    metadata_type: Option<String>,
    force_type: bool,
    validate_premis: bool,
}

impl DescriptiveMetadataWorker {
    fn effective_type(&self, declared: Option<&str>) -> Option<String> {
        if self.force_type {
            return self.metadata_type.clone();
        }
        declared
            .map(str::to_string)
            .or_else(|| self.metadata_type.clone())
    }

    fn check_descriptive(&self, services: &Services, aip: &Aip, problems: &mut Vec<String>) {
        let documents = match services.model.list_descriptive_metadata(&aip.id) {
            Ok(documents) => documents,
            Err(e) => {
                problems.push(e.to_string());
                return;
            }
        };

        if documents.is_empty() {
            problems.push("package has no descriptive metadata".to_string());
            return;
        }

        for document in documents {
            let binary = match services.storage.get_binary(&document.storage_path()) {
                Ok(binary) => binary,
                Err(e) => {
                    problems.push(format!("{}: {}", document.id, e));
                    continue;
                }
            };
            let kind = self
                .effective_type(document.metadata_type.as_deref())
                .unwrap_or_else(|| "untyped".to_string());
            if let Err(e) = check_well_formed(&binary.content) {
                problems.push(format!("{} ({}): {}", document.id, kind, e));
            }
        }
    }

    fn check_premis(&self, services: &Services, aip: &Aip, problems: &mut Vec<String>) {
        let listing = match services.model.list_preservation_metadata(Some(&aip.id)) {
            Ok(listing) => listing,
            Err(e) => {
                problems.push(e.to_string());
                return;
            }
        };

        for record in listing {
            let parsed = check_well_formed(&record.payload).and_then(|_| match record.kind {
                PreservationMetadataKind::Event => event_from_xml(&record.payload).map(|_| ()),
                PreservationMetadataKind::Agent => agent_from_xml(&record.payload).map(|_| ()),
                PreservationMetadataKind::ObjectFile => file_from_xml(&record.payload).map(|_| ()),
                PreservationMetadataKind::ObjectRepresentation => {
                    representation_from_xml(&record.payload).map(|_| ())
                }
            });
            if let Err(e) = parsed {
                problems.push(format!("PREMIS {} {}: {}", record.kind, record.id, e));
            }
        }
    }
}

impl PluginWorker for DescriptiveMetadataWorker {
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
        process_each(ctx, objects, |object| {
            let aip = match object {
                ArchivalObject::Aip(aip) => aip,
                other => return Ok(Verdict::failure(format!("{} is not an AIP", other.kind()))),
            };

            let mut problems = Vec::new();
            if self.validate_descriptive {
                self.check_descriptive(&ctx.services, aip, &mut problems);
            }
            if self.validate_premis {
                self.check_premis(&ctx.services, aip, &mut problems);
            }

            if problems.is_empty() {
                Ok(Verdict::success(""))
            } else {
                Ok(Verdict::failure(problems.join("; ")))
            }
        })
    }
}
