use crate::error::PluginError;
use crate::model::{ArchivalObject, ObjectKind};
use crate::premis::{AgentType, EventType};
use crate::report::Report;

use super::{process_each, Verdict};
use crate::plugin::{
    BlockHook, BoundParameters, ExecutionContext, JobHook, ParameterSet, Plugin,
    PluginDescriptor, PluginParameter, PluginWorker,
};

const PARAM_ALLOW_ADMIN: &str = "allow_admin";
const ADMIN_USER: &str = "admin";

/// Verifies that the job owner may ingest into each AIP.
pub struct ProducerAuthorizationPlugin;

impl ProducerAuthorizationPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProducerAuthorizationPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for ProducerAuthorizationPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            id: "producer-authorization-check",
            name: "Producer authorization check",
            version: "1.0",
            description: "Checks that the producer of each AIP has ingest permission",
            agent_type: AgentType::Software,
            event_type: EventType::AuthorizationCheck,
            event_description: "Checked that the producer has enough permissions to ingest \
                                the package",
            success_message: "The producer has enough permissions to ingest the package",
            failure_message: "The producer does not have enough permissions to ingest the package",
            categories: &["validation", "ingest"],
            object_kinds: &[ObjectKind::Aip],
        }
    }

    fn parameters(&self) -> ParameterSet {
        ParameterSet::new(vec![PluginParameter::boolean(
            PARAM_ALLOW_ADMIN,
            "Allow administrator",
            true,
        )
        .describe("Accept the admin user for every package")])
    }

    fn transition(&self, hook: JobHook, ctx: &ExecutionContext) -> Result<(), PluginError> {
        match hook {
            JobHook::BeforeAll if ctx.owner.is_none() => {
                log::warn!(
                    "Job {} has no owner, every package will fail authorization",
                    ctx.job_id
                );
                Ok(())
            }
            JobHook::BeforeAll => Ok(()),
            JobHook::AfterAll => Ok(()),
        }
    }

    fn create_worker(&self, params: &BoundParameters) -> Result<Box<dyn PluginWorker>, PluginError> {
        Ok(Box::new(ProducerAuthorizationWorker {
            allow_admin: params.get_bool(PARAM_ALLOW_ADMIN)?,
        }))
    }
}

struct ProducerAuthorizationWorker {
    allow_admin: bool,
}

impl PluginWorker for ProducerAuthorizationWorker {
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
        let allow_admin = self.allow_admin;
        process_each(ctx, objects, |object| {
            let aip = match object {
                ArchivalObject::Aip(aip) => aip,
                other => return Ok(Verdict::failure(format!("{} is not an AIP", other.kind()))),
            };
            let Some(user) = ctx.owner.as_deref() else {
                return Ok(Verdict::failure("job has no owner"));
            };

            let authorized = aip.producer.as_deref() == Some(user)
                || aip.ingest_permissions.iter().any(|u| u == user)
                || (allow_admin && user == ADMIN_USER);

            if authorized {
                Ok(Verdict::success(""))
            } else {
                Ok(Verdict::failure(format!(
                    "user '{}' may not ingest into {}",
                    user, aip.id
                )))
            }
        })
    }
}
