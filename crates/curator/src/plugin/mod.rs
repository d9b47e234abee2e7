//! Plugin contract.
//!
//! A [`Plugin`] is a template: it is configured once per job, runs the
//! job-level hooks and hands out a fresh [`PluginWorker`] for every block.
//! Workers never share state with each other; anything a plugin wants to
//! aggregate job-wide goes through the template.

pub mod builtin;
pub mod context;
pub mod lifecycle;
pub mod parameter;
pub mod registry;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::PluginError;
use crate::model::{ArchivalObject, ObjectKind};
use crate::premis::{AgentType, EventType};
use crate::report::Report;

pub use context::{ExecutionContext, FixitySettings};
pub use lifecycle::{BlockHook, JobHook, WorkerLifecycle, WorkerState};
pub use parameter::{BoundParameters, ParameterKind, ParameterSet, PluginParameter};
pub use registry::PluginRegistry;

/// Static description of a plugin, also used to build its PREMIS agent and
/// events.
#[derive(Debug, Clone, Serialize)]
pub struct PluginDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub agent_type: AgentType,
    pub event_type: EventType,
    pub event_description: &'static str,
    pub success_message: &'static str,
    pub failure_message: &'static str,
    pub categories: &'static [&'static str],
    pub object_kinds: &'static [ObjectKind],
}

impl PluginDescriptor {
    pub fn accepts(&self, kind: ObjectKind) -> bool {
        self.object_kinds.contains(&kind)
    }
}

pub trait Plugin: Send + Sync {
    fn descriptor(&self) -> PluginDescriptor;

    fn parameters(&self) -> ParameterSet;

    fn bind(&self, values: &BTreeMap<String, String>) -> Result<BoundParameters, PluginError> {
        self.parameters().bind(values)
    }

    /// Called once before any block is dispatched.
    fn init(&self, _params: &BoundParameters) -> Result<(), PluginError> {
        Ok(())
    }

    fn transition(&self, hook: JobHook, ctx: &ExecutionContext) -> Result<(), PluginError>;

    fn create_worker(&self, params: &BoundParameters) -> Result<Box<dyn PluginWorker>, PluginError>;

    fn shutdown(&self) {}
}

pub trait PluginWorker: Send {
    fn transition(&mut self, hook: BlockHook, ctx: &ExecutionContext) -> Result<(), PluginError>;

    /// Processes one block. The returned report has exactly one item per
    /// object, in input order. Object failures are `FAILURE` items; an
    /// error aborts the whole block.
    fn execute(
        &mut self,
        ctx: &ExecutionContext,
        objects: &[ArchivalObject],
    ) -> Result<Report, PluginError>;

    fn shutdown(&mut self) {}
}
