#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use curator::model::{ArchivalObject, ObjectKind};
use curator::orchestrator::CancellationToken;
use curator::plugin::{
    BlockHook, BoundParameters, ExecutionContext, JobHook, ParameterSet, PluginParameter,
};
use curator::premis::{AgentType, EventType};
use curator::{Plugin, PluginDescriptor, PluginError, PluginState, PluginWorker, Report, ReportItem};

/// Counts what the engine did to a scripted plugin.
#[derive(Default)]
pub struct Probe {
    pub workers_created: AtomicUsize,
    pub workers_shut_down: AtomicUsize,
    pub blocks_executed: AtomicUsize,
    pub after_all_calls: AtomicUsize,
    pub template_shutdowns: AtomicUsize,
}

impl Probe {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Behaviour of a [`ScriptedPlugin`].
#[derive(Clone)]
pub struct Script {
    pub id: &'static str,
    pub version: &'static str,
    /// Objects reported as `FAILURE`.
    pub failing: Vec<String>,
    /// Objects whose block aborts with an error.
    pub fatal: Vec<String>,
    /// Objects whose block panics.
    pub panicking: Vec<String>,
    pub fail_init: bool,
    pub fail_after_all: bool,
    pub block_delay: Duration,
    /// Cancelled by the first block that executes.
    pub cancel_on_first_block: Option<CancellationToken>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            id: "scripted-check",
            version: "1.0",
            failing: Vec::new(),
            fatal: Vec::new(),
            panicking: Vec::new(),
            fail_init: false,
            fail_after_all: false,
            block_delay: Duration::ZERO,
            cancel_on_first_block: None,
        }
    }
}

impl Script {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }
}

pub struct ScriptedPlugin {
    script: Script,
    probe: Arc<Probe>,
}

impl ScriptedPlugin {
    pub fn new(script: Script, probe: Arc<Probe>) -> Self {
        Self { script, probe }
    }

    pub fn shared(script: Script) -> (Arc<dyn Plugin>, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        (Arc::new(Self::new(script, probe.clone())), probe)
    }
}

impl Plugin for ScriptedPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            id: self.script.id,
            name: "Scripted check",
            version: self.script.version,
            description: "Fails the objects it is told to fail",
            agent_type: AgentType::Software,
            event_type: EventType::Validation,
            event_description: "Scripted validation",
            success_message: "Object passed",
            failure_message: "Object failed",
            categories: &["test"],
            object_kinds: &[ObjectKind::Aip],
        }
    }

    fn parameters(&self) -> ParameterSet {
        ParameterSet::new(vec![PluginParameter::boolean("strict", "Strict", false)])
    }

    fn init(&self, _params: &BoundParameters) -> Result<(), PluginError> {
        if self.script.fail_init {
            return Err(PluginError::Init("scripted init failure".to_string()));
        }
        Ok(())
    }

    fn transition(&self, hook: JobHook, _ctx: &ExecutionContext) -> Result<(), PluginError> {
        match hook {
            JobHook::BeforeAll => Ok(()),
            JobHook::AfterAll => {
                self.probe.after_all_calls.fetch_add(1, Ordering::SeqCst);
                if self.script.fail_after_all {
                    return Err(PluginError::Hook {
                        hook: hook.to_string(),
                        reason: "scripted afterAll failure".to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    fn create_worker(&self, _params: &BoundParameters) -> Result<Box<dyn PluginWorker>, PluginError> {
        self.probe.workers_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedWorker {
            script: self.script.clone(),
            probe: self.probe.clone(),
        }))
    }

    fn shutdown(&self) {
        self.probe.template_shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

struct ScriptedWorker {
    script: Script,
    probe: Arc<Probe>,
}

impl PluginWorker for ScriptedWorker {
    fn transition(&mut self, _hook: BlockHook, _ctx: &ExecutionContext) -> Result<(), PluginError> {
        Ok(())
    }

    fn execute(
        &mut self,
        ctx: &ExecutionContext,
        objects: &[ArchivalObject],
    ) -> Result<Report, PluginError> {
        self.probe.blocks_executed.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.script.cancel_on_first_block {
            token.cancel();
        }
        if !self.script.block_delay.is_zero() {
            thread::sleep(self.script.block_delay);
        }

        if let Some(object) = objects.iter().find(|o| listed(&self.script.fatal, o)) {
            return Err(PluginError::Execution(format!("cannot process {}", object.id())));
        }
        if let Some(object) = objects.iter().find(|o| listed(&self.script.panicking, o)) {
            panic!("scripted panic on {}", object.id());
        }

        let recorder = ctx.recorder();
        let mut report = Report::new();
        for object in objects {
            let (state, details) = if listed(&self.script.failing, object) {
                (PluginState::Failure, "scripted failure")
            } else {
                (PluginState::Success, "")
            };
            recorder.record_event(object, state, details)?;
            report.push(ReportItem::new(object, state, details));
        }
        Ok(report)
    }

    fn shutdown(&mut self) {
        self.probe.workers_shut_down.fetch_add(1, Ordering::SeqCst);
    }
}

fn listed(ids: &[String], object: &ArchivalObject) -> bool {
    ids.iter().any(|id| id == object.id())
}
