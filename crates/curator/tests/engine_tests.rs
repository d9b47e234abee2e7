//! Background job submission through the engine.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Probe, Script, ScriptedPlugin, TestHarness};
use curator::{
    CuratorError, Engine, JobRequest, JobState, ObjectKind, ObjectSource, PluginError,
    PluginRegistry,
};

fn engine(harness: &TestHarness, script: Script, probe: Arc<Probe>) -> Engine {
    let mut registry = PluginRegistry::new();
    registry.register(move || ScriptedPlugin::new(script.clone(), probe.clone()));
    Engine::new(registry, harness.orchestrator(TestHarness::settings(1, 1)))
}

fn all_aips() -> ObjectSource {
    ObjectSource::All {
        kind: ObjectKind::Aip,
    }
}

#[test]
fn test_status_is_pollable_until_finished() {
    let harness = TestHarness::new().with_aips(&["o1", "o2", "o3"]);
    let probe = Arc::new(Probe::default());
    let engine = engine(&harness, Script::failing(&["o2"]), probe);

    let job_id = engine
        .submit(JobRequest::new("scripted-check", all_aips()).with_owner("alice"))
        .unwrap();
    let created = engine.status(&job_id).unwrap();
    assert_eq!(created.owner.as_deref(), Some("alice"));

    let job = engine.wait(&job_id).unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.stats.succeeded, 2);
    assert_eq!(job.stats.failed, 1);
    assert_eq!(engine.status(&job_id).unwrap().state, JobState::Completed);
    assert_eq!(engine.report(&job_id).unwrap().len(), 3);
}

#[test]
fn test_cancel_running_job() {
    let ids: Vec<String> = (1..=20).map(|i| format!("o{:02}", i)).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let harness = TestHarness::new().with_aips(&id_refs);
    let probe = Arc::new(Probe::default());
    let script = Script {
        block_delay: Duration::from_millis(50),
        ..Script::default()
    };
    let engine = engine(&harness, script, probe.clone());

    let job_id = engine
        .submit(JobRequest::new("scripted-check", all_aips()))
        .unwrap();
    assert!(engine.cancel(&job_id));

    let job = engine.wait(&job_id).unwrap();
    assert_eq!(job.state, JobState::Cancelled);
    assert!(job.stats.succeeded < 20);
    assert_eq!(job.stats.processing, 0);
    assert_eq!(
        Probe::get(&probe.workers_created),
        Probe::get(&probe.workers_shut_down)
    );
    assert!(!engine.cancel(&job_id));
}

#[test]
fn test_invalid_parameter_is_rejected_before_running() {
    let harness = TestHarness::new().with_aips(&["o1"]);
    let probe = Arc::new(Probe::default());
    let engine = engine(&harness, Script::default(), probe.clone());

    let result = engine.submit(
        JobRequest::new("scripted-check", all_aips()).with_parameter("strict", "maybe"),
    );

    assert!(matches!(
        result,
        Err(CuratorError::Plugin(PluginError::InvalidParameter { .. }))
    ));
    assert_eq!(Probe::get(&probe.workers_created), 0);
    assert!(engine.running_jobs().is_empty());
}

#[test]
fn test_forced_type_without_type_is_rejected_before_running() {
    let harness = TestHarness::new().with_aips(&["o1", "o2"]);
    let engine = Engine::new(
        PluginRegistry::with_builtins(),
        harness.orchestrator(TestHarness::settings(1, 1)),
    );

    let result = engine.submit(
        JobRequest::new("descriptive-metadata-validation", all_aips())
            .with_parameter("force_type", "true"),
    );

    assert!(matches!(
        result,
        Err(CuratorError::Plugin(PluginError::InvalidParameter { ref id, .. })) if id == "force_type"
    ));
    assert!(engine.running_jobs().is_empty());
    assert!(harness.store.list(&Default::default()).unwrap().is_empty());
}

#[test]
fn test_shutdown_cancels_every_job() {
    let harness = TestHarness::new().with_aips(&["o1", "o2", "o3", "o4", "o5", "o6"]);
    let probe = Arc::new(Probe::default());
    let script = Script {
        block_delay: Duration::from_millis(30),
        ..Script::default()
    };
    let engine = engine(&harness, script, probe);

    let first = engine
        .submit(JobRequest::new("scripted-check", all_aips()))
        .unwrap();
    let second = engine
        .submit(JobRequest::new("scripted-check", all_aips()))
        .unwrap();
    engine.shutdown();

    assert!(engine.running_jobs().is_empty());
    for job_id in [first, second] {
        let job = engine.status(&job_id).unwrap();
        assert!(job.is_finished(), "job {} is {}", job_id, job.state);
    }
}
