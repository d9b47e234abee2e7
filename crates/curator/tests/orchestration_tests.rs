//! End-to-end runs of scripted plugins through the orchestrator.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::{FailingEventWrites, Probe, Script, ScriptedPlugin, ShrinkingIndex, TestHarness};
use curator::db::Database;
use curator::plugin::builtin::ProducerAuthorizationPlugin;
use curator::premis::{plugin_agent_id, EventOutcome, ROLE_EXECUTING_PROGRAM};
use curator::{
    CancellationToken, JobState, JobStore, ObjectKind, ObjectSource, Orchestrator, PluginState,
    ProgressKind, Services,
};

const FIVE: &[&str] = &["o1", "o2", "o3", "o4", "o5"];

#[test]
fn test_partial_failure_counts_and_events() {
    let harness = TestHarness::new().with_aips(FIVE);
    let (plugin, _) = ScriptedPlugin::shared(Script::failing(&["o3"]));

    let outcome = harness.run_over_aips(
        TestHarness::settings(2, 2),
        plugin,
        &CancellationToken::new(),
    );

    let stats = outcome.stats();
    assert_eq!(outcome.state(), JobState::Completed);
    assert_eq!(stats.total, 5);
    assert_eq!(stats.succeeded, 4);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completion_percentage, 100);
    assert!(outcome.block_failures.is_empty());

    let events = harness.events();
    assert_eq!(events.len(), 5);
    let failures: Vec<_> = events
        .iter()
        .filter(|e| e.outcome == EventOutcome::Failure)
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].sources[0].value, "o3");
    assert_eq!(
        events
            .iter()
            .filter(|e| e.outcome == EventOutcome::Success)
            .count(),
        4
    );
}

#[test]
fn test_blocks_follow_source_order() {
    let harness = TestHarness::new().with_aips(FIVE);
    let (plugin, _) = ScriptedPlugin::shared(Script::default());

    let outcome = harness.run_over_aips(
        TestHarness::settings(2, 3),
        plugin,
        &CancellationToken::new(),
    );

    let report = harness.store.report(&outcome.job.id).unwrap();
    assert_eq!(report.len(), 5);

    let mut by_block: BTreeMap<u64, Vec<String>> = BTreeMap::new();
    for item in &report.items {
        by_block
            .entry(item.block_id.expect("items are stamped with their block"))
            .or_default()
            .push(item.object_id.clone());
    }
    assert_eq!(by_block[&1], vec!["o1", "o2"]);
    assert_eq!(by_block[&2], vec!["o3", "o4"]);
    assert_eq!(by_block[&3], vec!["o5"]);
}

#[test]
fn test_one_agent_for_many_events() {
    let harness = TestHarness::new().with_aips(&["a1", "a2"]);
    let (plugin, _) = ScriptedPlugin::shared(Script {
        id: "X",
        version: "1.0",
        ..Script::default()
    });

    let outcome = harness.run_over_aips(
        TestHarness::settings(1, 2),
        plugin,
        &CancellationToken::new(),
    );
    assert_eq!(outcome.state(), JobState::Completed);

    let agents = harness.agents();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].id, plugin_agent_id("X", "1.0"));

    let events = harness.events();
    assert_eq!(events.len(), 2);
    assert_ne!(events[0].id, events[1].id);
    for event in &events {
        assert!(event
            .agents
            .iter()
            .any(|a| a.value == agents[0].id && a.has_role(ROLE_EXECUTING_PROGRAM)));
    }
}

#[test]
fn test_block_fatal_error_only_fails_its_block() {
    let harness = TestHarness::new().with_aips(&["o1", "o2", "o3", "o4", "o5", "o6"]);
    let (plugin, _) = ScriptedPlugin::shared(Script {
        fatal: vec!["o3".to_string()],
        ..Script::default()
    });

    let outcome = harness.run_over_aips(
        TestHarness::settings(2, 2),
        plugin,
        &CancellationToken::new(),
    );

    assert_eq!(outcome.state(), JobState::FailedToComplete);
    assert_eq!(outcome.stats().succeeded, 4);
    assert_eq!(outcome.stats().failed, 2);
    assert_eq!(outcome.block_failures.len(), 1);
    assert_eq!(outcome.block_failures[0].block_id, 2);

    let report = harness.store.report(&outcome.job.id).unwrap();
    for item in &report.items {
        let expected = if item.object_id == "o3" || item.object_id == "o4" {
            PluginState::Failure
        } else {
            PluginState::Success
        };
        assert_eq!(item.state, expected, "object {}", item.object_id);
    }
}

#[test]
fn test_panicking_block_is_contained() {
    let harness = TestHarness::new().with_aips(FIVE);
    let (plugin, probe) = ScriptedPlugin::shared(Script {
        panicking: vec!["o5".to_string()],
        ..Script::default()
    });

    let outcome = harness.run_over_aips(
        TestHarness::settings(2, 2),
        plugin,
        &CancellationToken::new(),
    );

    assert_eq!(outcome.state(), JobState::FailedToComplete);
    assert_eq!(outcome.stats().succeeded, 4);
    assert_eq!(outcome.stats().failed, 1);
    assert_eq!(
        Probe::get(&probe.workers_created),
        Probe::get(&probe.workers_shut_down)
    );
}

#[test]
fn test_init_failure_dispatches_nothing() {
    let harness = TestHarness::new().with_aips(FIVE);
    let (plugin, probe) = ScriptedPlugin::shared(Script {
        fail_init: true,
        ..Script::default()
    });

    let outcome = harness.run_over_aips(
        TestHarness::settings(2, 2),
        plugin,
        &CancellationToken::new(),
    );

    assert_eq!(outcome.state(), JobState::FailedDuringCreation);
    assert!(outcome.job.error.is_some());
    assert_eq!(Probe::get(&probe.workers_created), 0);
    assert_eq!(Probe::get(&probe.blocks_executed), 0);
    assert_eq!(Probe::get(&probe.template_shutdowns), 1);
    assert!(harness.events().is_empty());
    assert!(harness.store.report(&outcome.job.id).unwrap().is_empty());
}

#[test]
fn test_every_worker_is_shut_down() {
    let harness = TestHarness::new().with_aips(FIVE);
    let (plugin, probe) = ScriptedPlugin::shared(Script::default());

    harness.run_over_aips(
        TestHarness::settings(1, 3),
        plugin,
        &CancellationToken::new(),
    );

    assert_eq!(Probe::get(&probe.blocks_executed), 5);
    assert_eq!(Probe::get(&probe.workers_created), 5);
    assert_eq!(Probe::get(&probe.workers_shut_down), 5);
    assert_eq!(Probe::get(&probe.after_all_calls), 1);
    assert_eq!(Probe::get(&probe.template_shutdowns), 1);
}

#[test]
fn test_after_all_failure_keeps_statistics() {
    let harness = TestHarness::new().with_aips(FIVE);
    let (plugin, _) = ScriptedPlugin::shared(Script {
        fail_after_all: true,
        ..Script::default()
    });

    let outcome = harness.run_over_aips(
        TestHarness::settings(2, 2),
        plugin,
        &CancellationToken::new(),
    );

    assert_eq!(outcome.state(), JobState::FailedToComplete);
    assert_eq!(outcome.stats().succeeded, 5);
    assert_eq!(outcome.stats().failed, 0);
}

#[test]
fn test_cancel_drains_dispatched_blocks() {
    let harness = TestHarness::new().with_aips(&[
        "o01", "o02", "o03", "o04", "o05", "o06", "o07", "o08", "o09", "o10",
    ]);
    let cancel = CancellationToken::new();
    let (plugin, probe) = ScriptedPlugin::shared(Script {
        cancel_on_first_block: Some(cancel.clone()),
        block_delay: Duration::from_millis(20),
        ..Script::default()
    });

    // One worker holds at most two blocks in flight
    let outcome = harness.run_over_aips(TestHarness::settings(1, 1), plugin, &cancel);

    assert_eq!(outcome.state(), JobState::Cancelled);
    let stats = outcome.stats();
    assert_eq!(stats.total, 10);
    assert_eq!(Probe::get(&probe.blocks_executed), 2);
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.waiting, 8);
    assert_eq!(Probe::get(&probe.after_all_calls), 1);
}

#[test]
fn test_timeout_ends_cancelled() {
    let harness = TestHarness::new().with_aips(&[
        "o01", "o02", "o03", "o04", "o05", "o06", "o07", "o08", "o09", "o10",
    ]);
    let (plugin, _) = ScriptedPlugin::shared(Script {
        block_delay: Duration::from_millis(60),
        ..Script::default()
    });
    let mut settings = TestHarness::settings(1, 1);
    settings.job_timeout = Some(Duration::from_millis(100));
    settings.poll_interval = Duration::from_millis(10);

    let outcome = harness.run_over_aips(settings, plugin, &CancellationToken::new());

    assert_eq!(outcome.state(), JobState::Cancelled);
    assert!(outcome.job.error.as_deref().unwrap_or("").contains("timeout"));
    assert!(outcome.stats().succeeded < 10);
    assert_eq!(outcome.stats().processing, 0);
}

#[test]
fn test_missing_ids_are_reported_as_failures() {
    let harness = TestHarness::new().with_aips(&["o1", "o2"]);
    let (plugin, _) = ScriptedPlugin::shared(Script::default());

    let outcome = harness.orchestrator(TestHarness::settings(2, 1)).run(
        plugin,
        BTreeMap::new(),
        ObjectSource::Ids {
            kind: ObjectKind::Aip,
            ids: vec!["o1".to_string(), "gone".to_string(), "o2".to_string()],
        },
        None,
        &CancellationToken::new(),
    );

    assert_eq!(outcome.stats().total, 3);
    assert_eq!(outcome.stats().succeeded, 2);
    assert_eq!(outcome.stats().failed, 1);

    let report = harness.store.report(&outcome.job.id).unwrap();
    let ids: Vec<_> = report.items.iter().map(|i| i.object_id.as_str()).collect();
    assert!(ids.contains(&"gone"));
}

#[test]
fn test_progress_events_and_persistence() {
    let harness = TestHarness::new().with_aips(FIVE);
    let mut events = harness.progress.subscribe();
    let (plugin, _) = ScriptedPlugin::shared(Script::failing(&["o2"]));

    let outcome = harness.run_over_aips(
        TestHarness::settings(2, 2),
        plugin,
        &CancellationToken::new(),
    );

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.job_id, outcome.job.id);
        kinds.push(event.kind);
    }
    assert_eq!(kinds.first(), Some(&ProgressKind::Started));
    assert_eq!(kinds.last(), Some(&ProgressKind::Finished));
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == ProgressKind::BlockCompleted)
            .count(),
        3
    );

    // A fresh store over the same file sees the final state
    let reopened = JobStore::with_database(Database::open(&harness.db_path()).unwrap());
    let job = reopened.get(&outcome.job.id).unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.stats.succeeded, 4);
    assert_eq!(job.stats.failed, 1);
    assert_eq!(reopened.report(&job.id).unwrap().len(), 5);
}

#[test]
fn test_failed_event_write_only_fails_its_object() {
    let harness = TestHarness::new().with_aips(FIVE);
    let services = Services::new(
        harness.repository.clone(),
        Arc::new(FailingEventWrites::new(harness.repository.clone(), "o3")),
        harness.repository.clone(),
    );
    let orchestrator = Orchestrator::new(
        TestHarness::settings(2, 2),
        services,
        harness.store.clone(),
        harness.progress.clone(),
    );

    let outcome = orchestrator.run(
        Arc::new(ProducerAuthorizationPlugin::new()),
        BTreeMap::new(),
        ObjectSource::All {
            kind: ObjectKind::Aip,
        },
        Some("alice"),
        &CancellationToken::new(),
    );

    assert_eq!(outcome.state(), JobState::Completed);
    assert!(outcome.block_failures.is_empty());
    assert_eq!(outcome.stats().succeeded, 4);
    assert_eq!(outcome.stats().failed, 1);

    let report = harness.store.report(&outcome.job.id).unwrap();
    for item in &report.items {
        if item.object_id == "o3" {
            assert_eq!(item.state, PluginState::Failure);
            assert!(item.details.contains("transient write failure"));
        } else {
            assert_eq!(item.state, PluginState::Success, "object {}", item.object_id);
        }
    }

    let events = harness.events();
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|e| e.sources[0].value != "o3"));
    assert!(events.iter().any(|e| e.sources[0].value == "o4"));
}

#[test]
fn test_short_source_fails_leftover_objects() {
    let harness = TestHarness::new().with_aips(FIVE);
    let services = Services::new(
        Arc::new(ShrinkingIndex::new(harness.repository.clone(), 1)),
        harness.repository.clone(),
        harness.repository.clone(),
    );
    let orchestrator = Orchestrator::new(
        TestHarness::settings(2, 2),
        services,
        harness.store.clone(),
        harness.progress.clone(),
    );
    let (plugin, probe) = ScriptedPlugin::shared(Script::default());

    let outcome = orchestrator.run(
        plugin,
        BTreeMap::new(),
        ObjectSource::All {
            kind: ObjectKind::Aip,
        },
        None,
        &CancellationToken::new(),
    );

    let stats = outcome.stats();
    assert_eq!(outcome.state(), JobState::FailedToComplete);
    assert_eq!(stats.total, 6);
    assert_eq!(stats.succeeded, 5);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.waiting + stats.processing, 0);
    assert_eq!(stats.succeeded + stats.failed, stats.total);
    assert!(outcome
        .job
        .error
        .as_deref()
        .unwrap_or("")
        .contains("5 of 6"));
    assert_eq!(Probe::get(&probe.blocks_executed), 3);
}
