//! Isolated environment for running jobs end to end.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use curator::db::Database;
use curator::model::{Aip, PreservationMetadataKind};
use curator::premis::{agent_from_xml, event_from_xml, PreservationAgent, PreservationEvent};
use curator::{
    CancellationToken, InMemoryRepository, JobOutcome, JobProgressBroadcaster, JobStore,
    ObjectKind, ObjectSource, Orchestrator, OrchestratorSettings, Plugin, Services,
};

pub struct TestHarness {
    temp_dir: TempDir,
    pub repository: Arc<InMemoryRepository>,
    pub store: Arc<JobStore>,
    pub progress: JobProgressBroadcaster,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("data").join("jobs.db"))
            .expect("Failed to open job database");

        Self {
            temp_dir,
            repository: Arc::new(InMemoryRepository::new()),
            store: Arc::new(JobStore::with_database(db)),
            progress: JobProgressBroadcaster::default(),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.temp_dir.path().join("data").join("jobs.db")
    }

    pub fn path(&self) -> &std::path::Path {
        self.temp_dir.path()
    }

    /// Adds AIPs produced by `alice`.
    pub fn with_aips(self, ids: &[&str]) -> Self {
        for id in ids {
            self.repository.add_aip(Aip {
                id: id.to_string(),
                producer: Some("alice".to_string()),
                ..Aip::default()
            });
        }
        self
    }

    pub fn settings(block_size: usize, worker_count: usize) -> OrchestratorSettings {
        OrchestratorSettings {
            block_size,
            worker_count,
            ..OrchestratorSettings::default()
        }
    }

    pub fn services(&self) -> Services {
        Services::in_memory(self.repository.clone())
    }

    pub fn orchestrator(&self, settings: OrchestratorSettings) -> Orchestrator {
        Orchestrator::new(
            settings,
            self.services(),
            self.store.clone(),
            self.progress.clone(),
        )
    }

    /// Runs `plugin` over every AIP.
    pub fn run_over_aips(
        &self,
        settings: OrchestratorSettings,
        plugin: Arc<dyn Plugin>,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        self.orchestrator(settings).run(
            plugin,
            Default::default(),
            ObjectSource::All {
                kind: ObjectKind::Aip,
            },
            None,
            cancel,
        )
    }

    pub fn events(&self) -> Vec<PreservationEvent> {
        self.repository
            .preservation_metadata(PreservationMetadataKind::Event)
            .iter()
            .map(|pm| event_from_xml(&pm.payload).expect("stored event is valid PREMIS"))
            .collect()
    }

    pub fn agents(&self) -> Vec<PreservationAgent> {
        self.repository
            .preservation_metadata(PreservationMetadataKind::Agent)
            .iter()
            .map(|pm| agent_from_xml(&pm.payload).expect("stored agent is valid PREMIS"))
            .collect()
    }
}
