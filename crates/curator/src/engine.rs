//! Job submission surface.
//!
//! An [`Engine`] owns the plugin registry and an [`Orchestrator`]. Each
//! submitted job runs on its own coordinator thread; its state stays
//! pollable through the [`JobStore`] while it runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use log::{error, info, warn};
use tokio::sync::broadcast;

use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent};
use crate::config::EngineConfig;
use crate::db::Database;
use crate::error::{Result, WorkerError};
use crate::job::{Job, JobState, JobStore};
use crate::orchestrator::{CancellationToken, JobOutcome, Orchestrator};
use crate::plugin::PluginRegistry;
use crate::report::Report;
use crate::services::Services;
use crate::source::ObjectSource;

/// "Run plugin P with parameters V over objects O."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub plugin_id: String,
    pub parameters: BTreeMap<String, String>,
    pub source: ObjectSource,
    pub owner: Option<String>,
}

impl JobRequest {
    pub fn new(plugin_id: impl Into<String>, source: ObjectSource) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            parameters: BTreeMap::new(),
            source,
            owner: None,
        }
    }

    pub fn with_parameter(mut self, id: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(id.into(), value.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

struct RunningJob {
    cancel: CancellationToken,
    handle: JoinHandle<JobOutcome>,
}

pub struct Engine {
    registry: Arc<PluginRegistry>,
    orchestrator: Arc<Orchestrator>,
    running: Mutex<HashMap<String, RunningJob>>,
}

impl Engine {
    pub fn new(registry: PluginRegistry, orchestrator: Orchestrator) -> Self {
        Self {
            registry: Arc::new(registry),
            orchestrator: Arc::new(orchestrator),
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Builds an engine with the built-in plugins over `services`.
    ///
    /// Opens the job database named by the config; jobs a previous process
    /// left unfinished are marked failed.
    pub fn from_config(config: &EngineConfig, services: Services) -> Result<Self> {
        let settings = config.orchestrator_settings()?;

        let store = match config.database_path() {
            Some(path) => JobStore::with_database(Database::open(&path)?),
            None => {
                warn!("No home directory found, jobs will not be persisted");
                JobStore::new()
            }
        };
        let recovered = store.recover_unfinished();
        if recovered > 0 {
            warn!("Marked {} interrupted job(s) as failed", recovered);
        }

        let orchestrator = Orchestrator::new(
            settings,
            services,
            Arc::new(store),
            JobProgressBroadcaster::default(),
        );
        Ok(Self::new(PluginRegistry::with_builtins(), orchestrator))
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<JobStore> {
        self.orchestrator.store()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.orchestrator.progress().subscribe()
    }

    /// Validates the request and starts the job in the background.
    ///
    /// Unknown plugins, bad parameters and sources of the wrong object kind
    /// are rejected here, before a job record exists.
    pub fn submit(&self, request: JobRequest) -> Result<String> {
        let plugin = self.registry.create(&request.plugin_id)?;
        let descriptor = plugin.descriptor();
        plugin.bind(&request.parameters)?;
        request.source.check_kind(&descriptor)?;

        let job = Job::new(
            descriptor.id,
            descriptor.version,
            request.owner.as_deref(),
            request.parameters,
            request.source,
        );
        let job_id = job.id.clone();
        self.store().save(&job);

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let orchestrator = Arc::clone(&self.orchestrator);
        let spawned = thread::Builder::new()
            .name(format!("job-{}", &job_id[..8.min(job_id.len())]))
            .spawn(move || orchestrator.run_job(job, plugin, &token));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!("Could not start job {}: {}", job_id, e);
                if let Some(mut job) = self.store().get(&job_id) {
                    job.finish(JobState::FailedDuringCreation, Some(e.to_string()));
                    self.store().save(&job);
                }
                return Err(WorkerError::SpawnFailed(e.to_string()).into());
            }
        };

        info!("Submitted job {} ({})", job_id, descriptor.id);
        let mut running = self.running();
        prune_finished(&mut running);
        running.insert(job_id.clone(), RunningJob { cancel, handle });
        Ok(job_id)
    }

    pub fn status(&self, job_id: &str) -> Option<Job> {
        self.store().get(job_id)
    }

    pub fn report(&self, job_id: &str) -> Result<Report> {
        Ok(self.store().report(job_id)?)
    }

    /// Requests cancellation. Returns false when the job is not running.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.running().get(job_id) {
            Some(job) if !job.handle.is_finished() => {
                info!("Cancelling job {}", job_id);
                job.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Blocks until the job is terminal and returns its final record.
    pub fn wait(&self, job_id: &str) -> Option<Job> {
        let running = self.running().remove(job_id);
        match running {
            Some(job) => match job.handle.join() {
                Ok(outcome) => Some(outcome.job),
                Err(_) => {
                    error!("Coordinator thread of job {} panicked", job_id);
                    self.store().get(job_id)
                }
            },
            None => self.store().get(job_id),
        }
    }

    /// Ids of jobs whose coordinator thread is still running.
    pub fn running_jobs(&self) -> Vec<String> {
        let mut running = self.running();
        prune_finished(&mut running);
        running.keys().cloned().collect()
    }

    /// Cancels every running job and waits for all of them.
    pub fn shutdown(&self) {
        let jobs: Vec<(String, RunningJob)> = self.running().drain().collect();
        for (_, job) in &jobs {
            job.cancel.cancel();
        }
        for (job_id, job) in jobs {
            if job.handle.join().is_err() {
                error!("Coordinator thread of job {} panicked", job_id);
            }
        }
    }

    fn running(&self) -> MutexGuard<'_, HashMap<String, RunningJob>> {
        match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Running job table was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Joins and forgets jobs whose coordinator thread has already returned.
/// Their final state stays available through the job store.
fn prune_finished(running: &mut HashMap<String, RunningJob>) {
    let finished: Vec<String> = running
        .iter()
        .filter(|(_, job)| job.handle.is_finished())
        .map(|(job_id, _)| job_id.clone())
        .collect();
    for job_id in finished {
        if let Some(job) = running.remove(&job_id) {
            if job.handle.join().is_err() {
                error!("Coordinator thread of job {} panicked", job_id);
            }
        }
    }
}
