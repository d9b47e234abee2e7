//! Block fan-out of one plugin over one object source.
//!
//! The coordinator thread resolves the source, runs the job hooks on the
//! plugin template and feeds blocks to a [`WorkerPool`], never holding more
//! than the pool's capacity in flight. Outcomes are folded into the job
//! statistics and persisted as they arrive.

pub mod block;
pub mod pool;

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, info_span, warn};

use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent, ProgressKind};
use crate::error::{CuratorError, PluginError};
use crate::job::{Job, JobState, JobStats, JobStore, StatsAggregator};
use crate::plugin::{ExecutionContext, FixitySettings, JobHook, Plugin};
use crate::report::Report;
use crate::services::Services;
use crate::source::ObjectSource;

pub use block::{BlockOutcome, BlockRunner};
pub use pool::WorkerPool;

/// Cooperative cancellation flag shared between a job and its submitter.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub block_size: usize,
    pub worker_count: usize,
    pub job_timeout: Option<Duration>,
    /// How often the coordinator wakes up to observe cancellation.
    pub poll_interval: Duration,
    pub fixity: FixitySettings,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            block_size: 100,
            worker_count: num_cpus::get(),
            job_timeout: None,
            poll_interval: Duration::from_millis(100),
            fixity: FixitySettings::default(),
        }
    }
}

/// A block that failed as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFailure {
    pub block_id: u64,
    pub error: String,
}

/// Final state of a job run.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job: Job,
    pub block_failures: Vec<BlockFailure>,
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        self.job.state
    }

    pub fn stats(&self) -> JobStats {
        self.job.stats
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Cancelled,
    TimedOut,
}

pub struct Orchestrator {
    settings: OrchestratorSettings,
    services: Services,
    store: Arc<JobStore>,
    progress: JobProgressBroadcaster,
}

impl Orchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        services: Services,
        store: Arc<JobStore>,
        progress: JobProgressBroadcaster,
    ) -> Self {
        Self {
            settings,
            services,
            store,
            progress,
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn progress(&self) -> &JobProgressBroadcaster {
        &self.progress
    }

    /// Creates a job for `plugin` and runs it to completion.
    pub fn run(
        &self,
        plugin: Arc<dyn Plugin>,
        parameters: BTreeMap<String, String>,
        source: ObjectSource,
        owner: Option<&str>,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        let descriptor = plugin.descriptor();
        let job = Job::new(descriptor.id, descriptor.version, owner, parameters, source);
        self.run_job(job, plugin, cancel)
    }

    /// Runs an already created job. Never panics on plugin failures; the
    /// returned job is always terminal.
    pub fn run_job(
        &self,
        mut job: Job,
        plugin: Arc<dyn Plugin>,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        let _span = info_span!(
            "job",
            job_id = %job.id,
            plugin = %job.plugin_id,
            version = %job.plugin_version
        )
        .entered();

        self.store.save(&job);

        match self.execute(&mut job, plugin, cancel) {
            Ok(block_failures) => {
                self.announce(&job, ProgressKind::Finished, None, job.state.to_string());
                JobOutcome {
                    job,
                    block_failures,
                }
            }
            Err(e) => {
                error!("Job {} failed before dispatch: {}", job.id, e);
                job.finish(JobState::FailedDuringCreation, Some(e.to_string()));
                self.store.save(&job);
                self.announce(&job, ProgressKind::Finished, None, e.to_string());
                JobOutcome {
                    job,
                    block_failures: Vec::new(),
                }
            }
        }
    }

    /// Errors returned here happened before any block was dispatched.
    fn execute(
        &self,
        job: &mut Job,
        plugin: Arc<dyn Plugin>,
        cancel: &CancellationToken,
    ) -> Result<Vec<BlockFailure>, CuratorError> {
        let descriptor = plugin.descriptor();
        let params = plugin.bind(&job.parameters)?;
        job.source.check_kind(&descriptor)?;

        let resolved = {
            let _step = info_span!("resolve_source").entered();
            job.source.resolve(&self.services)?
        };
        job.start(resolved.total());
        self.store.save(job);
        self.announce(
            job,
            ProgressKind::Started,
            None,
            format!("{} objects to process", resolved.total()),
        );
        info!("Job {} started over {} objects", job.id, resolved.total());

        let ctx = ExecutionContext {
            job_id: job.id.clone(),
            owner: job.owner.clone(),
            descriptor,
            services: self.services.clone(),
            fixity: self.settings.fixity.clone(),
        };

        {
            let _step = info_span!("before_all").entered();
            let prepared = guarded(|| plugin.init(&params))
                .and_then(|_| guarded(|| plugin.transition(JobHook::BeforeAll, &ctx)));
            if let Err(e) = prepared {
                shutdown_template(plugin.as_ref());
                return Err(e.into());
            }
        }

        let aggregator = StatsAggregator::new(resolved.total());
        let runner = Arc::new(BlockRunner::new(
            Arc::clone(&plugin),
            params,
            ctx.clone(),
        ));
        let pool = match WorkerPool::new(runner, self.settings.worker_count) {
            Ok(pool) => pool,
            Err(e) => {
                shutdown_template(plugin.as_ref());
                return Err(e.into());
            }
        };

        let mut block_failures = Vec::new();
        let mut stop = None;
        let mut source_error = None;
        let mut in_flight = 0usize;
        let mut exhausted = false;
        let deadline = self.settings.job_timeout.map(|t| Instant::now() + t);
        let mut blocks = resolved.blocks(self.settings.block_size);

        loop {
            if stop.is_none() {
                if cancel.is_cancelled() {
                    info!("Job {} cancelled, draining {} blocks", job.id, in_flight);
                    stop = Some(StopReason::Cancelled);
                } else if deadline.map_or(false, |d| Instant::now() >= d) {
                    warn!("Job {} timed out, draining {} blocks", job.id, in_flight);
                    stop = Some(StopReason::TimedOut);
                }
            }

            while stop.is_none() && !exhausted && in_flight < pool.capacity() {
                match blocks.next() {
                    None => exhausted = true,
                    Some(Err(e)) => {
                        error!("Object source failed mid-run: {}", e);
                        source_error = Some(e.to_string());
                        exhausted = true;
                    }
                    Some(Ok(block)) => {
                        let block_id = block.id;
                        let stats = aggregator.dispatch(block_id, block.len() as u64);
                        match pool.submit(block) {
                            Ok(()) => {
                                in_flight += 1;
                                job.stats = stats;
                                self.announce(
                                    job,
                                    ProgressKind::BlockDispatched,
                                    Some(block_id),
                                    format!("Block {} dispatched", block_id),
                                );
                            }
                            Err(e) => {
                                error!("Could not dispatch block {}: {}", block_id, e);
                                // Counts every object of the block as failed
                                let lost = BlockOutcome {
                                    block_id,
                                    report: Report::new(),
                                    error: Some(e.to_string()),
                                };
                                self.apply(job, &aggregator, lost, &mut block_failures);
                                exhausted = true;
                            }
                        }
                    }
                }
            }

            if in_flight == 0 && (exhausted || stop.is_some()) {
                break;
            }

            match pool.recv_outcome(self.settings.poll_interval) {
                Ok(Some(outcome)) => {
                    in_flight -= 1;
                    self.apply(job, &aggregator, outcome, &mut block_failures);
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Lost {} blocks: {}", in_flight, e);
                    break;
                }
            }
        }

        pool.shutdown();
        pool.wait();

        // Only a stopped job may end with objects left waiting
        let abandoned = match stop {
            Some(_) => 0,
            None => aggregator.fail_remaining(),
        };
        if abandoned > 0 {
            warn!("Job {}: {} objects were never processed", job.id, abandoned);
        }

        let after_all = {
            let _step = info_span!("after_all").entered();
            guarded(|| plugin.transition(JobHook::AfterAll, &ctx))
        };
        shutdown_template(plugin.as_ref());

        job.stats = aggregator.snapshot();
        let (state, error) = match (stop, after_all) {
            (Some(reason), after_all) => {
                if let Err(e) = after_all {
                    warn!("afterAll failed on a stopped job: {}", e);
                }
                let note = match reason {
                    StopReason::Cancelled => "Cancelled by request",
                    StopReason::TimedOut => "Job timeout exceeded",
                };
                (JobState::Cancelled, Some(note.to_string()))
            }
            (None, Err(e)) => (JobState::FailedToComplete, Some(e.to_string())),
            (None, Ok(())) => match source_error {
                Some(e) => (JobState::FailedToComplete, Some(e)),
                None if !block_failures.is_empty() => (
                    JobState::FailedToComplete,
                    Some(format!("{} block(s) failed", block_failures.len())),
                ),
                None if abandoned > 0 => (
                    JobState::FailedToComplete,
                    Some(format!("{} object(s) were never processed", abandoned)),
                ),
                None => (JobState::Completed, None),
            },
        };
        job.finish(state, error);
        self.store.save(job);

        info!(
            "Job {} finished {}: {} succeeded, {} failed of {}",
            job.id, job.state, job.stats.succeeded, job.stats.failed, job.stats.total
        );
        Ok(block_failures)
    }

    fn apply(
        &self,
        job: &mut Job,
        aggregator: &StatsAggregator,
        outcome: BlockOutcome,
        block_failures: &mut Vec<BlockFailure>,
    ) {
        let block_id = outcome.block_id;
        let stats = match aggregator.apply(block_id, &outcome.report) {
            Some(stats) => stats,
            None => return,
        };

        self.store.append_report(&job.id, &outcome.report.items);
        if let Some(error) = outcome.error {
            block_failures.push(BlockFailure { block_id, error });
        }

        job.stats = stats;
        self.store.save(job);
        self.announce(
            job,
            ProgressKind::BlockCompleted,
            Some(block_id),
            format!("Block {} completed", block_id),
        );
    }

    fn announce(&self, job: &Job, kind: ProgressKind, block_id: Option<u64>, message: String) {
        let mut event =
            JobProgressEvent::new(&job.id, &job.plugin_id, kind, job.state, job.stats, message);
        if let Some(block_id) = block_id {
            event = event.for_block(block_id);
        }
        self.progress.send(event);
    }
}

/// Runs template code, turning a panic into an error.
fn guarded<F>(f: F) -> Result<(), PluginError>
where
    F: FnOnce() -> Result<(), PluginError>,
{
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|_| Err(PluginError::Panicked("plugin template panicked".to_string())))
}

fn shutdown_template(plugin: &dyn Plugin) {
    if panic::catch_unwind(AssertUnwindSafe(|| plugin.shutdown())).is_err() {
        warn!("Plugin shutdown panicked");
    }
}
