//! Runs one block on a fresh plugin worker.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, info_span, warn};

use crate::error::PluginError;
use crate::model::ArchivalObject;
use crate::plugin::{
    BlockHook, BoundParameters, ExecutionContext, Plugin, PluginWorker, WorkerLifecycle,
    WorkerState,
};
use crate::report::{PluginState, Report, ReportItem};
use crate::source::{Block, BlockEntry};

/// Result of one block, ready for the aggregator.
#[derive(Debug)]
pub struct BlockOutcome {
    pub block_id: u64,
    /// One item per block entry, in block order.
    pub report: Report,
    /// Set when the block failed as a whole.
    pub error: Option<String>,
}

impl BlockOutcome {
    /// Marks every entry of the block failed with `reason`.
    pub fn failed(block: &Block, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let report = block
            .entries
            .iter()
            .map(|entry| entry_failure(entry, &reason, block.id))
            .collect();
        Self {
            block_id: block.id,
            report,
            error: Some(reason),
        }
    }
}

fn entry_failure(entry: &BlockEntry, reason: &str, block_id: u64) -> ReportItem {
    let mut item = match entry {
        BlockEntry::Object(object) => ReportItem::failure(object, reason),
        // Unresolved ids keep the lookup error instead
        BlockEntry::Missing {
            id,
            kind,
            reason: lookup_error,
        } => ReportItem::for_id(id, *kind, PluginState::Failure, lookup_error.as_str()),
    };
    item.block_id = Some(block_id);
    item
}

/// Everything a worker thread needs to run blocks of one job.
pub struct BlockRunner {
    plugin: Arc<dyn Plugin>,
    params: BoundParameters,
    ctx: ExecutionContext,
}

impl BlockRunner {
    pub fn new(plugin: Arc<dyn Plugin>, params: BoundParameters, ctx: ExecutionContext) -> Self {
        Self {
            plugin,
            params,
            ctx,
        }
    }

    /// Drives a fresh worker through
    /// `BeforeBlock → execute → AfterBlock → shutdown`.
    ///
    /// Never fails: block-fatal errors and panics turn every entry the
    /// plugin did not report into a `FAILURE` item. The worker is shut
    /// down exactly once whatever happens.
    pub fn run(&self, block: &Block) -> BlockOutcome {
        let _span = info_span!(
            "block",
            job_id = %self.ctx.job_id,
            block_id = block.id,
            objects = block.len()
        )
        .entered();

        let objects = block.objects();
        let mut lifecycle = WorkerLifecycle::new();

        let mut worker = match contain(|| self.plugin.create_worker(&self.params)) {
            Ok(worker) => worker,
            Err(e) => {
                warn!("Could not create worker for block {}: {}", block.id, e);
                return BlockOutcome::failed(block, e.to_string());
            }
        };

        let result = self.drive(worker.as_mut(), &mut lifecycle, &objects);

        if let Err(e) = lifecycle.advance(WorkerState::ShutDown) {
            warn!("Block {}: {}", block.id, e);
        }
        if let Err(e) = contain(|| {
            worker.shutdown();
            Ok(())
        }) {
            warn!("Worker shutdown failed for block {}: {}", block.id, e);
        }

        match result {
            Ok((items, after_block_error)) => {
                let report = merge_entries(block, items);
                if let Some(ref e) = after_block_error {
                    warn!("Block {} finished with an error: {}", block.id, e);
                }
                BlockOutcome {
                    block_id: block.id,
                    report,
                    error: after_block_error,
                }
            }
            Err(e) => {
                warn!("Block {} failed: {}", block.id, e);
                BlockOutcome::failed(block, e.to_string())
            }
        }
    }

    /// Runs the block hooks and `execute`. An `AfterBlock` failure keeps the
    /// items and is returned next to them.
    fn drive(
        &self,
        worker: &mut dyn PluginWorker,
        lifecycle: &mut WorkerLifecycle,
        objects: &[ArchivalObject],
    ) -> Result<(Vec<ReportItem>, Option<String>), PluginError> {
        lifecycle.advance(WorkerState::Initialized)?;

        lifecycle.advance(WorkerState::BeforeBlock)?;
        contain(|| worker.transition(BlockHook::BeforeBlock, &self.ctx)).map_err(|e| {
            PluginError::Hook {
                hook: BlockHook::BeforeBlock.to_string(),
                reason: e.to_string(),
            }
        })?;

        lifecycle.advance(WorkerState::Executing)?;
        let report = contain(|| worker.execute(&self.ctx, objects))?;
        let items = align(objects, report);

        lifecycle.advance(WorkerState::AfterBlock)?;
        let after_block = contain(|| worker.transition(BlockHook::AfterBlock, &self.ctx))
            .err()
            .map(|e| {
                PluginError::Hook {
                    hook: BlockHook::AfterBlock.to_string(),
                    reason: e.to_string(),
                }
                .to_string()
            });

        Ok((items, after_block))
    }
}

/// Runs plugin code, turning a panic into `PluginError::Panicked`.
fn contain<T, F>(f: F) -> Result<T, PluginError>
where
    F: FnOnce() -> Result<T, PluginError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(PluginError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Pairs the plugin's report with the objects it was given. Objects the
/// report skips or reorders become `FAILURE` items; extra items are dropped.
fn align(objects: &[ArchivalObject], report: Report) -> Vec<ReportItem> {
    if report.len() != objects.len() {
        warn!(
            "Plugin reported {} items for {} objects",
            report.len(),
            objects.len()
        );
    }

    let mut items = report.items.into_iter();
    objects
        .iter()
        .map(|object| match items.next() {
            Some(item) if item.object_id == object.id() => item,
            Some(item) => {
                debug!(
                    "Expected report item for {}, got {}",
                    object.id(),
                    item.object_id
                );
                ReportItem::failure(object, "plugin reported objects out of order")
            }
            None => ReportItem::failure(object, "no result reported by plugin"),
        })
        .collect()
}

/// Interleaves plugin items with failures for unresolved entries, keeping
/// block order, and stamps the block id on every item.
fn merge_entries(block: &Block, items: Vec<ReportItem>) -> Report {
    let mut items = items.into_iter();
    block
        .entries
        .iter()
        .map(|entry| match entry {
            BlockEntry::Object(object) => {
                let mut item = items
                    .next()
                    .unwrap_or_else(|| ReportItem::failure(object, "no result reported by plugin"));
                item.block_id = Some(block.id);
                item
            }
            missing @ BlockEntry::Missing { .. } => entry_failure(missing, "", block.id),
        })
        .collect()
}
