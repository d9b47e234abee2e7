use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::report::Report;

use super::JobStats;

struct Inner {
    stats: JobStats,
    /// Object count of every dispatched, not yet applied block.
    in_flight: HashMap<u64, u64>,
    applied: HashSet<u64>,
}

/// Folds block reports into job statistics.
///
/// Every update happens under one mutex and a block id is applied at most
/// once, so concurrent outcomes can neither be lost nor double counted.
pub struct StatsAggregator {
    inner: Mutex<Inner>,
}

impl StatsAggregator {
    pub fn new(total: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                stats: JobStats::new(total),
                in_flight: HashMap::new(),
                applied: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Statistics lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Moves a block's objects from waiting to processing.
    pub fn dispatch(&self, block_id: u64, objects: u64) -> JobStats {
        let mut inner = self.lock();
        if inner.applied.contains(&block_id) || inner.in_flight.contains_key(&block_id) {
            log::warn!("Block {} dispatched twice, ignoring", block_id);
            return inner.stats;
        }
        let moved = objects.min(inner.stats.waiting);
        inner.stats.waiting -= moved;
        inner.stats.processing += moved;
        inner.in_flight.insert(block_id, moved);
        inner.stats
    }

    /// Moves a finished block's objects from processing to succeeded or
    /// failed. Returns `None` when the block was already applied.
    ///
    /// `SKIPPED` items count as succeeded; `RUNNING` and any object of the
    /// block the report does not mention count as failed.
    pub fn apply(&self, block_id: u64, report: &Report) -> Option<JobStats> {
        let mut inner = self.lock();
        if !inner.applied.insert(block_id) {
            log::warn!("Block {} reported twice, ignoring", block_id);
            return None;
        }

        let expected = inner
            .in_flight
            .remove(&block_id)
            .unwrap_or(report.len() as u64);
        let succeeded = (report
            .items
            .iter()
            .filter(|item| item.state.counts_as_success())
            .count() as u64)
            .min(expected);

        let stats = &mut inner.stats;
        stats.processing = stats.processing.saturating_sub(expected);
        stats.succeeded += succeeded;
        stats.failed += expected - succeeded;
        stats.recompute();
        Some(*stats)
    }

    /// Counts every object still waiting or processing as failed, for runs
    /// that ended without handling them. Blocks still in flight are closed,
    /// so a late outcome is ignored. Returns how many objects were moved.
    pub fn fail_remaining(&self) -> u64 {
        let mut inner = self.lock();
        let dropped: Vec<u64> = inner.in_flight.drain().map(|(block_id, _)| block_id).collect();
        inner.applied.extend(dropped);
        let stats = &mut inner.stats;
        let remaining = stats.waiting + stats.processing;
        stats.failed += remaining;
        stats.waiting = 0;
        stats.processing = 0;
        stats.recompute();
        remaining
    }

    pub fn snapshot(&self) -> JobStats {
        self.lock().stats
    }

    pub fn is_complete(&self) -> bool {
        self.lock().stats.is_complete()
    }
}
