use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info};

use crate::error::WorkerError;
use crate::source::Block;

use super::block::{BlockOutcome, BlockRunner};

/// Fixed set of OS threads running blocks of one job.
///
/// Both channels hold `2 × worker_count` entries. The coordinator never
/// has more blocks in flight than that, so neither side blocks on send.
pub struct WorkerPool {
    block_sender: Sender<Block>,
    outcome_receiver: Receiver<BlockOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(runner: Arc<BlockRunner>, worker_count: usize) -> Result<Self, WorkerError> {
        let worker_count = worker_count.max(1);
        let capacity = worker_count * 2;
        let (block_sender, block_receiver) = bounded::<Block>(capacity);
        let (outcome_sender, outcome_receiver) = bounded::<BlockOutcome>(capacity);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let block_rx = block_receiver.clone();
            let outcome_tx = outcome_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_runner = Arc::clone(&runner);

            let handle = thread::Builder::new()
                .name(format!("curator-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(worker_id, block_rx, outcome_tx, shutdown_flag, worker_runner);
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            block_sender,
            outcome_receiver,
            workers,
            shutdown,
            capacity,
        })
    }

    /// Most blocks that may be queued or running at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn submit(&self, block: Block) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }
        self.block_sender
            .send(block)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Waits up to `timeout` for the next finished block.
    pub fn recv_outcome(&self, timeout: Duration) -> Result<Option<BlockOutcome>, WorkerError> {
        match self.outcome_receiver.recv_timeout(timeout) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(WorkerError::ChannelClosed),
        }
    }

    pub fn shutdown(&self) {
        debug!("Shutting down worker pool");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn wait(self) {
        drop(self.block_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        debug!("All workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    block_receiver: Receiver<Block>,
    outcome_sender: Sender<BlockOutcome>,
    shutdown: Arc<AtomicBool>,
    runner: Arc<BlockRunner>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match block_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(block) => {
                debug!(
                    "Worker {} processing block {} ({} objects)",
                    worker_id,
                    block.id,
                    block.len()
                );
                let outcome = runner.run(&block);
                if let Err(e) = outcome_sender.send(outcome) {
                    error!("Worker {} failed to send block outcome: {}", worker_id, e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} block channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
