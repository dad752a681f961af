//! Parallel copy workers
//!
//! `CopyWorkerPool` owns a fixed number of worker threads. Each worker reads
//! its own bounded FIFO queue of `RestoreJob`s. Jobs are handed out round
//! robin, so there is no work stealing. A full queue blocks the submitter,
//! which throttles the tree walk to the copy throughput.
//!
//! Workers never share mutable state. Each one keeps a private
//! `WorkerTally` and returns it when joined. A failed copy is counted and the
//! worker moves on to the next job.
//!
//! ## Lifecycle
//!
//! 1. `CopyWorkerPool::new` spawns the workers
//! 2. `submit` enqueues jobs
//! 3. `close` sends every worker a stop signal behind its queued jobs
//! 4. `await_closed` joins the workers and sums their tallies
//!
//! When the shared `CancellationFlag` is set, workers stop at their next
//! dequeue and abandon whatever is left in their queues.

use crate::cancel::CancellationFlag;
use crate::error::{DeversionError, Result};
use crate::types::{RestoreJob, WorkerTally};
use crate::utils;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendError, Sender};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default per-worker queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// How long a worker blocks on its queue before re-checking cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(50);

enum WorkerMessage {
    Copy(RestoreJob),
    Stop,
}

struct CopyWorker {
    id: usize,
    sender: Sender<WorkerMessage>,
    handle: Option<JoinHandle<WorkerTally>>,
}

/// Fixed-size pool of copy workers with one bounded queue each
pub struct CopyWorkerPool {
    workers: Vec<CopyWorker>,
    next: usize,
    closed: bool,
    cancel: CancellationFlag,
}

impl CopyWorkerPool {
    /// Spawn `workers` workers with the default queue capacity
    pub fn new(workers: usize, dry_run: bool, cancel: CancellationFlag) -> Result<Self> {
        Self::with_capacity(workers, DEFAULT_QUEUE_CAPACITY, dry_run, cancel)
    }

    /// Spawn `workers` workers, each with a queue holding `capacity` jobs
    pub fn with_capacity(
        workers: usize,
        capacity: usize,
        dry_run: bool,
        cancel: CancellationFlag,
    ) -> Result<Self> {
        if workers == 0 {
            return Err(DeversionError::InvalidConfiguration(
                "worker pool needs at least one worker".to_string(),
            ));
        }
        if capacity == 0 {
            return Err(DeversionError::InvalidConfiguration(
                "worker queue capacity must be at least 1".to_string(),
            ));
        }

        let mut pool = Vec::with_capacity(workers);
        for id in 0..workers {
            let (sender, receiver) = bounded(capacity);
            let worker_cancel = cancel.clone();
            let handle = thread::Builder::new()
                .name(format!("copy-worker-{}", id))
                .spawn(move || run_worker(id, receiver, dry_run, worker_cancel))
                .map_err(|e| DeversionError::ThreadPool(format!("failed to spawn worker {}: {}", id, e)))?;
            pool.push(CopyWorker {
                id,
                sender,
                handle: Some(handle),
            });
        }
        debug!("Started {} copy workers (queue capacity {})", workers, capacity);

        Ok(Self {
            workers: pool,
            next: 0,
            closed: false,
            cancel,
        })
    }

    /// Number of workers in the pool
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Enqueue a copy on the next worker in round-robin order
    ///
    /// Blocks while that worker's queue is full.
    pub fn submit(&mut self, src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Result<()> {
        if self.closed {
            return Err(DeversionError::PoolClosed);
        }
        let worker = &self.workers[self.next];
        self.next = (self.next + 1) % self.workers.len();

        worker
            .sender
            .send(WorkerMessage::Copy(RestoreJob::new(src, dst)))
            .map_err(|SendError(_)| {
                if self.cancel.is_cancelled() {
                    DeversionError::Interrupted
                } else {
                    DeversionError::ThreadPool(format!("worker {} is no longer running", worker.id))
                }
            })
    }

    /// Mean number of queued jobs per worker
    pub fn average_workload(&self) -> f64 {
        let queued: usize = self.workers.iter().map(|w| w.sender.len()).sum();
        queued as f64 / self.workers.len() as f64
    }

    /// Tell every worker to stop once its queue is drained
    ///
    /// Calling this more than once has no further effect.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        for worker in &self.workers {
            // A worker that already exited has dropped its receiver
            if worker.sender.send(WorkerMessage::Stop).is_err() {
                debug!("Worker {} already exited", worker.id);
            }
        }
        self.closed = true;
    }

    /// Wait for every worker to exit and sum their tallies
    pub fn await_closed(&mut self) -> Result<WorkerTally> {
        if !self.closed {
            return Err(DeversionError::PoolNotClosed);
        }
        info!("Waiting for workers to close...");

        let mut total = WorkerTally::default();
        let mut panicked = Vec::new();
        for worker in &mut self.workers {
            let Some(handle) = worker.handle.take() else {
                continue;
            };
            debug!("Waiting for worker {} to close...", worker.id);
            match handle.join() {
                Ok(tally) => total.merge(tally),
                Err(_) => {
                    error!("Worker {} panicked", worker.id);
                    panicked.push(worker.id);
                }
            }
        }

        if !panicked.is_empty() {
            return Err(DeversionError::ThreadPool(format!("workers {:?} panicked", panicked)));
        }
        info!("All workers closed.");
        Ok(total)
    }
}

impl Drop for CopyWorkerPool {
    fn drop(&mut self) {
        self.close();
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

fn run_worker(
    id: usize,
    receiver: Receiver<WorkerMessage>,
    dry_run: bool,
    cancel: CancellationFlag,
) -> WorkerTally {
    let mut tally = WorkerTally::default();
    loop {
        if cancel.is_cancelled() {
            warn!(
                "Worker {}: interrupted, abandoning {} queued jobs",
                id,
                receiver.len()
            );
            break;
        }
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(WorkerMessage::Copy(job)) => copy_job(id, &job, dry_run, &mut tally),
            Ok(WorkerMessage::Stop) => {
                info!("Worker {}: Exiting!", id);
                break;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tally
}

fn copy_job(id: usize, job: &RestoreJob, dry_run: bool, tally: &mut WorkerTally) {
    if job.dst.exists() {
        info!("Worker {}: Restored file already exists...skipping: {:?}", id, job.dst);
        tally.already_present += 1;
        return;
    }
    if dry_run {
        info!("Worker {}: Dry run: Copy {:?} to {:?}", id, job.src, job.dst);
        tally.copied += 1;
        return;
    }

    info!("Worker {}: Copy {:?} to {:?}", id, job.src, job.dst);
    match utils::copy_file(&job.src, &job.dst) {
        Ok(_) => tally.copied += 1,
        Err(e) => {
            error!("FAILED: Worker {}: {}", id, e);
            tally.failed += 1;
            tally.failed_paths.push(job.src.clone());
        }
    }
}
