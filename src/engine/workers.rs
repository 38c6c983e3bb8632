// Worker pool: named threads pulling path jobs from one shared FIFO queue

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::bounded;
use parking_lot::{Condvar, Mutex};
use tracing::{error, info, warn};

use crate::error::{PathfindError, Result};

use super::processor::{PathJob, PathProcessor};
use super::request::{FailureReason, PathOutcome};
use super::sync_context::panic_message;

type BoxedProcessor<P> = Box<dyn PathProcessor<P>>;

struct QueueState<P: Send + Sync + 'static> {
    jobs: VecDeque<PathJob<P>>,
    running: bool,
    disposed: bool,
}

struct PoolShared<P: Send + Sync + 'static> {
    queue: Mutex<QueueState<P>>,
    available: Condvar,
}

/// Processors are either parked here or owned by a running worker thread
struct Workers<P: Send + Sync + 'static> {
    idle: Vec<BoxedProcessor<P>>,
    handles: Vec<JoinHandle<Option<BoxedProcessor<P>>>>,
}

/// Fixed set of worker threads, each owning one processor for its whole life.
///
/// Jobs are served strictly in enqueue order. `stop` lets in-flight jobs finish and keeps
/// the rest queued for the next `start`; `dispose` is terminal and cancels whatever is
/// still queued.
pub struct WorkerPool<P: Send + Sync + 'static> {
    shared: Arc<PoolShared<P>>,
    workers: Mutex<Workers<P>>,
    name_prefix: String,
    thread_count: usize,
}

impl<P: Send + Sync + 'static> WorkerPool<P> {
    /// Build `threads` processors up front; any factory error aborts construction
    pub fn new<F>(threads: usize, name_prefix: &str, mut factory: F) -> Result<Self>
    where
        F: FnMut(usize) -> Result<BoxedProcessor<P>>,
    {
        if threads == 0 {
            return Err(PathfindError::Configuration(
                "worker pool needs at least one thread".to_string(),
            ));
        }

        let idle = (0..threads).map(&mut factory).collect::<Result<Vec<_>>>()?;

        Ok(Self {
            shared: Arc::new(PoolShared {
                queue: Mutex::new(QueueState {
                    jobs: VecDeque::new(),
                    running: false,
                    disposed: false,
                }),
                available: Condvar::new(),
            }),
            workers: Mutex::new(Workers {
                idle,
                handles: Vec::with_capacity(threads),
            }),
            name_prefix: name_prefix.to_string(),
            thread_count: threads,
        })
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    pub fn is_running(&self) -> bool {
        self.shared.queue.lock().running
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.queue.lock().disposed
    }

    pub fn queued_len(&self) -> usize {
        self.shared.queue.lock().jobs.len()
    }

    /// Spawn the worker threads. Idempotent while running; fails after dispose.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.workers.lock();
        {
            let mut queue = self.shared.queue.lock();
            if queue.disposed {
                return Err(PathfindError::Disposed);
            }
            if queue.running {
                return Ok(());
            }
            queue.running = true;
        }

        let processors: Vec<_> = workers.idle.drain(..).collect();
        let mut spawn_error = None;

        for (i, processor) in processors.into_iter().enumerate() {
            if spawn_error.is_some() {
                workers.idle.push(processor);
                continue;
            }

            // Hand the processor over only once the thread exists, so a failed spawn keeps it
            let (handoff, receiver) = bounded::<BoxedProcessor<P>>(1);
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", self.name_prefix, i))
                .spawn(move || receiver.recv().ok().map(|processor| worker_loop(&shared, processor)));

            match spawned {
                Ok(handle) => {
                    if let Err(returned) = handoff.send(processor) {
                        workers.idle.push(returned.into_inner());
                    }
                    workers.handles.push(handle);
                }
                Err(e) => {
                    error!("Failed to spawn pathfinding worker {}: {}", i, e);
                    workers.idle.push(processor);
                    spawn_error = Some(e);
                }
            }
        }

        if let Some(e) = spawn_error {
            self.shutdown_workers(&mut workers);
            return Err(PathfindError::ThreadSpawn(e));
        }

        info!("Started {} pathfinding worker threads", workers.handles.len());
        Ok(())
    }

    /// Let in-flight jobs finish and park the workers; queued jobs stay queued
    pub fn stop(&self) {
        let mut workers = self.workers.lock();
        if self.shutdown_workers(&mut workers) {
            info!("Stopped pathfinding workers, {} jobs still queued", self.queued_len());
        }
    }

    /// Stop for good. Queued jobs are cancelled along with their waiters, processors
    /// and their node networks are released.
    pub fn dispose(&self) {
        let mut workers = self.workers.lock();
        let discarded = {
            let mut queue = self.shared.queue.lock();
            if queue.disposed {
                return;
            }
            queue.disposed = true;
            std::mem::take(&mut queue.jobs)
        };

        self.shutdown_workers(&mut workers);
        workers.idle.clear();

        let cancelled = discarded.len();
        for job in discarded {
            job.discard();
        }
        info!("Disposed worker pool, cancelled {} queued jobs", cancelled);
    }

    /// Append a job and wake one idle worker. After dispose the job is cancelled instead.
    pub fn enqueue(&self, job: PathJob<P>) -> Result<()> {
        let mut queue = self.shared.queue.lock();
        if queue.disposed {
            drop(queue);
            job.discard();
            return Err(PathfindError::Disposed);
        }
        queue.jobs.push_back(job);
        drop(queue);
        self.shared.available.notify_one();
        Ok(())
    }

    /// Clear the running flag and join every worker; returns false if none were running
    fn shutdown_workers(&self, workers: &mut Workers<P>) -> bool {
        {
            let mut queue = self.shared.queue.lock();
            if !queue.running {
                return false;
            }
            queue.running = false;
        }
        self.shared.available.notify_all();

        for handle in workers.handles.drain(..) {
            match handle.join() {
                Ok(Some(processor)) => workers.idle.push(processor),
                Ok(None) => {}
                Err(_) => warn!("Pathfinding worker thread exited abnormally"),
            }
        }
        true
    }
}

impl<P: Send + Sync + 'static> Drop for WorkerPool<P> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Blocking dequeue loop; hands the processor back when the pool stops
fn worker_loop<P: Send + Sync + 'static>(
    shared: &PoolShared<P>,
    mut processor: BoxedProcessor<P>,
) -> BoxedProcessor<P> {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if !queue.running {
                    return processor;
                }
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                shared.available.wait(&mut queue);
            }
        };
        run_job(processor.as_mut(), job);
    }
}

/// Process one job; a panic fails that request and leaves the worker running
fn run_job<P: Send + Sync + 'static>(processor: &mut dyn PathProcessor<P>, job: PathJob<P>) {
    let request = Arc::clone(&job.request);
    // Unwinding drops the reservation, which fails any attached waiters
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| processor.process(job))) {
        let message = panic_message(payload.as_ref());
        error!(request = %request.id(), "Pathfinding worker fault: {}", message);
        request.complete(PathOutcome::Failed(FailureReason::WorkerFault(message)));
    }
}
