//! Bounded worker pool for channel deliveries.
//!
//! Producers enqueue without blocking. When the queue is full the oldest
//! waiting task is discarded to make room, so a stalled backend costs stale
//! notifications rather than producer latency. A panicking task is contained
//! and logged; the worker that ran it keeps going.

use crate::application::metrics::Metrics;
use crate::error::ShutdownError;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// A queued unit of delivery work.
pub struct Job {
    label: String,
    task: BoxFuture<'static, ()>,
}

impl Job {
    /// Wrap a future; `label` names it in logs.
    pub fn new(label: impl Into<String>, task: BoxFuture<'static, ()>) -> Self {
        Self {
            label: label.into(),
            task,
        }
    }

    /// Name used in logs.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("label", &self.label).finish()
    }
}

#[derive(Debug)]
struct Shared {
    queue: Mutex<VecDeque<Job>>,
    capacity: usize,
    available: Notify,
    closed: AtomicBool,
    metrics: Metrics,
}

/// Fixed set of tokio tasks draining a bounded job queue.
#[derive(Debug)]
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks on `runtime` sharing a queue of `capacity` jobs.
    pub fn start(workers: usize, capacity: usize, metrics: Metrics, runtime: &Handle) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: Notify::new(),
            closed: AtomicBool::new(false),
            metrics,
        });

        let handles = (0..workers)
            .map(|id| runtime.spawn(worker_loop(Arc::clone(&shared), id)))
            .collect();

        Self {
            shared,
            workers: Mutex::new(handles),
        }
    }

    /// Enqueue a job without blocking.
    ///
    /// Returns `false` if the pool is shut down and the job was dropped.
    pub fn submit(&self, job: Job) -> bool {
        if self.shared.closed.load(Ordering::Acquire) {
            debug!(task = %job.label, "worker pool closed, dropping task");
            return false;
        }

        let discarded = {
            let mut queue = self.shared.queue.lock();
            let discarded = if queue.len() >= self.shared.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(job);
            discarded
        };

        if let Some(old) = discarded {
            self.shared.metrics.record_discarded();
            warn!(
                task = %old.label,
                capacity = self.shared.capacity,
                "notification queue full, discarding oldest task"
            );
        }

        self.shared.available.notify_one();
        true
    }

    /// Jobs waiting for a worker.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Check if the pool stopped accepting work.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stop accepting work, let workers finish the queue, and wait for them.
    ///
    /// Calling this more than once is harmless.
    pub async fn shutdown(&self) -> Result<(), ShutdownError> {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.available.notify_waiters();

        let handles = std::mem::take(&mut *self.workers.lock());
        let mut result = Ok(());
        for handle in handles {
            if let Err(err) = handle.await {
                result = Err(ShutdownError::from(err));
            }
        }
        result
    }
}

impl Drop for WorkerPool {
    // Without a shutdown call the workers would park on `available` forever.
    // They still finish whatever is queued before exiting.
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.available.notify_waiters();
    }
}

async fn worker_loop(shared: Arc<Shared>, id: usize) {
    loop {
        // Register interest before checking the queue so a wakeup between the
        // check and the await is not lost.
        let notified = shared.available.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let job = shared.queue.lock().pop_front();
        match job {
            Some(job) => {
                let Job { label, task } = job;
                if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                    shared.metrics.record_delivery_failed();
                    error!(worker = id, task = %label, "notification task panicked");
                }
            }
            None => {
                if shared.closed.load(Ordering::Acquire) {
                    debug!(worker = id, "notification worker stopped");
                    return;
                }
                notified.await;
            }
        }
    }
}
