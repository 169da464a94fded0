//! Worker pool for message handling and dialog processing
//!
//! A fixed set of workers draining one shared job queue. Submission
//! never blocks and never rejects; there is no back-pressure, the system
//! assumes load stays within capacity (known limitation).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Default number of workers
pub const DEFAULT_WORKERS: usize = 8;

/// Fixed-size pool executing submitted jobs to completion. Jobs are not
/// cancellable once started.
pub struct WorkerPool {
    tx: mpsc::UnboundedSender<Job>,
    submitted: AtomicU64,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Arc<WorkerPool> {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        for worker in 0..workers.max(1) {
            let rx = rx.clone();
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    match job {
                        Some(job) => job.await,
                        None => break,
                    }
                }
                debug!(worker, "worker stopped");
            });
        }
        Arc::new(WorkerPool { tx, submitted: AtomicU64::new(0) })
    }

    /// Queues a job for execution. Never blocks; silently dropped only
    /// if the pool has been shut down.
    pub fn submit<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(Box::pin(job));
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}
