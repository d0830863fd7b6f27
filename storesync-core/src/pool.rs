//! Bounded worker pool with caller-runs backpressure.
//!
//! A fixed number of worker tasks drain one bounded queue. When the
//! queue is full, the submitting task runs the job itself instead of
//! blocking or dropping it: admission is guaranteed and the pending set
//! never grows past the bound, at the cost of submitter throughput.

use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{debug, warn};

/// Unit of work executed by the pool.
pub type Job = BoxFuture<'static, ()>;

/// Fixed-size pool of worker tasks behind a bounded queue.
pub struct BoundedWorkerPool {
    job_tx: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl BoundedWorkerPool {
    pub fn new(workers: usize, queue_bound: usize) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<Job>(queue_bound);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let workers = (0..workers)
            .map(|worker_id| {
                let job_rx = job_rx.clone();
                tokio::spawn(async move {
                    loop {
                        // Hold the receiver lock only while dequeuing so
                        // other workers can pull jobs concurrently.
                        let job = { job_rx.lock().await.recv().await };
                        match job {
                            Some(job) => job.await,
                            None => break,
                        }
                    }
                    debug!(worker_id, "sync worker drained");
                })
            })
            .collect();

        Self { job_tx, workers }
    }

    /// Submits a job for execution.
    ///
    /// On a full queue the job runs inline on the submitting task — the
    /// backpressure valve. A submitted job is therefore always executed
    /// exactly once.
    pub async fn submit(&self, job: Job) {
        match self.job_tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                debug!("work queue full - running job on submitter");
                job.await;
            }
            Err(TrySendError::Closed(job)) => {
                warn!("worker pool closed - running job on submitter");
                job.await;
            }
        }
    }

    /// Graceful shutdown: closes the queue, waits up to `grace` for the
    /// workers to drain, then aborts stragglers.
    pub async fn shutdown(self, grace: Duration) {
        let Self { job_tx, mut workers } = self;
        drop(job_tx);

        if time::timeout(grace, join_all(workers.iter_mut()))
            .await
            .is_err()
        {
            warn!(
                grace_secs = grace.as_secs(),
                "worker pool did not drain in time - aborting workers"
            );
            for worker in &workers {
                worker.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(counter: Arc<AtomicUsize>) -> Job {
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_all_jobs_execute() {
        let pool = BoundedWorkerPool::new(4, 16);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            pool.submit(counting_job(counter.clone())).await;
        }
        pool.shutdown(Duration::from_secs(5)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn test_backpressure_never_drops() {
        // One worker, tiny queue: most submissions overflow and must run
        // inline on the submitter.
        let pool = BoundedWorkerPool::new(1, 2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..30 {
            pool.submit(counting_job(counter.clone())).await;
        }
        pool.shutdown(Duration::from_secs(5)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 30);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_stuck_workers() {
        let pool = BoundedWorkerPool::new(1, 4);
        pool.submit(Box::pin(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }))
        .await;

        // Must return promptly rather than waiting for the stuck job.
        let started = std::time::Instant::now();
        pool.shutdown(Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
