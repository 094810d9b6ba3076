//! Bounded worker pool for asynchronous cache rebuilds.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Default rebuild worker count.
/// Override with REBUILD_POOL_SIZE environment variable
const DEFAULT_WORKER_COUNT: usize = 4;

/// Default pending-job queue depth.
const DEFAULT_QUEUE_DEPTH: usize = 64;

/// A rebuild job. Fire-and-forget: the job owns everything it needs and
/// reports nothing back to the submitter.
pub type RebuildJob = BoxFuture<'static, ()>;

/// Configuration for the rebuild pool. Zero values are clamped to 1.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    pub workers: usize,
    pub queue_depth: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let workers = std::env::var("REBUILD_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_WORKER_COUNT);

        ExecutorConfig {
            workers,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// Fixed-capacity pool running rebuild jobs off the caller's thread.
///
/// The pool is an explicitly constructed resource owned by the caching
/// layer's lifecycle: created at startup (inside a Tokio runtime), injected
/// where needed, drained by [`shutdown`](RebuildExecutor::shutdown) at
/// teardown. Worker count bounds concurrent rebuilds; the queue bounds
/// pending ones, and [`submit`](RebuildExecutor::submit) rejects rather
/// than blocks once both are full.
///
/// Each job runs on its own task awaited by a worker, so a panicking job is
/// logged and the worker keeps serving.
pub struct RebuildExecutor {
    tx: mpsc::Sender<RebuildJob>,
    workers: Vec<JoinHandle<()>>,
}

impl RebuildExecutor {
    /// Start the pool. Must be called within a Tokio runtime.
    pub fn new(config: ExecutorConfig) -> Self {
        let workers = config.workers.max(1);
        let queue_depth = config.queue_depth.max(1);

        let (tx, rx) = mpsc::channel::<RebuildJob>(queue_depth);
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers)
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        // Hold the receiver lock only while dequeuing, never
                        // while a job runs.
                        let job = { rx.lock().await.recv().await };
                        let Some(job) = job else { break };

                        if let Err(e) = tokio::spawn(job).await {
                            warn!("rebuild worker {}: job panicked: {}", worker_id, e);
                        }
                    }
                    debug!("rebuild worker {} stopped", worker_id);
                })
            })
            .collect();

        info!(
            "✓ rebuild executor started ({} workers, queue depth {})",
            workers, queue_depth
        );

        RebuildExecutor {
            tx,
            workers: handles,
        }
    }

    /// Enqueue a job without blocking.
    ///
    /// # Errors
    /// Returns `Error::ExecutorUnavailable` when the queue is full or the
    /// pool has been shut down. The caller keeps responsibility for any
    /// cleanup the rejected job would have performed.
    pub fn submit(&self, job: RebuildJob) -> Result<()> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                Error::ExecutorUnavailable("rebuild queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                Error::ExecutorUnavailable("rebuild executor is stopped".to_string())
            }
        })
    }

    /// Drain queued jobs and join every worker.
    pub async fn shutdown(self) {
        drop(self.tx);
        for handle in self.workers {
            if let Err(e) = handle.await {
                warn!("rebuild worker terminated abnormally: {}", e);
            }
        }
        info!("rebuild executor drained and stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn executor(workers: usize, queue_depth: usize) -> RebuildExecutor {
        RebuildExecutor::new(ExecutorConfig {
            workers,
            queue_depth,
        })
    }

    #[tokio::test]
    async fn test_runs_submitted_jobs() {
        let executor = executor(2, 8);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            executor
                .submit(Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        executor.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_single_worker_serializes_jobs() {
        let executor = executor(1, 8);
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            executor
                .submit(Box::pin(async move {
                    order.lock().await.push(i);
                }))
                .unwrap();
        }

        executor.shutdown().await;
        assert_eq!(*order.lock().await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_rejects_when_saturated() {
        let executor = executor(1, 1);

        // Block the single worker...
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();
        executor
            .submit(Box::pin(async move {
                let _ = gate_rx.await;
            }))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // ...fill the queue...
        executor.submit(Box::pin(async {})).unwrap();

        // ...and the next submission is rejected, not queued.
        let err = executor.submit(Box::pin(async {})).unwrap_err();
        assert!(matches!(err, Error::ExecutorUnavailable(_)));

        let _ = gate_tx.send(());
        executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_pending_jobs() {
        let executor = executor(1, 16);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            executor
                .submit(Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        executor.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        let executor = executor(1, 8);

        executor
            .submit(Box::pin(async {
                panic!("rebuild went sideways");
            }))
            .unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        executor
            .submit(Box::pin(async move {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        executor.shutdown().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_config_is_clamped() {
        let executor = executor(0, 0);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        executor
            .submit(Box::pin(async move {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        executor.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
