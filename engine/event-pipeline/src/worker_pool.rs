//! Bounded background pool for best-effort sink work
//!
//! Jobs wait in a bounded queue and run with at most `workers` in flight.
//! A full queue rejects the submission instead of growing without bound, so
//! a slow secondary sink cannot exhaust memory on the ingestion path.

use crate::config::BackgroundPoolConfig;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Job = BoxFuture<'static, ()>;

#[derive(Debug, Default)]
struct PoolCounters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
}

struct PoolInner {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<PoolCounters>,
}

/// Cloneable handle to the background pool. Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct BackgroundPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for BackgroundPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundPool").field("stats", &self.stats()).finish()
    }
}

impl BackgroundPool {
    pub fn new(config: &BackgroundPoolConfig) -> Self {
        let workers = config.workers.max(1);
        let (sender, receiver) = mpsc::channel(config.queue_depth.max(1));
        let counters = Arc::new(PoolCounters::default());

        let dispatcher = tokio::spawn(dispatch(receiver, workers, counters.clone()));
        info!(
            "Background pool started ({} workers, queue depth {})",
            workers, config.queue_depth
        );

        Self {
            inner: Arc::new(PoolInner {
                sender: Mutex::new(Some(sender)),
                dispatcher: Mutex::new(Some(dispatcher)),
                counters,
            }),
        }
    }

    /// Queue a job. Returns `false` when the queue is full or the pool is shut down.
    pub fn submit<F>(&self, name: &str, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self.inner.sender.lock().clone();
        let Some(sender) = sender else {
            warn!("Background pool is shut down, dropping {} job", name);
            self.inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        match sender.try_send(job.boxed()) {
            Ok(()) => {
                self.inner.counters.submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Background queue is full, rejecting {} job", name);
                self.inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Background queue is closed, dropping {} job", name);
                self.inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let counters = &self.inner.counters;
        PoolStats {
            submitted: counters.submitted.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting jobs and wait for queued and running jobs to finish.
    /// Returns `false` if the drain did not complete within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.inner.sender.lock().take();
        let dispatcher = self.inner.dispatcher.lock().take();

        let Some(dispatcher) = dispatcher else {
            return true;
        };

        match tokio::time::timeout(timeout, dispatcher).await {
            Ok(_) => {
                info!("Background pool drained");
                true
            }
            Err(_) => {
                warn!("Background pool did not drain within {:?}", timeout);
                false
            }
        }
    }
}

async fn dispatch(mut receiver: mpsc::Receiver<Job>, workers: usize, counters: Arc<PoolCounters>) {
    let permits = Arc::new(Semaphore::new(workers));

    while let Some(job) = receiver.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let counters = counters.clone();
        tokio::spawn(async move {
            job.await;
            counters.completed.fetch_add(1, Ordering::Relaxed);
            drop(permit);
        });
    }

    // Wait for in-flight jobs
    let _ = permits.acquire_many(workers as u32).await;
    debug!("Background dispatcher exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn config(workers: usize, queue_depth: usize) -> BackgroundPoolConfig {
        BackgroundPoolConfig { workers, queue_depth }
    }

    #[tokio::test]
    async fn test_jobs_run_and_drain_on_shutdown() {
        let pool = BackgroundPool::new(&config(2, 16));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let done = done.clone();
            assert!(pool.submit("count", async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert!(pool.shutdown(Duration::from_secs(5)).await);
        assert_eq!(done.load(Ordering::SeqCst), 10);
        assert_eq!(pool.stats().completed, 10);
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let pool = BackgroundPool::new(&config(1, 1));
        let gate = Arc::new(Notify::new());

        // Occupies the only worker
        let blocker = gate.clone();
        assert!(pool.submit("block", async move { blocker.notified().await }));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Held by the dispatcher waiting for a permit, then the queue slot
        assert!(pool.submit("waiting", async {}));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(pool.submit("queued", async {}));
        assert!(!pool.submit("overflow", async {}));
        assert_eq!(pool.stats().rejected, 1);

        gate.notify_one();
        assert!(pool.shutdown(Duration::from_secs(5)).await);
        assert_eq!(pool.stats().completed, 3);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let pool = BackgroundPool::new(&config(1, 4));
        assert!(pool.shutdown(Duration::from_secs(1)).await);
        assert!(!pool.submit("late", async {}));
        assert!(pool.shutdown(Duration::from_secs(1)).await);
    }
}
