//! Bounded worker pool for job continuations.
//!
//! `core_workers` long-lived workers drain a queue of `queue_capacity`
//! pending tasks. Once the queue is full, up to `max_workers - core_workers`
//! extra tasks run on overflow workers. Past that, [`WorkerPool::try_reserve`]
//! fails so admission can push back instead of queueing without limit.
//!
//! Capacity is reserved before the job record is written and only consumed
//! by [`Reservation::dispatch`]; dropping a reservation frees it again.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub core_workers: usize,
    pub max_workers: usize,
    pub queue_capacity: usize,
    pub shutdown_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_workers: 5,
            max_workers: 10,
            queue_capacity: 100,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    // At least one core worker and one queue slot; max never below core.
    fn normalized(mut self) -> Self {
        self.core_workers = self.core_workers.max(1);
        self.max_workers = self.max_workers.max(self.core_workers);
        self.queue_capacity = self.queue_capacity.max(1);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("worker pool is saturated")]
    Saturated,

    #[error("worker pool is shut down")]
    ShutDown,
}

/// Point-in-time view of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub core_workers: usize,
    pub max_workers: usize,
    pub queue_capacity: usize,
    pub queued: usize,
    pub overflow_active: usize,
}

/// Capacity held for one task that has not been dispatched yet.
pub enum Reservation {
    Queued(mpsc::OwnedPermit<Task>),
    Overflow(OwnedSemaphorePermit),
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reservation::Queued(_) => write!(f, "Reservation::Queued"),
            Reservation::Overflow(_) => write!(f, "Reservation::Overflow"),
        }
    }
}

impl Reservation {
    /// Hands the task to the slot this reservation holds.
    pub fn dispatch<F>(self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self {
            Reservation::Queued(permit) => {
                permit.send(Box::pin(task));
            }
            Reservation::Overflow(permit) => {
                debug!("running task on overflow worker");
                tokio::spawn(async move {
                    run_guarded(Box::pin(task)).await;
                    drop(permit);
                });
            }
        }
    }
}

pub struct WorkerPool {
    config: PoolConfig,
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    overflow: Arc<Semaphore>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl WorkerPool {
    /// Spawns the core workers. Must be called from within a tokio runtime.
    pub fn start(config: PoolConfig) -> Self {
        let config = config.normalized();
        let (tx, rx) = mpsc::channel::<Task>(config.queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..config.core_workers)
            .map(|index| {
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        let next = { rx.lock().await.recv().await };
                        match next {
                            Some(task) => run_guarded(task).await,
                            None => break,
                        }
                    }
                    debug!(worker = index, "render worker stopped");
                })
            })
            .collect();

        info!(
            core = config.core_workers,
            max = config.max_workers,
            queue = config.queue_capacity,
            "render worker pool started"
        );

        Self {
            overflow: Arc::new(Semaphore::new(config.max_workers - config.core_workers)),
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            config,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn sender(&self) -> Option<mpsc::Sender<Task>> {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Reserves room for one task without blocking.
    pub fn try_reserve(&self) -> Result<Reservation, PoolError> {
        let sender = self.sender().ok_or(PoolError::ShutDown)?;
        match sender.try_reserve_owned() {
            Ok(permit) => Ok(Reservation::Queued(permit)),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PoolError::ShutDown),
            Err(mpsc::error::TrySendError::Full(_)) => Arc::clone(&self.overflow)
                .try_acquire_owned()
                .map(Reservation::Overflow)
                .map_err(|_| {
                    warn!("render worker pool saturated, rejecting task");
                    PoolError::Saturated
                }),
        }
    }

    pub fn stats(&self) -> PoolStats {
        let queued = self
            .sender()
            .map(|s| self.config.queue_capacity - s.capacity())
            .unwrap_or(0);
        let overflow_total = self.config.max_workers - self.config.core_workers;
        PoolStats {
            core_workers: self.config.core_workers,
            max_workers: self.config.max_workers,
            queue_capacity: self.config.queue_capacity,
            queued,
            overflow_active: overflow_total - self.overflow.available_permits(),
        }
    }

    /// Stops accepting tasks and waits up to `shutdown_grace` for queued and
    /// running tasks to finish.
    pub async fn shutdown(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take(),
        );
        let workers: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        let overflow_total = (self.config.max_workers - self.config.core_workers) as u32;
        let overflow = Arc::clone(&self.overflow);

        let drain = async move {
            for worker in workers {
                let _ = worker.await;
            }
            if overflow_total > 0 {
                let _ = overflow.acquire_many(overflow_total).await;
            }
        };

        match tokio::time::timeout(self.config.shutdown_grace, drain).await {
            Ok(()) => info!("render worker pool drained"),
            Err(_) => warn!(
                grace_secs = self.config.shutdown_grace.as_secs(),
                "render worker pool did not drain before the grace period"
            ),
        }
    }
}

// A panicking task must not take its worker down with it.
async fn run_guarded(task: Task) {
    if let Err(e) = tokio::spawn(task).await {
        error!(error = %e, "render task panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Notify, oneshot};

    fn small_pool() -> WorkerPool {
        WorkerPool::start(PoolConfig {
            core_workers: 1,
            max_workers: 2,
            queue_capacity: 1,
            shutdown_grace: Duration::from_secs(5),
        })
    }

    #[tokio::test]
    async fn runs_dispatched_tasks() {
        let pool = WorkerPool::start(PoolConfig::default());
        let (tx, rx) = oneshot::channel();
        pool.try_reserve().unwrap().dispatch(async move {
            let _ = tx.send(42);
        });
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn queue_then_overflow_then_reject() {
        let pool = small_pool();
        let release = Arc::new(Notify::new());
        let done = Arc::new(AtomicUsize::new(0));

        // Occupy the single core worker.
        let (started_tx, started_rx) = oneshot::channel();
        {
            let release = Arc::clone(&release);
            let done = Arc::clone(&done);
            pool.try_reserve().unwrap().dispatch(async move {
                let _ = started_tx.send(());
                release.notified().await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        started_rx.await.unwrap();

        let queued = pool.try_reserve().unwrap();
        assert!(matches!(queued, Reservation::Queued(_)));

        let overflow = pool.try_reserve().unwrap();
        assert!(matches!(overflow, Reservation::Overflow(_)));

        assert_eq!(pool.try_reserve().unwrap_err(), PoolError::Saturated);

        let stats = pool.stats();
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.overflow_active, 1);

        // Releasing a reservation frees its slot.
        drop(overflow);
        let overflow = pool.try_reserve().unwrap();
        assert!(matches!(overflow, Reservation::Overflow(_)));

        let done_q = Arc::clone(&done);
        queued.dispatch(async move {
            done_q.fetch_add(1, Ordering::SeqCst);
        });
        let done_o = Arc::clone(&done);
        overflow.dispatch(async move {
            done_o.fetch_add(1, Ordering::SeqCst);
        });

        release.notify_one();
        pool.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_work() {
        let pool = small_pool();
        pool.shutdown().await;
        assert_eq!(pool.try_reserve().unwrap_err(), PoolError::ShutDown);
    }

    #[tokio::test]
    async fn panicking_task_does_not_kill_worker() {
        let pool = WorkerPool::start(PoolConfig {
            core_workers: 1,
            max_workers: 1,
            queue_capacity: 1,
            shutdown_grace: Duration::from_secs(5),
        });
        pool.try_reserve().unwrap().dispatch(async {
            panic!("boom");
        });

        let (tx, rx) = oneshot::channel();
        // Wait for a queue slot in case the panicking task is still queued.
        let reservation = loop {
            if let Ok(r) = pool.try_reserve() {
                break r;
            }
            tokio::task::yield_now().await;
        };
        reservation.dispatch(async move {
            let _ = tx.send(());
        });
        rx.await.unwrap();
    }

    #[test]
    fn config_is_normalized() {
        let config = PoolConfig {
            core_workers: 0,
            max_workers: 0,
            queue_capacity: 0,
            shutdown_grace: Duration::from_secs(1),
        }
        .normalized();
        assert_eq!(config.core_workers, 1);
        assert_eq!(config.max_workers, 1);
        assert_eq!(config.queue_capacity, 1);
    }
}
