//! Worker pool for asynchronous producers.
//!
//! The pool is created explicitly at process start and shut down at process stop. Every
//! task it runs is tracked, so [`WorkerPool::shutdown`] can cancel the remaining producers
//! and wait for them to release their sessions.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::{Error, Result};

/// Configuration of a [`WorkerPool`].
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Maximum number of tasks running at once. `None` lets the pool grow with demand.
    pub max_concurrency: Option<usize>,
}

impl PoolConfig {
    /// Create a new `PoolConfig` without a concurrency limit.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of tasks running at once.
    #[inline]
    #[must_use]
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }
}

struct Inner {
    handle: Handle,
    tracker: TaskTracker,
    limiter: Option<Arc<Semaphore>>,
    shutdown: CancellationToken,
}

/// A pool of tokio tasks that runs producer work.
///
/// Cloning the pool clones the handle.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("tasks", &self.inner.tracker.len())
            .field("closed", &self.inner.tracker.is_closed())
            .finish()
    }
}

impl WorkerPool {
    /// Create a pool on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self::with_handle(Handle::current(), config)
    }

    /// Create a pool that spawns onto `handle`.
    #[must_use]
    pub fn with_handle(handle: Handle, config: PoolConfig) -> Self {
        let limiter = config
            .max_concurrency
            .map(|max| Arc::new(Semaphore::new(max.max(1))));
        Self {
            inner: Arc::new(Inner {
                handle,
                tracker: TaskTracker::new(),
                limiter,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Token cancelled when the pool starts shutting down.
    #[inline]
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    #[inline]
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.tracker.is_closed()
    }

    /// Number of tasks that have not finished yet.
    #[inline]
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Run `task` on the pool.
    ///
    /// When the pool has a concurrency limit the task waits for a free slot before it
    /// starts. Fails with [`Error::PoolShutdown`] once the pool is shutting down.
    pub fn spawn<F>(&self, task: F) -> Result<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.is_shutdown() {
            return Err(Error::PoolShutdown);
        }
        let limiter = self.inner.limiter.clone();
        let task = async move {
            let _permit = match limiter {
                Some(limiter) => limiter.acquire_owned().await.ok(),
                None => None,
            };
            task.await
        };
        Ok(self.inner.tracker.spawn_on(task, &self.inner.handle))
    }

    /// Stop accepting tasks, cancel the running ones and wait for them to finish.
    ///
    /// Waits at most `timeout` when one is given. Returns `true` if every task finished.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> bool {
        self.inner.tracker.close();
        self.inner.shutdown.cancel();
        tracing::info!(tasks = self.inner.tracker.len(), "worker pool shutting down");
        let finished = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.inner.tracker.wait())
                .await
                .is_ok(),
            None => {
                self.inner.tracker.wait().await;
                true
            }
        };
        if finished {
            tracing::info!("worker pool stopped");
        } else {
            tracing::warn!(
                tasks = self.inner.tracker.len(),
                "worker pool stopped with tasks still running"
            );
        }
        finished
    }
}
