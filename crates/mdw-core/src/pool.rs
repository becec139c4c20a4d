//! Worker pool
//!
//! The blocking-thread pool of a dedicated tokio runtime. Threads are
//! spawned on demand up to `max_workers` and reaped when idle, so the pool
//! grows to meet concurrent demand without a queueing limit of its own.
//!
//! Created when a service starts; [`WorkerPool::shutdown`] waits up to the
//! configured grace period for in-flight work.

use crate::config::PoolConfig;
use crate::error::DispatchError;
use parking_lot::RwLock;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;

/// Growable pool running blocking units of work
#[derive(Debug)]
pub struct WorkerPool {
    name: String,
    runtime: RwLock<Option<Runtime>>,
    grace: Duration,
}

impl WorkerPool {
    /// Start a pool named after its owning service
    ///
    /// # Errors
    /// `DispatchError::PoolStart` if the runtime cannot be built.
    pub fn start(name: &str, config: &PoolConfig) -> Result<Self, DispatchError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.max_workers.max(1))
            .thread_name(format!("{name}-worker"))
            .enable_time()
            .build()?;

        tracing::debug!(pool = %name, max_workers = config.max_workers, "worker pool started");
        Ok(Self {
            name: name.to_string(),
            runtime: RwLock::new(Some(runtime)),
            grace: config.shutdown_grace(),
        })
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.runtime.read().is_some()
    }

    /// Run `work` on a pool thread
    ///
    /// Aborting the returned handle cancels the work only if it has not
    /// started yet.
    ///
    /// # Errors
    /// `DispatchError::PoolShutdown` once the pool has been shut down.
    pub fn submit<F, R>(&self, work: F) -> Result<JoinHandle<R>, DispatchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let runtime = self.runtime.read();
        let runtime = runtime.as_ref().ok_or(DispatchError::PoolShutdown)?;
        Ok(runtime.spawn_blocking(work))
    }

    /// Stop accepting work and wait up to the grace period for in-flight work
    pub fn shutdown(&self) {
        let Some(runtime) = self.runtime.write().take() else {
            return;
        };
        tracing::info!(pool = %self.name, grace_ms = self.grace.as_millis(), "worker pool shutting down");
        runtime.shutdown_timeout(self.grace);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;

    fn pool() -> WorkerPool {
        WorkerPool::start(
            "test",
            &PoolConfig {
                max_workers: 4,
                shutdown_grace_ms: 1_000,
            },
        )
        .unwrap()
    }

    #[test]
    fn runs_submitted_work() {
        let pool = pool();
        let (tx, rx) = channel::bounded(1);
        pool.submit(move || tx.send(21 * 2).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn runs_work_concurrently() {
        let pool = pool();
        let (tx, rx) = channel::unbounded();
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(3));

        for i in 0..3 {
            let tx = tx.clone();
            let barrier = std::sync::Arc::clone(&barrier);
            pool.submit(move || {
                barrier.wait();
                tx.send(i).unwrap();
            })
            .unwrap();
        }

        let mut seen: Vec<i32> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, [0, 1, 2]);
    }

    #[test]
    fn rejects_work_after_shutdown() {
        let pool = pool();
        pool.shutdown();
        assert!(!pool.is_running());
        assert!(matches!(pool.submit(|| ()), Err(DispatchError::PoolShutdown)));
        pool.shutdown();
    }
}
