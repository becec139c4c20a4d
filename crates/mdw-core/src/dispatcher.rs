//! Post-commit dispatcher
//!
//! Transaction listener that runs after the enclosing transaction has
//! durably committed. It takes the bound [`WriteRequest`], submits the
//! privileged write to the worker pool and blocks the committing thread
//! until one of:
//! - the write finishes: success, whatever the write's own outcome
//! - the worker panics or is dropped: [`DispatchError::WorkerFailed`]
//! - the committing thread is interrupted: cancel, return success
//! - the timeout elapses: cancel, [`DispatchError::Timeout`]
//!
//! Cancellation is cooperative. A write whose transaction has already
//! started runs to commit or rollback regardless; a timeout does not mean
//! the write did not happen.

use crate::error::DispatchError;
use crate::executor::{PrivilegedWriter, WriteOutcome};
use crate::pool::WorkerPool;
use crate::registry::WriteRequest;
use crossbeam::channel::{self, RecvError};
use mdw_repo::{BoxError, CompletedTransaction, Interrupt, TransactionListener};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Requests submitted to the pool
    pub dispatched: u64,
    /// Writes that reported an outcome in time
    pub completed: u64,
    /// Waits that hit the timeout
    pub timed_out: u64,
    /// Waits ended by interrupting the committing thread
    pub interrupted: u64,
    /// Workers that panicked or were dropped
    pub worker_failures: u64,
    /// Cancellations requested (timeouts plus interrupts)
    pub cancellations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    timed_out: AtomicU64,
    interrupted: AtomicU64,
    worker_failures: AtomicU64,
    cancellations: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            interrupted: self.interrupted.load(Ordering::Relaxed),
            worker_failures: self.worker_failures.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}

/// Runs a transaction's bound write request after it commits
pub struct PostCommitDispatcher {
    key: String,
    writer: PrivilegedWriter,
    pool: Arc<WorkerPool>,
    timeout: Duration,
    counters: Counters,
}

impl fmt::Debug for PostCommitDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostCommitDispatcher")
            .field("key", &self.key)
            .field("pool", &self.pool.name())
            .field("timeout", &self.timeout)
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl PostCommitDispatcher {
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        writer: PrivilegedWriter,
        pool: Arc<WorkerPool>,
        timeout: Duration,
    ) -> Self {
        Self {
            key: key.into(),
            writer,
            pool,
            timeout,
            counters: Counters::default(),
        }
    }

    /// Key of the request slot and of the listener binding
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Take the request bound to `txn`, run it, and wait for it
    ///
    /// # Errors
    /// - `DispatchError::MissingRequest` if nothing was bound
    /// - `DispatchError::PoolShutdown` if the pool is stopped
    /// - `DispatchError::WorkerFailed` if the worker panicked
    /// - `DispatchError::Timeout` if the wait timed out
    pub fn dispatch(&self, txn: &mut CompletedTransaction) -> Result<(), DispatchError> {
        let Some(request) = txn.take_resource::<WriteRequest>(&self.key) else {
            tracing::error!(txn = %txn.id(), key = %self.key, "metadata write request missing after commit");
            return Err(DispatchError::MissingRequest { txn: txn.id() });
        };

        let node = request.node().clone();
        let cancel = Interrupt::new();
        let (done_tx, done_rx) = channel::bounded::<Result<WriteOutcome, String>>(1);

        let writer = self.writer.clone();
        let worker_cancel = cancel.clone();
        let handle = self
            .pool
            .submit(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    writer.execute(request, &worker_cancel)
                }))
                .map_err(|payload| panic_message(payload.as_ref()));
                if done_tx.send(result).is_err() {
                    tracing::trace!("dispatcher stopped waiting before the write finished");
                }
            })
            .inspect_err(|error| {
                tracing::error!(%node, %error, "could not submit metadata write");
            })?;
        bump(&self.counters.dispatched);

        let interrupt = txn.interrupt().clone();
        channel::select! {
            recv(done_rx) -> done => match done {
                Ok(Ok(outcome)) => {
                    bump(&self.counters.completed);
                    tracing::debug!(txn = %txn.id(), %node, outcome = outcome.label(), "metadata write completed");
                    Ok(())
                }
                Ok(Err(reason)) => {
                    bump(&self.counters.worker_failures);
                    tracing::error!(txn = %txn.id(), %node, %reason, "metadata worker panicked");
                    Err(DispatchError::WorkerFailed { node, reason })
                }
                Err(RecvError) => {
                    bump(&self.counters.worker_failures);
                    tracing::error!(txn = %txn.id(), %node, "metadata worker dropped before finishing");
                    Err(DispatchError::WorkerFailed {
                        node,
                        reason: "worker dropped before finishing".to_string(),
                    })
                }
            },
            recv(interrupt.signal()) -> _ => {
                cancel.interrupt();
                handle.abort();
                bump(&self.counters.interrupted);
                bump(&self.counters.cancellations);
                tracing::debug!(txn = %txn.id(), %node, "committing thread interrupted, metadata write cancelled");
                Ok(())
            },
            default(self.timeout) => {
                cancel.interrupt();
                handle.abort();
                bump(&self.counters.timed_out);
                bump(&self.counters.cancellations);
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(txn = %txn.id(), %node, timeout_ms, "metadata write timed out, cancellation requested");
                Err(DispatchError::Timeout { node, timeout_ms })
            },
        }
    }
}

impl TransactionListener for PostCommitDispatcher {
    fn after_commit(&self, txn: &mut CompletedTransaction) -> Result<(), BoxError> {
        self.dispatch(txn).map_err(Into::into)
    }

    fn after_rollback(&self, txn: &mut CompletedTransaction) {
        tracing::trace!(txn = %txn.id(), key = %self.key, "transaction rolled back, write request discarded");
    }
}
