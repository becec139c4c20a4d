//! Retrying transactions
//!
//! Runs a unit of work in a fresh transaction, committing on success and
//! rolling back on failure. Failures classified as retryable (write
//! conflicts) start over in a new transaction after a short backoff.

use crate::error::{RetryableError, TxnError};
use crate::identity::ExecutionContext;
use crate::manager::TransactionManager;
use crate::txn::{Transaction, TxnOptions};
use std::sync::Arc;
use std::time::Duration;

/// Retry limits and backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff before the first retry; doubles per retry
    pub min_backoff: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
}

impl RetryPolicy {
    #[inline]
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Backoff before retry number `retry` (1-based)
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.min_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 20,
            min_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(500),
        }
    }
}

/// Transaction facility with automatic retry on conflict
#[derive(Debug, Clone)]
pub struct RetryingTransactionHelper {
    manager: Arc<TransactionManager>,
    policy: RetryPolicy,
}

impl RetryingTransactionHelper {
    #[inline]
    #[must_use]
    pub fn new(manager: Arc<TransactionManager>) -> Self {
        Self::with_policy(manager, RetryPolicy::default())
    }

    #[inline]
    #[must_use]
    pub fn with_policy(manager: Arc<TransactionManager>, policy: RetryPolicy) -> Self {
        Self { manager, policy }
    }

    #[inline]
    #[must_use]
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    #[inline]
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `work` in a new transaction, retrying on retryable failures
    ///
    /// Every attempt opens an independent transaction under `context`. If
    /// `options` carries an interrupt, it is checked before each attempt.
    ///
    /// # Errors
    /// - The first non-retryable error from `work` or from commit
    /// - The last retryable error once retries are exhausted
    /// - `TxnError::Interrupted` (converted into `E`) if interrupted
    pub fn do_in_transaction<T, E, F>(
        &self,
        context: &ExecutionContext,
        options: TxnOptions,
        mut work: F,
    ) -> Result<T, E>
    where
        E: RetryableError + std::fmt::Display,
        F: FnMut(&mut Transaction) -> Result<T, E>,
    {
        let mut retry = 0u32;
        loop {
            if options
                .interrupt
                .as_ref()
                .is_some_and(crate::Interrupt::is_interrupted)
            {
                return Err(TxnError::Interrupted.into());
            }

            let mut txn = self.manager.begin(context.clone(), options.clone());
            let txn_id = txn.id();
            let err = match work(&mut txn) {
                Ok(value) => match self.manager.commit(txn) {
                    Ok(()) => return Ok(value),
                    Err(e) => E::from(e),
                },
                Err(e) => {
                    self.manager.rollback(txn);
                    e
                }
            };

            if !err.is_retryable() || retry >= self.policy.max_retries {
                return Err(err);
            }

            retry += 1;
            let backoff = self.policy.backoff(retry);
            tracing::debug!(txn = %txn_id, retry, ?backoff, error = %err, "retrying transaction");
            std::thread::sleep(backoff);
        }
    }
}
