//! Privileged retry executor
//!
//! Runs on a worker thread. Each request gets a fresh read-write
//! transaction under the system identity, retried on write conflicts. Inside
//! it the node is gated, its failure policy read, repository behaviours
//! suppressed, and the sequencer invoked. The request's callback runs once
//! the transaction has concluded, outside of it.

use crate::error::MetadataError;
use crate::model;
use crate::processor::NodeMetadataProcessor;
use crate::registry::WriteRequest;
use crate::sequencer::{SequenceOutcome, WriteSequencer};
use crate::verifier::NodeVerifier;
use mdw_repo::{
    ExecutionContext, Interrupt, NodeRef, RetryableError, RetryingTransactionHelper, Transaction,
    TxnOptions,
};
use std::sync::Arc;

/// What to do when the write itself fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Roll back the write's transaction and report failure
    #[default]
    Raise,
    /// Log, commit whatever else the transaction holds, carry on
    LogAndContinue,
}

impl FailurePolicy {
    /// Policy for a node's `mdw:failOnUnsupported` flag; absent means raise
    #[inline]
    #[must_use]
    pub fn from_flag(fail_on_unsupported: Option<bool>) -> Self {
        match fail_on_unsupported {
            Some(false) => Self::LogAndContinue,
            _ => Self::Raise,
        }
    }
}

/// Final outcome of one privileged write, handed to the callback
#[derive(Debug)]
pub enum WriteOutcome {
    /// Properties saved into the artifact
    Written { properties: usize },
    /// The verification gate declined the node
    Declined,
    /// A property write failed; the session was aborted, nothing saved
    Aborted { property: String, reason: String },
    /// The write failed but the node's policy tolerates it
    Tolerated(MetadataError),
    /// The write failed; its transaction rolled back
    Failed(MetadataError),
    /// Cancelled before the write's transaction started
    Cancelled,
}

impl WriteOutcome {
    #[inline]
    #[must_use]
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }

    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Written { .. } => "written",
            Self::Declined => "declined",
            Self::Aborted { .. } => "aborted",
            Self::Tolerated(_) => "tolerated",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Runs write requests under the system identity
#[derive(Debug, Clone)]
pub struct PrivilegedWriter {
    helper: RetryingTransactionHelper,
    verifier: Arc<dyn NodeVerifier>,
    processor: Arc<dyn NodeMetadataProcessor>,
    sequencer: WriteSequencer,
}

impl PrivilegedWriter {
    #[must_use]
    pub fn new(
        helper: RetryingTransactionHelper,
        verifier: Arc<dyn NodeVerifier>,
        processor: Arc<dyn NodeMetadataProcessor>,
        sequencer: WriteSequencer,
    ) -> Self {
        Self {
            helper,
            verifier,
            processor,
            sequencer,
        }
    }

    #[inline]
    #[must_use]
    pub fn sequencer(&self) -> &WriteSequencer {
        &self.sequencer
    }

    /// Run one request to completion, then invoke its callback
    ///
    /// Never fails: every error is contained in the returned outcome.
    /// `cancel` is checked before each transaction attempt.
    pub fn execute(&self, request: WriteRequest, cancel: &Interrupt) -> WriteOutcome {
        let (id, node, callback) = request.into_parts();
        let outcome = self.run(&node, cancel);
        tracing::debug!(request = %id, %node, outcome = outcome.label(), "metadata write finished");

        if let Some(callback) = callback {
            callback(&outcome);
        }
        outcome
    }

    fn run(&self, node: &NodeRef, cancel: &Interrupt) -> WriteOutcome {
        let context = ExecutionContext::system();
        let options = TxnOptions::read_write().with_interrupt(cancel.clone());

        match self
            .helper
            .do_in_transaction(&context, options, |txn| self.update(txn, node))
        {
            Ok(outcome) => outcome,
            Err(err) if err.is_interrupted() => {
                tracing::debug!(%node, "metadata write cancelled before start");
                WriteOutcome::Cancelled
            }
            Err(err) if err.is_double_fault() => {
                tracing::error!(%node, error = %err, "metadata write left the artifact session unresolved");
                WriteOutcome::Failed(err)
            }
            Err(err) => {
                tracing::error!(%node, error = %err, "failed to write metadata properties");
                WriteOutcome::Failed(err)
            }
        }
    }

    fn update(&self, txn: &mut Transaction, node: &NodeRef) -> Result<WriteOutcome, MetadataError> {
        if !self.verifier.verify(txn, node) {
            tracing::trace!(%node, txn = %txn.id(), "node declined by verifier");
            return Ok(WriteOutcome::Declined);
        }

        let policy = FailurePolicy::from_flag(
            txn.property(node, &model::prop_fail_on_unsupported())?
                .and_then(|v| v.as_bool()),
        );

        let behaviours = txn.behaviours();
        let _suppressed = behaviours.disable();

        let properties = self.processor.process(txn, node)?;
        match self.sequencer.write(txn, node, &properties) {
            Ok(SequenceOutcome::Saved { properties }) => {
                tracing::debug!(%node, properties, "successfully wrote metadata properties");
                Ok(WriteOutcome::Written { properties })
            }
            Ok(SequenceOutcome::Aborted { property, reason }) => {
                Ok(WriteOutcome::Aborted { property, reason })
            }
            Err(err) if err.is_retryable() => Err(err),
            Err(err) if err.is_write_failure() && policy == FailurePolicy::LogAndContinue => {
                tracing::error!(%node, error = %err, "could not write metadata properties, continuing");
                Ok(WriteOutcome::Tolerated(err))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_from_flag() {
        assert_eq!(FailurePolicy::from_flag(None), FailurePolicy::Raise);
        assert_eq!(FailurePolicy::from_flag(Some(true)), FailurePolicy::Raise);
        assert_eq!(
            FailurePolicy::from_flag(Some(false)),
            FailurePolicy::LogAndContinue
        );
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(WriteOutcome::Declined.label(), "declined");
        assert!(WriteOutcome::Written { properties: 1 }.is_written());
        assert!(!WriteOutcome::Cancelled.is_failed());
    }
}
