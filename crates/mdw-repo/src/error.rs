//! Error types for the reference host
//!
//! Covers:
//! - Transaction lifecycle failures (conflicts, read-only violations)
//! - Post-commit listener failures
//! - Namespace resolution of prefixed attribute names

use crate::node::NodeRef;
use crate::txn::TxnId;

/// Boxed error used at trait-object seams (listeners, callbacks)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Transaction errors
#[derive(Debug, thiserror::Error)]
pub enum TxnError {
    /// Another transaction committed a change to the node first
    #[error("write conflict on {node} (expected version {expected}, found {found})")]
    Conflict {
        node: NodeRef,
        expected: u64,
        found: u64,
    },

    /// Node does not exist
    #[error("node not found: {0}")]
    NodeNotFound(NodeRef),

    /// Write attempted in a read-only transaction
    #[error("transaction {0} is read-only")]
    ReadOnly(TxnId),

    /// Caller asked the transaction to stop before it started
    #[error("transaction interrupted before start")]
    Interrupted,

    /// Commit was durable but a post-commit listener failed
    #[error("post-commit listener '{key}' failed after {txn} committed: {source}")]
    AfterCommit {
        txn: TxnId,
        key: String,
        #[source]
        source: BoxError,
    },
}

impl TxnError {
    /// Check if a fresh attempt may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Check if the transaction's own changes are durable despite the error
    #[inline]
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::AfterCommit { .. })
    }
}

/// Errors a retrying transaction can classify
///
/// Work run through [`crate::RetryingTransactionHelper`] returns its own error
/// type; the helper only needs to know whether to try again.
pub trait RetryableError: From<TxnError> {
    /// Whether the failed attempt should be retried
    fn is_retryable(&self) -> bool;
}

impl RetryableError for TxnError {
    fn is_retryable(&self) -> bool {
        TxnError::is_retryable(self)
    }
}

/// Namespace resolution errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamespaceError {
    /// Prefix is not registered
    #[error("namespace prefix '{prefix}' is not mapped to a URI")]
    UnknownPrefix { prefix: String },

    /// Name is neither `prefix:local` nor `{uri}local`
    #[error("malformed qualified name '{0}'")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_retryable() {
        let err = TxnError::Conflict {
            node: NodeRef::generate(),
            expected: 1,
            found: 2,
        };
        assert!(err.is_retryable());
        assert!(!TxnError::Interrupted.is_retryable());
        assert!(!TxnError::NodeNotFound(NodeRef::generate()).is_retryable());
    }

    #[test]
    fn after_commit_reports_committed() {
        let err = TxnError::AfterCommit {
            txn: TxnId(7),
            key: "listener".to_string(),
            source: "boom".into(),
        };
        assert!(err.is_committed());
        assert!(err.to_string().contains("txn-7"));
    }
}
