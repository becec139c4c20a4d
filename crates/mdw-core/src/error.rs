//! Error types for the metadata writer
//!
//! Split by concern:
//! - [`ContentError`]: artifact adapter failures (open, write, save, abort)
//! - [`MetadataError`]: failures of one privileged write
//! - [`DispatchError`]: post-commit dispatch failures seen by the committer
//! - [`ConfigError`]: startup configuration failures

use mdw_repo::{NodeRef, RetryableError, TxnError, TxnId};
use std::path::PathBuf;

/// Artifact adapter errors
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// No handler for the artifact's format
    #[error("unsupported mimetype '{mimetype}' for {node}")]
    Unsupported { node: NodeRef, mimetype: String },

    /// Node carries no artifact to write into
    #[error("node {0} has no artifact")]
    NoArtifact(NodeRef),

    /// Artifact I/O failed
    #[error("artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// One property could not be written
    #[error("could not write property '{property}': {reason}")]
    Write { property: String, reason: String },

    /// Finalizing the session failed
    #[error("could not save artifact: {0}")]
    Save(String),

    /// Discarding the session failed
    #[error("could not abort artifact session: {0}")]
    Abort(String),

    /// Host transaction rejected the operation
    #[error(transparent)]
    Txn(#[from] TxnError),
}

impl ContentError {
    #[inline]
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

/// Failures of one privileged metadata write
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// Artifact session could not be opened
    #[error("could not open artifact of {node}: {source}")]
    Open {
        node: NodeRef,
        #[source]
        source: ContentError,
    },

    /// Every property was written but the save failed
    #[error("could not save artifact of {node}: {source}")]
    Save {
        node: NodeRef,
        #[source]
        source: ContentError,
    },

    /// A property write failed and aborting the session failed too
    #[error("double fault on {node}: abort after failed write of '{property}' also failed: {source}")]
    AbortFailed {
        node: NodeRef,
        property: String,
        #[source]
        source: ContentError,
    },

    /// Host transaction error
    #[error(transparent)]
    Txn(#[from] TxnError),
}

impl MetadataError {
    /// Failure of the write itself, subject to the node's failure policy
    #[inline]
    #[must_use]
    pub fn is_write_failure(&self) -> bool {
        matches!(self, Self::Open { .. } | Self::Save { .. })
    }

    /// Abort of a failed session failed; never tolerated
    #[inline]
    #[must_use]
    pub fn is_double_fault(&self) -> bool {
        matches!(self, Self::AbortFailed { .. })
    }

    /// Unsupported artifact format
    #[inline]
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Open { source, .. } if source.is_unsupported())
    }

    /// Cooperative cancellation stopped the write before it started
    #[inline]
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Txn(TxnError::Interrupted))
    }
}

impl RetryableError for MetadataError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Txn(e)
            | Self::Open {
                source: ContentError::Txn(e),
                ..
            }
            | Self::Save {
                source: ContentError::Txn(e),
                ..
            } => e.is_retryable(),
            _ => false,
        }
    }
}

/// Post-commit dispatch errors, surfaced to the committing thread
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Listener fired but no request was bound to the transaction
    #[error("no write request bound to {txn} at post-commit")]
    MissingRequest { txn: TxnId },

    /// The write did not finish in time; cancellation was requested
    #[error("metadata write for {node} did not finish within {timeout_ms}ms")]
    Timeout { node: NodeRef, timeout_ms: u64 },

    /// The unit of work panicked or was dropped before finishing
    #[error("metadata worker for {node} failed: {reason}")]
    WorkerFailed { node: NodeRef, reason: String },

    /// Worker pool already stopped
    #[error("worker pool is shut down")]
    PoolShutdown,

    /// Worker pool could not be started
    #[error("could not start worker pool: {0}")]
    PoolStart(#[from] std::io::Error),
}

impl DispatchError {
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("could not read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`crate::WriterConfig`]
    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config parsed but is unusable
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Main error type for service construction
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
