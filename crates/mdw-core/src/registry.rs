//! Deferred request registry
//!
//! Binds a pending [`WriteRequest`] to the caller's transaction under the
//! service's fixed key. The slot holds one request: asking again in the
//! same transaction replaces the earlier request (last write wins). The
//! post-commit listener is bound under the same key at most once.

use crate::dispatcher::PostCommitDispatcher;
use crate::executor::WriteOutcome;
use mdw_repo::{NodeRef, Transaction};
use std::fmt;
use std::sync::Arc;
use ulid::Ulid;

/// Completion callback, invoked once outside the write's transaction
///
/// Not invoked if the request never runs (pool stopped, cancelled before
/// the worker picked it up) or if the worker panics; the committing thread
/// sees `DispatchError::WorkerFailed` instead.
pub type WriteCallback = Box<dyn FnOnce(&WriteOutcome) + Send + 'static>;

/// A pending metadata write for one node
pub struct WriteRequest {
    id: Ulid,
    node: NodeRef,
    callback: Option<WriteCallback>,
}

impl WriteRequest {
    #[must_use]
    pub fn new(node: NodeRef) -> Self {
        Self {
            id: Ulid::new(),
            node,
            callback: None,
        }
    }

    /// Attach a completion callback; see [`WriteCallback`] for when it is skipped
    #[must_use]
    pub fn with_callback(mut self, callback: impl FnOnce(&WriteOutcome) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> Ulid {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    #[inline]
    #[must_use]
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub(crate) fn into_parts(self) -> (Ulid, NodeRef, Option<WriteCallback>) {
        (self.id, self.node, self.callback)
    }
}

impl fmt::Debug for WriteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteRequest")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Collapses write requests to one per transaction
#[derive(Debug, Clone)]
pub struct DeferredWriteRegistry {
    dispatcher: Arc<PostCommitDispatcher>,
}

impl DeferredWriteRegistry {
    /// Resource and listener key for a service
    #[must_use]
    pub fn key_for(service_name: &str) -> String {
        format!("{service_name}.updater")
    }

    #[must_use]
    pub fn new(dispatcher: Arc<PostCommitDispatcher>) -> Self {
        Self { dispatcher }
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        self.dispatcher.key()
    }

    /// Bind `request` to `txn`, replacing any earlier request
    pub fn request(&self, txn: &mut Transaction, request: WriteRequest) {
        let key = self.key().to_string();
        let node = request.node().clone();
        let id = request.id();

        if txn.bind_resource(key.clone(), request) {
            tracing::debug!(txn = %txn.id(), %node, request = %id, "replaced pending write request");
        } else {
            tracing::trace!(txn = %txn.id(), %node, request = %id, "write request bound");
        }

        if txn.bind_listener(key, Arc::clone(&self.dispatcher) as _) {
            tracing::trace!(txn = %txn.id(), "post-commit dispatcher bound");
        }
    }

    /// Request currently bound to `txn`, if any
    #[must_use]
    pub fn pending<'t>(&self, txn: &'t Transaction) -> Option<&'t WriteRequest> {
        txn.resource::<WriteRequest>(self.key())
    }
}
