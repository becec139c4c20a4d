//! Transaction manager for the reference host
//!
//! Commit is two-phase from the caller's point of view:
//! 1. Validate and apply staged changes to the store (durable)
//! 2. Run post-commit listeners on the committing thread
//!
//! A listener failure in phase 2 is reported as
//! [`TxnError::AfterCommit`]; the changes from phase 1 stand.

use crate::error::TxnError;
use crate::identity::ExecutionContext;
use crate::store::NodeStore;
use crate::txn::{CompletedTransaction, Transaction, TxnId, TxnOptions};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opens, commits and rolls back transactions against a [`NodeStore`]
#[derive(Debug)]
pub struct TransactionManager {
    store: Arc<NodeStore>,
    next_id: AtomicU64,
    /// Serializes validate-and-apply so commits are atomic
    commit_lock: Mutex<()>,
}

impl TransactionManager {
    #[must_use]
    pub fn new(store: Arc<NodeStore>) -> Self {
        Self {
            store,
            next_id: AtomicU64::new(1),
            commit_lock: Mutex::new(()),
        }
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }

    /// Open a new, independent transaction
    #[must_use]
    pub fn begin(&self, context: ExecutionContext, options: TxnOptions) -> Transaction {
        let id = TxnId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::trace!(txn = %id, principal = %context.principal(), "transaction begun");
        Transaction::new(id, context, options, Arc::clone(&self.store))
    }

    /// Commit a transaction, then notify its listeners
    ///
    /// # Errors
    /// - `TxnError::Conflict` if a written node changed since it was first
    ///   read; nothing is applied and no listener runs
    /// - `TxnError::AfterCommit` if a listener failed; changes are durable
    pub fn commit(&self, txn: Transaction) -> Result<(), TxnError> {
        let Transaction {
            id,
            context,
            interrupt,
            resources,
            listeners,
            changes,
            observed,
            ..
        } = txn;

        {
            let _commit = self.commit_lock.lock();
            let observed = observed.into_inner();
            let written: BTreeSet<_> = changes.iter().map(|c| c.node().clone()).collect();

            for node in &written {
                let found = self
                    .store
                    .version(node)
                    .ok_or_else(|| TxnError::NodeNotFound(node.clone()))?;
                let expected = observed.get(node).copied().unwrap_or(found);
                if found != expected {
                    tracing::debug!(txn = %id, %node, expected, found, "commit conflict");
                    return Err(TxnError::Conflict {
                        node: node.clone(),
                        expected,
                        found,
                    });
                }
            }

            for change in &changes {
                self.store.update(change.node(), |record| change.apply(record));
            }
            for node in &written {
                self.store.update(node, |record| {
                    record.version += 1;
                    record.modified_by = Some(context.principal().clone());
                });
            }
            tracing::debug!(txn = %id, nodes = written.len(), changes = changes.len(), "transaction committed");
        }

        let mut completed = CompletedTransaction::new(id, context, interrupt, resources);
        let mut first_failure = None;
        for (key, listener) in listeners {
            if let Err(source) = listener.after_commit(&mut completed) {
                tracing::error!(txn = %id, listener = %key, error = %source, "post-commit listener failed");
                if first_failure.is_none() {
                    first_failure = Some(TxnError::AfterCommit {
                        txn: id,
                        key,
                        source,
                    });
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Discard a transaction's changes and notify its listeners
    pub fn rollback(&self, txn: Transaction) {
        let Transaction {
            id,
            context,
            interrupt,
            resources,
            listeners,
            changes,
            ..
        } = txn;

        tracing::debug!(txn = %id, discarded = changes.len(), "transaction rolled back");

        let mut completed = CompletedTransaction::new(id, context, interrupt, resources);
        for listener in listeners.values() {
            listener.after_rollback(&mut completed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::namespace::QName;
    use crate::node::{NodeRef, Value};
    use crate::store::NodeRecord;
    use crate::txn::TransactionListener;
    use crate::identity::Principal;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        commits: AtomicUsize,
        rollbacks: AtomicUsize,
        /// Version of the node observed from inside `after_commit`
        seen_version: AtomicU64,
        watch: Mutex<Option<(Arc<NodeStore>, NodeRef)>>,
    }

    impl TransactionListener for Counting {
        fn after_commit(&self, _txn: &mut CompletedTransaction) -> Result<(), BoxError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            if let Some((store, node)) = &*self.watch.lock() {
                let version = store.version(node).unwrap_or_default();
                self.seen_version.store(version, Ordering::SeqCst);
            }
            Ok(())
        }

        fn after_rollback(&self, _txn: &mut CompletedTransaction) {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Failing;

    impl TransactionListener for Failing {
        fn after_commit(&self, _txn: &mut CompletedTransaction) -> Result<(), BoxError> {
            Err("listener exploded".into())
        }
    }

    fn setup() -> (TransactionManager, NodeRef, QName) {
        let store = Arc::new(NodeStore::new());
        let node = NodeRef::generate();
        store.insert(node.clone(), NodeRecord::new());
        (TransactionManager::new(store), node, QName::new("urn:m", "title"))
    }

    #[test]
    fn commit_applies_changes_and_bumps_version() {
        let (manager, node, title) = setup();

        let mut txn = manager.begin(ExecutionContext::user("alice"), TxnOptions::read_write());
        txn.set_property(&node, title.clone(), "Report").unwrap();
        manager.commit(txn).unwrap();

        let record = manager.store().get(&node).unwrap();
        assert_eq!(record.properties.get(&title), Some(&Value::text("Report")));
        assert_eq!(record.version, 1);
        assert_eq!(record.modified_by, Some(Principal::User("alice".to_string())));
    }

    #[test]
    fn listeners_run_after_durable_commit() {
        let (manager, node, title) = setup();
        let listener = Arc::new(Counting::default());
        *listener.watch.lock() = Some((Arc::clone(manager.store()), node.clone()));

        let mut txn = manager.begin(ExecutionContext::user("alice"), TxnOptions::read_write());
        txn.set_property(&node, title, "Report").unwrap();
        txn.bind_listener("counting", listener.clone());
        manager.commit(txn).unwrap();

        assert_eq!(listener.commits.load(Ordering::SeqCst), 1);
        assert_eq!(listener.seen_version.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rollback_skips_after_commit() {
        let (manager, node, title) = setup();
        let listener = Arc::new(Counting::default());

        let mut txn = manager.begin(ExecutionContext::user("alice"), TxnOptions::read_write());
        txn.set_property(&node, title.clone(), "Report").unwrap();
        txn.bind_listener("counting", listener.clone());
        manager.rollback(txn);

        assert_eq!(listener.commits.load(Ordering::SeqCst), 0);
        assert_eq!(listener.rollbacks.load(Ordering::SeqCst), 1);
        assert!(manager.store().get(&node).unwrap().properties.get(&title).is_none());
    }

    #[test]
    fn concurrent_write_conflicts() {
        let (manager, node, title) = setup();

        let mut first = manager.begin(ExecutionContext::user("a"), TxnOptions::read_write());
        let mut second = manager.begin(ExecutionContext::user("b"), TxnOptions::read_write());
        first.set_property(&node, title.clone(), "one").unwrap();
        second.set_property(&node, title.clone(), "two").unwrap();

        manager.commit(first).unwrap();
        let err = manager.commit(second).unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(
            manager.store().get(&node).unwrap().properties.get(&title),
            Some(&Value::text("one"))
        );
    }

    #[test]
    fn conflict_does_not_notify_listeners() {
        let (manager, node, title) = setup();
        let listener = Arc::new(Counting::default());

        let mut loser = manager.begin(ExecutionContext::user("b"), TxnOptions::read_write());
        loser.set_property(&node, title.clone(), "two").unwrap();
        loser.bind_listener("counting", listener.clone());

        let mut winner = manager.begin(ExecutionContext::user("a"), TxnOptions::read_write());
        winner.set_property(&node, title, "one").unwrap();
        manager.commit(winner).unwrap();

        assert!(manager.commit(loser).is_err());
        assert_eq!(listener.commits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_failure_keeps_commit() {
        let (manager, node, title) = setup();
        let listener = Arc::new(Counting::default());

        let mut txn = manager.begin(ExecutionContext::user("alice"), TxnOptions::read_write());
        txn.set_property(&node, title.clone(), "Report").unwrap();
        txn.bind_listener("failing", Arc::new(Failing));
        txn.bind_listener("counting", listener.clone());

        let err = manager.commit(txn).unwrap_err();
        assert!(err.is_committed());
        assert_eq!(listener.commits.load(Ordering::SeqCst), 1);
        assert_eq!(
            manager.store().get(&node).unwrap().properties.get(&title),
            Some(&Value::text("Report"))
        );
    }
}
