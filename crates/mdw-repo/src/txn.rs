//! Transactions
//!
//! A [`Transaction`] is an explicit context object: it carries the
//! execution identity, staged changes, single-slot resources and the
//! post-commit listeners bound to it. Nothing is thread-local.
//!
//! # Resource slots
//!
//! [`Transaction::bind_resource`] stores at most one value per key; binding
//! the same key again overwrites. [`Transaction::bind_listener`] registers at
//! most one listener per key; later binds under the same key are ignored.

use crate::behaviour::BehaviourFilter;
use crate::error::{BoxError, TxnError};
use crate::identity::ExecutionContext;
use crate::interrupt::Interrupt;
use crate::namespace::QName;
use crate::node::{NodeRef, Value};
use crate::store::{Artifact, NodeRecord, NodeStore};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Options for opening a transaction
#[derive(Debug, Clone, Default)]
pub struct TxnOptions {
    /// Reject writes
    pub read_only: bool,
    /// Interrupt shared with whoever may ask this transaction to stop
    pub interrupt: Option<Interrupt>,
}

impl TxnOptions {
    #[inline]
    #[must_use]
    pub fn read_write() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            interrupt: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }
}

/// Transaction lifecycle hook
///
/// Called synchronously by [`crate::TransactionManager`] on the committing
/// thread, strictly after the transaction's changes are durable. Listeners
/// bound to a transaction that rolls back never see `after_commit`.
pub trait TransactionListener: Send + Sync {
    /// The transaction committed durably
    ///
    /// # Errors
    /// Any error is reported to the committer; the commit itself stands.
    fn after_commit(&self, txn: &mut CompletedTransaction) -> Result<(), BoxError>;

    /// The transaction rolled back
    fn after_rollback(&self, _txn: &mut CompletedTransaction) {}
}

#[derive(Debug, Clone)]
pub(crate) enum Change {
    Property {
        node: NodeRef,
        name: QName,
        value: Value,
    },
    Artifact {
        node: NodeRef,
        artifact: Artifact,
    },
    Revision {
        node: NodeRef,
    },
}

impl Change {
    pub(crate) fn node(&self) -> &NodeRef {
        match self {
            Self::Property { node, .. } | Self::Artifact { node, .. } | Self::Revision { node } => {
                node
            }
        }
    }

    pub(crate) fn apply(&self, record: &mut NodeRecord) {
        match self {
            Self::Property { name, value, .. } => {
                record.properties.insert(name.clone(), value.clone());
            }
            Self::Artifact { artifact, .. } => record.artifact = Some(artifact.clone()),
            Self::Revision { .. } => record.revision += 1,
        }
    }
}

/// An open transaction
pub struct Transaction {
    pub(crate) id: TxnId,
    pub(crate) context: ExecutionContext,
    pub(crate) read_only: bool,
    pub(crate) interrupt: Interrupt,
    pub(crate) store: Arc<NodeStore>,
    pub(crate) behaviours: BehaviourFilter,
    pub(crate) resources: HashMap<String, Box<dyn Any + Send>>,
    pub(crate) listeners: IndexMap<String, Arc<dyn TransactionListener>>,
    pub(crate) changes: Vec<Change>,
    pub(crate) observed: Mutex<HashMap<NodeRef, u64>>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("context", &self.context)
            .field("read_only", &self.read_only)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("listeners", &self.listeners.keys().collect::<Vec<_>>())
            .field("changes", &self.changes.len())
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub(crate) fn new(
        id: TxnId,
        context: ExecutionContext,
        options: TxnOptions,
        store: Arc<NodeStore>,
    ) -> Self {
        Self {
            id,
            context,
            read_only: options.read_only,
            interrupt: options.interrupt.unwrap_or_default(),
            store,
            behaviours: BehaviourFilter::new(),
            resources: HashMap::new(),
            listeners: IndexMap::new(),
            changes: Vec::new(),
            observed: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> TxnId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    #[inline]
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Interrupt for the thread that will commit this transaction
    #[inline]
    #[must_use]
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Behaviour switch scoped to this transaction
    #[inline]
    #[must_use]
    pub fn behaviours(&self) -> BehaviourFilter {
        self.behaviours.clone()
    }

    /// Bind a value to a single-slot resource key
    ///
    /// Returns `true` if a previous value under the same key was replaced.
    pub fn bind_resource<T: Any + Send>(&mut self, key: impl Into<String>, value: T) -> bool {
        self.resources.insert(key.into(), Box::new(value)).is_some()
    }

    /// Borrow a bound resource
    #[must_use]
    pub fn resource<T: Any>(&self, key: &str) -> Option<&T> {
        self.resources.get(key).and_then(|r| r.downcast_ref::<T>())
    }

    /// Bind a listener once per key
    ///
    /// Returns `true` if the listener was newly bound, `false` if a listener
    /// was already registered under `key` (the new one is dropped).
    pub fn bind_listener(
        &mut self,
        key: impl Into<String>,
        listener: Arc<dyn TransactionListener>,
    ) -> bool {
        let key = key.into();
        if self.listeners.contains_key(&key) {
            return false;
        }
        self.listeners.insert(key, listener);
        true
    }

    #[inline]
    #[must_use]
    pub fn has_listener(&self, key: &str) -> bool {
        self.listeners.contains_key(key)
    }

    /// Current view of a node: committed state plus this transaction's changes
    ///
    /// # Errors
    /// `TxnError::NodeNotFound` if the node does not exist.
    pub fn node(&self, node: &NodeRef) -> Result<NodeRecord, TxnError> {
        let mut record = self
            .store
            .get(node)
            .ok_or_else(|| TxnError::NodeNotFound(node.clone()))?;

        self.observed
            .lock()
            .entry(node.clone())
            .or_insert(record.version);

        for change in self.changes.iter().filter(|c| c.node() == node) {
            change.apply(&mut record);
        }
        Ok(record)
    }

    #[inline]
    #[must_use]
    pub fn exists(&self, node: &NodeRef) -> bool {
        self.store.contains(node)
    }

    /// All attribute values of a node
    ///
    /// # Errors
    /// `TxnError::NodeNotFound` if the node does not exist.
    pub fn properties(&self, node: &NodeRef) -> Result<BTreeMap<QName, Value>, TxnError> {
        Ok(self.node(node)?.properties)
    }

    /// One attribute value
    ///
    /// # Errors
    /// `TxnError::NodeNotFound` if the node does not exist.
    pub fn property(&self, node: &NodeRef, name: &QName) -> Result<Option<Value>, TxnError> {
        Ok(self.node(node)?.properties.remove(name))
    }

    /// Artifact attached to a node
    ///
    /// # Errors
    /// `TxnError::NodeNotFound` if the node does not exist.
    pub fn artifact(&self, node: &NodeRef) -> Result<Option<Artifact>, TxnError> {
        Ok(self.node(node)?.artifact)
    }

    /// Stage an attribute update
    ///
    /// # Errors
    /// - `TxnError::ReadOnly` in a read-only transaction
    /// - `TxnError::NodeNotFound` if the node does not exist
    pub fn set_property(
        &mut self,
        node: &NodeRef,
        name: QName,
        value: impl Into<Value>,
    ) -> Result<(), TxnError> {
        self.check_writable(node)?;
        self.changes.push(Change::Property {
            node: node.clone(),
            name,
            value: value.into(),
        });
        Ok(())
    }

    /// Stage an artifact update
    ///
    /// Unless behaviours are suppressed, updating the artifact of a
    /// versionable node also stages a revision bump.
    ///
    /// # Errors
    /// - `TxnError::ReadOnly` in a read-only transaction
    /// - `TxnError::NodeNotFound` if the node does not exist
    pub fn set_artifact(&mut self, node: &NodeRef, artifact: Artifact) -> Result<(), TxnError> {
        let record = self.check_writable(node)?;
        self.changes.push(Change::Artifact {
            node: node.clone(),
            artifact,
        });

        if record.versionable && self.behaviours.is_enabled() {
            tracing::trace!(%node, txn = %self.id, "artifact update creates a new revision");
            self.changes.push(Change::Revision { node: node.clone() });
        }
        Ok(())
    }

    /// Number of staged changes
    #[inline]
    #[must_use]
    pub fn pending_changes(&self) -> usize {
        self.changes.len()
    }

    fn check_writable(&self, node: &NodeRef) -> Result<NodeRecord, TxnError> {
        if self.read_only {
            return Err(TxnError::ReadOnly(self.id));
        }
        self.node(node)
    }
}

/// What listeners see once a transaction has finished
///
/// Resources bound during the transaction are handed over here so a
/// listener can consume them exactly once.
pub struct CompletedTransaction {
    id: TxnId,
    context: ExecutionContext,
    interrupt: Interrupt,
    resources: HashMap<String, Box<dyn Any + Send>>,
}

impl fmt::Debug for CompletedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletedTransaction")
            .field("id", &self.id)
            .field("context", &self.context)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl CompletedTransaction {
    pub(crate) fn new(
        id: TxnId,
        context: ExecutionContext,
        interrupt: Interrupt,
        resources: HashMap<String, Box<dyn Any + Send>>,
    ) -> Self {
        Self {
            id,
            context,
            interrupt,
            resources,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> TxnId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Interrupt of the committing thread
    #[inline]
    #[must_use]
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    #[must_use]
    pub fn resource<T: Any>(&self, key: &str) -> Option<&T> {
        self.resources.get(key).and_then(|r| r.downcast_ref::<T>())
    }

    /// Remove and return a resource; `None` if absent or of another type
    pub fn take_resource<T: Any>(&mut self, key: &str) -> Option<T> {
        let boxed = self.resources.remove(key)?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.resources.insert(key.to_string(), other);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ExecutionContext;

    fn open(store: &Arc<NodeStore>) -> Transaction {
        Transaction::new(
            TxnId(1),
            ExecutionContext::user("alice"),
            TxnOptions::read_write(),
            Arc::clone(store),
        )
    }

    struct Noop;

    impl TransactionListener for Noop {
        fn after_commit(&self, _txn: &mut CompletedTransaction) -> Result<(), BoxError> {
            Ok(())
        }
    }

    #[test]
    fn resource_slot_overwrites() {
        let store = Arc::new(NodeStore::new());
        let mut txn = open(&store);

        assert!(!txn.bind_resource("key", 1u32));
        assert!(txn.bind_resource("key", 2u32));
        assert_eq!(txn.resource::<u32>("key"), Some(&2));
        assert_eq!(txn.resource::<String>("key"), None);
    }

    #[test]
    fn listener_binds_once_per_key() {
        let store = Arc::new(NodeStore::new());
        let mut txn = open(&store);

        assert!(txn.bind_listener("k", Arc::new(Noop)));
        assert!(!txn.bind_listener("k", Arc::new(Noop)));
        assert!(txn.bind_listener("other", Arc::new(Noop)));
        assert_eq!(txn.listeners.len(), 2);
        assert!(txn.has_listener("k"));
        assert!(!txn.has_listener("missing"));
    }

    #[test]
    fn exists_reflects_committed_nodes() {
        let store = Arc::new(NodeStore::new());
        let node = NodeRef::generate();
        store.insert(node.clone(), NodeRecord::new());
        let txn = open(&store);

        assert!(txn.exists(&node));
        assert!(!txn.exists(&NodeRef::generate()));
    }

    #[test]
    fn reads_see_own_writes() {
        let store = Arc::new(NodeStore::new());
        let node = NodeRef::generate();
        let title = QName::new("urn:m", "title");
        store.insert(node.clone(), NodeRecord::new().with_property(title.clone(), "Old"));

        let mut txn = open(&store);
        txn.set_property(&node, title.clone(), "New").unwrap();

        assert_eq!(txn.property(&node, &title).unwrap(), Some(Value::text("New")));
        assert_eq!(
            store.get(&node).unwrap().properties.get(&title),
            Some(&Value::text("Old"))
        );
    }

    #[test]
    fn read_only_rejects_writes() {
        let store = Arc::new(NodeStore::new());
        let node = NodeRef::generate();
        store.insert(node.clone(), NodeRecord::new());

        let mut txn = Transaction::new(
            TxnId(9),
            ExecutionContext::system(),
            TxnOptions::read_only(),
            Arc::clone(&store),
        );
        let err = txn
            .set_property(&node, QName::new("urn:m", "x"), "y")
            .unwrap_err();
        assert!(matches!(err, TxnError::ReadOnly(TxnId(9))));
    }

    #[test]
    fn artifact_update_bumps_revision_unless_suppressed() {
        let store = Arc::new(NodeStore::new());
        let node = NodeRef::generate();
        store.insert(
            node.clone(),
            NodeRecord::new()
                .with_artifact(Artifact::new("text/plain"))
                .versionable(),
        );

        let mut txn = open(&store);
        txn.set_artifact(&node, Artifact::new("text/plain")).unwrap();
        assert_eq!(txn.node(&node).unwrap().revision, 1);

        let filter = txn.behaviours();
        let guard = filter.disable();
        txn.set_artifact(&node, Artifact::new("text/plain")).unwrap();
        drop(guard);
        assert_eq!(txn.node(&node).unwrap().revision, 1);
    }

    #[test]
    fn take_resource_consumes_once() {
        let mut resources: HashMap<String, Box<dyn Any + Send>> = HashMap::new();
        resources.insert("k".to_string(), Box::new(String::from("v")));
        let mut done = CompletedTransaction::new(
            TxnId(3),
            ExecutionContext::system(),
            Interrupt::new(),
            resources,
        );

        assert_eq!(done.take_resource::<u8>("k"), None);
        assert_eq!(done.take_resource::<String>("k").as_deref(), Some("v"));
        assert_eq!(done.take_resource::<String>("k"), None);
    }
}
