//! In-memory node store
//!
//! Durable state of the reference host. Transactions read through it and
//! apply staged changes to it at commit; nothing else mutates records.

use crate::identity::Principal;
use crate::namespace::QName;
use crate::node::{NodeRef, Value};
use dashmap::DashMap;
use std::collections::BTreeMap;

/// Artifact attached to a node: format plus embedded property set
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Artifact {
    pub mimetype: String,
    pub properties: BTreeMap<String, Value>,
}

impl Artifact {
    #[inline]
    #[must_use]
    pub fn new(mimetype: impl Into<String>) -> Self {
        Self {
            mimetype: mimetype.into(),
            properties: BTreeMap::new(),
        }
    }
}

/// Stored state of one node
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeRecord {
    /// Attribute values
    pub properties: BTreeMap<QName, Value>,
    /// Attached artifact, if any
    pub artifact: Option<Artifact>,
    /// Whether artifact updates create a new revision
    pub versionable: bool,
    /// Revision counter bumped by the versioning behaviour
    pub revision: u32,
    /// Optimistic concurrency version, bumped on every committed change
    pub version: u64,
    /// Principal of the last committed change
    pub modified_by: Option<Principal>,
}

impl NodeRecord {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_property(mut self, name: QName, value: impl Into<Value>) -> Self {
        self.properties.insert(name, value.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    #[inline]
    #[must_use]
    pub fn versionable(mut self) -> Self {
        self.versionable = true;
        self
    }
}

/// Concurrent map of committed node records
#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: DashMap<NodeRef, NodeRecord>,
}

impl NodeStore {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node outside any transaction (fixtures, bootstrap)
    pub fn insert(&self, node: NodeRef, record: NodeRecord) {
        self.nodes.insert(node, record);
    }

    /// Snapshot of a committed record
    #[must_use]
    pub fn get(&self, node: &NodeRef) -> Option<NodeRecord> {
        self.nodes.get(node).map(|r| r.value().clone())
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, node: &NodeRef) -> bool {
        self.nodes.contains_key(node)
    }

    #[inline]
    #[must_use]
    pub fn version(&self, node: &NodeRef) -> Option<u64> {
        self.nodes.get(node).map(|r| r.version)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Mutate a committed record in place; used by the transaction manager
    pub(crate) fn update<F>(&self, node: &NodeRef, f: F) -> bool
    where
        F: FnOnce(&mut NodeRecord),
    {
        match self.nodes.get_mut(node) {
            Some(mut record) => {
                f(record.value_mut());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_snapshot() {
        let store = NodeStore::new();
        let node = NodeRef::generate();
        let title = QName::new("urn:m", "title");

        store.insert(
            node.clone(),
            NodeRecord::new()
                .with_property(title.clone(), "Report")
                .with_artifact(Artifact::new("text/plain")),
        );

        let record = store.get(&node).unwrap();
        assert_eq!(record.properties.get(&title), Some(&Value::text("Report")));
        assert_eq!(record.version, 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_missing_node_is_noop() {
        let store = NodeStore::new();
        assert!(!store.update(&NodeRef::generate(), |r| r.version += 1));
        assert!(store.is_empty());
    }
}
