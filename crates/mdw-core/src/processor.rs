//! Candidate attribute values for a write

use mdw_repo::{NodeRef, QName, Transaction, TxnError, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Produces the attribute set the sequencer maps from
pub trait NodeMetadataProcessor: Send + Sync + fmt::Debug {
    /// # Errors
    /// Host transaction errors reading the node.
    fn process(&self, txn: &Transaction, node: &NodeRef) -> Result<BTreeMap<QName, Value>, TxnError>;
}

/// The node's stored attributes, unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NodePropertiesProcessor;

impl NodeMetadataProcessor for NodePropertiesProcessor {
    fn process(&self, txn: &Transaction, node: &NodeRef) -> Result<BTreeMap<QName, Value>, TxnError> {
        txn.properties(node)
    }
}
