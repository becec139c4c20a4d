//! Verification gate
//!
//! Decides whether a node is eligible for a metadata write. Declining is
//! not an error: the write is skipped without opening a session.

use mdw_repo::{NodeRef, Transaction};
use std::fmt;

/// Eligibility predicate over a node's current state
pub trait NodeVerifier: Send + Sync + fmt::Debug {
    fn verify(&self, txn: &Transaction, node: &NodeRef) -> bool;
}

/// Accepts every node
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl NodeVerifier for AcceptAll {
    fn verify(&self, _txn: &Transaction, _node: &NodeRef) -> bool {
        true
    }
}

/// Accepts nodes that exist and carry an artifact
#[derive(Debug, Clone, Copy, Default)]
pub struct HasArtifact;

impl NodeVerifier for HasArtifact {
    fn verify(&self, txn: &Transaction, node: &NodeRef) -> bool {
        matches!(txn.artifact(node), Ok(Some(_)))
    }
}

/// Accepts nodes whose artifact has one of the listed mimetypes
#[derive(Debug, Clone, Default)]
pub struct MimetypeAllowList {
    mimetypes: Vec<String>,
}

impl MimetypeAllowList {
    #[must_use]
    pub fn new<I, S>(mimetypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mimetypes: mimetypes.into_iter().map(Into::into).collect(),
        }
    }
}

impl NodeVerifier for MimetypeAllowList {
    fn verify(&self, txn: &Transaction, node: &NodeRef) -> bool {
        match txn.artifact(node) {
            Ok(Some(artifact)) => self.mimetypes.iter().any(|m| *m == artifact.mimetype),
            _ => false,
        }
    }
}
