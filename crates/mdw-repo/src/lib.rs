//! MDW Repo - host repository collaborators
//!
//! The metadata writer runs against a transactional repository it does not
//! own. This crate defines the boundary it consumes:
//! - Node references, qualified attribute names and attribute values
//! - Transactions with single-slot resources and post-commit listeners
//! - A retrying-transaction helper for transient write conflicts
//! - Explicit execution contexts for identity elevation
//! - A per-transaction behaviour filter
//!
//! It also ships a small in-memory reference host ([`NodeStore`] +
//! [`TransactionManager`]) that implements those interfaces well enough to
//! drive the writer end to end.
//!
//! # Example
//!
//! ```rust,ignore
//! use mdw_repo::prelude::*;
//!
//! let store = Arc::new(NodeStore::new());
//! let manager = TransactionManager::new(store);
//!
//! let mut txn = manager.begin(ExecutionContext::user("alice"), TxnOptions::read_write());
//! txn.set_property(&node, title, Value::text("Report"))?;
//! manager.commit(txn)?;
//! ```

#![allow(missing_docs)]

pub mod behaviour;
pub mod error;
pub mod identity;
pub mod interrupt;
pub mod manager;
pub mod namespace;
pub mod node;
pub mod retry;
pub mod store;
pub mod txn;

pub use behaviour::{BehaviourFilter, BehaviourGuard};
pub use error::{BoxError, NamespaceError, RetryableError, TxnError};
pub use identity::{ExecutionContext, Principal};
pub use interrupt::Interrupt;
pub use manager::TransactionManager;
pub use namespace::{NamespaceRegistry, QName};
pub use node::{NodeRef, Value};
pub use retry::{RetryPolicy, RetryingTransactionHelper};
pub use store::{Artifact, NodeRecord, NodeStore};
pub use txn::{CompletedTransaction, Transaction, TransactionListener, TxnId, TxnOptions};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the reference host
    pub use crate::{
        Artifact, ExecutionContext, NodeRecord, NodeRef, NodeStore, Principal, QName,
        RetryingTransactionHelper, Transaction, TransactionManager, TxnError, TxnOptions, Value,
    };
    pub use std::sync::Arc;
}
