//! MDW Core - deferred metadata writer
//!
//! Propagates repository attribute values into the embedded metadata of a
//! node's artifact. The write itself happens after the triggering
//! transaction has durably committed, on a worker pool, inside a fresh
//! system-identity transaction with automatic retry on conflict.
//!
//! Pipeline, leaves first:
//! - [`AttributeMapping`]: qualified attribute name to artifact property
//! - [`ConverterChain`]: first applicable [`ValueConverter`] wins
//! - [`ContentFactory`] / [`ContentFacade`]: open, write, save or abort
//! - [`WriteSequencer`]: map, convert and write with abort-on-first-failure
//! - [`NodeVerifier`]: eligibility gate
//! - [`PrivilegedWriter`]: system identity, retrying transaction, policy
//! - [`DeferredWriteRegistry`]: one request per transaction
//! - [`PostCommitDispatcher`]: runs the request after commit, bounded wait
//!
//! # Example
//!
//! ```rust,ignore
//! use mdw_core::prelude::*;
//!
//! let service = MetadataService::builder(config, helper.clone()).build()?;
//!
//! helper.do_in_transaction(&ExecutionContext::user("alice"), TxnOptions::read_write(), |txn| {
//!     txn.set_property(&node, title.clone(), "Quarterly report")?;
//!     service.write(txn, &node);
//!     Ok::<_, TxnError>(())
//! })?;
//! ```

#![allow(missing_docs)]

pub mod config;
pub mod content;
pub mod convert;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod extract;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod pool;
pub mod processor;
pub mod registry;
pub mod sequencer;
pub mod service;
pub mod verifier;

pub use config::{MappingEntry, PoolConfig, WriterConfig};
pub use content::{
    ContentFacade, ContentFactory, ContentHandler, MimetypeContentFactory, StoredContentHandler,
};
pub use convert::{
    BooleanConverter, ConverterChain, ConverterConfig, DateConverter, ListJoinConverter,
    ValueConverter,
};
pub use dispatcher::{DispatchStats, PostCommitDispatcher};
pub use error::{ConfigError, ContentError, DispatchError, Error, MetadataError, Result};
pub use executor::{FailurePolicy, PrivilegedWriter, WriteOutcome};
pub use extract::{DefaultValueExtractor, PropertyValueExtractor};
pub use mapping::{AttributeMapping, PropertyMap};
pub use pool::WorkerPool;
pub use processor::{NodeMetadataProcessor, NodePropertiesProcessor};
pub use registry::{DeferredWriteRegistry, WriteCallback, WriteRequest};
pub use sequencer::{SequenceOutcome, WriteSequencer};
pub use service::{MetadataService, MetadataServiceBuilder, MetadataServiceRegistry};
pub use verifier::{AcceptAll, HasArtifact, MimetypeAllowList, NodeVerifier};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for embedding the writer
    pub use crate::{
        MetadataService, MetadataServiceRegistry, WriteOutcome, WriterConfig,
    };
    pub use mdw_repo::prelude::*;
}
