//! Metadata service
//!
//! Wires one configured writer together: mapping table, converter chain,
//! content factory, gate, executor, worker pool, dispatcher and registry.
//! Services register by name in a [`MetadataServiceRegistry`] so that
//! callers can find a writer without holding it.

use crate::config::WriterConfig;
use crate::content::{ContentFactory, MimetypeContentFactory, StoredContentHandler};
use crate::convert::{ConverterChain, ValueConverter};
use crate::dispatcher::{DispatchStats, PostCommitDispatcher};
use crate::error::Result;
use crate::executor::{PrivilegedWriter, WriteOutcome};
use crate::extract::{DefaultValueExtractor, PropertyValueExtractor};
use crate::mapping::AttributeMapping;
use crate::pool::WorkerPool;
use crate::processor::{NodeMetadataProcessor, NodePropertiesProcessor};
use crate::registry::{DeferredWriteRegistry, WriteRequest};
use crate::sequencer::WriteSequencer;
use crate::verifier::{HasArtifact, NodeVerifier};
use dashmap::DashMap;
use mdw_repo::{NodeRef, RetryingTransactionHelper, Transaction};
use std::sync::Arc;

/// Builder for [`MetadataService`]
#[derive(Debug)]
pub struct MetadataServiceBuilder {
    config: WriterConfig,
    helper: RetryingTransactionHelper,
    content: Arc<dyn ContentFactory>,
    verifier: Arc<dyn NodeVerifier>,
    processor: Arc<dyn NodeMetadataProcessor>,
    extractor: Arc<dyn PropertyValueExtractor>,
    converters: Vec<Arc<dyn ValueConverter>>,
}

impl MetadataServiceBuilder {
    fn new(config: WriterConfig, helper: RetryingTransactionHelper) -> Self {
        Self {
            config,
            helper,
            content: Arc::new(
                MimetypeContentFactory::new().with_handler(StoredContentHandler::default()),
            ),
            verifier: Arc::new(HasArtifact),
            processor: Arc::new(NodePropertiesProcessor),
            extractor: Arc::new(DefaultValueExtractor::new()),
            converters: Vec::new(),
        }
    }

    #[must_use]
    pub fn content(mut self, content: impl ContentFactory + 'static) -> Self {
        self.content = Arc::new(content);
        self
    }

    #[must_use]
    pub fn verifier(mut self, verifier: impl NodeVerifier + 'static) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }

    #[must_use]
    pub fn processor(mut self, processor: impl NodeMetadataProcessor + 'static) -> Self {
        self.processor = Arc::new(processor);
        self
    }

    #[must_use]
    pub fn extractor(mut self, extractor: impl PropertyValueExtractor + 'static) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    /// Append a converter after the configured ones
    #[must_use]
    pub fn converter(mut self, converter: impl ValueConverter + 'static) -> Self {
        self.converters.push(Arc::new(converter));
        self
    }

    /// Validate configuration, build the tables and start the worker pool
    ///
    /// # Errors
    /// - `Error::Config` if the configuration is invalid
    /// - `Error::Dispatch` if the worker pool cannot start
    pub fn build(self) -> Result<MetadataService> {
        let Self {
            config,
            helper,
            content,
            verifier,
            processor,
            extractor,
            converters,
        } = self;

        config.validate()?;
        let namespaces = config.namespace_registry();
        let mapping = Arc::new(AttributeMapping::from_entries(&config.mapping, &namespaces));
        let mut chain = ConverterChain::from_config(&config.converter)?;
        for converter in converters {
            chain.push(converter);
        }
        let chain = Arc::new(chain);

        let sequencer = WriteSequencer::new(Arc::clone(&mapping), Arc::clone(&chain), extractor, content);
        let writer = PrivilegedWriter::new(helper, verifier, processor, sequencer);
        let pool = Arc::new(WorkerPool::start(&config.service_name, &config.pool)?);
        let dispatcher = Arc::new(PostCommitDispatcher::new(
            DeferredWriteRegistry::key_for(&config.service_name),
            writer,
            Arc::clone(&pool),
            config.timeout(),
        ));
        let registry = DeferredWriteRegistry::new(Arc::clone(&dispatcher));

        tracing::info!(
            service = %config.service_name,
            mappings = mapping.len(),
            converters = chain.len(),
            timeout_ms = config.timeout_ms,
            "metadata service started"
        );

        Ok(MetadataService {
            config,
            mapping,
            converters: chain,
            pool,
            dispatcher,
            registry,
        })
    }
}

/// A configured deferred metadata writer
#[derive(Debug)]
pub struct MetadataService {
    config: WriterConfig,
    mapping: Arc<AttributeMapping>,
    converters: Arc<ConverterChain>,
    pool: Arc<WorkerPool>,
    dispatcher: Arc<PostCommitDispatcher>,
    registry: DeferredWriteRegistry,
}

impl MetadataService {
    /// Start building a service from `config`
    #[must_use]
    pub fn builder(config: WriterConfig, helper: RetryingTransactionHelper) -> MetadataServiceBuilder {
        MetadataServiceBuilder::new(config, helper)
    }

    #[inline]
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn mapping(&self) -> &AttributeMapping {
        &self.mapping
    }

    #[inline]
    #[must_use]
    pub fn converters(&self) -> &ConverterChain {
        &self.converters
    }

    /// Schedule a metadata write for `node` once `txn` commits
    ///
    /// Repeated calls in the same transaction leave one request: the last.
    pub fn write(&self, txn: &mut Transaction, node: &NodeRef) {
        self.registry.request(txn, WriteRequest::new(node.clone()));
    }

    /// As [`MetadataService::write`], invoking `callback` with the outcome
    pub fn write_with_callback<F>(&self, txn: &mut Transaction, node: &NodeRef, callback: F)
    where
        F: FnOnce(&WriteOutcome) + Send + 'static,
    {
        self.registry
            .request(txn, WriteRequest::new(node.clone()).with_callback(callback));
    }

    /// Request pending on `txn`, if any
    #[must_use]
    pub fn pending<'t>(&self, txn: &'t Transaction) -> Option<&'t WriteRequest> {
        self.registry.pending(txn)
    }

    /// Register under the service name, replacing a same-named service
    pub fn register(self: &Arc<Self>, registry: &MetadataServiceRegistry) {
        registry.register(Arc::clone(self));
    }

    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.pool.is_running()
    }

    /// Shut the worker pool down; later dispatches fail
    pub fn stop(&self) {
        self.pool.shutdown();
        tracing::info!(service = %self.service_name(), stats = ?self.stats(), "metadata service stopped");
    }
}

/// Process-wide directory of metadata services by name
#[derive(Debug, Default)]
pub struct MetadataServiceRegistry {
    services: DashMap<String, Arc<MetadataService>>,
}

impl MetadataServiceRegistry {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the service previously registered under the same name
    pub fn register(&self, service: Arc<MetadataService>) -> Option<Arc<MetadataService>> {
        let name = service.service_name().to_string();
        let previous = self.services.insert(name.clone(), service);
        if previous.is_some() {
            tracing::warn!(service = %name, "replaced registered metadata service");
        } else {
            tracing::debug!(service = %name, "metadata service registered");
        }
        previous
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<MetadataService>> {
        self.services.get(name).map(|s| Arc::clone(s.value()))
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<MetadataService>> {
        self.services.remove(name).map(|(_, s)| s)
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
