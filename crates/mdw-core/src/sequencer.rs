//! Write sequencer
//!
//! Drives one node's metadata write:
//! 1. Derive the property map (mapping, extraction, conversion)
//! 2. Open an artifact session
//! 3. Write each property in mapping order; the first failure aborts the
//!    whole session and the remaining properties are not attempted
//! 4. Save once every write succeeded
//!
//! A session reaches `save` or `abort` on every path. If it is dropped
//! unfinished (a panicking adapter), the drop guard aborts it.

use crate::content::{ContentFacade, ContentFactory};
use crate::convert::ConverterChain;
use crate::error::{ContentError, MetadataError};
use crate::extract::PropertyValueExtractor;
use crate::mapping::AttributeMapping;
use mdw_repo::{NodeRef, QName, Transaction, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of a sequenced write that did not fail fatally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// Every mapped property written and saved
    Saved { properties: usize },
    /// A property write failed; the session was aborted
    Aborted { property: String, reason: String },
}

/// Maps, converts and writes one node's attributes into its artifact
#[derive(Debug, Clone)]
pub struct WriteSequencer {
    mapping: Arc<AttributeMapping>,
    converters: Arc<ConverterChain>,
    extractor: Arc<dyn PropertyValueExtractor>,
    content: Arc<dyn ContentFactory>,
}

impl WriteSequencer {
    #[must_use]
    pub fn new(
        mapping: Arc<AttributeMapping>,
        converters: Arc<ConverterChain>,
        extractor: Arc<dyn PropertyValueExtractor>,
        content: Arc<dyn ContentFactory>,
    ) -> Self {
        Self {
            mapping,
            converters,
            extractor,
            content,
        }
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

    /// Write `properties` of `node` into its artifact
    ///
    /// # Errors
    /// - `MetadataError::Open` if no session could be opened
    /// - `MetadataError::AbortFailed` if a write failed and so did the abort
    /// - `MetadataError::Save` if the final save failed
    pub fn write(
        &self,
        txn: &mut Transaction,
        node: &NodeRef,
        properties: &BTreeMap<QName, Value>,
    ) -> Result<SequenceOutcome, MetadataError> {
        let property_map =
            self.mapping
                .property_map(properties, self.extractor.as_ref(), &self.converters);

        let facade = self
            .content
            .open(txn, node)
            .map_err(|source| MetadataError::Open {
                node: node.clone(),
                source,
            })?;
        let mut session = Session::new(node, facade);

        for (property, value) in &property_map {
            let Err(failure) = session.write(property, value) else {
                continue;
            };
            tracing::warn!(
                %node,
                property = %property,
                %value,
                error = %failure,
                "could not export property, aborting artifact session"
            );
            if let Err(source) = session.abort() {
                tracing::error!(%node, property = %property, error = %source, "unable to abort the metadata write");
                return Err(MetadataError::AbortFailed {
                    node: node.clone(),
                    property: property.clone(),
                    source,
                });
            }
            return Ok(SequenceOutcome::Aborted {
                property: property.clone(),
                reason: failure.to_string(),
            });
        }

        session.save(txn).map_err(|source| MetadataError::Save {
            node: node.clone(),
            source,
        })?;
        tracing::debug!(%node, properties = property_map.len(), "artifact metadata saved");
        Ok(SequenceOutcome::Saved {
            properties: property_map.len(),
        })
    }
}

/// Open session that aborts itself if dropped unfinished
struct Session<'a> {
    node: &'a NodeRef,
    facade: Option<Box<dyn ContentFacade>>,
}

impl<'a> Session<'a> {
    fn new(node: &'a NodeRef, facade: Box<dyn ContentFacade>) -> Self {
        Self {
            node,
            facade: Some(facade),
        }
    }

    fn write(&mut self, property: &str, value: &Value) -> Result<(), ContentError> {
        match self.facade.as_mut() {
            Some(facade) => facade.write_metadata(property, value),
            None => Ok(()),
        }
    }

    fn save(mut self, txn: &mut Transaction) -> Result<(), ContentError> {
        match self.facade.take() {
            Some(facade) => facade.save(txn),
            None => Ok(()),
        }
    }

    fn abort(mut self) -> Result<(), ContentError> {
        match self.facade.take() {
            Some(facade) => facade.abort(),
            None => Ok(()),
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Some(facade) = self.facade.take() {
            tracing::warn!(node = %self.node, "artifact session dropped unfinished, aborting");
            if let Err(error) = facade.abort() {
                tracing::error!(node = %self.node, %error, "unable to abort the metadata write");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{MimetypeContentFactory, StoredContentHandler, PROPERTIES_MIMETYPE};
    use crate::convert::BooleanConverter;
    use crate::extract::DefaultValueExtractor;
    use mdw_repo::{Artifact, ExecutionContext, NodeRecord, NodeStore, TransactionManager, TxnOptions};

    fn sequencer() -> WriteSequencer {
        let mapping = AttributeMapping::new()
            .with(QName::new("urn:cm", "title"), "Title")
            .with(QName::new("urn:cm", "flag"), "Flag");
        WriteSequencer::new(
            Arc::new(mapping),
            Arc::new(ConverterChain::new().with(Arc::new(BooleanConverter::new("Yes", "No")))),
            Arc::new(DefaultValueExtractor::new()),
            Arc::new(MimetypeContentFactory::new().with_handler(StoredContentHandler::default())),
        )
    }

    #[test]
    fn saves_mapped_and_converted_properties() {
        let store = Arc::new(NodeStore::new());
        let node = NodeRef::generate();
        store.insert(
            node.clone(),
            NodeRecord::new()
                .with_property(QName::new("urn:cm", "title"), "Report")
                .with_property(QName::new("urn:cm", "flag"), true)
                .with_property(QName::new("urn:cm", "owner"), "alice")
                .with_artifact(Artifact::new(PROPERTIES_MIMETYPE)),
        );
        let manager = TransactionManager::new(Arc::clone(&store));

        let mut txn = manager.begin(ExecutionContext::system(), TxnOptions::read_write());
        let props = txn.properties(&node).unwrap();
        let outcome = sequencer().write(&mut txn, &node, &props).unwrap();
        manager.commit(txn).unwrap();

        assert_eq!(outcome, SequenceOutcome::Saved { properties: 2 });
        let artifact = store.get(&node).unwrap().artifact.unwrap();
        assert_eq!(artifact.properties.get("Title"), Some(&Value::text("Report")));
        assert_eq!(artifact.properties.get("Flag"), Some(&Value::text("Yes")));
        assert_eq!(artifact.properties.len(), 2);
    }

    #[test]
    fn unsupported_artifact_fails_open() {
        let store = Arc::new(NodeStore::new());
        let node = NodeRef::generate();
        store.insert(node.clone(), NodeRecord::new().with_artifact(Artifact::new("image/tiff")));
        let manager = TransactionManager::new(store);

        let mut txn = manager.begin(ExecutionContext::system(), TxnOptions::read_write());
        let err = sequencer().write(&mut txn, &node, &BTreeMap::new()).unwrap_err();
        assert!(err.is_unsupported());
    }
}
