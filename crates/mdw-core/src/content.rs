//! Artifact content adapters
//!
//! A [`ContentFactory`] opens a [`ContentFacade`] session on a node's
//! artifact. A session accepts per-property writes and must end in exactly
//! one of `save` (durable) or `abort` (discard every write of the session).
//! Both consume the session, so a finished session cannot be reused.
//!
//! [`MimetypeContentFactory`] picks a [`ContentHandler`] by the artifact's
//! mimetype; an artifact no handler supports is
//! [`ContentError::Unsupported`].

use crate::error::ContentError;
use mdw_repo::{Artifact, NodeRef, Transaction, Value};
use std::fmt;
use std::sync::Arc;

/// Mimetype of the reference host's property-set artifacts
pub const PROPERTIES_MIMETYPE: &str = "application/x-mdw-properties";

/// Open artifact session
pub trait ContentFacade: Send {
    /// Write one property into the session
    ///
    /// # Errors
    /// `ContentError::Write` if the artifact rejects the property.
    fn write_metadata(&mut self, property: &str, value: &Value) -> Result<(), ContentError>;

    /// Persist all writes of the session
    ///
    /// # Errors
    /// Any failure to persist; nothing was saved.
    fn save(self: Box<Self>, txn: &mut Transaction) -> Result<(), ContentError>;

    /// Discard all writes of the session
    ///
    /// # Errors
    /// `ContentError::Abort` if the artifact could not be restored.
    fn abort(self: Box<Self>) -> Result<(), ContentError>;
}

/// Opens sessions on node artifacts
pub trait ContentFactory: Send + Sync + fmt::Debug {
    /// # Errors
    /// - `ContentError::NoArtifact` if the node carries no artifact
    /// - `ContentError::Unsupported` if the format is not handled
    /// - `ContentError::Io` or `ContentError::Txn` on access failures
    fn open(&self, txn: &Transaction, node: &NodeRef) -> Result<Box<dyn ContentFacade>, ContentError>;
}

/// Format-specific session provider
pub trait ContentHandler: Send + Sync + fmt::Debug {
    fn supports(&self, mimetype: &str) -> bool;

    /// # Errors
    /// Format-specific failures reading the artifact.
    fn open(&self, node: &NodeRef, artifact: Artifact) -> Result<Box<dyn ContentFacade>, ContentError>;
}

/// Dispatches to the first handler supporting the artifact's mimetype
#[derive(Debug, Clone, Default)]
pub struct MimetypeContentFactory {
    handlers: Vec<Arc<dyn ContentHandler>>,
}

impl MimetypeContentFactory {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_handler(mut self, handler: impl ContentHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn handler_for(&self, mimetype: &str) -> Option<&Arc<dyn ContentHandler>> {
        self.handlers.iter().find(|h| h.supports(mimetype))
    }

    #[inline]
    #[must_use]
    pub fn supports(&self, mimetype: &str) -> bool {
        self.handler_for(mimetype).is_some()
    }
}

impl ContentFactory for MimetypeContentFactory {
    fn open(&self, txn: &Transaction, node: &NodeRef) -> Result<Box<dyn ContentFacade>, ContentError> {
        let artifact = txn
            .artifact(node)?
            .ok_or_else(|| ContentError::NoArtifact(node.clone()))?;

        let Some(handler) = self.handler_for(&artifact.mimetype) else {
            return Err(ContentError::Unsupported {
                node: node.clone(),
                mimetype: artifact.mimetype,
            });
        };
        tracing::trace!(%node, mimetype = %artifact.mimetype, handler = ?handler, "opening artifact session");
        handler.open(node, artifact)
    }
}

/// Writes into the reference host's stored artifact property set
#[derive(Debug, Clone)]
pub struct StoredContentHandler {
    mimetypes: Vec<String>,
}

impl StoredContentHandler {
    /// Handle the given mimetypes instead of [`PROPERTIES_MIMETYPE`]
    #[must_use]
    pub fn for_mimetypes<I, S>(mimetypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mimetypes: mimetypes.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for StoredContentHandler {
    fn default() -> Self {
        Self::for_mimetypes([PROPERTIES_MIMETYPE])
    }
}

impl ContentHandler for StoredContentHandler {
    fn supports(&self, mimetype: &str) -> bool {
        self.mimetypes.iter().any(|m| m == mimetype)
    }

    fn open(&self, node: &NodeRef, artifact: Artifact) -> Result<Box<dyn ContentFacade>, ContentError> {
        Ok(Box::new(StoredSession {
            node: node.clone(),
            working: artifact,
        }))
    }
}

/// Edits a working copy; only `save` stages it on the transaction
struct StoredSession {
    node: NodeRef,
    working: Artifact,
}

impl ContentFacade for StoredSession {
    fn write_metadata(&mut self, property: &str, value: &Value) -> Result<(), ContentError> {
        if property.is_empty() {
            return Err(ContentError::Write {
                property: property.to_string(),
                reason: "empty property name".to_string(),
            });
        }
        self.working.properties.insert(property.to_string(), value.clone());
        Ok(())
    }

    fn save(self: Box<Self>, txn: &mut Transaction) -> Result<(), ContentError> {
        let Self { node, working } = *self;
        txn.set_artifact(&node, working)?;
        Ok(())
    }

    fn abort(self: Box<Self>) -> Result<(), ContentError> {
        tracing::trace!(node = %self.node, "discarding artifact working copy");
        Ok(())
    }
}
