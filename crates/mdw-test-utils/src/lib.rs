//! Testing utilities for MDW workspace
//!
//! Recording fakes for the writer's collaborators, an in-memory repository
//! fixture, and a tracing layer that captures log events.

#![allow(missing_docs)]

use mdw_core::content::{ContentFacade, ContentFactory, PROPERTIES_MIMETYPE};
use mdw_core::{ContentError, NodeVerifier, WriterConfig};
use mdw_repo::{
    Artifact, ExecutionContext, NamespaceRegistry, NodeRecord, NodeRef, NodeStore, QName,
    RetryPolicy, RetryingTransactionHelper, Transaction, TransactionManager, TxnError, TxnOptions,
    Value,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

pub const CM_URI: &str = "urn:test:cm";

// ---------------------------------------------------------------------------
// Content factory
// ---------------------------------------------------------------------------

/// One call made against the recording content factory
#[derive(Debug, Clone, PartialEq)]
pub enum ContentCall {
    Open(NodeRef),
    Write { property: String, value: Value },
    Save(NodeRef),
    Abort(NodeRef),
}

/// How opening a session fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    Unsupported,
    Io,
    Panic,
}

#[derive(Debug, Default)]
struct Script {
    open: Option<OpenFailure>,
    write_on: Option<String>,
    save: bool,
    abort: bool,
    open_delay: Option<Duration>,
}

/// Content factory that records calls and fails on demand
///
/// Sessions edit a working copy of the node's artifact (an empty
/// properties artifact if it has none) and stage it on save.
#[derive(Debug, Clone, Default)]
pub struct RecordingContentFactory {
    calls: Arc<Mutex<Vec<ContentCall>>>,
    script: Arc<Mutex<Script>>,
}

impl RecordingContentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_open(self, failure: OpenFailure) -> Self {
        self.script.lock().open = Some(failure);
        self
    }

    pub fn fail_write_on(self, property: impl Into<String>) -> Self {
        self.script.lock().write_on = Some(property.into());
        self
    }

    pub fn fail_save(self) -> Self {
        self.script.lock().save = true;
        self
    }

    pub fn fail_abort(self) -> Self {
        self.script.lock().abort = true;
        self
    }

    pub fn open_delay(self, delay: Duration) -> Self {
        self.script.lock().open_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<ContentCall> {
        self.calls.lock().clone()
    }

    pub fn opens(&self) -> usize {
        self.count(|c| matches!(c, ContentCall::Open(_)))
    }

    pub fn saves(&self) -> usize {
        self.count(|c| matches!(c, ContentCall::Save(_)))
    }

    pub fn aborts(&self) -> usize {
        self.count(|c| matches!(c, ContentCall::Abort(_)))
    }

    /// Properties written, in call order
    pub fn written(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                ContentCall::Write { property, .. } => Some(property.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, f: impl Fn(&ContentCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| f(c)).count()
    }
}

impl ContentFactory for RecordingContentFactory {
    fn open(&self, txn: &Transaction, node: &NodeRef) -> Result<Box<dyn ContentFacade>, ContentError> {
        let (failure, delay, write_on, save, abort) = {
            let script = self.script.lock();
            (
                script.open,
                script.open_delay,
                script.write_on.clone(),
                script.save,
                script.abort,
            )
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.calls.lock().push(ContentCall::Open(node.clone()));

        match failure {
            Some(OpenFailure::Unsupported) => {
                return Err(ContentError::Unsupported {
                    node: node.clone(),
                    mimetype: "application/x-unknown".to_string(),
                })
            }
            Some(OpenFailure::Io) => {
                return Err(ContentError::Io(std::io::Error::other("disk on fire")))
            }
            Some(OpenFailure::Panic) => panic!("content adapter exploded"),
            None => {}
        }

        let working = txn
            .artifact(node)?
            .unwrap_or_else(|| Artifact::new(PROPERTIES_MIMETYPE));
        Ok(Box::new(RecordingSession {
            node: node.clone(),
            working,
            calls: Arc::clone(&self.calls),
            write_on,
            save,
            abort,
        }))
    }
}

struct RecordingSession {
    node: NodeRef,
    working: Artifact,
    calls: Arc<Mutex<Vec<ContentCall>>>,
    write_on: Option<String>,
    save: bool,
    abort: bool,
}

impl ContentFacade for RecordingSession {
    fn write_metadata(&mut self, property: &str, value: &Value) -> Result<(), ContentError> {
        self.calls.lock().push(ContentCall::Write {
            property: property.to_string(),
            value: value.clone(),
        });
        if self.write_on.as_deref() == Some(property) {
            return Err(ContentError::Write {
                property: property.to_string(),
                reason: "property is read-only in this format".to_string(),
            });
        }
        self.working.properties.insert(property.to_string(), value.clone());
        Ok(())
    }

    fn save(self: Box<Self>, txn: &mut Transaction) -> Result<(), ContentError> {
        self.calls.lock().push(ContentCall::Save(self.node.clone()));
        if self.save {
            return Err(ContentError::Save("artifact locked".to_string()));
        }
        let Self { node, working, .. } = *self;
        txn.set_artifact(&node, working)?;
        Ok(())
    }

    fn abort(self: Box<Self>) -> Result<(), ContentError> {
        self.calls.lock().push(ContentCall::Abort(self.node.clone()));
        if self.abort {
            return Err(ContentError::Abort("working copy vanished".to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

/// Verifier with a fixed answer that counts its calls
#[derive(Debug, Clone)]
pub struct RecordingVerifier {
    accept: bool,
    calls: Arc<AtomicUsize>,
}

impl RecordingVerifier {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            calls: Arc::default(),
        }
    }

    pub fn declining() -> Self {
        Self {
            accept: false,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NodeVerifier for RecordingVerifier {
    fn verify(&self, _txn: &Transaction, _node: &NodeRef) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.accept
    }
}

// ---------------------------------------------------------------------------
// Repository fixture
// ---------------------------------------------------------------------------

/// In-memory repository with a fast-retrying helper
#[derive(Debug, Clone)]
pub struct Fixture {
    pub store: Arc<NodeStore>,
    pub manager: Arc<TransactionManager>,
    pub helper: RetryingTransactionHelper,
    pub namespaces: NamespaceRegistry,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(NodeStore::new());
        let manager = Arc::new(TransactionManager::new(Arc::clone(&store)));
        let helper = RetryingTransactionHelper::with_policy(
            Arc::clone(&manager),
            RetryPolicy {
                max_retries: 5,
                min_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
        );
        Self {
            store,
            manager,
            helper,
            namespaces: NamespaceRegistry::new().with("cm", CM_URI),
        }
    }

    /// Config mapping `cm:title`, `cm:author` and `cm:subject`
    pub fn config() -> WriterConfig {
        WriterConfig::new()
            .with_service_name("test")
            .with_timeout_ms(5_000)
            .with_namespace("cm", CM_URI)
            .with_mapping("Title", "cm:title")
            .with_mapping("Author", "cm:author")
            .with_mapping("Subject", "cm:subject")
    }

    pub fn qname(local: &str) -> QName {
        QName::new(CM_URI, local)
    }

    /// Node with `cm:` attributes and an empty properties artifact
    pub fn create_document(&self, props: &[(&str, Value)]) -> NodeRef {
        let record = props
            .iter()
            .fold(NodeRecord::new(), |r, (local, value)| {
                r.with_property(Self::qname(local), value.clone())
            })
            .with_artifact(Artifact::new(PROPERTIES_MIMETYPE));
        self.create_node(record)
    }

    pub fn create_node(&self, record: NodeRecord) -> NodeRef {
        let node = NodeRef::generate();
        self.store.insert(node.clone(), record);
        node
    }

    pub fn record(&self, node: &NodeRef) -> NodeRecord {
        self.store.get(node).unwrap_or_default()
    }

    pub fn artifact(&self, node: &NodeRef) -> Option<Artifact> {
        self.store.get(node).and_then(|r| r.artifact)
    }

    /// Run `work` as a user in a committed transaction
    pub fn in_user_txn<F>(&self, work: F) -> Result<(), TxnError>
    where
        F: FnMut(&mut Transaction) -> Result<(), TxnError>,
    {
        self.helper
            .do_in_transaction(&ExecutionContext::user("alice"), TxnOptions::read_write(), work)
    }
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

/// A captured log event
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: String,
}

/// Shared storage for captured events
#[derive(Debug, Clone, Default)]
pub struct LogStore(Arc<Mutex<Vec<CapturedEvent>>>);

impl LogStore {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.0.lock().clone()
    }

    pub fn at_least(&self, level: Level) -> Vec<CapturedEvent> {
        self.0
            .lock()
            .iter()
            .filter(|e| e.level <= level)
            .cloned()
            .collect()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.0
            .lock()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.0 = value.to_string();
        }
    }
}

struct CaptureLayer(LogStore);

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.0 .0.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.0,
        });
    }
}

/// Capture events emitted on the current thread until the guard drops
pub fn capture_logs() -> (LogStore, tracing::subscriber::DefaultGuard) {
    let store = LogStore::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer(store.clone()));
    let guard = tracing::subscriber::set_default(subscriber);
    (store, guard)
}
