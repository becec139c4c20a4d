//! End-to-end writes through a running service

use crossbeam::channel::{self, Receiver};
use mdw_core::model;
use mdw_core::{AcceptAll, MetadataService, MetadataServiceRegistry, WriteOutcome};
use mdw_repo::{NodeRecord, Principal, TxnError, Value};
use mdw_test_utils::{ContentCall, Fixture, OpenFailure, RecordingContentFactory, RecordingVerifier};
use pretty_assertions::assert_eq;
use std::time::Duration;

/// Summary of an outcome, sent from the callback
#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Written(usize),
    Declined,
    Aborted(String),
    Tolerated,
    Failed,
    Cancelled,
}

impl From<&WriteOutcome> for Seen {
    fn from(outcome: &WriteOutcome) -> Self {
        match outcome {
            WriteOutcome::Written { properties } => Self::Written(*properties),
            WriteOutcome::Declined => Self::Declined,
            WriteOutcome::Aborted { property, .. } => Self::Aborted(property.clone()),
            WriteOutcome::Tolerated(_) => Self::Tolerated,
            WriteOutcome::Failed(_) => Self::Failed,
            WriteOutcome::Cancelled => Self::Cancelled,
        }
    }
}

fn service(fx: &Fixture, content: &RecordingContentFactory) -> MetadataService {
    MetadataService::builder(Fixture::config(), fx.helper.clone())
        .content(content.clone())
        .verifier(AcceptAll)
        .build()
        .unwrap()
}

fn write_and_watch(fx: &Fixture, service: &MetadataService, node: &mdw_repo::NodeRef) -> Receiver<Seen> {
    let (tx, rx) = channel::unbounded();
    fx.in_user_txn(|txn| {
        let tx = tx.clone();
        service.write_with_callback(txn, node, move |outcome| {
            tx.send(Seen::from(outcome)).unwrap();
        });
        Ok(())
    })
    .unwrap();
    rx
}

fn seen(rx: &Receiver<Seen>) -> Seen {
    rx.recv_timeout(Duration::from_secs(5)).unwrap()
}

#[test]
fn scenario_a_single_mapped_attribute_is_written_and_saved() {
    let fx = Fixture::new();
    let content = RecordingContentFactory::new();
    let service = service(&fx, &content);
    let node = fx.create_document(&[("title", Value::text("Report"))]);

    let rx = write_and_watch(&fx, &service, &node);

    assert_eq!(seen(&rx), Seen::Written(1));
    assert_eq!(
        content.calls(),
        vec![
            ContentCall::Open(node.clone()),
            ContentCall::Write {
                property: "Title".to_string(),
                value: Value::text("Report"),
            },
            ContentCall::Save(node.clone()),
        ]
    );
    let artifact = fx.artifact(&node).unwrap();
    assert_eq!(artifact.properties.get("Title"), Some(&Value::text("Report")));
}

#[test]
fn scenario_b_failed_write_aborts_session() {
    let fx = Fixture::new();
    let content = RecordingContentFactory::new().fail_write_on("Title");
    let service = service(&fx, &content);
    let node = fx.create_document(&[("title", Value::text("Report"))]);

    let rx = write_and_watch(&fx, &service, &node);

    assert_eq!(seen(&rx), Seen::Aborted("Title".to_string()));
    assert_eq!(content.aborts(), 1);
    assert_eq!(content.saves(), 0);
    assert!(fx.artifact(&node).unwrap().properties.is_empty());
}

#[test]
fn failed_write_skips_remaining_properties() {
    let fx = Fixture::new();
    let content = RecordingContentFactory::new().fail_write_on("Author");
    let service = service(&fx, &content);
    let node = fx.create_document(&[
        ("subject", Value::text("Finance")),
        ("author", Value::text("alice")),
        ("title", Value::text("Report")),
    ]);

    let rx = write_and_watch(&fx, &service, &node);

    assert_eq!(seen(&rx), Seen::Aborted("Author".to_string()));
    assert_eq!(content.written(), ["Title", "Author"]);
    assert!(fx.artifact(&node).unwrap().properties.is_empty());
}

#[test]
fn scenario_c_declined_node_opens_no_session() {
    let fx = Fixture::new();
    let content = RecordingContentFactory::new();
    let verifier = RecordingVerifier::declining();
    let service = MetadataService::builder(Fixture::config(), fx.helper.clone())
        .content(content.clone())
        .verifier(verifier.clone())
        .build()
        .unwrap();
    let node = fx.create_document(&[("title", Value::text("Report"))]);

    let rx = write_and_watch(&fx, &service, &node);

    assert_eq!(seen(&rx), Seen::Declined);
    assert_eq!(verifier.calls(), 1);
    assert!(content.calls().is_empty());
}

#[test]
fn scenario_e_tolerated_unsupported_format_still_calls_back() {
    let fx = Fixture::new();
    let content = RecordingContentFactory::new().fail_open(OpenFailure::Unsupported);
    let service = service(&fx, &content);
    let node = fx.create_node(
        NodeRecord::new()
            .with_property(Fixture::qname("title"), "Report")
            .with_property(model::prop_fail_on_unsupported(), false),
    );

    let rx = write_and_watch(&fx, &service, &node);

    assert_eq!(seen(&rx), Seen::Tolerated);
    assert_eq!(service.stats().completed, 1);
}

#[test]
fn unsupported_format_fails_by_default_without_reaching_committer() {
    let fx = Fixture::new();
    let content = RecordingContentFactory::new().fail_open(OpenFailure::Unsupported);
    let service = service(&fx, &content);
    let node = fx.create_document(&[("title", Value::text("Report"))]);

    let rx = write_and_watch(&fx, &service, &node);

    assert_eq!(seen(&rx), Seen::Failed);
}

#[test]
fn default_gate_declines_nodes_without_artifact() {
    let fx = Fixture::new();
    let content = RecordingContentFactory::new();
    let service = MetadataService::builder(Fixture::config(), fx.helper.clone())
        .content(content.clone())
        .build()
        .unwrap();
    let node = fx.create_node(NodeRecord::new().with_property(Fixture::qname("title"), "Report"));

    let rx = write_and_watch(&fx, &service, &node);

    assert_eq!(seen(&rx), Seen::Declined);
    assert_eq!(content.opens(), 0);
}

#[test]
fn writer_sees_committed_state_and_runs_as_system() {
    let fx = Fixture::new();
    let content = RecordingContentFactory::new();
    let service = service(&fx, &content);
    let node = fx.create_document(&[("title", Value::text("Draft"))]);

    fx.in_user_txn(|txn| {
        txn.set_property(&node, Fixture::qname("title"), "Final")?;
        service.write(txn, &node);
        Ok(())
    })
    .unwrap();

    let record = fx.record(&node);
    let artifact = record.artifact.unwrap();
    assert_eq!(artifact.properties.get("Title"), Some(&Value::text("Final")));
    assert_eq!(record.modified_by, Some(Principal::System));
    assert_eq!(record.version, 2);
}

#[test]
fn artifact_update_does_not_create_revision() {
    let fx = Fixture::new();
    let content = RecordingContentFactory::new();
    let service = service(&fx, &content);
    let node = fx.create_node(
        NodeRecord::new()
            .with_property(Fixture::qname("title"), "Report")
            .with_artifact(mdw_repo::Artifact::new("application/x-mdw-properties"))
            .versionable(),
    );

    let rx = write_and_watch(&fx, &service, &node);

    assert_eq!(seen(&rx), Seen::Written(1));
    let record = fx.record(&node);
    assert_eq!(record.revision, 0);
    assert!(record.artifact.unwrap().properties.contains_key("Title"));
}

#[test]
fn user_transaction_error_is_untouched_by_writer() {
    let fx = Fixture::new();
    let content = RecordingContentFactory::new();
    let service = service(&fx, &content);
    let node = fx.create_document(&[("title", Value::text("Report"))]);

    let err = fx
        .in_user_txn(|txn| {
            service.write(txn, &node);
            Err(TxnError::NodeNotFound(node.clone()))
        })
        .unwrap_err();

    assert!(matches!(err, TxnError::NodeNotFound(_)));
    assert!(content.calls().is_empty());
    assert_eq!(service.stats().dispatched, 0);
}

#[test]
fn services_register_by_name() {
    let fx = Fixture::new();
    let registry = MetadataServiceRegistry::new();

    let office = std::sync::Arc::new(
        MetadataService::builder(Fixture::config().with_service_name("office"), fx.helper.clone())
            .build()
            .unwrap(),
    );
    let pdf = std::sync::Arc::new(
        MetadataService::builder(Fixture::config().with_service_name("pdf"), fx.helper.clone())
            .build()
            .unwrap(),
    );
    office.register(&registry);
    pdf.register(&registry);

    assert_eq!(registry.names(), ["office", "pdf"]);
    assert_eq!(registry.get("pdf").unwrap().service_name(), "pdf");
    assert!(registry.get("image").is_none());
    assert!(registry.unregister("office").is_some());
    assert_eq!(registry.len(), 1);
}
