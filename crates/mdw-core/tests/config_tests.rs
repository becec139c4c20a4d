//! Services built from configuration files

use chrono::{TimeZone, Utc};
use mdw_core::{ConfigError, Error, MetadataService, WriterConfig};
use mdw_test_utils::{Fixture, CM_URI};
use mdw_repo::{Artifact, NodeRecord, QName, Value};
use pretty_assertions::assert_eq;
use std::io::Write;

const CONFIG: &str = r#"
service_name = "office"
timeout_ms = 2000

[namespaces]
cm = "urn:test:cm"

[[mapping]]
property = "Title"
attribute = "cm:title"

[[mapping]]
property = "Modified"
attribute = "cm:modified"

[[mapping]]
property = "Keywords"
attribute = "cm:keywords"

[[mapping]]
property = "Reviewed"
attribute = "cm:reviewed"

[[mapping]]
property = "Lost"
attribute = "xx:unknown"

[[converter]]
kind = "date"
format = "%Y-%m-%d"

[[converter]]
kind = "list"
separator = "; "

[[converter]]
kind = "boolean"

[pool]
max_workers = 4
shutdown_grace_ms = 500
"#;

fn write_config(source: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(source.as_bytes()).unwrap();
    file
}

#[test]
fn loaded_config_drives_the_default_pipeline() {
    let file = write_config(CONFIG);
    let config = WriterConfig::load(file.path()).unwrap();
    assert_eq!(config.pool.max_workers, 4);

    let fx = Fixture::new();
    let service = MetadataService::builder(config, fx.helper.clone()).build().unwrap();
    assert_eq!(service.service_name(), "office");
    assert_eq!(service.mapping().len(), 4);
    assert_eq!(service.converters().names(), ["date", "list", "boolean"]);

    let cm = |local: &str| QName::new(CM_URI, local);
    let node = fx.create_node(
        NodeRecord::new()
            .with_property(cm("title"), "Quarterly report")
            .with_property(cm("modified"), Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap())
            .with_property(
                cm("keywords"),
                Value::List(vec![Value::text("finance"), Value::Null, Value::text("q1")]),
            )
            .with_property(cm("reviewed"), true)
            .with_property(cm("description"), "not mapped")
            .with_artifact(Artifact::new(mdw_core::content::PROPERTIES_MIMETYPE))
            .versionable(),
    );

    fx.in_user_txn(|txn| {
        service.write(txn, &node);
        Ok(())
    })
    .unwrap();

    let record = fx.record(&node);
    let written = record.artifact.unwrap().properties;
    assert_eq!(written.get("Title"), Some(&Value::text("Quarterly report")));
    assert_eq!(written.get("Modified"), Some(&Value::text("2024-01-15")));
    assert_eq!(written.get("Keywords"), Some(&Value::text("finance; q1")));
    assert_eq!(written.get("Reviewed"), Some(&Value::text("Yes")));
    assert_eq!(written.len(), 4);
    assert_eq!(record.revision, 0);
    service.stop();
}

#[test]
fn unsupported_artifact_fails_through_default_factory() {
    let fx = Fixture::new();
    let service = MetadataService::builder(Fixture::config(), fx.helper.clone())
        .build()
        .unwrap();
    let node = fx.create_node(
        NodeRecord::new()
            .with_property(Fixture::qname("title"), "Scan")
            .with_artifact(Artifact::new("image/tiff")),
    );
    let (tx, rx) = crossbeam::channel::bounded(1);

    fx.in_user_txn(|txn| {
        let tx = tx.clone();
        service.write_with_callback(txn, &node, move |outcome| {
            tx.send(outcome.label()).unwrap();
        });
        Ok(())
    })
    .unwrap();

    assert_eq!(rx.recv().unwrap(), "failed");
    assert!(fx.artifact(&node).unwrap().properties.is_empty());
}

#[test]
fn invalid_config_is_rejected_by_builder() {
    let fx = Fixture::new();
    let err = MetadataService::builder(Fixture::config().with_timeout_ms(0), fx.helper.clone())
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::Invalid(_))));
}

#[test]
fn unknown_keys_fail_to_parse() {
    let file = write_config("service_name = \"x\"\nretries = 3\n");
    let err = WriterConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}
