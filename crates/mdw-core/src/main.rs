use anyhow::{bail, Context};
use chrono::{TimeZone, Utc};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use crossbeam::channel;
use mdw_core::content::PROPERTIES_MIMETYPE;
use mdw_core::logging::{self, LogFormat};
use mdw_core::model;
use mdw_core::{AttributeMapping, ConverterChain, MetadataService, MetadataServiceRegistry, WriterConfig};
use mdw_repo::{
    Artifact, ExecutionContext, NodeRecord, NodeRef, NodeStore, RetryingTransactionHelper,
    TransactionManager, TxnError, TxnOptions, Value,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEMO_CONFIG: &str = r#"
service_name = "demo"
timeout_ms = 10000

[namespaces]
cm = "http://www.alfresco.org/model/content/1.0"

[[mapping]]
property = "Title"
attribute = "cm:title"

[[mapping]]
property = "Author"
attribute = "cm:author"

[[mapping]]
property = "Modified"
attribute = "cm:modified"

[[mapping]]
property = "Keywords"
attribute = "cm:keywords"

[[mapping]]
property = "Reviewed"
attribute = "cm:reviewed"

[[converter]]
kind = "date"
format = "%Y-%m-%d"

[[converter]]
kind = "list"
separator = "; "

[[converter]]
kind = "boolean"
"#;

fn main() -> anyhow::Result<()> {
    let cli = Command::new("mdw")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Deferred metadata writer")
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("check")
                .about("Validate a configuration file and print the resolved mapping")
                .arg(
                    Arg::new("config")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to the TOML configuration"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run writes end to end against an in-memory repository")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to the TOML configuration (built-in demo if omitted)"),
                )
                .arg(
                    Arg::new("nodes")
                        .long("nodes")
                        .default_value("100")
                        .value_parser(value_parser!(usize))
                        .help("Number of nodes to update"),
                ),
        );

    let matches = cli.get_matches();
    logging::init(if matches.get_flag("log-json") {
        LogFormat::Json
    } else {
        LogFormat::Text
    });

    match matches.subcommand() {
        Some(("check", args)) => check(args),
        Some(("simulate", args)) => simulate(args),
        _ => Ok(()),
    }
}

fn check(args: &ArgMatches) -> anyhow::Result<()> {
    let path = args
        .get_one::<PathBuf>("config")
        .context("missing config path")?;
    let config = WriterConfig::load(path)?;
    let namespaces = config.namespace_registry();
    let mapping = AttributeMapping::from_entries(&config.mapping, &namespaces);
    let chain = ConverterChain::from_config(&config.converter)?;
    let dropped = config.mapping.len() - mapping.len();

    if args.get_flag("json") {
        let report = serde_json::json!({
            "service_name": config.service_name,
            "timeout_ms": config.timeout_ms,
            "mapping": mapping
                .iter()
                .map(|(name, property)| serde_json::json!({
                    "property": property,
                    "attribute": name.to_string(),
                }))
                .collect::<Vec<_>>(),
            "dropped": dropped,
            "converters": chain.names(),
            "pool": config.pool,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Service: {}", config.service_name);
        println!("Timeout: {}ms", config.timeout_ms);
        println!();
        println!("Mapping ({} entries, {} dropped):", mapping.len(), dropped);
        for (name, property) in mapping.iter() {
            println!("  {property:<20} <- {}", namespaces.prefixed(name));
        }
        println!();
        println!("Converters: {}", chain.names().join(" -> "));
        println!(
            "Pool: max_workers={} shutdown_grace={}ms",
            config.pool.max_workers, config.pool.shutdown_grace_ms
        );
    }

    if mapping.is_empty() {
        bail!("no usable mapping entries");
    }
    Ok(())
}

fn simulate(args: &ArgMatches) -> anyhow::Result<()> {
    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => WriterConfig::load(path)?,
        None => WriterConfig::from_toml_str(DEMO_CONFIG)?,
    };
    let nodes = *args.get_one::<usize>("nodes").context("missing node count")?;
    let namespaces = config.namespace_registry();

    let store = Arc::new(NodeStore::new());
    let manager = Arc::new(TransactionManager::new(Arc::clone(&store)));
    let helper = RetryingTransactionHelper::new(manager);

    let title = namespaces.resolve("cm:title").ok();
    let created = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).single();
    let refs: Vec<NodeRef> = (0..nodes)
        .map(|i| {
            let node = NodeRef::generate();
            let mut record = NodeRecord::new();
            for (attribute, value) in demo_properties(i, created) {
                if let Ok(name) = namespaces.resolve(attribute) {
                    record.properties.insert(name, value);
                }
            }
            if i % 7 != 6 {
                let mimetype = if i % 5 == 4 { "application/pdf" } else { PROPERTIES_MIMETYPE };
                record = record.with_artifact(Artifact::new(mimetype));
            }
            if i % 10 == 9 {
                record = record.with_property(model::prop_fail_on_unsupported(), false);
            }
            store.insert(node.clone(), record.versionable());
            node
        })
        .collect();

    let service = Arc::new(MetadataService::builder(config, helper.clone()).build()?);
    let registry = MetadataServiceRegistry::new();
    service.register(&registry);

    println!("Running simulation...");
    println!("Service: {}", service.service_name());
    println!("Nodes: {nodes}");
    println!();

    let (tx, rx) = channel::unbounded();
    let started = Instant::now();
    for (i, node) in refs.iter().enumerate() {
        let service = registry
            .get(service.service_name())
            .context("service not registered")?;
        let tx = tx.clone();
        let result = helper.do_in_transaction(
            &ExecutionContext::user("simulator"),
            TxnOptions::read_write(),
            |txn| {
                if let Some(title) = &title {
                    txn.set_property(node, title.clone(), format!("Document {i} (rev)"))?;
                }
                let tx = tx.clone();
                service.write_with_callback(txn, node, move |outcome| {
                    // Receiver outlives every callback.
                    let _ = tx.send(outcome.label());
                });
                Ok::<_, TxnError>(())
            },
        );
        if let Err(err) = result {
            if !err.is_committed() {
                return Err(err.into());
            }
            tracing::warn!(%node, error = %err, "post-commit dispatch reported a failure");
        }
    }
    drop(tx);

    let mut outcomes: BTreeMap<&'static str, usize> = BTreeMap::new();
    while let Ok(label) = rx.recv_timeout(Duration::from_secs(30)) {
        *outcomes.entry(label).or_default() += 1;
    }
    let elapsed = started.elapsed();
    let revisions: u32 = refs
        .iter()
        .filter_map(|node| store.get(node))
        .map(|record| record.revision)
        .sum();

    service.stop();
    let stats = service.stats();

    println!("Simulation Report:");
    for (label, count) in &outcomes {
        println!("  {label:<10} {count}");
    }
    println!("  Dispatched: {}", stats.dispatched);
    println!("  Timed out: {}", stats.timed_out);
    println!("  Worker failures: {}", stats.worker_failures);
    println!("  Revisions created: {revisions}");
    println!("  Elapsed: {}ms", elapsed.as_millis());

    let healthy = stats.timed_out == 0 && stats.worker_failures == 0 && revisions == 0;
    std::process::exit(if healthy { 0 } else { 1 });
}

fn demo_properties(
    i: usize,
    created: Option<chrono::DateTime<Utc>>,
) -> Vec<(&'static str, Value)> {
    let mut props = vec![
        ("cm:title", Value::text(format!("Document {i}"))),
        ("cm:author", Value::text(format!("author-{}", i % 3))),
        ("cm:reviewed", Value::Bool(i % 2 == 0)),
        (
            "cm:keywords",
            Value::List(vec![Value::text("demo"), Value::text(format!("batch-{}", i / 10))]),
        ),
        ("cm:description", Value::text("not mapped")),
    ];
    if let Some(created) = created {
        props.push(("cm:modified", Value::DateTime(created)));
    }
    props
}
