use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use faultreport::{
    AnnotationValue, Attributes, Collectors, Fault, ModuleDescriptor, ModuleResolver, RawFrame,
    RawTrace, Report, SymbolIdResolver, SymbolicationEntry, SymbolicationMode, TelemetrySource,
    ValidationError,
};
use serde_json::{Map, Value, json};

/// Telemetry that reports a different RSS on every read.
#[derive(Default)]
struct CountingTelemetry {
    reads: AtomicU64,
}

impl TelemetrySource for CountingTelemetry {
    fn read_memory_information(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("system.memory.total".to_owned(), 8_589_934_592u64.into());
        attributes
    }

    fn read_process_status(&self) -> Attributes {
        let read = self.reads.fetch_add(1, Ordering::SeqCst);
        let mut attributes = Attributes::new();
        attributes.insert("vm.rss.size".to_owned(), (4096 * (read + 1)).into());
        attributes.insert("a".to_owned(), 2.into());
        attributes
    }

    fn read_system_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("uname.sysname".to_owned(), "linux".into());
        attributes.insert("hostname".to_owned(), "builder-7".into());
        attributes
    }
}

struct StaticModule;

impl ModuleResolver for StaticModule {
    fn read_module(&self, path: &Path) -> (Option<ModuleDescriptor>, PathBuf) {
        let descriptor = ModuleDescriptor {
            name: "checkout".to_owned(),
            version: Some("3.1.4".to_owned()),
            ..ModuleDescriptor::default()
        };
        (Some(descriptor), path.to_path_buf())
    }
}

struct StaticSymbolIds;

impl SymbolIdResolver for StaticSymbolIds {
    fn symbol_id(&self, _file: &str) -> Option<String> {
        Some("0123456789abcdef".to_owned())
    }
}

#[derive(Debug)]
struct TypeError;

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cannot read properties of undefined")
    }
}

impl std::error::Error for TypeError {}

fn collectors() -> Collectors {
    Collectors::new()
        .with_telemetry(Arc::new(CountingTelemetry::default()))
        .with_module_resolver(Arc::new(StaticModule))
        .with_symbol_id_resolver(Arc::new(StaticSymbolIds))
}

fn trace() -> RawTrace {
    RawTrace::from_frames([
        RawFrame::new("/srv/checkout/src/cart.rs", 41).with_function("checkout::cart::total"),
        RawFrame::new("/srv/checkout/src/main.rs", 9).with_function("checkout::main"),
    ])
}

fn metadata(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("metadata must be a JSON object"),
    }
}

fn report(fault: Fault) -> Report {
    Report::new(fault.with_trace(trace()), Map::new(), Vec::<PathBuf>::new())
        .with_collectors(collectors())
}

#[tokio::test]
async fn test_payload_field_set() {
    let mut report = report(Fault::from_error(&TypeError));
    report.set_symbolication(false);
    let payload = report.finalize().await.unwrap();
    let value = serde_json::to_value(&payload).unwrap();

    let fields: HashSet<&str> = value
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    let expected: HashSet<&str> = [
        "uuid",
        "timestamp",
        "lang",
        "langVersion",
        "mainThread",
        "classifiers",
        "threads",
        "agent",
        "agentVersion",
        "annotations",
        "attributes",
        "sourceCode",
        "symbolication_maps",
    ]
    .into_iter()
    .collect();
    assert_eq!(fields, expected);

    assert_eq!(value["lang"], "rust");
    assert_eq!(value["agent"], "faultreport");
    assert_eq!(value["mainThread"], "main");
    assert_eq!(value["threads"]["main"]["fault"], true);
    assert_eq!(value["threads"]["main"]["stack"][0]["funcName"], "checkout::cart::total");
    assert_eq!(value["threads"]["main"]["stack"][1]["line"], 9);
    assert_eq!(value["symbolication_maps"], json!([]));
}

#[test]
fn test_uuid_format_and_uniqueness() {
    let uuid_pattern =
        regex::Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
            .unwrap();
    let mut seen = HashSet::new();
    for _ in 0..10_000 {
        let report = Report::new(
            Fault::from_message("probe").with_trace(RawTrace::empty()),
            Map::new(),
            Vec::<PathBuf>::new(),
        );
        assert!(uuid_pattern.is_match(report.uuid()), "{}", report.uuid());
        assert!(seen.insert(report.uuid().to_owned()));
    }
}

#[tokio::test]
async fn test_classifiers() {
    let error_report = report(Fault::from_error(&TypeError));
    assert_eq!(error_report.classifiers(), ["TypeError"]);
    assert!(error_report.is_fault_report());

    let message_report = report(Fault::from_message("oops"));
    assert!(message_report.classifiers().is_empty());
    assert!(!message_report.is_fault_report());

    let payload = message_report.finalize().await.unwrap();
    assert!(payload.classifiers.is_empty());
    assert_eq!(payload.attributes["error.message"].as_str(), Some("oops"));
    assert!(!payload.annotations.contains_key("Error"));
}

#[tokio::test]
async fn test_caller_attributes_beat_builtins() {
    let mut report = report(Fault::from_error(&TypeError));
    report.add_object_attributes(metadata(json!({"a": 1})));
    let payload = report.finalize().await.unwrap();

    assert_eq!(payload.attributes["a"].as_i64(), Some(1));
    assert_eq!(payload.attributes["hostname"].as_str(), Some("builder-7"));
    assert_eq!(payload.attributes["application"].as_str(), Some("checkout"));
    assert_eq!(payload.attributes["application.version"].as_str(), Some("3.1.4"));
    assert_eq!(
        payload.attributes["error.message"].as_str(),
        Some("cannot read properties of undefined")
    );
}

#[tokio::test]
async fn test_application_attribute_skips_module_resolution() {
    let mut report = report(Fault::from_message("deploy failed"));
    report.add_attribute("application", "custom");
    let payload = report.finalize().await.unwrap();
    assert_eq!(payload.attributes["application"].as_str(), Some("custom"));
    assert!(!payload.attributes.contains_key("application.version"));
}

#[tokio::test]
async fn test_metadata_classification() {
    let report = Report::new(
        Fault::from_message("quota").with_trace(trace()),
        metadata(json!({
            "x": {"nested": true},
            "y": 5,
            "skipped": false,
        })),
        ["/var/log/app.log"],
    )
    .with_collectors(collectors());

    assert_eq!(report.attachments(), [PathBuf::from("/var/log/app.log")]);
    let payload = report.finalize().await.unwrap();
    assert!(payload.annotations.contains_key("x"));
    assert!(!payload.attributes.contains_key("x"));
    assert_eq!(payload.attributes["y"].as_i64(), Some(5));
    assert!(!payload.annotations.contains_key("y"));
    assert!(!payload.attributes.contains_key("skipped"));
    assert!(payload.annotations.contains_key("Environment Variables"));
    assert!(payload.annotations.contains_key("Exec Arguments"));
}

#[tokio::test]
async fn test_error_annotation_and_caller_annotations() {
    let mut report = report(Fault::from_error(&TypeError));
    report
        .add_annotation("Retry", AnnotationValue::map([("attempt", 2)]))
        .unwrap();
    let payload = report.finalize().await.unwrap();

    assert_eq!(
        serde_json::to_value(&payload.annotations["Error"]).unwrap(),
        json!({
            "name": "TypeError",
            "message": "cannot read properties of undefined",
            "sources": [],
        })
    );
    assert_eq!(payload.annotations["Retry"], AnnotationValue::map([("attempt", 2)]));
}

#[tokio::test]
async fn test_symbolication_off_by_default() {
    let mut report = report(Fault::from_error(&TypeError));
    report.set_symbolication(false);
    let payload = report.finalize().await.unwrap();
    let value = serde_json::to_value(&payload).unwrap();
    assert!(value.get("symbolication").is_none());
    assert!(payload.symbolication_maps.is_empty());
}

#[tokio::test]
async fn test_symbolication_flag_resolves_frames() {
    let mut report = report(Fault::from_error(&TypeError));
    report.set_symbolication(true);
    let payload = report.finalize().await.unwrap();

    assert_eq!(payload.symbolication, Some(SymbolicationMode::DebugIdentifier));
    assert_eq!(payload.symbolication_maps.len(), 2);
    let stack = &payload.threads["main"].stack;
    assert_eq!(stack[0].debug_identifier.as_deref(), Some("0123456789abcdef"));

    let value = serde_json::to_value(&payload).unwrap();
    assert_eq!(value["symbolication"], "debug_identifier");
}

#[tokio::test]
async fn test_symbolication_id_attribute_activates_without_resolution() {
    let mut report = report(Fault::from_error(&TypeError));
    report.set_symbolication(true);
    report.add_attribute("symbolication_id", "build-77");
    let payload = report.finalize().await.unwrap();

    assert_eq!(payload.symbolication, Some(SymbolicationMode::DebugIdentifier));
    assert!(payload.symbolication_maps.is_empty());
    assert!(
        payload.threads["main"]
            .stack
            .iter()
            .all(|frame| frame.debug_identifier.is_none())
    );
}

/// Telemetry whose system attributes already identify the symbol map.
struct BuildTaggedTelemetry;

impl TelemetrySource for BuildTaggedTelemetry {
    fn read_memory_information(&self) -> Attributes {
        Attributes::new()
    }

    fn read_process_status(&self) -> Attributes {
        Attributes::new()
    }

    fn read_system_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("symbolication_id".to_owned(), "build-9".into());
        attributes
    }
}

#[tokio::test]
async fn test_telemetry_symbolication_id_activates_marker() {
    let mut report = report(Fault::from_error(&TypeError))
        .with_collectors(collectors().with_telemetry(Arc::new(BuildTaggedTelemetry)));
    report.set_symbolication(false);
    let payload = report.finalize().await.unwrap();

    assert_eq!(payload.attributes["symbolication_id"].as_str(), Some("build-9"));
    assert_eq!(payload.symbolication, Some(SymbolicationMode::DebugIdentifier));
    assert!(payload.symbolication_maps.is_empty());
}

#[tokio::test]
async fn test_explicit_map_wins() {
    let entry = SymbolicationEntry {
        file: "/srv/checkout/target/release/checkout".to_owned(),
        uuid: "feedface".to_owned(),
    };
    let mut report = report(Fault::from_error(&TypeError));
    report.set_symbolication(true);
    report.set_symbolication_map([entry.clone()]).unwrap();
    let payload = report.finalize().await.unwrap();

    assert_eq!(payload.symbolication, Some(SymbolicationMode::DebugIdentifier));
    assert_eq!(payload.symbolication_maps, [entry]);
}

#[tokio::test]
async fn test_invalid_symbolication_map_is_rejected() {
    let mut report = report(Fault::from_error(&TypeError));
    report.set_symbolication(false);

    let result = report.set_symbolication_map_value(&json!([
        {"file": "/srv/checkout/src/main.rs", "uuid": "abc"},
        {"file": "/srv/checkout/src/cart.rs"},
    ]));
    assert_eq!(
        result,
        Err(ValidationError::MissingField {
            index: 1,
            field: "uuid"
        })
    );

    let payload = report.finalize().await.unwrap();
    assert_eq!(payload.symbolication, None);
    assert!(payload.symbolication_maps.is_empty());
}

#[tokio::test]
async fn test_source_code_excerpts() {
    let directory = tempfile::tempdir().unwrap();
    let file = directory.path().join("worker.rs");
    let content: String = (1..=30).map(|i| format!("let x{i} = {i};\n")).collect();
    std::fs::write(&file, content).unwrap();
    let file = file.to_string_lossy().into_owned();

    let fault = Fault::from_message("stalled")
        .with_trace(RawTrace::from_frames([RawFrame::new(&file, 15)]));
    let mut report =
        Report::new(fault, Map::new(), Vec::<PathBuf>::new()).with_collectors(collectors());
    report.set_source_code_options(4, 3);
    let payload = report.finalize().await.unwrap();

    let excerpt = &payload.source_code[&file];
    assert_eq!(excerpt.start_line, 14);
    assert_eq!(excerpt.text, "let x14 = 14;\nlet x15 = 15;\nlet x16 = 16;");
    assert_eq!(
        payload.threads["main"].stack[0].source_code.as_deref(),
        Some(file.as_str())
    );
}

#[tokio::test]
async fn test_repeated_finalize() {
    let report = report(Fault::from_error(&TypeError)).seal();
    let first = report.finalize().await.unwrap();
    let second = report.finalize().await.unwrap();

    assert_eq!(first.uuid, second.uuid);
    assert_eq!(first.timestamp, second.timestamp);
    assert_eq!(first.classifiers, second.classifiers);
    assert_ne!(
        first.attributes["vm.rss.size"],
        second.attributes["vm.rss.size"]
    );
}

#[tokio::test]
async fn test_payload_is_a_snapshot() {
    let mut report = report(Fault::from_message("first"));
    let payload = report.finalize().await.unwrap();
    report.add_attribute("later", true);
    report.set_fault(Fault::from_error(&TypeError));

    assert!(!payload.attributes.contains_key("later"));
    assert!(payload.classifiers.is_empty());
    assert_eq!(report.classifiers(), ["TypeError"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_finalize_captured_trace_across_tasks() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            tokio::spawn(async move {
                let report = Report::from_message(format!("task {i}")).with_collectors(collectors());
                report.finalize().await
            })
        })
        .collect();

    let mut uuids = HashSet::new();
    for handle in handles {
        let payload = handle.await.unwrap().unwrap();
        assert!(uuids.insert(payload.uuid));
        assert_eq!(payload.threads.len(), 1);
        let top = payload.threads["main"].stack[0].function.as_deref().unwrap_or_default();
        assert!(
            top.contains("test_finalize_captured_trace_across_tasks"),
            "unexpected top frame {top}"
        );
    }
}

#[tokio::test]
async fn test_payload_json_round_trips_wire_names() {
    let payload = report(Fault::from_error(&TypeError)).finalize().await.unwrap();
    let json = payload.to_json().unwrap();
    let value: Value = serde_json::from_str(&json).unwrap();
    assert!(value["langVersion"].is_string());
    assert!(value["agentVersion"].is_string());
    assert!(value["timestamp"].is_i64());
}

#[tokio::test]
async fn test_unreadable_sources_degrade() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();

    let fault = Fault::from_error(&TypeError).with_trace(RawTrace::from_frames([
        RawFrame::new("/nonexistent/src/lib.rs", 3),
    ]));
    let report =
        Report::new(fault, Map::new(), Vec::<PathBuf>::new()).with_collectors(collectors());
    let payload = report.finalize().await.unwrap();

    assert!(payload.source_code.is_empty());
    assert_eq!(payload.threads["main"].stack.len(), 1);
    assert_eq!(payload.threads["main"].stack[0].source_code, None);
}
