//! Trace document serialization and path normalization

use rastro::engine::{CallOrigin, RawCallSignal, Tracer, TracerConfig};
use rastro::recorder::TRACE_FORMAT;
use rastro::value::Value;

fn call_from(callee: &str, file: &str, args: Vec<(&str, Value)>) -> RawCallSignal {
    RawCallSignal::Call {
        callee: callee.to_string(),
        origin: CallOrigin::Function,
        file: file.to_string(),
        line: 8,
        caller: None,
        args: args.into_iter().map(|(n, v)| (n.to_string(), v)).collect(),
    }
}

#[test]
fn test_saved_document_has_no_backslashes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.json");

    let mut config = TracerConfig::new();
    config.set_log_call_args(true);
    let mut tracer = Tracer::new(config);
    tracer.start();

    // Host-native separators in both a path field and an argument value
    tracer.notify(call_from(
        "load",
        r"C:\work\project\src\app.rs",
        vec![("path", Value::from(r"data\input.txt"))],
    ));
    tracer.notify(RawCallSignal::Return {
        value: Value::from(r"C:\work\out"),
    });

    tracer.save(Some(&path)).unwrap();
    assert!(tracer.is_enabled());

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(!written.contains('\\'));
    assert!(written.contains("C:/work/project/src/app.rs"));
    assert!(written.contains("data/input.txt"));
}

#[test]
fn test_document_round_trips_through_standard_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.json");

    let mut tracer = Tracer::default();
    tracer.start();
    tracer.notify(call_from("f", "app.rs", vec![]));
    tracer.notify(RawCallSignal::Return {
        value: Value::Int(1),
    });
    tracer.save(Some(&path)).unwrap();

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed["format"], TRACE_FORMAT);
    assert_eq!(parsed["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(parsed["summary"]["total_calls"], 1);
    assert_eq!(parsed["records"][0]["callee"], "f");
    assert_eq!(parsed["records"][0]["return_value"], 1);
}

#[test]
fn test_records_preserve_intercept_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.json");

    let mut tracer = Tracer::default();
    tracer.start();
    for name in ["a", "b", "c"] {
        tracer.notify(call_from(name, "app.rs", vec![]));
        tracer.notify(RawCallSignal::Return { value: Value::Null });
    }
    tracer.save(Some(&path)).unwrap();

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let callees: Vec<&str> = parsed["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["callee"].as_str().unwrap())
        .collect();
    assert_eq!(callees, vec!["a", "b", "c"]);

    let ordinals: Vec<u64> = parsed["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["ordinal"].as_u64().unwrap())
        .collect();
    assert!(ordinals.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn test_save_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("deep").join("trace.json");

    let mut tracer = Tracer::default();
    tracer.start();
    tracer.save(Some(&path)).unwrap();
    assert!(path.exists());
}

#[test]
fn test_divergences_serialized_into_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.json");

    let mut tracer = Tracer::default();
    tracer.add_return_trace("g", false, true, None);
    tracer.start();
    for value in [1, 2] {
        tracer.notify(call_from("g", "app.rs", vec![]));
        tracer.notify(RawCallSignal::Return {
            value: Value::Int(value),
        });
    }
    tracer.save(Some(&path)).unwrap();

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed["summary"]["divergences"], 1);
    assert_eq!(parsed["divergences"][0]["target"], "g");
    assert_eq!(parsed["divergences"][0]["observed"], 2);
}

#[test]
fn test_exceptions_recorded_with_error_field() {
    let mut tracer = Tracer::default();
    tracer.start();
    tracer.notify(call_from("f", "app.rs", vec![]));
    tracer.notify(RawCallSignal::Exception {
        message: "division by zero".to_string(),
    });

    let json = serde_json::to_value(tracer.document()).unwrap();
    assert_eq!(json["records"][0]["error"], "division by zero");
    assert!(json["records"][0].get("return_value").is_none());
}
