//! Engine lifecycle: idempotent start/stop, pause/resume, scoped save

use rastro::engine::{CallOrigin, RawCallSignal, SharedTracer, TraceGuard, Tracer};
use rastro::value::Value;

fn call(callee: &str, args: Vec<(&str, Value)>) -> RawCallSignal {
    RawCallSignal::Call {
        callee: callee.to_string(),
        origin: CallOrigin::Function,
        file: "app.rs".to_string(),
        line: 1,
        caller: None,
        args: args.into_iter().map(|(n, v)| (n.to_string(), v)).collect(),
    }
}

fn ret(value: Value) -> RawCallSignal {
    RawCallSignal::Return { value }
}

#[test]
fn test_double_start_equivalent_to_single() {
    let mut a = Tracer::default();
    a.start();
    let mut b = Tracer::default();
    b.start();
    b.start();

    assert_eq!(a.is_enabled(), b.is_enabled());
    a.notify(call("f", vec![]));
    a.notify(ret(Value::Int(1)));
    b.notify(call("f", vec![]));
    b.notify(ret(Value::Int(1)));
    assert_eq!(a.recorder().len(), b.recorder().len());
}

#[test]
fn test_double_stop_equivalent_to_single() {
    let mut tracer = Tracer::default();
    tracer.start();
    tracer.stop();
    tracer.stop();
    assert!(!tracer.is_enabled());
}

#[test]
fn test_paused_calls_suppressed_ids_strictly_increase() {
    let mut tracer = Tracer::default();
    tracer.start();

    tracer.notify(call("before", vec![]));
    tracer.notify(ret(Value::Int(1)));

    tracer.pause();
    tracer.notify(call("hidden", vec![]));
    tracer.notify(ret(Value::Int(2)));
    tracer.resume();

    tracer.notify(call("after", vec![]));
    tracer.notify(ret(Value::Int(3)));

    let records = tracer.recorder().records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].callee, "before");
    assert_eq!(records[1].callee, "after");
    assert!(records[1].call_id > records[0].call_id);
}

#[test]
fn test_paused_nesting_keeps_depth_consistent() {
    let mut tracer = Tracer::default();
    tracer.start();

    tracer.notify(call("outer", vec![]));
    tracer.pause();
    // Nested call enters and leaves while paused
    tracer.notify(call("hidden", vec![]));
    tracer.notify(ret(Value::Null));
    tracer.resume();
    tracer.notify(call("inner", vec![]));
    tracer.notify(ret(Value::Null));
    tracer.notify(ret(Value::Null));

    let records = tracer.recorder().records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].depth, 0);
    assert_eq!(records[1].depth, 1);
    assert_eq!(records[1].callee, "inner");
}

#[test]
fn test_save_keeps_engine_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.json");
    let mut tracer = Tracer::default();
    tracer.start();
    tracer.notify(call("f", vec![]));
    tracer.notify(ret(Value::Int(1)));

    tracer.save(Some(&path)).unwrap();
    assert!(tracer.is_enabled());

    // Interception keeps working after save
    tracer.notify(call("g", vec![]));
    tracer.notify(ret(Value::Int(2)));
    assert_eq!(tracer.recorder().len(), 2);
}

#[test]
fn test_trace_guard_saves_even_when_block_panics() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("panic.json");
    let tracer = SharedTracer::default();

    let result = std::panic::catch_unwind({
        let tracer = tracer.clone();
        let path = path.clone();
        move || {
            let _guard = TraceGuard::new(&tracer, path);
            tracer.notify(call("f", vec![]));
            tracer.notify(ret(Value::Int(1)));
            panic!("traced block failure");
        }
    });
    assert!(result.is_err());
    assert!(path.exists());
    assert!(!tracer.lock().is_enabled());

    let written = std::fs::read_to_string(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(parsed["records"][0]["callee"], "f");
}

#[test]
fn test_stop_preserves_buffered_trace_for_serialization() {
    let mut tracer = Tracer::default();
    tracer.start();
    tracer.notify(call("f", vec![]));
    tracer.notify(ret(Value::Int(1)));
    tracer.stop();

    // Cancellation is immediate, not a drain: buffered state stays intact
    assert_eq!(tracer.recorder().len(), 1);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("after-stop.json");
    tracer.dump(&path).unwrap();
    assert!(path.exists());
}
