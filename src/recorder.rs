//! Trace recorder and JSON document serialization
//!
//! The recorder is an append-only buffer of call records in intercept order;
//! that ordering is the only guarantee the document makes. Persisted
//! documents are platform-independent: a post-write pass rewrites every
//! backslash in every string field to a forward slash, so capture stays
//! cheap and the normalization cost is paid once at save time.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::errors::Result;
use crate::hooks::Divergence;
use crate::value::Value;

pub(crate) const SOURCE_FILE: &str = file!();

/// Document format identifier
pub const TRACE_FORMAT: &str = "rastro-trace-v1";

/// One named argument captured at a call site
#[derive(Debug, Clone, Serialize)]
pub struct NamedValue {
    pub name: String,
    pub value: Value,
}

/// A single finalized call event
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    /// Monotonic id, never reused within one engine instance
    pub call_id: u64,
    /// Callable identifier (function or method name)
    pub callee: String,
    /// Declaring type for methods, callable objects, and constructors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_class: Option<String>,
    /// Source file of the call site
    pub file: String,
    /// Source line of the call site
    pub line: u32,
    /// Enclosing callable of the caller, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
    /// Nesting depth at interception time
    pub depth: usize,
    /// Position in the global intercept order
    pub ordinal: u64,
    /// Argument values, present only when argument logging is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<NamedValue>>,
    /// Return value, absent while the call is open or when it raised
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_value: Option<Value>,
    /// Exception message when the call unwound instead of returning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary block of a trace document
#[derive(Debug, Clone, Serialize)]
pub struct TraceSummary {
    pub total_calls: u64,
    pub total_hook_fires: u64,
    pub divergences: u64,
}

/// Root serialized output for one run
#[derive(Debug, Clone, Serialize)]
pub struct TraceDocument {
    pub version: String,
    pub format: String,
    pub started_at_ms: u64,
    pub stopped_at_ms: u64,
    pub records: Vec<CallRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub divergences: Vec<Divergence>,
    pub summary: TraceSummary,
}

/// Append-only buffer of call records
#[derive(Default)]
pub struct TraceRecorder {
    records: Vec<CallRecord>,
    next_call_id: u64,
    next_ordinal: u64,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a record for a call entry; returns its buffer index
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn begin_call(
        &mut self,
        callee: &str,
        origin_class: Option<String>,
        file: &str,
        line: u32,
        caller: Option<String>,
        depth: usize,
        args: Option<Vec<NamedValue>>,
    ) -> usize {
        let call_id = self.next_call_id;
        self.next_call_id += 1;
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;

        self.records.push(CallRecord {
            call_id,
            callee: callee.to_string(),
            origin_class,
            file: file.to_string(),
            line,
            caller,
            depth,
            ordinal,
            args,
            return_value: None,
            error: None,
        });
        self.records.len() - 1
    }

    /// Finalize an open record with its return value or error. Records are
    /// never mutated after this point.
    pub(crate) fn finalize(&mut self, index: usize, return_value: Option<Value>, error: Option<String>) {
        if let Some(record) = self.records.get_mut(index) {
            record.return_value = return_value;
            record.error = error;
        }
    }

    pub(crate) fn call_id_at(&self, index: usize) -> Option<u64> {
        self.records.get(index).map(|r| r.call_id)
    }

    pub fn records(&self) -> &[CallRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Write a trace document as JSON, creating parent directories as needed,
/// then run the separator-normalization pass over the written file
pub fn dump(document: &TraceDocument, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(document)?;
    fs::write(path, json)?;
    normalize_file(path)
}

/// Reopen a written document, replace every backslash in every string value
/// with a forward slash, and rewrite it with stable indentation
pub fn normalize_file(path: &Path) -> Result<()> {
    let raw = fs::read_to_string(path)?;
    let mut document: serde_json::Value = serde_json::from_str(&raw)?;
    normalize_slashes(&mut document);
    fs::write(path, serde_json::to_string_pretty(&document)?)?;
    Ok(())
}

/// Recursively rewrite backslashes in string values; non-string scalars are
/// left untouched
pub fn normalize_slashes(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => {
            if s.contains('\\') {
                *s = s.replace('\\', "/");
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                normalize_slashes(item);
            }
        }
        serde_json::Value::Object(entries) => {
            for (_, item) in entries.iter_mut() {
                normalize_slashes(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document(records: Vec<CallRecord>) -> TraceDocument {
        let total = records.len() as u64;
        TraceDocument {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: TRACE_FORMAT.to_string(),
            started_at_ms: 1,
            stopped_at_ms: 2,
            records,
            divergences: Vec::new(),
            summary: TraceSummary {
                total_calls: total,
                total_hook_fires: 0,
                divergences: 0,
            },
        }
    }

    #[test]
    fn test_begin_and_finalize() {
        let mut recorder = TraceRecorder::new();
        let idx = recorder.begin_call("f", None, "src/app.rs", 10, None, 0, None);
        recorder.finalize(idx, Some(Value::Int(3)), None);

        let record = &recorder.records()[idx];
        assert_eq!(record.call_id, 0);
        assert_eq!(record.callee, "f");
        assert_eq!(record.return_value, Some(Value::Int(3)));
        assert!(record.error.is_none());
    }

    #[test]
    fn test_call_ids_monotonic() {
        let mut recorder = TraceRecorder::new();
        for _ in 0..5 {
            recorder.begin_call("f", None, "a.rs", 1, None, 0, None);
        }
        let ids: Vec<u64> = recorder.records().iter().map(|r| r.call_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_normalize_slashes_recursive() {
        let mut value = serde_json::json!({
            "file": "C:\\work\\app.rs",
            "nested": {"paths": ["a\\b", "c/d"]},
            "count": 3,
        });
        normalize_slashes(&mut value);
        assert_eq!(value["file"], "C:/work/app.rs");
        assert_eq!(value["nested"]["paths"][0], "a/b");
        assert_eq!(value["nested"]["paths"][1], "c/d");
        assert_eq!(value["count"], 3);
    }

    #[test]
    fn test_dump_normalizes_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("trace.json");

        let mut recorder = TraceRecorder::new();
        let idx = recorder.begin_call("f", None, "C:\\work\\app.rs", 3, None, 0, None);
        recorder.finalize(idx, Some(Value::from("ok")), None);
        let document = sample_document(recorder.records().to_vec());

        dump(&document, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains('\\'));
        assert!(written.contains("C:/work/app.rs"));

        // The persisted document round-trips through a standard JSON parser
        let parsed: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed["format"], TRACE_FORMAT);
        assert_eq!(parsed["records"][0]["callee"], "f");
    }

    #[test]
    fn test_optional_fields_omitted() {
        let mut recorder = TraceRecorder::new();
        recorder.begin_call("f", None, "a.rs", 1, None, 0, None);
        let json = serde_json::to_string(&recorder.records()[0]).unwrap();
        assert!(!json.contains("origin_class"));
        assert!(!json.contains("args"));
        assert!(!json.contains("return_value"));
        assert!(!json.contains("error"));
    }
}
