//! Error types for tracer, hook, and configuration failures

use thiserror::Error;

/// Errors surfaced by the tracing engine and its registries
#[derive(Error, Debug)]
pub enum TraceError {
    /// A hook trigger could not be constructed (e.g. empty trigger set).
    /// Registration APIs degrade this to a logged no-op to stay chainable.
    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),

    /// A global-tracer convenience API was called with no engine installed
    #[error("no global tracer installed (required by {api})")]
    NoGlobalTracer { api: &'static str },

    /// A configuration setter rejected its value
    #[error("invalid configuration for {field}: {reason}")]
    ConfigValidation { field: &'static str, reason: String },

    /// An engine is already installed under this name
    #[error("a tracer is already installed under name {0:?}")]
    AlreadyInstalled(String),

    /// Filesystem failure while writing or normalizing a trace document
    #[error("trace output failed: {0}")]
    Io(#[from] std::io::Error),

    /// JSON failure while serializing or normalizing a trace document
    #[error("trace serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_global_tracer_names_api() {
        let err = TraceError::NoGlobalTracer { api: "add_hook" };
        assert!(err.to_string().contains("add_hook"));
    }

    #[test]
    fn test_config_validation_names_field() {
        let err = TraceError::ConfigValidation {
            field: "output_file",
            reason: "must not be empty".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("output_file"));
        assert!(msg.contains("must not be empty"));
    }
}
