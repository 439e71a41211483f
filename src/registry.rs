//! Process-wide named engine registry
//!
//! An engine can be installed under a well-known name so code not holding a
//! direct reference can retrieve it. Installation and teardown are explicit
//! lifecycle calls on a registry object; one process-wide default registry
//! exists for ergonomic top-level use.

use std::sync::{Mutex, OnceLock, PoisonError};

use fnv::FnvHashMap;

use crate::engine::SharedTracer;
use crate::errors::{Result, TraceError};
use crate::value::{TypeTag, Value};

/// Name the original tooling installs its default engine under
pub const DEFAULT_TRACER_NAME: &str = "tracker";

/// Explicit registry of named engine handles
#[derive(Default)]
pub struct EngineRegistry {
    engines: Mutex<FnvHashMap<String, SharedTracer>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine under `name`. At most one installation per name.
    pub fn install(&self, name: &str, tracer: SharedTracer) -> Result<()> {
        let mut engines = self.lock();
        if engines.contains_key(name) {
            return Err(TraceError::AlreadyInstalled(name.to_string()));
        }
        engines.insert(name.to_string(), tracer);
        Ok(())
    }

    /// Tear down the installation under `name`; returns whether one existed
    pub fn uninstall(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    /// Retrieve the engine installed under `name`
    pub fn get(&self, name: &str) -> Option<SharedTracer> {
        self.lock().get(name).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FnvHashMap<String, SharedTracer>> {
        self.engines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The process-wide default registry
pub fn default_registry() -> &'static EngineRegistry {
    static REGISTRY: OnceLock<EngineRegistry> = OnceLock::new();
    REGISTRY.get_or_init(EngineRegistry::new)
}

/// Install an engine as the process-wide default
pub fn install_global(tracer: SharedTracer) -> Result<()> {
    default_registry().install(DEFAULT_TRACER_NAME, tracer)
}

/// Tear down the process-wide default installation
pub fn uninstall_global() -> bool {
    default_registry().uninstall(DEFAULT_TRACER_NAME)
}

/// Retrieve the process-wide default engine, if installed
pub fn global_tracer() -> Option<SharedTracer> {
    default_registry().get(DEFAULT_TRACER_NAME)
}

/// Register a hook on the process-wide default engine
pub fn add_hook_global<F>(
    callback: F,
    type_trigger: Option<Vec<TypeTag>>,
    value_trigger: Option<Vec<Value>>,
    alias: Option<&str>,
    terminate: bool,
) -> Result<SharedTracer>
where
    F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
{
    let tracer = global_tracer().ok_or(TraceError::NoGlobalTracer { api: "add_hook" })?;
    tracer
        .lock()
        .add_hook(callback, type_trigger, value_trigger, alias, terminate);
    Ok(tracer)
}

/// Register return-value tracking on the process-wide default engine
pub fn add_return_trace_global(
    target: &str,
    on_raise: bool,
    iterative_compare: bool,
    watched: Option<Vec<Value>>,
) -> Result<SharedTracer> {
    let tracer = global_tracer().ok_or(TraceError::NoGlobalTracer {
        api: "add_return_trace",
    })?;
    tracer
        .lock()
        .add_return_trace(target, on_raise, iterative_compare, watched);
    Ok(tracer)
}
