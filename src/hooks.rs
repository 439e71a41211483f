//! Hook registry: ordered user callbacks gated by triggers
//!
//! Hooks run synchronously on the notifying execution context, in
//! registration order. The return value of one firing hook is threaded into
//! the next firing hook on the same event, so hooks compose into a pipeline.
//! The registry also owns return-value tracking for specific callables.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use fnv::FnvHashMap;
use serde::Serialize;
use tracing::warn;

use crate::trigger::Trigger;
use crate::value::Value;

pub(crate) const SOURCE_FILE: &str = file!();

/// User callback invoked on a matching call.
///
/// Receives the matched argument value (or the previous firing hook's return
/// value when chained) and may return a value for the next hook in line.
pub type HookCallback = Arc<dyn Fn(Value) -> Option<Value> + Send + Sync>;

/// A registered hook
pub struct HookDescriptor {
    pub id: u64,
    pub alias: String,
    pub terminate: bool,
    trigger: Trigger,
    callback: HookCallback,
}

/// One hook selected to fire on a specific event
pub(crate) struct PlannedHook {
    pub(crate) alias: String,
    pub(crate) terminate: bool,
    pub(crate) seed: Value,
    pub(crate) callback: HookCallback,
}

/// Return-value tracking registered for one callable
struct ReturnTrace {
    on_raise: bool,
    iterative_compare: bool,
    watched: Option<Vec<Value>>,
    observed: Vec<Value>,
}

/// A flagged return-value divergence
#[derive(Debug, Clone, Serialize)]
pub struct Divergence {
    /// Callable whose return diverged
    pub target: String,
    /// Call id of the diverging invocation
    pub call_id: u64,
    /// Previously observed value the comparison ran against, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<Value>,
    /// The diverging return value
    pub observed: Value,
}

/// Ordered collection of hooks plus return-trace state
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<HookDescriptor>,
    next_id: u64,
    return_traces: FnvHashMap<String, ReturnTrace>,
    divergences: Vec<Divergence>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook. Returns its id.
    pub fn add<F>(&mut self, callback: F, trigger: Trigger, alias: Option<&str>, terminate: bool) -> u64
    where
        F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        let alias = derive_alias::<F>(alias, id);
        self.hooks.push(HookDescriptor {
            id,
            alias,
            terminate,
            trigger,
            callback: Arc::new(callback),
        });
        id
    }

    pub fn hooks(&self) -> &[HookDescriptor] {
        &self.hooks
    }

    /// Select the hooks firing on this event, in registration order.
    ///
    /// A hook fires when its trigger matches any argument value; the first
    /// matching argument seeds the callback input.
    pub(crate) fn plan(&self, args: &[Value]) -> Vec<PlannedHook> {
        let mut plan = Vec::new();
        for hook in &self.hooks {
            if let Some(matched) = args.iter().find(|v| hook.trigger.matches(v)) {
                plan.push(PlannedHook {
                    alias: hook.alias.clone(),
                    terminate: hook.terminate,
                    seed: matched.clone(),
                    callback: Arc::clone(&hook.callback),
                });
            }
        }
        plan
    }

    /// Register return-value tracking for `target`
    pub fn add_return_trace(
        &mut self,
        target: &str,
        on_raise: bool,
        iterative_compare: bool,
        watched: Option<Vec<Value>>,
    ) {
        self.return_traces.insert(
            target.to_string(),
            ReturnTrace {
                on_raise,
                iterative_compare,
                watched,
                observed: Vec::new(),
            },
        );
    }

    /// Feed a finalized return value into the matching return trace, if any
    pub(crate) fn observe_return(&mut self, target: &str, call_id: u64, value: &Value, raised: bool) {
        let Some(trace) = self.return_traces.get_mut(target) else {
            return;
        };
        if raised && !trace.on_raise {
            return;
        }

        let divergence = if let Some(watched) = &trace.watched {
            if watched.contains(value) {
                None
            } else {
                Some(Divergence {
                    target: target.to_string(),
                    call_id,
                    previous: None,
                    observed: value.clone(),
                })
            }
        } else if trace.iterative_compare {
            // Compare against the immediately preceding return only
            match trace.observed.last() {
                Some(previous) if previous != value => Some(Divergence {
                    target: target.to_string(),
                    call_id,
                    previous: Some(previous.clone()),
                    observed: value.clone(),
                }),
                _ => None,
            }
        } else {
            // Compare against the full observed history
            if trace.observed.is_empty() || trace.observed.contains(value) {
                None
            } else {
                Some(Divergence {
                    target: target.to_string(),
                    call_id,
                    previous: trace.observed.last().cloned(),
                    observed: value.clone(),
                })
            }
        };

        trace.observed.push(value.clone());

        if let Some(divergence) = divergence {
            warn!(
                target = %divergence.target,
                call_id = divergence.call_id,
                "return value diverged"
            );
            self.divergences.push(divergence);
        }
    }

    pub fn divergences(&self) -> &[Divergence] {
        &self.divergences
    }
}

/// Run a selected hook plan, threading each return into the next input.
///
/// A panicking hook is reported and skipped; interception continues. Returns
/// true when a terminate-marked hook fired.
pub(crate) fn run_plan(plan: Vec<PlannedHook>) -> bool {
    let mut carried: Option<Value> = None;
    for hook in plan {
        let input = carried.take().unwrap_or(hook.seed);
        let callback = hook.callback;
        match catch_unwind(AssertUnwindSafe(|| callback(input))) {
            Ok(returned) => carried = returned,
            Err(_) => {
                warn!(alias = %hook.alias, "hook panicked; continuing interception");
            }
        }
        if hook.terminate {
            return true;
        }
    }
    false
}

/// Derive a human-readable alias from the callback's type name when it has
/// one, falling back to a stable `hook_<id>` identifier
fn derive_alias<F>(alias: Option<&str>, id: u64) -> String {
    if let Some(alias) = alias {
        return alias.to_string();
    }
    let type_name = std::any::type_name::<F>();
    let tail = type_name.rsplit("::").next().unwrap_or(type_name);
    if tail.is_empty() || tail.contains("closure") || tail.contains('<') {
        format!("hook_{id}")
    } else {
        tail.to_string()
    }
}
