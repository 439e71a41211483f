//! Call-site instrumentation
//!
//! Rust has no frame-level trace hook, so interception is injected at call
//! sites: a [`CallScope`] guard delivers the call signal on construction and
//! the return signal on `exit`. A scope dropped during a panic unwind
//! reports an exception instead, keeping the engine's nesting stack
//! consistent.

use std::collections::BTreeMap;

use crate::console::BreakContext;
use crate::engine::{CallOrigin, Decision, RawCallSignal, SharedTracer};
use crate::value::Value;

pub(crate) const SOURCE_FILE: &str = file!();

/// Guard instrumenting one call
pub struct CallScope {
    tracer: SharedTracer,
    callee: String,
    file: String,
    line: u32,
    caller: Option<String>,
    args: Vec<(String, Value)>,
    decision: Decision,
    finished: bool,
}

impl CallScope {
    /// Deliver the call signal and open the scope
    pub fn enter(
        tracer: &SharedTracer,
        callee: &str,
        origin: CallOrigin,
        file: &str,
        line: u32,
        caller: Option<&str>,
        args: Vec<(String, Value)>,
    ) -> Self {
        let decision = tracer.notify(RawCallSignal::Call {
            callee: callee.to_string(),
            origin,
            file: file.to_string(),
            line,
            caller: caller.map(str::to_string),
            args: args.clone(),
        });
        Self {
            tracer: tracer.clone(),
            callee: callee.to_string(),
            file: file.to_string(),
            line,
            caller: caller.map(str::to_string),
            args,
            decision,
            finished: false,
        }
    }

    /// The engine's decision for the call entry
    pub fn decision(&self) -> Decision {
        self.decision
    }

    /// Build the inspection context for a breakpoint at this scope
    pub fn break_context(&self, return_value: Option<Value>) -> BreakContext {
        let scope: BTreeMap<String, Value> = self
            .args
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        BreakContext {
            callee: self.callee.clone(),
            file: self.file.clone(),
            line: self.line,
            caller: self.caller.clone(),
            return_value,
            scope,
            stack: self.tracer.lock().call_stack(),
        }
    }

    /// Close the scope with a return value
    pub fn exit(mut self, value: impl Into<Value>) -> Decision {
        self.finished = true;
        self.tracer.notify(RawCallSignal::Return {
            value: value.into(),
        })
    }

    /// Close the scope with an exception
    pub fn raise(mut self, message: &str) -> Decision {
        self.finished = true;
        self.tracer.notify(RawCallSignal::Exception {
            message: message.to_string(),
        })
    }
}

impl Drop for CallScope {
    fn drop(&mut self) {
        if !self.finished {
            // Unwinding past the scope without exit(): report as exception
            self.tracer.notify(RawCallSignal::Exception {
                message: format!("{} unwound", self.callee),
            });
        }
    }
}

/// Instrument a call site: opens a [`CallScope`] carrying the current file
/// and line plus named argument values.
///
/// ```ignore
/// let scope = trace_scope!(&tracer, "fib", n = n);
/// let result = if n < 2 { n } else { fib(n - 1) + fib(n - 2) };
/// scope.exit(result);
/// ```
#[macro_export]
macro_rules! trace_scope {
    ($tracer:expr, $callee:expr $(, $name:ident = $value:expr)* $(,)?) => {
        $crate::instrument::CallScope::enter(
            $tracer,
            $callee,
            $crate::engine::CallOrigin::Function,
            file!(),
            line!(),
            None,
            vec![$((stringify!($name).to_string(), $crate::value::Value::from($value))),*],
        )
    };
}
