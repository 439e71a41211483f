//! The interception engine: process-wide call tracing state machine
//!
//! The engine receives every call/return/exception notification produced by
//! instrumented call sites, applies exclusion filtering, feeds the trace
//! recorder, evaluates hook triggers, and drives the
//! enable/pause/resume/breakpoint state machine. Interception is inline and
//! synchronous: `notify` runs on the execution context that produced the
//! call, never on a worker.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, warn};

use crate::errors::{Result, TraceError};
use crate::exclude::ExcludeSet;
use crate::hooks::{self, HookRegistry, PlannedHook};
use crate::recorder::{self, NamedValue, TraceDocument, TraceRecorder, TraceSummary, TRACE_FORMAT};
use crate::trigger::Trigger;
use crate::value::{TypeTag, Value};

pub(crate) const SOURCE_FILE: &str = file!();

/// What the instrumented call site should do after a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Proceed normally
    Continue,
    /// Suspend for interactive inspection
    EnterBreak,
    /// End the run
    Terminate,
}

/// Breakpoint arming state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakpointMode {
    #[default]
    Run,
    /// Break at the next intercepted event
    Step,
    /// Terminate at the next intercepted event
    Quit,
}

/// How the intercepted callable is bound, used to resolve its declaring type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOrigin {
    /// Plain function; no declaring type
    Function,
    /// Method bound to an instance of `owner`
    BoundMethod { owner: String },
    /// Callable object; the object's own type declares it
    CallableObject { type_name: String },
    /// A type invoked as a constructor
    Type { name: String },
}

impl CallOrigin {
    /// Declaring type of the callable, when it has one
    pub fn origin_class(&self) -> Option<String> {
        match self {
            CallOrigin::Function => None,
            CallOrigin::BoundMethod { owner } => Some(owner.clone()),
            CallOrigin::CallableObject { type_name } => Some(type_name.clone()),
            CallOrigin::Type { name } => Some(name.clone()),
        }
    }
}

/// Raw notification delivered by an instrumented call site
#[derive(Debug, Clone)]
pub enum RawCallSignal {
    Call {
        callee: String,
        origin: CallOrigin,
        file: String,
        line: u32,
        caller: Option<String>,
        args: Vec<(String, Value)>,
    },
    Return {
        value: Value,
    },
    Exception {
        message: String,
    },
}

/// Mutable engine state; exactly one per engine instance
#[derive(Debug, Clone, Copy, Default)]
pub struct TracerState {
    pub enabled: bool,
    pub paused: bool,
    pub parsed: bool,
    pub breakpoint_mode: BreakpointMode,
}

/// Engine configuration with validating setters
#[derive(Debug, Clone)]
pub struct TracerConfig {
    log_call_args: bool,
    output_file: PathBuf,
    exclude_files: Vec<PathBuf>,
}

impl TracerConfig {
    pub fn new() -> Self {
        Self {
            log_call_args: false,
            output_file: PathBuf::from("result.json"),
            exclude_files: Vec::new(),
        }
    }

    pub fn log_call_args(&self) -> bool {
        self.log_call_args
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    pub fn exclude_files(&self) -> &[PathBuf] {
        &self.exclude_files
    }

    /// Enable or disable per-call argument capture (adds overhead)
    pub fn set_log_call_args(&mut self, enabled: bool) -> &mut Self {
        self.log_call_args = enabled;
        self
    }

    /// Set the default output file; must be a non-empty `.json` path
    pub fn set_output_file(&mut self, path: impl AsRef<Path>) -> Result<&mut Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(TraceError::ConfigValidation {
                field: "output_file",
                reason: "path must not be empty".to_string(),
            });
        }
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            return Err(TraceError::ConfigValidation {
                field: "output_file",
                reason: format!("{} must end with .json", path.display()),
            });
        }
        self.output_file = path.to_path_buf();
        Ok(self)
    }

    /// Set additional files to exclude beyond engine internals
    pub fn set_exclude_files<I, P>(&mut self, paths: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut validated = Vec::new();
        for path in paths {
            let path = path.as_ref();
            if path.as_os_str().is_empty() {
                return Err(TraceError::ConfigValidation {
                    field: "exclude_files",
                    reason: "exclude entries must not be empty".to_string(),
                });
            }
            validated.push(path.to_path_buf());
        }
        self.exclude_files = validated;
        Ok(self)
    }
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A call that entered but has not yet returned
struct PendingCall {
    callee: String,
    /// Recorder index; `None` when the call was excluded or suppressed
    recorded: Option<usize>,
}

/// Outcome of the lock-held half of a notification
pub(crate) enum DispatchPlan {
    Done(Decision),
    RunHooks(Vec<PlannedHook>),
}

/// The interception engine
pub struct Tracer {
    state: TracerState,
    config: TracerConfig,
    exclude: ExcludeSet,
    hooks: HookRegistry,
    recorder: TraceRecorder,
    pending: Vec<PendingCall>,
    started_at_ms: u64,
    stopped_at_ms: u64,
    hook_fires: u64,
    /// Set when hook dispatch paused the engine, so only dispatch resumes it
    auto_paused: bool,
}

impl Tracer {
    pub fn new(config: TracerConfig) -> Self {
        let mut exclude = ExcludeSet::internal();
        exclude.extend(config.exclude_files().iter());
        Self {
            state: TracerState::default(),
            config,
            exclude,
            hooks: HookRegistry::new(),
            recorder: TraceRecorder::new(),
            pending: Vec::new(),
            started_at_ms: 0,
            stopped_at_ms: 0,
            hook_fires: 0,
            auto_paused: false,
        }
    }

    pub fn state(&self) -> TracerState {
        self.state
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    pub fn breakpoint_mode(&self) -> BreakpointMode {
        self.state.breakpoint_mode
    }

    /// Arm or clear the breakpoint, typically from the debug console
    pub fn set_breakpoint_mode(&mut self, mode: BreakpointMode) {
        self.state.breakpoint_mode = mode;
    }

    /// Enable interception. Idempotent: a second `start` is a no-op.
    pub fn start(&mut self) {
        if self.state.enabled {
            return;
        }
        self.state.enabled = true;
        self.state.parsed = false;
        if self.started_at_ms == 0 {
            self.started_at_ms = now_ms();
        }
        debug!("tracer started");
    }

    /// Disable interception. Idempotent: a second `stop` is a no-op.
    pub fn stop(&mut self) {
        if !self.state.enabled {
            return;
        }
        self.state.enabled = false;
        self.stopped_at_ms = now_ms();
        debug!("tracer stopped");
    }

    /// Suppress hook evaluation and recording; nesting is still tracked.
    /// No-op unless enabled.
    pub fn pause(&mut self) {
        if self.state.enabled {
            self.state.paused = true;
        }
    }

    /// Resume hook evaluation and recording. No-op unless enabled.
    pub fn resume(&mut self) {
        if self.state.enabled {
            self.state.paused = false;
        }
    }

    /// Register a hook with optional type and value triggers.
    ///
    /// The type trigger is authoritative when both are supplied. An invalid
    /// trigger (empty set) degrades to a logged no-op so registration stays
    /// chainable.
    pub fn add_hook<F>(
        &mut self,
        callback: F,
        type_trigger: Option<Vec<TypeTag>>,
        value_trigger: Option<Vec<Value>>,
        alias: Option<&str>,
        terminate: bool,
    ) -> &mut Self
    where
        F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
    {
        match Trigger::resolve(type_trigger, value_trigger) {
            Ok(trigger) => {
                self.hooks.add(callback, trigger, alias, terminate);
            }
            Err(err) => warn!(%err, "hook registration skipped"),
        }
        self
    }

    /// Register a hook firing on numeric arguments
    pub fn add_hook_number<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.add_hook(callback, Some(vec![TypeTag::Number]), None, None, false)
    }

    /// Register a hook firing on text arguments
    pub fn add_hook_text<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.add_hook(callback, Some(vec![TypeTag::Text]), None, None, false)
    }

    /// Register a hook firing on sequence arguments
    pub fn add_hook_sequence<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.add_hook(callback, Some(vec![TypeTag::Sequence]), None, None, false)
    }

    /// Register a hook firing on ordered-pair arguments
    pub fn add_hook_pair<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.add_hook(callback, Some(vec![TypeTag::Pair]), None, None, false)
    }

    /// Register a hook firing on mapping arguments
    pub fn add_hook_mapping<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.add_hook(callback, Some(vec![TypeTag::Mapping]), None, None, false)
    }

    /// Register a hook firing on set arguments
    pub fn add_hook_set<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.add_hook(callback, Some(vec![TypeTag::Set]), None, None, false)
    }

    /// Register a hook firing on every intercepted call
    pub fn add_hook_any<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.add_hook(callback, None, None, None, false)
    }

    /// Register return-value tracking for a callable
    pub fn add_return_trace(
        &mut self,
        target: &str,
        on_raise: bool,
        iterative_compare: bool,
        watched: Option<Vec<Value>>,
    ) -> &mut Self {
        self.hooks
            .add_return_trace(target, on_raise, iterative_compare, watched);
        self
    }

    /// Exclude an additional source file from interception
    pub fn add_exclude(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.exclude.insert(path);
        self
    }

    pub fn divergences(&self) -> &[crate::hooks::Divergence] {
        self.hooks.divergences()
    }

    pub fn recorder(&self) -> &TraceRecorder {
        &self.recorder
    }

    /// Callee names of the currently open calls, outermost first
    pub fn call_stack(&self) -> Vec<String> {
        self.pending.iter().map(|p| p.callee.clone()).collect()
    }

    /// Hot-path entry point: deliver one call/return/exception notification.
    ///
    /// Matching hooks run inline on the notifying context with the engine
    /// paused, so calls a hook makes never trace themselves.
    pub fn notify(&mut self, signal: RawCallSignal) -> Decision {
        match self.prepare(signal) {
            DispatchPlan::Done(decision) => decision,
            DispatchPlan::RunHooks(plan) => {
                let terminated = hooks::run_plan(plan);
                self.finish_dispatch(terminated)
            }
        }
    }

    /// Lock-held half of a notification: filtering, recording, and hook
    /// selection. Hook callbacks themselves run outside this method.
    pub(crate) fn prepare(&mut self, signal: RawCallSignal) -> DispatchPlan {
        if !self.state.enabled {
            return DispatchPlan::Done(Decision::Continue);
        }
        if self.state.paused {
            // Nesting is still tracked while paused so resumed recording
            // sees correct depths
            match signal {
                RawCallSignal::Call { callee, .. } => {
                    self.pending.push(PendingCall {
                        callee,
                        recorded: None,
                    });
                }
                RawCallSignal::Return { .. } | RawCallSignal::Exception { .. } => {
                    self.pending.pop();
                }
            }
            return DispatchPlan::Done(Decision::Continue);
        }

        match signal {
            RawCallSignal::Call {
                callee,
                origin,
                file,
                line,
                caller,
                args,
            } => {
                if self.exclude.is_excluded(&file) {
                    self.pending.push(PendingCall {
                        callee,
                        recorded: None,
                    });
                    return DispatchPlan::Done(Decision::Continue);
                }

                let depth = self.pending.len();
                let recorded_args = if self.config.log_call_args {
                    Some(
                        args.iter()
                            .map(|(name, value)| NamedValue {
                                name: name.clone(),
                                value: value.clone(),
                            })
                            .collect(),
                    )
                } else {
                    None
                };
                let index = self.recorder.begin_call(
                    &callee,
                    origin.origin_class(),
                    &file,
                    line,
                    caller,
                    depth,
                    recorded_args,
                );
                self.pending.push(PendingCall {
                    callee,
                    recorded: Some(index),
                });

                let values: Vec<Value> = args.into_iter().map(|(_, v)| v).collect();
                let plan = self.hooks.plan(&values);
                if plan.is_empty() {
                    return DispatchPlan::Done(self.armed_decision());
                }

                self.hook_fires += plan.len() as u64;
                self.state.paused = true;
                self.auto_paused = true;
                DispatchPlan::RunHooks(plan)
            }
            RawCallSignal::Return { value } => {
                self.finish_call(Some(value), None);
                DispatchPlan::Done(self.armed_decision())
            }
            RawCallSignal::Exception { message } => {
                self.finish_call(None, Some(message));
                DispatchPlan::Done(self.armed_decision())
            }
        }
    }

    /// Conclude a notification after hook callbacks ran
    pub(crate) fn finish_dispatch(&mut self, terminated: bool) -> Decision {
        if self.auto_paused {
            self.auto_paused = false;
            self.state.paused = false;
        }
        if terminated {
            self.state.breakpoint_mode = BreakpointMode::Quit;
            self.stop();
            return Decision::Terminate;
        }
        self.armed_decision()
    }

    fn finish_call(&mut self, value: Option<Value>, error: Option<String>) {
        let Some(frame) = self.pending.pop() else {
            return;
        };
        let Some(index) = frame.recorded else {
            return;
        };
        let call_id = self.recorder.call_id_at(index).unwrap_or(0);
        if let Some(value) = &value {
            self.hooks
                .observe_return(&frame.callee, call_id, value, false);
        } else if let Some(message) = &error {
            let raised = Value::Text(message.clone());
            self.hooks.observe_return(&frame.callee, call_id, &raised, true);
        }
        self.recorder.finalize(index, value, error);
    }

    fn armed_decision(&mut self) -> Decision {
        match self.state.breakpoint_mode {
            BreakpointMode::Run => Decision::Continue,
            BreakpointMode::Step => Decision::EnterBreak,
            BreakpointMode::Quit => {
                self.stop();
                Decision::Terminate
            }
        }
    }

    /// Current trace content as a serializable document
    pub fn document(&self) -> TraceDocument {
        let stopped = if self.stopped_at_ms == 0 {
            now_ms()
        } else {
            self.stopped_at_ms
        };
        TraceDocument {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: TRACE_FORMAT.to_string(),
            started_at_ms: self.started_at_ms,
            stopped_at_ms: stopped,
            records: self.recorder.records().to_vec(),
            divergences: self.hooks.divergences().to_vec(),
            summary: TraceSummary {
                total_calls: self.recorder.len() as u64,
                total_hook_fires: self.hook_fires,
                divergences: self.hooks.divergences().len() as u64,
            },
        }
    }

    /// Write the current trace document to `path` without touching the
    /// enabled/disabled state
    pub fn dump(&self, path: &Path) -> Result<()> {
        recorder::dump(&self.document(), path)
    }

    /// Serialize the trace, restoring the prior enabled state afterward even
    /// when the write fails. Stops before writing so serialization never
    /// runs under active interception.
    pub fn save(&mut self, path: Option<&Path>) -> Result<PathBuf> {
        let was_enabled = self.state.enabled;
        if was_enabled {
            self.stop();
        }
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.output_file.clone());
        let result = self.dump(&path);
        if was_enabled {
            self.start();
        }
        result?;
        self.state.parsed = true;
        Ok(path)
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(TracerConfig::new())
    }
}

/// Shared handle to one engine instance.
///
/// `notify` holds the engine lock only for filtering, recording, and hook
/// selection; callbacks run with the lock released and the engine paused, so
/// instrumented calls made by a hook take the suppressed fast path instead
/// of deadlocking.
#[derive(Clone)]
pub struct SharedTracer {
    inner: Arc<Mutex<Tracer>>,
}

impl SharedTracer {
    pub fn new(tracer: Tracer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tracer)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Tracer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notify(&self, signal: RawCallSignal) -> Decision {
        let plan = self.lock().prepare(signal);
        match plan {
            DispatchPlan::Done(decision) => decision,
            DispatchPlan::RunHooks(plan) => {
                let terminated = hooks::run_plan(plan);
                self.lock().finish_dispatch(terminated)
            }
        }
    }

    pub fn start(&self) {
        self.lock().start();
    }

    pub fn stop(&self) {
        self.lock().stop();
    }

    pub fn pause(&self) {
        self.lock().pause();
    }

    pub fn resume(&self) {
        self.lock().resume();
    }

    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        self.lock().save(path)
    }
}

impl Default for SharedTracer {
    fn default() -> Self {
        Self::new(Tracer::default())
    }
}

impl std::fmt::Debug for SharedTracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTracer").finish_non_exhaustive()
    }
}

/// Scoped acquisition: starts the engine on construction and stops + saves
/// on drop, so the trace is persisted even when the traced block panics
pub struct TraceGuard {
    tracer: SharedTracer,
    output: PathBuf,
}

impl TraceGuard {
    pub fn new(tracer: &SharedTracer, output: impl Into<PathBuf>) -> Self {
        tracer.start();
        Self {
            tracer: tracer.clone(),
            output: output.into(),
        }
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        let mut tracer = self.tracer.lock();
        tracer.stop();
        if let Err(err) = tracer.save(Some(&self.output)) {
            error!(%err, "failed to save trace on scope exit");
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
