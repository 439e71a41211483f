use std::io::{self, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use nix::sys::signal::{self, SigHandler, Signal};
use tracing_subscriber::EnvFilter;

use rastro::cli::{Cli, Workload};
use rastro::console::{DebugBridge, DebugConsole};
use rastro::engine::{
    BreakpointMode, Decision, SharedTracer, TraceGuard, Tracer, TracerConfig,
};
use rastro::instrument::CallScope;
use rastro::registry;
use rastro::trace_scope;
use rastro::value::Value;

/// Set by the SIGTERM handler; workload loops poll it so the trace guard
/// still stops and saves the engine before process exit
static TERMINATED: AtomicBool = AtomicBool::new(false);

extern "C" fn term_handler(_: i32) {
    TERMINATED.store(true, Ordering::SeqCst);
}

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn install_term_handler() -> Result<()> {
    unsafe { signal::signal(Signal::SIGTERM, SigHandler::Handler(term_handler)) }
        .context("Failed to install SIGTERM handler")?;
    Ok(())
}

/// Runs the bundled instrumented workloads under one engine
struct Runner {
    tracer: SharedTracer,
    bridge: Option<DebugBridge>,
    console: Option<DebugConsole<BufReader<io::Stdin>, io::Stdout>>,
    diverge_calls: u32,
}

impl Runner {
    fn new(tracer: SharedTracer, interactive: bool) -> Self {
        let (bridge, console) = if interactive {
            (
                Some(DebugBridge::new(tracer.clone())),
                Some(DebugConsole::stdio()),
            )
        } else {
            (None, None)
        };
        Self {
            tracer,
            bridge,
            console,
            diverge_calls: 0,
        }
    }

    /// Apply the engine's decision at a call entry; false aborts the workload
    fn proceed(&mut self, scope: &CallScope) -> bool {
        match scope.decision() {
            Decision::Continue => true,
            Decision::Terminate => false,
            Decision::EnterBreak => match (&self.bridge, &mut self.console) {
                (Some(bridge), Some(console)) => {
                    bridge.on_break(console, &scope.break_context(None)) != Decision::Terminate
                }
                _ => true,
            },
        }
    }

    fn fib(&mut self, n: i64) -> i64 {
        let scope = trace_scope!(&self.tracer, "fib", n = n);
        if !self.proceed(&scope) {
            scope.exit(Value::Null);
            return 0;
        }
        let result = if n < 2 {
            n
        } else {
            self.fib(n - 1) + self.fib(n - 2)
        };
        scope.exit(result);
        result
    }

    fn greet(&mut self, name: &str) -> String {
        let scope = trace_scope!(&self.tracer, "greet", name = name);
        if !self.proceed(&scope) {
            scope.exit(Value::Null);
            return String::new();
        }
        let result = format!("hello {name}");
        scope.exit(result.as_str());
        result
    }

    fn observe(&mut self, value: Value) {
        let scope = trace_scope!(&self.tracer, "observe", value = value);
        self.proceed(&scope);
        scope.exit(Value::Null);
    }

    /// Returns 1 on the first two calls, 2 afterward
    fn diverge(&mut self) -> i64 {
        let scope = trace_scope!(&self.tracer, "diverge");
        if !self.proceed(&scope) {
            scope.exit(Value::Null);
            return 0;
        }
        self.diverge_calls += 1;
        let result = if self.diverge_calls < 3 { 1 } else { 2 };
        scope.exit(result);
        result
    }

    fn run(&mut self, workload: Workload) {
        match workload {
            Workload::Fib => {
                self.fib(10);
            }
            Workload::Mixed => {
                for round in 0..3i64 {
                    if TERMINATED.load(Ordering::SeqCst) {
                        break;
                    }
                    self.fib(4 + round);
                    self.greet("ada");
                    self.observe(Value::pair(round, "round"));
                    self.observe(Value::set(vec![Value::Int(round), Value::Int(round * 2)]));
                    self.observe(Value::mapping(vec![(
                        Value::from("round"),
                        Value::Int(round),
                    )]));
                }
            }
            Workload::Diverge => {
                for _ in 0..3 {
                    if TERMINATED.load(Ordering::SeqCst) {
                        break;
                    }
                    self.diverge();
                }
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    install_term_handler()?;

    let mut config = TracerConfig::new();
    config.set_log_call_args(cli.log_args);
    config.set_output_file(&cli.output)?;
    config.set_exclude_files(&cli.exclude)?;

    let tracer = SharedTracer::new(Tracer::new(config));
    registry::install_global(tracer.clone())?;

    {
        let mut engine = tracer.lock();
        engine
            .add_hook_number(|v| match v {
                Value::Int(i) => Some(Value::Int(i * 2)),
                other => Some(other),
            })
            .add_hook_text(|v| match v {
                Value::Text(s) => Some(Value::Text(s.to_uppercase())),
                other => Some(other),
            });
        if matches!(cli.workload, Workload::Diverge) {
            engine.add_return_trace("diverge", false, true, None);
        }
        if cli.breakpoint {
            engine.set_breakpoint_mode(BreakpointMode::Step);
        }
    }

    {
        let _guard = TraceGuard::new(&tracer, &cli.output);
        let mut runner = Runner::new(tracer.clone(), cli.breakpoint);
        runner.run(cli.workload);
    }

    let divergences = tracer.lock().divergences().len();
    if divergences > 0 {
        eprintln!("[rastro: {divergences} return divergence(s) detected]");
    }
    registry::uninstall_global();
    println!("[rastro: trace written to {}]", cli.output.display());
    Ok(())
}
