//! Debug console bridge for interactive breakpoints
//!
//! Translates engine breakpoint state into a small fixed command vocabulary
//! and back. Commands are a closed enum dispatched through a table rather
//! than an inheritance-based shell. Expression evaluation resolves names
//! against the scope captured at the interception point and runs with the
//! engine paused, so the console never records its own activity.

use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Write};

use crate::engine::{BreakpointMode, Decision, SharedTracer};
use crate::value::Value;

pub(crate) const SOURCE_FILE: &str = file!();

const PROMPT: &str = "(rastro) ";

/// The closed command vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Resume interception (`breakpoint_mode = Run`)
    Continue,
    /// Break again at the next intercepted event
    Step,
    /// Terminate the run
    Quit,
    /// Evaluate an expression in the captured scope
    Eval(String),
    /// Pretty-print an expression's result
    PrettyPrint(String),
    /// Show the current call stack
    Where,
    /// Repeat the last command
    Recall,
}

/// Command table: names and aliases mapped to constructors
const COMMAND_TABLE: &[(&[&str], fn(&str) -> ConsoleCommand)] = &[
    (&["continue", "c"], |_| ConsoleCommand::Continue),
    (&["step", "s"], |_| ConsoleCommand::Step),
    (&["quit", "q", "exit"], |_| ConsoleCommand::Quit),
    (&["eval", "p"], |rest| ConsoleCommand::Eval(rest.to_string())),
    (&["pp"], |rest| ConsoleCommand::PrettyPrint(rest.to_string())),
    (&["where", "w"], |_| ConsoleCommand::Where),
    (&["recall", "cc"], |_| ConsoleCommand::Recall),
];

/// Parse one input line. Unrecognized input is evaluated as an expression;
/// a leading `!` forces evaluation of a line that shadows a command name.
pub fn parse_command(line: &str) -> ConsoleCommand {
    let line = line.trim();
    if let Some(forced) = line.strip_prefix('!') {
        return ConsoleCommand::Eval(forced.trim().to_string());
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    for (names, build) in COMMAND_TABLE {
        if names.contains(&head) {
            return build(rest);
        }
    }
    ConsoleCommand::Eval(line.to_string())
}

/// The call context presented when a breakpoint fires
#[derive(Debug, Clone)]
pub struct BreakContext {
    pub callee: String,
    pub file: String,
    pub line: u32,
    pub caller: Option<String>,
    /// Present when breaking while unwinding a call
    pub return_value: Option<Value>,
    /// Variable bindings visible at the interception point
    pub scope: BTreeMap<String, Value>,
    /// Open callables, outermost first
    pub stack: Vec<String>,
}

/// What the user decided at the breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleVerdict {
    Continue,
    Step,
    Quit,
}

/// Line-oriented console over generic input/output streams
pub struct DebugConsole<R, W> {
    input: R,
    output: W,
    last_command: Option<ConsoleCommand>,
}

impl DebugConsole<BufReader<io::Stdin>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> DebugConsole<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            last_command: None,
        }
    }

    /// Present the break context and run the command loop until the user
    /// resumes, steps, or quits. EOF counts as `continue`.
    pub fn enter(&mut self, ctx: &BreakContext) -> ConsoleVerdict {
        self.show_context(ctx);
        loop {
            let _ = write!(self.output, "{PROMPT}");
            let _ = self.output.flush();

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) | Err(_) => return ConsoleVerdict::Continue,
                Ok(_) => {}
            }

            let command = if line.trim().is_empty() {
                ConsoleCommand::Recall
            } else {
                parse_command(&line)
            };
            let command = match command {
                ConsoleCommand::Recall => match self.last_command.clone() {
                    Some(last) => last,
                    None => continue,
                },
                other => other,
            };
            self.last_command = Some(command.clone());

            if let Some(verdict) = self.dispatch(command, ctx) {
                return verdict;
            }
        }
    }

    fn dispatch(&mut self, command: ConsoleCommand, ctx: &BreakContext) -> Option<ConsoleVerdict> {
        match command {
            ConsoleCommand::Continue => Some(ConsoleVerdict::Continue),
            ConsoleCommand::Step => Some(ConsoleVerdict::Step),
            ConsoleCommand::Quit => Some(ConsoleVerdict::Quit),
            ConsoleCommand::Eval(expr) => {
                self.eval(ctx, &expr, false);
                None
            }
            ConsoleCommand::PrettyPrint(expr) => {
                self.eval(ctx, &expr, true);
                None
            }
            ConsoleCommand::Where => {
                self.show_stack(ctx);
                None
            }
            ConsoleCommand::Recall => None,
        }
    }

    fn show_context(&mut self, ctx: &BreakContext) {
        self.message(&format!(
            "break at {}:{} in {}",
            ctx.file, ctx.line, ctx.callee
        ));
        if let Some(caller) = &ctx.caller {
            self.message(&format!("called from {caller}"));
        }
        if let Some(value) = &ctx.return_value {
            self.message(&format!("returning {}", render(value, false)));
        }
    }

    fn show_stack(&mut self, ctx: &BreakContext) {
        if ctx.stack.is_empty() {
            self.message("(empty call stack)");
            return;
        }
        for (depth, callee) in ctx.stack.iter().enumerate() {
            let marker = if depth + 1 == ctx.stack.len() { "->" } else { "  " };
            self.message(&format!("{marker} #{depth} {callee}"));
        }
    }

    fn eval(&mut self, ctx: &BreakContext, expr: &str, pretty: bool) {
        match evaluate(ctx, expr) {
            Ok(value) => self.message(&render(&value, pretty)),
            Err(msg) => self.error(&msg),
        }
    }

    fn message(&mut self, msg: &str) {
        let _ = writeln!(self.output, ">>> {msg}");
    }

    fn error(&mut self, msg: &str) {
        let _ = writeln!(self.output, "*** {msg}");
    }
}

/// Resolve an expression against the captured scope. Supported forms: a
/// bound variable name, or the context names `callee`, `file`, `line`,
/// `caller`.
pub fn evaluate(ctx: &BreakContext, expr: &str) -> std::result::Result<Value, String> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err("empty expression".to_string());
    }
    if let Some(value) = ctx.scope.get(expr) {
        return Ok(value.clone());
    }
    match expr {
        "callee" => Ok(Value::from(ctx.callee.as_str())),
        "file" => Ok(Value::from(ctx.file.as_str())),
        "line" => Ok(Value::from(i64::from(ctx.line))),
        "caller" => Ok(ctx
            .caller
            .as_ref()
            .map(|c| Value::from(c.as_str()))
            .unwrap_or(Value::Null)),
        _ => Err(format!("name {expr:?} is not defined in this scope")),
    }
}

fn render(value: &Value, pretty: bool) -> String {
    let result = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    result.unwrap_or_else(|_| format!("{value:?}"))
}

/// Thin adapter between engine breakpoint state and the console
pub struct DebugBridge {
    tracer: SharedTracer,
}

impl DebugBridge {
    pub fn new(tracer: SharedTracer) -> Self {
        Self { tracer }
    }

    /// Run the console at a breakpoint and apply the verdict to the engine.
    /// The engine is paused for the duration so console activity is never
    /// intercepted.
    pub fn on_break<R: BufRead, W: Write>(
        &self,
        console: &mut DebugConsole<R, W>,
        ctx: &BreakContext,
    ) -> Decision {
        self.tracer.pause();
        let verdict = console.enter(ctx);
        let mut tracer = self.tracer.lock();
        let decision = match verdict {
            ConsoleVerdict::Continue => {
                tracer.set_breakpoint_mode(BreakpointMode::Run);
                Decision::Continue
            }
            ConsoleVerdict::Step => {
                tracer.set_breakpoint_mode(BreakpointMode::Step);
                Decision::Continue
            }
            ConsoleVerdict::Quit => {
                tracer.set_breakpoint_mode(BreakpointMode::Quit);
                tracer.stop();
                Decision::Terminate
            }
        };
        tracer.resume();
        decision
    }
}
