//! CLI argument parsing for Rastro

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Bundled workloads traced by the demo launcher
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Workload {
    /// Recursive fibonacci, numeric arguments
    Fib,
    /// Mixed numeric/text/collection arguments
    Mixed,
    /// A callable whose return value diverges on the third call
    Diverge,
}

#[derive(Parser, Debug)]
#[command(name = "rastro")]
#[command(version)]
#[command(about = "In-process call tracer with dynamic hooks", long_about = None)]
pub struct Cli {
    /// Output file path. Must end with .json
    #[arg(short, long, default_value = "result.json")]
    pub output: PathBuf,

    /// Log all function arguments, this will introduce large overhead
    #[arg(long = "log-args")]
    pub log_args: bool,

    /// Additional source files to exclude from the trace
    #[arg(long = "exclude", value_name = "PATH")]
    pub exclude: Vec<PathBuf>,

    /// Break at the first intercepted call and open the debug console
    #[arg(short = 'b', long = "breakpoint")]
    pub breakpoint: bool,

    /// Enable verbose internal logging
    #[arg(long)]
    pub debug: bool,

    /// Workload to run under the tracer
    #[arg(value_enum, default_value = "mixed")]
    pub workload: Workload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["rastro"]);
        assert_eq!(cli.output, PathBuf::from("result.json"));
        assert!(!cli.log_args);
        assert!(!cli.breakpoint);
        assert!(cli.exclude.is_empty());
        assert!(matches!(cli.workload, Workload::Mixed));
    }

    #[test]
    fn test_cli_output_flag() {
        let cli = Cli::parse_from(["rastro", "-o", "trace.json", "fib"]);
        assert_eq!(cli.output, PathBuf::from("trace.json"));
        assert!(matches!(cli.workload, Workload::Fib));
    }

    #[test]
    fn test_cli_log_args_flag() {
        let cli = Cli::parse_from(["rastro", "--log-args"]);
        assert!(cli.log_args);
    }

    #[test]
    fn test_cli_exclude_repeats() {
        let cli = Cli::parse_from([
            "rastro",
            "--exclude",
            "/a.rs",
            "--exclude",
            "/b.rs",
        ]);
        assert_eq!(cli.exclude.len(), 2);
    }

    #[test]
    fn test_cli_breakpoint_flag() {
        let cli = Cli::parse_from(["rastro", "-b", "diverge"]);
        assert!(cli.breakpoint);
        assert!(matches!(cli.workload, Workload::Diverge));
    }
}
