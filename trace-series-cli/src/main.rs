//! Trace Series CLI Application
//!
//! Command-line front end for the trace-series library. It adds:
//! - Built-in RTOS telemetry charts (CPU load, stack usage)
//! - User-defined chart reports from a TOML configuration
//! - Colored system log printing
//! - Report rendering (TXT/JSON/HTML)

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use trace_series::{Pipeline, PipelineError, QueryInvoker};

mod config;
mod presets;
mod report;
mod syslog;

use config::{AppConfig, OutputFormat, ReportDefinition};

/// Trace Series - Chart RTOS telemetry from trace queries
#[derive(Parser, Debug)]
#[command(name = "trace-series")]
#[command(about = "Query trace events and turn them into per-task time series", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Query engine program (default: $TRACE_SERIES_ENGINE, then `modality`)
    #[arg(long, value_name = "PATH", global = true)]
    engine: Option<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Per-task CPU load from cpu_utilization events
    CpuLoad(OutputArgs),
    /// Per-task CPU load from stats events
    StatsCpuLoad(OutputArgs),
    /// Per-task stack low-water marks from UNUSED_STACK events
    StackUsage(OutputArgs),
    /// Per-task stack usage percentage from stats events
    StatsStackUsage(OutputArgs),
    /// Print the error/warn/info log channels in timestamp order
    Syslog {
        /// Show timestamps as UTC wall clock time
        #[arg(long)]
        utc: bool,
        /// Disable colored channel names
        #[arg(long)]
        no_color: bool,
    },
    /// Run a report defined in the configuration file
    Report {
        /// Report name
        name: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List available reports
    List,
}

#[derive(ClapArgs, Debug)]
struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "txt")]
    format: OutputFormat,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    if let Err(err) = run(&args) {
        let _ = report_failure(&err, &mut io::stdout().lock(), &mut io::stderr().lock());
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    log::info!("Trace Series CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using trace-series library v{}", trace_series::VERSION);

    let config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    let pipeline = Pipeline::new(config.engine.invoker(args.engine.as_deref()));

    match &args.command {
        Command::CpuLoad(out) => chart_mode(&pipeline, &presets::cpu_load(), out),
        Command::StatsCpuLoad(out) => chart_mode(&pipeline, &presets::stats_cpu_load(), out),
        Command::StackUsage(out) => chart_mode(&pipeline, &presets::stack_usage(), out),
        Command::StatsStackUsage(out) => chart_mode(&pipeline, &presets::stats_stack_usage(), out),
        Command::Syslog { utc, no_color } => syslog_mode(&pipeline, *utc, *no_color),
        Command::Report { name, output } => {
            let report = config.report(name)?;
            chart_mode(&pipeline, report, output)
        }
        Command::List => {
            list_reports(&config);
            Ok(())
        }
    }
}

/// Chart mode - run the report's query and render its series
fn chart_mode(pipeline: &Pipeline<QueryInvoker>, report: &ReportDefinition, out: &OutputArgs) -> Result<()> {
    log::info!("Running report '{}'", report.name);

    let mut series = pipeline
        .run(&report.query)
        .with_context(|| format!("Report '{}' failed", report.name))?;

    // Renderers expect each series in x-axis order
    series.sort_each_by(&report.x)?;

    let rendered = report::render(out.format, report, &series)?;
    write_output(out.output.as_deref(), &rendered)
}

/// Syslog mode - print log channel events sorted by timestamp
fn syslog_mode(pipeline: &Pipeline<QueryInvoker>, utc: bool, no_color: bool) -> Result<()> {
    let table = pipeline
        .table(&presets::syslog())
        .context("Log query failed")?;
    log::debug!("Printing {} log lines", table.len());

    let log_style = syslog::LogStyle {
        utc,
        color: !no_color && console::Term::stdout().features().colors_supported(),
    };
    let stdout = io::stdout();
    let mut lock = stdout.lock();
    syslog::print_log(table, log_style, &mut lock)
}

fn list_reports(config: &AppConfig) {
    println!("Built-in reports:");
    for report in presets::charts() {
        println!("  {:<20} {}", report.name, report.title);
    }
    println!("  {:<20} {}", "syslog", "System log");

    if !config.report.is_empty() {
        println!("\nConfigured reports:");
        for report in &config.report {
            println!("  {:<20} {}", report.name, report.title);
        }
    }
}

fn write_output(path: Option<&Path>, rendered: &str) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, rendered).with_context(|| format!("Failed to write {:?}", path))?;
            log::info!("Wrote {:?}", path);
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Print an error chain; engine failures get their captured output verbatim
fn report_failure(err: &anyhow::Error, out: &mut impl Write, err_out: &mut impl Write) -> io::Result<()> {
    if let Some(PipelineError::QueryExecutionFailed { stdout, stderr, .. }) =
        err.downcast_ref::<PipelineError>()
    {
        out.write_all(stdout.as_bytes())?;
        out.flush()?;
        err_out.write_all(stderr.as_bytes())?;
    }
    writeln!(err_out, "Error: {:#}", err)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_chart_command() {
        let args = Args::try_parse_from([
            "trace-series",
            "--engine",
            "/opt/modality",
            "stats-stack-usage",
            "--format",
            "html",
            "-o",
            "stack.html",
        ])
        .unwrap();

        assert_eq!(args.engine.as_deref(), Some(Path::new("/opt/modality")));
        match args.command {
            Command::StatsStackUsage(out) => {
                assert_eq!(out.format, OutputFormat::Html);
                assert_eq!(out.output.as_deref(), Some(Path::new("stack.html")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_engine_output_survives_context() {
        let failure = PipelineError::QueryExecutionFailed {
            code: Some(2),
            stdout: "partial result\n".into(),
            stderr: "error: unknown attribute 'tsk'\n".into(),
        };
        let err = anyhow::Error::from(failure).context("Report 'cpu-load' failed");

        let mut out = Vec::new();
        let mut err_out = Vec::new();
        report_failure(&err, &mut out, &mut err_out).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "partial result\n");
        let err_text = String::from_utf8(err_out).unwrap();
        assert!(err_text.starts_with("error: unknown attribute 'tsk'\nError: Report 'cpu-load' failed: "));
        assert!(err_text.contains("status 2"));
    }

    #[test]
    fn test_other_failures_print_chain_only() {
        let err = anyhow::Error::from(PipelineError::UnknownColumn("task".into())).context("Log query failed");
        let mut out = Vec::new();
        let mut err_out = Vec::new();
        report_failure(&err, &mut out, &mut err_out).unwrap();

        assert!(out.is_empty());
        assert_eq!(
            String::from_utf8(err_out).unwrap(),
            "Error: Log query failed: Unknown column: task\n"
        );
    }

    #[test]
    fn test_parse_syslog_command() {
        let args = Args::try_parse_from(["trace-series", "-vv", "syslog", "--utc"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert!(matches!(args.command, Command::Syslog { utc: true, no_color: false }));
    }
}
