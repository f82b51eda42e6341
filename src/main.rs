use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use bencher::config::Settings;
use bencher::cpufreq::SysfsInspector;
use bencher::errors::BencherError;
use bencher::report::{Reporter, paint_diagnostics};
use bencher::runner::{ProcessRunner, RunnerOptions, check_pin_core};
use bencher::session::{BenchmarkSession, RunStatus, SessionFiles};
use bencher::types::{DiffMode, OutputFormat};

#[derive(Parser)]
#[command(
    name = "bencher",
    version,
    about = "Run a program repeatedly and record its timing and resource usage"
)]
struct Cli {
    /// File fed to the benchmark's stdin on every iteration
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Expected output; an iteration whose output differs stops the run
    #[arg(long, value_name = "FILE")]
    diff: Option<PathBuf>,

    /// Accept lines whose leading numbers differ by at most this much
    #[arg(long, value_name = "ERROR", requires = "diff", conflicts_with = "bin", value_parser = parse_tolerance)]
    abserr: Option<f64>,

    /// Compare output byte for byte instead of line by line
    #[arg(long, requires = "diff")]
    bin: bool,

    /// CPU seconds each iteration may use before it is killed
    #[arg(short, long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    #[arg(short = 'n', long, value_parser = clap::value_parser!(u64).range(1..))]
    iterations: Option<u64>,

    /// Restrict the benchmark to one logical core
    #[arg(long, value_name = "CORE", value_parser = parse_pin_core)]
    pin: Option<usize>,

    #[arg(long, value_name = "DIR")]
    scratch_dir: Option<PathBuf>,

    /// Architecture name shown in the header
    #[arg(long)]
    isa: Option<String>,

    #[arg(long)]
    format: Option<OutputFormat>,

    #[arg(short, long)]
    verbose: bool,

    /// File to append results to, or "-" for stdout
    output: String,

    /// Benchmark program and its arguments
    #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn parse_tolerance(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{}' is not a number", s))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("'{}' must be a non-negative number", s));
    }
    Ok(value)
}

fn parse_pin_core(s: &str) -> Result<usize, String> {
    let core: usize = s.parse().map_err(|_| format!("'{}' is not a core number", s))?;
    check_pin_core(core).map_err(|e| e.to_string())?;
    Ok(core)
}

const VALUE_FLAGS: &[&str] = &[
    "-i",
    "--input",
    "--diff",
    "--abserr",
    "-t",
    "--timeout",
    "-n",
    "--iterations",
    "--pin",
    "--scratch-dir",
    "--isa",
    "--format",
];

/// Rewrite the single-dash spellings `-diff`, `-abserr` and `-bin` to their
/// long forms. Only options before the output destination are touched.
fn normalize_legacy_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    let mut args = args.into_iter();
    let mut out: Vec<OsString> = args.next().into_iter().collect();

    while let Some(arg) = args.next() {
        let flag = match arg.to_str() {
            Some("-diff") => "--diff",
            Some("-abserr") => "--abserr",
            Some("-bin") => "--bin",
            Some(s) if s.starts_with('-') && s != "-" && s != "--" => s,
            _ => {
                out.push(arg);
                out.extend(args);
                break;
            }
        };

        let takes_value = VALUE_FLAGS.contains(&flag);
        out.push(OsString::from(flag));
        if takes_value && let Some(value) = args.next() {
            out.push(value);
        }
    }
    out
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();
}

fn open_output(output: &str) -> Result<(Box<dyn Write>, bool), BencherError> {
    if output == "-" {
        return Ok((Box::new(io::stdout()), false));
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(output)
        .map_err(|source| BencherError::OpenOutput {
            path: PathBuf::from(output),
            source,
        })?;
    Ok((Box::new(file), true))
}

/// Returns whether every iteration ran and passed.
fn run() -> Result<bool> {
    let cli = Cli::parse_from(normalize_legacy_args(std::env::args_os()));
    init_tracing(cli.verbose);

    let settings = Settings::load()?;

    let mode = if cli.bin {
        DiffMode::Binary
    } else {
        DiffMode::Textual {
            tolerance: cli.abserr.unwrap_or(0.0),
        }
    };
    let files = SessionFiles {
        input: cli.input.as_deref(),
        baseline: cli.diff.as_deref().map(|path| (path, mode)),
    };
    let iterations = cli
        .iterations
        .map(|n| n as usize)
        .unwrap_or_else(|| settings.iterations());
    let isa = cli.isa.clone().unwrap_or_else(|| settings.isa());
    let inspector = SysfsInspector::new(settings.sysfs_root());

    let session = BenchmarkSession::prepare(&cli.command[0], files, iterations, &inspector, &isa)?;

    // Reject bad runner options before the output file is created.
    let mut runner = ProcessRunner::new(
        &cli.command,
        RunnerOptions {
            timeout_secs: cli.timeout,
            pin_core: cli.pin.or(settings.pin_core),
            scratch_dir: cli
                .scratch_dir
                .clone()
                .unwrap_or_else(|| settings.scratch_dir()),
        },
    )?;

    let (sink, to_file) = open_output(&cli.output)?;
    let mut reporter = Reporter::new(sink, cli.format.unwrap_or_else(|| settings.format()));

    // Progress goes to stdout only when stdout is not the results stream.
    let mut stdout = io::stdout();
    let progress: Option<&mut dyn Write> = if to_file { Some(&mut stdout) } else { None };

    let outcome = session.run(&mut runner, &mut reporter, progress)?;
    match &outcome.status {
        RunStatus::Completed => Ok(true),
        RunStatus::ExecutionFailed { iteration, exit } => {
            eprintln!("Error: Iteration {}: {} {}.", iteration, cli.command[0], exit);
            Ok(false)
        }
        RunStatus::ValidationFailed { iteration, outcome } => {
            eprint!("{}", paint_diagnostics(&outcome.to_string()));
            eprintln!(
                "Error: Iteration {}: output does not match {}.",
                iteration,
                cli.diff.as_deref().map(|p| p.display().to_string()).unwrap_or_default()
            );
            Ok(false)
        }
    }
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    }
}
