use std::io::Write;
use std::time::Duration;

use chrono::{DateTime, Utc};
use owo_colors::{OwoColorize, Stream, Style};
use serde::Serialize;

use crate::cpufreq::{CpuInfo, format_header, normalize_frequency};
use crate::errors::BencherError;
use crate::types::{ExecutionResult, OutputFormat};

/// Exclusive upper bound for time columns, in seconds.
pub const TIME_CEILING_SECS: u64 = 10_000;
/// Exclusive upper bound for count columns.
pub const COUNT_CEILING: u64 = 100_000_000;

const SEP: &str = "  ";
const COLUMNS: [&str; 9] = [
    "total", "user", "system", "maxrss", "minflt", "majflt", "swap", "vcsw", "ivcsw",
];

/// What the one header line of a run describes.
#[derive(Debug, Clone)]
pub struct RunHeader {
    pub target: String,
    pub cpu: CpuInfo,
    pub isa: String,
}

/// `total    user     system   ...   ivcsw`
pub fn column_header() -> String {
    let last = COLUMNS.len() - 1;
    COLUMNS
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if i < last {
                format!("{:<7}", name)
            } else {
                name.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(SEP)
}

fn seconds(field: &'static str, d: Duration) -> Result<String, BencherError> {
    let secs = d.as_secs();
    if secs >= TIME_CEILING_SECS {
        return Err(BencherError::MetricOverflow {
            field,
            value: secs,
            ceiling: TIME_CEILING_SECS,
        });
    }
    // Milliseconds are truncated, never rounded.
    Ok(format!("{:>3}.{:03}", secs, d.subsec_millis()))
}

fn count(field: &'static str, value: u64) -> Result<String, BencherError> {
    if value >= COUNT_CEILING {
        return Err(BencherError::MetricOverflow {
            field,
            value,
            ceiling: COUNT_CEILING,
        });
    }
    Ok(format!("{:>7}", value))
}

/// One fixed-width metrics row, without the trailing newline.
pub fn format_row(r: &ExecutionResult) -> Result<String, BencherError> {
    let cells = [
        seconds("total", r.elapsed)?,
        seconds("user", r.user_time)?,
        seconds("system", r.system_time)?,
        count("maxrss", r.max_rss)?,
        count("minflt", r.minor_faults)?,
        count("majflt", r.major_faults)?,
        count("swap", r.swaps)?,
        count("vcsw", r.voluntary_switches)?,
        count("ivcsw", r.involuntary_switches)?,
    ];
    Ok(cells.join(SEP))
}

#[derive(Serialize)]
struct JsonHeader<'a> {
    target: &'a str,
    cores: usize,
    frequency: String,
    isa: &'a str,
    started_at: String,
}

#[derive(Serialize)]
struct JsonRow {
    iteration: usize,
    total_ns: u128,
    user_us: u128,
    system_us: u128,
    maxrss_kb: u64,
    minflt: u64,
    majflt: u64,
    swap: u64,
    vcsw: u64,
    ivcsw: u64,
}

/// Writes the run header and one row per successful iteration.
pub struct Reporter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub fn header(
        &mut self,
        header: &RunHeader,
        started_at: DateTime<Utc>,
    ) -> Result<(), BencherError> {
        let text = match self.format {
            OutputFormat::Table => format!(
                "{}\n{}\n",
                format_header(&header.target, &header.cpu, &header.isa),
                column_header()
            ),
            OutputFormat::Json => {
                let record = JsonHeader {
                    target: &header.target,
                    cores: header.cpu.count,
                    frequency: normalize_frequency(header.cpu.frequency_khz).to_string(),
                    isa: &header.isa,
                    started_at: started_at.to_rfc3339(),
                };
                to_json_line(&record)?
            }
        };
        self.write(&text)
    }

    pub fn row(&mut self, iteration: usize, result: &ExecutionResult) -> Result<(), BencherError> {
        // The table row doubles as the ceiling check for both formats.
        let table_row = format_row(result)?;
        let text = match self.format {
            OutputFormat::Table => format!("{}\n", table_row),
            OutputFormat::Json => to_json_line(&JsonRow {
                iteration,
                total_ns: result.elapsed.as_nanos(),
                user_us: result.user_time.as_micros(),
                system_us: result.system_time.as_micros(),
                maxrss_kb: result.max_rss,
                minflt: result.minor_faults,
                majflt: result.major_faults,
                swap: result.swaps,
                vcsw: result.voluntary_switches,
                ivcsw: result.involuntary_switches,
            })?,
        };
        self.write(&text)
    }

    fn write(&mut self, text: &str) -> Result<(), BencherError> {
        self.out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.flush())
            .map_err(BencherError::WriteOutput)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn to_json_line<T: Serialize>(value: &T) -> Result<String, BencherError> {
    serde_json::to_string(value)
        .map(|s| s + "\n")
        .map_err(|e| BencherError::WriteOutput(e.into()))
}

/// Colour a validation report for stderr when it is a terminal.
pub fn paint_diagnostics(report: &str) -> String {
    let error = Style::new().red().bold();
    let mut out = String::with_capacity(report.len());
    for line in report.split_inclusive('\n') {
        let painted = if line.starts_with("Error:") {
            line.if_supports_color(Stream::Stderr, |s| s.style(error))
                .to_string()
        } else if line.starts_with("  Expected:") {
            line.if_supports_color(Stream::Stderr, |s| s.green()).to_string()
        } else if line.starts_with("  Actual:") {
            line.if_supports_color(Stream::Stderr, |s| s.yellow()).to_string()
        } else if line.starts_with("...") {
            line.if_supports_color(Stream::Stderr, |s| s.dimmed()).to_string()
        } else {
            line.to_string()
        };
        out.push_str(&painted);
    }
    out
}
