use std::fmt;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Bytes fed to the benchmark's stdin on every iteration.
#[derive(Debug, Clone, Default)]
pub struct Input {
    bytes: Vec<u8>,
}

impl Input {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// How captured output is compared against the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiffMode {
    /// Byte-for-byte, length included.
    Binary,
    /// Line by line; lines that differ textually may still pass if their
    /// leading numbers are within `tolerance` of each other. Zero disables
    /// the numeric fallback.
    Textual { tolerance: f64 },
}

impl Default for DiffMode {
    fn default() -> Self {
        DiffMode::Textual { tolerance: 0.0 }
    }
}

/// Expected output of the benchmark.
#[derive(Debug, Clone)]
pub struct Baseline {
    bytes: Vec<u8>,
    mode: DiffMode,
}

impl Baseline {
    pub fn new(bytes: Vec<u8>, mode: DiffMode) -> Self {
        Self { bytes, mode }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mode(&self) -> DiffMode {
        self.mode
    }
}

/// How the child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Exited(i32),
    Signaled(i32),
}

impl ExitState {
    pub fn success(self) -> bool {
        self == ExitState::Exited(0)
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ExitState::Exited(code) => write!(f, "exited with status {}", code),
            #[cfg(unix)]
            ExitState::Signaled(sig) if sig == libc::SIGXCPU => {
                write!(f, "killed by signal {} (CPU time limit exceeded)", sig)
            }
            ExitState::Signaled(sig) => write!(f, "killed by signal {}", sig),
        }
    }
}

/// Measurements for one completed child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Wall-clock time from just before spawn to just after reaping.
    pub elapsed: Duration,
    pub user_time: Duration,
    pub system_time: Duration,
    /// Peak resident set size in kilobytes.
    pub max_rss: u64,
    pub minor_faults: u64,
    pub major_faults: u64,
    pub swaps: u64,
    pub voluntary_switches: u64,
    pub involuntary_switches: u64,
    pub exit: ExitState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}
