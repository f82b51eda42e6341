use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum BencherError {
    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot open output destination {path}: {source}")]
    OpenOutput {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write metrics: {0}")]
    WriteOutput(std::io::Error),

    #[error("Failed to prepare scratch output file: {0}")]
    ScratchFile(std::io::Error),

    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Failed to write input to benchmark process: {0}")]
    Feed(std::io::Error),

    #[error("Failed to wait for benchmark process: {0}")]
    Wait(std::io::Error),

    #[error("CPU frequency check failed: {0}")]
    Frequency(String),

    #[error("Measured {field} value {value} exceeds the reportable ceiling of {ceiling}")]
    MetricOverflow {
        field: &'static str,
        value: u64,
        ceiling: u64,
    },

    #[error("Invalid config file {path}: {detail}")]
    InvalidConfig { path: PathBuf, detail: String },

    #[error("{0}")]
    InvalidArgument(String),
}
