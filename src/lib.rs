pub mod clock;
pub mod config;
pub mod cpufreq;
pub mod errors;
pub mod lines;
pub mod loader;
pub mod report;
pub mod runner;
pub mod session;
pub mod types;
pub mod validate;
