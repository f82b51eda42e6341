use std::io::Write;
use std::path::Path;

use chrono::Utc;

use crate::cpufreq::FrequencyInspector;
use crate::errors::BencherError;
use crate::loader;
use crate::report::{Reporter, RunHeader};
use crate::runner::Launcher;
use crate::types::{Baseline, DiffMode, ExitState, Input};
use crate::validate::{self, ValidationOutcome};

/// Everything fixed for the lifetime of one benchmark run.
#[derive(Debug, Clone)]
pub struct BenchmarkSession {
    pub input: Input,
    pub baseline: Option<Baseline>,
    pub iterations: usize,
    pub header: RunHeader,
}

/// Where to find the files a session needs.
#[derive(Debug, Clone, Copy)]
pub struct SessionFiles<'a> {
    pub input: Option<&'a Path>,
    pub baseline: Option<(&'a Path, DiffMode)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Completed,
    /// The benchmark itself failed; its output was never checked.
    ExecutionFailed { iteration: usize, exit: ExitState },
    /// The benchmark ran but produced the wrong output.
    ValidationFailed {
        iteration: usize,
        outcome: ValidationOutcome,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Iterations that passed and were reported.
    pub completed: usize,
    pub status: RunStatus,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

impl BenchmarkSession {
    /// Load input and baseline and describe the machine. Any failure here
    /// is fatal: nothing has been run yet.
    pub fn prepare(
        target: &str,
        files: SessionFiles<'_>,
        iterations: usize,
        inspector: &dyn FrequencyInspector,
        isa: &str,
    ) -> Result<Self, BencherError> {
        if iterations == 0 {
            return Err(BencherError::InvalidArgument(
                "Iteration count must be at least 1".to_string(),
            ));
        }

        let input = match files.input {
            Some(path) => Input::new(loader::read_all(path)?),
            None => Input::default(),
        };
        let baseline = match files.baseline {
            Some((path, mode)) => Some(Baseline::new(loader::read_all(path)?, mode)),
            None => None,
        };
        let cpu = inspector.inspect()?;

        tracing::debug!(
            input_bytes = input.len(),
            baseline = baseline.is_some(),
            iterations,
            "session prepared"
        );

        Ok(Self {
            input,
            baseline,
            iterations,
            header: RunHeader {
                target: target.to_string(),
                cpu,
                isa: isa.to_string(),
            },
        })
    }

    /// Run up to `iterations` times, stopping at the first failed execution
    /// or validation. A row is reported only for iterations that passed.
    pub fn run<L: Launcher, W: Write>(
        &self,
        launcher: &mut L,
        reporter: &mut Reporter<W>,
        mut progress: Option<&mut dyn Write>,
    ) -> Result<RunOutcome, BencherError> {
        reporter.header(&self.header, Utc::now())?;

        let width = self.iterations.to_string().len();
        for iteration in 1..=self.iterations {
            if let Some(out) = progress.as_mut() {
                writeln!(
                    out,
                    "Iteration {:0width$}/{}",
                    iteration,
                    self.iterations,
                    width = width
                )
                .map_err(BencherError::WriteOutput)?;
            }

            let execution = launcher.launch(self.input.as_bytes())?;
            let exit = execution.result.exit;
            if !exit.success() {
                tracing::warn!(iteration, %exit, "benchmark failed; stopping");
                return Ok(RunOutcome {
                    completed: iteration - 1,
                    status: RunStatus::ExecutionFailed { iteration, exit },
                });
            }

            let outcome = validate::check(&execution.output, self.baseline.as_ref());
            if !outcome.passed() {
                tracing::warn!(iteration, "output does not match baseline; stopping");
                return Ok(RunOutcome {
                    completed: iteration - 1,
                    status: RunStatus::ValidationFailed { iteration, outcome },
                });
            }

            reporter.row(iteration, &execution.result)?;
            tracing::info!(iteration, elapsed = ?execution.result.elapsed, "iteration passed");
        }

        Ok(RunOutcome {
            completed: self.iterations,
            status: RunStatus::Completed,
        })
    }
}
