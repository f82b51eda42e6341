//! Child process execution and measurement.
//!
//! Each iteration spawns the benchmark with stdin connected to a pipe and
//! stdout redirected to a scratch file, so the parent can write all input
//! and only read the output once the child is gone. The child is reaped with
//! `wait4` to get its exit status and resource usage in one step.
//!
//! The CPU time limit is `RLIMIT_CPU`: it bounds CPU seconds consumed, not
//! wall time, so a child blocked on I/O is never interrupted by it.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::clock::Stamp;
use crate::errors::BencherError;
use crate::types::{ExecutionResult, ExitState};

/// A finished iteration: measurements plus everything it wrote to stdout.
#[derive(Debug, Clone)]
pub struct Execution {
    pub result: ExecutionResult,
    pub output: Vec<u8>,
}

/// Runs one iteration of the benchmark.
pub trait Launcher {
    fn launch(&mut self, input: &[u8]) -> Result<Execution, BencherError>;
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// CPU seconds the child may consume before the kernel sends `SIGXCPU`.
    pub timeout_secs: Option<u64>,
    /// Logical core to restrict the child to.
    pub pin_core: Option<usize>,
    /// Where the per-run scratch output file is created.
    pub scratch_dir: PathBuf,
}

pub struct ProcessRunner {
    program: String,
    args: Vec<String>,
    timeout_secs: Option<u64>,
    pin_core: Option<usize>,
    /// Removed when the runner is dropped.
    scratch: NamedTempFile,
}

impl ProcessRunner {
    pub fn new(command: &[String], options: RunnerOptions) -> Result<Self, BencherError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| BencherError::InvalidArgument("No benchmark command given".to_string()))?;

        if let Some(core) = options.pin_core {
            check_pin_core(core)?;
        }
        if options.timeout_secs == Some(0) {
            return Err(BencherError::InvalidArgument(
                "Timeout must be at least one second".to_string(),
            ));
        }

        let scratch = tempfile::Builder::new()
            .prefix("bencher-")
            .suffix(".out")
            .tempfile_in(&options.scratch_dir)
            .map_err(BencherError::ScratchFile)?;
        tracing::debug!(path = %scratch.path().display(), "created scratch output file");

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout_secs: options.timeout_secs,
            pin_core: options.pin_core,
            scratch,
        })
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    fn command(&self) -> Result<Command, BencherError> {
        self.scratch
            .as_file()
            .set_len(0)
            .map_err(BencherError::ScratchFile)?;
        let stdout = self.scratch.reopen().map_err(BencherError::ScratchFile)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::inherit());

        let pin_core = self.pin_core;
        let timeout_secs = self.timeout_secs;
        // Runs in the child between fork and exec: syscalls only, no allocation.
        unsafe {
            command.pre_exec(move || {
                if let Some(core) = pin_core {
                    pin_to_core(core)?;
                }
                if let Some(secs) = timeout_secs {
                    limit_cpu_time(secs)?;
                }
                Ok(())
            });
        }
        Ok(command)
    }

    fn read_output(&mut self) -> Result<Vec<u8>, BencherError> {
        let file = self.scratch.as_file_mut();
        file.seek(SeekFrom::Start(0))
            .map_err(BencherError::ScratchFile)?;
        let mut output = Vec::new();
        file.read_to_end(&mut output)
            .map_err(BencherError::ScratchFile)?;
        Ok(output)
    }
}

impl Launcher for ProcessRunner {
    fn launch(&mut self, input: &[u8]) -> Result<Execution, BencherError> {
        let mut command = self.command()?;

        let start = Stamp::now();
        let mut child = command.spawn().map_err(|source| BencherError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let pid = child.id();
        tracing::debug!(pid, program = %self.program, "spawned benchmark");

        if let Some(mut stdin) = child.stdin.take()
            && let Err(err) = feed(&mut stdin, input)
        {
            drop(stdin);
            reap_abandoned(&mut child);
            return Err(err);
        }

        let (exit, usage) = wait_with_usage(pid)?;
        let elapsed = Stamp::now().since(start);
        tracing::debug!(pid, %exit, ?elapsed, "benchmark finished");

        let result = ExecutionResult {
            elapsed,
            user_time: to_duration(usage.ru_utime),
            system_time: to_duration(usage.ru_stime),
            max_rss: to_count(usage.ru_maxrss),
            minor_faults: to_count(usage.ru_minflt),
            major_faults: to_count(usage.ru_majflt),
            swaps: to_count(usage.ru_nswap),
            voluntary_switches: to_count(usage.ru_nvcsw),
            involuntary_switches: to_count(usage.ru_nivcsw),
            exit,
        };

        let output = if exit.success() {
            self.read_output()?
        } else {
            Vec::new()
        };

        Ok(Execution { result, output })
    }
}

/// Write all of `input`, then close the pipe when `stdin` is dropped.
/// A child that exits without reading everything is not an error.
fn feed(stdin: &mut impl Write, input: &[u8]) -> Result<(), BencherError> {
    if input.is_empty() {
        return Ok(());
    }
    match stdin.write_all(input) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            tracing::warn!(
                bytes = input.len(),
                "benchmark closed stdin before reading all input"
            );
            Ok(())
        }
        Err(e) => Err(BencherError::Feed(e)),
    }
}

/// Kill and reap a child the run is giving up on.
fn reap_abandoned(child: &mut Child) {
    let pid = child.id();
    if let Err(e) = child.kill() {
        tracing::debug!(pid, error = %e, "kill of abandoned benchmark failed");
    }
    if let Err(e) = wait_with_usage(pid) {
        tracing::warn!(pid, error = %e, "could not reap abandoned benchmark");
    }
}

fn wait_with_usage(pid: u32) -> Result<(ExitState, libc::rusage), BencherError> {
    let pid = pid as libc::pid_t;
    let mut status: libc::c_int = 0;
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    loop {
        let ret = unsafe { libc::wait4(pid, &mut status, 0, &mut usage) };
        if ret == pid {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(BencherError::Wait(err));
        }
    }

    let exit = if libc::WIFSIGNALED(status) {
        ExitState::Signaled(libc::WTERMSIG(status))
    } else {
        ExitState::Exited(libc::WEXITSTATUS(status))
    };
    Ok((exit, usage))
}

fn to_duration(tv: libc::timeval) -> Duration {
    Duration::new(tv.tv_sec.max(0) as u64, (tv.tv_usec.max(0) as u32) * 1_000)
}

fn to_count(value: libc::c_long) -> u64 {
    value.max(0) as u64
}

/// Whether `core` can be named in an affinity mask.
#[cfg(target_os = "linux")]
pub fn check_pin_core(core: usize) -> Result<(), BencherError> {
    if core >= libc::CPU_SETSIZE as usize {
        return Err(BencherError::InvalidArgument(format!(
            "Cannot pin to core {}: at most {} cores are addressable",
            core,
            libc::CPU_SETSIZE
        )));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn check_pin_core(core: usize) -> Result<(), BencherError> {
    tracing::warn!(core, "cpu pinning is not supported on this platform; running unpinned");
    Ok(())
}

#[cfg(target_os = "linux")]
fn pin_to_core(core: usize) -> io::Result<()> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core, &mut set);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn pin_to_core(_core: usize) -> io::Result<()> {
    Ok(())
}

/// Lower the soft `RLIMIT_CPU`, never above the hard limit.
fn limit_cpu_time(secs: u64) -> io::Result<()> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    unsafe {
        if libc::getrlimit(libc::RLIMIT_CPU, &mut limit) != 0 {
            return Err(io::Error::last_os_error());
        }
        let wanted = secs as libc::rlim_t;
        limit.rlim_cur = if limit.rlim_max != libc::RLIM_INFINITY && wanted > limit.rlim_max {
            limit.rlim_max
        } else {
            wanted
        };
        if libc::setrlimit(libc::RLIMIT_CPU, &limit) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
