//! Launching child processes and reaping their termination status.

use crate::ExitCode;
use anyhow::{Context, Result};
use std::fmt;
use std::io;
use std::process::{Child, Command, ExitStatus};
use tracing::{debug, warn};

/// Status reported for a program that could not be found.
pub const NOT_FOUND: ExitCode = 127;
/// Status reported for a program that exists but could not be executed.
pub const NOT_EXECUTABLE: ExitCode = 126;

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The child exited normally with this code.
    Exited(ExitCode),
    /// The child was killed by this signal.
    Signaled(i32),
    /// The child terminated abnormally without a signal number (core dump).
    Abnormal,
    /// The program never started. Carries the shell-style status for the failure.
    NotLaunched(ExitCode),
}

impl Termination {
    /// Decode into a single shell-style exit code.
    ///
    /// Signals map to `128 + signal`, the same convention POSIX shells use for `$?`.
    pub fn code(self) -> ExitCode {
        match self {
            Termination::Exited(code) | Termination::NotLaunched(code) => code,
            Termination::Signaled(signal) => 128 + signal,
            Termination::Abnormal => 255,
        }
    }
}

impl From<ExitStatus> for Termination {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => Termination::Exited(code),
            None => terminated_by_signal(status),
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(unix)]
fn terminated_by_signal(status: ExitStatus) -> Termination {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => Termination::Signaled(signal),
        None => Termination::Abnormal,
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_status: ExitStatus) -> Termination {
    Termination::Abnormal
}

fn launch_failure_status(err: &io::Error) -> ExitCode {
    match err.kind() {
        io::ErrorKind::NotFound => NOT_FOUND,
        io::ErrorKind::PermissionDenied => NOT_EXECUTABLE,
        _ => 1,
    }
}

enum State {
    Running(Child),
    /// Spawning failed; the status is known up front.
    Failed(ExitCode),
    Reaped,
}

/// One launched child process.
///
/// A handle is created by [`ProcessLauncher::launch`] and consumed by
/// [`ProcessHandle::wait`], so it can be waited on at most once. A handle
/// that is dropped without being waited on reaps its child on drop.
pub struct ProcessHandle {
    program: String,
    state: State,
}

impl ProcessHandle {
    /// OS process id, or `None` when the program could not be started.
    pub fn pid(&self) -> Option<u32> {
        match &self.state {
            State::Running(child) => Some(child.id()),
            State::Failed(_) | State::Reaped => None,
        }
    }

    /// Block until the child terminates and return how it ended.
    pub fn wait(mut self) -> Result<Termination> {
        match std::mem::replace(&mut self.state, State::Reaped) {
            State::Running(mut child) => {
                let pid = child.id();
                let status = child
                    .wait()
                    .with_context(|| format!("waiting for {} (pid {})", self.program, pid))?;
                let termination = Termination::from(status);
                debug!(pid, program = %self.program, code = termination.code(), "reaped child");
                Ok(termination)
            }
            State::Failed(code) => Ok(Termination::NotLaunched(code)),
            State::Reaped => unreachable!("a handle is consumed by wait"),
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if let State::Running(child) = &mut self.state {
            let pid = child.id();
            warn!(pid, program = %self.program, "reaping child that was never waited on");
            if let Err(err) = child.wait() {
                warn!(pid, error = %err, "failed to reap child");
            }
        }
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("program", &self.program)
            .field("pid", &self.pid())
            .finish()
    }
}

/// Starts child processes from token lists.
///
/// Children inherit the interpreter's standard streams, environment and
/// working directory. The program named by `tokens[0]` is looked up in
/// `PATH` the way `execvp` does.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }

    /// Start `tokens[0]` with `tokens[1..]` as its arguments.
    ///
    /// Never fails: a program that cannot be started yields a handle whose
    /// [`wait`](ProcessHandle::wait) reports [`Termination::NotLaunched`].
    ///
    /// An empty token list names no program and is reported as not found.
    pub fn launch(&self, tokens: &[String]) -> ProcessHandle {
        let Some((program, args)) = tokens.split_first() else {
            return ProcessHandle {
                program: String::new(),
                state: State::Failed(NOT_FOUND),
            };
        };
        let state = match Command::new(program).args(args).spawn() {
            Ok(child) => {
                debug!(pid = child.id(), %program, "launched child");
                State::Running(child)
            }
            Err(err) => {
                debug!(%program, error = %err, "could not launch program");
                State::Failed(launch_failure_status(&err))
            }
        };
        ProcessHandle {
            program: program.clone(),
            state,
        }
    }

    /// Wait for one handle. Equivalent to [`ProcessHandle::wait`].
    pub fn wait_one(&self, handle: ProcessHandle) -> Result<Termination> {
        handle.wait()
    }
}
