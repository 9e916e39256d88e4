//! External process execution
//!
//! Spawns the build tool with both output streams piped, drives the stream
//! multiplexer, and derives the run outcome. An interrupt observed while
//! the child runs kills it; the exit status is still reaped but the outcome
//! is classified as interrupted rather than failed.

use crate::error::{Error, Result};
use crate::multiplex::StreamMultiplexer;
use crate::ui::UI;
use signal_hook::consts::SIGINT;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything needed to launch one test run. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub working_dir: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Optional deadline for the whole run. Build-tool runs are expected to
    /// be long and variable, so there is no default.
    pub timeout: Option<Duration>,
}

/// Final state of one test run
#[derive(Debug)]
pub struct RunOutcome {
    pub exit_code: i32,
    /// The run was cut short by a user interrupt
    pub interrupted: bool,
    /// The full interleaved output, exactly as echoed live
    pub output: String,
}

impl RunOutcome {
    pub fn passed(&self) -> bool {
        !self.interrupted && self.exit_code == 0
    }
}

/// Keeps a SIGINT observation flag registered for the duration of a run.
/// Dropping the guard restores the previous disposition.
pub struct InterruptGuard {
    flag: Arc<AtomicBool>,
    id: signal_hook::SigId,
}

impl InterruptGuard {
    pub fn install() -> Result<Self> {
        let flag = Arc::new(AtomicBool::new(false));
        let id = signal_hook::flag::register(SIGINT, Arc::clone(&flag))?;
        Ok(InterruptGuard { flag, id })
    }

    pub fn interrupted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        signal_hook::low_level::unregister(self.id);
    }
}

/// Runs one external command to completion with live output
pub struct ProcessRunner;

impl ProcessRunner {
    /// Run the request to completion, echoing all output through the UI as
    /// it arrives and capturing it for the outcome.
    pub fn run(request: &RunRequest, ui: &mut dyn UI) -> Result<RunOutcome> {
        let mut child = Command::new(&request.program)
            .args(&request.args)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::CommandExecution(format!(
                    "Failed to spawn {}: {}",
                    request.program.display(),
                    e
                ))
            })?;

        // Both handles exist because of the piped setup above.
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::CommandExecution("child stdout was not captured".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            Error::CommandExecution("child stderr was not captured".to_string())
        })?;

        let guard = InterruptGuard::install()?;
        let deadline = request.timeout.map(|timeout| Instant::now() + timeout);
        let mux = StreamMultiplexer::start(stdout, stderr);

        let mut stopped = false;
        let captured = mux.drain(ui, || {
            let expired = deadline
                .map(|deadline| Instant::now() >= deadline)
                .unwrap_or(false);
            if (guard.interrupted() || expired) && !stopped {
                stopped = true;
                let _ = child.kill();
            }
            Ok(())
        })?;

        let status = child.wait().map_err(|e| {
            Error::CommandExecution(format!(
                "Failed to wait for {}: {}",
                request.program.display(),
                e
            ))
        })?;

        Ok(RunOutcome {
            // A signal-terminated child reports no exit code; count it as
            // a failure.
            exit_code: status.code().unwrap_or(1),
            interrupted: guard.interrupted(),
            output: String::from_utf8_lossy(&captured).into_owned(),
        })
    }
}
