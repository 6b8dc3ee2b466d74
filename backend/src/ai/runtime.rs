//! Local generation runtime driven as a subprocess.
//!
//! Two commands are used:
//!
//! ```text
//! <runtime> --version                 availability probe
//! <runtime> run <model> <payload>     generation
//! ```
//!
//! Both are bounded by a timeout. A child that outlives its budget is killed
//! together with its process group, and the call returns without waiting for
//! its output.

use std::ffi::OsStr;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::api::logs::LogBroadcaster;
use crate::config::RuntimeConfig;
use crate::error::{GenerationError, GenerationResult};

/// Interval between exit-status polls.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured output of a finished child.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Handle on the local runtime binary
#[derive(Clone)]
pub struct LocalRuntime {
    config: RuntimeConfig,
    logs: LogBroadcaster,
}

impl LocalRuntime {
    pub fn new(config: RuntimeConfig, logs: LogBroadcaster) -> Self {
        Self { config, logs }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn program_label(&self) -> String {
        self.config.program.display().to_string()
    }

    /// Check that the runtime answers `--version` in time.
    ///
    /// Never fails: every problem is logged and reported as `false`.
    pub fn is_available(&self) -> bool {
        match self.run(["--version"], self.config.probe_timeout) {
            Ok(output) => {
                let found = output.stdout.to_lowercase().contains("version");
                if !found {
                    self.logs.warning(format!(
                        "Error in checking {} installation: unexpected version output '{}'",
                        self.program_label(),
                        output.stdout.trim()
                    ));
                }
                found
            }
            Err(e) => {
                self.logs.warning(format!(
                    "Error in checking {} installation: {}",
                    self.program_label(),
                    e
                ));
                false
            }
        }
    }

    /// Run `<runtime> run <model> <payload>` and return stdout verbatim.
    pub fn run_model(&self, model: &str, payload: &str) -> GenerationResult<String> {
        let output = self.run(["run", model, payload], self.config.generate_timeout)?;

        if !output.status.success() {
            return Err(GenerationError::Exited {
                code: output.status.code(),
                stderr: output.stderr,
            });
        }

        Ok(output.stdout)
    }

    /// Spawn the runtime with `args` and wait at most `timeout`.
    pub fn run<I, S>(&self, args: I, timeout: Duration) -> GenerationResult<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.config.program);
        let child = isolate(&mut command)
            .args(&self.config.program_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| GenerationError::Spawn {
                program: self.program_label(),
                source,
            })?;

        wait_with_timeout(child, timeout)
    }
}

/// Wait for `child`, draining its pipes concurrently.
///
/// Output is read on helper threads so a chatty child never blocks on a full
/// pipe while we poll for its exit. The whole budget covers both the exit and
/// the pipes closing: anything the child left behind holding them open is
/// killed along with its process group.
pub fn wait_with_timeout(mut child: Child, timeout: Duration) -> GenerationResult<CommandOutput> {
    let deadline = Instant::now() + timeout;
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                reap(&mut child);
                return Err(GenerationError::Wait(e));
            }
        }

        if Instant::now() >= deadline {
            // Reader threads are left to finish once the pipes close.
            reap(&mut child);
            return Err(GenerationError::TimedOut { timeout });
        }

        thread::sleep(POLL_INTERVAL);
    };

    match (collect(stdout, deadline), collect(stderr, deadline)) {
        (Some(stdout), Some(stderr)) => Ok(CommandOutput {
            status,
            stdout,
            stderr,
        }),
        _ => {
            kill_group(&child);
            Err(GenerationError::TimedOut { timeout })
        }
    }
}

/// Put the child in its own process group so a timeout reaches its
/// descendants too.
fn isolate(command: &mut Command) -> &mut Command {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

/// Pipe contents, or `None` if the pipe is still open at `deadline`.
fn collect(pipe: Option<Receiver<Vec<u8>>>, deadline: Instant) -> Option<String> {
    let Some(rx) = pipe else {
        return Some(String::new());
    };
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(String::new()),
    }
}

fn kill_group(child: &Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let _ = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
    }
    #[cfg(not(unix))]
    let _ = child;
}

fn reap(child: &mut Child) {
    kill_group(child);
    let _ = child.kill();
    let _ = child.wait();
}
