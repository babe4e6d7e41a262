use crate::error::{InstallerError, Result};
use crate::utils::shell::display_command;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Lines of stderr kept for error messages
const STDERR_TAIL_LINES: usize = 20;

/// How long to keep reading stderr once the child is gone. Grandchildren
/// may hold the pipe open long after it exited.
const STDERR_DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shell-like rendering for logs and error messages
    pub fn display(&self) -> String {
        display_command(&self.program.to_string_lossy(), self.args.as_slice())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub timed_out: bool,
    /// Tail of stderr, empty when output went to the terminal
    pub stderr: String,
}

impl CommandOutput {
    /// One-line reason for a failed run
    pub fn failure_reason(&self) -> String {
        let status = if self.timed_out {
            "timed out".to_string()
        } else {
            match self.code {
                Some(code) => format!("exit code {}", code),
                None => "killed by signal".to_string(),
            }
        };
        match self.stderr.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(last) => format!("{}: {}", status, last.trim()),
            None => status,
        }
    }
}

/// Runs external commands. `Err` means the command could not be started.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands as child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    /// Let the child write to the terminal instead of capturing stderr
    pub verbose: bool,
}

impl SystemRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        tracing::debug!("running {}", spec.display());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).stdin(Stdio::null());
        if self.verbose {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::piped());
        }

        let mut child = cmd.spawn().map_err(|e| {
            InstallerError::CommandFailed(format!("failed to execute {}: {}", spec.display(), e))
        })?;

        // Drain stderr on a thread so a chatty child can't block on a full pipe
        let lines = child.stderr.take().map(|stderr| {
            let (tx, rx) = mpsc::channel();
            std::thread::spawn(move || {
                let mut reader = BufReader::new(stderr);
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&buf);
                            if tx.send(line.trim_end_matches(['\n', '\r']).to_string()).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
            rx
        });

        let waited = match spec.timeout {
            Some(timeout) => child.wait_timeout(timeout),
            None => child.wait().map(Some),
        };
        let (status, timed_out) = match waited {
            Ok(Some(status)) => (Some(status), false),
            Ok(None) => {
                tracing::warn!("{} timed out, killing it", spec.display());
                let _ = child.kill();
                (child.wait().ok(), true)
            }
            Err(e) => {
                let _ = child.kill();
                return Err(InstallerError::CommandFailed(format!(
                    "failed to wait for {}: {}",
                    spec.display(),
                    e
                )));
            }
        };

        let stderr = lines
            .map(|rx| tail(&drain(&rx, STDERR_DRAIN_GRACE), STDERR_TAIL_LINES))
            .unwrap_or_default();

        Ok(CommandOutput {
            success: !timed_out && status.is_some_and(|s| s.success()),
            code: status.and_then(|s| s.code()),
            timed_out,
            stderr,
        })
    }
}

/// Collect lines until the writers close the pipe or `grace` runs out.
/// The reader thread is left behind in the latter case.
fn drain(rx: &Receiver<String>, grace: Duration) -> Vec<String> {
    let deadline = Instant::now() + grace;
    let mut lines = Vec::new();
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok(line) => lines.push(line),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                tracing::debug!("stderr still open after the command exited, not waiting for it");
                break;
            }
        }
    }
    lines
}

fn tail(lines: &[String], keep: usize) -> String {
    lines[lines.len().saturating_sub(keep)..].join("\n")
}
