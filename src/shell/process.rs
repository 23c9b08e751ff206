//! Command execution and long-running process spawning.
//!
//! The [`Shell`] trait is the seam between the monitor and the operating
//! system. [`SystemShell`] backs it with `tokio::process`.

use std::borrow::Cow;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Buffer size for a spawned process's event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Error type for shell operations.
#[derive(thiserror::Error, Debug)]
pub enum ShellError {
    /// The binary was not found.
    #[error("Command not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// The command wrote to stderr and the stderr check was enabled.
    #[error("Command `{command}` failed: {stderr}")]
    Stderr { command: String, stderr: String },
    /// Spawned process stdout was not available.
    #[error("Process stdout not available")]
    NoStdout,
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Create a `ShellError` from an I/O error, classifying common cases.
    fn from_io(command: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(command.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(command.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Options for [`Shell::run`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Treat `command` as a complete shell command line run through `sh -c`.
    pub complete_command: bool,
    /// Do not fail when the command writes to stderr.
    pub skip_stderr_check: bool,
}

impl RunOptions {
    /// Options for a complete shell command line.
    #[must_use]
    pub fn complete() -> Self {
        Self {
            complete_command: true,
            skip_stderr_check: false,
        }
    }

    /// Same options, but tolerate stderr output.
    #[must_use]
    pub fn skip_stderr(mut self) -> Self {
        self.skip_stderr_check = true;
        self
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
}

/// Notification from a spawned process, delivered on its private channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// One line written to stdout.
    Output(String),
    /// The process exited. Always the last event on the channel.
    Exit { code: Option<i32> },
}

/// Handle to a long-running spawned process.
///
/// Output and exit notifications are scoped to this handle. Dropping the
/// handle kills the process.
#[derive(Debug)]
pub struct SpawnedProcess {
    id: Uuid,
    pid: Option<u32>,
    events: mpsc::Receiver<ProcessEvent>,
    kill: CancellationToken,
}

impl SpawnedProcess {
    /// Build a handle from its parts.
    ///
    /// `kill` is cancelled when the handle is killed or dropped; whoever owns
    /// the process must terminate it when that happens.
    #[must_use]
    pub fn new(
        pid: Option<u32>,
        events: mpsc::Receiver<ProcessEvent>,
        kill: CancellationToken,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pid,
            events,
            kill,
        }
    }

    /// Unique handle identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// OS process id, if known.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the next notification. Returns `None` once the channel closes.
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        self.events.recv().await
    }

    /// Request termination. Never fails; the process is killed asynchronously.
    pub fn kill(&self) {
        self.kill.cancel();
    }
}

impl Drop for SpawnedProcess {
    fn drop(&mut self) {
        self.kill.cancel();
    }
}

/// Runs commands and spawns watched processes.
#[async_trait]
pub trait Shell: Send + Sync {
    /// Run a command to completion and capture its output.
    async fn run(
        &self,
        command: &str,
        args: &[&str],
        options: RunOptions,
    ) -> Result<ShellOutput, ShellError>;

    /// Spawn a long-running process whose stdout lines become
    /// [`ProcessEvent::Output`] notifications on the returned handle.
    fn spawn(&self, command: &str, args: &[&str]) -> Result<SpawnedProcess, ShellError>;
}

/// [`Shell`] implementation backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShell;

impl SystemShell {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn build_command(command: &str, args: &[&str], complete: bool) -> Command {
        if complete {
            let mut line = command.to_string();
            for arg in args {
                line.push(' ');
                line.push_str(&shell_escape::escape(Cow::Borrowed(*arg)));
            }
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(line);
            cmd
        } else {
            let mut cmd = Command::new(command);
            cmd.args(args);
            cmd
        }
    }
}

#[async_trait]
impl Shell for SystemShell {
    async fn run(
        &self,
        command: &str,
        args: &[&str],
        options: RunOptions,
    ) -> Result<ShellOutput, ShellError> {
        let mut cmd = Self::build_command(command, args, options.complete_command);
        let output = cmd
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ShellError::from_io(command, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !options.skip_stderr_check && !stderr.trim().is_empty() {
            return Err(ShellError::Stderr {
                command: command.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(ShellOutput {
            stdout,
            stderr,
            code: output.status.code(),
        })
    }

    fn spawn(&self, command: &str, args: &[&str]) -> Result<SpawnedProcess, ShellError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ShellError::from_io(command, e))?;

        let pid = child.id();
        let (tx, rx) = mpsc::channel(DEFAULT_EVENT_BUFFER);
        let kill = CancellationToken::new();

        let Some(stdout) = child.stdout.take() else {
            // kill_on_drop reaps the child
            return Err(ShellError::NoStdout);
        };

        tokio::spawn(pump_process(child, stdout, tx, kill.clone()));

        Ok(SpawnedProcess::new(pid, rx, kill))
    }
}

/// Forward stdout lines until the process exits or a kill is requested.
async fn pump_process(
    mut child: Child,
    stdout: tokio::process::ChildStdout,
    tx: mpsc::Sender<ProcessEvent>,
    kill: CancellationToken,
) {
    let pid = child.id();
    let mut lines = BufReader::new(stdout).lines();

    let code = loop {
        tokio::select! {
            () = kill.cancelled() => break terminate(&mut child, pid).await,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if tx.send(ProcessEvent::Output(line)).await.is_err() {
                        break terminate(&mut child, pid).await;
                    }
                }
                Ok(None) | Err(_) => {
                    tokio::select! {
                        () = kill.cancelled() => break terminate(&mut child, pid).await,
                        status = child.wait() => break status.ok().and_then(|s| s.code()),
                    }
                }
            },
        }
    };

    tracing::debug!(pid = ?pid, code = ?code, "Spawned process exited");
    let _ = tx.send(ProcessEvent::Exit { code }).await;
}

async fn terminate(child: &mut Child, pid: Option<u32>) -> Option<i32> {
    if let Err(e) = child.kill().await {
        tracing::debug!(pid = ?pid, error = %e, "Kill failed, process likely already gone");
    }
    child.wait().await.ok().and_then(|s| s.code())
}
