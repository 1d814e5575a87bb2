//! External process execution with a hard deadline.
//!
//! Arguments are passed as discrete tokens, never through a shell.
//! stdout and stderr are drained by their own tasks into owned buffers
//! so a chatty tool can't stall on a full pipe, and the call returns
//! only once both buffers are complete (or the deadline fires).

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Deadline applied to every tool invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Normalized result of running an external program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The process ran to completion. `code` is `None` if it was killed
    /// by a signal.
    Exited {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// The deadline passed or the caller cancelled; the process group
    /// was killed and reaped.
    TimedOut,

    /// The executable could not be located or launched.
    NotFound { message: String },

    /// Spawning or waiting failed for a reason other than lookup.
    Failed { message: String },
}

/// Runs external programs.
///
/// The seam between the backend and the OS; tests substitute scripted
/// runners.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String], cancel: &CancellationToken)
        -> ProcessOutcome;
}

/// Runs programs with `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn build_command(program: &str, args: &[String]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so the whole tree can be killed at once
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> ProcessOutcome {
        let deadline = Instant::now() + self.timeout;

        let mut child = match Self::build_command(program, args).spawn() {
            Ok(child) => child,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                debug!(program, error = %e, "Tool not found");
                return ProcessOutcome::NotFound {
                    message: format!("{program}: {e}"),
                };
            }
            Err(e) => {
                warn!(program, error = %e, "Failed to start tool");
                return ProcessOutcome::Failed {
                    message: format!("Could not start {program}: {e}"),
                };
            }
        };

        // Process group id; child.id() is gone once the child is reaped
        let pgid = child.id();
        trace!(program, ?args, pid = ?pgid, "Spawned tool");

        let mut stdout_task = child.stdout.take().map(|s| tokio::spawn(read_all(s)));
        let mut stderr_task = child.stderr.take().map(|s| tokio::spawn(read_all(s)));

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = sleep_until(deadline) => None,
            _ = cancel.cancelled() => None,
        };

        let status = match status {
            Some(Ok(status)) => status,
            Some(Err(e)) => {
                terminate(&mut child, pgid).await;
                abort_readers(stdout_task, stderr_task);
                return ProcessOutcome::Failed {
                    message: format!("Failed to wait for {program}: {e}"),
                };
            }
            None => {
                debug!(program, timeout = ?self.timeout, "Tool timed out or was cancelled");
                terminate(&mut child, pgid).await;
                abort_readers(stdout_task, stderr_task);
                return ProcessOutcome::TimedOut;
            }
        };

        // A grandchild may still hold the pipes open; the deadline covers
        // draining them too.
        let drained = timeout_at(deadline, async {
            let stdout = join_reader(stdout_task.as_mut()).await;
            let stderr = join_reader(stderr_task.as_mut()).await;
            (stdout, stderr)
        })
        .await;

        match drained {
            Ok((stdout, stderr)) => ProcessOutcome::Exited {
                code: status.code(),
                stdout,
                stderr,
            },
            Err(_) => {
                debug!(program, "Tool output not closed before deadline");
                terminate(&mut child, pgid).await;
                abort_readers(stdout_task, stderr_task);
                ProcessOutcome::TimedOut
            }
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        trace!(error = %e, "Pipe read ended with error");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn join_reader(task: Option<&mut JoinHandle<String>>) -> String {
    match task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

fn abort_readers(stdout: Option<JoinHandle<String>>, stderr: Option<JoinHandle<String>>) {
    for handle in [stdout, stderr].into_iter().flatten() {
        handle.abort();
    }
}

/// Kills the process group `pgid` and reaps the child.
///
/// The group outlives a reaped leader, so `pgid` must be captured at spawn.
async fn terminate(child: &mut Child, pgid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pgid.and_then(|p| i32::try_from(p).ok()) {
        // SAFETY: kill(2) with a negative pid signals the process group we
        // created at spawn; it has no memory-safety preconditions.
        let result = unsafe { libc::kill(-pid, libc::SIGKILL) };
        if result != 0 {
            trace!(pid, "Process group already gone");
        }
    }

    if let Err(e) = child.kill().await {
        trace!(error = %e, "Child already exited");
    }
}
