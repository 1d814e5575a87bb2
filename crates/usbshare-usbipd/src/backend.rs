//! Typed facade over the usbipd CLI.
//!
//! Every operation runs the tool once with a fixed argument shape and
//! maps the process outcome onto [`BackendResult`]:
//!
//! | outcome | result |
//! |---|---|
//! | exit 0 | success |
//! | exit 5 | `Unauthorized` |
//! | other exit | `ProcessFailed`, trimmed stderr or "failed with exit code N" |
//! | deadline / cancel | `Timeout` |
//! | executable missing | `ToolNotFound` |

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use usbshare_core::{BackendFailure, BackendResult, Device, DriverStatus, ErrorCode};

use crate::parse::parse_device_list;
use crate::runner::{CommandRunner, ProcessOutcome, ProcessRunner};

/// Executable looked up on `PATH` when no explicit tool is configured.
pub const DEFAULT_TOOL: &str = "usbipd";

/// Exit code the tool uses for privilege and driver-installation failures.
const UNAUTHORIZED_EXIT_CODE: i32 = 5;

/// Device operations the daemon and guest agent depend on.
///
/// Implementations must not panic on tool failures; every expected
/// failure is returned as a value.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Runs `list` and returns its raw stdout.
    async fn list_raw(&self, cancel: &CancellationToken) -> Result<String, BackendFailure>;

    /// Runs `list` and parses the connected devices.
    async fn list_devices(&self, cancel: &CancellationToken) -> Result<Vec<Device>, BackendFailure> {
        let raw = self.list_raw(cancel).await?;
        Ok(parse_device_list(&raw))
    }

    async fn bind(&self, device_id: &str, cancel: &CancellationToken) -> BackendResult;

    async fn unbind(&self, device_id: &str, cancel: &CancellationToken) -> BackendResult;

    /// Same as [`bind`](Self::bind).
    async fn export(&self, device_id: &str, cancel: &CancellationToken) -> BackendResult {
        self.bind(device_id, cancel).await
    }

    async fn attach(
        &self,
        host_address: &str,
        device_id: &str,
        cancel: &CancellationToken,
    ) -> BackendResult;

    async fn detach(&self, device_id: &str, cancel: &CancellationToken) -> BackendResult;

    /// Probes the tool with `state`.
    async fn driver_status(&self, cancel: &CancellationToken) -> DriverStatus;
}

/// [`DeviceBackend`] that shells out to the usbipd executable.
#[derive(Debug, Clone)]
pub struct UsbipdBackend<R = ProcessRunner> {
    tool: String,
    runner: R,
}

impl UsbipdBackend<ProcessRunner> {
    /// Creates a backend for `tool` with the default 20 s deadline.
    pub fn new(tool: impl Into<String>) -> Self {
        Self::with_runner(tool, ProcessRunner::new())
    }
}

impl Default for UsbipdBackend<ProcessRunner> {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL)
    }
}

impl<R: CommandRunner> UsbipdBackend<R> {
    pub fn with_runner(tool: impl Into<String>, runner: R) -> Self {
        Self {
            tool: tool.into(),
            runner,
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Runs the tool and returns stdout on success.
    async fn execute(
        &self,
        args: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<String, BackendFailure> {
        let outcome = self.runner.run(&self.tool, &args, cancel).await;
        self.map_outcome(&args, outcome)
    }

    fn map_outcome(
        &self,
        args: &[String],
        outcome: ProcessOutcome,
    ) -> Result<String, BackendFailure> {
        match outcome {
            ProcessOutcome::Exited {
                code: Some(0),
                stdout,
                ..
            } => {
                debug!(tool = %self.tool, ?args, "Tool succeeded");
                Ok(stdout)
            }
            ProcessOutcome::Exited {
                code: Some(UNAUTHORIZED_EXIT_CODE),
                stderr,
                ..
            } => {
                let message = self.failure_message(&stderr, Some(UNAUTHORIZED_EXIT_CODE));
                info!(tool = %self.tool, ?args, %message, "Tool reported unauthorized");
                Err(BackendFailure::new(ErrorCode::Unauthorized, message))
            }
            ProcessOutcome::Exited { code, stderr, .. } => {
                let message = self.failure_message(&stderr, code);
                info!(tool = %self.tool, ?args, ?code, %message, "Tool failed");
                Err(BackendFailure::new(ErrorCode::ProcessFailed, message))
            }
            ProcessOutcome::TimedOut => {
                info!(tool = %self.tool, ?args, "Tool timed out");
                Err(BackendFailure::new(
                    ErrorCode::Timeout,
                    format!("{} command timed out", self.tool),
                ))
            }
            ProcessOutcome::NotFound { message } => {
                Err(BackendFailure::new(ErrorCode::ToolNotFound, message))
            }
            ProcessOutcome::Failed { message } => {
                Err(BackendFailure::new(ErrorCode::ProcessFailed, message))
            }
        }
    }

    fn failure_message(&self, stderr: &str, code: Option<i32>) -> String {
        let trimmed = stderr.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
        match code {
            Some(code) => format!("{} failed with exit code {code}", self.tool),
            None => format!("{} was terminated by a signal", self.tool),
        }
    }
}

fn busid_arg(device_id: &str) -> String {
    format!("--busid={device_id}")
}

#[async_trait]
impl<R: CommandRunner> DeviceBackend for UsbipdBackend<R> {
    async fn list_raw(&self, cancel: &CancellationToken) -> Result<String, BackendFailure> {
        self.execute(vec!["list".to_string()], cancel).await
    }

    async fn bind(&self, device_id: &str, cancel: &CancellationToken) -> BackendResult {
        self.execute(vec!["bind".to_string(), busid_arg(device_id)], cancel)
            .await
            .map(drop)
            .into()
    }

    async fn unbind(&self, device_id: &str, cancel: &CancellationToken) -> BackendResult {
        self.execute(vec!["unbind".to_string(), busid_arg(device_id)], cancel)
            .await
            .map(drop)
            .into()
    }

    async fn attach(
        &self,
        host_address: &str,
        device_id: &str,
        cancel: &CancellationToken,
    ) -> BackendResult {
        let args = vec![
            "attach".to_string(),
            format!("--remote={host_address}"),
            busid_arg(device_id),
        ];
        self.execute(args, cancel).await.map(drop).into()
    }

    async fn detach(&self, device_id: &str, cancel: &CancellationToken) -> BackendResult {
        self.execute(vec!["detach".to_string(), busid_arg(device_id)], cancel)
            .await
            .map(drop)
            .into()
    }

    async fn driver_status(&self, cancel: &CancellationToken) -> DriverStatus {
        match self.execute(vec!["state".to_string()], cancel).await {
            Ok(_) => DriverStatus::reachable(),
            Err(failure) => DriverStatus::unreachable(failure),
        }
    }
}
