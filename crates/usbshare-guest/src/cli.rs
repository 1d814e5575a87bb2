//! One-shot guest commands.
//!
//! Each command runs a single backend call and reports through an exit
//! status:
//!
//! | status | meaning |
//! |---|---|
//! | 0 | success |
//! | 1 | the backend reported a failure |
//! | 2 | usage error |

use std::io::{self, Write};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use usbshare_core::{validate_device_id, BackendResult};
use usbshare_usbipd::DeviceBackend;

/// Process exit status of a guest command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
    Usage,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Usage => 2,
        }
    }
}

/// A parsed guest command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestCommand {
    List,
    Connect { remote: String, busid: String },
    Disconnect { busid: String },
}

/// Runs `command`, writing results to `out` and problems to `err`.
pub async fn run_command<W, E>(
    backend: &dyn DeviceBackend,
    command: GuestCommand,
    out: &mut W,
    err: &mut E,
) -> io::Result<ExitStatus>
where
    W: Write,
    E: Write,
{
    let cancel = CancellationToken::new();
    debug!(?command, "Running guest command");

    match command {
        GuestCommand::List => match backend.list_devices(&cancel).await {
            Ok(devices) => {
                for device in devices {
                    writeln!(out, "{device}")?;
                }
                Ok(ExitStatus::Success)
            }
            Err(failure) => {
                writeln!(out, "List failed: {} {}", failure.code, failure.message)?;
                Ok(ExitStatus::Failure)
            }
        },

        GuestCommand::Connect { remote, busid } => {
            if remote.trim().is_empty() {
                writeln!(err, "Error: connect requires --remote and --busid.")?;
                return Ok(ExitStatus::Usage);
            }
            if let Err(e) = validate_device_id(&busid) {
                writeln!(err, "Error: {e}")?;
                return Ok(ExitStatus::Usage);
            }

            let result = backend.attach(&remote, &busid, &cancel).await;
            report(out, &result, "Connect", format!("Connected {busid} @ {remote}"))
        }

        GuestCommand::Disconnect { busid } => {
            if let Err(e) = validate_device_id(&busid) {
                writeln!(err, "Error: {e}")?;
                return Ok(ExitStatus::Usage);
            }

            let result = backend.detach(&busid, &cancel).await;
            report(out, &result, "Disconnect", format!("Disconnected {busid}"))
        }
    }
}

fn report<W: Write>(
    out: &mut W,
    result: &BackendResult,
    verb: &str,
    success_line: String,
) -> io::Result<ExitStatus> {
    if result.success() {
        writeln!(out, "{success_line}")?;
        Ok(ExitStatus::Success)
    } else {
        writeln!(
            out,
            "{verb} failed: {} {}",
            result.error_code(),
            result.message().unwrap_or_default()
        )?;
        Ok(ExitStatus::Failure)
    }
}
