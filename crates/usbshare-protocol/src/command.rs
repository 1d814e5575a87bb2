//! Command names understood by the host daemon.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Commands a client can send to the host daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostCommand {
    GetServiceStatus,
    ListUsbDevices,
    GetAttachments,
    GetRecentLogs,
    PatchConfig,
    AttachDevice,
    DetachDevice,
    GetDiagnostics,
}

impl HostCommand {
    pub const ALL: [HostCommand; 8] = [
        Self::GetServiceStatus,
        Self::ListUsbDevices,
        Self::GetAttachments,
        Self::GetRecentLogs,
        Self::PatchConfig,
        Self::AttachDevice,
        Self::DetachDevice,
        Self::GetDiagnostics,
    ];

    /// Returns the wire name of the command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetServiceStatus => "get-service-status",
            Self::ListUsbDevices => "list-usb-devices",
            Self::GetAttachments => "get-attachments",
            Self::GetRecentLogs => "get-recent-logs",
            Self::PatchConfig => "patch-config",
            Self::AttachDevice => "attach-device",
            Self::DetachDevice => "detach-device",
            Self::GetDiagnostics => "get-diagnostics",
        }
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command name the daemon doesn't recognize.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown command '{0}'")]
pub struct UnknownCommand(pub String);

impl FromStr for HostCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}
