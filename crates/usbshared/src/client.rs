//! One-shot IPC client for the host daemon.
//!
//! Each call opens a fresh connection, writes one request line, reads one
//! response line and closes. A daemon that closes without answering is
//! reported as a failure response ("No response"), not as an error.
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

use usbshare_core::{AppConfig, Attachment, ConfigPatch, Device, LogEntry};
use usbshare_protocol::{
    AttachDeviceRequest, DetachDeviceRequest, Diagnostics, HostCommand, HostRequest,
    HostResponse, PayloadError, ServiceStatus,
};

// ============================================================================
// Configuration
// ============================================================================

/// Connect deadline; a daemon that isn't listening fails fast.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on waiting for a response. Covers one 20 s tool call.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Errors
// ============================================================================

/// Errors from talking to the daemon.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Cannot connect to daemon at {path}: {error}. Is usbshared running?")]
    Connect { path: PathBuf, error: String },

    #[error("Timed out waiting for the daemon")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed response: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// The daemon answered with `success: false`.
    #[error("{0}")]
    Rejected(String),
}

// ============================================================================
// Host Client
// ============================================================================

/// Client for one-shot requests to `usbshared`.
#[derive(Debug, Clone)]
pub struct HostClient {
    socket_path: PathBuf,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl HostClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            connect_timeout: CONNECT_TIMEOUT,
            response_timeout: RESPONSE_TIMEOUT,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Sends one request and returns the raw response.
    pub async fn send(&self, request: &HostRequest) -> Result<HostResponse, ClientError> {
        let stream = match timeout(self.connect_timeout, UnixStream::connect(&self.socket_path))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ClientError::Connect {
                    path: self.socket_path.clone(),
                    error: e.to_string(),
                })
            }
            Err(_) => {
                return Err(ClientError::Connect {
                    path: self.socket_path.clone(),
                    error: "connect timed out".to_string(),
                })
            }
        };

        let (reader, mut writer) = stream.into_split();

        let mut json = serde_json::to_string(request)?;
        json.push('\n');
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;

        let mut line = String::new();
        let mut reader = BufReader::new(reader);
        let bytes_read = timeout(self.response_timeout, reader.read_line(&mut line))
            .await
            .map_err(|_| ClientError::Timeout)??;

        if bytes_read == 0 || line.trim().is_empty() {
            debug!(command = %request.command, "Daemon closed without responding");
            return Ok(HostResponse::no_response());
        }

        Ok(serde_json::from_str(line.trim())?)
    }

    /// Sends a request and decodes the payload of a successful response.
    async fn call<T: DeserializeOwned>(&self, request: HostRequest) -> Result<T, ClientError> {
        let response = self.send(&request).await?;
        if !response.success {
            return Err(ClientError::Rejected(
                response.error.unwrap_or_else(|| "Request failed".to_string()),
            ));
        }

        response
            .payload_as()?
            .ok_or_else(|| ClientError::Rejected("Response had no payload".to_string()))
    }

    /// Sends a mutating request; only success matters.
    async fn call_unit(&self, request: HostRequest) -> Result<(), ClientError> {
        let response = self.send(&request).await?;
        if response.success {
            Ok(())
        } else {
            Err(ClientError::Rejected(
                response.error.unwrap_or_else(|| "Request failed".to_string()),
            ))
        }
    }

    pub async fn service_status(&self) -> Result<ServiceStatus, ClientError> {
        self.call(HostRequest::new(HostCommand::GetServiceStatus))
            .await
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>, ClientError> {
        self.call(HostRequest::new(HostCommand::ListUsbDevices)).await
    }

    pub async fn attachments(&self) -> Result<Vec<Attachment>, ClientError> {
        self.call(HostRequest::new(HostCommand::GetAttachments)).await
    }

    pub async fn recent_logs(&self, max: i64) -> Result<Vec<LogEntry>, ClientError> {
        let request =
            HostRequest::with_payload(HostCommand::GetRecentLogs, &serde_json::json!({ "max": max }))?;
        self.call(request).await
    }

    pub async fn patch_config(&self, patch: &ConfigPatch) -> Result<AppConfig, ClientError> {
        self.call(HostRequest::with_payload(HostCommand::PatchConfig, patch)?)
            .await
    }

    pub async fn share(
        &self,
        device_id: &str,
        client_address: Option<String>,
    ) -> Result<(), ClientError> {
        let payload = AttachDeviceRequest {
            device_id: device_id.to_string(),
            client_address,
        };
        self.call_unit(HostRequest::with_payload(HostCommand::AttachDevice, &payload)?)
            .await
    }

    pub async fn unshare(&self, device_id: &str) -> Result<(), ClientError> {
        let payload = DetachDeviceRequest {
            device_id: device_id.to_string(),
        };
        self.call_unit(HostRequest::with_payload(HostCommand::DetachDevice, &payload)?)
            .await
    }

    pub async fn diagnostics(&self) -> Result<Diagnostics, ClientError> {
        self.call(HostRequest::new(HostCommand::GetDiagnostics)).await
    }
}
