//! Command dispatch for the host IPC server.
//!
//! Maps each [`HostCommand`] onto the backend, the registry or the
//! config store and builds the response. Every failure, whatever its
//! origin, becomes a failure response; nothing here can take the server
//! down.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A panic inside a command handler is contained by [`Dispatcher::dispatch`]

use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use usbshare_core::{
    validate_device_id, Attachment, BackendFailure, ConfigPatch, DomainError, StoreError,
};
use usbshare_protocol::{
    AttachDeviceRequest, AttachedReply, DetachDeviceRequest, DetachedReply, Diagnostics,
    HostCommand, HostRequest, HostResponse, PayloadError, RecentLogsRequest, ServiceStatus,
};
use usbshare_usbipd::DeviceBackend;

use crate::config_store::ConfigStore;
use crate::registry::{RegistryError, RegistryHandle};

/// Message returned when a command handler panics.
pub const INTERNAL_ERROR: &str = "internal error";

/// Errors raised while executing a recognized command.
///
/// The display string is what the client sees.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0} payload missing")]
    MissingPayload(&'static str),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("{}", .0.message)]
    Backend(#[from] BackendFailure),

    #[error(transparent)]
    Config(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("config task failed: {0}")]
    ConfigTask(#[from] JoinError),
}

/// Routes requests to the daemon's components.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn DeviceBackend>,
    registry: RegistryHandle,
    config: Arc<ConfigStore>,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn DeviceBackend>,
        registry: RegistryHandle,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            backend,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Executes one request and always produces a response.
    ///
    /// The handler runs on its own task so a panic is observed as a
    /// `JoinError` and reported as [`INTERNAL_ERROR`].
    pub async fn dispatch(&self, request: HostRequest) -> HostResponse {
        let this = self.clone();
        let command = request.command.clone();

        match tokio::spawn(async move { this.dispatch_inner(request).await }).await {
            Ok(response) => response,
            Err(e) => {
                error!(command = %command, error = %e, "Command handler panicked");
                self.registry
                    .error(format!("{command}: {INTERNAL_ERROR}"))
                    .await;
                HostResponse::failure(INTERNAL_ERROR)
            }
        }
    }

    async fn dispatch_inner(&self, request: HostRequest) -> HostResponse {
        let command = match HostCommand::from_str(&request.command) {
            Ok(command) => command,
            Err(e) => {
                warn!(command = %request.command, "Unknown command");
                return HostResponse::failure(e.to_string());
            }
        };

        debug!(%command, "Dispatching");

        match self.execute(command, &request).await {
            Ok(response) => response,
            Err(e) => {
                let message = e.to_string();
                warn!(%command, error = %message, "Command failed");
                self.registry.error(message.clone()).await;
                HostResponse::failure(message)
            }
        }
    }

    async fn execute(
        &self,
        command: HostCommand,
        request: &HostRequest,
    ) -> Result<HostResponse, DispatchError> {
        // Tool calls are bounded by their own deadline, not by shutdown
        let cancel = CancellationToken::new();

        let response = match command {
            HostCommand::GetServiceStatus => HostResponse::ok(&ServiceStatus::running())?,
            HostCommand::ListUsbDevices => {
                let devices = self.backend.list_devices(&cancel).await?;
                HostResponse::ok(&devices)?
            }
            HostCommand::GetAttachments => {
                HostResponse::ok(&self.registry.list_attachments().await)?
            }
            HostCommand::GetRecentLogs => {
                let max = RecentLogsRequest::from_payload(request.payload.as_ref()).max;
                HostResponse::ok(&self.registry.recent_logs(max).await)?
            }
            HostCommand::PatchConfig => {
                let patch: ConfigPatch = request.payload_as()?.unwrap_or_default();
                // File I/O stays off the runtime workers
                let store = Arc::clone(&self.config);
                let config = tokio::task::spawn_blocking(move || store.patch(&patch)).await??;
                self.registry.info("Config updated").await;
                HostResponse::ok(&config)?
            }
            HostCommand::AttachDevice => self.attach_device(request, &cancel).await?,
            HostCommand::DetachDevice => self.detach_device(request, &cancel).await?,
            HostCommand::GetDiagnostics => {
                HostResponse::ok(&self.diagnostics(&cancel).await)?
            }
        };

        Ok(response)
    }

    /// Binds the device, then records the attachment.
    ///
    /// A failed bind leaves the registry untouched and its message is
    /// returned verbatim.
    async fn attach_device(
        &self,
        request: &HostRequest,
        cancel: &CancellationToken,
    ) -> Result<HostResponse, DispatchError> {
        let attach: AttachDeviceRequest = request
            .payload_as()?
            .ok_or(DispatchError::MissingPayload("attach"))?;
        let device_id = validate_device_id(&attach.device_id)?;

        let result = self.backend.bind(device_id, cancel).await;
        if !result.success() {
            let message = result.message().unwrap_or("Bind failed").to_string();
            info!(device_id, error_code = %result.error_code(), %message, "Bind failed");
            return Ok(HostResponse::failure(message));
        }

        self.registry
            .upsert_attachment(Attachment::shared(device_id, attach.client_address))
            .await?;
        info!(device_id, "Device shared");
        self.registry.info(format!("Shared {device_id}")).await;

        Ok(HostResponse::ok(&AttachedReply { attached: true })?)
    }

    /// Unbinds the device, then drops the attachment.
    async fn detach_device(
        &self,
        request: &HostRequest,
        cancel: &CancellationToken,
    ) -> Result<HostResponse, DispatchError> {
        let detach: DetachDeviceRequest = request
            .payload_as()?
            .ok_or(DispatchError::MissingPayload("detach"))?;
        let device_id = validate_device_id(&detach.device_id)?;

        let result = self.backend.unbind(device_id, cancel).await;
        if !result.success() {
            let message = result.message().unwrap_or("Unbind failed").to_string();
            info!(device_id, error_code = %result.error_code(), %message, "Unbind failed");
            return Ok(HostResponse::failure(message));
        }

        let existed = self.registry.remove_attachment(device_id).await?;
        info!(device_id, existed, "Device unshared");
        self.registry.info(format!("Unshared {device_id}")).await;

        Ok(HostResponse::ok(&DetachedReply { detached: true })?)
    }

    async fn diagnostics(&self, cancel: &CancellationToken) -> Diagnostics {
        let driver = self.backend.driver_status(cancel).await;
        let attachments = self.registry.list_attachments().await.len();

        Diagnostics {
            service: "Running".to_string(),
            driver: driver.message,
            tool_present: driver.installed,
            driver_error_code: driver.error_code,
            client_reachable: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
            attachments,
        }
    }
}
